use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, SessionError, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Suspend)?;
    record_profile(TranscriptProfile::Heartbeat)?;
    record_profile(TranscriptProfile::Veto)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    let script: &[&str] = match profile {
        TranscriptProfile::Suspend => &[
            "tick 500",
            "attach",
            "tick 500",
            "suspend",
            "tick 1500",
            "status",
            "resume",
            "tick 1500",
            "status",
            "log",
        ],
        TranscriptProfile::Heartbeat => &["attach", "tick 3600", "status", "log"],
        TranscriptProfile::Veto => &[
            "attach",
            "tick 250",
            "deny",
            "detach",
            "tick 1300",
            "status",
            "allow",
            "tick 1300",
            "status",
            "log",
        ],
    };

    for command in script {
        match session.handle_command(command) {
            Ok(_) => {}
            Err(SessionError::Io(err)) => return Err(err),
            Err(err @ SessionError::Fault(_)) => return Err(io::Error::other(err.to_string())),
        }
    }
    Ok(())
}
