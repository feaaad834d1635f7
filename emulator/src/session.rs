use std::cell::Cell;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use power_core::activity::{ActivityFlags, ActivityMonitor, ActivityTimer};
use power_core::control::{ControlLoop, LoopConfig, LoopDecision, WakeOutcome};
use power_core::fault::FaultKind;
use power_core::link::{LinkStatus, LinkStatusSource};
use power_core::report::StatusReporter;
use power_core::startup::{
    ActivationError, SecondaryBoot, SecondaryUnit, StartupError, StartupPhase, StartupSequence,
};
use power_core::telemetry::{PowerEvent, PowerEventLog, TelemetryInstant};
use power_core::transition::{
    Indicator, PowerTransitionCoordinator, SleepPrimitive, SleepSequencer, TimerService,
    TransitionCallback, TransitionPhase, TransitionVerdict,
};

/// Boot address handed to the simulated companion unless overridden.
pub const DEFAULT_BOOT_ADDRESS: u32 = 0x1000_0000;

/// Upper bound on simulated milliseconds a single `tick` may advance.
const MAX_TICKS_PER_COMMAND: u64 = 600_000;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "attach",
        "attach | resume                - host configures the link and keeps it active",
    ),
    (
        "suspend",
        "suspend                        - host suspends the configured link",
    ),
    (
        "detach",
        "detach                         - cable pulled, link no longer configured",
    ),
    (
        "tick",
        "tick [ms]                      - advance simulated time (default one poll period)",
    ),
    (
        "deny",
        "deny | allow                   - console drain vetoes or permits sleep entry",
    ),
    (
        "companion",
        "companion <hex-address>        - boot address used when the companion is released",
    ),
    (
        "phase",
        "phase <hex-mode>               - deliver a raw power-management mode to the coordinator",
    ),
    (
        "status",
        "status                         - display link, flags, and loop state",
    ),
    (
        "log",
        "log                            - dump the power event history",
    ),
    (
        "help",
        "help [topic]                   - show help for a command",
    ),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Suspend,
    Heartbeat,
    Veto,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Suspend => "evidence/emulator-suspend.log",
            TranscriptProfile::Heartbeat => "evidence/emulator-heartbeat.log",
            TranscriptProfile::Veto => "evidence/emulator-veto.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Suspend => "Link power emulator suspend/resume transcript",
            TranscriptProfile::Heartbeat => "Link power emulator heartbeat transcript",
            TranscriptProfile::Veto => "Link power emulator sleep veto transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("suspend") {
            Ok(Self::Suspend)
        } else if tag.eq_ignore_ascii_case("heartbeat") {
            Ok(Self::Heartbeat)
        } else if tag.eq_ignore_ascii_case("veto") {
            Ok(Self::Veto)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

/// Failure that ends an emulator session.
#[derive(Debug)]
pub enum SessionError {
    Io(io::Error),
    Fault(FaultKind),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Io(err) => write!(f, "transcript i/o: {err}"),
            SessionError::Fault(fault) => write!(f, "fault: {fault}"),
        }
    }
}

impl From<io::Error> for SessionError {
    fn from(value: io::Error) -> Self {
        SessionError::Io(value)
    }
}

impl From<FaultKind> for SessionError {
    fn from(value: FaultKind) -> Self {
        SessionError::Fault(value)
    }
}

impl From<StartupError> for SessionError {
    fn from(value: StartupError) -> Self {
        SessionError::Fault(FaultKind::from(value))
    }
}

/// Milliseconds of simulated time since the session started.
#[derive(Copy, Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct SimInstant(u64);

impl SimInstant {
    fn after(self, delay: Duration) -> Self {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum DriverAction {
    Startup,
    Poll,
    Sleep,
}

pub struct Session {
    flags: ActivityFlags,
    link: SimLink,
    timer: HostTimer,
    service: HostService,
    led: HostLed,
    drain: ConsoleDrain,
    companion: HostCompanion,
    sequencer: SleepSequencer<HostWfi>,
    control: ControlLoop,
    startup: StartupSequence,
    reporter: StatusReporter,
    events: PowerEventLog<SimInstant>,
    boot_address: u32,
    now: SimInstant,
    next_action: DriverAction,
    next_action_at: SimInstant,
    transcript: TranscriptLogger,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::create(profile)?;
        Ok(Self::with_transcript(LoopConfig::default(), transcript))
    }

    fn with_transcript(config: LoopConfig, transcript: TranscriptLogger) -> Self {
        Self {
            flags: ActivityFlags::new(),
            link: SimLink::default(),
            timer: HostTimer::default(),
            service: HostService::default(),
            led: HostLed::default(),
            drain: ConsoleDrain::default(),
            companion: HostCompanion::default(),
            sequencer: SleepSequencer::new(HostWfi::default()),
            control: ControlLoop::new(config),
            startup: StartupSequence::new(),
            reporter: StatusReporter::default(),
            events: PowerEventLog::new(),
            boot_address: DEFAULT_BOOT_ADDRESS,
            now: SimInstant::default(),
            next_action: DriverAction::Startup,
            next_action_at: SimInstant::default().after(config.enumeration_blink_period),
            transcript,
        }
    }

    pub fn handle_command(&mut self, line: &str) -> Result<Vec<String>, SessionError> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.transcript
            .append_line(self.now, TranscriptRole::Host, trimmed)?;

        let mut words = trimmed.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let argument = words.next();

        let mut lines = Vec::new();
        let result = match command.as_str() {
            "attach" | "resume" => {
                self.set_link(LinkStatus::ACTIVE, &mut lines);
                Ok(())
            }
            "suspend" => {
                self.set_link(LinkStatus::SUSPENDED, &mut lines);
                Ok(())
            }
            "detach" => {
                self.set_link(LinkStatus::DETACHED, &mut lines);
                Ok(())
            }
            "tick" => self.handle_tick(argument, &mut lines),
            "deny" => {
                self.drain.veto = true;
                lines.push("console: holding sleep until output drains".to_string());
                Ok(())
            }
            "allow" => {
                self.drain.veto = false;
                lines.push("console: drained".to_string());
                Ok(())
            }
            "companion" => {
                self.handle_companion(argument, &mut lines);
                Ok(())
            }
            "phase" => self.handle_phase(argument, &mut lines),
            "status" => {
                self.describe_status(&mut lines);
                Ok(())
            }
            "log" => {
                self.describe_log(&mut lines);
                Ok(())
            }
            "help" => {
                describe_help(argument, &mut lines);
                Ok(())
            }
            other => {
                lines.push(format!("ERR unknown command `{other}`"));
                Ok(())
            }
        };

        self.record_output(&lines)?;
        if let Err(SessionError::Fault(fault)) = &result {
            let message = format!("fault: {fault}");
            self.transcript
                .append_line(self.now, TranscriptRole::Emulator, &message)?;
        }
        result.map(|()| lines)
    }

    fn set_link(&mut self, status: LinkStatus, lines: &mut Vec<String>) {
        self.link.status = status;
        lines.push(format!("usb: link {status}"));
    }

    fn handle_tick(
        &mut self,
        argument: Option<&str>,
        lines: &mut Vec<String>,
    ) -> Result<(), SessionError> {
        let default = u64::try_from(self.control.config().poll_period.as_millis()).unwrap_or(1);
        let millis = match argument.map(str::parse::<u64>) {
            None => default,
            Some(Ok(value)) if value <= MAX_TICKS_PER_COMMAND => value,
            Some(Ok(_)) => {
                lines.push(format!("ERR syntax tick accepts at most {MAX_TICKS_PER_COMMAND} ms"));
                return Ok(());
            }
            Some(Err(_)) => {
                lines.push("ERR syntax expected milliseconds".to_string());
                return Ok(());
            }
        };

        for _ in 0..millis {
            self.step(lines)?;
        }
        lines.push(format!("tick: now +{} ms", self.now.as_millis()));
        Ok(())
    }

    fn handle_companion(&mut self, argument: Option<&str>, lines: &mut Vec<String>) {
        if self.startup.phase() == StartupPhase::SecondaryActive {
            lines.push("ERR companion already released".to_string());
            return;
        }

        let parsed = argument.and_then(|value| {
            let digits = value.trim_start_matches("0x").trim_start_matches("0X");
            u32::from_str_radix(digits, 16).ok()
        });
        match parsed {
            Some(address) => {
                self.boot_address = address;
                lines.push(format!("startup: companion boot address 0x{address:08x}"));
            }
            None => lines.push("ERR syntax expected hex address".to_string()),
        }
    }

    /// Runs one framework mode through the coordinator's raw dispatch. An
    /// unknown mode is a fault and ends the session.
    fn handle_phase(
        &mut self,
        argument: Option<&str>,
        lines: &mut Vec<String>,
    ) -> Result<(), SessionError> {
        let parsed = argument.and_then(|value| {
            let digits = value.trim_start_matches("0x").trim_start_matches("0X");
            u8::from_str_radix(digits, 16).ok()
        });
        let Some(raw) = parsed else {
            lines.push("ERR syntax expected hex mode".to_string());
            return Ok(());
        };

        let verdict = {
            let mut coordinator = PowerTransitionCoordinator::new(
                &self.flags,
                &self.timer,
                &self.service,
                &mut self.led,
            );
            coordinator.on_raw_phase(raw)?
        };
        let phase = TransitionPhase::try_from(raw)?;
        lines.push(format!("pm: {phase:?} (0x{raw:02x}) -> {verdict:?}"));
        Ok(())
    }

    /// Advances one detection tick and runs the driver action when it is due.
    fn step(&mut self, lines: &mut Vec<String>) -> Result<(), SessionError> {
        self.now = self.now.after(Duration::from_millis(1));

        if self.timer.is_running() {
            ActivityMonitor::new(&self.flags, &self.timer, &self.link).on_tick();
        }

        if self.now >= self.next_action_at {
            match self.next_action {
                DriverAction::Startup => self.run_startup(lines)?,
                DriverAction::Poll => self.run_poll(lines),
                DriverAction::Sleep => self.run_sleep(lines),
            }
        }
        Ok(())
    }

    fn schedule(&mut self, action: DriverAction, delay: Duration) {
        self.next_action = action;
        self.next_action_at = self.now.after(delay);
    }

    fn run_startup(&mut self, lines: &mut Vec<String>) -> Result<(), SessionError> {
        let config = *self.control.config();
        if !self.startup.poll_enumeration(self.link.status, &mut self.led) {
            self.schedule(DriverAction::Startup, config.enumeration_blink_period);
            return Ok(());
        }

        self.startup.arm_detection(&self.timer, &mut self.led)?;
        lines.push("startup: detection armed".to_string());

        let boot = SecondaryBoot::new(self.boot_address);
        self.startup.activate_secondary(&mut self.companion, boot)?;
        lines.push(format!(
            "startup: companion released at 0x{:08x}",
            self.boot_address
        ));

        self.schedule(DriverAction::Poll, config.poll_period);
        Ok(())
    }

    fn run_poll(&mut self, lines: &mut Vec<String>) {
        let config = *self.control.config();
        match self.control.poll(&self.flags, self.link.status) {
            LoopDecision::Idle => self.schedule(DriverAction::Poll, config.poll_period),
            LoopDecision::EnterSleep { flush_delay } => {
                self.record_event(PowerEvent::SuspendRequested, lines);
                self.schedule(DriverAction::Sleep, flush_delay);
            }
            LoopDecision::Resumed { recovery_delay } => {
                self.record_event(PowerEvent::Resumed, lines);
                self.schedule(DriverAction::Poll, recovery_delay);
            }
            LoopDecision::Report { count } => {
                match self.reporter.prepare() {
                    Ok(frame) => {
                        let text = frame_text(frame);
                        lines.push(format!("usb: status {text:?}"));
                        self.record_event(PowerEvent::StatusReported { count }, lines);
                    }
                    Err(err) => {
                        lines.push(format!("power: status dropped: {err}"));
                        self.record_event(PowerEvent::StatusDropped, lines);
                    }
                }
                self.schedule(DriverAction::Poll, config.poll_period);
            }
        }
    }

    fn run_sleep(&mut self, lines: &mut Vec<String>) {
        let result = {
            let mut coordinator = PowerTransitionCoordinator::new(
                &self.flags,
                &self.timer,
                &self.service,
                &mut self.led,
            );
            self.sequencer
                .enter(&mut [&mut coordinator, &mut self.drain])
        };

        match self.control.finish_sleep(result) {
            WakeOutcome::Woke => self.record_event(PowerEvent::SleepEntered, lines),
            WakeOutcome::EntryFailed(err) => {
                self.record_event(PowerEvent::SleepDenied(err), lines);
            }
        }

        let period = self.control.config().poll_period;
        self.schedule(DriverAction::Poll, period);
    }

    fn record_event(&mut self, event: PowerEvent, lines: &mut Vec<String>) {
        self.events.record(event, self.now);
        lines.push(format!("power: {event} @+{} ms", self.now.as_millis()));
    }

    fn describe_status(&self, lines: &mut Vec<String>) {
        let snapshot = self.flags.snapshot();
        lines.push(format!("link: {}", self.link.status));
        lines.push(format!(
            "power: {:?} loop={:?}",
            self.control.power_state(snapshot),
            self.control.state()
        ));
        lines.push(format!(
            "flags: suspend={} resume={} activity={}",
            snapshot.suspend_requested, snapshot.resume_detected, snapshot.activity_count
        ));
        lines.push(format!(
            "detection: {} ticks={} service={}",
            if self.timer.is_running() { "running" } else { "stopped" },
            self.timer.acks.get(),
            if self.service.running.get() { "running" } else { "paused" },
        ));
        lines.push(format!(
            "led: {} startup={:?}",
            if self.led.on { "on" } else { "off" },
            self.startup.phase()
        ));
        match self.companion.released_at {
            Some(address) => lines.push(format!("companion: running from 0x{address:08x}")),
            None => lines.push("companion: held in reset".to_string()),
        }
        lines.push(format!(
            "stats: {} wfi={} denials={} frames sent={} dropped={}",
            self.control.stats(),
            self.sequencer.primitive().waits,
            self.sequencer.denials(),
            self.reporter.sent(),
            self.reporter.dropped()
        ));
    }

    fn describe_log(&self, lines: &mut Vec<String>) {
        if self.events.is_empty() {
            lines.push("log: empty".to_string());
            return;
        }

        lines.push(format!("log: {} event(s)", self.events.len()));
        for record in self.events.oldest_first() {
            let since = record
                .since_sleep
                .map(|elapsed| format!(" since-sleep={}ms", elapsed.as_millis()))
                .unwrap_or_default();
            lines.push(format!(
                "  #{:<3} +{:>6} ms {}{since}",
                record.id,
                record.timestamp.as_millis(),
                record.event
            ));
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(self.now, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn describe_help(topic: Option<&str>, lines: &mut Vec<String>) {
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders a zero-padded status frame as text.
fn frame_text(frame: &[u8]) -> String {
    let end = frame
        .iter()
        .position(|byte| *byte == 0)
        .unwrap_or(frame.len());
    String::from_utf8_lossy(&frame[..end]).into_owned()
}

#[derive(Default)]
struct SimLink {
    status: LinkStatus,
}

impl LinkStatusSource for SimLink {
    fn status(&self) -> LinkStatus {
        self.status
    }
}

#[derive(Default)]
struct HostTimer {
    running: Cell<bool>,
    acks: Cell<u32>,
}

impl ActivityTimer for HostTimer {
    fn start(&self) {
        self.running.set(true);
    }

    fn stop(&self) {
        self.running.set(false);
    }

    fn acknowledge(&self) {
        self.acks.set(self.acks.get().wrapping_add(1));
    }

    fn is_running(&self) -> bool {
        self.running.get()
    }
}

struct HostService {
    running: Cell<bool>,
}

impl Default for HostService {
    fn default() -> Self {
        Self {
            running: Cell::new(true),
        }
    }
}

impl TimerService for HostService {
    fn start(&self) {
        self.running.set(true);
    }

    fn stop(&self) {
        self.running.set(false);
    }
}

#[derive(Default)]
struct HostLed {
    on: bool,
}

impl Indicator for HostLed {
    fn set_active(&mut self, on: bool) {
        self.on = on;
    }

    fn toggle(&mut self) {
        self.on = !self.on;
    }
}

/// Wait-for-interrupt stand-in; the next simulated tick is the wake source.
#[derive(Default)]
struct HostWfi {
    waits: u32,
}

impl SleepPrimitive for HostWfi {
    fn wait_for_interrupt(&mut self) {
        self.waits += 1;
    }
}

/// Console output path that may hold off sleep while bytes are queued.
#[derive(Default)]
struct ConsoleDrain {
    veto: bool,
}

impl TransitionCallback for ConsoleDrain {
    fn on_phase(&mut self, phase: TransitionPhase) -> TransitionVerdict {
        match phase {
            TransitionPhase::CheckReady if self.veto => TransitionVerdict::Deny,
            _ => TransitionVerdict::Allow,
        }
    }
}

#[derive(Default)]
struct HostCompanion {
    released_at: Option<u32>,
}

impl SecondaryUnit for HostCompanion {
    fn enable(&mut self, address: u32, timeout: Duration) -> Result<(), ActivationError> {
        if address == 0 || address % 4 != 0 {
            return Err(ActivationError::InvalidAddress(address));
        }
        if timeout.is_zero() {
            return Err(ActivationError::Timeout);
        }
        self.released_at = Some(address);
        Ok(())
    }
}

struct TranscriptLogger {
    writer: Box<dyn Write>,
}

impl TranscriptLogger {
    fn create(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: Box::new(BufWriter::new(file)),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are simulated milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        now: SimInstant,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            now.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
