//! Unrecoverable faults.
//!
//! Nothing in this subsystem retries after a fault. Firmware halts through a
//! non-returning handler; host tooling reports and exits.

use core::fmt;

use crate::startup::{ActivationError, StartupError};

/// Conditions that stop forward progress.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// The detection timer or its interrupt line could not be configured.
    TimerInit,
    /// An executor task could not be spawned at startup.
    TaskSpawn(&'static str),
    /// The power-management framework invoked a callback with a mode value
    /// outside the four known phases.
    UnreachablePhase(u8),
    /// The secondary processing unit refused to start.
    SecondaryActivation(ActivationError),
    /// Startup steps were invoked out of order.
    Startup(StartupError),
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::TimerInit => f.write_str("detection timer init failed"),
            FaultKind::TaskSpawn(task) => write!(f, "failed to spawn {task} task"),
            FaultKind::UnreachablePhase(raw) => {
                write!(f, "unreachable transition phase 0x{raw:02x}")
            }
            FaultKind::SecondaryActivation(err) => write!(f, "secondary activation: {err}"),
            FaultKind::Startup(err) => write!(f, "startup: {err}"),
        }
    }
}

impl From<ActivationError> for FaultKind {
    fn from(err: ActivationError) -> Self {
        FaultKind::SecondaryActivation(err)
    }
}

impl From<StartupError> for FaultKind {
    fn from(err: StartupError) -> Self {
        match err {
            StartupError::Activation(inner) => FaultKind::SecondaryActivation(inner),
            other => FaultKind::Startup(other),
        }
    }
}
