//! Link activity detection.
//!
//! A periodic detection timer drives the [`ActivityMonitor`], which samples
//! the link once per period and folds the result into the shared
//! [`ActivityFlags`]. The monitor is the only producer of those flags; the
//! control loop and the transition coordinator only read or consume them.

mod flags;
mod monitor;

pub use flags::{ActivityFlags, FlagSnapshot, SampleOutcome};
pub use monitor::ActivityMonitor;

/// Periodic timer whose expiry triggers one activity sample.
///
/// Methods take `&self` because the monitor (acknowledge) and the transition
/// coordinator (start/stop) both hold the same timer; hardware
/// implementations gate the underlying peripheral with interior mutability.
pub trait ActivityTimer {
    /// Enables the timer and starts a new period.
    fn start(&self);

    /// Disables the timer; no further ticks fire until [`ActivityTimer::start`].
    fn stop(&self);

    /// Clears the pending expiry so the next period fires independently.
    fn acknowledge(&self);

    /// Returns `true` while the timer is enabled.
    fn is_running(&self) -> bool;
}

impl<T: ActivityTimer + ?Sized> ActivityTimer for &T {
    fn start(&self) {
        (**self).start();
    }

    fn stop(&self) {
        (**self).stop();
    }

    fn acknowledge(&self) {
        (**self).acknowledge();
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }
}
