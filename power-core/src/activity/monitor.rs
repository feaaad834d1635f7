use crate::link::LinkStatusSource;

use super::{ActivityFlags, ActivityTimer, SampleOutcome};

/// Tick handler that samples the link and updates the shared flags.
///
/// `on_tick` must be invoked once per detection period from the timer's
/// interrupt (or the highest-priority task standing in for it). It never
/// blocks.
pub struct ActivityMonitor<'a, T, L> {
    flags: &'a ActivityFlags,
    timer: T,
    link: L,
}

impl<'a, T, L> ActivityMonitor<'a, T, L>
where
    T: ActivityTimer,
    L: LinkStatusSource,
{
    #[must_use]
    pub const fn new(flags: &'a ActivityFlags, timer: T, link: L) -> Self {
        Self { flags, timer, link }
    }

    /// Handles one timer expiry.
    ///
    /// The pending condition is acknowledged before the link is sampled so
    /// the next period is not delayed by the handler's own run time.
    pub fn on_tick(&self) -> SampleOutcome {
        self.timer.acknowledge();
        self.flags.record_sample(self.link.status())
    }

    #[must_use]
    pub fn flags(&self) -> &'a ActivityFlags {
        self.flags
    }

    #[must_use]
    pub fn timer(&self) -> &T {
        &self.timer
    }
}
