use crate::activity::{ActivityFlags, ActivityTimer};

use super::{Indicator, TimerService, TransitionCallback, TransitionPhase, TransitionVerdict};

/// Sleep-transition callback that gates low power on the monitor's suspend
/// request and owns the quiesce/restore sequence for the detection timers.
///
/// The coordinator remembers whether it quiesced the timers so every stop is
/// matched by exactly one restart, either on check-fail (abort) or on
/// after-transition (commit).
pub struct PowerTransitionCoordinator<'a, T, S, I> {
    flags: &'a ActivityFlags,
    timer: T,
    service: S,
    indicator: I,
    quiesced: bool,
}

impl<'a, T, S, I> PowerTransitionCoordinator<'a, T, S, I>
where
    T: ActivityTimer,
    S: TimerService,
    I: Indicator,
{
    #[must_use]
    pub const fn new(flags: &'a ActivityFlags, timer: T, service: S, indicator: I) -> Self {
        Self {
            flags,
            timer,
            service,
            indicator,
            quiesced: false,
        }
    }

    /// Returns `true` between an allowing check-ready and its matching
    /// restore.
    #[must_use]
    pub const fn is_quiesced(&self) -> bool {
        self.quiesced
    }

    pub fn indicator_mut(&mut self) -> &mut I {
        &mut self.indicator
    }

    fn check_ready(&mut self) -> TransitionVerdict {
        if !self.flags.suspend_requested() {
            return TransitionVerdict::Deny;
        }

        if !self.quiesced {
            self.timer.stop();
            self.service.stop();
            self.quiesced = true;
        }
        TransitionVerdict::Allow
    }

    fn check_fail(&mut self) {
        if self.quiesced {
            self.restore();
        }
    }

    fn before_transition(&mut self) {
        if self.flags.suspend_requested() {
            self.indicator.set_active(false);
        }
    }

    fn after_transition(&mut self) {
        self.indicator.set_active(true);
        self.restore();
    }

    fn restore(&mut self) {
        self.timer.start();
        self.service.start();
        self.quiesced = false;
    }
}

impl<T, S, I> TransitionCallback for PowerTransitionCoordinator<'_, T, S, I>
where
    T: ActivityTimer,
    S: TimerService,
    I: Indicator,
{
    fn on_phase(&mut self, phase: TransitionPhase) -> TransitionVerdict {
        match phase {
            TransitionPhase::CheckReady => return self.check_ready(),
            TransitionPhase::CheckFail => self.check_fail(),
            TransitionPhase::BeforeTransition => self.before_transition(),
            TransitionPhase::AfterTransition => self.after_transition(),
        }
        TransitionVerdict::Allow
    }
}
