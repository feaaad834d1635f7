//! Cooperative control loop deciding when to sleep, recover, or report.
//!
//! The loop itself does not wait: each poll returns a [`LoopDecision`] and the
//! driver (an embassy task on target, the emulator on the host) performs the
//! delays, sleep entry, and writes the decision calls for. This keeps the
//! state machine independent of any executor.

use core::{fmt, time::Duration};

use crate::activity::{ActivityFlags, FlagSnapshot};
use crate::link::{LinkPowerState, LinkStatus};
use crate::transition::SleepError;

/// Interval between control loop polls.
pub const POLL_PERIOD: Duration = Duration::from_millis(250);
/// Settle time before sleep so pending console output drains.
pub const SUSPEND_FLUSH_DELAY: Duration = Duration::from_millis(1_000);
/// Recovery time applied once after a host resume.
pub const RESUME_RECOVERY_DELAY: Duration = Duration::from_millis(10);
/// Activity samples that must elapse before the next heartbeat report.
pub const REPORT_THRESHOLD: u32 = 3_000;
/// Timeout for a single status write.
pub const WRITE_TIMEOUT: Duration = Duration::from_millis(100);
/// Indicator toggle interval while waiting for enumeration.
pub const ENUMERATION_BLINK_PERIOD: Duration = Duration::from_millis(250);

/// Timing and threshold configuration for the control loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LoopConfig {
    pub poll_period: Duration,
    pub suspend_flush_delay: Duration,
    pub resume_recovery_delay: Duration,
    pub report_threshold: u32,
    pub write_timeout: Duration,
    pub enumeration_blink_period: Duration,
}

impl LoopConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            poll_period: POLL_PERIOD,
            suspend_flush_delay: SUSPEND_FLUSH_DELAY,
            resume_recovery_delay: RESUME_RECOVERY_DELAY,
            report_threshold: REPORT_THRESHOLD,
            write_timeout: WRITE_TIMEOUT,
            enumeration_blink_period: ENUMERATION_BLINK_PERIOD,
        }
    }

    #[must_use]
    pub const fn with_report_threshold(mut self, threshold: u32) -> Self {
        self.report_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period = period;
        self
    }

    #[must_use]
    pub const fn with_suspend_flush_delay(mut self, delay: Duration) -> Self {
        self.suspend_flush_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_resume_recovery_delay(mut self, delay: Duration) -> Self {
        self.resume_recovery_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Control loop phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopState {
    Active,
    SuspendAttempt,
}

/// Action the driver must take after a poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LoopDecision {
    /// Nothing to do this tick.
    Idle,
    /// Wait `flush_delay`, run the sleep sequencer, then call
    /// [`ControlLoop::finish_sleep`].
    EnterSleep { flush_delay: Duration },
    /// The host resumed the link; wait `recovery_delay` before normal polling.
    Resumed { recovery_delay: Duration },
    /// Send the heartbeat; `count` is the activity consumed by this report.
    Report { count: u32 },
}

/// Result of a sleep attempt as seen by the loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WakeOutcome {
    /// The core slept and woke; resume handling waits for a fresh sample.
    Woke,
    /// The attempt never reached the primitive; retried on the next tick.
    EntryFailed(SleepError),
}

/// Running totals kept by the loop.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LoopStats {
    pub sleep_attempts: u32,
    pub failed_entries: u32,
    pub resumes: u32,
    pub reports: u32,
}

impl fmt::Display for LoopStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sleeps={} failed={} resumes={} reports={}",
            self.sleep_attempts, self.failed_entries, self.resumes, self.reports
        )
    }
}

/// Sleep/resume state machine polled from the task context.
#[derive(Clone, Debug)]
pub struct ControlLoop {
    config: LoopConfig,
    state: LoopState,
    slept: bool,
    stats: LoopStats,
}

impl ControlLoop {
    #[must_use]
    pub const fn new(config: LoopConfig) -> Self {
        Self {
            config,
            state: LoopState::Active,
            slept: false,
            stats: LoopStats {
                sleep_attempts: 0,
                failed_entries: 0,
                resumes: 0,
                reports: 0,
            },
        }
    }

    /// Evaluates the shared flags once.
    ///
    /// A pending suspend always wins. Committing to a sleep attempt drops any
    /// resume flag left over from before the attempt, so only a resume sample
    /// observed afterwards produces [`LoopDecision::Resumed`], exactly once.
    /// Heartbeat reports are only considered while the link is
    /// configured-and-active and no attempt is outstanding.
    pub fn poll(&mut self, flags: &ActivityFlags, link: LinkStatus) -> LoopDecision {
        if flags.suspend_requested() {
            if self.state == LoopState::Active {
                flags.clear_resume();
                self.state = LoopState::SuspendAttempt;
                self.slept = false;
            }
            self.stats.sleep_attempts = self.stats.sleep_attempts.saturating_add(1);
            return LoopDecision::EnterSleep {
                flush_delay: self.config.suspend_flush_delay,
            };
        }

        if self.state == LoopState::SuspendAttempt {
            if flags.take_resume() {
                self.state = LoopState::Active;
                self.stats.resumes = self.stats.resumes.saturating_add(1);
                return LoopDecision::Resumed {
                    recovery_delay: self.config.resume_recovery_delay,
                };
            }
            return LoopDecision::Idle;
        }

        if link.is_active() {
            if let Some(count) = flags.take_activity_over(self.config.report_threshold) {
                self.stats.reports = self.stats.reports.saturating_add(1);
                return LoopDecision::Report { count };
            }
        }

        LoopDecision::Idle
    }

    /// Records the result of a sleep attempt started by
    /// [`LoopDecision::EnterSleep`].
    ///
    /// A failed entry falls back to active polling unless the core already
    /// slept during this attempt; in that case the attempt stays open so the
    /// pending resume is still reported.
    pub fn finish_sleep(&mut self, result: Result<(), SleepError>) -> WakeOutcome {
        match result {
            Ok(()) => {
                self.slept = true;
                WakeOutcome::Woke
            }
            Err(err) => {
                if !self.slept {
                    self.state = LoopState::Active;
                }
                self.stats.failed_entries = self.stats.failed_entries.saturating_add(1);
                WakeOutcome::EntryFailed(err)
            }
        }
    }

    /// Derives the link power state from a flag snapshot and the loop phase.
    #[must_use]
    pub const fn power_state(&self, snapshot: FlagSnapshot) -> LinkPowerState {
        LinkPowerState::derive(
            snapshot.suspend_requested,
            snapshot.resume_detected,
            matches!(self.state, LoopState::SuspendAttempt),
        )
    }

    #[must_use]
    pub const fn state(&self) -> LoopState {
        self.state
    }

    #[must_use]
    pub const fn stats(&self) -> LoopStats {
        self.stats
    }

    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }
}

impl Default for ControlLoop {
    fn default() -> Self {
        Self::new(LoopConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_flags(samples: u32) -> ActivityFlags {
        let flags = ActivityFlags::new();
        for _ in 0..samples {
            flags.record_sample(LinkStatus::ACTIVE);
        }
        flags
    }

    #[test]
    fn idle_while_active_below_threshold() {
        let flags = active_flags(10);
        let mut control = ControlLoop::default();

        assert_eq!(control.poll(&flags, LinkStatus::ACTIVE), LoopDecision::Idle);
        assert_eq!(control.state(), LoopState::Active);
    }

    #[test]
    fn suspend_request_enters_sleep_and_discards_stale_resume() {
        let flags = active_flags(5);
        flags.record_sample(LinkStatus::DETACHED);
        assert!(flags.resume_detected());

        let mut control = ControlLoop::default();
        let decision = control.poll(&flags, LinkStatus::DETACHED);

        assert_eq!(
            decision,
            LoopDecision::EnterSleep {
                flush_delay: SUSPEND_FLUSH_DELAY
            }
        );
        assert_eq!(control.state(), LoopState::SuspendAttempt);
        assert!(!flags.resume_detected());
    }

    #[test]
    fn wake_without_fresh_sample_waits() {
        let flags = ActivityFlags::new();
        flags.record_sample(LinkStatus::DETACHED);
        let mut control = ControlLoop::default();

        control.poll(&flags, LinkStatus::DETACHED);
        assert_eq!(control.finish_sleep(Ok(())), WakeOutcome::Woke);

        flags.record_sample(LinkStatus::SUSPENDED);
        assert!(matches!(
            control.poll(&flags, LinkStatus::SUSPENDED),
            LoopDecision::EnterSleep { .. }
        ));
    }

    #[test]
    fn failed_entry_returns_to_active_and_retries() {
        let flags = ActivityFlags::new();
        flags.record_sample(LinkStatus::DETACHED);
        let mut control = ControlLoop::default();

        control.poll(&flags, LinkStatus::DETACHED);
        let outcome = control.finish_sleep(Err(SleepError::Denied { callback: 0 }));

        assert_eq!(
            outcome,
            WakeOutcome::EntryFailed(SleepError::Denied { callback: 0 })
        );
        assert_eq!(control.state(), LoopState::Active);
        assert!(matches!(
            control.poll(&flags, LinkStatus::DETACHED),
            LoopDecision::EnterSleep { .. }
        ));
        assert_eq!(control.stats().failed_entries, 1);
        assert_eq!(control.stats().sleep_attempts, 2);
    }

    #[test]
    fn denial_after_wake_still_reports_resume() {
        let flags = ActivityFlags::new();
        flags.record_sample(LinkStatus::SUSPENDED);
        let mut control = ControlLoop::default();

        control.poll(&flags, LinkStatus::SUSPENDED);
        control.finish_sleep(Ok(()));
        control.poll(&flags, LinkStatus::SUSPENDED);

        flags.record_sample(LinkStatus::ACTIVE);
        control.finish_sleep(Err(SleepError::Denied { callback: 0 }));
        assert_eq!(control.state(), LoopState::SuspendAttempt);

        assert_eq!(
            control.poll(&flags, LinkStatus::ACTIVE),
            LoopDecision::Resumed {
                recovery_delay: RESUME_RECOVERY_DELAY
            }
        );
        assert_eq!(control.state(), LoopState::Active);
    }

    #[test]
    fn report_requires_active_link() {
        let flags = active_flags(11);
        let mut control = ControlLoop::new(LoopConfig::new().with_report_threshold(10));

        assert_eq!(
            control.poll(&flags, LinkStatus::SUSPENDED),
            LoopDecision::Idle
        );
        assert_eq!(flags.activity_count(), 11);

        assert_eq!(
            control.poll(&flags, LinkStatus::ACTIVE),
            LoopDecision::Report { count: 11 }
        );
        assert_eq!(flags.activity_count(), 0);
    }

    #[test]
    fn power_state_follows_attempt() {
        let flags = ActivityFlags::new();
        let mut control = ControlLoop::default();
        assert_eq!(
            control.power_state(flags.snapshot()),
            LinkPowerState::Active
        );

        flags.record_sample(LinkStatus::DETACHED);
        assert_eq!(
            control.power_state(flags.snapshot()),
            LinkPowerState::SuspendPending
        );

        control.poll(&flags, LinkStatus::DETACHED);
        control.finish_sleep(Ok(()));
        assert_eq!(
            control.power_state(flags.snapshot()),
            LinkPowerState::Suspended
        );

        flags.record_sample(LinkStatus::ACTIVE);
        assert_eq!(
            control.power_state(flags.snapshot()),
            LinkPowerState::Resuming
        );

        control.poll(&flags, LinkStatus::ACTIVE);
        assert_eq!(
            control.power_state(flags.snapshot()),
            LinkPowerState::Active
        );
    }
}
