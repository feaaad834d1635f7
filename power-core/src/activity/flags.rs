//! Flags shared between the detection tick and the task context.
//!
//! Single-word reads and writes go through `portable_atomic` so the same code
//! runs on cores without native compare-and-swap. Anything that touches more
//! than one field at once (a sample update, a snapshot, consuming the
//! activity counter against a threshold) runs inside a critical section so
//! the control loop never observes a torn combination.

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::link::LinkStatus;

/// Result of folding one link sample into the flags.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SampleOutcome {
    /// The link was not configured-and-active; low power was requested.
    SuspendRequested,
    /// The link was active; carries the updated activity count.
    Active { count: u32 },
}

/// Consistent copy of all three flags taken under a critical section.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FlagSnapshot {
    pub suspend_requested: bool,
    pub resume_detected: bool,
    pub activity_count: u32,
}

/// Shared suspend/resume flags and the activity heartbeat counter.
pub struct ActivityFlags {
    suspend_requested: AtomicBool,
    resume_detected: AtomicBool,
    activity_count: AtomicU32,
}

impl ActivityFlags {
    /// Creates the flags in the active-equivalent state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            suspend_requested: AtomicBool::new(false),
            resume_detected: AtomicBool::new(false),
            activity_count: AtomicU32::new(0),
        }
    }

    /// Folds a link sample into the flags.
    ///
    /// Anything other than configured-and-active requests suspend. An active
    /// sample clears the request, marks a resume, and bumps the heartbeat
    /// counter (saturating).
    pub fn record_sample(&self, status: LinkStatus) -> SampleOutcome {
        critical_section::with(|_| {
            if status.is_active() {
                self.suspend_requested.store(false, Ordering::Release);
                self.resume_detected.store(true, Ordering::Release);
                let count = self
                    .activity_count
                    .load(Ordering::Acquire)
                    .saturating_add(1);
                self.activity_count.store(count, Ordering::Release);
                SampleOutcome::Active { count }
            } else {
                self.suspend_requested.store(true, Ordering::Release);
                SampleOutcome::SuspendRequested
            }
        })
    }

    #[must_use]
    pub fn suspend_requested(&self) -> bool {
        self.suspend_requested.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn resume_detected(&self) -> bool {
        self.resume_detected.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn activity_count(&self) -> u32 {
        self.activity_count.load(Ordering::Acquire)
    }

    /// Consumes a pending resume, returning whether one was pending.
    #[must_use]
    pub fn take_resume(&self) -> bool {
        self.resume_detected.swap(false, Ordering::AcqRel)
    }

    /// Drops any pending resume without acting on it.
    pub fn clear_resume(&self) {
        self.resume_detected.store(false, Ordering::Release);
    }

    /// Resets the activity counter when it has exceeded `threshold`.
    ///
    /// Returns the count that was consumed, or `None` when the threshold has
    /// not been crossed yet.
    #[must_use]
    pub fn take_activity_over(&self, threshold: u32) -> Option<u32> {
        critical_section::with(|_| {
            let count = self.activity_count.load(Ordering::Acquire);
            if count > threshold {
                self.activity_count.store(0, Ordering::Release);
                Some(count)
            } else {
                None
            }
        })
    }

    /// Reads all flags as one consistent snapshot.
    #[must_use]
    pub fn snapshot(&self) -> FlagSnapshot {
        critical_section::with(|_| FlagSnapshot {
            suspend_requested: self.suspend_requested.load(Ordering::Acquire),
            resume_detected: self.resume_detected.load(Ordering::Acquire),
            activity_count: self.activity_count.load(Ordering::Acquire),
        })
    }

    /// Returns every flag to its power-on value.
    pub fn reset(&self) {
        critical_section::with(|_| {
            self.suspend_requested.store(false, Ordering::Release);
            self.resume_detected.store(false, Ordering::Release);
            self.activity_count.store(0, Ordering::Release);
        });
    }
}

impl Default for ActivityFlags {
    fn default() -> Self {
        Self::new()
    }
}
