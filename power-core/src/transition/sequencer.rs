use core::fmt;

use super::{TransitionCallback, TransitionPhase};

/// Low-power entry primitive.
///
/// Blocks the task context until an interrupt wakes the core. Interrupts stay
/// live while waiting; one of them is what ends the wait.
pub trait SleepPrimitive {
    fn wait_for_interrupt(&mut self);
}

/// Reason a sleep attempt did not reach the low-power primitive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SleepError {
    /// A registered callback vetoed during check-ready.
    Denied { callback: usize },
}

impl fmt::Display for SleepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SleepError::Denied { callback } => write!(f, "denied by callback #{callback}"),
        }
    }
}

/// Walks registered callbacks through the transition phases around the
/// sleep primitive.
///
/// Check-ready and before-transition run in registration order; check-fail
/// and after-transition run in reverse so teardown mirrors setup. Only the
/// callbacks that allowed before a veto see check-fail.
pub struct SleepSequencer<P> {
    primitive: P,
    entries: u32,
    denials: u32,
}

impl<P: SleepPrimitive> SleepSequencer<P> {
    #[must_use]
    pub const fn new(primitive: P) -> Self {
        Self {
            primitive,
            entries: 0,
            denials: 0,
        }
    }

    /// Attempts one sleep transition.
    ///
    /// Returns once the core has woken and every callback has seen
    /// after-transition, or immediately after unwinding a veto.
    ///
    /// # Errors
    ///
    /// Returns [`SleepError::Denied`] naming the first callback that denied
    /// check-ready.
    pub fn enter(
        &mut self,
        callbacks: &mut [&mut dyn TransitionCallback],
    ) -> Result<(), SleepError> {
        for index in 0..callbacks.len() {
            if !callbacks[index]
                .on_phase(TransitionPhase::CheckReady)
                .is_allowed()
            {
                for agreed in callbacks[..index].iter_mut().rev() {
                    agreed.on_phase(TransitionPhase::CheckFail);
                }
                self.denials = self.denials.saturating_add(1);
                return Err(SleepError::Denied { callback: index });
            }
        }

        for callback in callbacks.iter_mut() {
            callback.on_phase(TransitionPhase::BeforeTransition);
        }

        self.entries = self.entries.saturating_add(1);
        self.primitive.wait_for_interrupt();

        for callback in callbacks.iter_mut().rev() {
            callback.on_phase(TransitionPhase::AfterTransition);
        }

        Ok(())
    }

    /// Number of times the primitive was entered.
    #[must_use]
    pub const fn entries(&self) -> u32 {
        self.entries
    }

    /// Number of attempts vetoed during check-ready.
    #[must_use]
    pub const fn denials(&self) -> u32 {
        self.denials
    }

    #[must_use]
    pub fn primitive(&self) -> &P {
        &self.primitive
    }

    pub fn primitive_mut(&mut self) -> &mut P {
        &mut self.primitive
    }
}
