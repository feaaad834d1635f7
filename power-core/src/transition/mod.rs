//! Power-mode transition callbacks.
//!
//! The power-management framework walks every registered callback through up
//! to four phases when the task context asks to sleep. Any callback may veto
//! during check-ready; callbacks that already agreed are then walked through
//! check-fail so they can undo their preparations. Once every callback has
//! agreed the framework runs before-transition, enters the low-power
//! primitive, and runs after-transition on wake.

use core::{convert::TryFrom, fmt};

use crate::fault::FaultKind;

mod coordinator;
mod sequencer;

pub use coordinator::PowerTransitionCoordinator;
pub use sequencer::{SleepError, SleepPrimitive, SleepSequencer};

/// Phase of a transition attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransitionPhase {
    CheckReady,
    CheckFail,
    BeforeTransition,
    AfterTransition,
}

impl TransitionPhase {
    const CHECK_READY_RAW: u8 = 0x01;
    const CHECK_FAIL_RAW: u8 = 0x02;
    const BEFORE_TRANSITION_RAW: u8 = 0x04;
    const AFTER_TRANSITION_RAW: u8 = 0x08;

    /// Raw mode value used by the vendor framework for this phase.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            TransitionPhase::CheckReady => Self::CHECK_READY_RAW,
            TransitionPhase::CheckFail => Self::CHECK_FAIL_RAW,
            TransitionPhase::BeforeTransition => Self::BEFORE_TRANSITION_RAW,
            TransitionPhase::AfterTransition => Self::AFTER_TRANSITION_RAW,
        }
    }
}

impl TryFrom<u8> for TransitionPhase {
    type Error = FaultKind;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            Self::CHECK_READY_RAW => Ok(TransitionPhase::CheckReady),
            Self::CHECK_FAIL_RAW => Ok(TransitionPhase::CheckFail),
            Self::BEFORE_TRANSITION_RAW => Ok(TransitionPhase::BeforeTransition),
            Self::AFTER_TRANSITION_RAW => Ok(TransitionPhase::AfterTransition),
            other => Err(FaultKind::UnreachablePhase(other)),
        }
    }
}

impl fmt::Display for TransitionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransitionPhase::CheckReady => "check-ready",
            TransitionPhase::CheckFail => "check-fail",
            TransitionPhase::BeforeTransition => "before-transition",
            TransitionPhase::AfterTransition => "after-transition",
        })
    }
}

/// Answer returned by a callback. Only check-ready may meaningfully deny.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransitionVerdict {
    Allow,
    Deny,
}

impl TransitionVerdict {
    #[must_use]
    pub const fn is_allowed(self) -> bool {
        matches!(self, TransitionVerdict::Allow)
    }
}

/// Participant in a sleep transition.
pub trait TransitionCallback {
    /// Handles one phase of the transition.
    fn on_phase(&mut self, phase: TransitionPhase) -> TransitionVerdict;

    /// Dispatches a raw framework mode value.
    ///
    /// # Errors
    ///
    /// Returns [`FaultKind::UnreachablePhase`] when `raw` is not one of the
    /// four known phases; callers treat this as fatal.
    fn on_raw_phase(&mut self, raw: u8) -> Result<TransitionVerdict, FaultKind> {
        let phase = TransitionPhase::try_from(raw)?;
        Ok(self.on_phase(phase))
    }
}

/// Auxiliary timer service used by the link stack (for example the USB
/// stack's own timeout clock). Quiesced together with the detection timer.
pub trait TimerService {
    fn start(&self);

    fn stop(&self);
}

impl<T: TimerService + ?Sized> TimerService for &T {
    fn start(&self) {
        (**self).start();
    }

    fn stop(&self) {
        (**self).stop();
    }
}

/// User-visible activity indicator (typically an LED).
pub trait Indicator {
    fn set_active(&mut self, on: bool);

    fn toggle(&mut self);
}

impl<T: Indicator + ?Sized> Indicator for &mut T {
    fn set_active(&mut self, on: bool) {
        (**self).set_active(on);
    }

    fn toggle(&mut self) {
        (**self).toggle();
    }
}
