//! One-time bring-up ordering.
//!
//! The control loop may only start cycling through low power once detection
//! is armed, and detection may only be armed once the host has configured the
//! link. The secondary processing unit is released exactly once, after
//! detection is running.

use core::{fmt, time::Duration};

use crate::activity::ActivityTimer;
use crate::link::LinkStatus;
use crate::transition::Indicator;

/// Default time allowed for the secondary unit to report that it booted.
pub const SECONDARY_BOOT_WAIT: Duration = Duration::from_micros(10);

/// Boot parameters handed to the secondary unit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SecondaryBoot {
    pub address: u32,
    pub timeout: Duration,
}

impl SecondaryBoot {
    #[must_use]
    pub const fn new(address: u32) -> Self {
        Self {
            address,
            timeout: SECONDARY_BOOT_WAIT,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Failure reported by the secondary unit's enable primitive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActivationError {
    /// The unit did not signal boot completion within the timeout.
    Timeout,
    /// The boot address is not a valid image location for the unit.
    InvalidAddress(u32),
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivationError::Timeout => f.write_str("boot wait timed out"),
            ActivationError::InvalidAddress(address) => {
                write!(f, "invalid boot address 0x{address:08x}")
            }
        }
    }
}

/// Secondary processing unit activated once after detection is armed.
pub trait SecondaryUnit {
    /// Starts the unit at `address`, waiting at most `timeout` for it to boot.
    ///
    /// # Errors
    ///
    /// Returns an [`ActivationError`] when the unit cannot be started.
    fn enable(&mut self, address: u32, timeout: Duration) -> Result<(), ActivationError>;
}

/// Bring-up phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupPhase {
    AwaitingEnumeration,
    Enumerated,
    DetectionArmed,
    SecondaryActive,
}

/// Startup step invoked out of order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartupError {
    /// Detection was armed before the link reached the configured state.
    NotEnumerated,
    /// The secondary unit was activated before detection was armed.
    DetectionNotArmed,
    /// The secondary unit was already activated.
    AlreadyActivated,
    /// The secondary unit failed to start.
    Activation(ActivationError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::NotEnumerated => f.write_str("link not enumerated"),
            StartupError::DetectionNotArmed => f.write_str("detection not armed"),
            StartupError::AlreadyActivated => f.write_str("secondary unit already active"),
            StartupError::Activation(err) => write!(f, "activation failed: {err}"),
        }
    }
}

/// Tracks bring-up progress and enforces its ordering.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StartupSequence {
    phase: StartupPhase,
}

impl StartupSequence {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: StartupPhase::AwaitingEnumeration,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> StartupPhase {
        self.phase
    }

    /// One enumeration-wait step, called every blink period.
    ///
    /// Toggles the indicator while the link is not configured-and-active and
    /// returns `true` once it is.
    pub fn poll_enumeration<I: Indicator>(&mut self, link: LinkStatus, indicator: &mut I) -> bool {
        if self.phase != StartupPhase::AwaitingEnumeration {
            return true;
        }

        if link.is_active() {
            self.phase = StartupPhase::Enumerated;
            true
        } else {
            indicator.toggle();
            false
        }
    }

    /// Starts the detection timer and lights the indicator.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::NotEnumerated`] before enumeration has been
    /// observed.
    pub fn arm_detection<T, I>(&mut self, timer: &T, indicator: &mut I) -> Result<(), StartupError>
    where
        T: ActivityTimer,
        I: Indicator,
    {
        match self.phase {
            StartupPhase::AwaitingEnumeration => Err(StartupError::NotEnumerated),
            StartupPhase::Enumerated => {
                timer.start();
                indicator.set_active(true);
                self.phase = StartupPhase::DetectionArmed;
                Ok(())
            }
            StartupPhase::DetectionArmed | StartupPhase::SecondaryActive => Ok(()),
        }
    }

    /// Releases the secondary unit.
    ///
    /// # Errors
    ///
    /// Returns [`StartupError::DetectionNotArmed`] when detection is not
    /// running yet, [`StartupError::AlreadyActivated`] on a second call, and
    /// [`StartupError::Activation`] when the unit itself fails.
    pub fn activate_secondary<U: SecondaryUnit>(
        &mut self,
        unit: &mut U,
        boot: SecondaryBoot,
    ) -> Result<(), StartupError> {
        match self.phase {
            StartupPhase::AwaitingEnumeration | StartupPhase::Enumerated => {
                Err(StartupError::DetectionNotArmed)
            }
            StartupPhase::SecondaryActive => Err(StartupError::AlreadyActivated),
            StartupPhase::DetectionArmed => {
                unit.enable(boot.address, boot.timeout).map_err(StartupError::Activation)?;
                self.phase = StartupPhase::SecondaryActive;
                Ok(())
            }
        }
    }
}

impl Default for StartupSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use core::cell::Cell;

    use super::*;

    #[derive(Default)]
    struct Led {
        on: bool,
        toggles: u32,
    }

    impl Indicator for Led {
        fn set_active(&mut self, on: bool) {
            self.on = on;
        }

        fn toggle(&mut self) {
            self.on = !self.on;
            self.toggles += 1;
        }
    }

    #[derive(Default)]
    struct Timer {
        running: Cell<bool>,
    }

    impl ActivityTimer for Timer {
        fn start(&self) {
            self.running.set(true);
        }

        fn stop(&self) {
            self.running.set(false);
        }

        fn acknowledge(&self) {}

        fn is_running(&self) -> bool {
            self.running.get()
        }
    }

    #[derive(Default)]
    struct Unit {
        calls: u32,
        last: Option<(u32, Duration)>,
        fail: bool,
    }

    impl SecondaryUnit for Unit {
        fn enable(&mut self, address: u32, timeout: Duration) -> Result<(), ActivationError> {
            self.calls += 1;
            self.last = Some((address, timeout));
            if self.fail {
                Err(ActivationError::Timeout)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn blinks_until_configured() {
        let mut startup = StartupSequence::new();
        let mut led = Led::default();

        assert!(!startup.poll_enumeration(LinkStatus::DETACHED, &mut led));
        assert!(!startup.poll_enumeration(LinkStatus::SUSPENDED, &mut led));
        assert!(startup.poll_enumeration(LinkStatus::ACTIVE, &mut led));

        assert_eq!(led.toggles, 2);
        assert_eq!(startup.phase(), StartupPhase::Enumerated);
    }

    #[test]
    fn detection_requires_enumeration() {
        let mut startup = StartupSequence::new();
        let mut led = Led::default();
        let timer = Timer::default();

        assert_eq!(
            startup.arm_detection(&timer, &mut led),
            Err(StartupError::NotEnumerated)
        );
        assert!(!timer.is_running());

        startup.poll_enumeration(LinkStatus::ACTIVE, &mut led);
        startup
            .arm_detection(&timer, &mut led)
            .expect("arming after enumeration");
        assert!(timer.is_running());
        assert!(led.on);
    }

    #[test]
    fn secondary_activates_once_after_detection() {
        let mut startup = StartupSequence::new();
        let mut led = Led::default();
        let timer = Timer::default();
        let mut unit = Unit::default();
        let boot = SecondaryBoot::new(0x1000_0400);

        startup.poll_enumeration(LinkStatus::ACTIVE, &mut led);
        assert_eq!(
            startup.activate_secondary(&mut unit, boot),
            Err(StartupError::DetectionNotArmed)
        );
        assert_eq!(unit.calls, 0);

        startup.arm_detection(&timer, &mut led).expect("arm");
        startup
            .activate_secondary(&mut unit, boot)
            .expect("first activation");
        assert_eq!(unit.last, Some((0x1000_0400, SECONDARY_BOOT_WAIT)));

        assert_eq!(
            startup.activate_secondary(&mut unit, boot),
            Err(StartupError::AlreadyActivated)
        );
        assert_eq!(unit.calls, 1);
    }

    #[test]
    fn activation_failure_keeps_phase() {
        let mut startup = StartupSequence::new();
        let mut led = Led::default();
        let timer = Timer::default();
        let mut unit = Unit {
            fail: true,
            ..Unit::default()
        };

        startup.poll_enumeration(LinkStatus::ACTIVE, &mut led);
        startup.arm_detection(&timer, &mut led).expect("arm");

        assert_eq!(
            startup.activate_secondary(&mut unit, SecondaryBoot::new(0)),
            Err(StartupError::Activation(ActivationError::Timeout))
        );
        assert_eq!(startup.phase(), StartupPhase::DetectionArmed);
    }
}
