#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Board bindings for the power-core traits.
//!
//! The gates are plain atomics so they can live in statics shared between the
//! detection ticker, the status writer, and the control task. GPIO-backed
//! pieces only exist on the MCU target.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use power_core::activity::ActivityTimer;
use power_core::startup::ActivationError;
use power_core::transition::TimerService;

/// Detection sampling period.
pub const DETECTION_TICK: Duration = Duration::from_millis(1);

/// Flash window the companion may boot from.
pub const COMPANION_FLASH: core::ops::Range<u32> = 0x0804_0000..0x0808_0000;

/// Image the companion is released into after detection is armed.
pub const COMPANION_BOOT_ADDRESS: u32 = COMPANION_FLASH.start;

/// Run/stop control for the detection sampler.
///
/// Stopping the gate removes detection as a wake source: the sampler finishes
/// its in-flight tick, parks on [`DetectionGate::wait_started`] and holds no
/// timer until [`ActivityTimer::start`] wakes it again.
pub struct DetectionGate {
    running: AtomicBool,
    parked: AtomicBool,
    ticks: AtomicU32,
    started: Signal<CriticalSectionRawMutex, ()>,
}

impl DetectionGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            parked: AtomicBool::new(true),
            ticks: AtomicU32::new(0),
            started: Signal::new(),
        }
    }

    /// Ticks acknowledged since boot (wrapping).
    #[must_use]
    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// True once the sampler has dropped its ticker after a stop.
    #[must_use]
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }

    /// True while a start is waiting to be observed by the sampler.
    #[must_use]
    pub fn wake_pending(&self) -> bool {
        self.started.signaled()
    }

    /// Parks the caller until the gate runs.
    pub async fn wait_started(&self) {
        while !self.is_running() {
            self.parked.store(true, Ordering::Release);
            self.started.wait().await;
        }
        self.parked.store(false, Ordering::Release);
    }
}

impl Default for DetectionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTimer for DetectionGate {
    fn start(&self) {
        self.running.store(true, Ordering::Release);
        self.started.signal(());
    }

    fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.started.reset();
    }

    fn acknowledge(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Pauses the status writer while the core is quiesced for sleep.
pub struct ServiceGate {
    paused: AtomicBool,
}

impl ServiceGate {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            paused: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }
}

impl Default for ServiceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for ServiceGate {
    fn start(&self) {
        self.paused.store(false, Ordering::Release);
    }

    fn stop(&self) {
        self.paused.store(true, Ordering::Release);
    }
}

/// Checks that `address` names a vector table inside the companion window.
///
/// # Errors
///
/// Returns [`ActivationError::InvalidAddress`] for unaligned addresses or
/// addresses outside [`COMPANION_FLASH`].
pub fn validate_boot_address(address: u32) -> Result<(), ActivationError> {
    if COMPANION_FLASH.contains(&address) && address % 0x200 == 0 {
        Ok(())
    } else {
        Err(ActivationError::InvalidAddress(address))
    }
}

#[cfg(target_os = "none")]
pub use board::{CompanionReset, Led, WfiSleep};

#[cfg(target_os = "none")]
mod board {
    use core::time::Duration;

    use embassy_stm32::gpio::{Input, Output, OutputOpenDrain};
    use embassy_time::Instant;
    use power_core::startup::{ActivationError, SecondaryUnit};
    use power_core::transition::{Indicator, SleepPrimitive};

    use super::{DetectionGate, validate_boot_address};

    /// Status LED, lit while the link is usable.
    pub struct Led<'d> {
        pin: Output<'d>,
    }

    impl<'d> Led<'d> {
        pub fn new(pin: Output<'d>) -> Self {
            Self { pin }
        }
    }

    impl Indicator for Led<'_> {
        fn set_active(&mut self, on: bool) {
            if on {
                self.pin.set_high();
            } else {
                self.pin.set_low();
            }
        }

        fn toggle(&mut self) {
            self.pin.toggle();
        }
    }

    /// Companion processor held in reset through an open-drain line.
    pub struct CompanionReset<'d> {
        reset: OutputOpenDrain<'d>,
        ready: Input<'d>,
    }

    impl<'d> CompanionReset<'d> {
        pub fn new(reset: OutputOpenDrain<'d>, ready: Input<'d>) -> Self {
            Self { reset, ready }
        }
    }

    impl SecondaryUnit for CompanionReset<'_> {
        fn enable(&mut self, address: u32, timeout: Duration) -> Result<(), ActivationError> {
            validate_boot_address(address)?;

            self.reset.set_high();
            let micros = u64::try_from(timeout.as_micros()).unwrap_or(u64::MAX);
            let deadline = Instant::now() + embassy_time::Duration::from_micros(micros);
            while Instant::now() < deadline {
                if self.ready.is_high() {
                    return Ok(());
                }
            }

            if self.ready.is_high() {
                Ok(())
            } else {
                self.reset.set_low();
                Err(ActivationError::Timeout)
            }
        }
    }

    /// Wait-for-interrupt entry; any enabled interrupt ends the wait.
    ///
    /// Detection must be parked first, otherwise the sampler's pending tick
    /// would be the interrupt that ends the wait.
    pub struct WfiSleep {
        detection: &'static DetectionGate,
    }

    impl WfiSleep {
        pub fn new(detection: &'static DetectionGate) -> Self {
            Self { detection }
        }
    }

    impl SleepPrimitive for WfiSleep {
        fn wait_for_interrupt(&mut self) {
            while !self.detection.is_parked() {
                cortex_m::asm::wfi();
            }
            cortex_m::asm::wfi();
        }
    }
}
