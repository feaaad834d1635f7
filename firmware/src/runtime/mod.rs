use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::{InterruptExecutor, Spawner};
use embassy_stm32 as hal;
use embassy_stm32::interrupt;
use embassy_stm32::interrupt::{InterruptExt, Priority};
use embassy_stm32::gpio::{Input, Level, Output, OutputOpenDrain, Pull, Speed};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use power_core::activity::ActivityFlags;
use power_core::fault::FaultKind;

use crate::fault;
use crate::hw::{CompanionReset, DetectionGate, Led, ServiceGate};
use crate::status::LinkStatusCell;

mod control_task;
mod monitor_task;
mod usb_task;

pub use usb_task::StatusFrame;

/// Depth of the queue between the control loop and the status writer.
pub const STATUS_QUEUE_DEPTH: usize = 1;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Runs the detection sampler above the thread-mode tasks so it preempts the
/// control loop and keeps sampling while that loop sits in `wfi`.
static DETECTION_EXECUTOR: InterruptExecutor = InterruptExecutor::new();

// TIM2 is unused by the board and the time driver, so its vector is free to
// serve as the executor's software interrupt.
#[interrupt]
unsafe fn TIM2() {
    unsafe { DETECTION_EXECUTOR.on_interrupt() }
}

pub(super) static ACTIVITY_FLAGS: ActivityFlags = ActivityFlags::new();
pub(super) static LINK_STATUS: LinkStatusCell = LinkStatusCell::new();
pub(super) static DETECTION: DetectionGate = DetectionGate::new();
pub(super) static STATUS_WRITER: ServiceGate = ServiceGate::new();
pub(super) static STATUS_FRAMES: Channel<ThreadModeRawMutex, StatusFrame, STATUS_QUEUE_DEPTH> =
    Channel::new();

/// Converts a core duration into Embassy's tick-based duration.
pub(super) fn embassy_duration(duration: core::time::Duration) -> embassy_time::Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    embassy_time::Duration::from_micros(micros)
}

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA5,
        PB0,
        PB1,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    let led = Led::new(Output::new(PA5, Level::Low, Speed::Low));
    let companion = CompanionReset::new(
        OutputOpenDrain::new(PB0, Level::Low, Speed::Low),
        Input::new(PB1, Pull::Down),
    );

    if spawner.spawn(usb_task::run(USB, PA12, PA11)).is_err() {
        fault::halt(FaultKind::TaskSpawn("usb"));
    }

    interrupt::TIM2.set_priority(Priority::P1);
    let detection_spawner = DETECTION_EXECUTOR.start(interrupt::TIM2);
    if detection_spawner.spawn(monitor_task::run()).is_err() {
        fault::halt(FaultKind::TimerInit);
    }

    if spawner.spawn(control_task::run(led, companion)).is_err() {
        fault::halt(FaultKind::TaskSpawn("control"));
    }

    core::future::pending::<()>().await;
}
