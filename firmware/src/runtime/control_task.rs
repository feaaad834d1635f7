use embassy_time::{Instant, Timer};
use power_core::control::{ControlLoop, LoopConfig, LoopDecision, WakeOutcome};
use power_core::link::LinkStatusSource;
use power_core::report::StatusReporter;
use power_core::startup::{SecondaryBoot, StartupSequence};
use power_core::telemetry::PowerEvent;
use power_core::transition::{PowerTransitionCoordinator, SleepSequencer};

use super::{
    ACTIVITY_FLAGS, DETECTION, LINK_STATUS, STATUS_FRAMES, STATUS_WRITER, StatusFrame,
    embassy_duration,
};
use crate::fault;
use crate::hw::{COMPANION_BOOT_ADDRESS, CompanionReset, Led, WfiSleep};
use crate::telemetry::PowerRecorder;

/// Brings the link up, then drives the suspend/resume loop forever.
#[embassy_executor::task]
pub async fn run(mut led: Led<'static>, mut companion: CompanionReset<'static>) -> ! {
    let config = LoopConfig::default();
    let mut startup = StartupSequence::new();

    defmt::info!("startup: waiting for enumeration");
    while !startup.poll_enumeration(LINK_STATUS.status(), &mut led) {
        Timer::after(embassy_duration(config.enumeration_blink_period)).await;
    }
    defmt::info!("startup: link configured");

    if let Err(err) = startup.arm_detection(&DETECTION, &mut led) {
        fault::halt(err.into());
    }
    defmt::info!("startup: detection armed");

    let boot = SecondaryBoot::new(COMPANION_BOOT_ADDRESS);
    if let Err(err) = startup.activate_secondary(&mut companion, boot) {
        fault::halt(err.into());
    }
    defmt::info!("startup: companion released at {=u32:#010x}", boot.address);

    let mut control = ControlLoop::new(config);
    let mut sequencer = SleepSequencer::new(WfiSleep::new(&DETECTION));
    let mut reporter = StatusReporter::default();
    let mut recorder = PowerRecorder::new();
    let frames = STATUS_FRAMES.sender();

    loop {
        match control.poll(&ACTIVITY_FLAGS, LINK_STATUS.status()) {
            LoopDecision::Idle => {
                Timer::after(embassy_duration(config.poll_period)).await;
            }
            LoopDecision::EnterSleep { flush_delay } => {
                recorder.record(PowerEvent::SuspendRequested, Instant::now());
                Timer::after(embassy_duration(flush_delay)).await;

                let result = {
                    let mut coordinator = PowerTransitionCoordinator::new(
                        &ACTIVITY_FLAGS,
                        &DETECTION,
                        &STATUS_WRITER,
                        &mut led,
                    );
                    sequencer.enter(&mut [&mut coordinator])
                };

                match control.finish_sleep(result) {
                    WakeOutcome::Woke => {
                        recorder.record(PowerEvent::SleepEntered, Instant::now());
                    }
                    WakeOutcome::EntryFailed(err) => {
                        defmt::warn!("power: sleep entry failed: {}", err);
                        recorder.record(PowerEvent::SleepDenied(err), Instant::now());
                    }
                }
                Timer::after(embassy_duration(config.poll_period)).await;
            }
            LoopDecision::Resumed { recovery_delay } => {
                recorder.record(PowerEvent::Resumed, Instant::now());
                Timer::after(embassy_duration(recovery_delay)).await;
            }
            LoopDecision::Report { count } => {
                let event = match reporter.prepare() {
                    Ok(bytes) => match StatusFrame::from_slice(bytes) {
                        Ok(frame) if frames.try_send(frame).is_ok() => {
                            PowerEvent::StatusReported { count }
                        }
                        _ => PowerEvent::StatusDropped,
                    },
                    Err(err) => {
                        defmt::warn!("power: status frame rejected: {}", err);
                        PowerEvent::StatusDropped
                    }
                };
                recorder.record(event, Instant::now());
                Timer::after(embassy_duration(config.poll_period)).await;
            }
        }
    }
}
