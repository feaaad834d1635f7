use embassy_time::Ticker;
use power_core::activity::{ActivityMonitor, ActivityTimer, SampleOutcome};

use super::{ACTIVITY_FLAGS, DETECTION, LINK_STATUS, embassy_duration};
use crate::hw::DETECTION_TICK;

/// Periodic link sampler, run on the high-priority interrupt executor.
///
/// While the gate is stopped the ticker is dropped and the task parks, so no
/// detection alarm is armed during sleep.
#[embassy_executor::task]
pub async fn run() -> ! {
    let monitor = ActivityMonitor::new(&ACTIVITY_FLAGS, &DETECTION, &LINK_STATUS);
    let mut was_active = true;

    loop {
        DETECTION.wait_started().await;
        defmt::debug!("monitor: detection running");

        let mut ticker = Ticker::every(embassy_duration(DETECTION_TICK));
        loop {
            ticker.next().await;
            if !DETECTION.is_running() {
                break;
            }

            let active = matches!(monitor.on_tick(), SampleOutcome::Active { .. });
            if active != was_active {
                if active {
                    defmt::debug!("monitor: link active");
                } else {
                    defmt::debug!("monitor: suspend requested ({})", LINK_STATUS.load());
                }
                was_active = active;
            }
        }
        defmt::debug!("monitor: detection parked");
    }
}
