//! Power event recorder for the firmware target.
//!
//! Wraps the shared [`PowerEventLog`] with Embassy timestamps and mirrors each
//! event to defmt (or stdout on host builds) as it is recorded.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use embassy_time::Instant;
use power_core::telemetry::{EventId, PowerEvent, PowerEventLog, PowerRecord, TelemetryInstant};

/// Embassy monotonic instant usable as a telemetry timestamp.
#[derive(Copy, Clone, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[must_use]
    pub fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> core::time::Duration {
        let micros = self.0.as_micros().saturating_sub(earlier.0.as_micros());
        core::time::Duration::from_micros(micros)
    }
}

/// Records power events and logs them as they happen.
pub struct PowerRecorder {
    log: PowerEventLog<FirmwareInstant>,
}

impl PowerRecorder {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            log: PowerEventLog::new(),
        }
    }

    pub fn record(&mut self, event: PowerEvent, now: Instant) -> EventId {
        let id = self.log.record(event, FirmwareInstant::from(now));
        if let Some(record) = self.log.latest() {
            emit_log(record);
        }
        id
    }

    #[must_use]
    pub fn latest(&self) -> Option<&PowerRecord<FirmwareInstant>> {
        self.log.latest()
    }

    #[must_use]
    pub fn log(&self) -> &PowerEventLog<FirmwareInstant> {
        &self.log
    }
}

impl Default for PowerRecorder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "none")]
fn emit_log(record: &PowerRecord<FirmwareInstant>) {
    let timestamp_ms = record.timestamp.into_embassy().as_millis();
    match record.since_sleep {
        Some(elapsed) => defmt::info!(
            "power: #{} {} t={}ms since-sleep={}ms",
            record.id,
            record.event,
            timestamp_ms,
            elapsed.as_millis()
        ),
        None => defmt::info!(
            "power: #{} {} t={}ms",
            record.id,
            record.event,
            timestamp_ms
        ),
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(record: &PowerRecord<FirmwareInstant>) {
    let timestamp_ms = record.timestamp.into_embassy().as_millis();
    match record.since_sleep {
        Some(elapsed) => println!(
            "power: #{} {} t={}ms since-sleep={}ms",
            record.id,
            record.event,
            timestamp_ms,
            elapsed.as_millis()
        ),
        None => println!("power: #{} {} t={}ms", record.id, record.event, timestamp_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(value: u64) -> Instant {
        Instant::from_millis(value)
    }

    #[test]
    fn tracks_elapsed_since_sleep() {
        let mut recorder = PowerRecorder::new();

        recorder.record(PowerEvent::SuspendRequested, millis(250));
        recorder.record(PowerEvent::SleepEntered, millis(1_250));
        let id = recorder.record(PowerEvent::Resumed, millis(1_600));
        assert_eq!(id, 2);

        let latest = recorder.latest().copied().expect("record missing");
        assert_eq!(latest.event, PowerEvent::Resumed);
        assert_eq!(
            latest.since_sleep.map(|elapsed| elapsed.as_millis()),
            Some(350)
        );
    }

    #[test]
    fn instant_difference_saturates() {
        let early = FirmwareInstant::from(millis(10));
        let late = FirmwareInstant::from(millis(40));

        assert_eq!(late.saturating_duration_since(early).as_millis(), 30);
        assert_eq!(early.saturating_duration_since(late).as_millis(), 0);
    }
}
