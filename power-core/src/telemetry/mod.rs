//! Power event history shared by firmware and host targets.
//!
//! Every decision the control loop acts on is recorded into a fixed-capacity
//! ring so diagnostics can show the recent sleep/wake history without any
//! allocation. Nothing here survives a restart.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::transition::SleepError;

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Total number of power events retained in memory.
pub const POWER_LOG_CAPACITY: usize = 32;

/// Trait implemented by monotonic instant wrappers used for event tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Power-related events observed by the control loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerEvent {
    /// The monitor asked for low power and the loop committed to an attempt.
    SuspendRequested,
    /// The sleep primitive was entered and returned.
    SleepEntered,
    /// A callback vetoed the attempt.
    SleepDenied(SleepError),
    /// The host resumed the link after a sleep attempt.
    Resumed,
    /// A heartbeat frame was handed to the transport.
    StatusReported { count: u32 },
    /// A heartbeat frame could not be built or written.
    StatusDropped,
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerEvent::SuspendRequested => f.write_str("suspend-requested"),
            PowerEvent::SleepEntered => f.write_str("sleep-entered"),
            PowerEvent::SleepDenied(err) => write!(f, "sleep-denied ({err})"),
            PowerEvent::Resumed => f.write_str("resumed"),
            PowerEvent::StatusReported { count } => write!(f, "status-reported count={count}"),
            PowerEvent::StatusDropped => f.write_str("status-dropped"),
        }
    }
}

/// Power event stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PowerRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: PowerEvent,
    /// Time since the most recent sleep entry, when one has happened.
    pub since_sleep: Option<Duration>,
}

/// Records power events into a fixed-size ring buffer.
pub struct PowerEventLog<TInstant, const CAPACITY: usize = POWER_LOG_CAPACITY>
where
    TInstant: Copy,
{
    ring: HistoryBuf<PowerRecord<TInstant>, CAPACITY>,
    last_sleep_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> PowerEventLog<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new log with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_sleep_at: None,
            next_event_id: 0,
        }
    }

    /// Records `event` at `timestamp` and returns its identifier.
    pub fn record(&mut self, event: PowerEvent, timestamp: TInstant) -> EventId {
        let since_sleep = self
            .last_sleep_at
            .map(|sleep_at| timestamp.saturating_duration_since(sleep_at));
        if event == PowerEvent::SleepEntered {
            self.last_sleep_at = Some(timestamp);
        }

        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(PowerRecord {
            id,
            timestamp,
            event,
            since_sleep,
        });
        id
    }

    /// Returns an iterator over the recorded events in chronological order.
    #[must_use]
    pub fn oldest_first(&self) -> OldestOrdered<'_, PowerRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent record, if available.
    #[must_use]
    pub fn latest(&self) -> Option<&PowerRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Counts retained records matching `predicate`.
    #[must_use]
    pub fn count_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&PowerEvent) -> bool,
    {
        self.ring
            .oldest_ordered()
            .filter(|record| predicate(&record.event))
            .count()
    }
}

impl<TInstant, const CAPACITY: usize> Default for PowerEventLog<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
