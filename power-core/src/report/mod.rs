//! Host-visible status messages.
//!
//! The status channel is best effort: a message is copied verbatim into a
//! fixed-size outbound frame, zero-padded, and handed to the transport with a
//! short write timeout. Messages that do not fit strictly inside the frame are
//! dropped rather than truncated.

use core::fmt;

/// Outbound frame capacity matching a full-speed bulk packet.
pub const DEFAULT_STATUS_FRAME_LEN: usize = 64;

/// Heartbeat message sent while the link stays active.
pub const ACTIVE_MESSAGE: &str = "USB is active\r\n";

/// Reason a status message was not loaded into the frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReportError {
    /// Message length is not strictly below the frame capacity.
    TooLong { len: usize, capacity: usize },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::TooLong { len, capacity } => {
                write!(f, "message of {len} bytes does not fit {capacity}-byte frame")
            }
        }
    }
}

/// Owned outbound frame reused across status writes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusBuffer<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> StatusBuffer<N> {
    pub const CAPACITY: usize = N;

    #[must_use]
    pub const fn new() -> Self {
        Self { bytes: [0; N] }
    }

    /// Clears the frame and copies `message` into it.
    ///
    /// On success the whole `N`-byte frame is returned, message first and
    /// zero padding after. A message of exactly `N` bytes is rejected; the
    /// frame is left untouched on rejection.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::TooLong`] when `message.len() >= N`.
    pub fn load(&mut self, message: &str) -> Result<&[u8; N], ReportError> {
        let len = message.len();
        if len >= N {
            return Err(ReportError::TooLong { len, capacity: N });
        }

        self.bytes.fill(0);
        self.bytes[..len].copy_from_slice(message.as_bytes());
        Ok(&self.bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }
}

impl<const N: usize> Default for StatusBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Prepares the heartbeat frame when the control loop decides to report.
#[derive(Clone, Debug)]
pub struct StatusReporter<const N: usize = DEFAULT_STATUS_FRAME_LEN> {
    buffer: StatusBuffer<N>,
    message: &'static str,
    sent: u32,
    dropped: u32,
}

impl<const N: usize> StatusReporter<N> {
    #[must_use]
    pub const fn new(message: &'static str) -> Self {
        Self {
            buffer: StatusBuffer::new(),
            message,
            sent: 0,
            dropped: 0,
        }
    }

    /// Loads the configured message into the outbound frame.
    ///
    /// # Errors
    ///
    /// Propagates [`ReportError::TooLong`] from [`StatusBuffer::load`]; the
    /// caller logs it and moves on.
    pub fn prepare(&mut self) -> Result<&[u8; N], ReportError> {
        match self.buffer.load(self.message) {
            Ok(frame) => {
                self.sent = self.sent.saturating_add(1);
                Ok(frame)
            }
            Err(err) => {
                self.dropped = self.dropped.saturating_add(1);
                Err(err)
            }
        }
    }

    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.message
    }

    /// Frames handed to the transport so far.
    #[must_use]
    pub const fn sent(&self) -> u32 {
        self.sent
    }

    /// Messages rejected for not fitting the frame.
    #[must_use]
    pub const fn dropped(&self) -> u32 {
        self.dropped
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new(ACTIVE_MESSAGE)
    }
}
