//! Composite link status as reported by the USB device controller.
//!
//! The controller exposes two independent bits: `configured` (the host has
//! selected a configuration) and `suspended` (the bus has gone quiet and the
//! device must draw suspend current). Activity detection only cares whether
//! the pair reads exactly "configured and not suspended"; every other
//! combination is treated as a request to drop into low power.

use core::fmt;

/// Snapshot of the link controller's composite state bits.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LinkStatus {
    pub configured: bool,
    pub suspended: bool,
}

impl LinkStatus {
    const CONFIGURED_BIT: u8 = 0x01;
    const SUSPENDED_BIT: u8 = 0x02;

    /// Link enumerated and carrying traffic.
    pub const ACTIVE: Self = Self {
        configured: true,
        suspended: false,
    };

    /// Link not enumerated (cable pulled, host not ready, reset in progress).
    pub const DETACHED: Self = Self {
        configured: false,
        suspended: false,
    };

    /// Link enumerated but placed in suspend by the host.
    pub const SUSPENDED: Self = Self {
        configured: true,
        suspended: true,
    };

    #[must_use]
    pub const fn new(configured: bool, suspended: bool) -> Self {
        Self {
            configured,
            suspended,
        }
    }

    /// Returns `true` only for the configured-and-not-suspended combination.
    #[must_use]
    pub const fn is_active(self) -> bool {
        self.configured && !self.suspended
    }

    /// Packs the status into a byte suitable for atomic storage.
    #[must_use]
    pub const fn to_bits(self) -> u8 {
        let mut bits = 0;
        if self.configured {
            bits |= Self::CONFIGURED_BIT;
        }
        if self.suspended {
            bits |= Self::SUSPENDED_BIT;
        }
        bits
    }

    /// Unpacks a status previously produced by [`LinkStatus::to_bits`].
    /// Unknown bits are ignored.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self {
            configured: bits & Self::CONFIGURED_BIT != 0,
            suspended: bits & Self::SUSPENDED_BIT != 0,
        }
    }
}

impl fmt::Display for LinkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.configured, self.suspended) {
            (true, false) => f.write_str("configured"),
            (true, true) => f.write_str("suspended"),
            (false, true) => f.write_str("unconfigured+suspended"),
            (false, false) => f.write_str("unconfigured"),
        }
    }
}

/// Source of the composite link status.
///
/// Implementations must be callable from the detection tick, so they may not
/// block.
pub trait LinkStatusSource {
    fn status(&self) -> LinkStatus;
}

impl<T: LinkStatusSource + ?Sized> LinkStatusSource for &T {
    fn status(&self) -> LinkStatus {
        (**self).status()
    }
}

/// Power state of the link as seen by the coordinator.
///
/// Derived from the shared flags and the control loop state; never stored.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkPowerState {
    Active,
    SuspendPending,
    Suspended,
    Resuming,
}

impl LinkPowerState {
    /// Derives the power state from the monitor flags and whether a suspend
    /// attempt is currently in progress.
    #[must_use]
    pub const fn derive(
        suspend_requested: bool,
        resume_detected: bool,
        attempting_suspend: bool,
    ) -> Self {
        match (attempting_suspend, suspend_requested, resume_detected) {
            (false, false, _) => LinkPowerState::Active,
            (false, true, _) => LinkPowerState::SuspendPending,
            (true, true, _) | (true, false, false) => LinkPowerState::Suspended,
            (true, false, true) => LinkPowerState::Resuming,
        }
    }
}

impl fmt::Display for LinkPowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LinkPowerState::Active => "active",
            LinkPowerState::SuspendPending => "suspend-pending",
            LinkPowerState::Suspended => "suspended",
            LinkPowerState::Resuming => "resuming",
        })
    }
}
