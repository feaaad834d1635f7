#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared link status storage for the firmware target.
//!
//! The USB device handler runs inside the stack's task and records bus events
//! here; the detection ticker and the control loop read the composite
//! status without borrowing the USB device.

use portable_atomic::{AtomicU8, Ordering};
use power_core::link::{LinkStatus, LinkStatusSource};

/// Composite link status bits updated from USB bus events.
pub struct LinkStatusCell {
    bits: AtomicU8,
}

impl LinkStatusCell {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(LinkStatus::DETACHED.to_bits()),
        }
    }

    #[must_use]
    pub fn load(&self) -> LinkStatus {
        LinkStatus::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Host selected (or cleared) a configuration.
    pub fn record_configured(&self, configured: bool) {
        self.update(|status| LinkStatus {
            configured,
            ..status
        });
    }

    /// Bus entered or left suspend.
    pub fn record_suspended(&self, suspended: bool) {
        self.update(|status| LinkStatus {
            suspended,
            ..status
        });
    }

    /// Bus reset or disconnect: the host must enumerate again.
    pub fn record_reset(&self) {
        self.bits
            .store(LinkStatus::DETACHED.to_bits(), Ordering::Release);
    }

    fn update(&self, apply: impl Fn(LinkStatus) -> LinkStatus) {
        let _ = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some(apply(LinkStatus::from_bits(bits)).to_bits())
            });
    }
}

impl Default for LinkStatusCell {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkStatusSource for LinkStatusCell {
    fn status(&self) -> LinkStatus {
        self.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_detached() {
        let cell = LinkStatusCell::new();
        assert_eq!(cell.status(), LinkStatus::DETACHED);
        assert!(!cell.status().is_active());
    }

    #[test]
    fn configured_and_suspended_bits_are_independent() {
        let cell = LinkStatusCell::new();

        cell.record_configured(true);
        assert_eq!(cell.status(), LinkStatus::ACTIVE);

        cell.record_suspended(true);
        assert_eq!(cell.status(), LinkStatus::SUSPENDED);

        cell.record_suspended(false);
        assert!(cell.status().is_active());

        cell.record_configured(false);
        assert_eq!(cell.status(), LinkStatus::DETACHED);
    }

    #[test]
    fn reset_clears_both_bits() {
        let cell = LinkStatusCell::new();
        cell.record_configured(true);
        cell.record_suspended(true);

        cell.record_reset();
        assert_eq!(cell.status(), LinkStatus::DETACHED);
    }
}
