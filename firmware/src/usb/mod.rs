//! Single-interface CDC ACM device used for status heartbeats.
//!
//! The device exposes one CDC ACM port carrying the periodic status frame and
//! registers a bus event handler that keeps [`LinkStatusCell`] current, which
//! is all the activity monitor needs to decide between active and suspend.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use power_core::report::DEFAULT_STATUS_FRAME_LEN;

use crate::status::LinkStatusCell;

/// Full-speed bulk endpoint size; the status frame fills exactly one packet.
pub const MAX_PACKET_SIZE: u16 = 64;

const _: () = assert!(DEFAULT_STATUS_FRAME_LEN == MAX_PACKET_SIZE as usize);

#[cfg(target_os = "none")]
const CONTROL_BUFFER_LEN: usize = 64;
#[cfg(target_os = "none")]
const CONFIG_DESCRIPTOR_LEN: usize = 256;
#[cfg(target_os = "none")]
const BOS_DESCRIPTOR_LEN: usize = 256;
#[cfg(target_os = "none")]
const MSOS_DESCRIPTOR_LEN: usize = 256;

/// User-visible strings and identifiers advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: &'static str,
    pub product: &'static str,
    /// Unique serial number string descriptor (optional).
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            vendor_id: 0x1209,
            product_id: 0x0001,
            manufacturer: "USB Power Coordinator",
            product: "Link Activity Monitor",
            serial_number: None,
        }
    }
}

/// Forwards bus events into the shared link status.
pub struct LinkEventHandler {
    status: &'static LinkStatusCell,
}

impl LinkEventHandler {
    #[must_use]
    pub const fn new(status: &'static LinkStatusCell) -> Self {
        Self { status }
    }

    fn on_enabled(&self, enabled: bool) {
        if !enabled {
            self.status.record_reset();
        }
    }

    fn on_reset(&self) {
        self.status.record_reset();
    }

    fn on_configured(&self, configured: bool) {
        self.status.record_configured(configured);
    }

    fn on_suspended(&self, suspended: bool) {
        self.status.record_suspended(suspended);
    }
}

#[cfg(target_os = "none")]
impl embassy_usb::Handler for LinkEventHandler {
    fn enabled(&mut self, enabled: bool) {
        defmt::info!("usb: bus enabled={}", enabled);
        self.on_enabled(enabled);
    }

    fn reset(&mut self) {
        defmt::info!("usb: bus reset");
        self.on_reset();
    }

    fn configured(&mut self, configured: bool) {
        defmt::info!("usb: configured={}", configured);
        self.on_configured(configured);
    }

    fn suspended(&mut self, suspended: bool) {
        defmt::info!("usb: suspended={}", suspended);
        self.on_suspended(suspended);
    }
}

/// Backing storage for the Embassy USB builder and the CDC ACM class.
#[cfg(target_os = "none")]
pub struct UsbDeviceStorage {
    control_buf: [u8; CONTROL_BUFFER_LEN],
    config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
    bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
    msos_descriptor: [u8; MSOS_DESCRIPTOR_LEN],
    cdc_state: embassy_usb::class::cdc_acm::State<'static>,
    handler: LinkEventHandler,
}

#[cfg(target_os = "none")]
impl UsbDeviceStorage {
    #[must_use]
    pub fn new(status: &'static LinkStatusCell) -> Self {
        Self {
            control_buf: [0; CONTROL_BUFFER_LEN],
            config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
            bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
            msos_descriptor: [0; MSOS_DESCRIPTOR_LEN],
            cdc_state: embassy_usb::class::cdc_acm::State::new(),
            handler: LinkEventHandler::new(status),
        }
    }
}

/// Split handles for the status CDC ACM interface.
#[cfg(target_os = "none")]
pub struct StatusPort<D: embassy_usb::driver::Driver<'static>> {
    pub sender: embassy_usb::class::cdc_acm::Sender<'static, D>,
}

/// USB device plus the status port built on it.
#[cfg(target_os = "none")]
pub struct UsbStatusDevice<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    pub device: embassy_usb::UsbDevice<'static, D>,
    pub port: StatusPort<D>,
}

#[cfg(target_os = "none")]
impl<D> UsbStatusDevice<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    /// Builds the device with a single CDC ACM interface and the link event
    /// handler registered.
    pub fn new(
        driver: D,
        storage: &'static mut UsbDeviceStorage,
        strings: UsbDeviceStrings,
    ) -> Self {
        let mut config = embassy_usb::Config::new(strings.vendor_id, strings.product_id);
        config.manufacturer = Some(strings.manufacturer);
        config.product = Some(strings.product);
        config.serial_number = strings.serial_number;
        config.max_packet_size_0 = 64;
        config.max_power = 100;
        config.supports_remote_wakeup = false;

        let mut builder = embassy_usb::Builder::new(
            driver,
            config,
            &mut storage.config_descriptor,
            &mut storage.bos_descriptor,
            &mut storage.msos_descriptor,
            &mut storage.control_buf,
        );
        builder.handler(&mut storage.handler);

        let class = embassy_usb::class::cdc_acm::CdcAcmClass::new(
            &mut builder,
            &mut storage.cdc_state,
            MAX_PACKET_SIZE,
        );
        let (sender, _receiver) = class.split();

        let device = builder.build();

        Self {
            device,
            port: StatusPort { sender },
        }
    }
}
