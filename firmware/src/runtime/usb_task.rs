use embassy_futures::join::join;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_time::with_timeout;
use embassy_usb::driver::EndpointError;
use heapless::Vec;
use power_core::control::LoopConfig;
use power_core::report::DEFAULT_STATUS_FRAME_LEN;
use static_cell::StaticCell;

use super::{LINK_STATUS, STATUS_FRAMES, STATUS_WRITER, embassy_duration};
use crate::usb::{self, UsbDeviceStrings};

/// One zero-padded status packet.
pub type StatusFrame = Vec<u8, DEFAULT_STATUS_FRAME_LEN>;

static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new(&LINK_STATUS));
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let usb::UsbStatusDevice { mut device, port } =
        usb::UsbStatusDevice::new(driver, storage, UsbDeviceStrings::default());

    join(device.run(), write_status(port)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn write_status<D>(mut port: usb::StatusPort<D>) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let frames = STATUS_FRAMES.receiver();
    let timeout = embassy_duration(LoopConfig::new().write_timeout);

    loop {
        port.sender.wait_connection().await;
        defmt::info!("usb: status interface connected");

        loop {
            let frame = frames.receive().await;
            if STATUS_WRITER.is_paused() {
                defmt::debug!("usb: writer paused, frame skipped");
                continue;
            }

            match with_timeout(timeout, port.sender.write_packet(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: status interface disabled");
                    break;
                }
                Ok(Err(_)) => defmt::warn!("usb: status write error"),
                Err(_) => defmt::warn!("usb: status write timed out"),
            }
        }
    }
}
