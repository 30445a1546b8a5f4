use embassy_futures::join::join3;
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_time::Timer;
use embassy_usb::class::hid::{HidReader, HidWriter, ReadError};
use embassy_usb::driver::EndpointError;
use portable_atomic::Ordering;

use enclosure_core::protocol::{self, REPORT_LEN};

use super::{COMMAND_IN_FLIGHT, EngineMutex, LIFECYCLE_EVENTS, OUTBOUND_REPORTS, USB_STORAGE};
use crate::hw::McuSystemControl;
use crate::usb;

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
    engine: &'static EngineMutex,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new(&LIFECYCLE_EVENTS));
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let usb::EnclosureUsb {
        mut device,
        reader,
        writer,
    } = usb::EnclosureUsb::new(driver, storage, usb::UsbDeviceStrings::default());

    join3(device.run(), read_reports(reader, engine), write_reports(writer)).await;
    loop {
        core::future::pending::<()>().await;
    }
}

/// Verifies, decodes, and executes inbound reports.
///
/// Frames that fail authentication are dropped without any reply. The
/// keepalive pause flag wraps every non-ping round-trip so the host can tell
/// command responses from heartbeat traffic.
async fn read_reports<D>(
    mut reader: HidReader<'static, D, REPORT_LEN>,
    engine: &'static EngineMutex,
) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    let mut buf = [0u8; REPORT_LEN];
    loop {
        match reader.read(&mut buf).await {
            Ok(len) => {
                let Some(request) = protocol::Request::parse(&buf[..len]) else {
                    defmt::warn!("usb: rejecting unauthenticated report len={}", len);
                    continue;
                };

                if !request.is_ping() {
                    COMMAND_IN_FLIGHT.store(true, Ordering::Relaxed);
                }

                let response = {
                    let mut engine = engine.lock().await;
                    let mut control = McuSystemControl;
                    protocol::execute(request, &mut engine, &mut control)
                };

                if let Some(report) = response {
                    OUTBOUND_REPORTS.send(report).await;
                }

                // Cleared only once the response is queued, so no heartbeat
                // can slot in ahead of it.
                COMMAND_IN_FLIGHT.store(false, Ordering::Relaxed);
            }
            Err(ReadError::Disabled) => {
                // Endpoint comes back when the host reconfigures us.
                Timer::after_millis(20).await;
            }
            Err(ReadError::BufferOverflow | ReadError::Sync(_)) => {
                defmt::warn!("usb: report read error");
            }
        }
    }
}

/// Drains the outbound queue into IN reports.
async fn write_reports<D>(mut writer: HidWriter<'static, D, REPORT_LEN>) -> !
where
    D: embassy_usb::driver::Driver<'static>,
{
    loop {
        let report = OUTBOUND_REPORTS.receive().await;
        match writer.write(&report).await {
            Ok(()) => {}
            Err(EndpointError::Disabled) => {
                defmt::warn!("usb: dropping report, endpoint disabled");
            }
            Err(EndpointError::BufferOverflow) => {
                defmt::warn!("usb: outbound report overflow");
            }
        }
    }
}
