//! USB HID transport for the command protocol.
//!
//! The device exposes a single vendor-defined HID interface moving fixed
//! 64-byte reports in both directions. Bus lifecycle callbacks are translated
//! into [`UsbLifecycleEvent`]s and forwarded to the presence task through a
//! fixed-capacity queue.

use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use embassy_usb::class::hid;
use embassy_usb::{Builder, Config, Handler, UsbDevice};

use enclosure_core::presence::UsbLifecycleEvent;
use enclosure_core::protocol::REPORT_LEN;

pub const MAX_PACKET_SIZE: u16 = 64;

const CONTROL_BUFFER_LEN: usize = 64;
const CONFIG_DESCRIPTOR_LEN: usize = 256;
const BOS_DESCRIPTOR_LEN: usize = 256;
const MSOS_DESCRIPTOR_LEN: usize = 256;

/// Depth of the lifecycle event queue feeding the presence task.
pub const LIFECYCLE_QUEUE_DEPTH: usize = 4;

/// Queue carrying bus lifecycle transitions out of the USB stack.
pub type LifecycleQueue = Channel<ThreadModeRawMutex, UsbLifecycleEvent, LIFECYCLE_QUEUE_DEPTH>;

/// Vendor-defined report descriptor: one 64-byte IN and one 64-byte OUT
/// report, no report IDs.
const REPORT_DESCRIPTOR: [u8; 25] = [
    0x06, 0x00, 0xFF, // Usage Page (Vendor Defined)
    0x09, 0x01, // Usage (Vendor Usage 1)
    0xA1, 0x01, // Collection (Application)
    0x15, 0x00, //   Logical Minimum (0)
    0x26, 0xFF, 0x00, //   Logical Maximum (255)
    0x75, 0x08, //   Report Size (8)
    0x95, 0x40, //   Report Count (64)
    0x09, 0x01, //   Usage (Vendor Usage 1)
    0x81, 0x02, //   Input (Data, Variable, Absolute)
    0x09, 0x01, //   Usage (Vendor Usage 1)
    0x91, 0x02, //   Output (Data, Variable, Absolute)
    0xC0, // End Collection
];

/// User-visible strings advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "Bay Systems",
            product: "Multi-Bay Enclosure Controller",
            serial_number: None,
        }
    }
}

/// Translates device-level USB callbacks into lifecycle events.
struct LifecycleNotifier {
    events: &'static LifecycleQueue,
}

impl LifecycleNotifier {
    fn publish(&self, event: UsbLifecycleEvent) {
        if self.events.try_send(event).is_err() {
            defmt::warn!("usb: lifecycle queue full, dropping transition");
        }
    }
}

impl Handler for LifecycleNotifier {
    fn reset(&mut self) {
        self.publish(UsbLifecycleEvent::Reset);
    }

    fn configured(&mut self, configured: bool) {
        self.publish(if configured {
            UsbLifecycleEvent::Mount
        } else {
            UsbLifecycleEvent::Unmount
        });
    }

    fn suspended(&mut self, suspended: bool) {
        self.publish(if suspended {
            UsbLifecycleEvent::Suspend
        } else {
            UsbLifecycleEvent::Resume
        });
    }
}

/// Backing storage for the Embassy USB builder and the HID class.
pub struct UsbDeviceStorage {
    control_buf: [u8; CONTROL_BUFFER_LEN],
    config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
    bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
    msos_descriptor: [u8; MSOS_DESCRIPTOR_LEN],
    hid_state: hid::State<'static>,
    notifier: LifecycleNotifier,
}

impl UsbDeviceStorage {
    /// Creates a fresh storage bundle wired to the lifecycle queue.
    pub fn new(events: &'static LifecycleQueue) -> Self {
        Self {
            control_buf: [0; CONTROL_BUFFER_LEN],
            config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
            bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
            msos_descriptor: [0; MSOS_DESCRIPTOR_LEN],
            hid_state: hid::State::new(),
            notifier: LifecycleNotifier { events },
        }
    }
}

/// The built USB device plus the split HID report pipes.
pub struct EnclosureUsb<D: embassy_usb::driver::Driver<'static>> {
    pub device: UsbDevice<'static, D>,
    pub reader: hid::HidReader<'static, D, REPORT_LEN>,
    pub writer: hid::HidWriter<'static, D, REPORT_LEN>,
}

impl<D> EnclosureUsb<D>
where
    D: embassy_usb::driver::Driver<'static>,
{
    /// Builds the HID device over the given driver.
    pub fn new(driver: D, storage: &'static mut UsbDeviceStorage, strings: UsbDeviceStrings) -> Self {
        let mut config = Config::new(0x1209, 0x0002);
        config.manufacturer = Some(strings.manufacturer);
        config.product = Some(strings.product);
        config.serial_number = strings.serial_number;
        config.max_packet_size_0 = 64;
        config.max_power = 250;
        config.supports_remote_wakeup = true;

        let mut builder = Builder::new(
            driver,
            config,
            &mut storage.config_descriptor,
            &mut storage.bos_descriptor,
            &mut storage.msos_descriptor,
            &mut storage.control_buf,
        );
        builder.handler(&mut storage.notifier);

        let hid_config = hid::Config {
            report_descriptor: &REPORT_DESCRIPTOR,
            request_handler: None,
            poll_ms: 10,
            max_packet_size: MAX_PACKET_SIZE,
        };
        let class = hid::HidReaderWriter::<_, REPORT_LEN, REPORT_LEN>::new(
            &mut builder,
            &mut storage.hid_state,
            hid_config,
        );
        let (reader, writer) = class.split();

        let device = builder.build();

        Self {
            device,
            reader,
            writer,
        }
    }
}
