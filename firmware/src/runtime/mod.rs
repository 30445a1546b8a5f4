use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::gpio::{Level, Output, Pull, Speed};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use heapless::Vec;
use portable_atomic::AtomicBool;
use static_cell::StaticCell;

use enclosure_core::hotplug::{HotplugEvent, HotplugHandler, HotplugRegistry};
use enclosure_core::power::PowerRailEngine;
use enclosure_core::protocol::Report;
use enclosure_core::rails::{
    EXT_POWER_SENSE, NVME_PRESENCE_SENSE, PinId, RailId, SATA1_PRESENCE_SENSE,
    SATA2_PRESENCE_SENSE, rail_by_id,
};

use crate::hw::{self, BlockingRailDelay, EnclosureGpio, MAX_OUTPUTS, SenseCache, SettingsFlash};
use crate::store::SettingsStore;
use crate::usb;

mod alive_task;
mod hotplug_task;
mod persist_task;
mod presence_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type FirmwareEngine = PowerRailEngine<SettingsStore, EnclosureGpio, BlockingRailDelay>;
pub(super) type EngineMutex = Mutex<ThreadModeRawMutex, FirmwareEngine>;

pub(super) static HOTPLUG_EVENTS: Channel<ThreadModeRawMutex, HotplugEvent, 8> = Channel::new();
pub(super) static LIFECYCLE_EVENTS: usb::LifecycleQueue = Channel::new();
pub(super) static OUTBOUND_REPORTS: Channel<ThreadModeRawMutex, Report, 4> = Channel::new();
pub(super) static HEARTBEAT_ENABLED: AtomicBool = AtomicBool::new(true);
pub(super) static COMMAND_IN_FLIGHT: AtomicBool = AtomicBool::new(false);

static SENSE_CACHE: SenseCache = SenseCache::new();
static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();
static ENGINE: StaticCell<EngineMutex> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    if hw::take_reflash_request() {
        unsafe { cortex_m::asm::bootload(hw::SYSTEM_BOOTLOADER_BASE as *const u32) };
    }

    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA2,
        PA3,
        PA4,
        PA5,
        PA6,
        PB0,
        PB1,
        PB2,
        PB3,
        EXTI0,
        EXTI1,
        EXTI2,
        EXTI3,
        FLASH,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    // All rails come up low; restore below raises the persisted ones.
    let mut outputs: Vec<(PinId, Output<'static>), MAX_OUTPUTS> = Vec::new();
    push_output(&mut outputs, RailId::Hub, Output::new(PA0, Level::Low, Speed::Low));
    push_output(&mut outputs, RailId::Sata1, Output::new(PA1, Level::Low, Speed::Low));
    push_output(&mut outputs, RailId::Indicator, Output::new(PA2, Level::Low, Speed::Low));
    push_output(&mut outputs, RailId::Fan, Output::new(PA3, Level::Low, Speed::Low));
    push_output(&mut outputs, RailId::Mux, Output::new(PA4, Level::Low, Speed::Low));
    push_output(&mut outputs, RailId::Sata2, Output::new(PA5, Level::Low, Speed::Low));
    push_output(&mut outputs, RailId::Nvme, Output::new(PA6, Level::Low, Speed::Low));

    let ext_sense = ExtiInput::new(PB0, EXTI0, Pull::Down);
    let sata1_sense = ExtiInput::new(PB1, EXTI1, Pull::Down);
    let sata2_sense = ExtiInput::new(PB2, EXTI2, Pull::Down);
    let nvme_sense = ExtiInput::new(PB3, EXTI3, Pull::Down);

    // Seed the cache before the first restore; the external-mode key
    // selection reads the supply sense through it.
    SENSE_CACHE.record(EXT_POWER_SENSE, hw::sampled_level(&ext_sense));
    SENSE_CACHE.record(SATA1_PRESENCE_SENSE, hw::sampled_level(&sata1_sense));
    SENSE_CACHE.record(SATA2_PRESENCE_SENSE, hw::sampled_level(&sata2_sense));
    SENSE_CACHE.record(NVME_PRESENCE_SENSE, hw::sampled_level(&nvme_sense));

    let mut flash = SettingsFlash::new(FLASH);
    let store = flash.load();
    let gpio = EnclosureGpio::new(outputs, &SENSE_CACHE);

    let mut engine = PowerRailEngine::new(store, gpio, BlockingRailDelay);
    engine.restore_all();
    defmt::info!("boot: rails restored");

    let engine: &'static EngineMutex = ENGINE.init(Mutex::new(engine));

    let mut registry = HotplugRegistry::new();
    let bindings = [
        (
            SATA1_PRESENCE_SENSE,
            HotplugHandler::DrivePresence { rail: RailId::Sata1 },
        ),
        (
            SATA2_PRESENCE_SENSE,
            HotplugHandler::DrivePresence { rail: RailId::Sata2 },
        ),
        (
            NVME_PRESENCE_SENSE,
            HotplugHandler::RailFollower { rail: RailId::Nvme },
        ),
        (EXT_POWER_SENSE, HotplugHandler::BusPower),
    ];
    for (pin, handler) in bindings {
        registry
            .register(pin, handler)
            .expect("hot-plug registry sized for the sense pins");
    }

    spawner
        .spawn(usb_task::run(USB, PA12, PA11, engine))
        .expect("failed to spawn USB task");
    spawner
        .spawn(hotplug_task::sense(
            ext_sense,
            sata1_sense,
            sata2_sense,
            nvme_sense,
        ))
        .expect("failed to spawn hot-plug sense task");
    spawner
        .spawn(hotplug_task::dispatch(registry, engine))
        .expect("failed to spawn hot-plug dispatch task");
    spawner
        .spawn(presence_task::run(engine))
        .expect("failed to spawn presence task");
    spawner
        .spawn(persist_task::run(flash, engine))
        .expect("failed to spawn persist task");
    spawner
        .spawn(alive_task::run())
        .expect("failed to spawn alive task");

    core::future::pending::<()>().await;
}

fn push_output(
    outputs: &mut Vec<(PinId, Output<'static>), MAX_OUTPUTS>,
    rail: RailId,
    output: Output<'static>,
) {
    // MAX_OUTPUTS covers the full rail catalog.
    let _ = outputs.push((rail_by_id(rail).pin, output));
}
