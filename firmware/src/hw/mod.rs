//! MCU bindings for the rail engine's hardware seams.
//!
//! The engine only sees [`RailGpio`] and [`RailDelay`]; this module maps the
//! protocol pin numbers onto concrete output pins and keeps a shared snapshot
//! of the sense inputs, whose EXTI handles are owned by the sense task.

use embassy_stm32::Peri;
use embassy_stm32::exti::ExtiInput;
use embassy_stm32::flash::{Blocking, Flash};
use embassy_stm32::gpio::{Level, Output};
use embassy_time::Duration;
use heapless::Vec;
use portable_atomic::{AtomicU8, AtomicU32, Ordering};

use enclosure_core::power::{RailDelay, RailGpio};
use enclosure_core::protocol::SystemControl;
use enclosure_core::rails::{
    EXT_POWER_SENSE, LineLevel, NVME_PRESENCE_SENSE, PinId, SATA1_PRESENCE_SENSE,
    SATA2_PRESENCE_SENSE,
};

use crate::store::{SNAPSHOT_LEN, SettingsStore};

/// Upper bound on driven rail outputs.
pub const MAX_OUTPUTS: usize = 8;

/// Last-observed levels of the sense inputs.
///
/// The sense task owns the EXTI handles and records every edge here before
/// enqueueing the event, so the dispatcher's read through [`RailGpio`] sees
/// the level that caused the edge even if the queue briefly backs up.
pub struct SenseCache {
    bits: AtomicU8,
}

impl SenseCache {
    #[allow(clippy::new_without_default)]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    const fn bit_for(pin: PinId) -> Option<u8> {
        match pin {
            EXT_POWER_SENSE => Some(0),
            SATA1_PRESENCE_SENSE => Some(1),
            SATA2_PRESENCE_SENSE => Some(2),
            NVME_PRESENCE_SENSE => Some(3),
            _ => None,
        }
    }

    /// Records the observed level of a sense pin.
    pub fn record(&self, pin: PinId, level: LineLevel) {
        let Some(bit) = Self::bit_for(pin) else {
            return;
        };
        if level.is_high() {
            self.bits.fetch_or(1 << bit, Ordering::Relaxed);
        } else {
            self.bits.fetch_and(!(1 << bit), Ordering::Relaxed);
        }
    }

    /// Returns the last-observed level of a sense pin.
    #[must_use]
    pub fn level(&self, pin: PinId) -> Option<LineLevel> {
        let bit = Self::bit_for(pin)?;
        Some(LineLevel::from_u8(
            (self.bits.load(Ordering::Relaxed) >> bit) & 1,
        ))
    }
}

/// Samples the current level of an EXTI-wrapped input.
#[must_use]
pub fn sampled_level(input: &ExtiInput<'static>) -> LineLevel {
    if input.is_high() {
        LineLevel::High
    } else {
        LineLevel::Low
    }
}

/// GPIO bank presented to the rail engine.
///
/// Outputs are looked up by protocol pin number; reads of unknown pins fall
/// back to the sense cache and then to low. Writes to pins outside the rail
/// bank are ignored.
pub struct EnclosureGpio {
    outputs: Vec<(PinId, Output<'static>), MAX_OUTPUTS>,
    sense: &'static SenseCache,
}

impl EnclosureGpio {
    #[must_use]
    pub fn new(
        outputs: Vec<(PinId, Output<'static>), MAX_OUTPUTS>,
        sense: &'static SenseCache,
    ) -> Self {
        Self { outputs, sense }
    }
}

impl RailGpio for EnclosureGpio {
    fn read_level(&mut self, pin: PinId) -> LineLevel {
        if let Some((_, output)) = self.outputs.iter().find(|(entry, _)| *entry == pin) {
            return if output.is_set_high() {
                LineLevel::High
            } else {
                LineLevel::Low
            };
        }
        self.sense.level(pin).unwrap_or(LineLevel::Low)
    }

    fn write_level(&mut self, pin: PinId, level: LineLevel) {
        if let Some((_, output)) = self.outputs.iter_mut().find(|(entry, _)| *entry == pin) {
            output.set_level(match level {
                LineLevel::High => Level::High,
                LineLevel::Low => Level::Low,
            });
        }
    }
}

/// Seconds-scale blocking delay for staggered power-up.
///
/// Runs in task context under the engine lock; staggering is allowed to stall
/// command handling while a drive rail spins up.
pub struct BlockingRailDelay;

impl RailDelay for BlockingRailDelay {
    fn delay_seconds(&mut self, seconds: u8) {
        embassy_time::block_for(Duration::from_secs(u64::from(seconds)));
    }
}

const SCB_SCR_SLEEPDEEP: u32 = 1 << 2;

/// Arms or disarms deep sleep (stop mode) for the executor's idle WFI.
pub fn set_deep_sleep(enabled: bool) {
    unsafe {
        let scb = &*cortex_m::peripheral::SCB::PTR;
        if enabled {
            scb.scr.modify(|scr| scr | SCB_SCR_SLEEPDEEP);
        } else {
            scb.scr.modify(|scr| scr & !SCB_SCR_SLEEPDEEP);
        }
    }
}

/// Magic value that survives a soft reset and diverts boot into the system
/// bootloader.
const REFLASH_MAGIC: u32 = 0x5EC0_FA5D;

#[unsafe(link_section = ".uninit.REFLASH_REQUEST")]
static REFLASH_REQUEST: AtomicU32 = AtomicU32::new(0);

/// System-memory bootloader base on the STM32G0 series.
pub const SYSTEM_BOOTLOADER_BASE: usize = 0x1FFF_0000;

/// Consumes a pending reflash request, returning `true` at most once per arm.
pub fn take_reflash_request() -> bool {
    REFLASH_REQUEST.swap(0, Ordering::SeqCst) == REFLASH_MAGIC
}

/// Restart and reflash bound to the MCU reset machinery.
pub struct McuSystemControl;

impl SystemControl for McuSystemControl {
    fn request_restart(&mut self) {
        cortex_m::peripheral::SCB::sys_reset();
    }

    fn request_reflash(&mut self) {
        REFLASH_REQUEST.store(REFLASH_MAGIC, Ordering::SeqCst);
        cortex_m::peripheral::SCB::sys_reset();
    }
}

/// Byte offset of the settings page: the last 2 KiB page of a 512 KiB part.
const SETTINGS_FLASH_OFFSET: u32 = 0x7F800;
const SETTINGS_FLASH_END: u32 = SETTINGS_FLASH_OFFSET + 2048;

/// Flash-page persistence for the settings snapshot.
pub struct SettingsFlash {
    flash: Flash<'static, Blocking>,
}

impl SettingsFlash {
    pub fn new(flash: Peri<'static, embassy_stm32::peripherals::FLASH>) -> Self {
        Self {
            flash: Flash::new_blocking(flash),
        }
    }

    /// Loads the persisted settings, starting empty when the page is blank
    /// or unreadable.
    pub fn load(&mut self) -> SettingsStore {
        let mut buf = [0u8; SNAPSHOT_LEN];
        if self
            .flash
            .blocking_read(SETTINGS_FLASH_OFFSET, &mut buf)
            .is_err()
        {
            defmt::warn!("flash: settings read failed, starting empty");
            return SettingsStore::new();
        }
        let store = SettingsStore::load(&buf);
        defmt::info!("flash: loaded {} settings", store.len());
        store
    }

    /// Erases the settings page and writes a fresh snapshot.
    pub fn commit(&mut self, store: &SettingsStore) {
        let mut buf = [0u8; SNAPSHOT_LEN];
        store.snapshot(&mut buf);

        if self
            .flash
            .blocking_erase(SETTINGS_FLASH_OFFSET, SETTINGS_FLASH_END)
            .is_err()
        {
            defmt::warn!("flash: settings erase failed");
            return;
        }
        if self
            .flash
            .blocking_write(SETTINGS_FLASH_OFFSET, &buf)
            .is_err()
        {
            defmt::warn!("flash: settings write failed");
        }
    }
}
