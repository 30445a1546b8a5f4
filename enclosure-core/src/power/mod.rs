//! Power-rail persistence and restore engine.
//!
//! [`PowerRailEngine`] is the single chokepoint for rail state: it owns the
//! injected GPIO bank, the settings store, and the staggered-delay provider,
//! and every component (command dispatch, hot-plug handlers, the presence
//! task) mutates rails through it. Serializing access to one engine value is
//! therefore enough to make hot-plug and host-command writers race-free; the
//! firmware keeps the engine behind a single mutex shared by both contexts.

use crate::config::{ConfigStore, EXT_GPIO_PREFIX, GPIO_PREFIX, GlobalSetting, key};
use crate::rails::{
    ALL_RAILS, DelayClass, EXT_POWER_SENSE, EnclosureMode, LineLevel, PinId, Rail,
};

/// Abstraction over the raw GPIO capability consumed by the engine.
pub trait RailGpio {
    /// Samples the current level of a pin (input or driven output).
    fn read_level(&mut self, pin: PinId) -> LineLevel;

    /// Drives an output pin to the requested level.
    fn write_level(&mut self, pin: PinId, level: LineLevel);
}

/// Blocking seconds-scale delay used for staggered power-up.
///
/// Implementations run in task context only; the hot-plug ISR path never
/// reaches the engine directly.
pub trait RailDelay {
    fn delay_seconds(&mut self, seconds: u8);
}

/// Delay provider that returns immediately, for hosts without a clock.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopRailDelay;

impl RailDelay for NoopRailDelay {
    fn delay_seconds(&mut self, _seconds: u8) {}
}

/// Computes and applies the desired level for each managed rail.
pub struct PowerRailEngine<S, G, D> {
    store: S,
    gpio: G,
    delay: D,
}

impl<S, G, D> PowerRailEngine<S, G, D>
where
    S: ConfigStore,
    G: RailGpio,
    D: RailDelay,
{
    /// Creates an engine around the injected store, GPIO bank, and delay.
    #[must_use]
    pub fn new(store: S, gpio: G, delay: D) -> Self {
        Self { store, gpio, delay }
    }

    /// Accesses the underlying settings store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutably accesses the underlying settings store.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Accesses the underlying GPIO bank.
    #[must_use]
    pub fn gpio(&self) -> &G {
        &self.gpio
    }

    /// Mutably accesses the underlying GPIO bank.
    pub fn gpio_mut(&mut self) -> &mut G {
        &mut self.gpio
    }

    /// Accesses the underlying delay provider.
    #[must_use]
    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Applies the persisted level to every managed rail, in catalog order.
    pub fn restore_all(&mut self) {
        for rail in &ALL_RAILS {
            self.restore(rail);
        }
    }

    /// Restores one rail from its governing persisted key and returns the
    /// level that was applied.
    ///
    /// The external-mode shadow key is consulted only when the rail has one,
    /// the persisted enclosure mode is external, and the supply-present sense
    /// line actually reads high. A missing key read-repairs to 0 and forces
    /// the line low. A persisted 1 on a staggered rail blocks the calling
    /// task for the persisted power-on delay before the pin goes high.
    pub fn restore(&mut self, rail: &Rail) -> LineLevel {
        let key = self.restore_key(rail);
        let level = LineLevel::from_u8(self.store.read_or_init(&key, 0));

        if level.is_high() && rail.delay_class == DelayClass::Staggered {
            let seconds = self.setting(GlobalSetting::PowerOnDelay);
            self.delay.delay_seconds(seconds);
        }

        self.gpio.write_level(rail.pin, level);
        level
    }

    fn restore_key(&mut self, rail: &Rail) -> crate::config::Key {
        let externally_powered =
            self.enclosure_mode() == EnclosureMode::ExternallyPowered && self.ext_power_present();
        if rail.has_ext_shadow && externally_powered {
            key(EXT_GPIO_PREFIX, rail.pin.raw())
        } else {
            key(GPIO_PREFIX, rail.pin.raw())
        }
    }

    /// Drives a pin and optionally persists the level under its internal key.
    ///
    /// Persistence happens only when the host explicitly asked for it; level
    /// changes triggered by hot-plug handlers stay transient.
    pub fn apply(&mut self, pin: PinId, level: LineLevel, persist: bool) {
        self.gpio.write_level(pin, level);
        if persist {
            self.persist_level(pin, level);
        }
    }

    /// Persists a level under a pin's internal key without driving the pin.
    pub fn persist_level(&mut self, pin: PinId, level: LineLevel) {
        self.store.set(&key(GPIO_PREFIX, pin.raw()), level.as_u8());
    }

    /// Forces every managed rail low without touching persisted state.
    ///
    /// Used by the unmount/suspend branch; the persisted levels survive so a
    /// later restore brings the rails back to operator intent.
    pub fn force_all_low(&mut self) {
        for rail in &ALL_RAILS {
            self.gpio.write_level(rail.pin, LineLevel::Low);
        }
    }

    /// Samples the live level of a pin.
    pub fn live_level(&mut self, pin: PinId) -> LineLevel {
        self.gpio.read_level(pin)
    }

    /// Reads the persisted internal-power level for a pin, repairing misses.
    pub fn persisted_level(&mut self, pin: PinId) -> LineLevel {
        LineLevel::from_u8(self.store.read_or_init(&key(GPIO_PREFIX, pin.raw()), 0))
    }

    /// Reads the persisted external-mode shadow level for a pin.
    pub fn ext_persisted_level(&mut self, pin: PinId) -> LineLevel {
        LineLevel::from_u8(self.store.read_or_init(&key(EXT_GPIO_PREFIX, pin.raw()), 0))
    }

    /// Persists the external-mode shadow level for a pin.
    pub fn set_ext_persisted_level(&mut self, pin: PinId, level: LineLevel) {
        self.store
            .set(&key(EXT_GPIO_PREFIX, pin.raw()), level.as_u8());
    }

    /// Reads the persisted enclosure mode, repairing a missing key to
    /// internally powered.
    pub fn enclosure_mode(&mut self) -> EnclosureMode {
        EnclosureMode::from_u8(self.store.read_or_init(&GlobalSetting::EnclosureMode.key(), 0))
    }

    /// Persists the enclosure mode.
    pub fn set_enclosure_mode(&mut self, mode: EnclosureMode) {
        self.store
            .set(&GlobalSetting::EnclosureMode.key(), mode.as_u8());
    }

    /// Reads a global setting byte, repairing a missing key to 0.
    pub fn setting(&mut self, setting: GlobalSetting) -> u8 {
        self.store.read_or_init(&setting.key(), 0)
    }

    /// Persists a global setting byte.
    pub fn set_setting(&mut self, setting: GlobalSetting, value: u8) {
        self.store.set(&setting.key(), value);
    }

    /// Returns `true` while the external supply sense line reads high.
    pub fn ext_power_present(&mut self) -> bool {
        self.gpio.read_level(EXT_POWER_SENSE).is_high()
    }
}
