//! Persistent settings access shared between firmware and host targets.
//!
//! The controller keeps every durable byte in a flat key/value store with
//! string keys of the form `"{prefix}_{index}"`. The store itself (flash,
//! RAM, or a test fake) is injected through [`ConfigStore`]; this module only
//! owns the key scheme and the read-repair convention that keeps the store
//! self-healing: a key that was never written is initialized with its default
//! the first time it is read.

use core::fmt::Write;

/// Longest key the scheme can produce (`enclosure_mode_255`).
pub const MAX_KEY_LEN: usize = 20;

/// Owned key buffer sized for the longest prefix in the scheme.
pub type Key = heapless::String<MAX_KEY_LEN>;

/// Key prefix for a rail's persisted level while internally powered.
pub const GPIO_PREFIX: &str = "gpio";

/// Key prefix for a rail's persisted level while externally powered.
pub const EXT_GPIO_PREFIX: &str = "ext_gpio";

/// Formats a `"{prefix}_{index}"` key into a fixed-capacity buffer.
#[must_use]
pub fn key(prefix: &str, index: u8) -> Key {
    let mut buf = Key::new();
    // MAX_KEY_LEN covers every prefix this crate uses.
    let _ = write!(buf, "{prefix}_{index}");
    buf
}

/// Global (non-rail) settings persisted under index `0`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GlobalSetting {
    /// Whether the enclosure draws power from the host bus or an external supply.
    EnclosureMode,
    /// Staggered power-up delay in seconds applied to SATA-class rails.
    PowerOnDelay,
    /// When set, host suspend forces all managed rails low.
    DisableOnSuspend,
    /// When set, host unmount forces all managed rails low.
    DisableOnUnmount,
    /// When set, a bus-power edge restarts the controller instead of
    /// restoring rails in place.
    RestartOnBusPower,
}

impl GlobalSetting {
    /// Key prefix used when persisting this setting.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            GlobalSetting::EnclosureMode => "enclosure_mode",
            GlobalSetting::PowerOnDelay => "sata_onpower",
            GlobalSetting::DisableOnSuspend => "susp_en",
            GlobalSetting::DisableOnUnmount => "ususp_en",
            GlobalSetting::RestartOnBusPower => "ext_restart",
        }
    }

    /// Fully formatted store key for this setting.
    #[must_use]
    pub fn key(self) -> Key {
        key(self.prefix(), 0)
    }
}

/// Injected key/value persistence capability.
///
/// Implementations map store failures to `None` on read and swallow write
/// failures; persistence problems must never block rail control.
pub trait ConfigStore {
    /// Reads the byte stored under `key`, if any.
    fn get(&mut self, key: &str) -> Option<u8>;

    /// Writes `value` under `key`.
    fn set(&mut self, key: &str, value: u8);

    /// Reads `key`, repairing a missing entry by persisting `default`.
    ///
    /// Subsequent reads observe the same value without re-deriving the
    /// default, so a store wiped in the field converges after one pass.
    fn read_or_init(&mut self, key: &str, default: u8) -> u8 {
        match self.get(key) {
            Some(value) => value,
            None => {
                self.set(key, default);
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_prefix_index_scheme() {
        assert_eq!(key(GPIO_PREFIX, 34).as_str(), "gpio_34");
        assert_eq!(key(EXT_GPIO_PREFIX, 45).as_str(), "ext_gpio_45");
        assert_eq!(
            GlobalSetting::EnclosureMode.key().as_str(),
            "enclosure_mode_0"
        );
        assert_eq!(GlobalSetting::PowerOnDelay.key().as_str(), "sata_onpower_0");
    }

    #[test]
    fn longest_key_fits_buffer() {
        let longest = key(GlobalSetting::EnclosureMode.prefix(), u8::MAX);
        assert_eq!(longest.as_str(), "enclosure_mode_255");
        assert!(longest.len() <= MAX_KEY_LEN);
    }

    struct CountingStore {
        value: Option<u8>,
        writes: usize,
    }

    impl ConfigStore for CountingStore {
        fn get(&mut self, _key: &str) -> Option<u8> {
            self.value
        }

        fn set(&mut self, _key: &str, value: u8) {
            self.value = Some(value);
            self.writes += 1;
        }
    }

    #[test]
    fn read_or_init_repairs_missing_keys_once() {
        let mut store = CountingStore {
            value: None,
            writes: 0,
        };

        assert_eq!(store.read_or_init("gpio_34", 0), 0);
        assert_eq!(store.writes, 1);

        assert_eq!(store.read_or_init("gpio_34", 0), 0);
        assert_eq!(store.writes, 1);
    }
}
