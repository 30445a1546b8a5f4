//! RAM-resident settings map with a fixed snapshot format.
//!
//! Rail levels and global settings live in this map between flash commits.
//! The snapshot encoding is a flat record list sized to fit one flash page;
//! the persist task serializes the map whenever a write dirtied it.

use enclosure_core::config::{ConfigStore, Key, MAX_KEY_LEN};
use heapless::index_map::FnvIndexMap;

/// Capacity of the settings map. Must be a power of two.
pub const MAX_SETTINGS: usize = 32;

/// Fixed size of an encoded snapshot.
pub const SNAPSHOT_LEN: usize = 512;

const SNAPSHOT_MAGIC: [u8; 2] = *b"EN";
const SNAPSHOT_VERSION: u8 = 1;

/// Key/value settings store backing the rail engine.
#[derive(Debug, Default)]
pub struct SettingsStore {
    entries: FnvIndexMap<Key, u8, MAX_SETTINGS>,
    dirty: bool,
}

impl SettingsStore {
    /// Creates an empty, clean store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FnvIndexMap::new(),
            dirty: false,
        }
    }

    /// Decodes a snapshot into a fresh store.
    ///
    /// An unrecognized magic or version yields an empty store; a truncated or
    /// malformed record list keeps everything decoded up to that point. Both
    /// degrade to read-repair defaults instead of failing.
    #[must_use]
    pub fn load(bytes: &[u8]) -> Self {
        let mut store = Self::new();
        if bytes.len() < 4 || bytes[..2] != SNAPSHOT_MAGIC || bytes[2] != SNAPSHOT_VERSION {
            return store;
        }

        let count = usize::from(bytes[3]);
        let mut cursor = 4;
        for _ in 0..count {
            let Some(&key_len) = bytes.get(cursor) else {
                break;
            };
            let key_len = usize::from(key_len);
            if key_len == 0 || key_len > MAX_KEY_LEN {
                break;
            }
            let Some(raw_key) = bytes.get(cursor + 1..cursor + 1 + key_len) else {
                break;
            };
            let Some(&value) = bytes.get(cursor + 1 + key_len) else {
                break;
            };
            let Ok(text) = core::str::from_utf8(raw_key) else {
                break;
            };
            let Ok(key) = Key::try_from(text) else {
                break;
            };
            let _ = store.entries.insert(key, value);
            cursor += key_len + 2;
        }

        store
    }

    /// Encodes the map into `out` as `magic, version, count, records`.
    ///
    /// Each record is `key_len, key bytes, value`; unused tail bytes stay at
    /// the erased-flash value.
    pub fn snapshot(&self, out: &mut [u8; SNAPSHOT_LEN]) {
        out.fill(0xFF);
        out[..2].copy_from_slice(&SNAPSHOT_MAGIC);
        out[2] = SNAPSHOT_VERSION;

        let mut cursor = 4;
        let mut written: u8 = 0;
        for (key, value) in &self.entries {
            let Ok(key_len) = u8::try_from(key.len()) else {
                continue;
            };
            let record_len = key.len() + 2;
            if cursor + record_len > out.len() {
                break;
            }
            out[cursor] = key_len;
            out[cursor + 1..cursor + 1 + key.len()].copy_from_slice(key.as_bytes());
            out[cursor + 1 + key.len()] = *value;
            cursor += record_len;
            written += 1;
        }
        out[3] = written;
    }

    /// Returns `true` when a write changed the map since the last commit.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Marks the map as committed.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfigStore for SettingsStore {
    fn get(&mut self, key: &str) -> Option<u8> {
        self.entries.get(key).copied()
    }

    fn set(&mut self, key: &str, value: u8) {
        if let Some(existing) = self.entries.get_mut(key) {
            // Unchanged values do not mark the store dirty.
            if *existing != value {
                *existing = value;
                self.dirty = true;
            }
            return;
        }

        let Ok(owned) = Key::try_from(key) else {
            return;
        };
        if self.entries.insert(owned, value).is_ok() {
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut store = SettingsStore::new();
        store.set("gpio_34", 1);
        assert_eq!(store.get("gpio_34"), Some(1));
        assert_eq!(store.get("gpio_33"), None);
        assert!(store.is_dirty());
    }

    #[test]
    fn unchanged_write_stays_clean() {
        let mut store = SettingsStore::new();
        store.set("gpio_34", 1);
        store.clear_dirty();

        store.set("gpio_34", 1);
        assert!(!store.is_dirty());

        store.set("gpio_34", 0);
        assert!(store.is_dirty());
    }

    #[test]
    fn snapshot_load_round_trips() {
        let mut store = SettingsStore::new();
        store.set("gpio_34", 1);
        store.set("ext_gpio_45", 0);
        store.set("enclosure_mode_0", 1);
        store.set("sata_onpower_0", 6);

        let mut buf = [0u8; SNAPSHOT_LEN];
        store.snapshot(&mut buf);

        let mut restored = SettingsStore::load(&buf);
        assert_eq!(restored.len(), 4);
        assert_eq!(restored.get("gpio_34"), Some(1));
        assert_eq!(restored.get("ext_gpio_45"), Some(0));
        assert_eq!(restored.get("enclosure_mode_0"), Some(1));
        assert_eq!(restored.get("sata_onpower_0"), Some(6));
        assert!(!restored.is_dirty());
    }

    #[test]
    fn erased_flash_loads_empty() {
        let restored = SettingsStore::load(&[0xFF; SNAPSHOT_LEN]);
        assert!(restored.is_empty());
        assert!(!restored.is_dirty());
    }

    #[test]
    fn truncated_snapshot_keeps_valid_prefix() {
        let mut store = SettingsStore::new();
        store.set("gpio_33", 1);
        store.set("gpio_34", 1);

        let mut buf = [0u8; SNAPSHOT_LEN];
        store.snapshot(&mut buf);
        // Corrupt the second record's key length.
        buf[4 + "gpio_33".len() + 2] = 0;

        let mut restored = SettingsStore::load(&buf);
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get("gpio_33"), Some(1));
    }
}
