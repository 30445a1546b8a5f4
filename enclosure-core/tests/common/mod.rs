//! Shared fakes for the integration suites.

#![allow(dead_code)]

use std::collections::BTreeMap;

use enclosure_core::config::ConfigStore;
use enclosure_core::power::{PowerRailEngine, RailDelay, RailGpio};
use enclosure_core::protocol::SystemControl;
use enclosure_core::rails::{LineLevel, PinId};

/// In-memory store that records every write and can simulate a dead backend.
#[derive(Clone, Debug, Default)]
pub struct FakeStore {
    pub entries: BTreeMap<String, u8>,
    pub writes: Vec<(String, u8)>,
    pub unavailable: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(entries: &[(&str, u8)]) -> Self {
        let mut store = Self::new();
        for (key, value) in entries {
            store.entries.insert((*key).to_owned(), *value);
        }
        store
    }
}

impl ConfigStore for FakeStore {
    fn get(&mut self, key: &str) -> Option<u8> {
        if self.unavailable {
            return None;
        }
        self.entries.get(key).copied()
    }

    fn set(&mut self, key: &str, value: u8) {
        self.writes.push((key.to_owned(), value));
        if self.unavailable {
            return;
        }
        self.entries.insert(key.to_owned(), value);
    }
}

/// Simulated GPIO bank keyed by raw pin number.
#[derive(Clone, Debug, Default)]
pub struct FakeGpio {
    pub levels: BTreeMap<u8, u8>,
    pub writes: Vec<(u8, u8)>,
}

impl FakeGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_input(&mut self, pin: PinId, level: LineLevel) {
        self.levels.insert(pin.raw(), level.as_u8());
    }

    pub fn level(&self, pin: PinId) -> u8 {
        self.levels.get(&pin.raw()).copied().unwrap_or(0)
    }
}

impl RailGpio for FakeGpio {
    fn read_level(&mut self, pin: PinId) -> LineLevel {
        LineLevel::from_u8(self.level(pin))
    }

    fn write_level(&mut self, pin: PinId, level: LineLevel) {
        self.writes.push((pin.raw(), level.as_u8()));
        self.levels.insert(pin.raw(), level.as_u8());
    }
}

/// Delay provider that records requested sleeps instead of blocking.
#[derive(Clone, Debug, Default)]
pub struct FakeDelay {
    pub slept_seconds: Vec<u8>,
}

impl RailDelay for FakeDelay {
    fn delay_seconds(&mut self, seconds: u8) {
        self.slept_seconds.push(seconds);
    }
}

/// System control that counts restart and reflash requests.
#[derive(Clone, Debug, Default)]
pub struct FakeControl {
    pub restarts: usize,
    pub reflashes: usize,
}

impl SystemControl for FakeControl {
    fn request_restart(&mut self) {
        self.restarts += 1;
    }

    fn request_reflash(&mut self) {
        self.reflashes += 1;
    }
}

pub type TestEngine = PowerRailEngine<FakeStore, FakeGpio, FakeDelay>;

/// Engine over empty fakes: pristine store, all lines low.
pub fn fresh_engine() -> TestEngine {
    PowerRailEngine::new(FakeStore::new(), FakeGpio::new(), FakeDelay::default())
}

/// Engine over a pre-seeded store.
pub fn engine_with_store(store: FakeStore) -> TestEngine {
    PowerRailEngine::new(store, FakeGpio::new(), FakeDelay::default())
}
