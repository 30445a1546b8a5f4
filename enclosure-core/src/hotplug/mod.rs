//! Hot-plug event dispatch.
//!
//! Edge detection runs in interrupt context and does nothing but enqueue a
//! [`HotplugEvent`] on a fixed-capacity FIFO; when the queue is full the
//! event is dropped, which is safe because the handler re-reads the pin level
//! instead of trusting the event. A single consumer task pops events and runs
//! them through [`dispatch`], which holds the same engine lock as the command
//! path so hot-plug and host-command writers never interleave on a rail.

use heapless::Vec;

use crate::config::{ConfigStore, GlobalSetting};
use crate::power::{PowerRailEngine, RailDelay, RailGpio};
use crate::protocol::SystemControl;
use crate::rails::{LineLevel, PinId, RailId, rail_by_id};

/// Edge notification produced in interrupt context.
///
/// Carries only the pin; the level is sampled once by the dispatcher, never
/// in the ISR.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HotplugEvent {
    pub pin: PinId,
}

impl HotplugEvent {
    #[must_use]
    pub const fn new(pin: PinId) -> Self {
        Self { pin }
    }
}

/// Reaction bound to edges on one monitored pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HotplugHandler {
    /// Drive-presence sense: a removed drive forces the companion rail low;
    /// an inserted drive only powers back up when the persisted level says
    /// the operator last allowed it.
    DrivePresence { rail: RailId },
    /// Presence sense that mirrors the observed level onto the rail
    /// unconditionally (NVMe bay behavior).
    RailFollower { rail: RailId },
    /// Bus/external power sense: restart when configured to, otherwise run a
    /// full restore pass.
    BusPower,
}

/// Upper bound on monitored pins.
pub const MAX_MONITORED_PINS: usize = 8;

/// Error returned when the handler table is out of slots.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegistryFull;

/// One-handler-per-pin mapping owned by the dispatcher task.
#[derive(Clone, Debug, Default)]
pub struct HotplugRegistry {
    entries: Vec<(PinId, HotplugHandler), MAX_MONITORED_PINS>,
}

impl HotplugRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers (or replaces) the handler for a pin.
    pub fn register(&mut self, pin: PinId, handler: HotplugHandler) -> Result<(), RegistryFull> {
        if let Some((_, existing)) = self.entries.iter_mut().find(|(entry, _)| *entry == pin) {
            *existing = handler;
            Ok(())
        } else {
            self.entries.push((pin, handler)).map_err(|_| RegistryFull)
        }
    }

    /// Looks up the handler bound to a pin.
    #[must_use]
    pub fn handler_for(&self, pin: PinId) -> Option<HotplugHandler> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == pin)
            .map(|(_, handler)| *handler)
    }

    /// Returns the number of registered pins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over registered `(pin, handler)` pairs.
    #[must_use]
    pub fn iter(&self) -> core::slice::Iter<'_, (PinId, HotplugHandler)> {
        self.entries.iter()
    }
}

/// Consumes one event: samples the pin level once and runs the registered
/// handler against the engine.
///
/// Returns `true` when a handler ran; an event for an unregistered pin is
/// consumed silently.
pub fn dispatch<S, G, D, C>(
    event: HotplugEvent,
    registry: &HotplugRegistry,
    engine: &mut PowerRailEngine<S, G, D>,
    control: &mut C,
) -> bool
where
    S: ConfigStore,
    G: RailGpio,
    D: RailDelay,
    C: SystemControl,
{
    let Some(handler) = registry.handler_for(event.pin) else {
        return false;
    };

    let level = engine.live_level(event.pin);

    match handler {
        HotplugHandler::DrivePresence { rail } => {
            let rail = rail_by_id(rail);
            match level {
                LineLevel::Low => engine.apply(rail.pin, LineLevel::Low, false),
                // restore() drives the pin to the persisted gate value, so a
                // drive the operator last powered off stays off.
                LineLevel::High => {
                    engine.restore(&rail);
                }
            }
        }
        HotplugHandler::RailFollower { rail } => {
            engine.apply(rail_by_id(rail).pin, level, false);
        }
        HotplugHandler::BusPower => {
            if engine.setting(GlobalSetting::RestartOnBusPower) == 0x01 {
                control.request_restart();
            } else {
                engine.restore_all();
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_replaces_existing_handler() {
        let mut registry = HotplugRegistry::new();
        let pin = PinId::new(11);

        registry
            .register(pin, HotplugHandler::DrivePresence { rail: RailId::Sata1 })
            .expect("first registration should fit");
        registry
            .register(pin, HotplugHandler::BusPower)
            .expect("replacement should not consume a slot");

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.handler_for(pin), Some(HotplugHandler::BusPower));
    }

    #[test]
    fn registry_rejects_overflow() {
        let mut registry = HotplugRegistry::new();
        for raw in 0..MAX_MONITORED_PINS {
            registry
                .register(PinId::new(raw as u8), HotplugHandler::BusPower)
                .expect("within capacity");
        }

        assert_eq!(
            registry.register(PinId::new(0xF0), HotplugHandler::BusPower),
            Err(RegistryFull)
        );
    }

    #[test]
    fn unregistered_pins_have_no_handler() {
        let registry = HotplugRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.handler_for(PinId::new(11)), None);
    }
}
