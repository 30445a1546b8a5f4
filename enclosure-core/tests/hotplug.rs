mod common;

use common::{FakeControl, FakeStore, engine_with_store, fresh_engine};
use enclosure_core::hotplug::{HotplugEvent, HotplugHandler, HotplugRegistry, dispatch};
use enclosure_core::rails::{
    LineLevel, NVME_PRESENCE_SENSE, PinId, RailId, SATA1_PRESENCE_SENSE, rail_by_id,
};

fn drive_registry() -> HotplugRegistry {
    let mut registry = HotplugRegistry::new();
    registry
        .register(
            SATA1_PRESENCE_SENSE,
            HotplugHandler::DrivePresence { rail: RailId::Sata1 },
        )
        .expect("registry has room");
    registry
}

#[test]
fn unregistered_pin_is_consumed_without_effect() {
    let mut engine = fresh_engine();
    let mut control = FakeControl::default();
    let registry = HotplugRegistry::new();

    let handled = dispatch(
        HotplugEvent::new(PinId::new(99)),
        &registry,
        &mut engine,
        &mut control,
    );

    assert!(!handled);
    assert!(engine.gpio().writes.is_empty());
    assert!(engine.store().writes.is_empty());
}

#[test]
fn drive_removal_forces_rail_low_without_persisting() {
    let store = FakeStore::with(&[("gpio_34", 1)]);
    let mut engine = engine_with_store(store);
    let mut control = FakeControl::default();
    engine.restore_all();
    engine.gpio_mut().writes.clear();
    let persisted_writes = engine.store().writes.len();

    engine
        .gpio_mut()
        .set_input(SATA1_PRESENCE_SENSE, LineLevel::Low);
    let handled = dispatch(
        HotplugEvent::new(SATA1_PRESENCE_SENSE),
        &drive_registry(),
        &mut engine,
        &mut control,
    );

    assert!(handled);
    assert_eq!(engine.gpio().level(PinId::new(34)), 0);
    assert_eq!(engine.store().writes.len(), persisted_writes);
    assert_eq!(engine.store().entries.get("gpio_34").copied(), Some(1));
}

#[test]
fn drive_insertion_powers_up_only_when_persisted_high() {
    let store = FakeStore::with(&[("gpio_34", 1)]);
    let mut engine = engine_with_store(store);
    let mut control = FakeControl::default();

    engine
        .gpio_mut()
        .set_input(SATA1_PRESENCE_SENSE, LineLevel::High);
    dispatch(
        HotplugEvent::new(SATA1_PRESENCE_SENSE),
        &drive_registry(),
        &mut engine,
        &mut control,
    );

    assert_eq!(engine.gpio().level(PinId::new(34)), 1);
}

#[test]
fn drive_insertion_respects_persisted_low() {
    let store = FakeStore::with(&[("gpio_34", 0)]);
    let mut engine = engine_with_store(store);
    let mut control = FakeControl::default();

    engine
        .gpio_mut()
        .set_input(SATA1_PRESENCE_SENSE, LineLevel::High);
    dispatch(
        HotplugEvent::new(SATA1_PRESENCE_SENSE),
        &drive_registry(),
        &mut engine,
        &mut control,
    );

    assert_eq!(engine.gpio().level(PinId::new(34)), 0);
}

#[test]
fn follower_mirrors_the_observed_level() {
    let mut engine = fresh_engine();
    let mut control = FakeControl::default();
    let mut registry = HotplugRegistry::new();
    registry
        .register(
            NVME_PRESENCE_SENSE,
            HotplugHandler::RailFollower { rail: RailId::Nvme },
        )
        .expect("registry has room");
    let nvme = rail_by_id(RailId::Nvme);

    engine
        .gpio_mut()
        .set_input(NVME_PRESENCE_SENSE, LineLevel::High);
    dispatch(
        HotplugEvent::new(NVME_PRESENCE_SENSE),
        &registry,
        &mut engine,
        &mut control,
    );
    assert_eq!(engine.gpio().level(nvme.pin), 1);

    engine
        .gpio_mut()
        .set_input(NVME_PRESENCE_SENSE, LineLevel::Low);
    dispatch(
        HotplugEvent::new(NVME_PRESENCE_SENSE),
        &registry,
        &mut engine,
        &mut control,
    );
    assert_eq!(engine.gpio().level(nvme.pin), 0);
    // Follower writes never touch persisted state.
    assert!(engine.store().writes.is_empty());
}

#[test]
fn bus_power_edge_restarts_when_configured() {
    let store = FakeStore::with(&[("ext_restart_0", 1)]);
    let mut engine = engine_with_store(store);
    let mut control = FakeControl::default();
    let mut registry = HotplugRegistry::new();
    registry
        .register(PinId::new(1), HotplugHandler::BusPower)
        .expect("registry has room");

    dispatch(
        HotplugEvent::new(PinId::new(1)),
        &registry,
        &mut engine,
        &mut control,
    );

    assert_eq!(control.restarts, 1);
    // No restore pass happened on the restart branch.
    assert!(engine.gpio().writes.is_empty());
}

#[test]
fn bus_power_edge_restores_by_default() {
    let store = FakeStore::with(&[("gpio_33", 1)]);
    let mut engine = engine_with_store(store);
    let mut control = FakeControl::default();
    let mut registry = HotplugRegistry::new();
    registry
        .register(PinId::new(1), HotplugHandler::BusPower)
        .expect("registry has room");

    dispatch(
        HotplugEvent::new(PinId::new(1)),
        &registry,
        &mut engine,
        &mut control,
    );

    assert_eq!(control.restarts, 0);
    assert_eq!(engine.gpio().level(PinId::new(33)), 1);
}
