use embassy_futures::select::{Either4, select4};
use embassy_stm32::exti::ExtiInput;

use enclosure_core::hotplug::{self, HotplugEvent, HotplugRegistry};
use enclosure_core::rails::{
    EXT_POWER_SENSE, NVME_PRESENCE_SENSE, SATA1_PRESENCE_SENSE, SATA2_PRESENCE_SENSE,
};

use super::{EngineMutex, HOTPLUG_EVENTS, SENSE_CACHE};
use crate::hw::{McuSystemControl, sampled_level};

/// Waits on edges of every sense input and enqueues one event per edge.
///
/// The level is sampled here, right after the edge, and recorded in the
/// shared cache; the event itself carries only the pin. A full queue drops
/// the event, which is safe because the dispatcher acts on the cached level
/// rather than on edge polarity.
#[embassy_executor::task]
pub async fn sense(
    mut ext: ExtiInput<'static>,
    mut sata1: ExtiInput<'static>,
    mut sata2: ExtiInput<'static>,
    mut nvme: ExtiInput<'static>,
) -> ! {
    loop {
        let pin = match select4(
            ext.wait_for_any_edge(),
            sata1.wait_for_any_edge(),
            sata2.wait_for_any_edge(),
            nvme.wait_for_any_edge(),
        )
        .await
        {
            Either4::First(()) => {
                SENSE_CACHE.record(EXT_POWER_SENSE, sampled_level(&ext));
                EXT_POWER_SENSE
            }
            Either4::Second(()) => {
                SENSE_CACHE.record(SATA1_PRESENCE_SENSE, sampled_level(&sata1));
                SATA1_PRESENCE_SENSE
            }
            Either4::Third(()) => {
                SENSE_CACHE.record(SATA2_PRESENCE_SENSE, sampled_level(&sata2));
                SATA2_PRESENCE_SENSE
            }
            Either4::Fourth(()) => {
                SENSE_CACHE.record(NVME_PRESENCE_SENSE, sampled_level(&nvme));
                NVME_PRESENCE_SENSE
            }
        };

        if HOTPLUG_EVENTS.try_send(HotplugEvent::new(pin)).is_err() {
            defmt::warn!("hotplug: queue full, dropping edge on pin {}", pin.raw());
        }
    }
}

/// Pops queued events and runs the registered handlers under the engine lock.
#[embassy_executor::task]
pub async fn dispatch(registry: HotplugRegistry, engine: &'static EngineMutex) -> ! {
    loop {
        let event = HOTPLUG_EVENTS.receive().await;
        let mut engine = engine.lock().await;
        let mut control = McuSystemControl;
        if hotplug::dispatch(event, &registry, &mut engine, &mut control) {
            defmt::debug!("hotplug: handled edge on pin {}", event.pin.raw());
        }
    }
}
