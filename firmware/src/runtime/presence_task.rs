use embassy_futures::select::{Either, select};
use embassy_time::{Duration, Timer};
use portable_atomic::Ordering;

use enclosure_core::config::GlobalSetting;
use enclosure_core::presence::{
    HostPresenceController, PresenceAction, PresenceFlags, RAIL_DISABLE_GRACE, REENUMERATION_GRACE,
    UsbLifecycleEvent,
};
use enclosure_core::protocol::SystemControl;

use super::{EngineMutex, HEARTBEAT_ENABLED, LIFECYCLE_EVENTS};
use crate::hw::{self, McuSystemControl};

/// Executes host-presence decisions against the engine and the heartbeat.
///
/// The rail-disable grace is a fixed latency bound: lifecycle events
/// arriving during the wait queue up and are handled after the rails drop,
/// so a host that remounts inside the window sees a power cycle. Only the
/// post-reset re-enumeration check is cancelled by a later event.
#[embassy_executor::task]
pub async fn run(engine: &'static EngineMutex) -> ! {
    let mut controller = HostPresenceController::new();
    let mut pending: Option<UsbLifecycleEvent> = None;

    loop {
        let event = match pending.take() {
            Some(event) => event,
            None => LIFECYCLE_EVENTS.receive().await,
        };

        let flags = {
            let mut engine = engine.lock().await;
            PresenceFlags {
                disable_on_unmount: engine.setting(GlobalSetting::DisableOnUnmount) == 0x01,
                disable_on_suspend: engine.setting(GlobalSetting::DisableOnSuspend) == 0x01,
            }
        };

        for action in controller.handle(event, flags) {
            match action {
                PresenceAction::RestoreAll => {
                    engine.lock().await.restore_all();
                }
                PresenceAction::ResumeHeartbeat => {
                    hw::set_deep_sleep(false);
                    HEARTBEAT_ENABLED.store(true, Ordering::Relaxed);
                }
                PresenceAction::SuspendHeartbeat => {
                    HEARTBEAT_ENABLED.store(false, Ordering::Relaxed);
                }
                PresenceAction::ForceRailsLowAfterGrace => {
                    // Not cancellable: an event arriving mid-wait is handled
                    // after the rails drop.
                    Timer::after(embassy_duration(RAIL_DISABLE_GRACE)).await;
                    defmt::info!("presence: grace elapsed, forcing rails low");
                    engine.lock().await.force_all_low();
                }
                PresenceAction::EnterLowPower => {
                    // Rails are already down; with SLEEPDEEP armed the
                    // executor's idle WFI enters stop mode until the next
                    // bus event or timer wakes us.
                    hw::set_deep_sleep(true);
                    defmt::info!("presence: entering low power");
                }
                PresenceAction::ScheduleReenumerationCheck => {
                    match select(
                        Timer::after(embassy_duration(REENUMERATION_GRACE)),
                        LIFECYCLE_EVENTS.receive(),
                    )
                    .await
                    {
                        Either::First(()) => {
                            if !controller.host_present() {
                                defmt::warn!(
                                    "presence: host absent after reset, forcing re-enumeration"
                                );
                                let mut control = McuSystemControl;
                                control.request_restart();
                            }
                        }
                        Either::Second(next) => {
                            pending = Some(next);
                            break;
                        }
                    }
                }
            }
        }
    }
}

fn embassy_duration(duration: core::time::Duration) -> Duration {
    Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
