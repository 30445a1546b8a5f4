use enclosure_core::presence::{
    HostPresenceController, PresenceAction, PresenceFlags, UsbLifecycleEvent,
};

#[test]
fn unmount_with_flag_disables_rails_and_heartbeat() {
    let mut controller = HostPresenceController::new();
    controller.handle(UsbLifecycleEvent::Mount, PresenceFlags::default());

    let flags = PresenceFlags {
        disable_on_unmount: true,
        ..PresenceFlags::default()
    };
    let actions = controller.handle(UsbLifecycleEvent::Unmount, flags);

    assert!(!controller.host_present());
    assert_eq!(
        actions.as_slice(),
        [
            PresenceAction::ForceRailsLowAfterGrace,
            PresenceAction::SuspendHeartbeat,
        ]
    );
}

#[test]
fn suspend_with_flag_also_enters_low_power() {
    let mut controller = HostPresenceController::new();
    controller.handle(UsbLifecycleEvent::Mount, PresenceFlags::default());

    let flags = PresenceFlags {
        disable_on_suspend: true,
        ..PresenceFlags::default()
    };
    let actions = controller.handle(UsbLifecycleEvent::Suspend, flags);

    assert_eq!(
        actions.as_slice(),
        [
            PresenceAction::ForceRailsLowAfterGrace,
            PresenceAction::SuspendHeartbeat,
            PresenceAction::EnterLowPower,
        ]
    );
}

#[test]
fn suspend_without_flag_leaves_rails_alone() {
    let mut controller = HostPresenceController::new();
    controller.handle(UsbLifecycleEvent::Mount, PresenceFlags::default());

    let actions = controller.handle(UsbLifecycleEvent::Suspend, PresenceFlags::default());

    assert!(!controller.host_present());
    assert_eq!(actions.as_slice(), [PresenceAction::SuspendHeartbeat]);
}

#[test]
fn resume_restores_like_mount() {
    let mut controller = HostPresenceController::new();
    let flags = PresenceFlags {
        disable_on_suspend: true,
        ..PresenceFlags::default()
    };
    controller.handle(UsbLifecycleEvent::Mount, PresenceFlags::default());
    controller.handle(UsbLifecycleEvent::Suspend, flags);

    let actions = controller.handle(UsbLifecycleEvent::Resume, PresenceFlags::default());

    assert!(controller.host_present());
    assert_eq!(
        actions.as_slice(),
        [PresenceAction::RestoreAll, PresenceAction::ResumeHeartbeat]
    );
}

#[test]
fn remount_within_grace_still_power_cycles_rails() {
    let mut controller = HostPresenceController::new();
    controller.handle(UsbLifecycleEvent::Mount, PresenceFlags::default());

    let flags = PresenceFlags {
        disable_on_unmount: true,
        ..PresenceFlags::default()
    };
    let unmount_actions = controller.handle(UsbLifecycleEvent::Unmount, flags);
    assert!(unmount_actions.contains(&PresenceAction::ForceRailsLowAfterGrace));

    // A mount arriving inside the grace window does not withdraw the rail
    // drop; it queues a restore that runs after the rails go low.
    let mount_actions = controller.handle(UsbLifecycleEvent::Mount, PresenceFlags::default());
    assert_eq!(
        mount_actions.as_slice(),
        [PresenceAction::RestoreAll, PresenceAction::ResumeHeartbeat]
    );
}

#[test]
fn flags_are_sampled_per_transition() {
    let mut controller = HostPresenceController::new();
    controller.handle(UsbLifecycleEvent::Mount, PresenceFlags::default());

    // Flag cleared between mount and unmount: the heartbeat pauses but the
    // rails stay up.
    let actions = controller.handle(UsbLifecycleEvent::Unmount, PresenceFlags::default());
    assert_eq!(actions.as_slice(), [PresenceAction::SuspendHeartbeat]);

    controller.handle(UsbLifecycleEvent::Mount, PresenceFlags::default());
    let flags = PresenceFlags {
        disable_on_unmount: true,
        ..PresenceFlags::default()
    };
    let actions = controller.handle(UsbLifecycleEvent::Unmount, flags);
    assert_eq!(actions.len(), 2);
}
