//! Authenticated command protocol and opcode dispatcher.
//!
//! Inbound reports are verified, decoded into a [`Request`] variant, and
//! executed against the [`PowerRailEngine`]. The wire format overloads byte 0
//! (pin for control opcodes, sentinel for the liveness probe, raw value for
//! the global-setting opcodes); the decoder resolves that overloading once so
//! the dispatch logic only ever sees typed requests.

pub mod frame;

pub use frame::{MAX_PAYLOAD_LEN, REPORT_LEN, Report, TAG_LEN};

use crate::config::{ConfigStore, GlobalSetting};
use crate::power::{PowerRailEngine, RailDelay, RailGpio};
use crate::rails::{EnclosureMode, LineLevel, PinId, STATUS_RAILS, rail_by_id};

/// Target byte that bypasses opcode dispatch and answers the liveness probe.
pub const PING_TARGET: u8 = 0xFE;

/// Opcode byte values carried at frame byte 1.
pub mod opcode {
    pub const SET_LOW: u8 = 0x00;
    pub const SET_HIGH: u8 = 0x01;
    pub const GET_PERSISTED: u8 = 0x02;
    pub const GET_LIVE: u8 = 0x03;
    pub const GET_MODE: u8 = 0x04;
    pub const SET_MODE: u8 = 0x05;
    pub const SET_EXT_LEVEL: u8 = 0x06;
    pub const GET_EXT_LEVEL: u8 = 0x07;
    pub const SET_POWER_ON_DELAY: u8 = 0x08;
    pub const GET_POWER_ON_DELAY: u8 = 0x09;
    pub const SET_SUSPEND_DISABLE: u8 = 0x0A;
    pub const GET_SUSPEND_DISABLE: u8 = 0x0B;
    pub const SET_UNMOUNT_DISABLE: u8 = 0x0C;
    pub const GET_UNMOUNT_DISABLE: u8 = 0x0D;
    pub const BULK_STATUS: u8 = 0x0F;
    pub const REFLASH: u8 = 0xFB;
    pub const RESTART: u8 = 0xFC;
    pub const RESTORE_ALL: u8 = 0xFD;
}

const OK: &[u8] = b"OK";
const UNKNOWN: &[u8] = b"UNK";
const PONG: &[u8] = b"PONG";

const fn level_text(level: LineLevel) -> &'static [u8] {
    match level {
        LineLevel::High => b"HIGH",
        LineLevel::Low => b"LOW",
    }
}

/// Process-control primitives injected by the runtime.
///
/// Restart and reflash terminate the current process; the protocol routes
/// both through this trait so the core crate never touches reset machinery.
pub trait SystemControl {
    /// Requests an immediate device restart.
    fn request_restart(&mut self);

    /// Arms the persistent reflash/bootloader flag and requests a restart.
    fn request_reflash(&mut self);
}

/// System control that performs no process interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopSystemControl;

impl SystemControl for NoopSystemControl {
    fn request_restart(&mut self) {}

    fn request_reflash(&mut self) {}
}

/// Decoded, authenticated command.
///
/// One variant per opcode; the overloaded addressing byte is resolved here so
/// every field carries exactly one meaning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Request {
    /// Liveness probe; always answered, never dispatched.
    Ping,
    /// Drive and/or persist a rail level. `drive` gates the GPIO write,
    /// `persist` gates the store write; the two are independent.
    SetLevel {
        pin: PinId,
        level: LineLevel,
        drive: bool,
        persist: bool,
    },
    /// Read the persisted internal-power level for a pin.
    PersistedLevel { pin: PinId },
    /// Read the live GPIO level for a pin.
    LiveLevel { pin: PinId },
    /// Read the persisted enclosure mode.
    QueryMode,
    /// Persist the enclosure mode carried in the target byte.
    SetMode { mode: EnclosureMode },
    /// Persist the external-mode shadow level for a pin.
    SetExtLevel { pin: PinId, level: LineLevel },
    /// Read the external-mode shadow level for a pin.
    ExtLevel { pin: PinId },
    /// Persist the staggered power-on delay (seconds, from the target byte).
    SetPowerOnDelay { seconds: u8 },
    /// Read the staggered power-on delay.
    PowerOnDelay,
    /// Persist the "suspend disables rails" flag (from the target byte).
    SetSuspendDisable { value: u8 },
    /// Read the "suspend disables rails" flag.
    SuspendDisable,
    /// Persist the "unmount disables rails" flag (from the target byte).
    SetUnmountDisable { value: u8 },
    /// Read the "unmount disables rails" flag.
    UnmountDisable,
    /// Report live levels of the fixed status rail set.
    BulkStatus,
    /// Run a full restore pass over every managed rail.
    RestoreAll,
    /// Restart the device.
    Restart,
    /// Arm the reflash flag and restart into the bootloader.
    Reflash,
    /// Opcode outside the table; answered with `UNK`.
    Unknown { opcode: u8 },
}

impl Request {
    /// Decodes a verified frame into a request.
    ///
    /// Returns `None` when the size or authentication check fails; the caller
    /// must stay silent in that case.
    #[must_use]
    pub fn parse(report: &[u8]) -> Option<Self> {
        if !frame::verify(report) {
            return None;
        }

        let target = report[0];
        if target == PING_TARGET {
            return Some(Request::Ping);
        }

        let pin = PinId::new(target);
        let persist = report[2] == 0x01;
        let ext_level = LineLevel::from_u8(report[4]);
        let drive = report[5] == 0x01;

        let request = match report[1] {
            opcode::SET_LOW => Request::SetLevel {
                pin,
                level: LineLevel::Low,
                drive,
                persist,
            },
            opcode::SET_HIGH => Request::SetLevel {
                pin,
                level: LineLevel::High,
                drive,
                persist,
            },
            opcode::GET_PERSISTED => Request::PersistedLevel { pin },
            opcode::GET_LIVE => Request::LiveLevel { pin },
            opcode::GET_MODE => Request::QueryMode,
            opcode::SET_MODE => Request::SetMode {
                mode: EnclosureMode::from_u8(target),
            },
            opcode::SET_EXT_LEVEL => Request::SetExtLevel {
                pin,
                level: ext_level,
            },
            opcode::GET_EXT_LEVEL => Request::ExtLevel { pin },
            opcode::SET_POWER_ON_DELAY => Request::SetPowerOnDelay { seconds: target },
            opcode::GET_POWER_ON_DELAY => Request::PowerOnDelay,
            opcode::SET_SUSPEND_DISABLE => Request::SetSuspendDisable { value: target },
            opcode::GET_SUSPEND_DISABLE => Request::SuspendDisable,
            opcode::SET_UNMOUNT_DISABLE => Request::SetUnmountDisable { value: target },
            opcode::GET_UNMOUNT_DISABLE => Request::UnmountDisable,
            opcode::BULK_STATUS => Request::BulkStatus,
            opcode::RESTORE_ALL => Request::RestoreAll,
            opcode::RESTART => Request::Restart,
            opcode::REFLASH => Request::Reflash,
            other => Request::Unknown { opcode: other },
        };

        Some(request)
    }

    /// Returns `true` for the liveness probe.
    ///
    /// The firmware keeps its periodic keepalive running across pings but
    /// pauses it around every other command round-trip.
    #[must_use]
    pub const fn is_ping(&self) -> bool {
        matches!(self, Request::Ping)
    }

    /// Opcode byte echoed at byte 0 of the response.
    #[must_use]
    pub const fn echo_opcode(&self) -> u8 {
        match self {
            Request::Ping => PING_TARGET,
            Request::SetLevel {
                level: LineLevel::Low,
                ..
            } => opcode::SET_LOW,
            Request::SetLevel {
                level: LineLevel::High,
                ..
            } => opcode::SET_HIGH,
            Request::PersistedLevel { .. } => opcode::GET_PERSISTED,
            Request::LiveLevel { .. } => opcode::GET_LIVE,
            Request::QueryMode => opcode::GET_MODE,
            Request::SetMode { .. } => opcode::SET_MODE,
            Request::SetExtLevel { .. } => opcode::SET_EXT_LEVEL,
            Request::ExtLevel { .. } => opcode::GET_EXT_LEVEL,
            Request::SetPowerOnDelay { .. } => opcode::SET_POWER_ON_DELAY,
            Request::PowerOnDelay => opcode::GET_POWER_ON_DELAY,
            Request::SetSuspendDisable { .. } => opcode::SET_SUSPEND_DISABLE,
            Request::SuspendDisable => opcode::GET_SUSPEND_DISABLE,
            Request::SetUnmountDisable { .. } => opcode::SET_UNMOUNT_DISABLE,
            Request::UnmountDisable => opcode::GET_UNMOUNT_DISABLE,
            Request::BulkStatus => opcode::BULK_STATUS,
            Request::RestoreAll => opcode::RESTORE_ALL,
            Request::Restart => opcode::RESTART,
            Request::Reflash => opcode::REFLASH,
            Request::Unknown { opcode } => *opcode,
        }
    }
}

/// Executes a decoded request and builds the signed response, if any.
///
/// Restore, restart, and reflash intentionally produce no response; every
/// other request answers with a frame signed the same way requests are
/// verified.
pub fn execute<S, G, D, C>(
    request: Request,
    engine: &mut PowerRailEngine<S, G, D>,
    control: &mut C,
) -> Option<Report>
where
    S: ConfigStore,
    G: RailGpio,
    D: RailDelay,
    C: SystemControl,
{
    let echo = request.echo_opcode();

    match request {
        Request::Ping => Some(frame::seal(echo, PONG)),
        Request::SetLevel {
            pin,
            level,
            drive,
            persist,
        } => {
            if drive {
                engine.apply(pin, level, persist);
            } else if persist {
                engine.persist_level(pin, level);
            }
            Some(frame::seal(echo, OK))
        }
        Request::PersistedLevel { pin } => {
            let level = engine.persisted_level(pin);
            Some(frame::seal(echo, level_text(level)))
        }
        Request::LiveLevel { pin } => {
            let level = engine.live_level(pin);
            Some(frame::seal(echo, level_text(level)))
        }
        Request::QueryMode => {
            let mode = engine.enclosure_mode();
            Some(frame::seal(echo, &[mode.as_u8()]))
        }
        Request::SetMode { mode } => {
            engine.set_enclosure_mode(mode);
            Some(frame::seal(echo, OK))
        }
        Request::SetExtLevel { pin, level } => {
            engine.set_ext_persisted_level(pin, level);
            Some(frame::seal(echo, OK))
        }
        Request::ExtLevel { pin } => {
            let level = engine.ext_persisted_level(pin);
            Some(frame::seal(echo, level_text(level)))
        }
        Request::SetPowerOnDelay { seconds } => {
            engine.set_setting(GlobalSetting::PowerOnDelay, seconds);
            Some(frame::seal(echo, OK))
        }
        Request::PowerOnDelay => {
            let seconds = engine.setting(GlobalSetting::PowerOnDelay);
            Some(frame::seal(echo, &[seconds]))
        }
        Request::SetSuspendDisable { value } => {
            engine.set_setting(GlobalSetting::DisableOnSuspend, value);
            Some(frame::seal(echo, OK))
        }
        Request::SuspendDisable => {
            let value = engine.setting(GlobalSetting::DisableOnSuspend);
            Some(frame::seal(echo, level_text(LineLevel::from_u8(value))))
        }
        Request::SetUnmountDisable { value } => {
            engine.set_setting(GlobalSetting::DisableOnUnmount, value);
            Some(frame::seal(echo, OK))
        }
        Request::UnmountDisable => {
            let value = engine.setting(GlobalSetting::DisableOnUnmount);
            Some(frame::seal(echo, level_text(LineLevel::from_u8(value))))
        }
        Request::BulkStatus => {
            let mut levels = [0u8; STATUS_RAILS.len()];
            for (slot, id) in levels.iter_mut().zip(STATUS_RAILS) {
                *slot = engine.live_level(rail_by_id(id).pin).as_u8();
            }
            Some(frame::seal(echo, &levels))
        }
        Request::RestoreAll => {
            engine.restore_all();
            None
        }
        Request::Restart => {
            control.request_restart();
            None
        }
        Request::Reflash => {
            control.request_reflash();
            None
        }
        Request::Unknown { .. } => Some(frame::seal(echo, UNKNOWN)),
    }
}

/// Verifies, decodes, and executes one inbound report.
///
/// Integrity failures return `None` with zero side effects; the transport
/// must not transmit anything in that case.
pub fn handle_report<S, G, D, C>(
    report: &[u8],
    engine: &mut PowerRailEngine<S, G, D>,
    control: &mut C,
) -> Option<Report>
where
    S: ConfigStore,
    G: RailGpio,
    D: RailDelay,
    C: SystemControl,
{
    let request = Request::parse(report)?;
    execute(request, engine, control)
}
