//! Interactive session over a simulated enclosure.
//!
//! The session drives the same engine, protocol, and hot-plug code the
//! firmware runs, swapping the MCU seams for in-memory fakes. Operator
//! commands are turned into signed wire frames and fed through the report
//! handler, so what prints here is what a host would receive.

use std::collections::HashMap;

use enclosure_core::config::ConfigStore;
use enclosure_core::hotplug::{self, HotplugEvent, HotplugHandler, HotplugRegistry};
use enclosure_core::power::{PowerRailEngine, RailDelay, RailGpio};
use enclosure_core::protocol::{
    self, PING_TARGET, REPORT_LEN, Report, SystemControl, TAG_LEN, frame, opcode,
};
use enclosure_core::rails::{
    ALL_RAILS, EXT_POWER_SENSE, EnclosureMode, LineLevel, NVME_PRESENCE_SENSE, PinId, RailId,
    SATA1_PRESENCE_SENSE, SATA2_PRESENCE_SENSE,
};

const HELP: &[&str] = &[
    "ping                          - liveness probe",
    "set <pin> <high|low> [persist] [nodrive]",
    "                              - drive and/or persist a rail level",
    "get <pin>                     - read the persisted level",
    "live <pin>                    - read the live level",
    "ext <pin> [high|low]          - read or persist the external-mode level",
    "mode [internal|external]      - read or persist the enclosure mode",
    "delay [seconds]               - read or persist the power-on delay",
    "status                        - live levels of the status rails",
    "restore                       - run a full restore pass",
    "restart | reflash             - issue the control opcodes",
    "plug <pin> <high|low>         - simulate a sense-pin edge",
    "raw <hex...> [unsigned]       - inject an arbitrary report",
    "rails                         - show every managed rail",
    "exit | quit                   - end the session",
];

#[derive(Default)]
struct MemoryStore {
    entries: HashMap<String, u8>,
}

impl ConfigStore for MemoryStore {
    fn get(&mut self, key: &str) -> Option<u8> {
        self.entries.get(key).copied()
    }

    fn set(&mut self, key: &str, value: u8) {
        self.entries.insert(key.to_owned(), value);
    }
}

#[derive(Default)]
struct SimGpio {
    levels: HashMap<u8, u8>,
}

impl SimGpio {
    fn set_input(&mut self, pin: PinId, level: LineLevel) {
        self.levels.insert(pin.raw(), level.as_u8());
    }

    fn level(&self, pin: PinId) -> u8 {
        self.levels.get(&pin.raw()).copied().unwrap_or(0)
    }
}

impl RailGpio for SimGpio {
    fn read_level(&mut self, pin: PinId) -> LineLevel {
        LineLevel::from_u8(self.level(pin))
    }

    fn write_level(&mut self, pin: PinId, level: LineLevel) {
        self.levels.insert(pin.raw(), level.as_u8());
    }
}

/// Delay provider that tallies seconds instead of sleeping.
#[derive(Default)]
struct RecordingDelay {
    total_seconds: u64,
}

impl RailDelay for RecordingDelay {
    fn delay_seconds(&mut self, seconds: u8) {
        self.total_seconds += u64::from(seconds);
    }
}

#[derive(Default)]
struct SimControl {
    restarts: u32,
    reflashes: u32,
}

impl SystemControl for SimControl {
    fn request_restart(&mut self) {
        self.restarts += 1;
    }

    fn request_reflash(&mut self) {
        self.reflashes += 1;
    }
}

type SimEngine = PowerRailEngine<MemoryStore, SimGpio, RecordingDelay>;

pub struct Session {
    engine: SimEngine,
    control: SimControl,
    registry: HotplugRegistry,
}

impl Session {
    #[allow(clippy::new_without_default)]
    #[must_use]
    pub fn new() -> Self {
        let mut engine = PowerRailEngine::new(
            MemoryStore::default(),
            SimGpio::default(),
            RecordingDelay::default(),
        );
        engine.restore_all();

        let mut registry = HotplugRegistry::new();
        let bindings = [
            (
                SATA1_PRESENCE_SENSE,
                HotplugHandler::DrivePresence { rail: RailId::Sata1 },
            ),
            (
                SATA2_PRESENCE_SENSE,
                HotplugHandler::DrivePresence { rail: RailId::Sata2 },
            ),
            (
                NVME_PRESENCE_SENSE,
                HotplugHandler::RailFollower { rail: RailId::Nvme },
            ),
            (EXT_POWER_SENSE, HotplugHandler::BusPower),
        ];
        for (pin, handler) in bindings {
            registry
                .register(pin, handler)
                .expect("registry sized for the sense pins");
        }

        Self {
            engine,
            control: SimControl::default(),
            registry,
        }
    }

    pub fn handle_command(&mut self, line: &str) -> Vec<String> {
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else {
            return Vec::new();
        };
        let args: Vec<&str> = parts.collect();

        match command.to_ascii_lowercase().as_str() {
            "help" => HELP.iter().map(|entry| (*entry).to_owned()).collect(),
            "ping" => self.roundtrip(build_frame(PING_TARGET, 0x00, |_| {})),
            "set" => self.cmd_set(&args),
            "get" => self.cmd_pin_query(&args, opcode::GET_PERSISTED),
            "live" => self.cmd_pin_query(&args, opcode::GET_LIVE),
            "ext" => self.cmd_ext(&args),
            "mode" => self.cmd_mode(&args),
            "delay" => self.cmd_delay(&args),
            "status" => self.roundtrip(build_frame(0, opcode::BULK_STATUS, |_| {})),
            "restore" => {
                let mut out = self.roundtrip(build_frame(0, opcode::RESTORE_ALL, |_| {}));
                out.push(self.rail_summary());
                out
            }
            "restart" => {
                let mut out = self.roundtrip(build_frame(0, opcode::RESTART, |_| {}));
                out.push(format!("restarts so far: {}", self.control.restarts));
                out
            }
            "reflash" => {
                let mut out = self.roundtrip(build_frame(0, opcode::REFLASH, |_| {}));
                out.push(format!("reflashes so far: {}", self.control.reflashes));
                out
            }
            "plug" => self.cmd_plug(&args),
            "raw" => self.cmd_raw(&args),
            "rails" => vec![self.rail_summary()],
            other => vec![format!("Unknown command `{other}`. Type `help`.")],
        }
    }

    fn cmd_set(&mut self, args: &[&str]) -> Vec<String> {
        let (Some(pin), Some(level)) = (
            args.first().and_then(|raw| parse_pin(raw)),
            args.get(1).and_then(|raw| parse_level(raw)),
        ) else {
            return vec!["Usage: set <pin> <high|low> [persist] [nodrive]".to_owned()];
        };

        let persist = args.contains(&"persist");
        let drive = !args.contains(&"nodrive");
        let op = if level.is_high() {
            opcode::SET_HIGH
        } else {
            opcode::SET_LOW
        };

        self.roundtrip(build_frame(pin.raw(), op, |report| {
            report[2] = u8::from(persist);
            report[5] = u8::from(drive);
        }))
    }

    fn cmd_pin_query(&mut self, args: &[&str], op: u8) -> Vec<String> {
        let Some(pin) = args.first().and_then(|raw| parse_pin(raw)) else {
            return vec!["Usage: <command> <pin>".to_owned()];
        };
        self.roundtrip(build_frame(pin.raw(), op, |_| {}))
    }

    fn cmd_ext(&mut self, args: &[&str]) -> Vec<String> {
        let Some(pin) = args.first().and_then(|raw| parse_pin(raw)) else {
            return vec!["Usage: ext <pin> [high|low]".to_owned()];
        };

        match args.get(1) {
            None => self.roundtrip(build_frame(pin.raw(), opcode::GET_EXT_LEVEL, |_| {})),
            Some(raw) => {
                let Some(level) = parse_level(raw) else {
                    return vec![format!("Unknown level `{raw}`")];
                };
                self.roundtrip(build_frame(pin.raw(), opcode::SET_EXT_LEVEL, |report| {
                    report[4] = level.as_u8();
                }))
            }
        }
    }

    fn cmd_mode(&mut self, args: &[&str]) -> Vec<String> {
        match args.first() {
            None => {
                let mut out = self.roundtrip(build_frame(0, opcode::GET_MODE, |_| {}));
                let mode = self.engine.enclosure_mode();
                out.push(format!("mode: {}", mode_name(mode)));
                out
            }
            Some(&"internal") => self.roundtrip(build_frame(0, opcode::SET_MODE, |_| {})),
            Some(&"external") => self.roundtrip(build_frame(1, opcode::SET_MODE, |_| {})),
            Some(other) => vec![format!("Unknown mode `{other}`")],
        }
    }

    fn cmd_delay(&mut self, args: &[&str]) -> Vec<String> {
        match args.first() {
            None => self.roundtrip(build_frame(0, opcode::GET_POWER_ON_DELAY, |_| {})),
            Some(raw) => match raw.parse::<u8>() {
                Ok(seconds) => {
                    self.roundtrip(build_frame(seconds, opcode::SET_POWER_ON_DELAY, |_| {}))
                }
                Err(_) => vec![format!("Invalid delay `{raw}`")],
            },
        }
    }

    fn cmd_plug(&mut self, args: &[&str]) -> Vec<String> {
        let (Some(pin), Some(level)) = (
            args.first().and_then(|raw| parse_pin(raw)),
            args.get(1).and_then(|raw| parse_level(raw)),
        ) else {
            return vec!["Usage: plug <pin> <high|low>".to_owned()];
        };

        self.engine.gpio_mut().set_input(pin, level);
        let handled = hotplug::dispatch(
            HotplugEvent::new(pin),
            &self.registry,
            &mut self.engine,
            &mut self.control,
        );

        if handled {
            vec![
                format!("edge on pin {} handled", pin.raw()),
                self.rail_summary(),
            ]
        } else {
            vec![format!("no handler registered for pin {}", pin.raw())]
        }
    }

    fn cmd_raw(&mut self, args: &[&str]) -> Vec<String> {
        let unsigned = args.last() == Some(&"unsigned");
        let hex_args = if unsigned {
            &args[..args.len() - 1]
        } else {
            args
        };

        let mut report: Report = [0u8; REPORT_LEN];
        if hex_args.is_empty() || hex_args.len() > REPORT_LEN {
            return vec!["Usage: raw <hex byte>... [unsigned]".to_owned()];
        }
        for (slot, raw) in report.iter_mut().zip(hex_args) {
            match u8::from_str_radix(raw.trim_start_matches("0x"), 16) {
                Ok(byte) => *slot = byte,
                Err(_) => return vec![format!("Invalid hex byte `{raw}`")],
            }
        }
        if !unsigned {
            frame::sign(&mut report);
        }

        self.roundtrip(report)
    }

    fn roundtrip(&mut self, report: Report) -> Vec<String> {
        match protocol::handle_report(&report, &mut self.engine, &mut self.control) {
            Some(response) => vec![describe_response(&response)],
            None => vec!["(no response)".to_owned()],
        }
    }

    fn rail_summary(&mut self) -> String {
        let mut parts = Vec::new();
        for rail in &ALL_RAILS {
            let level = self.engine.live_level(rail.pin);
            parts.push(format!(
                "{}={}",
                rail.name,
                if level.is_high() { "HIGH" } else { "LOW" }
            ));
        }
        parts.join(" ")
    }
}

fn build_frame(target: u8, op: u8, fill: impl FnOnce(&mut Report)) -> Report {
    let mut report: Report = [0u8; REPORT_LEN];
    report[0] = target;
    report[1] = op;
    fill(&mut report);
    frame::sign(&mut report);
    report
}

fn describe_response(response: &Report) -> String {
    let payload = &response[1..REPORT_LEN - TAG_LEN];
    let trimmed = match payload.iter().rposition(|&byte| byte != 0) {
        Some(last) => &payload[..=last],
        None => &[],
    };

    let body = if !trimmed.is_empty() && trimmed.iter().all(|byte| byte.is_ascii_graphic()) {
        String::from_utf8_lossy(trimmed).into_owned()
    } else {
        trimmed
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<Vec<_>>()
            .join(" ")
    };

    let tag = if frame::verify(response) {
        "tag ok"
    } else {
        "TAG INVALID"
    };

    format!("<- op=0x{:02x} [{body}] ({tag})", response[0])
}

fn parse_pin(raw: &str) -> Option<PinId> {
    raw.parse::<u8>().ok().map(PinId::new)
}

fn parse_level(raw: &str) -> Option<LineLevel> {
    if raw.eq_ignore_ascii_case("high") || raw == "1" {
        Some(LineLevel::High)
    } else if raw.eq_ignore_ascii_case("low") || raw == "0" {
        Some(LineLevel::Low)
    } else {
        None
    }
}

fn mode_name(mode: EnclosureMode) -> &'static str {
    match mode {
        EnclosureMode::InternallyPowered => "internal",
        EnclosureMode::ExternallyPowered => "external",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips_over_the_wire() {
        let mut session = Session::new();

        let out = session.handle_command("set 34 high persist");
        assert!(out[0].contains("OK"), "{out:?}");

        let out = session.handle_command("get 34");
        assert!(out[0].contains("HIGH"), "{out:?}");

        let out = session.handle_command("live 34");
        assert!(out[0].contains("HIGH"), "{out:?}");
    }

    #[test]
    fn unsigned_raw_frame_gets_no_response() {
        let mut session = Session::new();
        let out = session.handle_command("raw fe 00 unsigned");
        assert_eq!(out, vec!["(no response)".to_owned()]);
    }

    #[test]
    fn plugging_a_drive_respects_persisted_intent() {
        let mut session = Session::new();
        session.handle_command("set 34 high persist");

        let out = session.handle_command("plug 11 low");
        assert!(out[1].contains("SATA1=LOW"), "{out:?}");

        let out = session.handle_command("plug 11 high");
        assert!(out[1].contains("SATA1=HIGH"), "{out:?}");
    }

    #[test]
    fn rails_summary_lists_every_rail() {
        let mut session = Session::new();
        let out = session.handle_command("rails");
        for rail in &ALL_RAILS {
            assert!(out[0].contains(rail.name), "{out:?}");
        }
    }

    #[test]
    fn mode_commands_round_trip() {
        let mut session = Session::new();
        session.handle_command("mode external");
        let out = session.handle_command("mode");
        assert!(out.iter().any(|line| line.contains("external")), "{out:?}");
    }
}
