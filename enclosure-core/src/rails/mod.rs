//! Rail and sense-pin catalog shared by firmware and host targets.
//!
//! The controllable power rails are fixed at compile time: they exist for the
//! life of the process and only their persisted levels change. Everything in
//! this module is `no_std` friendly so the same catalog can be compiled for
//! the MCU firmware and the host-side emulator.

/// Stable, process-wide identifier for a GPIO line.
///
/// The number is the wire-protocol pin identifier carried in command reports
/// and persistence keys; the firmware maps it onto a concrete MCU pin.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PinId(u8);

impl PinId {
    /// Wraps a raw protocol pin number.
    #[must_use]
    pub const fn new(raw: u8) -> Self {
        Self(raw)
    }

    /// Returns the raw protocol pin number.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

/// Logical level of a power rail or sense line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineLevel {
    Low,
    High,
}

impl LineLevel {
    /// Decodes a persisted or wire byte; any non-zero value reads as high.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        if raw == 0 {
            LineLevel::Low
        } else {
            LineLevel::High
        }
    }

    /// Encodes the level as a single byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            LineLevel::Low => 0,
            LineLevel::High => 1,
        }
    }

    /// Returns `true` for [`LineLevel::High`].
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, LineLevel::High)
    }
}

/// Power-up timing behavior applied when a rail restores to high.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DelayClass {
    /// Assert the rail as soon as the persisted level is known.
    Immediate,
    /// Wait the persisted power-on delay before asserting, limiting
    /// simultaneous inrush current across spinning drives.
    Staggered,
}

/// Identifier for the controllable rails exposed by the enclosure.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RailId {
    Hub,
    Sata1,
    Indicator,
    Sata2,
    Nvme,
    Fan,
    Mux,
}

impl RailId {
    /// Deterministic index for lookups into [`ALL_RAILS`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            RailId::Hub => 0,
            RailId::Sata1 => 1,
            RailId::Indicator => 2,
            RailId::Sata2 => 3,
            RailId::Nvme => 4,
            RailId::Fan => 5,
            RailId::Mux => 6,
        }
    }

    /// Attempts to construct a [`RailId`] from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(RailId::Hub),
            1 => Some(RailId::Sata1),
            2 => Some(RailId::Indicator),
            3 => Some(RailId::Sata2),
            4 => Some(RailId::Nvme),
            5 => Some(RailId::Fan),
            6 => Some(RailId::Mux),
            _ => None,
        }
    }
}

/// Metadata describing one controllable power rail.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Rail {
    pub id: RailId,
    pub name: &'static str,
    pub pin: PinId,
    /// Rails with a shadow key restore from `ext_gpio_{pin}` while the
    /// enclosure is externally powered and the supply is actually present.
    pub has_ext_shadow: bool,
    pub delay_class: DelayClass,
}

impl Rail {
    #[must_use]
    pub const fn new(
        id: RailId,
        name: &'static str,
        pin: PinId,
        has_ext_shadow: bool,
        delay_class: DelayClass,
    ) -> Self {
        Self {
            id,
            name,
            pin,
            has_ext_shadow,
            delay_class,
        }
    }
}

/// Compile-time catalog of every managed rail, in restore order.
///
/// The mode-dependent rails come first, then the always-internal fan and mux
/// rails; `restore_all` walks this array front to back so restore output is
/// deterministic.
pub const ALL_RAILS: [Rail; 7] = [
    Rail::new(
        RailId::Hub,
        "HUB",
        PinId::new(33),
        true,
        DelayClass::Immediate,
    ),
    Rail::new(
        RailId::Sata1,
        "SATA1",
        PinId::new(34),
        true,
        DelayClass::Staggered,
    ),
    Rail::new(
        RailId::Indicator,
        "IND",
        PinId::new(35),
        true,
        DelayClass::Immediate,
    ),
    Rail::new(
        RailId::Sata2,
        "SATA2",
        PinId::new(38),
        true,
        DelayClass::Staggered,
    ),
    Rail::new(
        RailId::Nvme,
        "NVME",
        PinId::new(45),
        true,
        DelayClass::Immediate,
    ),
    Rail::new(
        RailId::Fan,
        "FAN",
        PinId::new(36),
        false,
        DelayClass::Immediate,
    ),
    Rail::new(
        RailId::Mux,
        "MUX",
        PinId::new(37),
        false,
        DelayClass::Immediate,
    ),
];

/// Fixed rail set reported by the bulk status opcode, in payload order.
pub const STATUS_RAILS: [RailId; 4] = [RailId::Hub, RailId::Sata1, RailId::Sata2, RailId::Nvme];

/// Retrieve rail metadata by identifier.
#[must_use]
pub const fn rail_by_id(id: RailId) -> Rail {
    ALL_RAILS[id.as_index()]
}

/// Looks up the rail driven through `pin`, if any.
#[must_use]
pub fn rail_by_pin(pin: PinId) -> Option<&'static Rail> {
    ALL_RAILS.iter().find(|rail| rail.pin == pin)
}

/// Sense input that reports whether the external supply is energized.
pub const EXT_POWER_SENSE: PinId = PinId::new(1);

/// Drive-presence sense input for the SATA1 bay.
pub const SATA1_PRESENCE_SENSE: PinId = PinId::new(11);

/// Drive-presence sense input for the SATA2 (M.2) bay.
pub const SATA2_PRESENCE_SENSE: PinId = PinId::new(12);

/// Presence sense input for the NVMe bay.
pub const NVME_PRESENCE_SENSE: PinId = PinId::new(13);

/// Whether the enclosure draws power from the host bus or an external supply.
///
/// The mode selects which persisted key governs rail restore; it is persisted
/// under [`crate::config::GlobalSetting::EnclosureMode`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EnclosureMode {
    InternallyPowered,
    ExternallyPowered,
}

impl EnclosureMode {
    /// Decodes the persisted mode byte; any non-zero value reads as external.
    #[must_use]
    pub const fn from_u8(raw: u8) -> Self {
        if raw == 0 {
            EnclosureMode::InternallyPowered
        } else {
            EnclosureMode::ExternallyPowered
        }
    }

    /// Encodes the mode as its persisted byte.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            EnclosureMode::InternallyPowered => 0,
            EnclosureMode::ExternallyPowered => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rail_lookup_returns_expected_metadata() {
        let sata1 = rail_by_id(RailId::Sata1);
        assert_eq!(sata1.name, "SATA1");
        assert_eq!(sata1.pin, PinId::new(34));
        assert!(sata1.has_ext_shadow);
        assert_eq!(sata1.delay_class, DelayClass::Staggered);

        let fan = rail_by_id(RailId::Fan);
        assert!(!fan.has_ext_shadow);
        assert_eq!(fan.delay_class, DelayClass::Immediate);
    }

    #[test]
    fn pin_lookup_finds_only_managed_rails() {
        assert_eq!(rail_by_pin(PinId::new(38)).map(|rail| rail.id), Some(RailId::Sata2));
        assert!(rail_by_pin(PinId::new(2)).is_none());
        assert!(rail_by_pin(SATA1_PRESENCE_SENSE).is_none());
    }

    #[test]
    fn catalog_positions_match_indices() {
        for (position, rail) in ALL_RAILS.iter().enumerate() {
            assert_eq!(rail.id.as_index(), position);
        }
    }

    #[test]
    fn rail_indices_round_trip() {
        for rail in &ALL_RAILS {
            assert_eq!(RailId::from_index(rail.id.as_index()), Some(rail.id));
        }
        assert!(RailId::from_index(ALL_RAILS.len()).is_none());
    }

    #[test]
    fn mode_byte_encoding_matches_wire_values() {
        assert_eq!(EnclosureMode::from_u8(0), EnclosureMode::InternallyPowered);
        assert_eq!(EnclosureMode::from_u8(1), EnclosureMode::ExternallyPowered);
        assert_eq!(EnclosureMode::from_u8(0x7F), EnclosureMode::ExternallyPowered);
        assert_eq!(EnclosureMode::ExternallyPowered.as_u8(), 1);
    }
}
