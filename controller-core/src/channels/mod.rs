//! Catalog of the four fixed pulse-train channels.
//!
//! Channels are grouped the way the register map exposes them: the two BNC
//! outputs share `BNCS_STATE` and the two auxiliary signal outputs share
//! `SIGNAL_STATE`. Everything here is compile-time data so firmware and host
//! builds agree on naming and register routing.

use core::fmt;

use crate::registers::RegisterAddress;

/// Number of pulse-train channels driven by the controller.
pub const CHANNEL_COUNT: usize = 4;

/// Identifier for each pulse-train output.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ChannelId {
    Bnc0,
    Bnc1,
    SignalA,
    SignalB,
}

impl ChannelId {
    /// Every channel in index order.
    pub const ALL: [ChannelId; CHANNEL_COUNT] = [
        ChannelId::Bnc0,
        ChannelId::Bnc1,
        ChannelId::SignalA,
        ChannelId::SignalB,
    ];

    /// Deterministic index for lookups into [`ALL_CHANNELS`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            ChannelId::Bnc0 => 0,
            ChannelId::Bnc1 => 1,
            ChannelId::SignalA => 2,
            ChannelId::SignalB => 3,
        }
    }

    /// Attempts to construct a [`ChannelId`] from a raw index.
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ChannelId::Bnc0),
            1 => Some(ChannelId::Bnc1),
            2 => Some(ChannelId::SignalA),
            3 => Some(ChannelId::SignalB),
            _ => None,
        }
    }

    /// Bit used for this channel inside a [`ChannelMask`].
    #[must_use]
    pub const fn mask_bit(self) -> u8 {
        1 << self.as_index()
    }

    /// State-word group that owns this channel.
    #[must_use]
    pub const fn group(self) -> ChannelGroup {
        channel_by_id(self).group
    }

    /// Bit used for this channel inside its group's state word.
    #[must_use]
    pub const fn state_bit(self) -> u8 {
        channel_by_id(self).state_bit
    }

    /// Parameter registers backing this channel.
    #[must_use]
    pub const fn registers(self) -> ChannelRegisters {
        channel_by_id(self).registers
    }

    /// Short lowercase label used by the REPL (`bnc0`, `signal-a`, ...).
    #[must_use]
    pub const fn label(self) -> &'static str {
        channel_by_id(self).label
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(channel_by_id(*self).name)
    }
}

/// Channels sharing a state word register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ChannelGroup {
    Bncs,
    Signals,
}

impl ChannelGroup {
    /// Both groups in register order.
    pub const ALL: [ChannelGroup; 2] = [ChannelGroup::Bncs, ChannelGroup::Signals];

    /// Channels owned by the group, ordered by state-word bit.
    #[must_use]
    pub const fn channels(self) -> [ChannelId; 2] {
        match self {
            ChannelGroup::Bncs => [ChannelId::Bnc0, ChannelId::Bnc1],
            ChannelGroup::Signals => [ChannelId::SignalA, ChannelId::SignalB],
        }
    }

    /// Register exposing the group's active bits.
    #[must_use]
    pub const fn state_register(self) -> RegisterAddress {
        match self {
            ChannelGroup::Bncs => RegisterAddress::BncsState,
            ChannelGroup::Signals => RegisterAddress::SignalState,
        }
    }

    /// Mask of every defined bit in the group's state word.
    #[must_use]
    pub const fn state_mask(self) -> u8 {
        let [first, second] = self.channels();
        first.state_bit() | second.state_bit()
    }

    /// Group owning the provided state register, if any.
    #[must_use]
    pub const fn from_state_register(address: RegisterAddress) -> Option<Self> {
        match address {
            RegisterAddress::BncsState => Some(ChannelGroup::Bncs),
            RegisterAddress::SignalState => Some(ChannelGroup::Signals),
            _ => None,
        }
    }
}

/// Register addresses holding one channel's interval descriptor.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChannelRegisters {
    pub on: RegisterAddress,
    pub off: RegisterAddress,
    pub pulses: RegisterAddress,
    pub tail: RegisterAddress,
}

/// Metadata describing how a channel is routed on the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChannelLine {
    pub id: ChannelId,
    pub name: &'static str,
    pub label: &'static str,
    pub mcu_pin: &'static str,
    pub group: ChannelGroup,
    pub state_bit: u8,
    pub registers: ChannelRegisters,
}

impl ChannelLine {
    pub const fn new(
        id: ChannelId,
        name: &'static str,
        label: &'static str,
        mcu_pin: &'static str,
        group: ChannelGroup,
        state_bit: u8,
        registers: ChannelRegisters,
    ) -> Self {
        Self {
            id,
            name,
            label,
            mcu_pin,
            group,
            state_bit,
            registers,
        }
    }
}

/// Compile-time catalog of every pulse-train channel.
pub const ALL_CHANNELS: [ChannelLine; CHANNEL_COUNT] = [
    ChannelLine::new(
        ChannelId::Bnc0,
        "BNC0",
        "bnc0",
        "PA0",
        ChannelGroup::Bncs,
        1 << 0,
        ChannelRegisters {
            on: RegisterAddress::Bnc0On,
            off: RegisterAddress::Bnc0Off,
            pulses: RegisterAddress::Bnc0Pulses,
            tail: RegisterAddress::Bnc0Tail,
        },
    ),
    ChannelLine::new(
        ChannelId::Bnc1,
        "BNC1",
        "bnc1",
        "PA1",
        ChannelGroup::Bncs,
        1 << 1,
        ChannelRegisters {
            on: RegisterAddress::Bnc1On,
            off: RegisterAddress::Bnc1Off,
            pulses: RegisterAddress::Bnc1Pulses,
            tail: RegisterAddress::Bnc1Tail,
        },
    ),
    ChannelLine::new(
        ChannelId::SignalA,
        "SIGNAL_A",
        "signal-a",
        "PA6",
        ChannelGroup::Signals,
        1 << 0,
        ChannelRegisters {
            on: RegisterAddress::SignalAOn,
            off: RegisterAddress::SignalAOff,
            pulses: RegisterAddress::SignalAPulses,
            tail: RegisterAddress::SignalATail,
        },
    ),
    ChannelLine::new(
        ChannelId::SignalB,
        "SIGNAL_B",
        "signal-b",
        "PA7",
        ChannelGroup::Signals,
        1 << 1,
        ChannelRegisters {
            on: RegisterAddress::SignalBOn,
            off: RegisterAddress::SignalBOff,
            pulses: RegisterAddress::SignalBPulses,
            tail: RegisterAddress::SignalBTail,
        },
    ),
];

/// Returns the static metadata for a channel.
#[must_use]
pub const fn channel_by_id(id: ChannelId) -> ChannelLine {
    ALL_CHANNELS[id.as_index()]
}

/// Finds a channel by REPL label or board name (case insensitive).
#[must_use]
pub fn channel_by_label(label: &str) -> Option<ChannelId> {
    ALL_CHANNELS
        .iter()
        .find(|line| line.label.eq_ignore_ascii_case(label) || line.name.eq_ignore_ascii_case(label))
        .map(|line| line.id)
}

/// Compact set of channels, one bit per [`ChannelId`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChannelMask(u8);

impl ChannelMask {
    /// Mask with no channels set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Mask containing every channel.
    #[must_use]
    pub const fn all() -> Self {
        Self(0b1111)
    }

    /// Mask containing a single channel.
    #[must_use]
    pub const fn only(id: ChannelId) -> Self {
        Self(id.mask_bit())
    }

    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn contains(self, id: ChannelId) -> bool {
        self.0 & id.mask_bit() != 0
    }

    pub fn insert(&mut self, id: ChannelId) {
        self.0 |= id.mask_bit();
    }

    pub fn remove(&mut self, id: ChannelId) {
        self.0 &= !id.mask_bit();
    }

    /// Returns the union of two masks.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Number of channels in the mask.
    #[must_use]
    pub const fn len(self) -> u32 {
        self.0.count_ones()
    }

    /// Iterates the contained channels in index order.
    pub fn iter(self) -> impl Iterator<Item = ChannelId> {
        ChannelId::ALL
            .into_iter()
            .filter(move |id| self.contains(*id))
    }

    /// Returns `true` when any channel of `group` is set.
    #[must_use]
    pub fn touches(self, group: ChannelGroup) -> bool {
        group.channels().iter().any(|id| self.contains(*id))
    }
}

impl FromIterator<ChannelId> for ChannelMask {
    fn from_iter<I: IntoIterator<Item = ChannelId>>(iter: I) -> Self {
        let mut mask = ChannelMask::empty();
        for id in iter {
            mask.insert(id);
        }
        mask
    }
}
