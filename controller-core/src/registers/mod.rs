//! Application register map and storage.
//!
//! The controller exposes a dense window of registers starting at
//! [`REGISTER_BASE`]. Each address carries a fixed element type; reads and
//! writes are validated against the map before any handler runs. The map is a
//! const table checked once at startup by [`validate_register_map`], so a
//! mistake in the table surfaces as a boot error instead of silent aliasing.

use core::fmt;

use crate::channels::{ChannelId, ChannelRegisters};
use crate::engine::IntervalDescriptor;

/// First application register address.
pub const REGISTER_BASE: u8 = 0x20;

/// Number of application registers.
pub const REGISTER_COUNT: usize = 31;

/// Event-enable bit gating SPAD switch reports and relay changes.
pub const EVENT_SPAD_SWITCH: u8 = 1 << 0;
/// Event-enable bit gating laser key reports.
pub const EVENT_LASER_STATE: u8 = 1 << 1;
/// Event-enable bit gating channel completion reports.
pub const EVENT_CHANNEL_STATE: u8 = 1 << 2;
/// Events enabled after reset.
pub const DEFAULT_EVENT_ENABLE: u8 = EVENT_SPAD_SWITCH | EVENT_LASER_STATE | EVENT_CHANNEL_STATE;

/// Element type for a register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterType {
    U8,
    U16,
}

impl fmt::Display for RegisterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterType::U8 => f.pad("u8"),
            RegisterType::U16 => f.pad("u16"),
        }
    }
}

/// Typed register payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterValue {
    U8(u8),
    U16(u16),
}

impl RegisterValue {
    #[must_use]
    pub const fn ty(self) -> RegisterType {
        match self {
            RegisterValue::U8(_) => RegisterType::U8,
            RegisterValue::U16(_) => RegisterType::U16,
        }
    }

    /// Widens the payload regardless of its element type.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        match self {
            RegisterValue::U8(value) => value as u16,
            RegisterValue::U16(value) => value,
        }
    }

    /// Builds a payload of type `ty`, rejecting values that do not fit.
    #[must_use]
    pub fn from_integer(ty: RegisterType, value: u32) -> Option<Self> {
        match ty {
            RegisterType::U8 => u8::try_from(value).ok().map(RegisterValue::U8),
            RegisterType::U16 => u16::try_from(value).ok().map(RegisterValue::U16),
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterValue::U8(value) => write!(f, "{value} (0x{value:02x})"),
            RegisterValue::U16(value) => write!(f, "{value} (0x{value:04x})"),
        }
    }
}

/// Application register addresses.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[repr(u8)]
pub enum RegisterAddress {
    SpadSwitch = 32,
    LaserState = 33,
    Reserved0 = 34,
    Reserved1 = 35,
    Reserved2 = 36,
    Reserved3 = 37,
    LaserFrequencySelect = 38,
    LaserIntensity = 39,
    OutputSet = 40,
    OutputClear = 41,
    OutputToggle = 42,
    OutputState = 43,
    BncsState = 44,
    SignalState = 45,
    Bnc0On = 46,
    Bnc0Off = 47,
    Bnc0Pulses = 48,
    Bnc0Tail = 49,
    Bnc1On = 50,
    Bnc1Off = 51,
    Bnc1Pulses = 52,
    Bnc1Tail = 53,
    SignalAOn = 54,
    SignalAOff = 55,
    SignalAPulses = 56,
    SignalATail = 57,
    SignalBOn = 58,
    SignalBOff = 59,
    SignalBPulses = 60,
    SignalBTail = 61,
    EventEnable = 62,
}

impl RegisterAddress {
    /// Wire address of the register.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self as u8
    }

    /// Offset of the register inside [`REGISTER_MAP`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        (self.raw() - REGISTER_BASE) as usize
    }

    /// Resolves a wire address.
    #[must_use]
    pub fn from_raw(raw: u8) -> Option<Self> {
        let index = raw.checked_sub(REGISTER_BASE)?;
        REGISTER_MAP
            .get(usize::from(index))
            .map(|spec| spec.address)
    }

    /// Static description of the register.
    #[must_use]
    pub const fn spec(self) -> RegisterSpec {
        REGISTER_MAP[self.as_index()]
    }
}

impl fmt::Display for RegisterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().name)
    }
}

/// Whether host writes reach a register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AccessMode {
    ReadWrite,
    /// Writes are accepted on the wire and ignored.
    ReadOnly,
}

impl AccessMode {
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, AccessMode::ReadWrite)
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessMode::ReadWrite => f.pad("rw"),
            AccessMode::ReadOnly => f.pad("ro"),
        }
    }
}

/// Map entry for a single register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RegisterSpec {
    pub address: RegisterAddress,
    pub name: &'static str,
    pub ty: RegisterType,
    pub access: AccessMode,
}

impl RegisterSpec {
    const fn u8(address: RegisterAddress, name: &'static str) -> Self {
        Self {
            address,
            name,
            ty: RegisterType::U8,
            access: AccessMode::ReadWrite,
        }
    }

    const fn u16(address: RegisterAddress, name: &'static str) -> Self {
        Self {
            address,
            name,
            ty: RegisterType::U16,
            access: AccessMode::ReadWrite,
        }
    }

    const fn read_only(self) -> Self {
        Self {
            access: AccessMode::ReadOnly,
            ..self
        }
    }
}

/// Dense register map ordered by address.
pub const REGISTER_MAP: [RegisterSpec; REGISTER_COUNT] = [
    RegisterSpec::u8(RegisterAddress::SpadSwitch, "spad-switch"),
    RegisterSpec::u8(RegisterAddress::LaserState, "laser-state").read_only(),
    RegisterSpec::u16(RegisterAddress::Reserved0, "reserved0"),
    RegisterSpec::u16(RegisterAddress::Reserved1, "reserved1"),
    RegisterSpec::u8(RegisterAddress::Reserved2, "reserved2"),
    RegisterSpec::u8(RegisterAddress::Reserved3, "reserved3"),
    RegisterSpec::u8(RegisterAddress::LaserFrequencySelect, "frequency"),
    RegisterSpec::u8(RegisterAddress::LaserIntensity, "intensity"),
    RegisterSpec::u8(RegisterAddress::OutputSet, "output-set"),
    RegisterSpec::u8(RegisterAddress::OutputClear, "output-clear"),
    RegisterSpec::u8(RegisterAddress::OutputToggle, "output-toggle"),
    RegisterSpec::u8(RegisterAddress::OutputState, "output-state"),
    RegisterSpec::u8(RegisterAddress::BncsState, "bncs-state"),
    RegisterSpec::u8(RegisterAddress::SignalState, "signal-state"),
    RegisterSpec::u16(RegisterAddress::Bnc0On, "bnc0-on"),
    RegisterSpec::u16(RegisterAddress::Bnc0Off, "bnc0-off"),
    RegisterSpec::u16(RegisterAddress::Bnc0Pulses, "bnc0-pulses"),
    RegisterSpec::u16(RegisterAddress::Bnc0Tail, "bnc0-tail"),
    RegisterSpec::u16(RegisterAddress::Bnc1On, "bnc1-on"),
    RegisterSpec::u16(RegisterAddress::Bnc1Off, "bnc1-off"),
    RegisterSpec::u16(RegisterAddress::Bnc1Pulses, "bnc1-pulses"),
    RegisterSpec::u16(RegisterAddress::Bnc1Tail, "bnc1-tail"),
    RegisterSpec::u16(RegisterAddress::SignalAOn, "signal-a-on"),
    RegisterSpec::u16(RegisterAddress::SignalAOff, "signal-a-off"),
    RegisterSpec::u16(RegisterAddress::SignalAPulses, "signal-a-pulses"),
    RegisterSpec::u16(RegisterAddress::SignalATail, "signal-a-tail"),
    RegisterSpec::u16(RegisterAddress::SignalBOn, "signal-b-on"),
    RegisterSpec::u16(RegisterAddress::SignalBOff, "signal-b-off"),
    RegisterSpec::u16(RegisterAddress::SignalBPulses, "signal-b-pulses"),
    RegisterSpec::u16(RegisterAddress::SignalBTail, "signal-b-tail"),
    RegisterSpec::u8(RegisterAddress::EventEnable, "event-enable"),
];

/// Finds a register by its REPL name (case insensitive).
#[must_use]
pub fn register_by_name(name: &str) -> Option<RegisterAddress> {
    REGISTER_MAP
        .iter()
        .find(|spec| spec.name.eq_ignore_ascii_case(name))
        .map(|spec| spec.address)
}

/// Structural problems detected in [`REGISTER_MAP`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterMapError {
    /// Entry `index` does not hold the address its position implies.
    Misplaced { index: usize, found: u8 },
    /// Two entries share a name.
    DuplicateName(&'static str),
}

impl fmt::Display for RegisterMapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterMapError::Misplaced { index, found } => {
                write!(f, "register map slot {index} holds address {found}")
            }
            RegisterMapError::DuplicateName(name) => {
                write!(f, "register name `{name}` appears twice")
            }
        }
    }
}

/// Checks that the register map is dense, ordered, and uniquely named.
///
/// # Errors
///
/// Returns the first structural problem found in [`REGISTER_MAP`].
pub fn validate_register_map() -> Result<(), RegisterMapError> {
    check_map(&REGISTER_MAP)
}

fn check_map(map: &[RegisterSpec]) -> Result<(), RegisterMapError> {
    for (index, spec) in map.iter().enumerate() {
        let expected = usize::from(REGISTER_BASE) + index;
        if usize::from(spec.address.raw()) != expected {
            return Err(RegisterMapError::Misplaced {
                index,
                found: spec.address.raw(),
            });
        }

        if map[..index]
            .iter()
            .any(|earlier| earlier.name.eq_ignore_ascii_case(spec.name))
        {
            return Err(RegisterMapError::DuplicateName(spec.name));
        }
    }

    Ok(())
}

/// Errors raised by register access.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterError {
    /// Address outside the application window.
    OutOfRange(u8),
    /// Payload type does not match the register's declared type.
    TypeMismatch {
        address: RegisterAddress,
        expected: RegisterType,
        found: RegisterType,
    },
}

impl fmt::Display for RegisterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterError::OutOfRange(raw) => write!(f, "address {raw} out of range"),
            RegisterError::TypeMismatch {
                address,
                expected,
                found,
            } => write!(f, "{address} expects {expected}, got {found}"),
        }
    }
}

/// Backing storage for every application register.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RegisterBank {
    values: [u16; REGISTER_COUNT],
}

impl RegisterBank {
    /// Creates a bank holding boot defaults.
    #[must_use]
    pub const fn new() -> Self {
        let mut values = [0; REGISTER_COUNT];
        values[RegisterAddress::EventEnable.as_index()] = DEFAULT_EVENT_ENABLE as u16;
        Self { values }
    }

    /// Restores boot defaults.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Resolves and type-checks an access without touching storage.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::OutOfRange`] for addresses outside the window
    /// and [`RegisterError::TypeMismatch`] when `ty` disagrees with the map.
    pub fn resolve(raw: u8, ty: RegisterType) -> Result<RegisterAddress, RegisterError> {
        let address = RegisterAddress::from_raw(raw).ok_or(RegisterError::OutOfRange(raw))?;
        let expected = address.spec().ty;
        if expected == ty {
            Ok(address)
        } else {
            Err(RegisterError::TypeMismatch {
                address,
                expected,
                found: ty,
            })
        }
    }

    /// Reads a register by wire address.
    ///
    /// # Errors
    ///
    /// See [`RegisterBank::resolve`].
    pub fn read(&self, raw: u8, ty: RegisterType) -> Result<RegisterValue, RegisterError> {
        let address = Self::resolve(raw, ty)?;
        Ok(self.get(address))
    }

    /// Stores a register by wire address without running any side effects.
    ///
    /// # Errors
    ///
    /// See [`RegisterBank::resolve`].
    pub fn write(&mut self, raw: u8, value: RegisterValue) -> Result<RegisterAddress, RegisterError> {
        let address = Self::resolve(raw, value.ty())?;
        self.values[address.as_index()] = value.as_u16();
        Ok(address)
    }

    /// Typed read of a stored register.
    #[must_use]
    pub fn get(&self, address: RegisterAddress) -> RegisterValue {
        match address.spec().ty {
            RegisterType::U8 => RegisterValue::U8(self.get_u8(address)),
            RegisterType::U16 => RegisterValue::U16(self.get_u16(address)),
        }
    }

    #[must_use]
    pub fn get_u8(&self, address: RegisterAddress) -> u8 {
        u8::try_from(self.values[address.as_index()]).unwrap_or(u8::MAX)
    }

    #[must_use]
    pub fn get_u16(&self, address: RegisterAddress) -> u16 {
        self.values[address.as_index()]
    }

    /// Stores a payload after checking it against the register type.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::TypeMismatch`] when the payload type differs
    /// from the register's declared type.
    pub fn set(&mut self, address: RegisterAddress, value: RegisterValue) -> Result<(), RegisterError> {
        let expected = address.spec().ty;
        if value.ty() != expected {
            return Err(RegisterError::TypeMismatch {
                address,
                expected,
                found: value.ty(),
            });
        }

        self.values[address.as_index()] = value.as_u16();
        Ok(())
    }

    pub(crate) fn store_u8(&mut self, address: RegisterAddress, value: u8) {
        debug_assert_eq!(address.spec().ty, RegisterType::U8);
        self.values[address.as_index()] = u16::from(value);
    }

    /// Interval descriptor assembled from a channel's parameter registers.
    #[must_use]
    pub fn descriptor(&self, channel: ChannelId) -> IntervalDescriptor {
        let ChannelRegisters {
            on,
            off,
            pulses,
            tail,
        } = channel.registers();
        IntervalDescriptor::new(
            self.get_u16(on),
            self.get_u16(off),
            self.get_u16(pulses),
            self.get_u16(tail),
        )
    }

    /// Writes a descriptor back into a channel's parameter registers.
    pub fn store_descriptor(&mut self, channel: ChannelId, descriptor: IntervalDescriptor) {
        let registers = channel.registers();
        self.values[registers.on.as_index()] = descriptor.on_duration;
        self.values[registers.off.as_index()] = descriptor.off_duration;
        self.values[registers.pulses.as_index()] = descriptor.pulse_count;
        self.values[registers.tail.as_index()] = descriptor.tail_delay;
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}
