//! Laser-side peripherals: frequency select lines, digital outputs, and the
//! intensity digipot framing.

use core::fmt;

/// Pulse-frequency selection exposed through `LASER_FREQUENCY_SELECT`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum FrequencySelect {
    #[default]
    Off,
    F1,
    F2,
    F3,
    /// Continuous wave: every select line driven.
    ContinuousWave,
}

impl FrequencySelect {
    /// Decodes a register value. Anything but 0, 1, 2, 4 or 8 is ignored.
    #[must_use]
    pub const fn from_register(value: u8) -> Option<Self> {
        match value {
            0 => Some(FrequencySelect::Off),
            1 => Some(FrequencySelect::F1),
            2 => Some(FrequencySelect::F2),
            4 => Some(FrequencySelect::F3),
            8 => Some(FrequencySelect::ContinuousWave),
            _ => None,
        }
    }

    #[must_use]
    pub const fn to_register(self) -> u8 {
        match self {
            FrequencySelect::Off => 0,
            FrequencySelect::F1 => 1,
            FrequencySelect::F2 => 2,
            FrequencySelect::F3 => 4,
            FrequencySelect::ContinuousWave => 8,
        }
    }

    /// Line levels that realise this selection.
    #[must_use]
    pub const fn lines(self) -> FrequencyLines {
        match self {
            FrequencySelect::Off => FrequencyLines::new(false, false, false),
            FrequencySelect::F1 => FrequencyLines::new(true, false, false),
            FrequencySelect::F2 => FrequencyLines::new(false, true, false),
            FrequencySelect::F3 => FrequencyLines::new(false, false, true),
            FrequencySelect::ContinuousWave => FrequencyLines::new(true, true, true),
        }
    }
}

impl fmt::Display for FrequencySelect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FrequencySelect::Off => "off",
            FrequencySelect::F1 => "f1",
            FrequencySelect::F2 => "f2",
            FrequencySelect::F3 => "f3",
            FrequencySelect::ContinuousWave => "cw",
        };
        f.write_str(label)
    }
}

/// Levels of the three frequency select lines.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FrequencyLines {
    pub f1: bool,
    pub f2: bool,
    pub f3: bool,
}

impl FrequencyLines {
    #[must_use]
    pub const fn new(f1: bool, f2: bool, f3: bool) -> Self {
        Self { f1, f2, f3 }
    }
}

/// General-purpose digital outputs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DigitalOutput {
    Do1,
    Do2,
}

impl DigitalOutput {
    pub const ALL: [DigitalOutput; 2] = [DigitalOutput::Do1, DigitalOutput::Do2];

    /// Bit used in the `OUTPUT_*` registers.
    #[must_use]
    pub const fn bit(self) -> u8 {
        match self {
            DigitalOutput::Do1 => 1 << 0,
            DigitalOutput::Do2 => 1 << 1,
        }
    }
}

/// Every bit meaningful in the `OUTPUT_*` registers.
pub const OUTPUT_MASK: u8 = DigitalOutput::Do1.bit() | DigitalOutput::Do2.bit();

/// Clocked bits in one digipot transfer.
pub const DIGIPOT_FRAME_BITS: usize = 9;

/// Serial frame for the intensity digipot.
///
/// The wiper address is selected by a single leading `1`, followed by the
/// eight wiper bits most significant first. The caller frames the transfer
/// with chip select.
pub fn digipot_bits(value: u8) -> impl Iterator<Item = bool> {
    core::iter::once(true).chain((0..8).rev().map(move |bit| value & (1 << bit) != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    #[test]
    fn only_single_selections_decode() {
        for raw in 0..=u8::MAX {
            let decoded = FrequencySelect::from_register(raw);
            match raw {
                0 | 1 | 2 | 4 | 8 => assert_eq!(decoded.map(FrequencySelect::to_register), Some(raw)),
                _ => assert_eq!(decoded, None),
            }
        }
    }

    #[test]
    fn continuous_wave_drives_every_line() {
        assert_eq!(
            FrequencySelect::ContinuousWave.lines(),
            FrequencyLines::new(true, true, true)
        );
        assert_eq!(FrequencySelect::F2.lines(), FrequencyLines::new(false, true, false));
    }

    #[test]
    fn digipot_frame_is_select_bit_then_msb_first() {
        let bits: Vec<bool, DIGIPOT_FRAME_BITS> = digipot_bits(0b1010_0001).collect();
        assert_eq!(
            bits.as_slice(),
            &[true, true, false, true, false, false, false, false, true]
        );
    }
}
