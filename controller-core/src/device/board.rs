use crate::channels::{CHANNEL_COUNT, ChannelId};
use crate::engine::OutputSink;
use crate::laser::{DigitalOutput, FrequencyLines};

/// Sampled levels of the front-panel inputs.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct InputLevels {
    /// ON/OFF key switch, `true` when the laser is keyed on.
    pub laser_key: bool,
    /// 5 V SPAD switch input.
    pub spad_switch: bool,
}

/// Hardware collaborators of the controller.
///
/// Every method is expected to complete immediately; the controller calls them
/// from the tick and input callbacks while holding the device lock.
pub trait Board: OutputSink {
    fn set_frequency_lines(&mut self, lines: FrequencyLines);

    fn set_digital_output(&mut self, output: DigitalOutput, high: bool);

    /// Level currently driven on `output`.
    fn digital_output(&self, output: DigitalOutput) -> bool;

    fn set_spad_relay(&mut self, closed: bool);

    /// Shifts a new wiper value into the intensity digipot.
    fn write_digipot(&mut self, value: u8);

    fn sample_inputs(&mut self) -> InputLevels;
}

/// In-memory board that latches every level it is given.
#[derive(Clone, Debug, Default)]
pub struct NoopBoard {
    pub pulse_levels: [bool; CHANNEL_COUNT],
    pub frequency: FrequencyLines,
    pub outputs: [bool; 2],
    pub relay_closed: bool,
    /// Last value written to the digipot, if any.
    pub digipot: Option<u8>,
    /// Levels returned by [`Board::sample_inputs`].
    pub inputs: InputLevels,
}

impl NoopBoard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pulse_levels: [false; CHANNEL_COUNT],
            frequency: FrequencyLines::new(false, false, false),
            outputs: [false; 2],
            relay_closed: false,
            digipot: None,
            inputs: InputLevels {
                laser_key: false,
                spad_switch: false,
            },
        }
    }
}

impl OutputSink for NoopBoard {
    fn assert(&mut self, channel: ChannelId) {
        self.pulse_levels[channel.as_index()] = true;
    }

    fn deassert(&mut self, channel: ChannelId) {
        self.pulse_levels[channel.as_index()] = false;
    }
}

impl Board for NoopBoard {
    fn set_frequency_lines(&mut self, lines: FrequencyLines) {
        self.frequency = lines;
    }

    fn set_digital_output(&mut self, output: DigitalOutput, high: bool) {
        self.outputs[output_index(output)] = high;
    }

    fn digital_output(&self, output: DigitalOutput) -> bool {
        self.outputs[output_index(output)]
    }

    fn set_spad_relay(&mut self, closed: bool) {
        self.relay_closed = closed;
    }

    fn write_digipot(&mut self, value: u8) {
        self.digipot = Some(value);
    }

    fn sample_inputs(&mut self) -> InputLevels {
        self.inputs
    }
}

const fn output_index(output: DigitalOutput) -> usize {
    match output {
        DigitalOutput::Do1 => 0,
        DigitalOutput::Do2 => 1,
    }
}
