//! GPIO-backed [`Board`] implementation.
//!
//! # Pin Assignments
//!
//! ## Pulse outputs
//! - **PA0**: BNC0
//! - **PA1**: BNC1
//! - **PA6**: SIGNAL_A
//! - **PA7**: SIGNAL_B
//!
//! ## Laser
//! - **PB3 / PB4 / PB5**: F1 / F2 / F3 frequency select lines
//! - **PB12**: POT_CS, active low
//! - **PB13**: POT_CLK
//! - **PB15**: POT_SDI
//!
//! ## Front panel
//! - **PB6 / PB7**: DO1 / DO2
//! - **PB2**: MCU_TO_RELAY, high closes the SPAD supply relay
//! - **PA8**: ON/OFF key, high when keyed on
//! - **PA9**: 5 V SPAD switch
//!
//! ## USB
//! - **PA11 / PA12**: D- / D+

use controller_core::channels::ChannelId;
use controller_core::device::{Board, InputLevels};
use controller_core::engine::OutputSink;
use controller_core::laser::{DigitalOutput, FrequencyLines, digipot_bits};
use embassy_stm32::gpio::{Input, Level, Output};

/// Core clock cycles held on each digipot clock phase.
const DIGIPOT_HALF_PERIOD_CYCLES: u32 = 16;

/// Bit-banged three-wire interface to the intensity digipot.
pub struct Digipot<'d> {
    cs: Output<'d>,
    clk: Output<'d>,
    sdi: Output<'d>,
}

impl<'d> Digipot<'d> {
    pub fn new(cs: Output<'d>, clk: Output<'d>, sdi: Output<'d>) -> Self {
        Self { cs, clk, sdi }
    }

    /// Clocks one 9-bit frame: the select bit, then `value` MSB first.
    pub fn write(&mut self, value: u8) {
        self.clk.set_low();
        self.cs.set_low();
        for bit in digipot_bits(value) {
            self.sdi.set_level(Level::from(bit));
            cortex_m::asm::delay(DIGIPOT_HALF_PERIOD_CYCLES);
            self.clk.set_high();
            cortex_m::asm::delay(DIGIPOT_HALF_PERIOD_CYCLES);
            self.clk.set_low();
        }
        self.cs.set_high();
        self.sdi.set_low();
    }
}

/// The four pulse-train output lines, indexed by [`ChannelId`].
pub struct PulseOutputs<'d> {
    lines: [Output<'d>; 4],
}

impl<'d> PulseOutputs<'d> {
    pub fn new(bnc0: Output<'d>, bnc1: Output<'d>, signal_a: Output<'d>, signal_b: Output<'d>) -> Self {
        Self {
            lines: [bnc0, bnc1, signal_a, signal_b],
        }
    }

    fn line_mut(&mut self, channel: ChannelId) -> &mut Output<'d> {
        &mut self.lines[channel.as_index()]
    }
}

/// Frequency select lines F1..F3.
pub struct FrequencyOutputs<'d> {
    pub f1: Output<'d>,
    pub f2: Output<'d>,
    pub f3: Output<'d>,
}

/// Board wiring for the laser driver controller.
pub struct HardwareBoard<'d> {
    pulses: PulseOutputs<'d>,
    frequency: FrequencyOutputs<'d>,
    do1: Output<'d>,
    do2: Output<'d>,
    relay: Output<'d>,
    digipot: Digipot<'d>,
    laser_key: Input<'d>,
    spad_switch: Input<'d>,
}

impl<'d> HardwareBoard<'d> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pulses: PulseOutputs<'d>,
        frequency: FrequencyOutputs<'d>,
        do1: Output<'d>,
        do2: Output<'d>,
        relay: Output<'d>,
        digipot: Digipot<'d>,
        laser_key: Input<'d>,
        spad_switch: Input<'d>,
    ) -> Self {
        Self {
            pulses,
            frequency,
            do1,
            do2,
            relay,
            digipot,
            laser_key,
            spad_switch,
        }
    }

    fn output_mut(&mut self, output: DigitalOutput) -> &mut Output<'d> {
        match output {
            DigitalOutput::Do1 => &mut self.do1,
            DigitalOutput::Do2 => &mut self.do2,
        }
    }
}

impl OutputSink for HardwareBoard<'_> {
    fn assert(&mut self, channel: ChannelId) {
        self.pulses.line_mut(channel).set_high();
    }

    fn deassert(&mut self, channel: ChannelId) {
        self.pulses.line_mut(channel).set_low();
    }
}

impl Board for HardwareBoard<'_> {
    fn set_frequency_lines(&mut self, lines: FrequencyLines) {
        self.frequency.f1.set_level(Level::from(lines.f1));
        self.frequency.f2.set_level(Level::from(lines.f2));
        self.frequency.f3.set_level(Level::from(lines.f3));
    }

    fn set_digital_output(&mut self, output: DigitalOutput, high: bool) {
        self.output_mut(output).set_level(Level::from(high));
    }

    fn digital_output(&self, output: DigitalOutput) -> bool {
        match output {
            DigitalOutput::Do1 => self.do1.is_set_high(),
            DigitalOutput::Do2 => self.do2.is_set_high(),
        }
    }

    fn set_spad_relay(&mut self, closed: bool) {
        self.relay.set_level(Level::from(closed));
    }

    fn write_digipot(&mut self, value: u8) {
        self.digipot.write(value);
    }

    fn sample_inputs(&mut self) -> InputLevels {
        InputLevels {
            laser_key: self.laser_key.is_high(),
            spad_switch: self.spad_switch.is_high(),
        }
    }
}
