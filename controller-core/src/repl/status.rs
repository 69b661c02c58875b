//! Shared status surface for the REPL.
//!
//! [`StatusSnapshot`] copies the observable controller state out of the device
//! lock so the firmware and emulator can render it afterwards. [`StatusFormatter`]
//! keeps the textual rendering consistent across front-ends.

use core::fmt;

use crate::channels::{CHANNEL_COUNT, ChannelId};
use crate::device::{Board, LaserDriverController};
use crate::engine::{ChannelPhase, IntervalDescriptor, PulseBudget};
use crate::laser::{DigitalOutput, FrequencySelect};
use crate::registers::RegisterAddress;

/// Sampled state of one pulse channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelStatus {
    pub id: ChannelId,
    pub phase: ChannelPhase,
    /// Parameter registers, which may differ from the running train.
    pub descriptor: IntervalDescriptor,
    pub pulses_remaining: PulseBudget,
}

/// Snapshot of reusable status information surfaced by the REPL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub channels: [ChannelStatus; CHANNEL_COUNT],
    pub frequency: FrequencySelect,
    pub intensity: u8,
    /// DO1/DO2 levels packed as in `OUTPUT_STATE`.
    pub outputs: u8,
    pub spad_switch: bool,
    pub laser_key: bool,
    pub event_enable: u8,
    pub pending_notifications: usize,
    pub dropped_notifications: u32,
}

impl StatusSnapshot {
    /// Copies the current state out of `controller`.
    #[must_use]
    pub fn capture<B: Board>(controller: &LaserDriverController<B>) -> Self {
        let bank = controller.bank();
        let engine = controller.engine();

        let channels = ChannelId::ALL.map(|id| ChannelStatus {
            id,
            phase: engine.phase(id),
            descriptor: bank.descriptor(id),
            pulses_remaining: engine.countdown(id).pulses(),
        });

        Self {
            channels,
            frequency: controller.frequency(),
            intensity: bank.get_u8(RegisterAddress::LaserIntensity),
            outputs: controller.output_state(),
            spad_switch: bank.get_u8(RegisterAddress::SpadSwitch) != 0,
            laser_key: bank.get_u8(RegisterAddress::LaserState) != 0,
            event_enable: bank.get_u8(RegisterAddress::EventEnable),
            pending_notifications: controller.pending_notifications(),
            dropped_notifications: controller.dropped_notifications(),
        }
    }
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    /// Creates a new formatter for the provided snapshot.
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes one channel line (e.g. `BNC0 on on=5 off=5 pulses=inf tail=0 left=inf`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_channel_line<W: fmt::Write>(&self, writer: &mut W, id: ChannelId) -> fmt::Result {
        let status = &self.snapshot.channels[id.as_index()];
        let descriptor = status.descriptor;
        write!(
            writer,
            "{} {} on={} off={} pulses={} tail={}",
            status.id,
            status.phase.label(),
            descriptor.on_duration,
            descriptor.off_duration,
            descriptor.budget(),
            descriptor.tail_delay
        )?;

        if status.phase.is_active() {
            write!(writer, " left={}", status.pulses_remaining)?;
        }
        Ok(())
    }

    /// Writes every channel line, each terminated by `\n`.
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_channel_lines<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        for id in ChannelId::ALL {
            self.write_channel_line(writer, id)?;
            writer.write_char('\n')?;
        }
        Ok(())
    }

    /// Writes the laser line (e.g. `laser key=on frequency=f2 intensity=128`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_laser_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "laser key={} frequency={} intensity={}",
            on_off(self.snapshot.laser_key),
            self.snapshot.frequency,
            self.snapshot.intensity
        )
    }

    /// Writes the I/O line (e.g. `io spad=closed do1=high do2=low events=0x07 queued=0`).
    ///
    /// # Errors
    ///
    /// Propagates writer failures.
    pub fn write_io_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("io spad=")?;
        writer.write_str(if self.snapshot.spad_switch { "closed" } else { "open" })?;

        for (output, name) in DigitalOutput::ALL.into_iter().zip(["do1", "do2"]) {
            let level = if self.snapshot.outputs & output.bit() != 0 {
                "high"
            } else {
                "low"
            };
            write!(writer, " {name}={level}")?;
        }

        write!(
            writer,
            " events=0x{:02x} queued={}",
            self.snapshot.event_enable, self.snapshot.pending_notifications
        )?;
        if self.snapshot.dropped_notifications > 0 {
            write!(writer, " dropped={}", self.snapshot.dropped_notifications)?;
        }
        Ok(())
    }
}

const fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::device::NoopBoard;
    use crate::registers::RegisterValue;
    use std::string::String;

    fn controller() -> LaserDriverController<NoopBoard> {
        LaserDriverController::new(NoopBoard::new()).unwrap()
    }

    #[test]
    fn idle_controller_renders_defaults() {
        let snapshot = StatusSnapshot::capture(&controller());
        let formatter = StatusFormatter::new(&snapshot);

        let mut text = String::new();
        formatter.write_channel_lines(&mut text).unwrap();
        formatter.write_laser_line(&mut text).unwrap();
        text.push('\n');
        formatter.write_io_line(&mut text).unwrap();

        assert_eq!(
            text,
            "BNC0 idle on=0 off=0 pulses=inf tail=0\n\
             BNC1 idle on=0 off=0 pulses=inf tail=0\n\
             SIGNAL_A idle on=0 off=0 pulses=inf tail=0\n\
             SIGNAL_B idle on=0 off=0 pulses=inf tail=0\n\
             laser key=off frequency=off intensity=0\n\
             io spad=open do1=low do2=low events=0x07 queued=0"
        );
    }

    #[test]
    fn running_channel_reports_remaining_pulses() {
        let mut controller = controller();
        controller
            .start_channel(ChannelId::Bnc1, IntervalDescriptor::new(2, 3, 4, 0))
            .unwrap();
        controller.write_register(40, RegisterValue::U8(0x02)).unwrap();

        let snapshot = StatusSnapshot::capture(&controller);
        assert_eq!(snapshot.outputs, 0x02);

        let mut text = String::new();
        let formatter = StatusFormatter::new(&snapshot);
        formatter.write_channel_line(&mut text, ChannelId::Bnc1).unwrap();
        assert_eq!(text, "BNC1 on on=2 off=3 pulses=4 tail=0 left=4");

        text.clear();
        formatter.write_io_line(&mut text).unwrap();
        assert!(text.contains("do1=low do2=high"));
    }
}
