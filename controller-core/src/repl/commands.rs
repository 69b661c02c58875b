//! High-level REPL command dispatcher.
//!
//! This module glues parsed grammar commands to the device controller through
//! the [`RegisterAccess`] seam. It stays `no_std` friendly so the firmware and
//! emulator crates share the same implementation and the same response text.

use core::fmt;

use crate::channels::{ChannelId, ChannelMask};
use crate::device::{Board, LaserDriverController, WriteOutcome};
use crate::engine::{ArmError, IntervalDescriptor};
use crate::registers::{RegisterAddress, RegisterError, RegisterValue};

use super::catalog;
use super::grammar::{self, Command, HelpCommand, RegisterRef, StartCommand, StopTarget};
use super::status::{StatusFormatter, StatusSnapshot};

/// Device operations reachable from the REPL.
///
/// Methods take `&mut self` so implementations may lock shared state.
pub trait RegisterAccess {
    /// Reads a register using the type declared in the register map.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError::OutOfRange`] for addresses outside the window.
    fn read(&mut self, raw: u8) -> Result<(RegisterAddress, RegisterValue), RegisterError>;

    /// Writes a register, sized according to the register map.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError`] when the address is unknown.
    fn write(&mut self, raw: u8, value: RegisterValue) -> Result<WriteOutcome, RegisterError>;

    /// Current parameter registers of `channel`.
    fn descriptor(&mut self, channel: ChannelId) -> IntervalDescriptor;

    /// # Errors
    ///
    /// Returns [`ArmError`] when the descriptor cannot be armed.
    fn start(&mut self, channel: ChannelId, descriptor: IntervalDescriptor) -> Result<(), ArmError>;

    fn stop(&mut self, target: StopTarget) -> ChannelMask;

    fn standby(&mut self) -> ChannelMask;

    fn reset(&mut self);

    fn snapshot(&mut self) -> StatusSnapshot;
}

impl<B: Board> RegisterAccess for LaserDriverController<B> {
    fn read(&mut self, raw: u8) -> Result<(RegisterAddress, RegisterValue), RegisterError> {
        let address = RegisterAddress::from_raw(raw).ok_or(RegisterError::OutOfRange(raw))?;
        let value = self.read_register(raw, address.spec().ty)?;
        Ok((address, value))
    }

    fn write(&mut self, raw: u8, value: RegisterValue) -> Result<WriteOutcome, RegisterError> {
        self.write_register(raw, value)
    }

    fn descriptor(&mut self, channel: ChannelId) -> IntervalDescriptor {
        self.bank().descriptor(channel)
    }

    fn start(&mut self, channel: ChannelId, descriptor: IntervalDescriptor) -> Result<(), ArmError> {
        self.start_channel(channel, descriptor)
    }

    fn stop(&mut self, target: StopTarget) -> ChannelMask {
        match target {
            StopTarget::Channel(id) if self.stop_channel(id) => ChannelMask::only(id),
            StopTarget::Channel(_) => ChannelMask::empty(),
            StopTarget::All => self.stop_all(),
        }
    }

    fn standby(&mut self) -> ChannelMask {
        self.enter_standby()
    }

    fn reset(&mut self) {
        self.reset_registers();
    }

    fn snapshot(&mut self) -> StatusSnapshot {
        StatusSnapshot::capture(self)
    }
}

/// Command execution successes.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome<'a> {
    Read {
        address: RegisterAddress,
        value: RegisterValue,
    },
    Write(WriteOutcome),
    Started {
        channel: ChannelId,
        descriptor: IntervalDescriptor,
    },
    Stopped(ChannelMask),
    Standby(ChannelMask),
    Reset,
    Status(StatusSnapshot),
    Help(HelpCommand<'a>),
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError<'a>),
    Register(RegisterError),
    /// The value does not fit the register's element type.
    ValueOutOfRange {
        address: RegisterAddress,
        value: u32,
    },
    Arm {
        channel: ChannelId,
        error: ArmError,
    },
    UnknownTopic(&'a str),
}

impl<'a> From<grammar::ParseError<'a>> for CommandError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl From<RegisterError> for CommandError<'_> {
    fn from(error: RegisterError) -> Self {
        Self::Register(error)
    }
}

impl fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Parse(error) => write!(f, "parse: {error}"),
            CommandError::Register(error) => write!(f, "register: {error}"),
            CommandError::ValueOutOfRange { address, value } => {
                write!(f, "{value} does not fit {address} ({})", address.spec().ty)
            }
            CommandError::Arm { channel, error } => write!(f, "{channel}: {error}"),
            CommandError::UnknownTopic(topic) => write!(f, "no help for `{topic}`"),
        }
    }
}

/// Dispatches REPL commands into the controller.
pub struct CommandExecutor<C> {
    controller: C,
}

impl<C> CommandExecutor<C> {
    /// Creates a new executor around the provided controller.
    pub const fn new(controller: C) -> Self {
        Self { controller }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut C {
        &mut self.controller
    }

    /// Consumes the executor and yields the inner controller.
    pub fn into_inner(self) -> C {
        self.controller
    }
}

impl<C> CommandExecutor<C>
where
    C: RegisterAccess,
{
    /// Parses and executes a REPL command.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when parsing fails or the controller refuses
    /// the request.
    pub fn execute<'a>(&mut self, line: &'a str) -> Result<CommandOutcome<'a>, CommandError<'a>> {
        let command = grammar::parse(line)?;
        self.dispatch(command)
    }

    fn dispatch<'a>(&mut self, command: Command<'a>) -> Result<CommandOutcome<'a>, CommandError<'a>> {
        match command {
            Command::Read(register) => {
                let (address, value) = self.controller.read(register.raw())?;
                Ok(CommandOutcome::Read { address, value })
            }
            Command::Write { register, value } => self.handle_write(register, value),
            Command::Start(start) => self.handle_start(start),
            Command::Stop(target) => Ok(CommandOutcome::Stopped(self.controller.stop(target))),
            Command::Standby => Ok(CommandOutcome::Standby(self.controller.standby())),
            Command::Reset => {
                self.controller.reset();
                Ok(CommandOutcome::Reset)
            }
            Command::Status => Ok(CommandOutcome::Status(self.controller.snapshot())),
            Command::Help(help) => match help.topic {
                Some(topic) if !is_help_topic(topic) => Err(CommandError::UnknownTopic(topic)),
                _ => Ok(CommandOutcome::Help(help)),
            },
        }
    }

    fn handle_write<'a>(
        &mut self,
        register: RegisterRef,
        value: u32,
    ) -> Result<CommandOutcome<'a>, CommandError<'a>> {
        let raw = register.raw();
        let address = RegisterAddress::from_raw(raw).ok_or(RegisterError::OutOfRange(raw))?;
        let payload = RegisterValue::from_integer(address.spec().ty, value)
            .ok_or(CommandError::ValueOutOfRange { address, value })?;

        let outcome = self.controller.write(raw, payload)?;
        Ok(CommandOutcome::Write(outcome))
    }

    fn handle_start<'a>(&mut self, start: StartCommand) -> Result<CommandOutcome<'a>, CommandError<'a>> {
        let Some(channel) = start.channel else {
            return Err(CommandError::Parse(grammar::ParseError::Grammar(
                grammar::GrammarError {
                    kind: grammar::GrammarErrorKind::UnexpectedEnd { expected: "channel" },
                },
            )));
        };

        let current = self.controller.descriptor(channel);
        let descriptor = IntervalDescriptor::new(
            start.on.unwrap_or(current.on_duration),
            start.off.unwrap_or(current.off_duration),
            start.pulses.unwrap_or(current.pulse_count),
            start.tail.unwrap_or(current.tail_delay),
        );

        self.controller
            .start(channel, descriptor)
            .map_err(|error| CommandError::Arm { channel, error })?;

        Ok(CommandOutcome::Started {
            channel,
            descriptor,
        })
    }
}

fn is_help_topic(topic: &str) -> bool {
    topic.eq_ignore_ascii_case("registers")
        || topic.eq_ignore_ascii_case("channels")
        || catalog::find(topic).is_some()
}

/// Renders an outcome as REPL response text, one `\n`-terminated line each.
///
/// # Errors
///
/// Propagates writer failures.
pub fn render_outcome<W: fmt::Write>(writer: &mut W, outcome: &CommandOutcome<'_>) -> fmt::Result {
    match outcome {
        CommandOutcome::Read { address, value } => writeln!(writer, "{address} = {value}"),
        CommandOutcome::Write(write) => {
            if write.applied {
                writeln!(writer, "OK {}", write.address)?;
            } else {
                writeln!(writer, "OK {} (ignored)", write.address)?;
            }
            write_mask(writer, "armed", write.channels.armed)?;
            write_mask(writer, "stopped", write.channels.stopped)?;
            write_mask(writer, "rejected", write.channels.rejected)
        }
        CommandOutcome::Started {
            channel,
            descriptor,
        } => writeln!(
            writer,
            "OK {channel} on={} off={} pulses={} tail={}",
            descriptor.on_duration,
            descriptor.off_duration,
            descriptor.budget(),
            descriptor.tail_delay
        ),
        CommandOutcome::Stopped(mask) => {
            writer.write_str("OK")?;
            write_mask(writer, " stopped", *mask)?;
            if mask.is_empty() {
                writer.write_str("\n")?;
            }
            Ok(())
        }
        CommandOutcome::Standby(mask) => {
            writer.write_str("OK standby")?;
            write_mask(writer, "", *mask)?;
            if mask.is_empty() {
                writer.write_str("\n")?;
            }
            Ok(())
        }
        CommandOutcome::Reset => writeln!(writer, "OK reset"),
        CommandOutcome::Status(snapshot) => {
            let formatter = StatusFormatter::new(snapshot);
            formatter.write_channel_lines(writer)?;
            formatter.write_laser_line(writer)?;
            writer.write_char('\n')?;
            formatter.write_io_line(writer)?;
            writer.write_char('\n')
        }
        CommandOutcome::Help(help) => catalog::write_help(writer, help.topic).map(|_| ()),
    }
}

fn write_mask<W: fmt::Write>(writer: &mut W, label: &str, mask: ChannelMask) -> fmt::Result {
    if mask.is_empty() {
        return Ok(());
    }

    writer.write_str(label)?;
    for channel in mask.iter() {
        write!(writer, " {channel}")?;
    }
    writer.write_char('\n')
}
