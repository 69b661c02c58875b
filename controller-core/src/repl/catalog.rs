//! REPL command catalog: each command as a small const grammar tree.
//!
//! The parser and the help renderer interpret the same structure, so keywords,
//! argument layouts, and usage strings cannot drift apart.

use core::fmt;

use crate::channels::ALL_CHANNELS;
use crate::registers::REGISTER_MAP;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandTag {
    Read,
    Write,
    Start,
    Stop,
    Standby,
    Reset,
    Status,
    Help,
}

/// Positional argument classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArgumentKind {
    /// Register name or numeric address.
    Register,
    Channel,
    /// Channel label or the keyword `all`.
    ChannelOrAll,
    /// Decimal or `0x` hexadecimal integer.
    Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptionTag {
    On,
    Off,
    Pulses,
    Tail,
}

/// `key=value` option accepted in any order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionSpec {
    pub keyword: &'static str,
    pub tag: OptionTag,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node {
    End,
    Argument {
        kind: ArgumentKind,
        label: &'static str,
        next: &'static Node,
    },
    Options(&'static [OptionSpec]),
    Topic {
        next: &'static Node,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub tag: CommandTag,
    pub grammar: &'static Node,
    pub usage: &'static str,
    pub summary: &'static str,
}

const END: Node = Node::End;

const READ_GRAMMAR: Node = Node::Argument {
    kind: ArgumentKind::Register,
    label: "register",
    next: &END,
};

const WRITE_VALUE: Node = Node::Argument {
    kind: ArgumentKind::Value,
    label: "value",
    next: &END,
};

const WRITE_GRAMMAR: Node = Node::Argument {
    kind: ArgumentKind::Register,
    label: "register",
    next: &WRITE_VALUE,
};

const START_OPTIONS: [OptionSpec; 4] = [
    OptionSpec {
        keyword: "on",
        tag: OptionTag::On,
    },
    OptionSpec {
        keyword: "off",
        tag: OptionTag::Off,
    },
    OptionSpec {
        keyword: "pulses",
        tag: OptionTag::Pulses,
    },
    OptionSpec {
        keyword: "tail",
        tag: OptionTag::Tail,
    },
];

const START_OPTIONS_NODE: Node = Node::Options(&START_OPTIONS);

const START_GRAMMAR: Node = Node::Argument {
    kind: ArgumentKind::Channel,
    label: "channel",
    next: &START_OPTIONS_NODE,
};

const STOP_GRAMMAR: Node = Node::Argument {
    kind: ArgumentKind::ChannelOrAll,
    label: "channel or `all`",
    next: &END,
};

const HELP_GRAMMAR: Node = Node::Topic { next: &END };

const COMMANDS: [CommandSpec; 8] = [
    CommandSpec {
        name: "read",
        tag: CommandTag::Read,
        grammar: &READ_GRAMMAR,
        usage: "read <register>",
        summary: "read a register by name or address",
    },
    CommandSpec {
        name: "write",
        tag: CommandTag::Write,
        grammar: &WRITE_GRAMMAR,
        usage: "write <register> <value>",
        summary: "write a register and run its handler",
    },
    CommandSpec {
        name: "start",
        tag: CommandTag::Start,
        grammar: &START_GRAMMAR,
        usage: "start <channel> [on=<n>] [off=<n>] [pulses=<n>] [tail=<n>]",
        summary: "arm a channel; omitted values keep their register contents",
    },
    CommandSpec {
        name: "stop",
        tag: CommandTag::Stop,
        grammar: &STOP_GRAMMAR,
        usage: "stop <channel|all>",
        summary: "stop one channel or every channel",
    },
    CommandSpec {
        name: "standby",
        tag: CommandTag::Standby,
        grammar: &END,
        usage: "standby",
        summary: "stop every channel, zero intensity, open the SPAD relay",
    },
    CommandSpec {
        name: "reset",
        tag: CommandTag::Reset,
        grammar: &END,
        usage: "reset",
        summary: "restore register defaults",
    },
    CommandSpec {
        name: "status",
        tag: CommandTag::Status,
        grammar: &END,
        usage: "status",
        summary: "show channel, laser, and I/O state",
    },
    CommandSpec {
        name: "help",
        tag: CommandTag::Help,
        grammar: &HELP_GRAMMAR,
        usage: "help [command|registers|channels]",
        summary: "show this help",
    },
];

/// Returns the full command catalog.
#[must_use]
pub const fn commands() -> &'static [CommandSpec] {
    &COMMANDS
}

/// Looks up a command by its tag.
#[must_use]
pub fn command(tag: CommandTag) -> &'static CommandSpec {
    match tag {
        CommandTag::Read => &COMMANDS[0],
        CommandTag::Write => &COMMANDS[1],
        CommandTag::Start => &COMMANDS[2],
        CommandTag::Stop => &COMMANDS[3],
        CommandTag::Standby => &COMMANDS[4],
        CommandTag::Reset => &COMMANDS[5],
        CommandTag::Status => &COMMANDS[6],
        CommandTag::Help => &COMMANDS[7],
    }
}

/// Finds a command by name (case insensitive).
#[must_use]
pub fn find(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

/// Writes help text for `topic`, or the command overview when `None`.
///
/// Returns `Ok(false)` when the topic is unknown; nothing is written then.
pub fn write_help<W: fmt::Write>(writer: &mut W, topic: Option<&str>) -> Result<bool, fmt::Error> {
    match topic {
        None => {
            for spec in &COMMANDS {
                writeln!(writer, "{:<60} {}", spec.usage, spec.summary)?;
            }
            Ok(true)
        }
        Some(topic) if topic.eq_ignore_ascii_case("registers") => {
            for spec in &REGISTER_MAP {
                writeln!(
                    writer,
                    "{:>3} 0x{:02x} {:<16} {:<3} {}",
                    spec.address.raw(),
                    spec.address.raw(),
                    spec.name,
                    spec.ty,
                    spec.access
                )?;
            }
            Ok(true)
        }
        Some(topic) if topic.eq_ignore_ascii_case("channels") => {
            for line in &ALL_CHANNELS {
                writeln!(
                    writer,
                    "{:<9} {:<9} pin={} state={} bit={}",
                    line.label,
                    line.name,
                    line.mcu_pin,
                    line.group.state_register(),
                    line.state_bit.trailing_zeros()
                )?;
            }
            Ok(true)
        }
        Some(topic) => match find(topic) {
            Some(spec) => {
                writeln!(writer, "{}", spec.usage)?;
                writeln!(writer, "  {}", spec.summary)?;
                Ok(true)
            }
            None => Ok(false),
        },
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::string::String;

    #[test]
    fn tags_index_their_own_entries() {
        for spec in commands() {
            assert_eq!(command(spec.tag).name, spec.name);
            assert_eq!(find(&spec.name.to_ascii_uppercase()), Some(spec));
            assert!(spec.usage.starts_with(spec.name));
        }
    }

    #[test]
    fn overview_lists_every_command() {
        let mut text = String::new();
        assert_eq!(write_help(&mut text, None), Ok(true));
        assert_eq!(text.lines().count(), COMMANDS.len());
        assert!(text.contains("stop <channel|all>"));
    }

    #[test]
    fn register_topic_lists_the_map() {
        let mut text = String::new();
        assert_eq!(write_help(&mut text, Some("Registers")), Ok(true));
        assert_eq!(text.lines().count(), REGISTER_MAP.len());
        assert!(text.contains(" 46 0x2e bnc0-on          u16 rw"));
        assert!(text.contains(" 33 0x21 laser-state      u8  ro"));
    }

    #[test]
    fn unknown_topic_writes_nothing() {
        let mut text = String::new();
        assert_eq!(write_help(&mut text, Some("reboot")), Ok(false));
        assert!(text.is_empty());
    }
}
