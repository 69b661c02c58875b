use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use controller_core::channels::{CHANNEL_COUNT, ChannelId, ChannelMask};
use controller_core::device::{Board, InputLevels, LaserDriverController, NoopBoard, Notification};
use controller_core::engine::OutputSink;
use controller_core::laser::{DigitalOutput, FrequencyLines};
use controller_core::repl::commands::{CommandExecutor, render_outcome};
use controller_core::timing::TickConfig;

/// Samples kept for `wave`.
const WAVEFORM_HISTORY: usize = 4096;
/// Columns printed by `wave` when no width is given.
const DEFAULT_WAVE_WIDTH: usize = 64;
/// Upper bound for a single `tick`/`run` request.
const MAX_ADVANCE_TICKS: u32 = 10_000_000;

pub const EMULATOR_COMMANDS: &[(&str, &str)] = &[
    ("tick", "tick [n]              - advance the virtual clock by n ticks (default 1)"),
    ("run", "run <duration>        - advance the clock by a duration (e.g. 250ms, 2s, 500us)"),
    ("wave", "wave [ticks]          - print the captured output waveform"),
    ("key", "key on|off            - drive the laser key input"),
    ("switch", "switch on|off         - drive the SPAD switch input"),
];

/// Per-tick snapshot of the four pulse outputs.
pub type Sample = [bool; CHANNEL_COUNT];

/// [`NoopBoard`] that also mirrors every pulse-line change, so the session can
/// sample levels after each tick.
#[derive(Clone, Debug, Default)]
pub struct SimulatedBoard {
    lines: NoopBoard,
    edges: [u32; CHANNEL_COUNT],
}

impl SimulatedBoard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: NoopBoard::new(),
            edges: [0; CHANNEL_COUNT],
        }
    }

    #[must_use]
    pub fn sample(&self) -> Sample {
        self.lines.pulse_levels
    }

    /// Rising edges seen on `channel` since the session started.
    #[must_use]
    pub fn rising_edges(&self, channel: ChannelId) -> u32 {
        self.edges[channel.as_index()]
    }

    pub fn inputs_mut(&mut self) -> &mut InputLevels {
        &mut self.lines.inputs
    }

    #[must_use]
    pub fn lines(&self) -> &NoopBoard {
        &self.lines
    }
}

impl OutputSink for SimulatedBoard {
    fn assert(&mut self, channel: ChannelId) {
        self.edges[channel.as_index()] += 1;
        self.lines.assert(channel);
    }

    fn deassert(&mut self, channel: ChannelId) {
        self.lines.deassert(channel);
    }
}

impl Board for SimulatedBoard {
    fn set_frequency_lines(&mut self, lines: FrequencyLines) {
        self.lines.set_frequency_lines(lines);
    }

    fn set_digital_output(&mut self, output: DigitalOutput, high: bool) {
        self.lines.set_digital_output(output, high);
    }

    fn digital_output(&self, output: DigitalOutput) -> bool {
        self.lines.digital_output(output)
    }

    fn set_spad_relay(&mut self, closed: bool) {
        self.lines.set_spad_relay(closed);
    }

    fn write_digipot(&mut self, value: u8) {
        self.lines.write_digipot(value);
    }

    fn sample_inputs(&mut self) -> InputLevels {
        self.lines.sample_inputs()
    }
}

pub struct Session {
    executor: CommandExecutor<LaserDriverController<SimulatedBoard>>,
    config: TickConfig,
    ticks: u64,
    waveform: VecDeque<Sample>,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    pub fn new(config: TickConfig, transcript: Option<TranscriptLogger>) -> io::Result<Self> {
        let controller =
            LaserDriverController::new(SimulatedBoard::new()).map_err(|err| io::Error::other(err.to_string()))?;

        Ok(Self {
            executor: CommandExecutor::new(controller),
            config,
            ticks: 0,
            waveform: VecDeque::with_capacity(WAVEFORM_HISTORY),
            transcript,
        })
    }

    #[must_use]
    pub fn controller(&self) -> &LaserDriverController<SimulatedBoard> {
        self.executor.controller()
    }

    /// Virtual time since the session started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let ticks = u32::try_from(self.ticks).unwrap_or(u32::MAX);
        self.config.duration_of(ticks)
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.elapsed();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(elapsed, TranscriptRole::Host, trimmed)?;
        }

        let mut lines = match self.handle_emulator_command(trimmed) {
            Some(Ok(lines)) => lines,
            Some(Err(message)) => vec![format!("error: {message}")],
            None => self.execute_device_command(trimmed),
        };
        lines.extend(self.drain_notifications());

        let elapsed = self.elapsed();
        if let Some(transcript) = self.transcript.as_mut() {
            for line in &lines {
                transcript.append_line(elapsed, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(lines)
    }

    fn execute_device_command(&mut self, line: &str) -> Vec<String> {
        let mut rendered = String::new();
        let result = match self.executor.execute(line) {
            Ok(outcome) => render_outcome(&mut rendered, &outcome),
            Err(error) => {
                rendered = format!("error: {error}");
                Ok(())
            }
        };

        if result.is_err() {
            return vec!["error: failed to render response".to_string()];
        }

        let mut lines: Vec<String> = rendered.lines().map(str::to_string).collect();
        if line.trim().eq_ignore_ascii_case("help") {
            lines.push("Emulator commands:".to_string());
            for (_, detail) in EMULATOR_COMMANDS {
                lines.push(format!("  {detail}"));
            }
        }
        lines
    }

    /// Handles the commands that only exist in the emulator. Returns `None`
    /// for everything the device REPL understands.
    fn handle_emulator_command(&mut self, line: &str) -> Option<Result<Vec<String>, String>> {
        let mut words = line.split_whitespace();
        let head = words.next()?.to_ascii_lowercase();
        if !EMULATOR_COMMANDS.iter().any(|(name, _)| *name == head) {
            return None;
        }

        let argument = words.next();
        if words.next().is_some() {
            return Some(Err(format!("too many arguments for `{head}`")));
        }

        let result = match head.as_str() {
            "tick" => parse_tick_count(argument).map(|ticks| self.advance(ticks)),
            "run" => argument
                .ok_or_else(|| "run needs a duration".to_string())
                .and_then(parse_duration)
                .and_then(|duration| {
                    let ticks = self.config.ticks_for(duration);
                    if ticks > MAX_ADVANCE_TICKS {
                        Err(format!("at most {MAX_ADVANCE_TICKS} ticks per request"))
                    } else {
                        Ok(self.advance(ticks))
                    }
                }),
            "wave" => parse_wave_width(argument).map(|width| self.render_waveform(width)),
            "key" => parse_switch(argument).map(|on| self.drive_input(|inputs| inputs.laser_key = on)),
            _ => parse_switch(argument).map(|on| self.drive_input(|inputs| inputs.spad_switch = on)),
        };
        Some(result)
    }

    /// Runs `ticks` engine ticks, polling inputs after each one.
    pub fn advance(&mut self, ticks: u32) -> Vec<String> {
        let mut completed = Vec::new();

        for _ in 0..ticks {
            let controller = self.executor.controller_mut();
            let report = controller.tick();
            controller.poll_inputs();
            self.ticks += 1;

            if self.waveform.len() == WAVEFORM_HISTORY {
                self.waveform.pop_front();
            }
            self.waveform.push_back(controller.board().sample());

            for channel in report.completed.iter() {
                completed.push(format!("completed {channel} at {}", format_elapsed(self.elapsed())));
            }
        }

        let mut lines = vec![format!("OK t={}", format_elapsed(self.elapsed()))];
        lines.extend(completed);
        lines
    }

    fn drive_input(&mut self, apply: impl FnOnce(&mut InputLevels)) -> Vec<String> {
        let controller = self.executor.controller_mut();
        apply(controller.board_mut().inputs_mut());
        let report = controller.poll_inputs();

        let levels = report.levels;
        vec![format!(
            "OK key={} switch={}",
            if levels.laser_key { "on" } else { "off" },
            if levels.spad_switch { "on" } else { "off" }
        )]
    }

    fn drain_notifications(&mut self) -> Vec<String> {
        self.executor
            .controller_mut()
            .take_notifications()
            .map(format_notification)
            .collect()
    }

    /// One row per channel, newest sample on the right.
    #[must_use]
    pub fn render_waveform(&self, width: usize) -> Vec<String> {
        let skip = self.waveform.len().saturating_sub(width);
        let captured = u64::try_from(self.waveform.len() - skip).unwrap_or(u64::MAX);
        let start_tick = self.ticks.saturating_sub(captured);

        let mut lines = vec![format!(
            "ticks {start_tick}..{} ({} per column)",
            self.ticks,
            format_elapsed(self.config.period())
        )];
        for channel in ChannelId::ALL {
            let trace: String = self
                .waveform
                .iter()
                .skip(skip)
                .map(|sample| if sample[channel.as_index()] { '#' } else { '_' })
                .collect();
            let edges = self.controller().board().rising_edges(channel);
            lines.push(format!("{:<9}{trace} edges={edges}", channel.to_string()));
        }
        lines
    }

    /// Channels currently running.
    #[must_use]
    pub fn active_channels(&self) -> ChannelMask {
        ChannelId::ALL
            .into_iter()
            .filter(|id| self.controller().engine().is_active(*id))
            .collect()
    }
}

fn format_notification(notification: Notification) -> String {
    format!("! {} = {}", notification.address, notification.value)
}

fn parse_tick_count(argument: Option<&str>) -> Result<u32, String> {
    let Some(text) = argument else {
        return Ok(1);
    };
    let ticks: u32 = text
        .parse()
        .map_err(|_| format!("invalid tick count `{text}`"))?;
    if ticks > MAX_ADVANCE_TICKS {
        return Err(format!("at most {MAX_ADVANCE_TICKS} ticks per request"));
    }
    Ok(ticks)
}

fn parse_wave_width(argument: Option<&str>) -> Result<usize, String> {
    match argument {
        None => Ok(DEFAULT_WAVE_WIDTH),
        Some(text) => match text.parse::<usize>() {
            Ok(0) | Err(_) => Err(format!("invalid width `{text}`")),
            Ok(width) => Ok(width.min(WAVEFORM_HISTORY)),
        },
    }
}

fn parse_switch(argument: Option<&str>) -> Result<bool, String> {
    match argument.map(str::to_ascii_lowercase).as_deref() {
        Some("on" | "1" | "high") => Ok(true),
        Some("off" | "0" | "low") => Ok(false),
        Some(other) => Err(format!("expected on or off, found `{other}`")),
        None => Err("expected on or off".to_string()),
    }
}

/// Parses `250ms`, `2s` or `500us`. A bare number is milliseconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration `{text}`"))?;

    match unit.to_ascii_lowercase().as_str() {
        "us" => Ok(Duration::from_micros(value)),
        "" | "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(format!("unknown duration unit `{unit}`")),
    }
}

fn format_elapsed(duration: Duration) -> String {
    if duration.subsec_nanos() % 1_000_000 == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}us", duration.as_micros())
    }
}

pub struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    pub fn create(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        writeln!(logger.writer, "# {header}")?;
        writeln!(logger.writer, "# Timestamps are virtual milliseconds since session start")?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, elapsed: Duration, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(TickConfig::DEFAULT, None).unwrap()
    }

    #[test]
    fn durations_accept_common_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("500us"), Ok(Duration::from_micros(500)));
        assert_eq!(parse_duration("40"), Ok(Duration::from_millis(40)));
        assert!(parse_duration("5min").is_err());
        assert!(parse_duration("ms").is_err());
    }

    #[test]
    fn started_channel_runs_to_completion() {
        let mut session = session();
        session.handle_command("start bnc0 on=2 off=3 pulses=2").unwrap();
        assert!(session.active_channels().contains(ChannelId::Bnc0));

        let lines = session.handle_command("run 10ms").unwrap();
        assert_eq!(lines[0], "OK t=10ms");
        assert!(lines.iter().any(|line| line == "completed BNC0 at 10ms"));
        assert!(lines.iter().any(|line| line.starts_with("! bncs-state = 0")));
        assert!(session.active_channels().is_empty());
        assert_eq!(session.controller().board().rising_edges(ChannelId::Bnc0), 2);
    }

    #[test]
    fn waveform_shows_each_window() {
        let mut session = session();
        session.handle_command("start signal-a on=2 off=2 pulses=2").unwrap();
        session.handle_command("tick 8").unwrap();

        let wave = session.render_waveform(8);
        assert_eq!(wave[0], "ticks 0..8 (1ms per column)");
        assert_eq!(wave[3], "SIGNAL_A #__##___ edges=2");
    }

    #[test]
    fn inputs_report_through_notifications() {
        let mut session = session();
        let lines = session.handle_command("switch on").unwrap();
        assert_eq!(lines[0], "OK key=off switch=on");
        assert_eq!(lines[1], "! spad-switch = 1 (0x01)");
        assert!(session.controller().board().lines().relay_closed);

        assert!(session.handle_command("key maybe").unwrap()[0].starts_with("error:"));
    }

    #[test]
    fn legacy_tick_halves_the_period() {
        let mut session = Session::new(TickConfig::LEGACY, None).unwrap();
        let lines = session.handle_command("run 3ms").unwrap();
        assert_eq!(lines[0], "OK t=3ms");
        assert_eq!(session.ticks, 6);
    }

    #[test]
    fn device_commands_pass_through() {
        let mut session = session();
        assert_eq!(session.handle_command("read bncs-state").unwrap(), ["bncs-state = 0 (0x00)"]);
        assert!(session.handle_command("frobnicate").unwrap()[0].starts_with("error: parse:"));

        let lines = session.handle_command("write bnc1-on 7").unwrap();
        assert_eq!(lines, ["OK bnc1-on"]);
    }
}
