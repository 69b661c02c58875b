mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use controller_core::timing::TickConfig;
use crossterm::style::Stylize;

use session::{Session, TranscriptLogger};

const USAGE: &str = "Usage: laser-driver-emulator [--tick-us <n>] [--transcript <path>]";

struct Options {
    config: TickConfig,
    transcript: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let transcript = options
        .transcript
        .as_deref()
        .map(|path| TranscriptLogger::create(path, "Laser driver emulator transcript"))
        .transpose()?;

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(options.config, transcript)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Laser driver emulator ready (tick {}us). Type `help` for commands or `exit` to quit.",
        options.config.period().as_micros()
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            if response.starts_with("error:") {
                writeln!(writer, "{}", response.red())?;
            } else if response.starts_with('!') {
                writeln!(writer, "{}", response.yellow())?;
            } else if response.starts_with("OK") {
                writeln!(writer, "{}", response.green())?;
            } else {
                writeln!(writer, "{response}")?;
            }
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        config: TickConfig::DEFAULT,
        transcript: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
            None => (arg, None),
        };
        let mut value = || {
            inline
                .clone()
                .or_else(|| args.next())
                .ok_or_else(|| format!("Expected value after {flag}"))
        };

        match flag.as_str() {
            "--tick-us" => {
                let text = value()?;
                let micros: u64 = text
                    .parse()
                    .map_err(|_| format!("Invalid tick period `{text}`"))?;
                options.config =
                    TickConfig::try_new(Duration::from_micros(micros)).map_err(|err| err.to_string())?;
            }
            "--legacy-tick" => options.config = TickConfig::LEGACY,
            "--transcript" => options.transcript = Some(PathBuf::from(value()?)),
            other => return Err(format!("Unknown argument `{other}`")),
        }
    }

    Ok(options)
}
