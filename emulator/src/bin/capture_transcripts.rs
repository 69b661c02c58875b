use std::io;
use std::path::Path;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use controller_core::timing::TickConfig;
use session::{Session, TranscriptLogger};

const TRANSCRIPT_DIR: &str = "transcripts";

/// Demo scenarios replayed against a fresh emulator session each.
const SCENARIOS: &[Scenario] = &[
    Scenario {
        name: "burst",
        header: "Finite BNC burst armed through the state word",
        commands: &[
            "write bnc0-on 2",
            "write bnc0-off 3",
            "write bnc0-pulses 3",
            "write bnc0-tail 1",
            "write bncs-state 0x01",
            "tick 20",
            "wave 20",
            "status",
        ],
    },
    Scenario {
        name: "continuous",
        header: "Continuous signal train stopped from the REPL",
        commands: &[
            "start signal-a on=1 off=0 pulses=0",
            "start signal-b on=5 off=5 pulses=0 tail=3",
            "run 30ms",
            "wave 30",
            "stop all",
            "read signal-state",
        ],
    },
    Scenario {
        name: "standby",
        header: "Laser settings, inputs and standby",
        commands: &[
            "write frequency 2",
            "write intensity 180",
            "write output-set 0x03",
            "key on",
            "switch on",
            "start bnc1 on=10 off=10",
            "tick 5",
            "standby",
            "status",
        ],
    },
];

struct Scenario {
    name: &'static str,
    header: &'static str,
    commands: &'static [&'static str],
}

fn main() -> io::Result<()> {
    for scenario in SCENARIOS {
        record(scenario)?;
    }
    Ok(())
}

fn record(scenario: &Scenario) -> io::Result<()> {
    let path = Path::new(TRANSCRIPT_DIR).join(format!("{}.log", scenario.name));
    let transcript = TranscriptLogger::create(&path, scenario.header)?;
    let mut session = Session::new(TickConfig::DEFAULT, Some(transcript))?;

    for command in scenario.commands {
        let _ = session.handle_command(command)?;
    }

    println!("wrote {}", path.display());
    Ok(())
}
