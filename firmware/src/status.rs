#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared runtime counters for the firmware target.
//!
//! Lightweight atomics track tick cadence and USB attachment so the REPL can
//! append a runtime line to `status` without taking the controller lock.

use core::fmt;

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// Ticks delivered to the engine since boot.
static TICK_COUNT: AtomicU32 = AtomicU32::new(0);
/// Ticks that woke later than one full period after their deadline.
static LATE_TICKS: AtomicU32 = AtomicU32::new(0);
/// Input edges seen on the key or SPAD switch.
static INPUT_EDGES: AtomicU32 = AtomicU32::new(0);
/// Whether the host has the REPL port open (DTR asserted).
static LINK_ATTACHED: AtomicBool = AtomicBool::new(false);

/// Counts one engine tick.
pub fn record_tick(late: bool) {
    TICK_COUNT.fetch_add(1, Ordering::Relaxed);
    if late {
        LATE_TICKS.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn record_input_edge() {
    INPUT_EDGES.fetch_add(1, Ordering::Relaxed);
}

pub fn set_link_attached(attached: bool) {
    LINK_ATTACHED.store(attached, Ordering::Relaxed);
}

/// Point-in-time copy of the runtime counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeStatus {
    pub ticks: u32,
    pub late_ticks: u32,
    pub input_edges: u32,
    pub link_attached: bool,
}

impl RuntimeStatus {
    /// Writes the runtime line (e.g. `runtime ticks=1200 late=0 edges=2 link=attached`).
    pub fn write_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "runtime ticks={} late={} edges={} link={}",
            self.ticks,
            self.late_ticks,
            self.input_edges,
            if self.link_attached { "attached" } else { "detached" }
        )
    }
}

/// Reads every counter.
pub fn snapshot() -> RuntimeStatus {
    RuntimeStatus {
        ticks: TICK_COUNT.load(Ordering::Relaxed),
        late_ticks: LATE_TICKS.load(Ordering::Relaxed),
        input_edges: INPUT_EDGES.load(Ordering::Relaxed),
        link_attached: LINK_ATTACHED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_line_formats_counters() {
        let status = RuntimeStatus {
            ticks: 1_200,
            late_ticks: 1,
            input_edges: 2,
            link_attached: true,
        };

        let mut text = String::new();
        status.write_line(&mut text).unwrap();
        assert_eq!(text, "runtime ticks=1200 late=1 edges=2 link=attached");
    }

    #[test]
    fn counters_only_grow() {
        let before = snapshot();
        record_tick(true);
        record_input_edge();

        let after = snapshot();
        assert!(after.ticks > before.ticks);
        assert!(after.late_ticks > before.late_ticks);
        assert!(after.input_edges > before.input_edges);
    }
}
