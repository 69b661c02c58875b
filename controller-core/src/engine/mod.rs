//! Multi-channel pulse-train timing engine.
//!
//! Each of the four channels is a small countdown state machine advanced by
//! [`PulseTrainEngine::tick`]. Per channel, a tail delay precedes the first
//! pulse; afterwards the output alternates between `on_duration` asserted ticks
//! and `off_duration` released ticks until the pulse budget runs out.
//!
//! Timing is measured in ticks since arming. With tail `T`, on `A`, off `B`,
//! and `N` pulses, pulse `i` (zero based) is asserted from tick `T + i·(A+B)`
//! for `A` ticks and the channel returns to idle at tick `T + N·(A+B)`.
//!
//! The engine never blocks and never fails once a channel is armed. All
//! counters saturate at zero.

mod sink;

use core::fmt;

use crate::channels::{CHANNEL_COUNT, ChannelId, ChannelMask};

pub use sink::{NoopOutputSink, OutputSink};

/// Per-channel timing configuration, expressed in ticks.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct IntervalDescriptor {
    pub on_duration: u16,
    pub off_duration: u16,
    /// Number of pulses to emit; zero repeats until stopped.
    pub pulse_count: u16,
    /// Quiet ticks before the first pulse.
    pub tail_delay: u16,
}

impl IntervalDescriptor {
    #[must_use]
    pub const fn new(on_duration: u16, off_duration: u16, pulse_count: u16, tail_delay: u16) -> Self {
        Self {
            on_duration,
            off_duration,
            pulse_count,
            tail_delay,
        }
    }

    /// Length of one on+off period in ticks.
    #[must_use]
    pub const fn period(&self) -> u32 {
        self.on_duration as u32 + self.off_duration as u32
    }

    #[must_use]
    pub const fn budget(&self) -> PulseBudget {
        PulseBudget::from_count(self.pulse_count)
    }
}

/// Pulses left to emit on an armed channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PulseBudget {
    Unlimited,
    /// Pulses remaining, counting the one in flight.
    Remaining(u16),
}

impl PulseBudget {
    /// Maps a register pulse count, where zero means unlimited.
    #[must_use]
    pub const fn from_count(count: u16) -> Self {
        if count == 0 {
            PulseBudget::Unlimited
        } else {
            PulseBudget::Remaining(count)
        }
    }
}

impl fmt::Display for PulseBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseBudget::Unlimited => f.write_str("inf"),
            PulseBudget::Remaining(count) => write!(f, "{count}"),
        }
    }
}

/// Phase of a channel's state machine.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ChannelPhase {
    #[default]
    Idle,
    TailWait,
    On,
    Off,
}

impl ChannelPhase {
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, ChannelPhase::Idle)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ChannelPhase::Idle => "idle",
            ChannelPhase::TailWait => "tail",
            ChannelPhase::On => "on",
            ChannelPhase::Off => "off",
        }
    }
}

/// Mutable runtime counters for one channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CountdownState {
    phase: ChannelPhase,
    tail_remaining: u16,
    period_remaining: u32,
    phase_remaining: u16,
    pulses: PulseBudget,
}

impl CountdownState {
    const IDLE: CountdownState = CountdownState {
        phase: ChannelPhase::Idle,
        tail_remaining: 0,
        period_remaining: 0,
        phase_remaining: 0,
        pulses: PulseBudget::Unlimited,
    };

    #[must_use]
    pub const fn phase(&self) -> ChannelPhase {
        self.phase
    }

    #[must_use]
    pub const fn tail_remaining(&self) -> u16 {
        self.tail_remaining
    }

    #[must_use]
    pub const fn period_remaining(&self) -> u32 {
        self.period_remaining
    }

    #[must_use]
    pub const fn phase_remaining(&self) -> u16 {
        self.phase_remaining
    }

    #[must_use]
    pub const fn pulses(&self) -> PulseBudget {
        self.pulses
    }
}

/// Reasons a channel start is refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArmError {
    /// A zero on-duration cannot produce a pulse.
    ZeroOnDuration,
}

impl fmt::Display for ArmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArmError::ZeroOnDuration => f.write_str("on duration must be at least one tick"),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct ChannelSlot {
    descriptor: IntervalDescriptor,
    countdown: CountdownState,
}

impl ChannelSlot {
    const IDLE: ChannelSlot = ChannelSlot {
        descriptor: IntervalDescriptor::new(0, 0, 0, 0),
        countdown: CountdownState::IDLE,
    };

    fn begin_pulse(&mut self) {
        self.countdown.phase = ChannelPhase::On;
        self.countdown.phase_remaining = self.descriptor.on_duration;
        self.countdown.period_remaining = self.descriptor.period();
    }

    /// Advances one tick. Returns `true` when the channel just finished.
    fn advance<S: OutputSink + ?Sized>(&mut self, id: ChannelId, sink: &mut S) -> bool {
        match self.countdown.phase {
            ChannelPhase::Idle => false,
            ChannelPhase::TailWait => {
                self.countdown.tail_remaining = self.countdown.tail_remaining.saturating_sub(1);
                if self.countdown.tail_remaining == 0 {
                    self.begin_pulse();
                    sink.assert(id);
                }
                false
            }
            ChannelPhase::On | ChannelPhase::Off => {
                self.countdown.period_remaining = self.countdown.period_remaining.saturating_sub(1);
                self.countdown.phase_remaining = self.countdown.phase_remaining.saturating_sub(1);
                if self.countdown.phase_remaining > 0 {
                    return false;
                }

                if self.countdown.period_remaining > 0 {
                    self.countdown.phase = ChannelPhase::Off;
                    self.countdown.phase_remaining = self.descriptor.off_duration;
                    sink.deassert(id);
                    return false;
                }

                self.finish_period(id, sink)
            }
        }
    }

    fn finish_period<S: OutputSink + ?Sized>(&mut self, id: ChannelId, sink: &mut S) -> bool {
        match self.countdown.pulses {
            PulseBudget::Remaining(count) if count <= 1 => {
                self.countdown = CountdownState::IDLE;
                sink.deassert(id);
                return true;
            }
            PulseBudget::Remaining(count) => {
                self.countdown.pulses = PulseBudget::Remaining(count - 1);
            }
            PulseBudget::Unlimited => {}
        }

        // Zero off-time lands here straight from On; release first so
        // back-to-back pulses stay distinct edges.
        if self.countdown.phase == ChannelPhase::On {
            sink.deassert(id);
        }
        self.begin_pulse();
        sink.assert(id);
        false
    }
}

/// Fixed-capacity engine driving every pulse-train channel.
#[derive(Clone, Debug)]
pub struct PulseTrainEngine {
    slots: [ChannelSlot; CHANNEL_COUNT],
}

impl PulseTrainEngine {
    /// Creates an engine with every channel idle.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: [ChannelSlot::IDLE; CHANNEL_COUNT],
        }
    }

    /// Arms `id` with `descriptor`, discarding any timing already in progress.
    ///
    /// With no tail delay the output is asserted before this call returns.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError::ZeroOnDuration`] when the descriptor cannot emit a
    /// pulse. The channel is left idle in that case.
    pub fn start_channel<S: OutputSink + ?Sized>(
        &mut self,
        id: ChannelId,
        descriptor: IntervalDescriptor,
        sink: &mut S,
    ) -> Result<(), ArmError> {
        let slot = &mut self.slots[id.as_index()];
        let was_asserted = slot.countdown.phase == ChannelPhase::On;

        if descriptor.on_duration == 0 {
            if slot.countdown.phase.is_active() {
                slot.countdown = CountdownState::IDLE;
                sink.deassert(id);
            }
            return Err(ArmError::ZeroOnDuration);
        }

        slot.descriptor = descriptor;
        slot.countdown = CountdownState {
            pulses: descriptor.budget(),
            ..CountdownState::IDLE
        };

        if was_asserted {
            sink.deassert(id);
        }

        if descriptor.tail_delay > 0 {
            slot.countdown.phase = ChannelPhase::TailWait;
            slot.countdown.tail_remaining = descriptor.tail_delay;
        } else {
            slot.begin_pulse();
            sink.assert(id);
        }

        Ok(())
    }

    /// Forces `id` idle and releases its output.
    ///
    /// Returns `false` without touching the sink when the channel was already idle.
    pub fn stop_channel<S: OutputSink + ?Sized>(&mut self, id: ChannelId, sink: &mut S) -> bool {
        let slot = &mut self.slots[id.as_index()];
        if !slot.countdown.phase.is_active() {
            return false;
        }

        slot.countdown = CountdownState::IDLE;
        sink.deassert(id);
        true
    }

    /// Stops every active channel, returning the ones that were running.
    pub fn stop_all<S: OutputSink + ?Sized>(&mut self, sink: &mut S) -> ChannelMask {
        ChannelId::ALL
            .into_iter()
            .filter(|id| self.stop_channel(*id, sink))
            .collect()
    }

    /// Advances every channel by one tick and reports channels that completed.
    pub fn tick<S: OutputSink + ?Sized>(&mut self, sink: &mut S) -> ChannelMask {
        let mut completed = ChannelMask::empty();
        for id in ChannelId::ALL {
            if self.slots[id.as_index()].advance(id, sink) {
                completed.insert(id);
            }
        }
        completed
    }

    #[must_use]
    pub fn is_active(&self, id: ChannelId) -> bool {
        self.phase(id).is_active()
    }

    /// Channels currently running.
    #[must_use]
    pub fn active_mask(&self) -> ChannelMask {
        ChannelId::ALL
            .into_iter()
            .filter(|id| self.is_active(*id))
            .collect()
    }

    #[must_use]
    pub fn phase(&self, id: ChannelId) -> ChannelPhase {
        self.slots[id.as_index()].countdown.phase
    }

    /// Descriptor used by the most recent successful start of `id`.
    #[must_use]
    pub fn descriptor(&self, id: ChannelId) -> IntervalDescriptor {
        self.slots[id.as_index()].descriptor
    }

    #[must_use]
    pub fn countdown(&self, id: ChannelId) -> CountdownState {
        self.slots[id.as_index()].countdown
    }
}

impl Default for PulseTrainEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingSink {
        asserts: [u32; CHANNEL_COUNT],
        deasserts: [u32; CHANNEL_COUNT],
    }

    impl OutputSink for CountingSink {
        fn assert(&mut self, channel: ChannelId) {
            self.asserts[channel.as_index()] += 1;
        }

        fn deassert(&mut self, channel: ChannelId) {
            self.deasserts[channel.as_index()] += 1;
        }
    }

    #[test]
    fn start_without_tail_asserts_immediately() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = CountingSink::default();

        engine
            .start_channel(ChannelId::Bnc0, IntervalDescriptor::new(3, 2, 1, 0), &mut sink)
            .unwrap();

        assert_eq!(engine.phase(ChannelId::Bnc0), ChannelPhase::On);
        assert_eq!(sink.asserts[0], 1);
        let countdown = engine.countdown(ChannelId::Bnc0);
        assert_eq!(countdown.phase_remaining(), 3);
        assert_eq!(countdown.period_remaining(), 5);
        assert_eq!(countdown.pulses(), PulseBudget::Remaining(1));
    }

    #[test]
    fn tail_wait_leaves_period_counters_untouched() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = CountingSink::default();

        engine
            .start_channel(ChannelId::Bnc1, IntervalDescriptor::new(4, 4, 0, 3), &mut sink)
            .unwrap();
        engine.tick(&mut sink);

        let countdown = engine.countdown(ChannelId::Bnc1);
        assert_eq!(countdown.phase(), ChannelPhase::TailWait);
        assert_eq!(countdown.tail_remaining(), 2);
        assert_eq!(countdown.period_remaining(), 0);
        assert_eq!(countdown.phase_remaining(), 0);
        assert_eq!(sink.asserts[1], 0);
    }

    #[test]
    fn zero_on_duration_is_rejected_and_stops_running_channel() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = CountingSink::default();

        engine
            .start_channel(ChannelId::SignalA, IntervalDescriptor::new(2, 2, 0, 0), &mut sink)
            .unwrap();
        let result =
            engine.start_channel(ChannelId::SignalA, IntervalDescriptor::new(0, 5, 1, 0), &mut sink);

        assert_eq!(result, Err(ArmError::ZeroOnDuration));
        assert!(!engine.is_active(ChannelId::SignalA));
        assert_eq!(sink.deasserts[2], 1);
    }

    #[test]
    fn stop_on_idle_channel_is_silent() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = CountingSink::default();

        assert!(!engine.stop_channel(ChannelId::SignalB, &mut sink));
        assert_eq!(sink.deasserts, [0; CHANNEL_COUNT]);
    }

    #[test]
    fn completion_is_reported_once() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = CountingSink::default();

        engine
            .start_channel(ChannelId::Bnc0, IntervalDescriptor::new(1, 1, 1, 0), &mut sink)
            .unwrap();

        assert!(engine.tick(&mut sink).is_empty());
        assert_eq!(engine.tick(&mut sink), ChannelMask::only(ChannelId::Bnc0));
        assert!(engine.tick(&mut sink).is_empty());
        assert_eq!(engine.active_mask(), ChannelMask::empty());
    }

    #[test]
    fn stop_all_reports_running_channels() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = CountingSink::default();

        engine
            .start_channel(ChannelId::Bnc1, IntervalDescriptor::new(5, 5, 0, 0), &mut sink)
            .unwrap();
        engine
            .start_channel(ChannelId::SignalB, IntervalDescriptor::new(5, 5, 0, 9), &mut sink)
            .unwrap();

        let stopped = engine.stop_all(&mut sink);
        assert_eq!(stopped.bits(), ChannelId::Bnc1.mask_bit() | ChannelId::SignalB.mask_bit());
        assert_eq!(sink.deasserts, [0, 1, 0, 1]);
    }

    #[test]
    fn period_does_not_overflow() {
        let descriptor = IntervalDescriptor::new(u16::MAX, u16::MAX, 1, 0);
        assert_eq!(descriptor.period(), 2 * u32::from(u16::MAX));
    }
}
