//! Translation between group state words and engine operations.
//!
//! A state word is the host-facing view of two channels. Writing one arms
//! every channel whose bit is set and stops every running channel whose bit is
//! clear. Reading one is always derived from the engine, so a channel that ran
//! out of pulses reads back as 0 without any extra bookkeeping.

use crate::channels::{ChannelGroup, ChannelId, ChannelMask};
use crate::engine::{IntervalDescriptor, OutputSink, PulseTrainEngine};

/// Channels touched by a state word write.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct StateWordChange {
    pub armed: ChannelMask,
    pub stopped: ChannelMask,
    /// Channels whose start was refused by the engine.
    pub rejected: ChannelMask,
}

impl StateWordChange {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            armed: ChannelMask::empty(),
            stopped: ChannelMask::empty(),
            rejected: ChannelMask::empty(),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.armed.is_empty() && self.stopped.is_empty() && self.rejected.is_empty()
    }

    /// Folds another change into this one.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self {
            armed: self.armed.union(other.armed),
            stopped: self.stopped.union(other.stopped),
            rejected: self.rejected.union(other.rejected),
        }
    }
}

/// Current state word for `group`, built from engine activity.
#[must_use]
pub fn state_word(engine: &PulseTrainEngine, group: ChannelGroup) -> u8 {
    group
        .channels()
        .into_iter()
        .filter(|id| engine.is_active(*id))
        .fold(0, |word, id| word | id.state_bit())
}

/// Applies a state word write to the engine.
///
/// `descriptor_for` supplies the configuration of each channel being armed,
/// normally read from its parameter registers. Bits outside the group mask are
/// ignored.
pub fn apply_state_word<F, S>(
    engine: &mut PulseTrainEngine,
    group: ChannelGroup,
    word: u8,
    mut descriptor_for: F,
    sink: &mut S,
) -> StateWordChange
where
    F: FnMut(ChannelId) -> IntervalDescriptor,
    S: OutputSink + ?Sized,
{
    let mut change = StateWordChange::none();

    for id in group.channels() {
        if word & id.state_bit() != 0 {
            match engine.start_channel(id, descriptor_for(id), sink) {
                Ok(()) => change.armed.insert(id),
                Err(_) => change.rejected.insert(id),
            }
        } else if engine.stop_channel(id, sink) {
            change.stopped.insert(id);
        }
    }

    change
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NoopOutputSink;

    fn descriptors(id: ChannelId) -> IntervalDescriptor {
        match id {
            ChannelId::Bnc1 => IntervalDescriptor::new(0, 4, 1, 0),
            _ => IntervalDescriptor::new(2, 2, 1, 0),
        }
    }

    #[test]
    fn set_bits_arm_and_clear_bits_stop() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = NoopOutputSink::new();

        let change = apply_state_word(&mut engine, ChannelGroup::Signals, 0b01, descriptors, &mut sink);
        assert_eq!(change.armed, ChannelMask::only(ChannelId::SignalA));
        assert!(change.stopped.is_empty());
        assert_eq!(state_word(&engine, ChannelGroup::Signals), 0b01);

        let change = apply_state_word(&mut engine, ChannelGroup::Signals, 0b10, descriptors, &mut sink);
        assert_eq!(change.armed, ChannelMask::only(ChannelId::SignalB));
        assert_eq!(change.stopped, ChannelMask::only(ChannelId::SignalA));
        assert_eq!(state_word(&engine, ChannelGroup::Signals), 0b10);
    }

    #[test]
    fn rejected_start_keeps_bit_clear() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = NoopOutputSink::new();

        let change = apply_state_word(&mut engine, ChannelGroup::Bncs, 0b11, descriptors, &mut sink);
        assert_eq!(change.armed, ChannelMask::only(ChannelId::Bnc0));
        assert_eq!(change.rejected, ChannelMask::only(ChannelId::Bnc1));
        assert_eq!(state_word(&engine, ChannelGroup::Bncs), 0b01);
    }

    #[test]
    fn completed_channel_reads_back_clear() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = NoopOutputSink::new();

        apply_state_word(&mut engine, ChannelGroup::Bncs, 0b01, descriptors, &mut sink);
        for _ in 0..4 {
            engine.tick(&mut sink);
        }
        assert_eq!(state_word(&engine, ChannelGroup::Bncs), 0);
    }

    #[test]
    fn foreign_bits_are_ignored() {
        let mut engine = PulseTrainEngine::new();
        let mut sink = NoopOutputSink::new();

        let change = apply_state_word(&mut engine, ChannelGroup::Signals, 0xfc, descriptors, &mut sink);
        assert!(change.is_empty());
        assert!(engine.active_mask().is_empty());
    }
}
