use controller_core::channels::{CHANNEL_COUNT, ChannelId, ChannelMask};
use controller_core::engine::{ChannelPhase, IntervalDescriptor, OutputSink, PulseTrainEngine};

/// Records output levels and edge counts per channel.
#[derive(Default)]
struct WaveformSink {
    levels: [bool; CHANNEL_COUNT],
    rising: [u32; CHANNEL_COUNT],
    falling: [u32; CHANNEL_COUNT],
}

impl OutputSink for WaveformSink {
    fn assert(&mut self, channel: ChannelId) {
        let index = channel.as_index();
        if !self.levels[index] {
            self.rising[index] += 1;
        }
        self.levels[index] = true;
    }

    fn deassert(&mut self, channel: ChannelId) {
        let index = channel.as_index();
        if self.levels[index] {
            self.falling[index] += 1;
        }
        self.levels[index] = false;
    }
}

/// Level of `id` at tick 0 (right after arming) and after each following tick,
/// plus the tick at which the channel went idle.
fn trace(descriptor: IntervalDescriptor, ticks: usize) -> (Vec<bool>, Option<usize>, WaveformSink) {
    let mut engine = PulseTrainEngine::new();
    let mut sink = WaveformSink::default();
    let id = ChannelId::Bnc0;

    engine.start_channel(id, descriptor, &mut sink).unwrap();

    let mut levels = vec![sink.levels[id.as_index()]];
    let mut idle_at = None;
    for tick in 1..=ticks {
        let completed = engine.tick(&mut sink);
        levels.push(sink.levels[id.as_index()]);
        if completed.contains(id) {
            assert_eq!(idle_at, None, "channel completed twice");
            assert_eq!(engine.phase(id), ChannelPhase::Idle);
            idle_at = Some(tick);
        }
    }

    (levels, idle_at, sink)
}

/// Start tick and length of every asserted window.
fn windows(levels: &[bool]) -> Vec<(usize, usize)> {
    let mut found = Vec::new();
    let mut start = None;
    for (tick, level) in levels.iter().copied().enumerate() {
        match (level, start) {
            (true, None) => start = Some(tick),
            (false, Some(begin)) => {
                found.push((begin, tick - begin));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        found.push((begin, levels.len() - begin));
    }
    found
}

#[test]
fn finite_trains_produce_exact_windows() {
    let cases = [(3_u16, 2_u16, 4_u16, 0_u16), (1, 4, 2, 5), (2, 2, 1, 1), (6, 1, 3, 2)];

    for (on, off, pulses, tail) in cases {
        let descriptor = IntervalDescriptor::new(on, off, pulses, tail);
        let expected_idle = usize::from(tail) + usize::from(pulses) * usize::from(on + off);
        let (levels, idle_at, _) = trace(descriptor, expected_idle + 10);

        let expected: Vec<(usize, usize)> = (0..usize::from(pulses))
            .map(|n| (usize::from(tail) + n * usize::from(on + off), usize::from(on)))
            .collect();
        assert_eq!(windows(&levels), expected, "windows for {descriptor:?}");
        assert_eq!(idle_at, Some(expected_idle), "idle tick for {descriptor:?}");
        assert!(levels[expected_idle..].iter().all(|level| !level));
    }
}

#[test]
fn single_one_tick_pulse() {
    let (levels, idle_at, sink) = trace(IntervalDescriptor::new(1, 1, 1, 0), 5);

    assert_eq!(&levels[..3], &[true, false, false]);
    assert_eq!(idle_at, Some(2));
    assert_eq!(sink.rising[0], 1);
    assert_eq!(sink.falling[0], 1);
}

#[test]
fn zero_off_time_keeps_pulses_distinct() {
    let (levels, idle_at, sink) = trace(IntervalDescriptor::new(5, 0, 3, 0), 20);

    assert_eq!(sink.rising[0], 3);
    assert_eq!(sink.falling[0], 3);
    assert_eq!(idle_at, Some(15));
    assert!(levels[..15].iter().all(|level| *level));
    assert!(!levels[15]);
}

#[test]
fn infinite_train_repeats_until_stopped() {
    let mut engine = PulseTrainEngine::new();
    let mut sink = WaveformSink::default();
    let id = ChannelId::SignalA;

    engine
        .start_channel(id, IntervalDescriptor::new(2, 3, 0, 0), &mut sink)
        .unwrap();

    let mut levels = vec![sink.levels[id.as_index()]];
    for _ in 0..51 {
        assert!(engine.tick(&mut sink).is_empty());
        levels.push(sink.levels[id.as_index()]);
    }

    for (tick, level) in levels.iter().enumerate() {
        assert_eq!(*level, tick % 5 < 2, "tick {tick}");
    }

    // Tick 51 sits inside an on window; stop releases immediately.
    assert!(sink.levels[id.as_index()]);
    assert!(engine.stop_channel(id, &mut sink));
    assert!(!sink.levels[id.as_index()]);
    assert_eq!(engine.phase(id), ChannelPhase::Idle);
}

#[test]
fn stop_on_idle_channel_has_no_effect() {
    let mut engine = PulseTrainEngine::new();
    let mut sink = WaveformSink::default();

    engine
        .start_channel(ChannelId::Bnc1, IntervalDescriptor::new(1, 1, 1, 0), &mut sink)
        .unwrap();
    engine.tick(&mut sink);
    engine.tick(&mut sink);
    assert_eq!(engine.phase(ChannelId::Bnc1), ChannelPhase::Idle);

    let before = engine.countdown(ChannelId::Bnc1);
    assert!(!engine.stop_channel(ChannelId::Bnc1, &mut sink));
    assert_eq!(engine.countdown(ChannelId::Bnc1), before);
    assert_eq!(sink.falling[1], 1);
}

#[test]
fn rearm_restarts_from_new_configuration() {
    let mut engine = PulseTrainEngine::new();
    let mut sink = WaveformSink::default();
    let id = ChannelId::SignalB;

    engine
        .start_channel(id, IntervalDescriptor::new(10, 10, 0, 0), &mut sink)
        .unwrap();
    for _ in 0..4 {
        engine.tick(&mut sink);
    }

    engine
        .start_channel(id, IntervalDescriptor::new(2, 1, 1, 3), &mut sink)
        .unwrap();
    assert_eq!(engine.phase(id), ChannelPhase::TailWait);
    assert!(!sink.levels[id.as_index()]);

    let mut completed_at = None;
    for tick in 1..=10 {
        if engine.tick(&mut sink).contains(id) {
            completed_at = Some(tick);
        }
        if tick == 3 {
            assert!(sink.levels[id.as_index()]);
        }
    }
    assert_eq!(completed_at, Some(6));
    assert_eq!(sink.rising[id.as_index()], 2);
}

#[test]
fn channels_run_independently() {
    let mut engine = PulseTrainEngine::new();
    let mut sink = WaveformSink::default();

    engine
        .start_channel(ChannelId::Bnc0, IntervalDescriptor::new(2, 2, 2, 0), &mut sink)
        .unwrap();
    engine
        .start_channel(ChannelId::SignalA, IntervalDescriptor::new(3, 1, 0, 1), &mut sink)
        .unwrap();

    let mut bnc0 = vec![sink.levels[0]];
    let mut signal_a = vec![sink.levels[2]];
    let mut completed = ChannelMask::empty();
    for _ in 0..16 {
        completed = completed.union(engine.tick(&mut sink));
        bnc0.push(sink.levels[0]);
        signal_a.push(sink.levels[2]);
    }

    assert_eq!(windows(&bnc0), vec![(0, 2), (4, 2)]);
    assert_eq!(windows(&signal_a), vec![(1, 3), (5, 3), (9, 3), (13, 3)]);
    assert_eq!(completed, ChannelMask::only(ChannelId::Bnc0));
    assert_eq!(engine.active_mask(), ChannelMask::only(ChannelId::SignalA));
    assert_eq!(sink.rising[1], 0);
    assert_eq!(sink.rising[3], 0);
}
