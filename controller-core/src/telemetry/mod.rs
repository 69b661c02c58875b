//! Channel and register event log.
//!
//! Events land in a fixed-size ring so the firmware can keep a short history
//! without allocating.
//!
//! Event kinds serialize to compact numeric codes so they can travel over
//! diagnostics channels without a formatter. Payloads carry the channel
//! descriptor or register value that explains each event while remaining
//! `no_std` compatible.

use core::{fmt, time::Duration};

use heapless::HistoryBuf;

use crate::channels::ChannelId;
use crate::engine::IntervalDescriptor;
use crate::registers::{RegisterAddress, RegisterValue};

/// Monotonic identifier assigned to each telemetry record.
pub type EventId = u32;

/// What happened.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    ChannelArmed(ChannelId),
    ChannelStopped(ChannelId),
    ChannelCompleted(ChannelId),
    ArmRejected(ChannelId),
    RegisterWritten(RegisterAddress),
    Notified(RegisterAddress),
    StandbyEntered,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::ChannelArmed(id) => write!(f, "channel-armed {id}"),
            TelemetryEventKind::ChannelStopped(id) => write!(f, "channel-stopped {id}"),
            TelemetryEventKind::ChannelCompleted(id) => write!(f, "channel-completed {id}"),
            TelemetryEventKind::ArmRejected(id) => write!(f, "arm-rejected {id}"),
            TelemetryEventKind::RegisterWritten(address) => write!(f, "register-written {address}"),
            TelemetryEventKind::Notified(address) => write!(f, "notified {address}"),
            TelemetryEventKind::StandbyEntered => f.write_str("standby"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const CHANNEL_ARMED_BASE: u16 = 0x0000;
    const CHANNEL_STOPPED_BASE: u16 = 0x0004;
    const CHANNEL_COMPLETED_BASE: u16 = 0x0008;
    const ARM_REJECTED_BASE: u16 = 0x000C;
    const STANDBY_CODE: u16 = 0x0010;
    const REGISTER_WRITTEN_BASE: u16 = 0x0100;
    const NOTIFIED_BASE: u16 = 0x0200;
    const REGISTER_SPAN: u16 = 0x0100;

    /// Packs the event into a compact `u16` code.
    #[must_use]
    pub const fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::ChannelArmed(id) => Self::CHANNEL_ARMED_BASE + channel_code(id),
            TelemetryEventKind::ChannelStopped(id) => Self::CHANNEL_STOPPED_BASE + channel_code(id),
            TelemetryEventKind::ChannelCompleted(id) => {
                Self::CHANNEL_COMPLETED_BASE + channel_code(id)
            }
            TelemetryEventKind::ArmRejected(id) => Self::ARM_REJECTED_BASE + channel_code(id),
            TelemetryEventKind::RegisterWritten(address) => {
                Self::REGISTER_WRITTEN_BASE + address.raw() as u16
            }
            TelemetryEventKind::Notified(address) => Self::NOTIFIED_BASE + address.raw() as u16,
            TelemetryEventKind::StandbyEntered => Self::STANDBY_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Inverse of [`TelemetryEventKind::to_raw`]; unknown codes become `Custom`.
    ///
    /// [`Custom`]: TelemetryEventKind::Custom
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        let channel = |base: u16, wrap: fn(ChannelId) -> Self| {
            channel_from_code(code - base).map_or(TelemetryEventKind::Custom(code), wrap)
        };
        let register = |base: u16, wrap: fn(RegisterAddress) -> Self| {
            u8::try_from(code - base)
                .ok()
                .and_then(RegisterAddress::from_raw)
                .map_or(TelemetryEventKind::Custom(code), wrap)
        };

        match code {
            Self::STANDBY_CODE => TelemetryEventKind::StandbyEntered,
            value if value < Self::CHANNEL_STOPPED_BASE => {
                channel(Self::CHANNEL_ARMED_BASE, TelemetryEventKind::ChannelArmed)
            }
            value if value < Self::CHANNEL_COMPLETED_BASE => {
                channel(Self::CHANNEL_STOPPED_BASE, TelemetryEventKind::ChannelStopped)
            }
            value if value < Self::ARM_REJECTED_BASE => {
                channel(Self::CHANNEL_COMPLETED_BASE, TelemetryEventKind::ChannelCompleted)
            }
            value if value < Self::STANDBY_CODE => {
                channel(Self::ARM_REJECTED_BASE, TelemetryEventKind::ArmRejected)
            }
            value
                if (Self::REGISTER_WRITTEN_BASE..Self::REGISTER_WRITTEN_BASE + Self::REGISTER_SPAN)
                    .contains(&value) =>
            {
                register(Self::REGISTER_WRITTEN_BASE, TelemetryEventKind::RegisterWritten)
            }
            value if (Self::NOTIFIED_BASE..Self::NOTIFIED_BASE + Self::REGISTER_SPAN).contains(&value) => {
                register(Self::NOTIFIED_BASE, TelemetryEventKind::Notified)
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

/// Event details.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    Channel(ChannelTelemetry),
    Register(RegisterTelemetry),
}

impl TelemetryPayload {
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Channel transition payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelTelemetry {
    pub channel: ChannelId,
    pub descriptor: IntervalDescriptor,
    /// Time since the previous channel transition on any channel.
    pub elapsed_since_previous: Option<Duration>,
}

impl ChannelTelemetry {
    #[must_use]
    pub const fn new(
        channel: ChannelId,
        descriptor: IntervalDescriptor,
        elapsed_since_previous: Option<Duration>,
    ) -> Self {
        Self {
            channel,
            descriptor,
            elapsed_since_previous,
        }
    }
}

/// Register write or notification payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegisterTelemetry {
    pub address: RegisterAddress,
    pub value: RegisterValue,
}

/// What happened to a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ChannelTransition {
    Armed,
    Stopped,
    Completed,
    Rejected,
}

impl ChannelTransition {
    #[must_use]
    pub const fn event(self, channel: ChannelId) -> TelemetryEventKind {
        match self {
            ChannelTransition::Armed => TelemetryEventKind::ChannelArmed(channel),
            ChannelTransition::Stopped => TelemetryEventKind::ChannelStopped(channel),
            ChannelTransition::Completed => TelemetryEventKind::ChannelCompleted(channel),
            ChannelTransition::Rejected => TelemetryEventKind::ArmRejected(channel),
        }
    }
}

/// Records kept before the oldest is overwritten.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Monotonic timestamp source.
pub trait TelemetryInstant: Copy {
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Ring of the most recent [`TELEMETRY_RING_CAPACITY`] events.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_transition_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    pub fn oldest_first(&self) -> impl Iterator<Item = &TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a channel transition and captures elapsed time since the previous one.
    pub fn record_channel_transition(
        &mut self,
        channel: ChannelId,
        transition: ChannelTransition,
        descriptor: IntervalDescriptor,
        timestamp: TInstant,
    ) -> EventId {
        let elapsed = self
            .last_transition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_transition_at = Some(timestamp);

        let payload = TelemetryPayload::Channel(ChannelTelemetry::new(channel, descriptor, elapsed));
        self.record(transition.event(channel), payload, timestamp)
    }

    /// Records a host register write.
    pub fn record_register_write(
        &mut self,
        address: RegisterAddress,
        value: RegisterValue,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::RegisterWritten(address),
            TelemetryPayload::Register(RegisterTelemetry { address, value }),
            timestamp,
        )
    }

    /// Records a notification handed to the host.
    pub fn record_notification(
        &mut self,
        address: RegisterAddress,
        value: RegisterValue,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::Notified(address),
            TelemetryPayload::Register(RegisterTelemetry { address, value }),
            timestamp,
        )
    }

    /// Appends one record, evicting the oldest once the ring is full.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

const fn channel_code(id: ChannelId) -> u16 {
    id.as_index() as u16
}

fn channel_from_code(code: u16) -> Option<ChannelId> {
    ChannelId::from_index(usize::from(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
    struct MicrosInstant(u64);

    impl MicrosInstant {
        fn from_micros(value: u64) -> Self {
            Self(value)
        }
    }

    impl TelemetryInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            let micros = self.0.saturating_sub(earlier.0);
            Duration::from_micros(micros)
        }
    }

    #[test]
    fn event_codes_decode_to_the_same_event() {
        let fixtures = [
            (TelemetryEventKind::ChannelArmed(ChannelId::Bnc0), 0x0000),
            (TelemetryEventKind::ChannelStopped(ChannelId::SignalB), 0x0007),
            (TelemetryEventKind::ChannelCompleted(ChannelId::Bnc1), 0x0009),
            (TelemetryEventKind::ArmRejected(ChannelId::SignalA), 0x000E),
            (TelemetryEventKind::StandbyEntered, 0x0010),
            (
                TelemetryEventKind::RegisterWritten(RegisterAddress::LaserIntensity),
                0x0127,
            ),
            (TelemetryEventKind::Notified(RegisterAddress::BncsState), 0x022C),
        ];

        for (event, code) in fixtures {
            assert_eq!(event.to_raw(), code);
            assert_eq!(TelemetryEventKind::from_raw(code), event);
        }
    }

    #[test]
    fn unknown_codes_fall_back_to_custom() {
        assert_eq!(TelemetryEventKind::from_raw(0x0011), TelemetryEventKind::Custom(0x0011));
        // Register window starts at 0x20.
        assert_eq!(TelemetryEventKind::from_raw(0x0105), TelemetryEventKind::Custom(0x0105));
        assert_eq!(TelemetryEventKind::from_raw(0x0300), TelemetryEventKind::Custom(0x0300));
    }

    #[test]
    fn records_elapsed_between_channel_transitions() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        let descriptor = IntervalDescriptor::new(10, 5, 2, 0);

        let id1 = recorder.record_channel_transition(
            ChannelId::Bnc0,
            ChannelTransition::Armed,
            descriptor,
            MicrosInstant::from_micros(100),
        );
        assert_eq!(id1, 0);

        let first = recorder.latest().copied().unwrap();
        assert_eq!(first.event, TelemetryEventKind::ChannelArmed(ChannelId::Bnc0));
        match first.details {
            TelemetryPayload::Channel(details) => {
                assert_eq!(details.elapsed_since_previous, None);
                assert_eq!(details.descriptor, descriptor);
            }
            _ => panic!("expected channel payload"),
        }

        let id2 = recorder.record_channel_transition(
            ChannelId::Bnc0,
            ChannelTransition::Completed,
            descriptor,
            MicrosInstant::from_micros(30_100),
        );
        assert_eq!(id2, 1);

        let second = recorder.latest().copied().unwrap();
        match second.details {
            TelemetryPayload::Channel(details) => {
                let elapsed = details.elapsed_since_previous.expect("missing elapsed");
                assert_eq!(elapsed.as_micros(), 30_000);
            }
            _ => panic!("expected channel payload"),
        }
    }

    #[test]
    fn register_events_do_not_reset_transition_clock() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();
        recorder.record_channel_transition(
            ChannelId::SignalA,
            ChannelTransition::Armed,
            IntervalDescriptor::new(1, 1, 0, 0),
            MicrosInstant::from_micros(0),
        );
        recorder.record_register_write(
            RegisterAddress::LaserIntensity,
            RegisterValue::U8(7),
            MicrosInstant::from_micros(40),
        );
        recorder.record_channel_transition(
            ChannelId::SignalA,
            ChannelTransition::Stopped,
            IntervalDescriptor::new(1, 1, 0, 0),
            MicrosInstant::from_micros(90),
        );

        let events: heapless::Vec<TelemetryEventKind, 4> =
            recorder.oldest_first().map(|record| record.event).collect();
        assert_eq!(
            events.as_slice(),
            &[
                TelemetryEventKind::ChannelArmed(ChannelId::SignalA),
                TelemetryEventKind::RegisterWritten(RegisterAddress::LaserIntensity),
                TelemetryEventKind::ChannelStopped(ChannelId::SignalA),
            ]
        );
        match recorder.latest().map(|record| record.details) {
            Some(TelemetryPayload::Channel(details)) => {
                assert_eq!(details.elapsed_since_previous, Some(Duration::from_micros(90)));
            }
            _ => panic!("expected channel payload"),
        }
    }

    #[test]
    fn ring_keeps_most_recent_records() {
        let mut recorder = TelemetryRecorder::<MicrosInstant, 2>::new();
        for (index, address) in [
            RegisterAddress::BncsState,
            RegisterAddress::SignalState,
            RegisterAddress::SpadSwitch,
        ]
        .into_iter()
        .enumerate()
        {
            recorder.record_notification(
                address,
                RegisterValue::U8(0),
                MicrosInstant::from_micros(index as u64),
            );
        }

        assert_eq!(recorder.len(), 2);
        assert_eq!(recorder.oldest_first().next().map(|record| record.id), Some(1));
    }
}
