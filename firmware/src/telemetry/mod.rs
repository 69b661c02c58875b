//! Telemetry ring and logging helpers.
//!
//! Wraps the shared [`TelemetryRecorder`] with Embassy timestamps and mirrors
//! every record to defmt (or stdout on host builds) so channel activity can be
//! followed over RTT during bring-up.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use controller_core::channels::{ChannelId, ChannelMask, channel_by_id};
use controller_core::device::Notification;
use controller_core::engine::IntervalDescriptor;
use controller_core::registers::{RegisterAddress, RegisterValue};
use controller_core::telemetry::{
    ChannelTransition, EventId, TelemetryEventKind, TelemetryInstant, TelemetryPayload,
    TelemetryRecorder,
};
use embassy_time::Instant;

/// Embassy instant usable as a telemetry timestamp.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    #[must_use]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    #[must_use]
    pub const fn into_embassy(self) -> Instant {
        self.0
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> core::time::Duration {
        let delta = self.0.saturating_duration_since(earlier.0);
        core::time::Duration::from_micros(delta.as_micros())
    }
}

/// Telemetry log for the firmware target.
pub struct TelemetryLog {
    recorder: TelemetryRecorder<FirmwareInstant>,
}

impl TelemetryLog {
    pub const fn new() -> Self {
        Self {
            recorder: TelemetryRecorder::new(),
        }
    }

    pub fn recorder(&self) -> &TelemetryRecorder<FirmwareInstant> {
        &self.recorder
    }

    /// Records a channel transition and logs it with the time since the
    /// previous transition.
    pub fn channel_transition(
        &mut self,
        channel: ChannelId,
        transition: ChannelTransition,
        descriptor: IntervalDescriptor,
        timestamp: FirmwareInstant,
    ) -> EventId {
        let id = self
            .recorder
            .record_channel_transition(channel, transition, descriptor, timestamp);

        let delta_us = match self.recorder.latest().map(|record| record.details) {
            Some(TelemetryPayload::Channel(details)) => details
                .elapsed_since_previous
                .map(|elapsed| u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)),
            _ => None,
        };
        emit_channel_log(
            channel_by_id(channel).name,
            transition_label(transition),
            timestamp.into_embassy().as_micros(),
            delta_us,
        );
        id
    }

    /// Records one transition per channel in `channels`.
    pub fn channel_transitions(
        &mut self,
        channels: ChannelMask,
        transition: ChannelTransition,
        descriptor_for: impl Fn(ChannelId) -> IntervalDescriptor,
        timestamp: FirmwareInstant,
    ) {
        for channel in channels.iter() {
            self.channel_transition(channel, transition, descriptor_for(channel), timestamp);
        }
    }

    pub fn register_write(
        &mut self,
        address: RegisterAddress,
        value: RegisterValue,
        timestamp: FirmwareInstant,
    ) -> EventId {
        emit_register_log("write", address.spec().name, value.as_u16());
        self.recorder.record_register_write(address, value, timestamp)
    }

    pub fn notification(&mut self, notification: Notification, timestamp: FirmwareInstant) -> EventId {
        emit_register_log("notify", notification.address.spec().name, notification.value.as_u16());
        self.recorder
            .record_notification(notification.address, notification.value, timestamp)
    }

    pub fn standby(&mut self, timestamp: FirmwareInstant) -> EventId {
        emit_register_log("standby", "all", 0);
        self.recorder.record(
            TelemetryEventKind::StandbyEntered,
            TelemetryPayload::none(),
            timestamp,
        )
    }
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::new()
    }
}

const fn transition_label(transition: ChannelTransition) -> &'static str {
    match transition {
        ChannelTransition::Armed => "armed",
        ChannelTransition::Stopped => "stopped",
        ChannelTransition::Completed => "completed",
        ChannelTransition::Rejected => "rejected",
    }
}

#[cfg(target_os = "none")]
fn emit_channel_log(channel: &'static str, transition: &'static str, timestamp_us: u64, delta_us: Option<u64>) {
    if let Some(delta) = delta_us {
        defmt::info!(
            "telemetry:channel {} {} t={}us Δ={}us",
            channel,
            transition,
            timestamp_us,
            delta
        );
    } else {
        defmt::info!("telemetry:channel {} {} t={}us", channel, transition, timestamp_us);
    }
}

#[cfg(not(target_os = "none"))]
fn emit_channel_log(channel: &'static str, transition: &'static str, timestamp_us: u64, delta_us: Option<u64>) {
    if let Some(delta) = delta_us {
        println!("telemetry:channel {channel} {transition} t={timestamp_us}us Δ={delta}us");
    } else {
        println!("telemetry:channel {channel} {transition} t={timestamp_us}us");
    }
}

#[cfg(target_os = "none")]
fn emit_register_log(action: &'static str, register: &'static str, value: u16) {
    defmt::debug!("telemetry:register {} {}={}", action, register, value);
}

#[cfg(not(target_os = "none"))]
fn emit_register_log(action: &'static str, register: &'static str, value: u16) {
    println!("telemetry:register {action} {register}={value}");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_micros(value))
    }

    #[test]
    fn channel_transitions_carry_elapsed_time() {
        let mut log = TelemetryLog::new();
        let descriptor = IntervalDescriptor::new(5, 5, 2, 0);

        let first = log.channel_transition(ChannelId::Bnc0, ChannelTransition::Armed, descriptor, micros(100));
        assert_eq!(first, 0);
        let second =
            log.channel_transition(ChannelId::Bnc0, ChannelTransition::Completed, descriptor, micros(20_100));
        assert_eq!(second, 1);

        let latest = log.recorder().latest().copied().unwrap();
        assert_eq!(latest.event, TelemetryEventKind::ChannelCompleted(ChannelId::Bnc0));
        match latest.details {
            TelemetryPayload::Channel(details) => {
                let elapsed = details.elapsed_since_previous.unwrap();
                assert_eq!(elapsed.as_micros(), 20_000);
            }
            _ => panic!("expected channel payload"),
        }
    }

    #[test]
    fn masks_expand_to_one_record_per_channel() {
        let mut log = TelemetryLog::new();
        let mask: ChannelMask = [ChannelId::Bnc1, ChannelId::SignalB].into_iter().collect();

        log.channel_transitions(
            mask,
            ChannelTransition::Stopped,
            |_| IntervalDescriptor::default(),
            micros(0),
        );

        let events: Vec<_> = log.recorder().oldest_first().map(|record| record.event).collect();
        assert_eq!(
            events,
            [
                TelemetryEventKind::ChannelStopped(ChannelId::Bnc1),
                TelemetryEventKind::ChannelStopped(ChannelId::SignalB),
            ]
        );
    }

    #[test]
    fn notifications_and_standby_are_recorded() {
        let mut log = TelemetryLog::new();
        log.notification(
            Notification {
                address: RegisterAddress::SpadSwitch,
                value: RegisterValue::U8(1),
            },
            micros(5),
        );
        log.standby(micros(6));

        assert_eq!(log.recorder().len(), 2);
        assert_eq!(
            log.recorder().latest().map(|record| record.event),
            Some(TelemetryEventKind::StandbyEntered)
        );
    }
}
