//! Controller access for the operator REPL.
//!
//! [`SharedController`] implements the core [`RegisterAccess`] seam on top of
//! the blocking mutex shared with the tick and input tasks, and mirrors every
//! effective change into the telemetry log.

use core::cell::RefCell;

use controller_core::channels::{ChannelId, ChannelMask};
use controller_core::device::{Board, LaserDriverController, Notification, WriteOutcome};
use controller_core::engine::{ArmError, IntervalDescriptor};
use controller_core::registers::{RegisterAddress, RegisterError, RegisterValue};
use controller_core::repl::commands::RegisterAccess;
use controller_core::repl::grammar::StopTarget;
use controller_core::repl::status::StatusSnapshot;
use controller_core::telemetry::ChannelTransition;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_time::Instant;

use crate::telemetry::{FirmwareInstant, TelemetryLog};

/// Controller guarded by a blocking mutex.
pub type SharedDevice<M, B> = Mutex<M, RefCell<LaserDriverController<B>>>;

/// Telemetry log guarded by a blocking mutex.
pub type SharedTelemetry<M> = Mutex<M, RefCell<TelemetryLog>>;

/// REPL-side handle to the shared controller.
pub struct SharedController<'a, M, B, C = fn() -> Instant>
where
    M: RawMutex,
    B: Board,
    C: Fn() -> Instant,
{
    device: &'a SharedDevice<M, B>,
    telemetry: &'a SharedTelemetry<M>,
    clock: C,
}

#[cfg(target_os = "none")]
impl<'a, M, B> SharedController<'a, M, B>
where
    M: RawMutex,
    B: Board,
{
    /// Creates a handle using [`Instant::now`] for telemetry timestamps.
    pub fn new(device: &'a SharedDevice<M, B>, telemetry: &'a SharedTelemetry<M>) -> Self {
        Self::with_clock(device, telemetry, Instant::now)
    }
}

impl<'a, M, B, C> SharedController<'a, M, B, C>
where
    M: RawMutex,
    B: Board,
    C: Fn() -> Instant,
{
    /// Creates a handle with a custom clock (primarily used for tests).
    pub fn with_clock(device: &'a SharedDevice<M, B>, telemetry: &'a SharedTelemetry<M>, clock: C) -> Self {
        Self {
            device,
            telemetry,
            clock,
        }
    }

    fn now(&self) -> FirmwareInstant {
        FirmwareInstant::from((self.clock)())
    }

    fn with_device<R>(&self, f: impl FnOnce(&mut LaserDriverController<B>) -> R) -> R {
        self.device.lock(|cell| f(&mut cell.borrow_mut()))
    }

    fn with_telemetry(&self, f: impl FnOnce(&mut TelemetryLog)) {
        self.telemetry.lock(|cell| f(&mut cell.borrow_mut()));
    }

    /// Hands every queued notification to `sink`, logging each one.
    pub fn drain_notifications(&mut self, mut sink: impl FnMut(Notification)) {
        let now = self.now();
        while let Some(notification) = self.with_device(LaserDriverController::take_notification) {
            self.with_telemetry(|log| {
                log.notification(notification, now);
            });
            sink(notification);
        }
    }

    fn log_transitions(&self, channels: ChannelMask, transition: ChannelTransition) {
        if channels.is_empty() {
            return;
        }

        let now = self.now();
        let descriptors = self.with_device(|device| ChannelId::ALL.map(|id| device.engine().descriptor(id)));
        self.with_telemetry(|log| {
            log.channel_transitions(channels, transition, |id| descriptors[id.as_index()], now);
        });
    }
}

impl<M, B, C> RegisterAccess for SharedController<'_, M, B, C>
where
    M: RawMutex,
    B: Board,
    C: Fn() -> Instant,
{
    fn read(&mut self, raw: u8) -> Result<(RegisterAddress, RegisterValue), RegisterError> {
        self.with_device(|device| device.read(raw))
    }

    fn write(&mut self, raw: u8, value: RegisterValue) -> Result<WriteOutcome, RegisterError> {
        let outcome = self.with_device(|device| device.write_register(raw, value))?;

        if outcome.applied {
            let now = self.now();
            self.with_telemetry(|log| {
                log.register_write(outcome.address, value, now);
            });
            self.log_transitions(outcome.channels.armed, ChannelTransition::Armed);
            self.log_transitions(outcome.channels.stopped, ChannelTransition::Stopped);
            self.log_transitions(outcome.channels.rejected, ChannelTransition::Rejected);
        }

        Ok(outcome)
    }

    fn descriptor(&mut self, channel: ChannelId) -> IntervalDescriptor {
        self.with_device(|device| device.bank().descriptor(channel))
    }

    fn start(&mut self, channel: ChannelId, descriptor: IntervalDescriptor) -> Result<(), ArmError> {
        let result = self.with_device(|device| device.start_channel(channel, descriptor));

        let transition = match result {
            Ok(()) => ChannelTransition::Armed,
            Err(_) => ChannelTransition::Rejected,
        };
        let now = self.now();
        self.with_telemetry(|log| {
            log.channel_transition(channel, transition, descriptor, now);
        });

        result
    }

    fn stop(&mut self, target: StopTarget) -> ChannelMask {
        let stopped = self.with_device(|device| RegisterAccess::stop(device, target));
        self.log_transitions(stopped, ChannelTransition::Stopped);
        stopped
    }

    fn standby(&mut self) -> ChannelMask {
        let stopped = self.with_device(LaserDriverController::enter_standby);

        let now = self.now();
        self.with_telemetry(|log| {
            log.standby(now);
        });
        self.log_transitions(stopped, ChannelTransition::Stopped);
        stopped
    }

    fn reset(&mut self) {
        self.with_device(LaserDriverController::reset_registers);
    }

    fn snapshot(&mut self) -> StatusSnapshot {
        self.with_device(|device| StatusSnapshot::capture(device))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use controller_core::device::NoopBoard;
    use controller_core::repl::commands::{CommandExecutor, CommandOutcome};
    use controller_core::telemetry::TelemetryEventKind;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    fn fixtures() -> (SharedDevice<NoopRawMutex, NoopBoard>, SharedTelemetry<NoopRawMutex>) {
        let controller = LaserDriverController::new(NoopBoard::new()).unwrap();
        (
            Mutex::new(RefCell::new(controller)),
            Mutex::new(RefCell::new(TelemetryLog::new())),
        )
    }

    fn events(telemetry: &SharedTelemetry<NoopRawMutex>) -> Vec<TelemetryEventKind> {
        telemetry.lock(|cell| {
            cell.borrow()
                .recorder()
                .oldest_first()
                .map(|record| record.event)
                .collect()
        })
    }

    #[test]
    fn start_and_stop_reach_the_shared_controller() {
        let (device, telemetry) = fixtures();
        let shared = SharedController::with_clock(&device, &telemetry, || Instant::from_micros(10));
        let mut executor = CommandExecutor::new(shared);

        executor.execute("start bnc0 on=4 off=4").unwrap();
        assert!(device.lock(|cell| cell.borrow().engine().is_active(ChannelId::Bnc0)));

        let outcome = executor.execute("stop all").unwrap();
        assert_eq!(outcome, CommandOutcome::Stopped(ChannelMask::only(ChannelId::Bnc0)));
        assert_eq!(
            events(&telemetry),
            vec![
                TelemetryEventKind::ChannelArmed(ChannelId::Bnc0),
                TelemetryEventKind::ChannelStopped(ChannelId::Bnc0),
            ]
        );
    }

    #[test]
    fn rejected_start_is_logged() {
        let (device, telemetry) = fixtures();
        let shared = SharedController::with_clock(&device, &telemetry, || Instant::from_micros(0));
        let mut executor = CommandExecutor::new(shared);

        assert!(executor.execute("start signal-a off=3").is_err());
        assert_eq!(
            events(&telemetry),
            vec![TelemetryEventKind::ArmRejected(ChannelId::SignalA)]
        );
    }

    #[test]
    fn state_word_writes_log_register_and_channels() {
        let (device, telemetry) = fixtures();
        let shared = SharedController::with_clock(&device, &telemetry, || Instant::from_micros(0));
        let mut executor = CommandExecutor::new(shared);

        executor.execute("write signal-b-on 2").unwrap();
        executor.execute("write signal-state 2").unwrap();

        assert_eq!(
            events(&telemetry),
            vec![
                TelemetryEventKind::RegisterWritten(RegisterAddress::SignalBOn),
                TelemetryEventKind::RegisterWritten(RegisterAddress::SignalState),
                TelemetryEventKind::ChannelArmed(ChannelId::SignalB),
            ]
        );
    }

    #[test]
    fn notifications_are_drained_in_order() {
        let (device, telemetry) = fixtures();
        device.lock(|cell| cell.borrow_mut().board_mut().inputs.spad_switch = true);
        device.lock(|cell| {
            cell.borrow_mut().poll_inputs();
        });

        let mut shared = SharedController::with_clock(&device, &telemetry, || Instant::from_micros(0));
        let mut seen = Vec::new();
        shared.drain_notifications(|notification| seen.push(notification));

        assert_eq!(
            seen,
            vec![Notification {
                address: RegisterAddress::SpadSwitch,
                value: RegisterValue::U8(1),
            }]
        );
        assert_eq!(
            events(&telemetry),
            vec![TelemetryEventKind::Notified(RegisterAddress::SpadSwitch)]
        );
    }
}
