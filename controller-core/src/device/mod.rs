//! Register-driven laser driver controller.
//!
//! [`LaserDriverController`] owns the register bank, the pulse-train engine,
//! and a [`Board`] implementation. Host register writes are dispatched to the
//! handler for each address; the tick and input callbacks keep the bank in
//! sync with hardware and queue value-change notifications for the host.

mod board;

use heapless::Deque;

use crate::channels::{CHANNEL_COUNT, ChannelGroup, ChannelId, ChannelMask};
use crate::control::{StateWordChange, apply_state_word, state_word};
use crate::engine::{ArmError, IntervalDescriptor, PulseTrainEngine};
use crate::laser::{DigitalOutput, FrequencySelect, OUTPUT_MASK};
use crate::registers::{
    EVENT_CHANNEL_STATE, EVENT_LASER_STATE, EVENT_SPAD_SWITCH, RegisterAddress, RegisterBank,
    RegisterError, RegisterMapError, RegisterType, RegisterValue, validate_register_map,
};

pub use board::{Board, InputLevels, NoopBoard};

/// Pending notifications kept before new ones are dropped.
pub const NOTIFICATION_QUEUE_DEPTH: usize = 16;

/// Unsolicited register value report for the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    pub address: RegisterAddress,
    pub value: RegisterValue,
}

/// Result of a register write.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WriteOutcome {
    pub address: RegisterAddress,
    /// `false` when the handler ignored the value (read-only register,
    /// disabled event gate, or unsupported selection).
    pub applied: bool,
    pub channels: StateWordChange,
}

impl WriteOutcome {
    const fn applied(address: RegisterAddress) -> Self {
        Self {
            address,
            applied: true,
            channels: StateWordChange::none(),
        }
    }

    const fn ignored(address: RegisterAddress) -> Self {
        Self {
            address,
            applied: false,
            channels: StateWordChange::none(),
        }
    }
}

/// Channels that ran out of pulses during one tick.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TickReport {
    pub completed: ChannelMask,
}

/// Input edges seen by one poll.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct InputReport {
    pub levels: InputLevels,
    pub laser_key_changed: bool,
    pub spad_switch_changed: bool,
}

/// Device state machine behind the register interface.
pub struct LaserDriverController<B: Board> {
    board: B,
    bank: RegisterBank,
    engine: PulseTrainEngine,
    last_inputs: InputLevels,
    notifications: Deque<Notification, NOTIFICATION_QUEUE_DEPTH>,
    dropped_notifications: u32,
}

impl<B: Board> LaserDriverController<B> {
    /// Validates the register map and brings the board to its reset state.
    ///
    /// # Errors
    ///
    /// Returns the register map problem when the const table is malformed.
    pub fn new(board: B) -> Result<Self, RegisterMapError> {
        validate_register_map()?;

        let mut controller = Self {
            board,
            bank: RegisterBank::new(),
            engine: PulseTrainEngine::new(),
            last_inputs: InputLevels::default(),
            notifications: Deque::new(),
            dropped_notifications: 0,
        };
        controller.reset_registers();
        Ok(controller)
    }

    /// Restores register defaults and the matching hardware state.
    ///
    /// `SPAD_SWITCH` and `LASER_STATE` are seeded from the live inputs, and the
    /// relay follows the switch.
    pub fn reset_registers(&mut self) {
        self.engine.stop_all(&mut self.board);
        self.board.deassert_all();
        self.bank.reset();

        let inputs = self.board.sample_inputs();
        self.bank
            .store_u8(RegisterAddress::SpadSwitch, u8::from(inputs.spad_switch));
        self.bank
            .store_u8(RegisterAddress::LaserState, u8::from(inputs.laser_key));
        self.last_inputs = inputs;

        self.board.set_spad_relay(inputs.spad_switch);
        self.board.set_frequency_lines(FrequencySelect::Off.lines());
        for output in DigitalOutput::ALL {
            self.board.set_digital_output(output, false);
        }
        self.board.write_digipot(0);
    }

    /// Reads a register by wire address.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError`] for unknown addresses or a mismatched type.
    pub fn read_register(&self, raw: u8, ty: RegisterType) -> Result<RegisterValue, RegisterError> {
        let address = RegisterBank::resolve(raw, ty)?;
        Ok(self.value_of(address))
    }

    /// Current value of `address`, with live registers derived from hardware.
    #[must_use]
    pub fn value_of(&self, address: RegisterAddress) -> RegisterValue {
        match address {
            RegisterAddress::OutputState => RegisterValue::U8(self.output_state()),
            RegisterAddress::BncsState | RegisterAddress::SignalState => {
                match ChannelGroup::from_state_register(address) {
                    Some(group) => RegisterValue::U8(state_word(&self.engine, group)),
                    None => self.bank.get(address),
                }
            }
            _ => self.bank.get(address),
        }
    }

    /// Writes a register by wire address and runs its handler.
    ///
    /// # Errors
    ///
    /// Returns [`RegisterError`] for unknown addresses or a mismatched type.
    /// The bank is untouched in that case.
    pub fn write_register(&mut self, raw: u8, value: RegisterValue) -> Result<WriteOutcome, RegisterError> {
        let address = RegisterBank::resolve(raw, value.ty())?;
        if !address.spec().access.is_writable() {
            return Ok(WriteOutcome::ignored(address));
        }
        let byte = low_byte(value);

        let outcome = match address {
            RegisterAddress::SpadSwitch => self.write_spad_switch(byte),
            RegisterAddress::LaserFrequencySelect => match FrequencySelect::from_register(byte) {
                Some(selection) => {
                    self.board.set_frequency_lines(selection.lines());
                    self.bank.store_u8(address, selection.to_register());
                    WriteOutcome::applied(address)
                }
                None => WriteOutcome::ignored(address),
            },
            RegisterAddress::LaserIntensity => {
                self.bank.store_u8(address, byte);
                self.board.write_digipot(byte);
                WriteOutcome::applied(address)
            }
            RegisterAddress::OutputSet
            | RegisterAddress::OutputClear
            | RegisterAddress::OutputToggle
            | RegisterAddress::OutputState => {
                self.write_outputs(address, byte);
                WriteOutcome::applied(address)
            }
            RegisterAddress::BncsState | RegisterAddress::SignalState => {
                match ChannelGroup::from_state_register(address) {
                    Some(group) => WriteOutcome {
                        channels: self.write_state_word(group, byte),
                        ..WriteOutcome::applied(address)
                    },
                    None => WriteOutcome::ignored(address),
                }
            }
            _ => {
                self.bank.set(address, value)?;
                WriteOutcome::applied(address)
            }
        };

        Ok(outcome)
    }

    fn write_spad_switch(&mut self, byte: u8) -> WriteOutcome {
        let address = RegisterAddress::SpadSwitch;
        if byte > 1 || !self.event_enabled(EVENT_SPAD_SWITCH) {
            return WriteOutcome::ignored(address);
        }

        self.board.set_spad_relay(byte == 1);
        self.store_and_notify(address, byte);
        WriteOutcome::applied(address)
    }

    fn write_outputs(&mut self, address: RegisterAddress, byte: u8) {
        let bits = byte & OUTPUT_MASK;
        for output in DigitalOutput::ALL {
            let selected = bits & output.bit() != 0;
            let current = self.board.digital_output(output);
            let next = match address {
                RegisterAddress::OutputSet => current || selected,
                RegisterAddress::OutputClear => current && !selected,
                RegisterAddress::OutputToggle => current ^ selected,
                _ => selected,
            };
            if next != current || address == RegisterAddress::OutputState {
                self.board.set_digital_output(output, next);
            }
        }

        if address != RegisterAddress::OutputState {
            self.bank.store_u8(address, byte);
        }
        self.bank
            .store_u8(RegisterAddress::OutputState, self.output_state());
    }

    fn write_state_word(&mut self, group: ChannelGroup, word: u8) -> StateWordChange {
        let bank = &self.bank;
        let change = apply_state_word(
            &mut self.engine,
            group,
            word,
            |id| bank.descriptor(id),
            &mut self.board,
        );
        self.sync_state_word(group);
        change
    }

    fn sync_state_word(&mut self, group: ChannelGroup) -> u8 {
        let word = state_word(&self.engine, group);
        self.bank.store_u8(group.state_register(), word);
        word
    }

    /// Advances the engine by one tick.
    ///
    /// Completed channels clear their state bit; the owning state register is
    /// reported when channel events are enabled.
    pub fn tick(&mut self) -> TickReport {
        let completed = self.engine.tick(&mut self.board);

        for group in ChannelGroup::ALL {
            if completed.touches(group) {
                let word = self.sync_state_word(group);
                if self.event_enabled(EVENT_CHANNEL_STATE) {
                    self.notify(group.state_register(), RegisterValue::U8(word));
                }
            }
        }

        TickReport { completed }
    }

    /// Samples the laser key and SPAD switch and handles edges.
    pub fn poll_inputs(&mut self) -> InputReport {
        let levels = self.board.sample_inputs();
        let report = InputReport {
            levels,
            laser_key_changed: levels.laser_key != self.last_inputs.laser_key,
            spad_switch_changed: levels.spad_switch != self.last_inputs.spad_switch,
        };
        self.last_inputs = levels;

        if report.spad_switch_changed && self.event_enabled(EVENT_SPAD_SWITCH) {
            self.board.set_spad_relay(levels.spad_switch);
            self.store_and_notify(RegisterAddress::SpadSwitch, u8::from(levels.spad_switch));
        }

        if report.laser_key_changed && self.event_enabled(EVENT_LASER_STATE) {
            self.store_and_notify(RegisterAddress::LaserState, u8::from(levels.laser_key));
        }

        report
    }

    /// Stops every channel, zeroes intensity, and opens the SPAD relay.
    ///
    /// The relay follows the same event gate as a host write of 0 to
    /// `SPAD_SWITCH`.
    ///
    /// Returns the channels that were running.
    pub fn enter_standby(&mut self) -> ChannelMask {
        let stopped = self.engine.stop_all(&mut self.board);
        self.board.deassert_all();
        for group in ChannelGroup::ALL {
            self.sync_state_word(group);
        }

        self.bank.store_u8(RegisterAddress::LaserIntensity, 0);
        self.board.write_digipot(0);
        self.write_spad_switch(0);

        stopped
    }

    /// Configures and arms one channel through its registers.
    ///
    /// Equivalent to writing the four parameter registers followed by the
    /// group state word with this channel's bit set. The sibling channel keeps
    /// running.
    ///
    /// # Errors
    ///
    /// Returns [`ArmError`] when the engine refuses the descriptor.
    pub fn start_channel(&mut self, id: ChannelId, descriptor: IntervalDescriptor) -> Result<(), ArmError> {
        self.bank.store_descriptor(id, descriptor);
        let result = self.engine.start_channel(id, descriptor, &mut self.board);
        self.sync_state_word(id.group());
        result
    }

    /// Stops one channel. Returns `false` when it was already idle.
    pub fn stop_channel(&mut self, id: ChannelId) -> bool {
        let stopped = self.engine.stop_channel(id, &mut self.board);
        self.sync_state_word(id.group());
        stopped
    }

    /// Stops every channel, returning those that were running.
    pub fn stop_all(&mut self) -> ChannelMask {
        let stopped = self.engine.stop_all(&mut self.board);
        for group in ChannelGroup::ALL {
            self.sync_state_word(group);
        }
        stopped
    }

    /// Pops the oldest pending notification.
    pub fn take_notification(&mut self) -> Option<Notification> {
        self.notifications.pop_front()
    }

    /// Drains every pending notification, oldest first.
    pub fn take_notifications(&mut self) -> impl Iterator<Item = Notification> + '_ {
        core::iter::from_fn(move || self.notifications.pop_front())
    }

    #[must_use]
    pub fn pending_notifications(&self) -> usize {
        self.notifications.len()
    }

    /// Notifications discarded because the queue was full.
    #[must_use]
    pub const fn dropped_notifications(&self) -> u32 {
        self.dropped_notifications
    }

    #[must_use]
    pub const fn bank(&self) -> &RegisterBank {
        &self.bank
    }

    #[must_use]
    pub const fn engine(&self) -> &PulseTrainEngine {
        &self.engine
    }

    /// Descriptors indexed by channel, only when `report` completed something.
    #[must_use]
    pub fn completed_descriptors(&self, report: TickReport) -> Option<[IntervalDescriptor; CHANNEL_COUNT]> {
        if report.completed.is_empty() {
            return None;
        }
        Some(ChannelId::ALL.map(|id| self.engine.descriptor(id)))
    }

    #[must_use]
    pub const fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    /// Current frequency selection.
    #[must_use]
    pub fn frequency(&self) -> FrequencySelect {
        FrequencySelect::from_register(self.bank.get_u8(RegisterAddress::LaserFrequencySelect))
            .unwrap_or_default()
    }

    /// Level of DO1/DO2 packed as in `OUTPUT_STATE`.
    #[must_use]
    pub fn output_state(&self) -> u8 {
        DigitalOutput::ALL
            .into_iter()
            .filter(|output| self.board.digital_output(*output))
            .fold(0, |bits, output| bits | output.bit())
    }

    fn event_enabled(&self, bit: u8) -> bool {
        self.bank.get_u8(RegisterAddress::EventEnable) & bit != 0
    }

    fn store_and_notify(&mut self, address: RegisterAddress, value: u8) {
        let previous = self.bank.get_u8(address);
        self.bank.store_u8(address, value);
        if previous != value {
            self.notify(address, RegisterValue::U8(value));
        }
    }

    fn notify(&mut self, address: RegisterAddress, value: RegisterValue) {
        if self
            .notifications
            .push_back(Notification { address, value })
            .is_err()
        {
            self.dropped_notifications = self.dropped_notifications.saturating_add(1);
        }
    }
}

fn low_byte(value: RegisterValue) -> u8 {
    value.as_u16().to_le_bytes()[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::DEFAULT_EVENT_ENABLE;

    fn controller() -> LaserDriverController<NoopBoard> {
        LaserDriverController::new(NoopBoard::new()).unwrap()
    }

    fn write_u8(controller: &mut LaserDriverController<NoopBoard>, address: RegisterAddress, value: u8) -> WriteOutcome {
        controller
            .write_register(address.raw(), RegisterValue::U8(value))
            .unwrap()
    }

    #[test]
    fn reset_seeds_inputs_and_defaults() {
        let mut board = NoopBoard::new();
        board.inputs = InputLevels {
            laser_key: true,
            spad_switch: true,
        };
        let controller = LaserDriverController::new(board).unwrap();

        assert_eq!(controller.bank().get_u8(RegisterAddress::SpadSwitch), 1);
        assert_eq!(controller.bank().get_u8(RegisterAddress::LaserState), 1);
        assert_eq!(
            controller.bank().get_u8(RegisterAddress::EventEnable),
            DEFAULT_EVENT_ENABLE
        );
        assert!(controller.board().relay_closed);
        assert_eq!(controller.board().digipot, Some(0));
    }

    #[test]
    fn type_mismatch_leaves_bank_untouched() {
        let mut controller = controller();
        let before = controller.bank().clone();

        let err = controller
            .write_register(RegisterAddress::Bnc0On.raw(), RegisterValue::U8(5))
            .unwrap_err();
        assert!(matches!(err, RegisterError::TypeMismatch { .. }));
        assert_eq!(controller.bank(), &before);
    }

    #[test]
    fn unsupported_frequency_is_ignored() {
        let mut controller = controller();
        assert!(write_u8(&mut controller, RegisterAddress::LaserFrequencySelect, 4).applied);
        assert!(!write_u8(&mut controller, RegisterAddress::LaserFrequencySelect, 3).applied);
        assert_eq!(controller.frequency(), FrequencySelect::F3);
        assert!(controller.board().frequency.f3);
    }

    #[test]
    fn output_registers_compose() {
        let mut controller = controller();
        write_u8(&mut controller, RegisterAddress::OutputSet, 0b01);
        write_u8(&mut controller, RegisterAddress::OutputToggle, 0b11);
        assert_eq!(controller.output_state(), 0b10);

        write_u8(&mut controller, RegisterAddress::OutputClear, 0b10);
        assert_eq!(
            controller.read_register(RegisterAddress::OutputState.raw(), RegisterType::U8),
            Ok(RegisterValue::U8(0))
        );

        write_u8(&mut controller, RegisterAddress::OutputState, 0xff);
        assert_eq!(controller.output_state(), OUTPUT_MASK);
    }

    #[test]
    fn spad_write_requires_event_gate() {
        let mut controller = controller();
        assert!(write_u8(&mut controller, RegisterAddress::SpadSwitch, 1).applied);
        assert!(controller.board().relay_closed);
        assert_eq!(
            controller.take_notification(),
            Some(Notification {
                address: RegisterAddress::SpadSwitch,
                value: RegisterValue::U8(1),
            })
        );

        write_u8(&mut controller, RegisterAddress::EventEnable, 0);
        assert!(!write_u8(&mut controller, RegisterAddress::SpadSwitch, 0).applied);
        assert!(controller.board().relay_closed);
        assert!(!write_u8(&mut controller, RegisterAddress::SpadSwitch, 2).applied);
    }

    #[test]
    fn laser_state_is_read_only() {
        let mut controller = controller();
        assert!(!write_u8(&mut controller, RegisterAddress::LaserState, 1).applied);
        assert_eq!(controller.bank().get_u8(RegisterAddress::LaserState), 0);

        controller.board_mut().inputs.laser_key = true;
        let _ = controller.poll_inputs();
        let pending = controller.pending_notifications();
        assert!(!write_u8(&mut controller, RegisterAddress::LaserState, 0).applied);
        assert_eq!(controller.bank().get_u8(RegisterAddress::LaserState), 1);
        assert_eq!(controller.pending_notifications(), pending);
    }

    #[test]
    fn input_edges_update_registers_and_notify() {
        let mut controller = controller();
        controller.board_mut().inputs.laser_key = true;

        let report = controller.poll_inputs();
        assert!(report.laser_key_changed);
        assert!(!report.spad_switch_changed);
        assert_eq!(controller.bank().get_u8(RegisterAddress::LaserState), 1);
        assert_eq!(controller.pending_notifications(), 1);

        let report = controller.poll_inputs();
        assert!(!report.laser_key_changed);
        assert_eq!(controller.pending_notifications(), 1);
    }

    #[test]
    fn signal_state_write_arms_signal_channels() {
        let mut controller = controller();
        controller
            .write_register(RegisterAddress::SignalAOn.raw(), RegisterValue::U16(2))
            .unwrap();
        controller
            .write_register(RegisterAddress::SignalAPulses.raw(), RegisterValue::U16(1))
            .unwrap();

        let outcome = write_u8(&mut controller, RegisterAddress::SignalState, 0b01);
        assert_eq!(outcome.channels.armed, ChannelMask::only(ChannelId::SignalA));
        assert_eq!(outcome.channels.rejected, ChannelMask::empty());
        assert!(controller.engine().is_active(ChannelId::SignalA));
    }

    #[test]
    fn completion_clears_state_bit_and_notifies() {
        let mut controller = controller();
        controller
            .start_channel(ChannelId::Bnc1, IntervalDescriptor::new(1, 1, 1, 0))
            .unwrap();
        assert_eq!(
            controller.read_register(RegisterAddress::BncsState.raw(), RegisterType::U8),
            Ok(RegisterValue::U8(0b10))
        );

        let report = controller.tick();
        assert_eq!(controller.completed_descriptors(report), None);
        let report = controller.tick();
        assert_eq!(report.completed, ChannelMask::only(ChannelId::Bnc1));
        let descriptors = controller.completed_descriptors(report).unwrap();
        assert_eq!(descriptors[ChannelId::Bnc1.as_index()], IntervalDescriptor::new(1, 1, 1, 0));
        assert_eq!(controller.bank().get_u8(RegisterAddress::BncsState), 0);
        assert_eq!(
            controller.take_notification(),
            Some(Notification {
                address: RegisterAddress::BncsState,
                value: RegisterValue::U8(0),
            })
        );
    }

    #[test]
    fn channel_events_can_be_disabled() {
        let mut controller = controller();
        write_u8(&mut controller, RegisterAddress::EventEnable, EVENT_SPAD_SWITCH);
        controller
            .start_channel(ChannelId::Bnc0, IntervalDescriptor::new(1, 0, 1, 0))
            .unwrap();
        controller.tick();
        assert_eq!(controller.pending_notifications(), 0);
    }

    #[test]
    fn standby_stops_everything() {
        let mut controller = controller();
        write_u8(&mut controller, RegisterAddress::LaserIntensity, 200);
        write_u8(&mut controller, RegisterAddress::SpadSwitch, 1);
        controller
            .start_channel(ChannelId::SignalB, IntervalDescriptor::new(3, 3, 0, 0))
            .unwrap();

        let stopped = controller.enter_standby();
        assert_eq!(stopped, ChannelMask::only(ChannelId::SignalB));
        assert_eq!(controller.bank().get_u8(RegisterAddress::LaserIntensity), 0);
        assert_eq!(controller.board().digipot, Some(0));
        assert!(!controller.board().relay_closed);
        assert_eq!(controller.bank().get_u8(RegisterAddress::SignalState), 0);
    }

    #[test]
    fn full_queue_drops_new_notifications() {
        let mut controller = controller();
        for _ in 0..=NOTIFICATION_QUEUE_DEPTH {
            controller.board_mut().inputs.laser_key ^= true;
            controller.poll_inputs();
        }

        assert_eq!(controller.pending_notifications(), NOTIFICATION_QUEUE_DEPTH);
        assert_eq!(controller.dropped_notifications(), 1);
        let first = controller.take_notifications().next();
        assert_eq!(
            first,
            Some(Notification {
                address: RegisterAddress::LaserState,
                value: RegisterValue::U8(1),
            })
        );
    }
}
