use core::cell::RefCell;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use static_cell::StaticCell;

use crate::hw::{Digipot, FrequencyOutputs, HardwareBoard, PulseOutputs};
use crate::repl::commands::{SharedDevice, SharedTelemetry};
use crate::repl::{NotificationSignal, ReplQueue};
use crate::telemetry::TelemetryLog;
use crate::usb;
use controller_core::device::LaserDriverController;

mod input_task;
mod repl_task;
mod tick_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) type DeviceMutex = CriticalSectionRawMutex;
pub(super) type Device = SharedDevice<DeviceMutex, HardwareBoard<'static>>;

pub(super) static DEVICE: StaticCell<Device> = StaticCell::new();
pub(super) static TELEMETRY: SharedTelemetry<DeviceMutex> = Mutex::new(RefCell::new(TelemetryLog::new()));
pub(super) static NOTIFY: NotificationSignal<DeviceMutex> = Signal::new();
pub(super) static REPL_RX_QUEUE: ReplQueue = Channel::new();
pub(super) static REPL_TX_QUEUE: ReplQueue = Channel::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = hal::Config::default();
    let hal::Peripherals {
        PA0,
        PA1,
        PA6,
        PA7,
        PA8,
        PA9,
        PA11,
        PA12,
        PB2,
        PB3,
        PB4,
        PB5,
        PB6,
        PB7,
        PB12,
        PB13,
        PB15,
        USB,
        ..
    } = hal::init(config);

    let pulses = PulseOutputs::new(
        Output::new(PA0, Level::Low, Speed::VeryHigh),
        Output::new(PA1, Level::Low, Speed::VeryHigh),
        Output::new(PA6, Level::Low, Speed::VeryHigh),
        Output::new(PA7, Level::Low, Speed::VeryHigh),
    );
    let frequency = FrequencyOutputs {
        f1: Output::new(PB3, Level::Low, Speed::Low),
        f2: Output::new(PB4, Level::Low, Speed::Low),
        f3: Output::new(PB5, Level::Low, Speed::Low),
    };
    let digipot = Digipot::new(
        Output::new(PB12, Level::High, Speed::Medium),
        Output::new(PB13, Level::Low, Speed::Medium),
        Output::new(PB15, Level::Low, Speed::Medium),
    );
    let board = HardwareBoard::new(
        pulses,
        frequency,
        Output::new(PB6, Level::Low, Speed::Low),
        Output::new(PB7, Level::Low, Speed::Low),
        Output::new(PB2, Level::Low, Speed::Low),
        digipot,
        Input::new(PA8, Pull::Down),
        Input::new(PA9, Pull::Down),
    );

    let controller = match LaserDriverController::new(board) {
        Ok(controller) => controller,
        Err(error) => defmt::panic!("register map rejected: {}", defmt::Debug2Format(&error)),
    };
    let device: &'static Device = DEVICE.init(Mutex::new(RefCell::new(controller)));

    defmt::info!("laser driver controller ready");

    spawner
        .spawn(tick_task::run(device))
        .expect("failed to spawn tick task");

    spawner
        .spawn(input_task::run(device))
        .expect("failed to spawn input task");

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    spawner
        .spawn(repl_task::run(device))
        .expect("failed to spawn REPL task");

    core::future::pending::<()>().await;
}
