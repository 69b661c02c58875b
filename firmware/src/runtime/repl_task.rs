use super::{Device, NOTIFY, REPL_RX_QUEUE, REPL_TX_QUEUE, TELEMETRY};
use crate::repl;
use crate::repl::commands::SharedController;
use controller_core::repl::commands::CommandExecutor;

#[embassy_executor::task]
pub async fn run(device: &'static Device) -> ! {
    let executor = CommandExecutor::new(SharedController::new(device, &TELEMETRY));
    repl::run(executor, REPL_RX_QUEUE.receiver(), REPL_TX_QUEUE.sender(), &NOTIFY).await
}
