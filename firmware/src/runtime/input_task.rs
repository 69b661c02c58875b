use controller_core::timing::INPUT_POLL_PERIOD;
use embassy_time::{Duration, Ticker};

use super::{Device, NOTIFY};
use crate::status;

#[embassy_executor::task]
pub async fn run(device: &'static Device) -> ! {
    let period_us = u64::try_from(INPUT_POLL_PERIOD.as_micros()).unwrap_or(u64::MAX);
    let mut ticker = Ticker::every(Duration::from_micros(period_us));

    loop {
        ticker.next().await;

        let (report, pending) = device.lock(|cell| {
            let mut controller = cell.borrow_mut();
            let report = controller.poll_inputs();
            (report, controller.pending_notifications())
        });

        if report.laser_key_changed {
            status::record_input_edge();
            defmt::info!("input: laser key {}", if report.levels.laser_key { "on" } else { "off" });
        }
        if report.spad_switch_changed {
            status::record_input_edge();
            defmt::info!(
                "input: SPAD switch {}",
                if report.levels.spad_switch { "closed" } else { "open" }
            );
        }

        if pending > 0 {
            NOTIFY.signal(());
        }
    }
}
