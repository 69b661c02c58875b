use controller_core::telemetry::ChannelTransition;
use controller_core::timing::TickConfig;
use embassy_time::{Duration, Instant, Ticker};

use super::{Device, NOTIFY, TELEMETRY};
use crate::status;
use crate::telemetry::FirmwareInstant;

#[embassy_executor::task]
pub async fn run(device: &'static Device) -> ! {
    let period_us = u64::try_from(TickConfig::DEFAULT.period().as_micros()).unwrap_or(u64::MAX);
    let period = Duration::from_micros(period_us);
    let mut ticker = Ticker::every(period);
    let mut deadline = Instant::now() + period;

    defmt::info!("tick: period={}us", period_us);

    loop {
        ticker.next().await;
        let now = Instant::now();
        let late = now > deadline + period;
        deadline += period;

        let (report, descriptors, pending) = device.lock(|cell| {
            let mut controller = cell.borrow_mut();
            let report = controller.tick();
            let descriptors = controller.completed_descriptors(report);
            (report, descriptors, controller.pending_notifications())
        });

        status::record_tick(late);

        if let Some(descriptors) = descriptors {
            TELEMETRY.lock(|cell| {
                cell.borrow_mut().channel_transitions(
                    report.completed,
                    ChannelTransition::Completed,
                    |id| descriptors[id.as_index()],
                    FirmwareInstant::from(now),
                );
            });
        }

        if pending > 0 {
            NOTIFY.signal(());
        }
    }
}
