use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::class::cdc_acm::{ControlChanged, Receiver, Sender};
use embassy_usb::driver::{Driver, EndpointError};

use super::{REPL_RX_QUEUE, REPL_TX_QUEUE, USB_STORAGE};
use crate::repl::ReplFrame;
use crate::status;
use crate::usb::{self, CdcAcmHandle, UsbConsole, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);
    let UsbConsole { mut device, repl } = UsbConsole::new(driver, storage, UsbDeviceStrings::default());

    let mut link = ReplLink::new(repl);
    join(device.run(), link.serve()).await;
    loop {
        core::future::pending::<()>().await;
    }
}

/// Why a REPL session ended.
enum Detach {
    EndpointDisabled,
    DtrDropped,
}

/// Moves REPL frames between the CDC ACM endpoints and the REPL queues.
struct ReplLink<D: Driver<'static>> {
    sender: Sender<'static, D>,
    receiver: Receiver<'static, D>,
    control: ControlChanged<'static>,
    ingress: [u8; usb::MAX_PACKET_SIZE as usize],
    /// Frame being written; kept until the packet is accepted.
    outgoing: Option<ReplFrame>,
}

impl<D: Driver<'static>> ReplLink<D> {
    fn new(handle: CdcAcmHandle<D>) -> Self {
        Self {
            sender: handle.sender,
            receiver: handle.receiver,
            control: handle.control,
            ingress: [0; usb::MAX_PACKET_SIZE as usize],
            outgoing: None,
        }
    }

    async fn serve(&mut self) -> ! {
        loop {
            join(self.receiver.wait_connection(), self.sender.wait_connection()).await;
            while !self.sender.dtr() {
                self.control.control_changed().await;
            }

            // Output queued for a previous host is stale.
            self.outgoing = None;
            status::set_link_attached(true);
            defmt::info!("usb: host opened the REPL port");

            match self.pump().await {
                Detach::EndpointDisabled => defmt::warn!("usb: endpoint disabled"),
                Detach::DtrDropped => defmt::info!("usb: host closed the REPL port"),
            }
            status::set_link_attached(false);
        }
    }

    async fn pump(&mut self) -> Detach {
        let rx_queue = REPL_RX_QUEUE.sender();
        let tx_queue = REPL_TX_QUEUE.receiver();

        loop {
            let outgoing = &mut self.outgoing;
            let sender = &mut self.sender;
            let write = async {
                if outgoing.is_none() {
                    *outgoing = Some(tx_queue.receive().await);
                }
                let Some(frame) = outgoing.as_ref() else {
                    return Ok(());
                };
                sender.write_packet(frame).await?;
                *outgoing = None;
                Ok::<(), EndpointError>(())
            };

            match select3(self.receiver.read_packet(&mut self.ingress), write, self.control.control_changed()).await {
                Either3::First(Ok(0)) | Either3::Second(Ok(())) => {}
                Either3::First(Ok(count)) => {
                    let mut frame = ReplFrame::new();
                    if frame.extend_from_slice(&self.ingress[..count]).is_ok() {
                        rx_queue.send(frame).await;
                    } else {
                        defmt::warn!("usb: oversized REPL packet len={}", count);
                    }
                }
                Either3::First(Err(EndpointError::Disabled)) | Either3::Second(Err(EndpointError::Disabled)) => {
                    return Detach::EndpointDisabled;
                }
                Either3::First(Err(EndpointError::BufferOverflow)) => {
                    defmt::warn!("usb: REPL read overflow");
                }
                Either3::Second(Err(EndpointError::BufferOverflow)) => {
                    defmt::warn!("usb: REPL write overflow");
                }
                Either3::Third(()) => {
                    if !self.sender.dtr() {
                        return Detach::DtrDropped;
                    }
                }
            }
        }
    }
}
