//! Operator REPL session on the USB CDC ACM interface.
//!
//! Bytes received from the host are assembled into lines, executed against the
//! shared controller, and the rendered response is queued back to the USB task
//! in packet-sized frames. Register notifications are interleaved between
//! responses as `! <register> = <value>` lines.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

pub mod commands;

use core::fmt::Write as _;
use core::str;

use controller_core::device::{Board, Notification};
use controller_core::repl::commands::{CommandExecutor, CommandOutcome, render_outcome};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use embassy_sync::signal::Signal;
use heapless::{String, Vec};

use self::commands::SharedController;
use crate::status;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;

#[cfg(target_os = "none")]
type ReplMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type ReplMutex = NoopRawMutex;

/// Maximum number of bytes accepted on a single REPL line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;

/// Payload size of a REPL frame, one USB packet.
pub const REPL_FRAME_SIZE: usize = 64;

/// Depth for each REPL frame queue.
pub const REPL_QUEUE_DEPTH: usize = 8;

/// Largest response rendered for one command.
pub const RESPONSE_CAPACITY: usize = 2048;

pub type ReplFrame = Vec<u8, REPL_FRAME_SIZE>;
pub type ReplQueue = Channel<ReplMutex, ReplFrame, REPL_QUEUE_DEPTH>;
pub type ReplSender<'a> = Sender<'a, ReplMutex, ReplFrame, REPL_QUEUE_DEPTH>;
pub type ReplReceiver<'a> = Receiver<'a, ReplMutex, ReplFrame, REPL_QUEUE_DEPTH>;
pub type Response = String<RESPONSE_CAPACITY>;

/// Raised by the tick and input tasks when notifications are queued.
pub type NotificationSignal<M> = Signal<M, ()>;

const PROMPT: &str = "> ";

/// Errors surfaced while assembling a line.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplError {
    /// Input exceeded [`MAX_LINE_LEN`]; the partial line was discarded.
    LineOverflow,
    /// The assembled line was not UTF-8.
    InvalidUtf8,
}

/// Result of feeding one byte into the assembler.
#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Pending,
    /// A terminator arrived after a non-empty line; read it with [`LineAssembler::line`].
    Complete,
    /// A terminator arrived on an empty line.
    Empty,
}

/// Collects bytes until `\r` or `\n`.
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    overflowed: bool,
}

impl LineAssembler {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            overflowed: false,
        }
    }

    /// Feeds a single byte. Backspace and DEL drop the previous byte.
    ///
    /// An overlong line is reported once its terminator arrives.
    pub fn push(&mut self, byte: u8) -> Result<LineEvent, ReplError> {
        match byte {
            b'\r' | b'\n' => {
                if self.overflowed {
                    self.clear();
                    return Err(ReplError::LineOverflow);
                }
                if self.buffer.is_empty() {
                    Ok(LineEvent::Empty)
                } else {
                    Ok(LineEvent::Complete)
                }
            }
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(LineEvent::Pending)
            }
            value => {
                if self.buffer.push(value).is_err() {
                    self.overflowed = true;
                }
                Ok(LineEvent::Pending)
            }
        }
    }

    /// The completed line. Call [`LineAssembler::clear`] once it is consumed.
    pub fn line(&self) -> Result<&str, ReplError> {
        str::from_utf8(&self.buffer).map_err(|_| ReplError::InvalidUtf8)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.overflowed = false;
    }
}

impl Default for LineAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Executes `line` and renders the reply into `response`.
pub fn respond<M, B, C>(
    executor: &mut CommandExecutor<SharedController<'_, M, B, C>>,
    line: &str,
    response: &mut Response,
) where
    M: RawMutex,
    B: Board,
    C: Fn() -> embassy_time::Instant,
{
    let rendered = match executor.execute(line) {
        Ok(outcome) => {
            let result = render_outcome(response, &outcome);
            if matches!(outcome, CommandOutcome::Status(_)) {
                result.and_then(|()| {
                    status::snapshot().write_line(response)?;
                    response.write_char('\n')
                })
            } else {
                result
            }
        }
        Err(error) => writeln!(response, "error: {error}"),
    };

    if rendered.is_err() {
        response.clear();
        // Always fits: the buffer was just cleared.
        let _ = response.write_str("error: response too long\n");
    }
}

/// Appends one notification line.
pub fn write_notification(response: &mut Response, notification: Notification) -> core::fmt::Result {
    writeln!(response, "! {} = {}", notification.address, notification.value)
}

/// Splits `text` into frames of at most [`REPL_FRAME_SIZE`] bytes.
pub fn frames(text: &str) -> impl Iterator<Item = ReplFrame> + '_ {
    text.as_bytes().chunks(REPL_FRAME_SIZE).map(|chunk| {
        let mut frame = ReplFrame::new();
        // Chunks never exceed the frame capacity.
        let _ = frame.extend_from_slice(chunk);
        frame
    })
}

/// Runs the REPL loop, feeding frames from `rx` and replying on `tx`.
#[cfg(target_os = "none")]
pub async fn run<M, B>(
    mut executor: CommandExecutor<SharedController<'static, M, B>>,
    rx: ReplReceiver<'static>,
    tx: ReplSender<'static>,
    notify: &'static NotificationSignal<M>,
) -> !
where
    M: RawMutex + 'static,
    B: Board + 'static,
{
    use embassy_futures::select::{Either, select};

    let mut assembler = LineAssembler::new();
    let mut response = Response::new();

    loop {
        response.clear();
        match select(rx.receive(), notify.wait()).await {
            Either::First(frame) => {
                for byte in frame {
                    match assembler.push(byte) {
                        Ok(LineEvent::Pending) => continue,
                        Ok(LineEvent::Empty) => {}
                        Ok(LineEvent::Complete) => {
                            match assembler.line() {
                                Ok(line) => respond(&mut executor, line, &mut response),
                                Err(error) => {
                                    defmt::warn!("repl: {}", defmt::Debug2Format(&error));
                                    let _ = response.write_str("error: invalid UTF-8\n");
                                }
                            }
                            assembler.clear();
                        }
                        Err(ReplError::LineOverflow) => {
                            defmt::warn!("repl: line exceeded {} bytes", MAX_LINE_LEN);
                            let _ = response.write_str("error: line too long\n");
                        }
                        Err(error) => {
                            defmt::warn!("repl: {}", defmt::Debug2Format(&error));
                        }
                    }
                    drain_notifications(&mut executor, &mut response);
                    let _ = response.write_str(PROMPT);
                }
            }
            Either::Second(()) => drain_notifications(&mut executor, &mut response),
        }

        for frame in frames(&response) {
            tx.send(frame).await;
        }
    }
}

#[cfg(target_os = "none")]
fn drain_notifications<M, B>(
    executor: &mut CommandExecutor<SharedController<'static, M, B>>,
    response: &mut Response,
) where
    M: RawMutex + 'static,
    B: Board + 'static,
{
    executor.controller_mut().drain_notifications(|notification| {
        if write_notification(response, notification).is_err() {
            defmt::warn!("repl: notification dropped, response buffer full");
        }
    });
}
