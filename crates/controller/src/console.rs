//! Operator console over stdin/stdout. A reader thread turns raw input into
//! bounded lines; the console activity pulls them with a timeout.
//!
//! Reads happen on a plain OS thread rather than the runtime's blocking
//! pool: a read parked on an idle terminal cannot be interrupted, and the
//! runtime would otherwise wait for it on shutdown.

use std::io::{BufRead, BufReader, Write};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::gateway::ConsoleChannel;

/// Longest command line kept; extra bytes on a line are dropped.
pub const MAX_LINE_LEN: usize = 31;

/// Lines buffered between the reader thread and the console activity.
const LINE_QUEUE: usize = 8;

/// Clip a raw input line to [`MAX_LINE_LEN`] bytes and strip the line
/// terminator.
pub(crate) fn bound_line(raw: &[u8]) -> String {
    let trimmed = match raw.iter().position(|&b| b == b'\r' || b == b'\n') {
        Some(end) => &raw[..end],
        None => raw,
    };
    let clipped = &trimmed[..trimmed.len().min(MAX_LINE_LEN)];
    String::from_utf8_lossy(clipped).into_owned()
}

pub struct LineConsole {
    lines: mpsc::Receiver<String>,
    closed: bool,
}

impl LineConsole {
    /// Console reading from the process's stdin.
    pub fn stdin() -> Self {
        Self::spawn_reader(BufReader::new(std::io::stdin()))
    }

    /// Console reading from any blocking byte source on a detached reader
    /// thread. The thread exits on end of input, on a read error, or once
    /// the console is dropped and its next line cannot be delivered.
    pub fn spawn_reader<R>(mut input: R) -> Self
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(LINE_QUEUE);
        let spawned = thread::Builder::new()
            .name("console-reader".into())
            .spawn(move || {
                let mut buf = Vec::with_capacity(MAX_LINE_LEN + 1);
                loop {
                    buf.clear();
                    match input.read_until(b'\n', &mut buf) {
                        Ok(0) => {
                            debug!("console input closed");
                            break;
                        }
                        Ok(_) => {
                            if tx.blocking_send(bound_line(&buf)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("console read failed: {e}");
                            break;
                        }
                    }
                }
            });
        // Without a reader the sender is dropped and the console reads as
        // closed, which the console activity already tolerates.
        if let Err(e) = spawned {
            warn!("console reader thread not started: {e}");
        }
        Self {
            lines: rx,
            closed: false,
        }
    }
}

impl ConsoleChannel for LineConsole {
    async fn read_line(&mut self, wait: Duration) -> Option<String> {
        // Once input is gone, keep the caller's poll cadence instead of
        // returning immediately forever.
        if self.closed {
            sleep(wait).await;
            return None;
        }
        match timeout(wait, self.lines.recv()).await {
            Ok(Some(line)) => Some(line),
            Ok(None) => {
                self.closed = true;
                None
            }
            Err(_) => None,
        }
    }

    fn write_line(&mut self, line: &str) {
        let mut out = std::io::stdout().lock();
        // Console output is best-effort.
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}

// ===========================================================================
// Tests
// ===========================================================================
