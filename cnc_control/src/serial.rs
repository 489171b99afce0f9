//! Serial link abstraction.
//!
//! The dispatcher only needs three non-blocking operations from the link.
//! [`MemorySerial`] backs tests and scripted simulation; [`ChannelSerial`]
//! backs the binary, fed by a reader thread so the loop never blocks on I/O.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use tracing::{debug, warn};

/// Byte-oriented, non-blocking serial link.
pub trait SerialLink {
    /// Whether at least one byte can be read without blocking.
    fn has_incoming_data(&mut self) -> bool;

    /// Read one byte if available. Never blocks.
    fn read_byte(&mut self) -> Option<u8>;

    /// Queue text for transmission.
    fn send_text(&mut self, text: &str);
}

// ─── In-Memory Link ─────────────────────────────────────────────────

/// Loopback link with an input byte queue and a captured output string.
#[derive(Debug, Default)]
pub struct MemorySerial {
    input: VecDeque<u8>,
    output: String,
}

impl MemorySerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append raw bytes to the input side.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Append one line plus `\n` to the input side.
    pub fn push_line(&mut self, line: &str) {
        self.push_bytes(line.as_bytes());
        self.input.push_back(b'\n');
    }

    /// Bytes not yet consumed by the reader.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Everything sent so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Drain and return everything sent so far.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl SerialLink for MemorySerial {
    fn has_incoming_data(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.input.pop_front()
    }

    fn send_text(&mut self, text: &str) {
        self.output.push_str(text);
    }
}

// ─── Channel-Backed Link ────────────────────────────────────────────

/// Link reading from an `mpsc` channel and writing to any `Write` sink.
pub struct ChannelSerial<W: Write> {
    rx: Receiver<u8>,
    peeked: Option<u8>,
    out: W,
    disconnected: bool,
}

impl<W: Write> ChannelSerial<W> {
    pub fn new(rx: Receiver<u8>, out: W) -> Self {
        Self {
            rx,
            peeked: None,
            out,
            disconnected: false,
        }
    }

    /// Whether the producing side has hung up and all bytes were read.
    pub fn is_disconnected(&self) -> bool {
        self.disconnected && self.peeked.is_none()
    }
}

impl ChannelSerial<std::io::Stdout> {
    /// Link over the process's stdin/stdout.
    ///
    /// Spawns a reader thread that forwards stdin byte by byte.
    pub fn stdio() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("serial-rx".into())
            .spawn(move || {
                let stdin = std::io::stdin();
                for byte in stdin.lock().bytes() {
                    match byte {
                        Ok(b) => {
                            if tx.send(b).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("stdin read failed: {e}");
                            break;
                        }
                    }
                }
                debug!("serial-rx: input closed");
            })?;
        Ok(Self::new(rx, std::io::stdout()))
    }
}

impl<W: Write> SerialLink for ChannelSerial<W> {
    fn has_incoming_data(&mut self) -> bool {
        if self.peeked.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(b) => {
                self.peeked = Some(b);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.disconnected = true;
                false
            }
        }
    }

    fn read_byte(&mut self) -> Option<u8> {
        if self.has_incoming_data() {
            self.peeked.take()
        } else {
            None
        }
    }

    fn send_text(&mut self, text: &str) {
        if let Err(e) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
        {
            warn!("serial write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_serial_fifo_and_capture() {
        let mut link = MemorySerial::new();
        assert!(!link.has_incoming_data());
        link.push_line("G1");
        assert_eq!(link.pending_input(), 3);
        assert_eq!(link.read_byte(), Some(b'G'));
        assert_eq!(link.read_byte(), Some(b'1'));
        assert_eq!(link.read_byte(), Some(b'\n'));
        assert_eq!(link.read_byte(), None);

        link.send_text("ok\r\n");
        assert_eq!(link.output(), "ok\r\n");
        assert_eq!(link.take_output(), "ok\r\n");
        assert!(link.output().is_empty());
    }

    #[test]
    fn channel_serial_reads_without_blocking() {
        let (tx, rx) = mpsc::channel();
        let mut link = ChannelSerial::new(rx, Vec::new());
        assert!(!link.has_incoming_data());
        tx.send(b'?').unwrap();
        assert!(link.has_incoming_data());
        assert!(link.has_incoming_data()); // peeked byte is kept
        assert_eq!(link.read_byte(), Some(b'?'));
        assert_eq!(link.read_byte(), None);

        drop(tx);
        assert!(!link.has_incoming_data());
        assert!(link.is_disconnected());

        link.send_text("ok\r\n");
        assert_eq!(link.out, b"ok\r\n");
    }
}
