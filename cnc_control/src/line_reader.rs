//! Command line reader.
//!
//! Accumulates serial bytes into a fixed-capacity line buffer. A realtime
//! byte arriving as the first byte of a not-yet-started line is returned
//! immediately and never buffered. Lines longer than `N - 1` bytes are
//! discarded up to their terminator and reported once as an overflow.
//!
//! Work per call is bounded: at most `N` bytes are consumed, leftover input
//! stays in the link for the next loop iteration.

use cnc_common::consts::LINE_BUFFER_CAPACITY;
use cnc_common::protocol::RealtimeCommand;
use heapless::Vec;

use crate::serial::SerialLink;

/// One completed line, terminator stripped.
pub type CommandLine<const N: usize = LINE_BUFFER_CAPACITY> = Vec<u8, N>;

/// Result of one [`LineReader::poll`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent<const N: usize = LINE_BUFFER_CAPACITY> {
    /// No complete unit yet.
    Pending,
    /// Realtime byte received at the start of a line.
    Realtime(RealtimeCommand),
    /// Complete line (may be empty).
    Line(CommandLine<N>),
    /// A line exceeded the buffer and was discarded.
    Overflow,
}

/// Fixed-capacity line accumulator.
#[derive(Debug, Default)]
pub struct LineReader<const N: usize = LINE_BUFFER_CAPACITY> {
    buf: Vec<u8, N>,
    discarding: bool,
}

impl<const N: usize> LineReader<N> {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            discarding: false,
        }
    }

    /// Maximum content bytes of one line.
    #[inline]
    pub const fn max_line_len() -> usize {
        N.saturating_sub(1)
    }

    /// Bytes buffered for the line in progress.
    #[inline]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Whether a line has started (bytes buffered or overflow discard active).
    #[inline]
    pub fn line_started(&self) -> bool {
        !self.buf.is_empty() || self.discarding
    }

    /// Drop any partial line and leave discard mode.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }

    /// Consume available bytes until one unit completes or the budget runs out.
    pub fn poll<S: SerialLink + ?Sized>(&mut self, link: &mut S) -> LineEvent<N> {
        let mut budget = N;
        while budget > 0 && link.has_incoming_data() {
            let Some(byte) = link.read_byte() else {
                break;
            };
            budget -= 1;

            match byte {
                b'\n' => {
                    if self.discarding {
                        self.reset();
                        return LineEvent::Overflow;
                    }
                    return LineEvent::Line(core::mem::take(&mut self.buf));
                }
                b'\r' => continue,
                _ => {}
            }

            if !self.line_started() {
                if let Some(cmd) = RealtimeCommand::from_byte(byte) {
                    return LineEvent::Realtime(cmd);
                }
            }

            if self.discarding {
                continue;
            }

            if self.buf.len() >= Self::max_line_len() {
                self.buf.clear();
                self.discarding = true;
                continue;
            }

            // Cannot fail: len < N - 1 was checked above.
            let _ = self.buf.push(byte);
        }
        LineEvent::Pending
    }
}
