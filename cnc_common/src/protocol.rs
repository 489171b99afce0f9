//! Streaming protocol vocabulary.
//!
//! Line acknowledgments (`ok`), tagged error responses, realtime control
//! bytes and the status report line. Every response is terminated by
//! [`LINE_END`].
//!
//! ## Flow Control
//!
//! The sender transmits one line and waits for exactly one `ok` or `error:`
//! before sending the next. A line the controller cannot admit yet (motion
//! queue full) gets no response at all; the sender resends it later.
//! Realtime bytes are out-of-band and never answered with `ok`.

use core::fmt;

use crate::consts::MAX_AXES;

/// Terminator appended to every response line.
pub const LINE_END: &str = "\r\n";

/// Positive acknowledgment token.
pub const OK_TOKEN: &str = "ok";

/// Single-byte realtime control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RealtimeCommand {
    /// `?`: report machine status.
    StatusReport = b'?',
    /// `!`: decelerate to a halt and hold.
    FeedHold = b'!',
    /// `~`: resume from feed hold.
    CycleStart = b'~',
    /// Ctrl-X: abort motion and reset the stream.
    SoftReset = 0x18,
}

impl RealtimeCommand {
    /// Classify a raw byte. Returns `None` for ordinary line content.
    #[inline]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'?' => Some(Self::StatusReport),
            b'!' => Some(Self::FeedHold),
            b'~' => Some(Self::CycleStart),
            0x18 => Some(Self::SoftReset),
            _ => None,
        }
    }

    #[inline]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Numeric error codes carried by `error:` responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StatusCode {
    /// Word without a leading letter.
    ExpectedCommandLetter = 1,
    /// Letter without a parseable number.
    BadNumberFormat = 2,
    /// Line that is not a command.
    InvalidStatement = 3,
    /// Value that must not be negative.
    NegativeValue = 4,
    /// Line longer than the line buffer.
    LineOverflow = 11,
    /// Axis word for an axis the machine does not have.
    AxisNotConfigured = 14,
    /// Recognized letter with an unsupported number.
    UnsupportedCommand = 20,
    /// Two words from the same modal group.
    ModalGroupViolation = 21,
    /// Same word twice on one line.
    RepeatedWord = 25,
    /// Motion target outside the representable step range.
    InvalidTarget = 33,
}

impl StatusCode {
    /// Human-readable cause.
    pub const fn message(self) -> &'static str {
        match self {
            Self::ExpectedCommandLetter => "Expected command letter",
            Self::BadNumberFormat => "Bad number format",
            Self::InvalidStatement => "Invalid statement",
            Self::NegativeValue => "Value < 0",
            Self::LineOverflow => "Line overflow",
            Self::AxisNotConfigured => "Axis not configured",
            Self::UnsupportedCommand => "Unsupported command",
            Self::ModalGroupViolation => "Modal group violation",
            Self::RepeatedWord => "Repeated word",
            Self::InvalidTarget => "Invalid target",
        }
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// One line sent back to the sender.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response<'a> {
    /// Line accepted.
    Ok,
    /// Line rejected with a code and cause.
    Error { code: StatusCode, cause: &'a str },
    /// Answer to a status query.
    Status(&'a StatusReport),
    /// Greeting at startup and after soft reset.
    Banner { version: &'a str },
}

impl fmt::Display for Response<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "{OK_TOKEN}{LINE_END}"),
            Self::Error { code, cause } => {
                write!(f, "error:{} ({cause}){LINE_END}", code.code())
            }
            Self::Status(report) => write!(f, "{report}{LINE_END}"),
            Self::Banner { version } => {
                write!(f, "{LINE_END}CNC control {version} ['?' for status]{LINE_END}")
            }
        }
    }
}

/// Machine state shown in status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MachineStatus {
    /// Nothing queued, nothing moving.
    #[default]
    Idle,
    /// Executing or holding queued motion.
    Run,
    /// Feed hold requested; `stopped` once deceleration completed.
    Hold { stopped: bool },
}

impl fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Run => f.write_str("Run"),
            Self::Hold { stopped: true } => f.write_str("Hold:0"),
            Self::Hold { stopped: false } => f.write_str("Hold:1"),
        }
    }
}

/// Snapshot answered to a `?` query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusReport {
    pub status: MachineStatus,
    /// Machine position [mm], first `axis_count` entries valid.
    pub position: [f64; MAX_AXES],
    pub axis_count: usize,
    /// Free motion queue slots.
    pub free_blocks: usize,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}|MPos:", self.status)?;
        for (i, p) in self.position.iter().take(self.axis_count).enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{p:.3}")?;
        }
        write!(f, "|Bf:{}>", self.free_blocks)
    }
}
