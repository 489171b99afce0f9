//! Command dispatcher: the cooperative super-loop body.
//!
//! One [`Dispatcher::poll`] call performs, in order:
//!
//! 1. **Intake**: read available bytes. A realtime byte is handled on the
//!    spot and ends the iteration.
//! 2. **Classification**: a completed line is parsed. Failure answers with
//!    exactly one `error:` line.
//! 3. **Admission**: a line with axis words is offered to the motion queue.
//!    Admitted lines are answered `ok`; a full queue answers nothing, which
//!    stalls a sender that waits for `ok` before sending more. Lines without
//!    axis words update modal state and are answered `ok`.
//! 4. **Drain**: if the executor is idle, start the oldest queued block.
//!
//! No step blocks. Each line is answered at most once.
//!
//! After a soft reset, intake pauses until the trajectory tick has serviced
//! the abort, so the planner resyncs from a machine position that no longer
//! moves.

use core::fmt::Write as _;

use cnc_common::consts::LINE_BUFFER_CAPACITY;
use cnc_common::protocol::{MachineStatus, RealtimeCommand, Response, StatusCode, StatusReport};
use heapless::String;
use tracing::{debug, info, trace, warn};

use crate::config::AxisSettings;
use crate::executor::{MotionExecutor, RealtimeControl};
use crate::line_reader::{LineEvent, LineReader};
use crate::parser::LineParser;
use crate::queue::MotionAdmission;
use crate::serial::SerialLink;

/// Longest single response line, status reports included.
const RESPONSE_CAPACITY: usize = 160;

/// Capacity of an error cause copied out of the parser.
const CAUSE_CAPACITY: usize = 64;

/// Firmware version shown in the banner.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// What happened to the unit handled in one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineOutcome {
    /// No complete line or realtime byte this iteration.
    #[default]
    NoInput,
    /// Realtime byte handled; no line processing this iteration.
    ControlHandled(RealtimeCommand),
    /// Line without axis words applied and acknowledged.
    ModalAck,
    /// Motion line admitted and acknowledged.
    Admitted,
    /// Motion line dropped unanswered because the queue was full.
    RejectedSilent,
    /// Line failed to parse; one error response sent.
    ParseError(StatusCode),
    /// Motion line parsed but cannot be planned; one error response sent.
    Refused(StatusCode),
    /// Line exceeded the buffer; one error response sent.
    Overflow,
}

/// Result of one [`Dispatcher::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PollReport {
    pub outcome: LineOutcome,
    /// A block was handed to the executor during the drain step.
    pub started_block: bool,
}

/// Running counters, logged at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub lines: u64,
    pub motion_acks: u64,
    pub modal_acks: u64,
    pub errors: u64,
    pub overflows: u64,
    pub deferred: u64,
    pub blocks_started: u64,
    pub realtime: u64,
}

impl DispatchStats {
    /// Every `ok` sent.
    #[inline]
    pub fn acks(&self) -> u64 {
        self.motion_acks + self.modal_acks
    }
}

/// Owns the link and the loop-side collaborators.
pub struct Dispatcher<S, P, Q, E> {
    link: S,
    reader: LineReader<LINE_BUFFER_CAPACITY>,
    parser: P,
    queue: Q,
    executor: E,
    axes: AxisSettings,
    stats: DispatchStats,
    /// Soft reset issued; planner not yet resynced to the stopped machine.
    resync_pending: bool,
}

impl<S, P, Q, E> Dispatcher<S, P, Q, E>
where
    S: SerialLink,
    P: LineParser,
    Q: MotionAdmission,
    E: MotionExecutor + RealtimeControl,
{
    pub fn new(link: S, parser: P, queue: Q, executor: E, axes: AxisSettings) -> Self {
        Self {
            link,
            reader: LineReader::new(),
            parser,
            queue,
            executor,
            axes,
            stats: DispatchStats::default(),
            resync_pending: false,
        }
    }

    #[inline]
    pub fn link(&self) -> &S {
        &self.link
    }

    #[inline]
    pub fn link_mut(&mut self) -> &mut S {
        &mut self.link
    }

    #[inline]
    pub fn queue(&self) -> &Q {
        &self.queue
    }

    #[inline]
    pub fn executor(&self) -> &E {
        &self.executor
    }

    #[inline]
    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Greeting sent at startup and after soft reset.
    pub fn send_banner(&mut self) {
        send(&mut self.link, Response::Banner { version: VERSION });
    }

    /// One super-loop iteration. Never blocks.
    pub fn poll(&mut self) -> PollReport {
        if self.resync_pending {
            if self.executor.abort_pending() {
                return PollReport::default();
            }
            self.finish_reset();
        }

        let outcome = match self.reader.poll(&mut self.link) {
            LineEvent::Pending => LineOutcome::NoInput,
            LineEvent::Realtime(cmd) => {
                self.handle_realtime(cmd);
                return PollReport {
                    outcome: LineOutcome::ControlHandled(cmd),
                    started_block: false,
                };
            }
            LineEvent::Overflow => {
                self.stats.lines += 1;
                self.stats.errors += 1;
                self.stats.overflows += 1;
                warn!(max = LineReader::<LINE_BUFFER_CAPACITY>::max_line_len(), "line overflow");
                let code = StatusCode::LineOverflow;
                send(
                    &mut self.link,
                    Response::Error {
                        code,
                        cause: code.message(),
                    },
                );
                LineOutcome::Overflow
            }
            LineEvent::Line(line) => self.process_line(&line),
        };

        PollReport {
            outcome,
            started_block: self.drain(),
        }
    }

    fn process_line(&mut self, line: &[u8]) -> LineOutcome {
        self.stats.lines += 1;
        match self.parser.parse_line(line) {
            Err(err) => {
                let code = err.code();
                let mut cause: String<CAUSE_CAPACITY> = String::new();
                let text = self.parser.last_error_message().unwrap_or(code.message());
                for ch in text.chars() {
                    if cause.push(ch).is_err() {
                        break;
                    }
                }
                if cause.is_empty() {
                    let _ = cause.push_str(code.message());
                }
                self.parser.clear_error();
                self.stats.errors += 1;
                debug!(code = code.code(), cause = cause.as_str(), "parse error");
                send(&mut self.link, Response::Error { code, cause: &cause });
                LineOutcome::ParseError(code)
            }
            Ok(mv) if mv.has_axis_words() => {
                if let Err(err) = self.queue.validate(&mv) {
                    let code = err.code();
                    let mut cause: String<CAUSE_CAPACITY> = String::new();
                    if write!(cause, "{err}").is_err() || cause.is_empty() {
                        cause.clear();
                        let _ = cause.push_str(code.message());
                    }
                    self.stats.errors += 1;
                    debug!(line = ?mv.line_number, code = code.code(), "move refused");
                    send(&mut self.link, Response::Error { code, cause: &cause });
                    return LineOutcome::Refused(code);
                }
                if self.queue.try_admit(&mv) {
                    self.stats.motion_acks += 1;
                    debug!(line = ?mv.line_number, queued = self.queue.len(), "motion admitted");
                    send(&mut self.link, Response::Ok);
                    LineOutcome::Admitted
                } else {
                    self.stats.deferred += 1;
                    debug!(line = ?mv.line_number, "queue full, line deferred");
                    LineOutcome::RejectedSilent
                }
            }
            Ok(mv) => {
                self.queue.apply_modal(&mv);
                self.stats.modal_acks += 1;
                debug!("modal line applied");
                send(&mut self.link, Response::Ok);
                LineOutcome::ModalAck
            }
        }
    }

    fn drain(&mut self) -> bool {
        if self.executor.is_busy() {
            return false;
        }
        let Some(block) = self.queue.try_dequeue() else {
            return false;
        };
        self.executor.begin_coordinated_move(&block);
        self.stats.blocks_started += 1;
        trace!(
            line = ?block.line_number(),
            steps = ?block.steps(),
            events = block.step_event_count(),
            ticks = block.duration_ticks(),
            "block started"
        );
        true
    }

    fn handle_realtime(&mut self, cmd: RealtimeCommand) {
        self.stats.realtime += 1;
        match cmd {
            RealtimeCommand::StatusReport => {
                let report = self.status_report();
                send(&mut self.link, Response::Status(&report));
            }
            RealtimeCommand::FeedHold => {
                debug!("feed hold");
                self.executor.request_feed_hold();
            }
            RealtimeCommand::CycleStart => {
                debug!("cycle start");
                self.executor.release_feed_hold();
            }
            RealtimeCommand::SoftReset => {
                self.executor.abort();
                self.queue.clear();
                self.resync_pending = true;
                self.reader.reset();
                self.parser.clear_error();
                info!("soft reset");
                self.send_banner();
            }
        }
    }

    /// Replan from the machine position once motion has stopped.
    fn finish_reset(&mut self) {
        let position = self.executor.snapshot().position;
        self.queue.resync(&position);
        self.resync_pending = false;
        debug!(?position, "planner resynced after reset");
    }

    /// Current machine state as answered to `?`.
    pub fn status_report(&self) -> StatusReport {
        let snap = self.executor.snapshot();
        let status = if snap.feed_hold {
            MachineStatus::Hold {
                stopped: snap.held,
            }
        } else if snap.busy || self.queue.has_pending() {
            MachineStatus::Run
        } else {
            MachineStatus::Idle
        };
        StatusReport {
            status,
            position: self.axes.steps_to_mm(&snap.position),
            axis_count: self.axes.axis_count,
            free_blocks: self.queue.free_slots(),
        }
    }
}

/// Format `response` into a fixed buffer and send it.
fn send<S: SerialLink>(link: &mut S, response: Response<'_>) {
    let mut buf: String<RESPONSE_CAPACITY> = String::new();
    if write!(buf, "{response}").is_err() {
        warn!("response truncated");
    }
    link.send_text(&buf);
}
