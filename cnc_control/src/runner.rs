//! Hosted execution: the super-loop and the tick source thread.
//!
//! On a microcontroller the trajectory tick and pulse edges are timer
//! interrupts. Hosted, a dedicated thread paces [`service_tick`] at the
//! configured rate with a [`TickPacer`], while the calling thread runs
//! [`Dispatcher::poll`] in a loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::dispatcher::{Dispatcher, LineOutcome, PollReport};
use crate::error::RunError;
use crate::executor::{MotionExecutor, PulseEdgeHandler, RealtimeControl, TrajectoryTicker, service_tick};
use crate::parser::LineParser;
use crate::queue::MotionAdmission;
use crate::rt::{RtSettings, TickPacer, rt_setup};
use crate::serial::SerialLink;

/// Back-off when an iteration found nothing to do.
const IDLE_BACKOFF: Duration = Duration::from_micros(200);

// ─── Loop Statistics ────────────────────────────────────────────────

/// O(1) per-iteration timing statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    /// Last iteration duration [ns].
    pub last_ns: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub sum_ns: u64,
    /// Deadlines missed (tick source only).
    pub overruns: u64,
}

impl LoopStats {
    pub const fn new() -> Self {
        Self {
            iterations: 0,
            last_ns: 0,
            min_ns: u64::MAX,
            max_ns: 0,
            sum_ns: 0,
            overruns: 0,
        }
    }

    #[inline]
    pub fn record(&mut self, duration_ns: u64) {
        self.iterations += 1;
        self.last_ns = duration_ns;
        self.min_ns = self.min_ns.min(duration_ns);
        self.max_ns = self.max_ns.max(duration_ns);
        self.sum_ns = self.sum_ns.saturating_add(duration_ns);
    }

    /// Average iteration time [ns] (0 if nothing recorded).
    #[inline]
    pub fn avg_ns(&self) -> u64 {
        if self.iterations == 0 {
            0
        } else {
            self.sum_ns / self.iterations
        }
    }
}

impl Default for LoopStats {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Super-Loop ─────────────────────────────────────────────────────

/// Cooperative main loop around a [`Dispatcher`].
pub struct SuperLoop<S, P, Q, E> {
    dispatcher: Dispatcher<S, P, Q, E>,
    stats: LoopStats,
}

impl<S, P, Q, E> SuperLoop<S, P, Q, E>
where
    S: SerialLink,
    P: LineParser,
    Q: MotionAdmission,
    E: MotionExecutor + RealtimeControl,
{
    pub fn new(dispatcher: Dispatcher<S, P, Q, E>) -> Self {
        Self {
            dispatcher,
            stats: LoopStats::new(),
        }
    }

    #[inline]
    pub fn dispatcher(&self) -> &Dispatcher<S, P, Q, E> {
        &self.dispatcher
    }

    #[inline]
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<S, P, Q, E> {
        &mut self.dispatcher
    }

    #[inline]
    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// One timed iteration.
    pub fn step(&mut self) -> PollReport {
        let start = Instant::now();
        let report = self.dispatcher.poll();
        self.stats.record(start.elapsed().as_nanos() as u64);
        report
    }

    /// Iterate while `running` is set, `max_iterations` is not reached and
    /// `finished` returns false. Sleeps briefly on idle iterations.
    pub fn run<F>(&mut self, running: &AtomicBool, max_iterations: Option<u64>, mut finished: F)
    where
        F: FnMut(&Dispatcher<S, P, Q, E>) -> bool,
    {
        info!("entering super-loop");
        while running.load(Ordering::Acquire) {
            if max_iterations.is_some_and(|max| self.stats.iterations >= max) {
                info!("iteration limit reached");
                break;
            }
            let report = self.step();
            if finished(&self.dispatcher) {
                break;
            }
            if report.outcome == LineOutcome::NoInput && !report.started_block {
                thread::sleep(IDLE_BACKOFF);
            }
        }
    }

    pub fn into_dispatcher(self) -> Dispatcher<S, P, Q, E> {
        self.dispatcher
    }
}

// ─── Tick Source ────────────────────────────────────────────────────

/// Counters of the tick source thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    pub timing: LoopStats,
    pub pulses: u64,
}

/// Handle of the running tick source.
pub struct TickSource {
    handle: JoinHandle<Result<TickStats, RunError>>,
    stop: Arc<AtomicBool>,
}

impl TickSource {
    /// Signal the thread to stop and wait for it.
    pub fn stop(self) -> Result<TickStats, RunError> {
        self.stop.store(true, Ordering::Release);
        self.handle
            .join()
            .map_err(|_| RunError::TickThreadPanicked)?
    }
}

/// Spawn the thread standing in for the trajectory and pulse interrupts.
///
/// `rt` applies real-time placement to the thread itself before the first
/// tick.
pub fn spawn_tick_source(
    mut ticker: TrajectoryTicker,
    mut pulses: PulseEdgeHandler,
    tick_rate_hz: u32,
    rt: Option<RtSettings>,
) -> Result<TickSource, RunError> {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let period = Duration::from_nanos(1_000_000_000 / u64::from(tick_rate_hz.max(1)));

    let handle = thread::Builder::new()
        .name("tick-source".into())
        .spawn(move || {
            if let Some(settings) = rt {
                rt_setup(settings)?;
                info!(
                    cpu_core = settings.cpu_core,
                    priority = settings.priority,
                    "tick source RT setup complete"
                );
            }

            let mut stats = TickStats::default();
            let mut pacer = TickPacer::new(period)?;
            while !stop_flag.load(Ordering::Acquire) {
                let start = Instant::now();
                stats.pulses += u64::from(service_tick(&mut ticker, &mut pulses));
                stats.timing.record(start.elapsed().as_nanos() as u64);

                if !pacer.wait()? {
                    stats.timing.overruns += 1;
                }
            }
            if stats.timing.overruns > 0 {
                warn!(overruns = stats.timing.overruns, "tick deadlines missed");
            }
            Ok(stats)
        })?;

    Ok(TickSource { handle, stop })
}
