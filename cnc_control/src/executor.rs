//! Interrupt-side motion execution and the loop/interrupt handoff.
//!
//! Three parties share one [`MotionShared`]:
//!
//! - [`StepperExecutor`] (main loop): starts blocks, raises realtime requests.
//! - [`TrajectoryTicker`] (fixed-rate trajectory interrupt): latches a start
//!   request, ramps the speed scale for feed hold / resume, and arms pulses.
//! - [`PulseEdgeHandler`] (pulse interrupt): consumes armed pulses, tracks
//!   machine position and clears the busy flag on the final step.
//!
//! Every cross-context field is an atomic. Handlers never allocate, lock,
//! log or fail; their work is one fixed pass over `MAX_AXES`.
//!
//! The profile is time-synchronized: each tick advances `elapsed` by the
//! current speed scale (per-mille of nominal) and every axis is armed up to
//! `total * elapsed / (duration * RATE_NOMINAL)` steps (u128 intermediate),
//! so all axes of a block finish on the same tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, AtomicU32, Ordering};

use cnc_common::axis::{Axis, AxisMask, StepVector};
use cnc_common::consts::{MAX_AXES, RATE_NOMINAL};
use cnc_common::motion::MotionBlock;
use static_assertions::const_assert;

use crate::config::TimingConfig;

// Direction bits travel in one `AtomicU8`.
const_assert!(MAX_AXES <= 8);

// ─── Shared State ───────────────────────────────────────────────────

/// State crossing the loop/interrupt boundary.
#[derive(Debug)]
pub struct MotionShared {
    /// Set by the loop when a block starts, cleared by the final pulse edge.
    busy: AtomicBool,
    /// Pending block slot is valid; cleared when the tick latches it.
    start_request: AtomicBool,
    pending_steps: [AtomicI32; MAX_AXES],
    pending_ticks: AtomicU32,
    /// `AxisMask` bits of the pending block's negative axes.
    pending_direction: AtomicU8,
    /// Steps not yet emitted for the running block.
    remaining: [AtomicU32; MAX_AXES],
    /// Pulses armed by the tick, not yet consumed by an edge.
    armed: [AtomicU32; MAX_AXES],
    /// Machine position [steps].
    position: [AtomicI32; MAX_AXES],
    /// `AxisMask` bits of axes moving negative.
    direction: AtomicU8,
    feed_hold: AtomicBool,
    /// Feed hold reached zero speed.
    held: AtomicBool,
    abort: AtomicBool,
    /// Current speed scale, per-mille of nominal.
    rate: AtomicU32,
}

impl MotionShared {
    pub fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
            start_request: AtomicBool::new(false),
            pending_steps: Default::default(),
            pending_ticks: AtomicU32::new(0),
            pending_direction: AtomicU8::new(0),
            remaining: Default::default(),
            armed: Default::default(),
            position: Default::default(),
            direction: AtomicU8::new(0),
            feed_hold: AtomicBool::new(false),
            held: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            rate: AtomicU32::new(RATE_NOMINAL),
        }
    }

    fn remaining_total_is_zero(&self) -> bool {
        self.remaining
            .iter()
            .all(|r| r.load(Ordering::Acquire) == 0)
    }
}

impl Default for MotionShared {
    fn default() -> Self {
        Self::new()
    }
}

/// Consistent-enough view of the executor for status reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSnapshot {
    pub busy: bool,
    pub feed_hold: bool,
    pub held: bool,
    /// Speed scale, per-mille of nominal.
    pub rate: u32,
    /// Machine position [steps].
    pub position: StepVector,
}

// ─── Loop-Side Interfaces ───────────────────────────────────────────

/// Execution collaborator used by the dispatcher's drain step.
pub trait MotionExecutor {
    fn is_busy(&self) -> bool;

    /// Hand `block` to the interrupt side. Returns immediately.
    ///
    /// Must only be called while not busy.
    fn begin_coordinated_move(&mut self, block: &MotionBlock);
}

/// Realtime requests raised from the loop.
pub trait RealtimeControl {
    fn request_feed_hold(&mut self);
    fn release_feed_hold(&mut self);
    /// Stop immediately, dropping the running block and any pending start.
    fn abort(&mut self);
    /// An abort was requested and the trajectory tick has not serviced it
    /// yet. Machine position may still move until this clears.
    fn abort_pending(&self) -> bool;
    fn snapshot(&self) -> ExecutorSnapshot;
}

/// Loop-side handle of the step executor.
#[derive(Debug, Clone)]
pub struct StepperExecutor {
    shared: Arc<MotionShared>,
}

impl StepperExecutor {
    pub fn new(shared: Arc<MotionShared>) -> Self {
        Self { shared }
    }

    pub fn shared(&self) -> &Arc<MotionShared> {
        &self.shared
    }
}

impl MotionExecutor for StepperExecutor {
    #[inline]
    fn is_busy(&self) -> bool {
        self.shared.busy.load(Ordering::Acquire)
    }

    fn begin_coordinated_move(&mut self, block: &MotionBlock) {
        debug_assert!(!self.is_busy(), "begin_coordinated_move while busy");
        let s = &*self.shared;
        // Nothing is in flight, so a not-yet-serviced abort has nothing left to stop.
        s.abort.store(false, Ordering::Relaxed);
        for (slot, steps) in s.pending_steps.iter().zip(block.steps()) {
            slot.store(*steps, Ordering::Relaxed);
        }
        s.pending_ticks
            .store(block.duration_ticks(), Ordering::Relaxed);
        s.pending_direction
            .store(block.negative_axes().bits(), Ordering::Relaxed);
        s.busy.store(true, Ordering::Release);
        s.start_request.store(true, Ordering::Release);
    }
}

impl RealtimeControl for StepperExecutor {
    fn request_feed_hold(&mut self) {
        self.shared.feed_hold.store(true, Ordering::Release);
    }

    fn release_feed_hold(&mut self) {
        self.shared.feed_hold.store(false, Ordering::Release);
    }

    fn abort(&mut self) {
        self.shared.feed_hold.store(false, Ordering::Release);
        self.shared.abort.store(true, Ordering::Release);
    }

    #[inline]
    fn abort_pending(&self) -> bool {
        self.shared.abort.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> ExecutorSnapshot {
        let s = &*self.shared;
        let mut position = [0; MAX_AXES];
        for (dst, src) in position.iter_mut().zip(&s.position) {
            *dst = src.load(Ordering::Relaxed);
        }
        ExecutorSnapshot {
            busy: s.busy.load(Ordering::Acquire),
            feed_hold: s.feed_hold.load(Ordering::Acquire),
            held: s.held.load(Ordering::Acquire),
            rate: s.rate.load(Ordering::Relaxed),
            position,
        }
    }
}

// ─── Trajectory Tick ────────────────────────────────────────────────

/// Fixed-rate trajectory handler. Owns the in-progress profile state.
#[derive(Debug)]
pub struct TrajectoryTicker {
    shared: Arc<MotionShared>,
    hold_decel: u32,
    resume_accel: u32,
    active: bool,
    totals: [u32; MAX_AXES],
    scheduled: [u32; MAX_AXES],
    /// Progress in tick * per-mille units.
    elapsed: u64,
    duration: u64,
    rate: u32,
}

impl TrajectoryTicker {
    pub fn new(shared: Arc<MotionShared>, hold_decel: u32, resume_accel: u32) -> Self {
        Self {
            shared,
            hold_decel: hold_decel.clamp(1, RATE_NOMINAL),
            resume_accel: resume_accel.clamp(1, RATE_NOMINAL),
            active: false,
            totals: [0; MAX_AXES],
            scheduled: [0; MAX_AXES],
            elapsed: 0,
            duration: 0,
            rate: RATE_NOMINAL,
        }
    }

    /// Whether a block is being profiled.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// One trajectory tick. Returns the axes with pulses armed.
    pub fn on_trajectory_tick(&mut self) -> AxisMask {
        if self.shared.abort.swap(false, Ordering::AcqRel) {
            self.stop();
            return AxisMask::empty();
        }

        if !self.active && self.shared.start_request.load(Ordering::Acquire) {
            self.latch();
        }

        let s = &*self.shared;
        if s.feed_hold.load(Ordering::Acquire) {
            self.rate = self.rate.saturating_sub(self.hold_decel);
            s.held.store(self.rate == 0, Ordering::Release);
        } else {
            self.rate = (self.rate + self.resume_accel).min(RATE_NOMINAL);
            s.held.store(false, Ordering::Release);
        }
        s.rate.store(self.rate, Ordering::Relaxed);

        if !self.active {
            return AxisMask::empty();
        }

        self.elapsed = (self.elapsed + self.rate as u64).min(self.duration);
        let mut mask = AxisMask::empty();
        for (i, axis) in Axis::ALL.iter().enumerate() {
            let ideal = (u128::from(self.totals[i]) * u128::from(self.elapsed)
                / u128::from(self.duration)) as u32;
            if ideal > self.scheduled[i] {
                s.armed[i].fetch_add(ideal - self.scheduled[i], Ordering::AcqRel);
                self.scheduled[i] = ideal;
            }
            if s.armed[i].load(Ordering::Acquire) > 0 {
                mask |= axis.mask();
            }
        }
        if self.elapsed >= self.duration {
            self.active = false;
        }
        mask
    }

    fn stop(&mut self) {
        let s = &*self.shared;
        self.active = false;
        s.start_request.store(false, Ordering::Release);
        for i in 0..MAX_AXES {
            s.remaining[i].store(0, Ordering::Release);
            s.armed[i].store(0, Ordering::Release);
        }
        self.rate = RATE_NOMINAL;
        s.rate.store(RATE_NOMINAL, Ordering::Relaxed);
        s.held.store(false, Ordering::Release);
        s.busy.store(false, Ordering::Release);
    }

    fn latch(&mut self) {
        let s = &*self.shared;
        for i in 0..MAX_AXES {
            self.totals[i] = s.pending_steps[i].load(Ordering::Relaxed).unsigned_abs();
            self.scheduled[i] = 0;
            s.armed[i].store(0, Ordering::Relaxed);
            s.remaining[i].store(self.totals[i], Ordering::Release);
        }
        s.direction
            .store(s.pending_direction.load(Ordering::Relaxed), Ordering::Release);
        let ticks = s.pending_ticks.load(Ordering::Relaxed).max(1);
        self.duration = ticks as u64 * RATE_NOMINAL as u64;
        self.elapsed = 0;
        self.active = true;
        s.start_request.store(false, Ordering::Release);
    }
}

// ─── Pulse Edge ─────────────────────────────────────────────────────

/// Step pulse handler.
#[derive(Debug, Clone)]
pub struct PulseEdgeHandler {
    shared: Arc<MotionShared>,
}

impl PulseEdgeHandler {
    pub fn new(shared: Arc<MotionShared>) -> Self {
        Self { shared }
    }

    /// Emit one armed step on `axis`. Returns whether another pulse is armed.
    pub fn on_pulse_edge(&mut self, axis: Axis) -> bool {
        let s = &*self.shared;
        let i = axis.index();
        if s.abort.load(Ordering::Acquire) {
            return false;
        }

        let consumed = s.armed[i]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |a| a.checked_sub(1));
        let Ok(armed_before) = consumed else {
            return false;
        };

        let negative = AxisMask::from_bits_truncate(s.direction.load(Ordering::Acquire));
        if negative.has(axis) {
            s.position[i].fetch_sub(1, Ordering::Relaxed);
        } else {
            s.position[i].fetch_add(1, Ordering::Relaxed);
        }

        let left = s.remaining[i]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
            .map_or(0, |r| r - 1);
        if left == 0 && s.remaining_total_is_zero() {
            s.busy.store(false, Ordering::Release);
        }

        armed_before > 1
    }
}

// ─── Construction ───────────────────────────────────────────────────

/// Loop handle plus the two interrupt handlers over one shared state.
pub fn stepper(timing: &TimingConfig) -> (StepperExecutor, TrajectoryTicker, PulseEdgeHandler) {
    let shared = Arc::new(MotionShared::new());
    (
        StepperExecutor::new(Arc::clone(&shared)),
        TrajectoryTicker::new(
            Arc::clone(&shared),
            timing.hold_decel_per_tick,
            timing.resume_accel_per_tick,
        ),
        PulseEdgeHandler::new(shared),
    )
}

/// One tick followed by servicing every armed pulse, as a step timer would.
/// Returns the number of pulses emitted.
#[inline]
pub fn service_tick(ticker: &mut TrajectoryTicker, pulses: &mut PulseEdgeHandler) -> u32 {
    let mut emitted = 0;
    for axis in ticker.on_trajectory_tick().axes() {
        emitted += 1;
        while pulses.on_pulse_edge(axis) {
            emitted += 1;
        }
    }
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rig(decel: u32) -> (StepperExecutor, TrajectoryTicker, PulseEdgeHandler) {
        stepper(&TimingConfig {
            tick_rate_hz: 1000,
            hold_decel_per_tick: decel,
            resume_accel_per_tick: decel,
        })
    }

    fn block(steps: StepVector, ticks: u32) -> MotionBlock {
        MotionBlock::new(steps, ticks, None).unwrap()
    }

    fn run_to_idle(t: &mut TrajectoryTicker, p: &mut PulseEdgeHandler, exec: &StepperExecutor) -> u32 {
        let mut ticks = 0;
        while exec.is_busy() {
            service_tick(t, p);
            ticks += 1;
            assert!(ticks < 100_000, "move never completed");
        }
        ticks
    }

    #[test]
    fn coordinated_move_finishes_all_axes_together() {
        let (mut exec, mut t, mut p) = rig(50);
        exec.begin_coordinated_move(&block([100, -30, 7, 0], 10));
        assert!(exec.is_busy());

        let ticks = run_to_idle(&mut t, &mut p, &exec);
        assert_eq!(ticks, 10);
        assert_eq!(exec.snapshot().position, [100, -30, 7, 0]);
        assert!(!t.is_active());
    }

    #[test]
    fn busy_clears_only_on_final_step() {
        let (mut exec, mut t, mut p) = rig(50);
        exec.begin_coordinated_move(&block([4, 0, 0, 0], 2));

        let mask = t.on_trajectory_tick();
        assert_eq!(mask, AxisMask::X);
        assert!(p.on_pulse_edge(Axis::X));
        assert!(!p.on_pulse_edge(Axis::X));
        assert!(exec.is_busy());
        // Nothing armed: an extra edge is ignored.
        assert!(!p.on_pulse_edge(Axis::X));

        t.on_trajectory_tick();
        while p.on_pulse_edge(Axis::X) {}
        assert!(!exec.is_busy());
        assert_eq!(exec.snapshot().position[0], 4);
    }

    #[test]
    fn start_is_latched_by_next_tick() {
        let (mut exec, mut t, _p) = rig(50);
        exec.begin_coordinated_move(&block([1, 0, 0, 0], 1));
        assert!(!t.is_active());
        t.on_trajectory_tick();
        assert!(!exec.shared().start_request.load(Ordering::Acquire));
    }

    #[test]
    fn feed_hold_decelerates_to_stop_and_resumes() {
        let (mut exec, mut t, mut p) = rig(250);
        exec.begin_coordinated_move(&block([1000, 0, 0, 0], 100));
        service_tick(&mut t, &mut p);

        exec.request_feed_hold();
        for _ in 0..4 {
            service_tick(&mut t, &mut p);
        }
        let snap = exec.snapshot();
        assert!(snap.held);
        assert_eq!(snap.rate, 0);
        let frozen = snap.position[0];

        for _ in 0..10 {
            assert_eq!(service_tick(&mut t, &mut p), 0);
        }
        assert_eq!(exec.snapshot().position[0], frozen);
        assert!(exec.is_busy());

        exec.release_feed_hold();
        run_to_idle(&mut t, &mut p, &exec);
        assert_eq!(exec.snapshot().position[0], 1000);
        assert_eq!(exec.snapshot().rate, RATE_NOMINAL);
    }

    #[test]
    fn abort_drops_running_block() {
        let (mut exec, mut t, mut p) = rig(50);
        exec.begin_coordinated_move(&block([1000, 0, 0, 0], 100));
        for _ in 0..10 {
            service_tick(&mut t, &mut p);
        }
        exec.abort();
        assert_eq!(service_tick(&mut t, &mut p), 0);
        assert!(!exec.is_busy());
        assert!(!t.is_active());
        let pos = exec.snapshot().position[0];
        assert!(pos > 0 && pos < 1000);

        // Executor accepts the next block after abort.
        exec.begin_coordinated_move(&block([10, 0, 0, 0], 1));
        run_to_idle(&mut t, &mut p, &exec);
        assert_eq!(exec.snapshot().position[0], pos + 10);
    }

    #[test]
    fn abort_stays_pending_until_tick_services_it() {
        let (mut exec, mut t, mut p) = rig(50);
        exec.begin_coordinated_move(&block([1000, 0, 0, 0], 100));
        service_tick(&mut t, &mut p);
        exec.abort();
        assert!(exec.abort_pending());
        // Edges between the request and the tick emit nothing.
        assert!(!p.on_pulse_edge(Axis::X));
        t.on_trajectory_tick();
        assert!(!exec.abort_pending());
        assert!(!exec.is_busy());
    }

    #[test]
    fn negative_axes_step_backwards() {
        let (mut exec, mut t, mut p) = rig(50);
        exec.begin_coordinated_move(&block([5, -5, 0, 0], 5));
        run_to_idle(&mut t, &mut p, &exec);
        exec.begin_coordinated_move(&block([-2, 3, -4, 0], 4));
        run_to_idle(&mut t, &mut p, &exec);
        assert_eq!(exec.snapshot().position, [3, -2, -4, 0]);
    }

    #[test]
    fn abort_before_latch_drops_pending_start() {
        let (mut exec, mut t, mut p) = rig(50);
        exec.begin_coordinated_move(&block([10, 0, 0, 0], 1));
        exec.abort();
        service_tick(&mut t, &mut p);
        assert!(!exec.is_busy());
        assert_eq!(exec.snapshot().position, [0; MAX_AXES]);
    }
}
