//! Bounded motion queue with all-or-nothing admission.
//!
//! The queue is owned by the main loop; the interrupt side never touches it.
//! Storage is a compile-time sized `heapless::Deque`, the usable capacity is
//! configured at runtime (`1..=MAX`).

use cnc_common::axis::StepVector;
use cnc_common::consts::MOTION_QUEUE_MAX;
use cnc_common::gcode::ParsedMove;
use cnc_common::motion::MotionBlock;
use heapless::Deque;

use crate::planner::{PlanError, Planner};

/// Admission collaborator used by the dispatcher.
pub trait MotionAdmission {
    /// Plan and enqueue `mv`. Returns `false` when the queue is full, in which
    /// case neither the queue nor the modal state changed.
    fn try_admit(&mut self, mv: &ParsedMove) -> bool;

    /// Whether `mv` can be planned from the current modal state at all.
    /// A move refused here is never admitted, whatever the queue occupancy.
    fn validate(&self, mv: &ParsedMove) -> Result<(), PlanError>;

    /// Apply a line without axis words to modal state.
    fn apply_modal(&mut self, mv: &ParsedMove);

    fn has_pending(&self) -> bool;

    /// Oldest block, FIFO.
    fn try_dequeue(&mut self) -> Option<MotionBlock>;

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    /// Drop every queued block.
    fn clear(&mut self);

    /// Restart planning from `machine_position` with power-on modal state.
    fn resync(&mut self, machine_position: &StepVector);

    #[inline]
    fn free_slots(&self) -> usize {
        self.capacity().saturating_sub(self.len())
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }
}

/// Planner plus FIFO of planned blocks.
#[derive(Debug)]
pub struct MotionQueue<const MAX: usize = MOTION_QUEUE_MAX> {
    blocks: Deque<MotionBlock, MAX>,
    capacity: usize,
    planner: Planner,
}

impl<const MAX: usize> MotionQueue<MAX> {
    /// Queue holding at most `capacity` blocks, clamped to `1..=MAX`.
    pub fn new(capacity: usize, planner: Planner) -> Self {
        Self {
            blocks: Deque::new(),
            capacity: capacity.clamp(1, MAX),
            planner,
        }
    }

    #[inline]
    pub fn planner(&self) -> &Planner {
        &self.planner
    }

}

impl<const MAX: usize> MotionAdmission for MotionQueue<MAX> {
    fn try_admit(&mut self, mv: &ParsedMove) -> bool {
        if self.blocks.len() >= self.capacity {
            return false;
        }
        let Ok(plan) = self.planner.plan(mv) else {
            return false;
        };
        if let Some(block) = plan.block {
            if self.blocks.push_back(block).is_err() {
                return false;
            }
        }
        self.planner.commit(plan.next);
        true
    }

    fn validate(&self, mv: &ParsedMove) -> Result<(), PlanError> {
        self.planner.plan(mv).map(|_| ())
    }

    fn apply_modal(&mut self, mv: &ParsedMove) {
        let next = self.planner.plan_modal(mv);
        self.planner.commit(next);
    }

    #[inline]
    fn has_pending(&self) -> bool {
        !self.blocks.is_empty()
    }

    #[inline]
    fn try_dequeue(&mut self) -> Option<MotionBlock> {
        self.blocks.pop_front()
    }

    #[inline]
    fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn clear(&mut self) {
        self.blocks.clear();
    }

    fn resync(&mut self, machine_position: &StepVector) {
        self.planner.resync(machine_position);
    }
}
