//! Top-level motion planner state machine: lookahead ring buffer, commit
//! discipline, buffering/stepping states (spec §4.5 Commit discipline, States).

use heapless::Vec;

use crate::log_macros::core_debug;
use crate::motion::lookahead::{backward_pass, forward_pass, BackwardState};
use crate::motion::segment::LookaheadSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerState {
    Buffering,
    Stepping,
    Aborted,
}

/// Ring buffer of pending segments plus the commit/staging bookkeeping
/// described in spec §4.5 Commit discipline.
pub struct MotionPlanner<const MAX_AXES: usize, const BUFFER: usize, const COMMIT: usize> {
    ring: Vec<LookaheadSegment<MAX_AXES>, BUFFER>,
    /// Number of segments at the front of `ring` currently irrevocable
    /// and feeding the stepper.
    staging_count: usize,
    staging_v_squared: f64,
    staging_time: u64,
    state: PlannerState,
}

impl<const MAX_AXES: usize, const BUFFER: usize, const COMMIT: usize> MotionPlanner<MAX_AXES, BUFFER, COMMIT> {
    pub fn new() -> Self {
        MotionPlanner {
            ring: Vec::new(),
            staging_count: 0,
            staging_v_squared: 0.0,
            staging_time: 0,
            state: PlannerState::Buffering,
        }
    }

    pub fn state(&self) -> PlannerState {
        self.state
    }

    pub fn is_full(&self) -> bool {
        self.ring.len() == BUFFER
    }

    /// Appends a newly constructed segment. Returns `false` if the ring
    /// is full (caller must flush first).
    pub fn push_segment(&mut self, seg: LookaheadSegment<MAX_AXES>) -> bool {
        self.ring.push(seg).is_ok()
    }

    /// Re-plans the buffer (backward pass over everything, forward pass
    /// over the still-revocable tail) and, if full or explicitly flushed,
    /// commits up to `COMMIT` segments for the stepper to start consuming
    /// (spec §4.5 Commit discipline).
    pub fn replan(&mut self, flush: bool) -> Vec<crate::motion::lookahead::TrapezoidResult, COMMIT> {
        let mut results = Vec::new();
        if self.ring.is_empty() {
            return results;
        }
        if !self.is_full() && !flush {
            return results;
        }

        let backward: Vec<BackwardState, BUFFER> = backward_pass(&self.ring);
        let to_commit = self.ring.len().min(COMMIT);
        let mut staging_v = self.staging_v_squared;
        for i in 0..to_commit {
            let (trap, exit_v) = forward_pass(&self.ring[i], &backward[i], staging_v);
            staging_v = exit_v;
            if results.push(trap).is_err() {
                break;
            }
        }
        self.staging_v_squared = staging_v;
        self.staging_count = to_commit;
        if to_commit > 0 {
            core_debug!("motion: BUFFERING -> STEPPING, committing {} segments", to_commit);
            self.state = PlannerState::Stepping;
        }
        results
    }

    /// Called once the stepper has fully consumed the committed region:
    /// drops the committed segments from the ring, making room for new
    /// ones, and falls back to BUFFERING if nothing is ready to follow
    /// (spec §4.5: "the planner transitions to BUFFERING and resets
    /// `staging_time`").
    pub fn on_committed_region_drained(&mut self) {
        let n = self.staging_count;
        let len = self.ring.len();
        for i in n..len {
            self.ring[i - n] = self.ring[i];
        }
        for _ in 0..n {
            self.ring.pop();
        }
        self.staging_count = 0;
        if self.ring.is_empty() {
            core_debug!("motion: STEPPING -> BUFFERING, underrun");
            self.state = PlannerState::Buffering;
            self.staging_time = 0;
            self.staging_v_squared = 0.0;
        }
    }

    /// A prestep callback vetoed a step: enters ABORTED (spec §4.5 States).
    pub fn abort(&mut self) {
        core_debug!("motion: -> ABORTED");
        self.state = PlannerState::Aborted;
    }

    /// Explicit recovery from ABORTED (spec: "recovery requires explicit
    /// `continueAfterAborted`" — mirrored here at the planner level).
    pub fn continue_after_aborted(&mut self) {
        if self.state == PlannerState::Aborted {
            self.state = PlannerState::Buffering;
        }
    }

    pub fn staging_time(&self) -> u64 {
        self.staging_time
    }

    pub fn advance_staging_time(&mut self, delta: u64) {
        self.staging_time = self.staging_time.wrapping_add(delta);
    }
}

impl<const MAX_AXES: usize, const BUFFER: usize, const COMMIT: usize> Default
    for MotionPlanner<MAX_AXES, BUFFER, COMMIT>
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::segment::AxisMove;

    fn seg() -> LookaheadSegment<1> {
        LookaheadSegment {
            axes: [AxisMove::default()],
            max_v: 100.0,
            a_x: 50.0,
            max_start_v: f64::INFINITY,
            distance: 10.0,
        }
    }

    #[test]
    fn replan_waits_for_full_buffer_unless_flushed() {
        let mut p: MotionPlanner<1, 4, 2> = MotionPlanner::new();
        p.push_segment(seg());
        assert!(p.replan(false).is_empty());
        assert!(!p.replan(true).is_empty());
    }

    #[test]
    fn committed_region_drain_resets_to_buffering_when_empty() {
        let mut p: MotionPlanner<1, 4, 2> = MotionPlanner::new();
        p.push_segment(seg());
        p.replan(true);
        assert_eq!(p.state(), PlannerState::Stepping);
        p.on_committed_region_drained();
        assert_eq!(p.state(), PlannerState::Buffering);
    }

    #[test]
    fn abort_requires_explicit_continuation() {
        let mut p: MotionPlanner<1, 4, 2> = MotionPlanner::new();
        p.abort();
        assert_eq!(p.state(), PlannerState::Aborted);
        p.continue_after_aborted();
        assert_eq!(p.state(), PlannerState::Buffering);
    }
}
