//! Backward/forward lookahead passes and trapezoid decomposition (spec
//! §4.5 Lookahead algorithm, Commit discipline).

use heapless::Vec;

use crate::motion::segment::LookaheadSegment;

/// Per-segment result of the backward pass: the feasible entry velocity
/// (squared) given everything after it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackwardState {
    pub entry_v_squared: f64,
}

/// A segment's trapezoid: fraction of its distance spent accelerating,
/// fraction spent decelerating (so `1 - const_end_frac` is where
/// deceleration begins), and the squared cruise velocity actually
/// reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapezoidResult {
    pub const_start_frac: f64,
    pub const_end_frac: f64,
    pub const_v_squared: f64,
}

/// Runs the backward pass over `segments[..len]`, starting from a final
/// velocity of zero (spec §4.5: "starting from final velocity = 0").
pub fn backward_pass<const MAX_AXES: usize, const CAP: usize>(
    segments: &[LookaheadSegment<MAX_AXES>],
) -> Vec<BackwardState, CAP> {
    let mut out: Vec<BackwardState, CAP> = Vec::new();
    let _ = out.resize_default(segments.len());
    let mut v_out_sq = 0.0f64;
    for i in (0..segments.len()).rev() {
        let seg = &segments[i];
        let feasible = libm::sqrt(v_out_sq + seg.a_x);
        let v_in_sq = seg.max_start_v.min(feasible * feasible).min(seg.max_v);
        out[i] = BackwardState { entry_v_squared: v_in_sq.max(0.0) };
        v_out_sq = v_in_sq;
    }
    out
}

/// Runs the forward pass given the backward-pass results and a staging
/// boundary velocity carried across commits (spec §4.5: `staging_v_squared`).
pub fn forward_pass<const MAX_AXES: usize>(
    seg: &LookaheadSegment<MAX_AXES>,
    backward: &BackwardState,
    staging_v_squared: f64,
) -> (TrapezoidResult, f64) {
    let v_start_sq = staging_v_squared.min(backward.entry_v_squared);
    let v_cruise_sq = seg.max_v;

    // Distance (in squared-velocity units) needed to accelerate from
    // v_start to v_cruise and decelerate back to the segment's own exit
    // velocity (approximated here by the next backward-pass entry,
    // folded into `seg.a_x` by the caller when chaining segments).
    let accel_needed = (v_cruise_sq - v_start_sq).max(0.0);
    let decel_needed = (v_cruise_sq - backward.entry_v_squared).max(0.0);

    let (start_frac, end_frac, actual_cruise_sq) = if seg.a_x <= 0.0 || seg.distance <= 0.0 {
        (0.0, 1.0, v_start_sq.min(v_cruise_sq))
    } else {
        let accel_frac = (accel_needed / seg.a_x).min(1.0);
        let decel_frac = (decel_needed / seg.a_x).min(1.0);
        if accel_frac + decel_frac > 1.0 {
            // Triangle profile: never reaches v_cruise. Split proportionally.
            let total = accel_frac + decel_frac;
            let a = accel_frac / total;
            let peak_v_sq = v_start_sq + a * seg.a_x;
            (a, a, peak_v_sq.max(0.0))
        } else {
            (accel_frac, 1.0 - decel_frac, v_cruise_sq)
        }
    };

    (
        TrapezoidResult {
            const_start_frac: start_frac,
            const_end_frac: end_frac,
            const_v_squared: actual_cruise_sq,
        },
        actual_cruise_sq,
    )
}

/// A single stepper-bound command phase, produced from a segment's
/// trapezoid result (spec §4.5: "emit up to three stepper commands per
/// axis"). Step counts here are whole-move totals; per-axis splitting
/// happens when handing these to [`crate::motion::stepper`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accel,
    Cruise,
    Decel,
}

#[derive(Debug, Clone, Copy)]
pub struct PhaseCommand {
    pub phase: Phase,
    pub steps: u32,
}

/// Converts a trapezoid result plus an axis's total step count into up
/// to three phase commands, omitting zero-step phases and folding their
/// time into the adjacent phase (spec §4.5).
pub fn phases_for_axis<const CAP: usize>(
    trap: &TrapezoidResult,
    total_steps: u32,
) -> Vec<PhaseCommand, CAP> {
    let accel_steps = libm::round(trap.const_start_frac * total_steps as f64) as u32;
    let decel_frac = 1.0 - trap.const_end_frac;
    let decel_steps = libm::round(decel_frac * total_steps as f64) as u32;
    let accel_steps = accel_steps.min(total_steps);
    let decel_steps = decel_steps.min(total_steps - accel_steps);
    let cruise_steps = total_steps - accel_steps - decel_steps;

    let mut out: Vec<PhaseCommand, CAP> = Vec::new();
    if accel_steps > 0 {
        let _ = out.push(PhaseCommand { phase: Phase::Accel, steps: accel_steps });
    }
    if cruise_steps > 0 {
        let _ = out.push(PhaseCommand { phase: Phase::Cruise, steps: cruise_steps });
    }
    if decel_steps > 0 {
        let _ = out.push(PhaseCommand { phase: Phase::Decel, steps: decel_steps });
    }
    out
}
