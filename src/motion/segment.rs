//! Motion segment construction (spec §4.5 Input, Segment construction).

use crate::config::MotionConfig;
use crate::fixed::isqrt_u64;

/// One axis's contribution to a requested move.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisMove {
    pub dir: bool,
    pub x_steps: u32,
    /// Reciprocal of the per-axis maximum velocity, in fixed-point
    /// (the source's `MaxVRec`: smaller value = faster, avoids a divide
    /// on the hot path).
    pub max_v_rec: f64,
    pub max_a_rec: f64,
}

/// A requested motion command across up to `MAX_AXES` axes, before
/// splitting or lookahead (spec §4.5 Input).
#[derive(Debug, Clone, Copy)]
pub struct MotionCommand<const MAX_AXES: usize> {
    pub axes: [AxisMove; MAX_AXES],
    pub rel_max_v_rec: f64,
}

/// Per-axis physical scale converting steps to real distance units
/// (the source's `DistanceFactor`).
pub struct AxisScale<const MAX_AXES: usize> {
    pub distance_factor: [f64; MAX_AXES],
}

/// A constructed lookahead segment (spec §4.5 Segment construction).
#[derive(Debug, Clone, Copy)]
pub struct LookaheadSegment<const MAX_AXES: usize> {
    pub axes: [AxisMove; MAX_AXES],
    /// Squared maximum cruise velocity for this segment.
    pub max_v: f64,
    /// Twice max acceleration times squared distance (`a_x`), used by the
    /// backward pass's `v_in = min(max_start_v, sqrt(v_out^2 + a_x))`.
    pub a_x: f64,
    /// Upper bound on this segment's *starting* velocity imposed by
    /// cornering with the previous segment.
    pub max_start_v: f64,
    pub distance: f64,
}

/// Splits a move whose step count on any axis exceeds `max_steps` into
/// equal-length sub-moves (spec §4.5 Input).
pub fn split_if_needed<const MAX_AXES: usize>(
    cmd: &MotionCommand<MAX_AXES>,
    max_steps: u32,
) -> u32 {
    let worst = cmd.axes.iter().map(|a| a.x_steps).max().unwrap_or(0);
    if worst == 0 {
        return 1;
    }
    worst.div_ceil(max_steps).max(1)
}

/// Builds the `LookaheadSegment` for one accepted sub-move (spec §4.5
/// Segment construction): computes `distance_squared`, `max_v`, `a_x`,
/// and the cornering-limited starting velocity against `prev`.
pub fn build_segment<C: MotionConfig, const MAX_AXES: usize>(
    cmd: &MotionCommand<MAX_AXES>,
    scale: &AxisScale<MAX_AXES>,
    prev_unit_dir: Option<&[f64; MAX_AXES]>,
) -> LookaheadSegment<MAX_AXES> {
    let mut distance_sq = 0.0f64;
    for i in 0..MAX_AXES {
        let d = cmd.axes[i].x_steps as f64 * scale.distance_factor[i];
        distance_sq += d * d;
    }
    let distance = libm::sqrt(distance_sq);

    let rel_max_speed_rec = cmd
        .axes
        .iter()
        .fold(cmd.rel_max_v_rec, |acc, a| acc.max(a.max_v_rec));
    let rel_max_accel_rec = cmd
        .axes
        .iter()
        .fold(0.0f64, |acc, a| acc.max(a.max_a_rec));

    let max_v = if rel_max_speed_rec > 0.0 {
        distance_sq / (rel_max_speed_rec * rel_max_speed_rec)
    } else {
        0.0
    };
    let a_x = if rel_max_accel_rec > 0.0 {
        2.0 * (1.0 / rel_max_accel_rec) * distance_sq
    } else {
        0.0
    };

    let mut max_start_v = f64::INFINITY;
    if let Some(prev_dir) = prev_unit_dir {
        if distance > 0.0 {
            for i in 0..MAX_AXES {
                let d = cmd.axes[i].x_steps as f64 * scale.distance_factor[i] / distance;
                let delta = (d - prev_dir[i]).abs();
                if delta > 1e-12 && cmd.axes[i].max_a_rec > 0.0 {
                    let limit = C::CORNERING_DISTANCE * scale.distance_factor[i]
                        / (delta * cmd.axes[i].max_a_rec);
                    max_start_v = max_start_v.min(limit * limit);
                }
            }
        }
    }

    LookaheadSegment {
        axes: cmd.axes,
        max_v,
        a_x,
        max_start_v,
        distance,
    }
}

/// Computes the per-axis unit direction of a segment, for use as `prev_unit_dir`
/// on the next call to [`build_segment`].
pub fn unit_direction<const MAX_AXES: usize>(
    cmd: &MotionCommand<MAX_AXES>,
    scale: &AxisScale<MAX_AXES>,
) -> [f64; MAX_AXES] {
    let mut out = [0.0f64; MAX_AXES];
    let mut sq = 0.0f64;
    for i in 0..MAX_AXES {
        out[i] = cmd.axes[i].x_steps as f64 * scale.distance_factor[i];
        sq += out[i] * out[i];
    }
    let dist = libm::sqrt(sq);
    if dist > 0.0 {
        for v in out.iter_mut() {
            *v /= dist;
        }
    }
    out
}

/// Exact-integer variant used only by tests/grounding for `isqrt`-backed
/// distance checks on pure step counts (no physical scale involved).
pub fn steps_distance_isqrt(steps: &[u32]) -> u64 {
    let sum_sq: u64 = steps.iter().map(|&s| (s as u64) * (s as u64)).sum();
    isqrt_u64(sum_sq)
}
