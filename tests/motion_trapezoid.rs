//! Drives lookahead and phase emission against hand-picked profiles the
//! way the motion planner's own commit loop would (spec §8: a long
//! straight move produces a full trapezoid, a short one a triangle).

use aistack_core::config::DefaultConfig;
use aistack_core::motion::lookahead::{forward_pass, phases_for_axis, BackwardState, Phase};
use aistack_core::motion::segment::{build_segment, split_if_needed, AxisMove, LookaheadSegment, MotionCommand};

fn single_axis_move(steps: u32) -> MotionCommand<1> {
    MotionCommand {
        axes: [AxisMove { dir: false, x_steps: steps, max_v_rec: 0.05, max_a_rec: 0.01 }],
        rel_max_v_rec: 0.05,
    }
}

#[test]
fn long_move_splits_below_the_configured_step_ceiling() {
    let cmd = single_axis_move(10_000);
    let parts = split_if_needed(&cmd, 4_000);
    assert_eq!(parts, 3, "10000 steps at a 4000-step ceiling needs three sub-moves");
}

#[test]
fn ample_distance_yields_a_full_trapezoid_with_a_cruise_phase() {
    let seg = LookaheadSegment {
        axes: [AxisMove::default()],
        max_v: 100.0,
        a_x: 1000.0,
        max_start_v: f64::INFINITY,
        distance: 100.0,
    };
    let backward = BackwardState { entry_v_squared: 0.0 };
    let (trap, exit_v_sq) = forward_pass(&seg, &backward, 0.0);

    assert!(trap.const_start_frac > 0.0, "expect a nonzero acceleration phase");
    assert!(trap.const_end_frac < 1.0, "expect a nonzero deceleration phase");
    assert!(trap.const_start_frac < trap.const_end_frac, "a cruise phase exists between accel and decel");
    assert!(exit_v_sq <= seg.max_v + 1e-9);

    let phases: heapless::Vec<_, 4> = phases_for_axis(&trap, 100_000);
    assert_eq!(phases.len(), 3, "accel, cruise, and decel phases are all present");
    assert_eq!(phases[0].phase, Phase::Accel);
    assert_eq!(phases[1].phase, Phase::Cruise);
    assert_eq!(phases[2].phase, Phase::Decel);
    let total: u32 = phases.iter().map(|p| p.steps).sum();
    assert_eq!(total, 100_000, "phase steps must exactly account for the whole move");
}

#[test]
fn short_distance_never_reaches_cruise_speed() {
    let seg = LookaheadSegment {
        axes: [AxisMove::default()],
        max_v: 100.0,
        a_x: 1.0,
        max_start_v: f64::INFINITY,
        distance: 1.0,
    };
    let backward = BackwardState { entry_v_squared: 0.0 };
    let (trap, _) = forward_pass(&seg, &backward, 0.0);

    assert!(
        (trap.const_start_frac - trap.const_end_frac).abs() < 1e-9,
        "a short move produces a triangle profile with no cruise phase"
    );
    assert!(trap.const_v_squared <= seg.max_v + 1e-9);

    let phases: heapless::Vec<_, 4> = phases_for_axis(&trap, 1_000);
    assert!(phases.iter().all(|p| p.phase != Phase::Cruise), "no cruise phase on a triangle profile");
    let total: u32 = phases.iter().map(|p| p.steps).sum();
    assert_eq!(total, 1_000);
}

#[test]
fn build_segment_feeds_realistic_distances_into_the_forward_pass() {
    let scale = aistack_core::motion::segment::AxisScale { distance_factor: [1.0] };
    let seg = build_segment::<DefaultConfig, 1>(&single_axis_move(100_000), &scale, None);
    assert!(seg.max_v > 0.0);
    assert!(seg.a_x > 0.0);
    assert!(seg.distance > 0.0);

    let backward = BackwardState { entry_v_squared: 0.0 };
    let (trap, exit_v_sq) = forward_pass(&seg, &backward, 0.0);
    assert!(trap.const_start_frac <= trap.const_end_frac);
    assert!(exit_v_sq <= seg.max_v + 1e-6);
}
