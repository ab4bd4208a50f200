//! Drives the cornering-limited starting velocity the way the planner's
//! segment-construction step would when chaining consecutive moves
//! (spec §8: a sharp turn caps the next segment's entry speed).

use aistack_core::config::DefaultConfig;
use aistack_core::motion::segment::{build_segment, unit_direction, AxisMove, AxisScale, MotionCommand};

fn move_xy(x: u32, y: u32) -> MotionCommand<2> {
    MotionCommand {
        axes: [
            AxisMove { dir: false, x_steps: x, max_v_rec: 0.1, max_a_rec: 0.01 },
            AxisMove { dir: false, x_steps: y, max_v_rec: 0.1, max_a_rec: 0.01 },
        ],
        rel_max_v_rec: 0.1,
    }
}

#[test]
fn first_segment_in_a_buffer_has_no_cornering_limit() {
    let scale = AxisScale { distance_factor: [1.0, 1.0] };
    let seg = build_segment::<DefaultConfig, 2>(&move_xy(1000, 0), &scale, None);
    assert!(seg.max_start_v.is_infinite());
}

#[test]
fn a_straight_continuation_keeps_the_limit_unconstrained() {
    let scale = AxisScale { distance_factor: [1.0, 1.0] };
    let prev = move_xy(1000, 0);
    let prev_dir = unit_direction(&prev, &scale);

    let next = move_xy(1000, 0); // same direction, no turn
    let seg = build_segment::<DefaultConfig, 2>(&next, &scale, Some(&prev_dir));
    assert!(seg.max_start_v.is_infinite(), "continuing straight imposes no cornering limit");
}

#[test]
fn a_right_angle_turn_imposes_a_finite_starting_speed() {
    let scale = AxisScale { distance_factor: [1.0, 1.0] };
    let prev = move_xy(1000, 0);
    let prev_dir = unit_direction(&prev, &scale);

    let turn = move_xy(0, 1000); // perpendicular turn
    let seg = build_segment::<DefaultConfig, 2>(&turn, &scale, Some(&prev_dir));
    assert!(seg.max_start_v.is_finite(), "a 90-degree turn must cap the entry speed");
    assert!(seg.max_start_v > 0.0);
}

#[test]
fn a_sharper_direction_change_caps_speed_at_least_as_tightly_as_a_gentle_one() {
    // A shallow bend (mostly continuing along x) against a full 90-degree
    // turn from the same incoming direction: the sharper turn's bigger
    // unit-direction delta must not produce a looser bound.
    let scale = AxisScale { distance_factor: [1.0, 1.0] };
    let prev = move_xy(1000, 0);
    let prev_dir = unit_direction(&prev, &scale);

    let gentle = move_xy(900, 100);
    let sharp = move_xy(0, 1000);

    let gentle_seg = build_segment::<DefaultConfig, 2>(&gentle, &scale, Some(&prev_dir));
    let sharp_seg = build_segment::<DefaultConfig, 2>(&sharp, &scale, Some(&prev_dir));

    assert!(gentle_seg.max_start_v.is_finite());
    assert!(sharp_seg.max_start_v.is_finite());
    assert!(
        sharp_seg.max_start_v <= gentle_seg.max_start_v,
        "a sharper turn is at least as constraining as a gentle bend"
    );
}
