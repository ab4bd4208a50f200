//! Motion planning: segment construction, lookahead, and the fixed-point
//! step generator (spec §4.5–§4.6).

pub mod axis;
pub mod error;
pub mod lookahead;
pub mod segment;
pub mod stepper;

pub use axis::{MotionPlanner, PlannerState};
pub use error::{MotionError, MotionResult};
