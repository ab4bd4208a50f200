//! Motion planner error kind (spec §7, ambient error-handling stack).

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MotionError {
    #[error("planner is in ABORTED state; call continue_after_aborted first")]
    Aborted,
    #[error("stepper underran the committed region")]
    Underrun,
    /// Informational only: never fails an operation, only logged and counted.
    #[error("lookahead buffer reached capacity without flushing")]
    Overload,
}

pub type MotionResult<T> = Result<T, MotionError>;
