//! Per-axis fixed-point step generator (spec §4.6).
//!
//! Mirrors `aprinter/driver/AxisDriver.h`: each axis owns one interrupt
//! timer and a FIFO of stepper commands. All runtime arithmetic here is
//! unsigned fixed-point (see [`crate::fixed`]); only the *planning* stage
//! in [`crate::motion::lookahead`] uses `f64`, matching the source's own
//! split between `double`-based planning and fixed-point execution.

use heapless::spsc::Queue;

use crate::fixed::{frac_divide, isqrt_u64};

/// One command in an axis's stepper FIFO.
#[derive(Debug, Clone, Copy)]
pub struct StepperCommand {
    pub dir: bool,
    /// Zero means a pure "time passes" command (no stepping, just
    /// advances axis time by `t_mul`; used to keep multi-axis segments
    /// synchronized when one axis has zero steps in a phase).
    pub x: u32,
    /// Per-command time-scale multiplier (`t_mul`), applied to each
    /// computed fractional time.
    pub t_mul: u64,
    /// Signed acceleration term (`a_mul`); its sign selects the
    /// accel/decel branch of the discriminant recurrence.
    pub a_mul: i64,
}

/// Outcome of one timer-expiry tick (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// `stepOn`/`stepOff` were driven; reschedule the interrupt at the
    /// returned absolute time.
    Stepped { next_time: u64 },
    /// The current command is exhausted; caller should pop the next one.
    CommandDone,
    /// The axis's FIFO is empty; nothing to do until a new command arrives.
    Idle,
    /// The prestep callback vetoed this step (spec: "aborts the axis").
    Aborted { remaining_steps: u32, dir: bool },
}

/// Per-axis runtime state driving one [`StepperCommand`] at a time.
pub struct AxisStepper<const FIFO: usize> {
    fifo: Queue<StepperCommand, FIFO>,
    current: Option<StepperCommand>,
    steps_remaining: u32,
    discriminant: u64,
    axis_time: u64,
    aborted: bool,
    aborted_cmd_steps: u32,
    aborted_cmd_dir: bool,
}

impl<const FIFO: usize> AxisStepper<FIFO> {
    pub const fn new() -> Self {
        AxisStepper {
            fifo: Queue::new(),
            current: None,
            steps_remaining: 0,
            discriminant: 0,
            axis_time: 0,
            aborted: false,
            aborted_cmd_steps: 0,
            aborted_cmd_dir: false,
        }
    }

    pub fn enqueue(&mut self, cmd: StepperCommand) -> Result<(), StepperCommand> {
        self.fifo.enqueue(cmd)
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Clears the aborted state (spec: "recovery requires explicit
    /// `continueAfterAborted`").
    pub fn continue_after_aborted(&mut self) {
        self.aborted = false;
    }

    pub fn get_aborted_cmd_steps(&self) -> (u32, bool) {
        (self.aborted_cmd_steps, self.aborted_cmd_dir)
    }

    fn advance_to_next_command(&mut self) -> TickOutcome {
        match self.fifo.dequeue() {
            Some(cmd) => {
                self.steps_remaining = cmd.x;
                self.discriminant = 0;
                self.current = Some(cmd);
                TickOutcome::CommandDone
            }
            None => {
                self.current = None;
                TickOutcome::Idle
            }
        }
    }

    /// Processes one timer expiry. `prestep` is evaluated before
    /// `stepOn` on every real step; returning `true` aborts the axis
    /// (spec §4.6: "An optional per-axis prestep callback").
    pub fn on_timer_expiry<F: FnOnce() -> bool>(
        &mut self,
        step_bits: u32,
        discriminant_prec: u32,
        rel_t_extra_prec: u32,
        prestep: F,
    ) -> TickOutcome {
        if self.aborted {
            return TickOutcome::Idle;
        }
        let Some(cmd) = self.current else {
            return self.advance_to_next_command();
        };

        if cmd.x == 0 {
            self.axis_time = self.axis_time.wrapping_add(cmd.t_mul);
            return self.advance_to_next_command();
        }

        if prestep() {
            self.aborted = true;
            self.aborted_cmd_steps = self.steps_remaining;
            self.aborted_cmd_dir = cmd.dir;
            return TickOutcome::Aborted {
                remaining_steps: self.steps_remaining,
                dir: cmd.dir,
            };
        }

        // discriminant <- previous + a_mul (monotonic accumulation).
        self.discriminant = if cmd.a_mul >= 0 {
            self.discriminant.saturating_add(cmd.a_mul as u64)
        } else {
            self.discriminant.saturating_sub((-cmd.a_mul) as u64)
        };

        let v0 = 1u64 << step_bits;
        let sqrt_term = isqrt_u64(self.discriminant << (2 * discriminant_prec));
        let q = (v0 + sqrt_term) >> 1;

        let pos = (self.steps_remaining as u64) << rel_t_extra_prec;
        let t_frac = frac_divide(pos, q.max(1), rel_t_extra_prec);

        let delta = crate::fixed::mul_shift(cmd.t_mul, t_frac, rel_t_extra_prec);
        let next_time = if cmd.a_mul >= 0 {
            self.axis_time.wrapping_add(delta)
        } else {
            self.axis_time.wrapping_sub(delta)
        };

        self.steps_remaining -= 1;
        if self.steps_remaining == 0 {
            self.current = None;
        }

        TickOutcome::Stepped { next_time }
    }
}

impl<const FIFO: usize> Default for AxisStepper<FIFO> {
    fn default() -> Self {
        Self::new()
    }
}
