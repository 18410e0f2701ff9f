use stride_core::StepState;

/// Indicates how the run terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Reached the end time.
    Complete,

    /// The solution stopped changing after `steady_state_start_time`.
    SteadyState,

    /// Took the configured maximum number of steps.
    StepLimit,

    /// Stopped because the observer returned [`crate::Action::StopEarly`].
    StoppedByObserver,

    /// A solve failed and the run was configured to abort on failure.
    SolveFailed,

    /// A solve failed at the minimum step size and `error_on_dtmin` is off.
    AtMinimumDt,
}

/// An accepted time step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepRecord {
    pub step: usize,

    /// Simulation time at the end of the step.
    pub time: f64,

    pub dt: f64,

    /// Whether the step was shortened to land on a sync time.
    pub at_sync_point: bool,
}

/// The result of a transient run.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Termination status.
    pub status: Status,

    /// Accepted steps in order.
    pub history: Vec<StepRecord>,

    /// Number of solve attempts that were not accepted.
    pub failures: usize,

    /// The executioner state when the run stopped.
    pub state: StepState,
}

impl Solution {
    /// Number of accepted steps.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.history.len()
    }

    /// Simulation time reached by the last accepted step.
    #[must_use]
    pub fn final_time(&self) -> f64 {
        self.history
            .last()
            .map_or(self.state.start_time, |record| record.time)
    }
}
