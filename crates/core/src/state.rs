use serde::{Deserialize, Serialize};

use crate::SyncTimes;

/// Default tolerance used when comparing times against sync points and the end time.
pub const DEFAULT_TIMESTEP_TOLERANCE: f64 = 1.0e-12;

/// Global simulation-time state owned by the executioner.
///
/// Time steppers receive a mutable view of this state on every call and never
/// keep a copy, so that every policy (including the sub-policies of a
/// composition) observes the same clock.
#[derive(Debug, Clone, PartialEq)]
pub struct StepState {
    /// Start time of the run.
    pub start_time: f64,

    /// Current simulation time.
    pub time: f64,

    /// Simulation time at the end of the last accepted step.
    pub time_old: f64,

    /// Step counter (0 before the first step).
    pub step: usize,

    /// Step size of the step being taken (or the last one taken).
    pub dt: f64,

    /// Step size of the previous step.
    pub dt_old: f64,

    pub dt_min: f64,
    pub dt_max: f64,
    pub end_time: f64,

    /// Tolerance for landing on sync times and the end time.
    pub timestep_tolerance: f64,

    /// Times the run must land on exactly.
    pub sync_times: SyncTimes,

    /// When set, steps are not clamped to the end time.
    pub half_transient: bool,

    /// When set, dt decisions are logged at `info` level instead of `debug`.
    pub verbose: bool,

    /// The dt proposed by the stepper before `constrain_step`.
    pub unconstrained_dt: f64,

    /// Whether the current step was shortened to land on a sync time.
    pub at_sync_point: bool,

    /// Set when the solver asks to repeat the current step after a mesh
    /// topology change; sequence steppers then do not advance.
    pub repeat_step: bool,

    /// The active time integration scheme.
    pub scheme: TimeScheme,

    /// Fixed-point iteration bounds, if the executioner couples sub-applications.
    pub fixed_point: Option<FixedPointBounds>,

    /// Iteration counts of the most recent solve attempt.
    pub iterations: IterationCounts,
}

impl StepState {
    /// Creates a state positioned at `start_time` with the given step-size bounds.
    #[must_use]
    pub fn new(start_time: f64, end_time: f64, dt_min: f64, dt_max: f64) -> Self {
        Self {
            start_time,
            time: start_time,
            time_old: start_time,
            step: 0,
            dt: 0.0,
            dt_old: 0.0,
            dt_min,
            dt_max,
            end_time,
            timestep_tolerance: DEFAULT_TIMESTEP_TOLERANCE,
            sync_times: SyncTimes::new(),
            half_transient: false,
            verbose: false,
            unconstrained_dt: 0.0,
            at_sync_point: false,
            repeat_step: false,
            scheme: TimeScheme::default(),
            fixed_point: None,
            iterations: IterationCounts::default(),
        }
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::new(0.0, 1.0e30, 1.0e-12, 1.0e30)
    }
}

/// Time integration schemes known to error-estimating steppers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeScheme {
    #[default]
    ImplicitEuler,
    ExplicitEuler,
    CrankNicolson,
    Bdf2,
}

/// Minimum and maximum fixed-point (Picard) iterations allowed by the executioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedPointBounds {
    pub min_iterations: usize,
    pub max_iterations: usize,
}

/// Iteration counts reported by one solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IterationCounts {
    pub nonlinear: usize,
    pub linear: usize,
    pub fixed_point: usize,
}

/// The outcome of one solve attempt, as reported back to the time stepper.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolveReport {
    /// Whether the solve converged.
    pub converged: bool,

    /// Iteration counts of the attempt.
    pub iterations: IterationCounts,

    /// The solution vector, for steppers that estimate time truncation error.
    pub solution: Vec<f64>,

    /// The solver requests repeating this step (e.g. after a mesh topology change).
    pub repeat_step: bool,
}

impl SolveReport {
    /// A converged attempt with the given nonlinear and linear iteration counts.
    #[must_use]
    pub fn converged(nonlinear: usize, linear: usize) -> Self {
        Self {
            converged: true,
            iterations: IterationCounts {
                nonlinear,
                linear,
                fixed_point: 0,
            },
            ..Self::default()
        }
    }

    /// A failed attempt.
    #[must_use]
    pub fn failed() -> Self {
        Self::default()
    }

    /// Attaches a solution vector.
    #[must_use]
    pub fn with_solution(mut self, solution: Vec<f64>) -> Self {
        self.solution = solution;
        self
    }
}
