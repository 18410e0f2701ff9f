use std::path::PathBuf;

use thiserror::Error;

use stride_core::TimeIncrementError;

/// Errors raised by time steppers.
///
/// Every variant is fatal to the run: configuration errors are detected at
/// construction or `init`, runtime errors when a step size cannot be produced.
/// Recoverable solve failures never surface here; they are handled by cutting
/// back the step.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid parameter for time stepper '{stepper}': {reason}")]
    InvalidParameter { stepper: String, reason: String },

    #[error("time stepper '{stepper}' computed an invalid time step: {source}")]
    NonPositiveDt {
        stepper: String,
        #[source]
        source: TimeIncrementError,
    },

    #[error("solve failed and timestep already at or below dtmin ({dt} <= {dt_min}), cannot continue")]
    AtMinimumDt { dt: f64, dt_min: f64 },

    #[error(
        "adjusting to sync time {sync_time} resulted in a non-positive time step ({dt}) at time {time}"
    )]
    NonPositiveSyncDt { sync_time: f64, time: f64, dt: f64 },

    #[error("no time steppers are configured")]
    NoSteppers,

    #[error("time stepper '{name}' is defined more than once")]
    DuplicateStepper { name: String },

    #[error("unknown time stepper '{name}'")]
    UnknownStepper { name: String },

    #[error("composition requires at least two time steppers, found {found}")]
    TooFewSteppers { found: usize },

    #[error("time stepper '{name}' is a composition and cannot be composed")]
    NestedComposition { name: String },

    #[error("unknown postprocessor '{name}' requested by time stepper '{stepper}'")]
    UnknownPostprocessor { stepper: String, name: String },

    #[error("unknown function '{name}' requested by time stepper '{stepper}'")]
    UnknownFunction { stepper: String, name: String },

    #[error("time stepper '{stepper}' requires an executioner with fixed-point iteration")]
    FixedPointUnsupported { stepper: String },

    #[error(
        "target fixed-point iterations window [{low}, {high}] must lie within the executioner bounds [{min}, {max}]"
    )]
    FixedPointWindow {
        low: i64,
        high: usize,
        min: usize,
        max: usize,
    },

    #[error("time sequence of '{stepper}' has no entry after time {time}")]
    SequenceExhausted { stepper: String, time: f64 },

    #[error(
        "restored time sequence differs at entry {index}: expected {expected}, found {found}"
    )]
    SequenceMismatch {
        index: usize,
        expected: f64,
        found: f64,
    },

    #[error("failed to read time sequence from {path:?}: {source}")]
    SequenceFile {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("time sequence file {path:?}: {reason}")]
    SequenceColumn { path: PathBuf, reason: String },

    #[error("time stepper '{stepper}' needs a positive time for logarithmic spacing, got {time}")]
    NonPositiveLogTime { stepper: String, time: f64 },

    #[error("time stepper '{stepper}' needs the solution vector in each solve report")]
    MissingSolution { stepper: String },
}

impl Error {
    pub(crate) fn invalid(stepper: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            stepper: stepper.to_owned(),
            reason: reason.into(),
        }
    }
}
