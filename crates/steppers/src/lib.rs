//! Adaptive time-step policies for transient solves.
//!
//! A [`TimeStepper`] decides the size of the next time step from the outcome
//! of the previous solve. Policies are a closed set of variants ([`Policy`]);
//! several steppers can be combined through a [`CompositionDt`], and a
//! [`TimeStepperSystem`] designates the one the executioner calls.

/// Logs a step-size decision at `info` when the run is verbose, `debug` otherwise.
macro_rules! diag {
    ($state:expr, $($arg:tt)+) => {
        if $state.verbose {
            log::info!($($arg)+)
        } else {
            log::debug!($($arg)+)
        }
    };
}

mod config;
mod error;
mod policy;
mod registry;
mod stepper;
mod system;

pub use config::{PolicyParams, StepperConfig, TimeSteppersConfig};
pub use error::Error;
pub use policy::{
    Ab2Params, Ab2PredictorCorrector, CompositionDt, CompositionParams, ConstantDt,
    ConstantParams, CsvTimeSequenceParams, ExplicitCriticalDt, ExplicitCriticalParams,
    FixedPointIterationAdaptiveDt, FixedPointParams, IterationAdaptiveDt,
    IterationAdaptiveParams, Kind, LogConstantDt, LogConstantParams, Policy, PostprocessorDt,
    PostprocessorParams, SequenceCheckpoint, TestSourceParams, TestSourceStepper,
    TimeSequenceParams, TimeSequenceStepper, WaveSpeed,
};
pub use registry::Registry;
pub use stepper::{CommonParams, Context, StepperCore, TimeStepper};
pub use system::{COMPOSITION_NAME, TimeStepperSystem};
