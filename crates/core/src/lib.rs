//! Core types shared by stride time steppers and executioners.
//!
//! This crate defines the state that an executioner owns and hands to time
//! steppers on every call:
//!
//! - [`StepState`]: the global clock, step-size bounds, and sync times
//! - [`SolveReport`]: the outcome of one solve attempt
//! - [`TimeIncrement`]: a validated, strictly positive step size
//! - [`Values`]: lookup of postprocessor values and [`TimeFunction`]s
//! - [`Observer`]: receives executioner events and optionally returns actions

mod function;
mod observer;
mod state;
mod sync_times;
mod time_increment;
mod values;

pub use function::{PiecewiseLinear, TableError, TimeFunction};
pub use observer::Observer;
pub use state::{
    DEFAULT_TIMESTEP_TOLERANCE, FixedPointBounds, IterationCounts, SolveReport, StepState,
    TimeScheme,
};
pub use sync_times::{SyncTimeError, SyncTimes};
pub use time_increment::{TimeIncrement, TimeIncrementError};
pub use values::{ValueStore, Values};
