//! Transient executioner for stride time steppers.
//!
//! [`Transient`] owns the simulation clock and drives a
//! [`TimeStepperSystem`](stride_steppers::TimeStepperSystem) together with a
//! [`Solve`] implementation: it asks the stepper for a step size, constrains
//! it, solves, and reports the outcome back until the end time is reached.
//!
//! # Example
//!
//! ```ignore
//! use stride_transient::{SimulationConfig, Transient};
//!
//! let config = SimulationConfig::from_toml(&text)?;
//! let mut system = config.time_stepper_system()?;
//! let transient = Transient::new(config.executioner)?;
//!
//! let solution = transient.run_unobserved(&mut system, &mut solver)?;
//! for record in &solution.history {
//!     println!("t={} dt={}", record.time, record.dt);
//! }
//! ```

mod action;
mod config;
mod error;
mod event;
mod executioner;
mod solution;
mod solve;

pub use action::Action;
pub use config::{ConfigError, ExecutionerConfig, SINGLE_STEPPER_NAME, SimulationConfig};
pub use error::Error;
pub use event::Event;
pub use executioner::Transient;
pub use solution::{Solution, Status, StepRecord};
pub use solve::Solve;
