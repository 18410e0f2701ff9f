//! Serde configuration of a transient run.
//!
//! A simulation file holds an `[executioner]` table and either one
//! `[time_stepper]` or several named steppers under `[time_steppers]`:
//!
//! ```toml
//! [executioner]
//! end_time = 10.0
//! dtmin = 1e-6
//! sync_times = [2.5]
//!
//! [time_stepper]
//! type = "IterationAdaptiveDT"
//! dt = 0.5
//! optimal_iterations = 6
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stride_core::{
    DEFAULT_TIMESTEP_TOLERANCE, FixedPointBounds, StepState, SyncTimeError, SyncTimes, TimeScheme,
};
use stride_steppers::{StepperConfig, TimeStepperSystem, TimeSteppersConfig};

/// Name given to the stepper of a `[time_stepper]` table.
pub const SINGLE_STEPPER_NAME: &str = "time_stepper";

/// Errors raised while reading or validating a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse simulation file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid executioner parameter: {0}")]
    Invalid(String),

    #[error("invalid sync times: {0}")]
    SyncTimes(#[from] SyncTimeError),

    #[error("no time stepper is configured")]
    NoTimeStepper,

    #[error("configure either [time_stepper] or [time_steppers], not both")]
    AmbiguousTimeStepper,

    #[error(transparent)]
    Stepper(#[from] stride_steppers::Error),
}

/// Parameters of the transient executioner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionerConfig {
    pub start_time: f64,
    pub end_time: f64,

    #[serde(rename = "dtmin")]
    pub dt_min: f64,

    #[serde(rename = "dtmax")]
    pub dt_max: f64,

    /// Maximum number of time steps.
    pub num_steps: usize,

    /// Steps that keep the initial dt before the stepper takes over.
    pub n_startup_steps: usize,

    /// Stop instead of cutting back when a solve fails.
    pub abort_on_solve_fail: bool,

    /// Fail the run when a solve fails at `dtmin`; otherwise stop quietly.
    pub error_on_dtmin: bool,

    pub scheme: TimeScheme,

    /// Tolerance for landing on sync times and the end time.
    pub timestep_tolerance: f64,

    /// Times the run must land on exactly.
    pub sync_times: Vec<f64>,

    /// Run only part of the transient: steps are not clamped to `end_time`.
    pub half_transient: bool,

    /// Log step-size decisions at `info` level.
    pub verbose: bool,

    /// Fixed-point iteration bounds when sub-applications are coupled.
    pub fixed_point: Option<FixedPointBounds>,

    /// Stop once the solution no longer changes between accepted steps.
    pub steady_state_detection: bool,

    /// Steady state is only checked after this time.
    pub steady_state_start_time: f64,

    /// Largest relative solution change still considered steady.
    pub steady_state_tolerance: f64,

    /// Divide the relative solution change by dt before comparing it.
    pub normalize_solution_diff_norm_by_dt: bool,
}

impl Default for ExecutionerConfig {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: 1.0e30,
            dt_min: 1.0e-12,
            dt_max: 1.0e30,
            num_steps: usize::MAX,
            n_startup_steps: 0,
            abort_on_solve_fail: false,
            error_on_dtmin: true,
            scheme: TimeScheme::default(),
            timestep_tolerance: DEFAULT_TIMESTEP_TOLERANCE,
            sync_times: Vec::new(),
            half_transient: false,
            verbose: false,
            fixed_point: None,
            steady_state_detection: false,
            steady_state_start_time: 0.0,
            steady_state_tolerance: 1.0e-8,
            normalize_solution_diff_norm_by_dt: true,
        }
    }
}

impl ExecutionerConfig {
    /// Checks the step-size bounds and the time window.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first invalid parameter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.dt_min > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "dtmin must be positive, got {}",
                self.dt_min
            )));
        }
        if !(self.dt_max >= self.dt_min) {
            return Err(ConfigError::Invalid(format!(
                "dtmax ({}) must not be less than dtmin ({})",
                self.dt_max, self.dt_min
            )));
        }
        if !(self.end_time > self.start_time) {
            return Err(ConfigError::Invalid(format!(
                "end_time ({}) must be greater than start_time ({})",
                self.end_time, self.start_time
            )));
        }
        if !(self.timestep_tolerance >= 0.0) {
            return Err(ConfigError::Invalid(
                "timestep_tolerance must not be negative".into(),
            ));
        }
        if !(self.steady_state_tolerance > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "steady_state_tolerance must be positive, got {}",
                self.steady_state_tolerance
            )));
        }
        if let Some(bounds) = self.fixed_point
            && bounds.min_iterations > bounds.max_iterations
        {
            return Err(ConfigError::Invalid(format!(
                "fixed-point min_iterations ({}) exceeds max_iterations ({})",
                bounds.min_iterations, bounds.max_iterations
            )));
        }
        Ok(())
    }

    /// The state a run starts from.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SyncTimes`] if a sync time is not finite.
    pub fn initial_state(&self) -> Result<StepState, ConfigError> {
        let mut state = StepState::new(self.start_time, self.end_time, self.dt_min, self.dt_max);
        state.timestep_tolerance = self.timestep_tolerance;
        state.sync_times = SyncTimes::from_times(self.sync_times.iter().copied())?;
        state.half_transient = self.half_transient;
        state.verbose = self.verbose;
        state.scheme = self.scheme;
        state.fixed_point = self.fixed_point;
        Ok(state)
    }
}

/// A complete simulation file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub executioner: ExecutionerConfig,

    #[serde(default)]
    pub time_stepper: Option<StepperConfig>,

    #[serde(default)]
    pub time_steppers: Option<TimeSteppersConfig>,
}

impl SimulationConfig {
    /// Parses a simulation file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] if the text is not a valid simulation file.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Builds the configured time steppers.
    ///
    /// # Errors
    ///
    /// Returns an error if no stepper or both forms are configured, or a
    /// stepper is invalid.
    pub fn time_stepper_system(&self) -> Result<TimeStepperSystem, ConfigError> {
        let system = match (&self.time_stepper, &self.time_steppers) {
            (Some(_), Some(_)) => return Err(ConfigError::AmbiguousTimeStepper),
            (None, None) => return Err(ConfigError::NoTimeStepper),
            (Some(stepper), None) => {
                TimeStepperSystem::from_stepper_config(SINGLE_STEPPER_NAME, stepper)?
            }
            (None, Some(steppers)) => TimeStepperSystem::from_config(steppers)?,
        };
        Ok(system)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use stride_steppers::{COMPOSITION_NAME, Kind};

    #[test]
    fn executioner_defaults() {
        let config = ExecutionerConfig::default();
        assert_relative_eq!(config.dt_min, 1.0e-12);
        assert_relative_eq!(config.end_time, 1.0e30);
        assert_eq!(config.num_steps, usize::MAX);
        assert!(config.error_on_dtmin);
        assert!(!config.abort_on_solve_fail);
        assert!(!config.steady_state_detection);
        assert_relative_eq!(config.steady_state_tolerance, 1.0e-8);
        assert!(config.normalize_solution_diff_norm_by_dt);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_a_single_stepper() {
        let config = SimulationConfig::from_toml(
            r#"
            [executioner]
            end_time = 5.0
            dtmin = 1e-3
            num_steps = 20
            sync_times = [2.5, 1.0]
            scheme = "crank-nicolson"

            [time_stepper]
            type = "ConstantDT"
            dt = 0.5
            "#,
        )
        .unwrap();

        assert_relative_eq!(config.executioner.end_time, 5.0);
        assert_relative_eq!(config.executioner.dt_min, 1e-3);
        assert_eq!(config.executioner.num_steps, 20);
        assert_eq!(config.executioner.scheme, TimeScheme::CrankNicolson);

        let state = config.executioner.initial_state().unwrap();
        assert_eq!(state.sync_times.iter().collect::<Vec<_>>(), [1.0, 2.5]);

        let system = config.time_stepper_system().unwrap();
        assert_eq!(system.final_stepper().name(), SINGLE_STEPPER_NAME);
        assert_eq!(system.final_stepper().kind(), Kind::Constant);
    }

    #[test]
    fn parses_named_steppers() {
        let config = SimulationConfig::from_toml(
            r#"
            [time_steppers]
            lower_bound = ["floor"]

            [time_steppers.adaptive]
            type = "IterationAdaptiveDT"
            dt = 1.0
            optimal_iterations = 4

            [time_steppers.floor]
            type = "ConstantDT"
            dt = 0.1
            "#,
        )
        .unwrap();

        let system = config.time_stepper_system().unwrap();
        assert_eq!(system.final_stepper().name(), COMPOSITION_NAME);
        assert!(system.stepper("floor").is_some());
    }

    #[test]
    fn stepper_forms_are_exclusive() {
        let config = SimulationConfig::from_toml(
            r#"
            [time_stepper]
            type = "ConstantDT"
            dt = 0.5

            [time_steppers.other]
            type = "ConstantDT"
            dt = 0.5
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.time_stepper_system(),
            Err(ConfigError::AmbiguousTimeStepper)
        ));

        let config = SimulationConfig::default();
        assert!(matches!(
            config.time_stepper_system(),
            Err(ConfigError::NoTimeStepper)
        ));
    }

    #[test]
    fn invalid_executioner_parameters() {
        let config = ExecutionerConfig {
            dt_min: 0.0,
            ..ExecutionerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = ExecutionerConfig {
            start_time: 2.0,
            end_time: 1.0,
            ..ExecutionerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = ExecutionerConfig {
            steady_state_tolerance: 0.0,
            ..ExecutionerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = ExecutionerConfig {
            sync_times: vec![f64::NAN],
            ..ExecutionerConfig::default()
        };
        assert!(matches!(
            config.initial_state(),
            Err(ConfigError::SyncTimes(_))
        ));
    }
}
