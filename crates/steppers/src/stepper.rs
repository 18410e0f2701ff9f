//! The time stepper state machine shared by every policy.
//!
//! A [`TimeStepper`] pairs a [`Policy`] with the bookkeeping every policy
//! needs: the step size it computed last, whether the last solve attempt
//! converged, and how many attempts have failed.
//!
//! # Lifecycle
//!
//! ```text
//! init → pre_execute → { compute_step → constrain_step → (solve) → step → accept_step | reject_step }*
//! ```
//!
//! The executioner owns the [`StepState`] and passes it in through a
//! [`Context`] on every call.

use serde::{Deserialize, Serialize};

use stride_core::{SolveReport, StepState, TimeIncrement, Values};

use crate::{
    Error,
    config::StepperConfig,
    policy::{Kind, Policy, Rule},
};

/// The executioner state and value providers visible to a time stepper call.
pub struct Context<'a> {
    /// The executioner's clock and step-size bounds.
    pub state: &'a mut StepState,

    /// Postprocessor values and functions of time.
    pub values: &'a dyn Values,
}

impl<'a> Context<'a> {
    pub fn new(state: &'a mut StepState, values: &'a dyn Values) -> Self {
        Self { state, values }
    }
}

/// Parameters shared by every time stepper.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommonParams {
    /// Factor applied to the failed step size before retrying.
    pub cutback_factor_at_failure: f64,

    /// Recompute the initial step size once, e.g. after a restart.
    pub reset_dt: bool,
}

impl Default for CommonParams {
    fn default() -> Self {
        Self {
            cutback_factor_at_failure: 0.5,
            reset_dt: false,
        }
    }
}

impl CommonParams {
    pub(crate) fn validate(&self, stepper: &str) -> Result<(), Error> {
        let factor = self.cutback_factor_at_failure;
        if !(factor > 0.0 && factor < 1.0) {
            return Err(Error::invalid(
                stepper,
                format!("cutback_factor_at_failure must be in (0, 1), got {factor}"),
            ));
        }
        Ok(())
    }
}

/// Bookkeeping common to every policy.
#[derive(Debug, Clone)]
pub struct StepperCore {
    name: String,
    current_dt: f64,
    converged: bool,
    failure_count: usize,
    cutback_factor_at_failure: f64,
    reset_dt: bool,
    has_reset_dt: bool,
}

impl StepperCore {
    fn new(name: String, common: CommonParams) -> Self {
        Self {
            name,
            current_dt: 0.0,
            converged: true,
            failure_count: 0,
            cutback_factor_at_failure: common.cutback_factor_at_failure,
            reset_dt: common.reset_dt,
            has_reset_dt: false,
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests(name: &str) -> Self {
        Self::new(name.to_owned(), CommonParams::default())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The step size computed by the last `compute_step`.
    #[must_use]
    pub fn current_dt(&self) -> f64 {
        self.current_dt
    }

    #[must_use]
    pub fn cutback_factor_at_failure(&self) -> f64 {
        self.cutback_factor_at_failure
    }

    /// Cuts the step that just failed back by `cutback_factor_at_failure`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AtMinimumDt`] if the failed step was already at or
    /// below `dt_min`.
    pub fn cut_back(&self, state: &StepState) -> Result<f64, Error> {
        if state.dt <= state.dt_min {
            return Err(Error::AtMinimumDt {
                dt: state.dt,
                dt_min: state.dt_min,
            });
        }
        let dt = self.cutback_factor_at_failure * state.dt;
        let dt = if dt >= state.dt_min { dt } else { state.dt_min };
        diag!(
            state,
            "[{}] solve failed, cutting dt back from {} to {}",
            self.name,
            state.dt,
            dt
        );
        Ok(dt)
    }
}

/// Clamps `dt` to the step-size bounds, the end time, and the next sync time.
///
/// A step ending within `timestep_tolerance` of the end time is snapped onto
/// it. Half-transient runs only apply the bounds. Returns `true` exactly when
/// the step was shortened to land on a sync time.
pub(crate) fn constrain_to_bounds(
    name: &str,
    state: &StepState,
    dt: &mut f64,
) -> Result<bool, Error> {
    if *dt > state.dt_max {
        *dt = state.dt_max;
        diag!(state, "[{name}] limiting dt to dtmax: {dt}");
    }

    if *dt < state.dt_min {
        *dt = state.dt_min;
        diag!(state, "[{name}] increasing dt to dtmin: {dt}");
    }

    if state.half_transient {
        return Ok(false);
    }

    let overshoot = state.time + *dt - state.end_time;
    if overshoot > 0.0 || overshoot.abs() < state.timestep_tolerance {
        *dt = state.end_time - state.time;
        diag!(state, "[{name}] limiting dt for end time {}: {dt}", state.end_time);
    }

    if let Some(sync_time) = state.sync_times.first()
        && state.time + *dt + state.timestep_tolerance >= sync_time
    {
        *dt = sync_time - state.time;
        if *dt <= 0.0 {
            return Err(Error::NonPositiveSyncDt {
                sync_time,
                time: state.time,
                dt: *dt,
            });
        }
        diag!(state, "[{name}] limiting dt for sync time {sync_time}: {dt}");
        return Ok(true);
    }

    Ok(false)
}

/// A named time-step policy together with its bookkeeping.
#[derive(Debug)]
pub struct TimeStepper {
    core: StepperCore,
    policy: Policy,
}

impl TimeStepper {
    /// Wraps a policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the common parameters are invalid.
    pub fn new(name: impl Into<String>, common: CommonParams, policy: Policy) -> Result<Self, Error> {
        let name = name.into();
        common.validate(&name)?;
        Ok(Self {
            core: StepperCore::new(name, common),
            policy,
        })
    }

    /// Builds a stepper from its configuration block.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is invalid or a sequence file cannot be read.
    pub fn from_config(name: impl Into<String>, config: &StepperConfig) -> Result<Self, Error> {
        let name = name.into();
        let policy = Policy::from_params(&name, &config.policy)?;
        Self::new(name, config.common, policy)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.core.name()
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.policy.kind()
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn policy_mut(&mut self) -> &mut Policy {
        &mut self.policy
    }

    /// The step size computed by the last call to [`TimeStepper::compute_step`].
    #[must_use]
    pub fn current_dt(&self) -> f64 {
        self.core.current_dt
    }

    /// Number of solve attempts that were not accepted.
    #[must_use]
    pub fn num_failures(&self) -> usize {
        self.core.failure_count
    }

    /// Whether the last solve attempt is considered converged.
    #[must_use]
    pub fn converged(&self) -> bool {
        self.policy.converged().unwrap_or(self.core.converged)
    }

    /// Validates the configuration against the executioner and prepares internal state.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the policy cannot run with this executioner.
    pub fn init(&mut self, ctx: &mut Context<'_>) -> Result<(), Error> {
        self.policy.init(&self.core, ctx)
    }

    /// Called once before the time loop starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy fails to prepare.
    pub fn pre_execute(&mut self, ctx: &mut Context<'_>) -> Result<(), Error> {
        let state = &mut *ctx.state;
        state
            .sync_times
            .drain_through(state.time + state.timestep_tolerance);
        self.policy.pre_execute(&self.core, ctx)
    }

    /// Computes the step size for the next step and stores it as the current dt.
    ///
    /// The first two steps (and the first step after a requested reset) use the
    /// policy's initial dt; afterwards the regular or failed dt is used depending
    /// on whether the last attempt converged.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy fails or produces a non-positive step.
    pub fn compute_step(&mut self, ctx: &mut Context<'_>) -> Result<(), Error> {
        let converged = self.converged();
        let initial = ctx.state.step < 2 || (self.core.reset_dt && !self.core.has_reset_dt);

        let dt = if initial {
            self.core.has_reset_dt = true;
            if converged {
                self.policy.compute_initial_dt(&self.core, ctx)?
            } else {
                self.policy.compute_failed_dt(&self.core, ctx)?
            }
        } else if converged {
            self.policy.compute_dt(&self.core, ctx)?
        } else {
            self.policy.compute_failed_dt(&self.core, ctx)?
        };

        let dt = TimeIncrement::new(dt).map_err(|source| Error::NonPositiveDt {
            stepper: self.core.name.clone(),
            source,
        })?;
        self.core.current_dt = dt.get();
        Ok(())
    }

    /// Limits `dt` to the executioner bounds, sync times, and policy constraints.
    ///
    /// Returns `true` when the step was shortened to land on a sync time.
    ///
    /// # Errors
    ///
    /// Returns an error if landing on a sync time yields a non-positive step
    /// or a policy constraint cannot be evaluated.
    pub fn constrain_step(&mut self, ctx: &mut Context<'_>, dt: &mut f64) -> Result<bool, Error> {
        let at_sync_point = constrain_to_bounds(&self.core.name, ctx.state, dt)?;
        let policy_sync = self.policy.constrain_step(&self.core, ctx, dt)?;
        Ok(at_sync_point || policy_sync)
    }

    /// Records the outcome of a solve attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy cannot judge the attempt.
    pub fn step(&mut self, ctx: &mut Context<'_>, report: &SolveReport) -> Result<(), Error> {
        let converged = self.policy.verdict(&self.core, ctx, report)?;
        self.core.converged = converged;
        if !converged {
            self.core.failure_count += 1;
            diag!(
                ctx.state,
                "[{}] step at time {} with dt {} not accepted ({} failures)",
                self.core.name,
                ctx.state.time,
                ctx.state.dt,
                self.core.failure_count
            );
        }
        Ok(())
    }

    /// Lets the policy record an attempt whose outcome is decided elsewhere.
    ///
    /// Neither the convergence flag nor the failure count change.
    pub(crate) fn observe(&mut self, ctx: &mut Context<'_>, report: &SolveReport) -> Result<(), Error> {
        self.policy.observe(&self.core, ctx, report)
    }

    /// Called after a converged step is accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy fails to update.
    pub fn accept_step(&mut self, ctx: &mut Context<'_>) -> Result<(), Error> {
        let state = &mut *ctx.state;
        state
            .sync_times
            .drain_through(state.time + state.timestep_tolerance);
        self.policy.accept_step(&self.core, ctx)
    }

    /// Lets the policy update its history from a step it did not propose.
    pub(crate) fn record_accepted(&mut self, ctx: &mut Context<'_>) -> Result<(), Error> {
        self.policy.record_accepted(&self.core, ctx)
    }

    /// Called after a failed step is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the policy fails to update.
    pub fn reject_step(&mut self, ctx: &mut Context<'_>) -> Result<(), Error> {
        self.policy.reject_step(&self.core, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use stride_core::SyncTimes;

    use crate::policy::{ConstantDt, ConstantParams};

    fn constant(dt: f64) -> TimeStepper {
        let policy = Policy::Constant(
            ConstantDt::new(
                "constant",
                ConstantParams {
                    dt,
                    growth_factor: 2.0,
                },
            )
            .unwrap(),
        );
        TimeStepper::new("constant", CommonParams::default(), policy).unwrap()
    }

    fn state() -> StepState {
        let mut state = StepState::new(0.0, 10.0, 0.1, 2.0);
        state.step = 1;
        state
    }

    #[test]
    fn clamps_to_dt_max_and_dt_min() {
        let mut state = state();
        let mut stepper = constant(1.0);
        let mut ctx = Context::new(&mut state, &());

        let mut dt = 5.0;
        assert!(!stepper.constrain_step(&mut ctx, &mut dt).unwrap());
        assert_relative_eq!(dt, 2.0);

        let mut dt = 0.01;
        stepper.constrain_step(&mut ctx, &mut dt).unwrap();
        assert_relative_eq!(dt, 0.1);
    }

    #[test]
    fn clamps_to_end_time_unless_half_transient() {
        let mut state = state();
        state.time = 9.5;
        let mut stepper = constant(1.0);

        let mut dt = 1.0;
        stepper
            .constrain_step(&mut Context::new(&mut state, &()), &mut dt)
            .unwrap();
        assert_relative_eq!(dt, 0.5);

        state.half_transient = true;
        let mut dt = 1.0;
        stepper
            .constrain_step(&mut Context::new(&mut state, &()), &mut dt)
            .unwrap();
        assert_relative_eq!(dt, 1.0);
    }

    #[test]
    fn snaps_onto_end_time_within_tolerance() {
        let mut state = state();
        state.time = 9.0;
        state.timestep_tolerance = 1e-6;
        let mut stepper = constant(1.0);

        let mut dt = 1.0 - 5e-7;
        stepper
            .constrain_step(&mut Context::new(&mut state, &()), &mut dt)
            .unwrap();
        assert_eq!(state.time + dt, 10.0);

        let mut dt = 0.9;
        stepper
            .constrain_step(&mut Context::new(&mut state, &()), &mut dt)
            .unwrap();
        assert_relative_eq!(dt, 0.9);
    }

    #[test]
    fn half_transient_ignores_sync_times() {
        let mut state = state();
        state.time = 1.0;
        state.half_transient = true;
        state.sync_times = SyncTimes::from_times([1.5]).unwrap();
        let mut stepper = constant(1.0);

        let mut dt = 1.0;
        let hit = stepper
            .constrain_step(&mut Context::new(&mut state, &()), &mut dt)
            .unwrap();
        assert!(!hit);
        assert_relative_eq!(dt, 1.0);
    }

    #[test]
    fn lands_on_sync_time() {
        let mut state = state();
        state.time = 1.0;
        state.sync_times = SyncTimes::from_times([1.5, 4.0]).unwrap();
        let mut stepper = constant(1.0);

        let mut dt = 1.0;
        let hit = stepper
            .constrain_step(&mut Context::new(&mut state, &()), &mut dt)
            .unwrap();
        assert!(hit);
        assert_relative_eq!(dt, 0.5);
    }

    #[test]
    fn sync_time_in_the_past_is_an_error() {
        let mut state = state();
        state.time = 2.0;
        state.sync_times = SyncTimes::from_times([1.0]).unwrap();
        let mut stepper = constant(1.0);

        let mut dt = 1.0;
        let result = stepper.constrain_step(&mut Context::new(&mut state, &()), &mut dt);
        assert!(matches!(result, Err(Error::NonPositiveSyncDt { .. })));
    }

    #[test]
    fn constrain_is_idempotent() {
        let mut state = state();
        state.time = 9.2;
        state.sync_times = SyncTimes::from_times([9.6]).unwrap();
        let mut stepper = constant(1.0);

        let mut first = 1.7;
        let first_hit = stepper
            .constrain_step(&mut Context::new(&mut state, &()), &mut first)
            .unwrap();
        let mut second = 1.7;
        let second_hit = stepper
            .constrain_step(&mut Context::new(&mut state, &()), &mut second)
            .unwrap();

        assert_eq!(first_hit, second_hit);
        assert_relative_eq!(first, second);
        assert_eq!(state.sync_times.len(), 1);
    }

    #[test]
    fn failed_dt_decreases_until_dt_min() {
        let mut state = state();
        state.step = 3;
        let mut stepper = constant(1.0);
        let mut previous = 1.0;
        state.dt = previous;

        let error = loop {
            let mut ctx = Context::new(&mut state, &());
            stepper.step(&mut ctx, &SolveReport::failed()).unwrap();
            match stepper.compute_step(&mut ctx) {
                Ok(()) => {
                    let dt = stepper.current_dt();
                    assert!(dt < previous);
                    assert!(dt >= ctx.state.dt_min);
                    previous = dt;
                    ctx.state.dt = dt;
                }
                Err(error) => break error,
            }
        };

        assert!(matches!(error, Error::AtMinimumDt { .. }));
        assert_relative_eq!(previous, 0.1);
        assert_eq!(stepper.num_failures(), 5);
    }

    #[test]
    fn accept_drops_passed_sync_times() {
        let mut state = state();
        state.sync_times = SyncTimes::from_times([0.5, 1.0, 3.0]).unwrap();
        state.time = 1.0;
        let mut stepper = constant(1.0);

        stepper
            .accept_step(&mut Context::new(&mut state, &()))
            .unwrap();
        assert_eq!(state.sync_times.first(), Some(3.0));
    }

    #[test]
    fn rejects_invalid_cutback_factor() {
        let policy = Policy::Constant(
            ConstantDt::new(
                "c",
                ConstantParams {
                    dt: 1.0,
                    growth_factor: 2.0,
                },
            )
            .unwrap(),
        );
        let common = CommonParams {
            cutback_factor_at_failure: 1.5,
            reset_dt: false,
        };
        assert!(matches!(
            TimeStepper::new("c", common, policy),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn reset_dt_recomputes_initial_once() {
        let policy = Policy::Constant(
            ConstantDt::new(
                "c",
                ConstantParams {
                    dt: 1.0,
                    growth_factor: 10.0,
                },
            )
            .unwrap(),
        );
        let common = CommonParams {
            reset_dt: true,
            ..CommonParams::default()
        };
        let mut stepper = TimeStepper::new("c", common, policy).unwrap();
        let mut state = state();
        state.step = 7;

        stepper
            .compute_step(&mut Context::new(&mut state, &()))
            .unwrap();
        assert_relative_eq!(stepper.current_dt(), 1.0);
    }
}
