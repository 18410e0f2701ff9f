//! Step-size adaptation driven by solver iteration counts.
//!
//! The step grows when the previous solve needed fewer nonlinear and linear
//! iterations than the optimal window and shrinks when it needed more. On top
//! of that the step can be limited by postprocessor values, by the change of
//! functions of time over the step, and by a tabulated dt schedule.

use serde::{Deserialize, Serialize};
use stride_core::{PiecewiseLinear, SolveReport};

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of [`IterationAdaptiveDt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationAdaptiveParams {
    /// The initial step size. Optional when a `time_t`/`time_dt` schedule is given.
    pub dt: Option<f64>,

    /// Target number of nonlinear iterations; enables iteration-based adaptivity.
    pub optimal_iterations: Option<usize>,

    /// Half-width of the accepted iteration window; defaults to `ceil(optimal / 5)`.
    pub iteration_window: Option<usize>,

    /// Scales the nonlinear thresholds into linear-iteration thresholds.
    pub linear_iteration_ratio: usize,

    pub growth_factor: f64,
    pub cutback_factor: f64,

    /// Postprocessors whose minimum value caps the step.
    pub timestep_limiting_postprocessor: Vec<String>,

    /// Functions whose change over one step is limited by `max_function_change`.
    pub timestep_limiting_function: Vec<String>,

    pub max_function_change: Option<f64>,

    /// Land exactly on every knot of the piecewise-linear limiting functions.
    pub force_step_every_function_point: bool,

    /// Step size used right after landing on a function knot.
    pub post_function_sync_dt: Option<f64>,

    /// Times of a piecewise-linear dt schedule.
    pub time_t: Vec<f64>,

    /// Step sizes of the dt schedule at `time_t`.
    pub time_dt: Vec<f64>,

    /// Mark converged steps as failed when the postprocessor limit becomes much smaller.
    pub reject_large_step: bool,

    pub reject_large_step_threshold: f64,
}

impl Default for IterationAdaptiveParams {
    fn default() -> Self {
        Self {
            dt: None,
            optimal_iterations: None,
            iteration_window: None,
            linear_iteration_ratio: 25,
            growth_factor: 2.0,
            cutback_factor: 0.5,
            timestep_limiting_postprocessor: Vec::new(),
            timestep_limiting_function: Vec::new(),
            max_function_change: None,
            force_step_every_function_point: false,
            post_function_sync_dt: None,
            time_t: Vec::new(),
            time_dt: Vec::new(),
            reject_large_step: false,
            reject_large_step_threshold: 0.1,
        }
    }
}

/// Iteration thresholds derived from the optimal iteration count and window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Thresholds {
    growth_nl: usize,
    shrink_nl: usize,
    growth_l: usize,
    shrink_l: usize,
}

impl Thresholds {
    fn new(optimal: usize, window: usize, linear_ratio: usize) -> Self {
        let growth_nl = optimal.saturating_sub(window);
        let shrink_nl = optimal + window;
        Self {
            growth_nl,
            shrink_nl,
            growth_l: linear_ratio * growth_nl,
            shrink_l: linear_ratio * shrink_nl,
        }
    }
}

/// Adapts the step size to nonlinear and linear iteration counts.
#[derive(Debug, Clone)]
pub struct IterationAdaptiveDt {
    params: IterationAdaptiveParams,
    thresholds: Option<Thresholds>,
    schedule: Option<PiecewiseLinear>,
    schedule_times: Vec<f64>,
    dt_old: f64,
    nl_its: usize,
    l_its: usize,
    cutback_occurred: bool,
    sync_last_step: bool,
    tfunc_last_step: bool,
    at_function_point: bool,
    post_function_sync: bool,
}

impl IterationAdaptiveDt {
    /// Creates the policy, validating parameter combinations.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for inconsistent parameters.
    pub fn new(name: &str, params: IterationAdaptiveParams) -> Result<Self, Error> {
        if let Some(dt) = params.dt
            && !(dt > 0.0 && dt.is_finite())
        {
            return Err(Error::invalid(name, format!("dt must be positive, got {dt}")));
        }
        if !(params.growth_factor > 0.0) {
            return Err(Error::invalid(name, "growth_factor must be positive"));
        }
        if !(params.cutback_factor > 0.0 && params.cutback_factor <= 1.0) {
            return Err(Error::invalid(name, "cutback_factor must be in (0, 1]"));
        }
        if params.iteration_window.is_some() && params.optimal_iterations.is_none() {
            return Err(Error::invalid(
                name,
                "iteration_window can only be used with optimal_iterations",
            ));
        }
        if !params.timestep_limiting_function.is_empty() && params.max_function_change.is_none() {
            return Err(Error::invalid(
                name,
                "max_function_change is required with timestep_limiting_function",
            ));
        }
        if params.reject_large_step && params.timestep_limiting_postprocessor.is_empty() {
            return Err(Error::invalid(
                name,
                "reject_large_step requires timestep_limiting_postprocessor",
            ));
        }
        if !(params.reject_large_step_threshold > 0.0 && params.reject_large_step_threshold < 1.0) {
            return Err(Error::invalid(name, "reject_large_step_threshold must be in (0, 1)"));
        }

        let schedule = if params.time_t.is_empty() && params.time_dt.is_empty() {
            None
        } else {
            let table = PiecewiseLinear::new(params.time_t.clone(), params.time_dt.clone())
                .map_err(|error| Error::invalid(name, format!("time_t/time_dt: {error}")))?;
            Some(table)
        };
        if params.dt.is_none() && schedule.is_none() {
            return Err(Error::invalid(name, "either dt or time_t/time_dt must be given"));
        }

        let thresholds = params.optimal_iterations.map(|optimal| {
            let window = params
                .iteration_window
                .unwrap_or_else(|| optimal.div_ceil(5));
            Thresholds::new(optimal, window, params.linear_iteration_ratio)
        });

        Ok(Self {
            schedule_times: params.time_t.clone(),
            params,
            thresholds,
            schedule,
            dt_old: 0.0,
            nl_its: 0,
            l_its: 0,
            cutback_occurred: false,
            sync_last_step: false,
            tfunc_last_step: false,
            at_function_point: false,
            post_function_sync: false,
        })
    }

    #[must_use]
    pub fn params(&self) -> &IterationAdaptiveParams {
        &self.params
    }

    /// The step size this policy treats as the previous one.
    #[must_use]
    pub fn dt_old(&self) -> f64 {
        self.dt_old
    }

    /// Whether the last step landed on a knot of a limiting function.
    #[must_use]
    pub fn at_function_point(&self) -> bool {
        self.at_function_point
    }

    fn adaptive_dt(&self, ctx: &Context<'_>, allow_growth: bool) -> f64 {
        let mut dt = self.dt_old;
        let Some(limits) = self.thresholds else {
            return dt;
        };

        if allow_growth && self.nl_its < limits.growth_nl && self.l_its < limits.growth_l {
            dt = self.dt_old * self.params.growth_factor;
            if let Some(scheduled) = self.schedule_dt(ctx)
                && dt > scheduled
            {
                dt = scheduled;
            }
            diag!(
                ctx.state,
                "growing dt: nl its = {} < {} && lin its = {} < {}, old dt {} new dt {dt}",
                self.nl_its,
                limits.growth_nl,
                self.l_its,
                limits.growth_l,
                self.dt_old
            );
        } else if self.nl_its > limits.shrink_nl || self.l_its > limits.shrink_l {
            dt = self.dt_old * self.params.cutback_factor;
            diag!(
                ctx.state,
                "shrinking dt: nl its = {} > {} || lin its = {} > {}, old dt {} new dt {dt}",
                self.nl_its,
                limits.shrink_nl,
                self.l_its,
                limits.shrink_l,
                self.dt_old
            );
        }
        dt
    }

    /// The scheduled step at the current time, capped by the growth factor.
    fn schedule_dt(&self, ctx: &Context<'_>) -> Option<f64> {
        let schedule = self.schedule.as_ref()?;
        let dt = schedule.sample(ctx.state.time);
        Some(dt.min(self.dt_old * self.params.growth_factor))
    }

    /// The smallest value of the limiting postprocessors, if any are configured.
    fn postprocessor_limit(&self, core: &StepperCore, ctx: &Context<'_>) -> Result<Option<f64>, Error> {
        if self.params.timestep_limiting_postprocessor.is_empty() || ctx.state.step <= 1 {
            return Ok(None);
        }
        let mut limit = f64::INFINITY;
        for name in &self.params.timestep_limiting_postprocessor {
            let value = ctx
                .values
                .postprocessor(name)
                .ok_or_else(|| Error::UnknownPostprocessor {
                    stepper: core.name().to_owned(),
                    name: name.clone(),
                })?;
            if value < 0.0 {
                log::warn!(
                    "[{}] negative timestep limiting postprocessor '{name}': {value}",
                    core.name()
                );
            }
            limit = limit.min(value);
        }
        Ok(Some(limit))
    }

    fn limit_by_postprocessor(
        &self,
        core: &StepperCore,
        ctx: &Context<'_>,
        dt: &mut f64,
    ) -> Result<(), Error> {
        if let Some(limit) = self.postprocessor_limit(core, ctx)?
            && *dt > limit
        {
            *dt = limit.max(ctx.state.dt_min);
            diag!(
                ctx.state,
                "[{}] limiting dt to postprocessor value: {dt}",
                core.name()
            );
        }
        Ok(())
    }

    fn limit_by_function(
        &mut self,
        core: &StepperCore,
        ctx: &Context<'_>,
        dt: &mut f64,
    ) -> Result<(), Error> {
        self.at_function_point = false;
        let Some(max_change) = self.params.max_function_change else {
            return Ok(());
        };

        let state = &*ctx.state;
        let requested = *dt;
        for name in &self.params.timestep_limiting_function {
            let function = ctx
                .values
                .function(name)
                .ok_or_else(|| Error::UnknownFunction {
                    stepper: core.name().to_owned(),
                    name: name.clone(),
                })?;

            if let Some(table) = function.as_piecewise_linear() {
                *dt = crossing_dt(table, state.time, *dt, max_change);

                if self.params.force_step_every_function_point
                    && let Some(&knot) = table
                        .knots()
                        .iter()
                        .find(|&&knot| knot > state.time + state.timestep_tolerance)
                    && state.time + *dt > knot
                {
                    *dt = knot - state.time;
                    self.at_function_point = true;
                }
            } else {
                let start = function.value(state.time);
                while (function.value(state.time + *dt) - start).abs() > max_change
                    && *dt > state.dt_min
                {
                    *dt = (0.5 * *dt).max(state.dt_min);
                }
            }
        }

        if *dt < state.dt_min {
            *dt = state.dt_min;
        }
        if *dt < requested {
            diag!(
                state,
                "[{}] limiting dt to keep function change below {max_change}: {dt}",
                core.name()
            );
        }
        Ok(())
    }
}

/// The largest step from `t0` (at most `dt`) over which `table` changes by at most `max_change`.
fn crossing_dt(table: &PiecewiseLinear, t0: f64, dt: f64, max_change: f64) -> f64 {
    let v0 = table.sample(t0);
    let end = t0 + dt;
    let (mut ta, mut va) = (t0, v0);

    let interior = table.knots().iter().copied().filter(|&t| t > t0 && t < end);
    for tb in interior.chain(std::iter::once(end)) {
        let vb = table.sample(tb);
        if (vb - v0).abs() > max_change {
            let target = v0 + max_change.copysign(vb - v0);
            let t = ta + (target - va) / (vb - va) * (tb - ta);
            return t - t0;
        }
        (ta, va) = (tb, vb);
    }
    dt
}

impl Rule for IterationAdaptiveDt {
    fn init(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        for name in &self.params.timestep_limiting_function {
            if ctx.values.function(name).is_none() {
                return Err(Error::UnknownFunction {
                    stepper: core.name().to_owned(),
                    name: name.clone(),
                });
            }
        }
        Ok(())
    }

    fn pre_execute(&mut self, _core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        let horizon = ctx.state.time + ctx.state.timestep_tolerance;
        self.schedule_times.retain(|&t| t > horizon);
        Ok(())
    }

    fn compute_initial_dt(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
    ) -> Result<f64, Error> {
        self.params
            .dt
            .or_else(|| {
                self.schedule
                    .as_ref()
                    .map(|schedule| schedule.sample(ctx.state.time))
            })
            .ok_or_else(|| Error::invalid(core.name(), "either dt or time_t/time_dt must be given"))
    }

    fn compute_dt(&mut self, _core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        if self.post_function_sync
            && let Some(dt) = self.params.post_function_sync_dt
        {
            self.post_function_sync = false;
            self.sync_last_step = false;
            return Ok(dt);
        }

        let dt = if self.cutback_occurred {
            self.cutback_occurred = false;
            self.adaptive_dt(ctx, false)
        } else if self.tfunc_last_step {
            self.tfunc_last_step = false;
            self.sync_last_step = false;
            let dt = self
                .schedule
                .as_ref()
                .map_or(self.dt_old, |schedule| schedule.sample(ctx.state.time));
            diag!(ctx.state, "setting dt to value specified by schedule: {dt}");
            dt
        } else if self.sync_last_step {
            self.sync_last_step = false;
            diag!(ctx.state, "setting dt to value used before sync: {}", self.dt_old);
            self.dt_old
        } else if self.thresholds.is_some() {
            self.adaptive_dt(ctx, true)
        } else if let Some(dt) = self.schedule_dt(ctx) {
            dt
        } else {
            self.dt_old * self.params.growth_factor
        };
        Ok(dt)
    }

    fn compute_failed_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        self.cutback_occurred = true;
        core.cut_back(ctx.state)
    }

    fn constrain_step(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
        dt: &mut f64,
    ) -> Result<bool, Error> {
        self.limit_by_postprocessor(core, ctx, dt)?;
        self.limit_by_function(core, ctx, dt)?;

        if let Some(&next) = self.schedule_times.first()
            && ctx.state.time + *dt >= next
        {
            *dt = next - ctx.state.time;
            diag!(ctx.state, "[{}] limiting dt to land on schedule time {next}: {dt}", core.name());
        }
        Ok(false)
    }

    fn verdict(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
        report: &SolveReport,
    ) -> Result<bool, Error> {
        if !report.converged {
            return Ok(false);
        }
        if !self.params.reject_large_step {
            return Ok(true);
        }

        let Some(limit) = self.postprocessor_limit(core, ctx)? else {
            return Ok(true);
        };
        let attempted = ctx.state.dt;
        let achievable = attempted.min(limit.max(ctx.state.dt_min));
        if achievable < attempted * self.params.reject_large_step_threshold {
            diag!(
                ctx.state,
                "[{}] rejecting step: dt {attempted} is much larger than the limit {achievable}",
                core.name()
            );
            return Ok(false);
        }
        Ok(true)
    }

    fn accept_step(&mut self, _core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        let state = &*ctx.state;
        let horizon = state.time + state.timestep_tolerance;
        while let Some(&next) = self.schedule_times.first()
            && next <= horizon
        {
            if (state.time - next).abs() <= state.timestep_tolerance {
                self.tfunc_last_step = true;
            }
            self.schedule_times.remove(0);
        }

        self.nl_its = state.iterations.nonlinear;
        self.l_its = state.iterations.linear;

        if (self.at_function_point || state.at_sync_point)
            && state.dt + state.timestep_tolerance < state.unconstrained_dt
        {
            self.dt_old = state.dt_old;
            self.sync_last_step = true;
        } else {
            self.dt_old = state.dt;
        }
        self.post_function_sync = self.at_function_point && self.params.post_function_sync_dt.is_some();
        Ok(())
    }

    fn record_accepted(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        self.accept_step(core, ctx)
    }
}
