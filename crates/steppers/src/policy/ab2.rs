//! Step-size control from a local truncation error estimate.
//!
//! After each converged solve the solution is compared with a second-order
//! Adams-Bashforth prediction built from the last three accepted solutions.
//! The difference, scaled for the active time integration scheme, estimates the
//! local truncation error.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use stride_core::{SolveReport, TimeScheme};

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of [`Ab2PredictorCorrector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ab2Params {
    /// Initial step size.
    pub dt: f64,

    /// Target error, relative to the infinity norm of the solution.
    pub e_tol: f64,

    /// Steps with an error estimate at or above this value are rejected.
    pub e_max: f64,

    /// Largest factor by which dt may grow in one step.
    pub max_increase: f64,

    #[serde(default = "default_steps_between_increase")]
    pub steps_between_increase: usize,

    /// Steps taken before the step size starts adapting.
    #[serde(default = "default_start_adapting")]
    pub start_adapting: usize,

    #[serde(default = "default_scaling_parameter")]
    pub scaling_parameter: f64,
}

fn default_steps_between_increase() -> usize {
    1
}

fn default_start_adapting() -> usize {
    2
}

fn default_scaling_parameter() -> f64 {
    0.8
}

/// An accepted solution and the step size that produced it.
#[derive(Debug, Clone)]
struct Snapshot {
    solution: Vec<f64>,
    dt: f64,
}

/// Adapts the step size to an Adams-Bashforth-2 error estimate.
#[derive(Debug, Clone)]
pub struct Ab2PredictorCorrector {
    params: Ab2Params,
    history: VecDeque<Snapshot>,
    pending: Option<Vec<f64>>,
    error: Option<f64>,
    steps_taken: usize,
}

impl Ab2PredictorCorrector {
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for non-positive tolerances or factors.
    pub fn new(name: &str, params: Ab2Params) -> Result<Self, Error> {
        let positive = [
            ("dt", params.dt),
            ("e_tol", params.e_tol),
            ("e_max", params.e_max),
            ("max_increase", params.max_increase),
            ("scaling_parameter", params.scaling_parameter),
        ];
        if let Some((field, value)) = positive.iter().find(|(_, v)| !(*v > 0.0 && v.is_finite())) {
            return Err(Error::invalid(name, format!("{field} must be positive, got {value}")));
        }
        if params.steps_between_increase == 0 {
            return Err(Error::invalid(name, "steps_between_increase must be at least 1"));
        }
        Ok(Self {
            params,
            history: VecDeque::with_capacity(3),
            pending: None,
            error: None,
            steps_taken: 0,
        })
    }

    /// The most recent error estimate.
    #[must_use]
    pub fn error(&self) -> Option<f64> {
        self.error
    }

    /// The Adams-Bashforth-2 prediction for a step of size `dt`, if enough history exists.
    fn predict(&self, dt: f64) -> Option<Vec<f64>> {
        let [u_n, u_1, u_2] = [self.history.front()?, self.history.get(1)?, self.history.get(2)?];
        let ratio = dt / u_n.dt;
        let prediction = u_n
            .solution
            .iter()
            .zip(&u_1.solution)
            .zip(&u_2.solution)
            .map(|((&n, &n1), &n2)| {
                let udot = (n - n1) / u_n.dt;
                let udot_old = (n1 - n2) / u_1.dt;
                n + 0.5 * dt * ((2.0 + ratio) * udot - ratio * udot_old)
            })
            .collect();
        Some(prediction)
    }

    /// Scales the predictor difference into a truncation error estimate.
    fn estimate(
        &self,
        core: &StepperCore,
        scheme: TimeScheme,
        dt: f64,
        solution: &[f64],
    ) -> Result<Option<f64>, Error> {
        let Some(prediction) = self.predict(dt) else {
            return Ok(None);
        };
        let Some(dt_old) = self.history.front().map(|s| s.dt) else {
            return Ok(None);
        };

        let difference = solution
            .iter()
            .zip(&prediction)
            .map(|(u, p)| (u - p).powi(2))
            .sum::<f64>()
            .sqrt();

        let scale = match scheme {
            TimeScheme::ImplicitEuler => dt / (dt + dt_old),
            TimeScheme::CrankNicolson => dt / (3.0 * (dt + dt_old)),
            TimeScheme::Bdf2 => {
                let top = 2.0 * (dt + dt_old).powi(2);
                let bottom = 6.0 * dt * dt + 12.0 * dt * dt_old + 5.0 * dt_old * dt_old;
                top / bottom
            }
            TimeScheme::ExplicitEuler => {
                return Err(Error::invalid(
                    core.name(),
                    "no error estimate for the explicit Euler scheme",
                ));
            }
        };
        Ok(Some(scale * difference))
    }
}

impl Rule for Ab2PredictorCorrector {
    fn init(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        if ctx.state.scheme == TimeScheme::ExplicitEuler {
            return Err(Error::invalid(
                core.name(),
                "requires implicit Euler, Crank-Nicolson or BDF2 time integration",
            ));
        }
        Ok(())
    }

    fn compute_initial_dt(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<f64, Error> {
        Ok(self.params.dt)
    }

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        let dt = ctx.state.dt;
        if ctx.state.step <= self.params.start_adapting {
            return Ok(dt);
        }

        self.steps_taken += 1;
        if self.steps_taken < self.params.steps_between_increase {
            return Ok(dt);
        }
        self.steps_taken = 0;

        let max_dt = dt * self.params.max_increase;
        let Some(error) = self.error.filter(|&e| e > 0.0) else {
            return Ok(max_dt);
        };
        let infnorm = self
            .history
            .front()
            .map_or(0.0, |s| s.solution.iter().fold(0.0, |m: f64, u| m.max(u.abs())));

        let new_dt = dt * self.params.scaling_parameter * (infnorm * self.params.e_tol / error).cbrt();
        let new_dt = new_dt.min(max_dt);
        diag!(
            ctx.state,
            "[{}] error estimate {error}, solution norm {infnorm}, new dt {new_dt}",
            core.name()
        );
        Ok(new_dt)
    }

    fn verdict(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
        report: &SolveReport,
    ) -> Result<bool, Error> {
        self.pending = None;
        if !report.converged {
            self.steps_taken = 0;
            return Ok(false);
        }
        if report.solution.is_empty() {
            return Err(Error::MissingSolution {
                stepper: core.name().to_owned(),
            });
        }

        let estimate = self.estimate(core, ctx.state.scheme, ctx.state.dt, &report.solution)?;
        if let Some(error) = estimate {
            self.error = Some(error);
            if error >= self.params.e_max {
                diag!(
                    ctx.state,
                    "[{}] rejecting step: error estimate {error} >= e_max {}",
                    core.name(),
                    self.params.e_max
                );
                self.steps_taken = 0;
                return Ok(false);
            }
        }
        self.pending = Some(report.solution.clone());
        Ok(true)
    }

    fn observe(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
        report: &SolveReport,
    ) -> Result<(), Error> {
        self.verdict(core, ctx, report)?;
        if report.converged {
            self.pending = Some(report.solution.clone());
        }
        Ok(())
    }

    fn accept_step(&mut self, _core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        if let Some(solution) = self.pending.take() {
            self.history.push_front(Snapshot {
                solution,
                dt: ctx.state.dt,
            });
            self.history.truncate(3);
        }
        Ok(())
    }

    fn record_accepted(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        self.accept_step(core, ctx)
    }
}
