use serde::{Deserialize, Serialize};

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of [`FixedPointIterationAdaptiveDt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedPointParams {
    pub dt_initial: f64,

    /// Target number of fixed-point iterations.
    pub target_iterations: usize,

    #[serde(default = "default_target_window")]
    pub target_window: usize,

    #[serde(default = "default_increase_factor")]
    pub increase_factor: f64,

    #[serde(default = "default_decrease_factor")]
    pub decrease_factor: f64,
}

fn default_target_window() -> usize {
    1
}

fn default_increase_factor() -> f64 {
    1.2
}

fn default_decrease_factor() -> f64 {
    0.8
}

/// Adapts the step size to the number of fixed-point (coupling) iterations.
///
/// The previous step and its iteration count are read from the executioner
/// state, so the policy keeps no history of its own.
#[derive(Debug, Clone)]
pub struct FixedPointIterationAdaptiveDt {
    params: FixedPointParams,
}

impl FixedPointIterationAdaptiveDt {
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for non-positive dt or factors.
    pub fn new(name: &str, params: FixedPointParams) -> Result<Self, Error> {
        if !(params.dt_initial > 0.0) {
            return Err(Error::invalid(name, "dt_initial must be positive"));
        }
        if !(params.increase_factor >= 1.0) {
            return Err(Error::invalid(name, "increase_factor must be at least 1"));
        }
        if !(params.decrease_factor > 0.0 && params.decrease_factor <= 1.0) {
            return Err(Error::invalid(name, "decrease_factor must be in (0, 1]"));
        }
        Ok(Self { params })
    }

    fn window(&self) -> (i64, usize) {
        let target = self.params.target_iterations;
        let window = self.params.target_window;
        let low = i64::try_from(target).unwrap_or(i64::MAX) - i64::try_from(window).unwrap_or(i64::MAX);
        (low, target + window)
    }
}

impl Rule for FixedPointIterationAdaptiveDt {
    fn init(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        let Some(bounds) = ctx.state.fixed_point else {
            return Err(Error::FixedPointUnsupported {
                stepper: core.name().to_owned(),
            });
        };
        let (low, high) = self.window();
        let below = usize::try_from(low).map_or(true, |low| low < bounds.min_iterations);
        if below || high > bounds.max_iterations {
            return Err(Error::FixedPointWindow {
                low,
                high,
                min: bounds.min_iterations,
                max: bounds.max_iterations,
            });
        }
        Ok(())
    }

    fn compute_initial_dt(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<f64, Error> {
        Ok(self.params.dt_initial)
    }

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        let (low, high) = self.window();
        let iterations = ctx.state.iterations.fixed_point;
        let mut dt = ctx.state.dt;
        if iterations > high {
            dt *= self.params.decrease_factor;
            diag!(
                ctx.state,
                "[{}] decreasing dt: {iterations} fixed-point iterations > {high}",
                core.name()
            );
        } else if i64::try_from(iterations).is_ok_and(|its| its < low) {
            dt *= self.params.increase_factor;
            diag!(
                ctx.state,
                "[{}] increasing dt: {iterations} fixed-point iterations < {low}",
                core.name()
            );
        }
        Ok(dt)
    }
}
