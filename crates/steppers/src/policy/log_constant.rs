use serde::{Deserialize, Serialize};

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of [`LogConstantDt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConstantParams {
    /// Step size of the first step.
    pub first_dt: f64,

    /// Spacing of consecutive times in `log10(time)`.
    pub log_dt: f64,

    /// Limits recovery after a cutback to this factor per step.
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
}

fn default_growth_factor() -> f64 {
    2.0
}

/// Steps at constant spacing in `log10(time)`.
#[derive(Debug, Clone)]
pub struct LogConstantDt {
    params: LogConstantParams,
    factor: f64,
}

impl LogConstantDt {
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for non-positive parameters.
    pub fn new(name: &str, params: LogConstantParams) -> Result<Self, Error> {
        if !(params.first_dt > 0.0) {
            return Err(Error::invalid(name, "first_dt must be positive"));
        }
        if !(params.log_dt > 0.0) {
            return Err(Error::invalid(name, "log_dt must be positive"));
        }
        if !(params.growth_factor >= 1.0) {
            return Err(Error::invalid(name, "growth_factor must be at least 1"));
        }
        Ok(Self {
            factor: 10f64.powf(params.log_dt),
            params,
        })
    }
}

impl Rule for LogConstantDt {
    fn compute_initial_dt(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<f64, Error> {
        Ok(self.params.first_dt)
    }

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        let time = ctx.state.time;
        if time <= 0.0 {
            return Err(Error::NonPositiveLogTime {
                stepper: core.name().to_owned(),
                time,
            });
        }
        let target = self.factor * time - time;
        Ok(target.min(self.params.growth_factor * core.current_dt()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use stride_core::StepState;

    use crate::{CommonParams, Policy, TimeStepper};

    fn stepper(first_dt: f64) -> TimeStepper {
        let policy = LogConstantDt::new(
            "log",
            LogConstantParams {
                first_dt,
                log_dt: 1.0,
                growth_factor: 2.0,
            },
        )
        .unwrap();
        TimeStepper::new("log", CommonParams::default(), Policy::LogConstant(policy)).unwrap()
    }

    fn dt_at_ten(first_dt: f64) -> f64 {
        let mut stepper = stepper(first_dt);
        let mut state = StepState::new(0.0, 1000.0, 1e-6, 1000.0);
        state.step = 1;
        let mut ctx = Context::new(&mut state, &());
        stepper.compute_step(&mut ctx).unwrap();

        ctx.state.step = 2;
        ctx.state.time = 10.0;
        stepper.compute_step(&mut ctx).unwrap();
        stepper.current_dt()
    }

    #[test]
    fn spacing_is_constant_in_log_time() {
        assert_relative_eq!(dt_at_ten(50.0), 90.0, max_relative = 1e-12);
    }

    #[test]
    fn growth_is_capped_after_a_small_step() {
        assert_relative_eq!(dt_at_ten(20.0), 40.0);
    }

    #[test]
    fn requires_positive_time() {
        let mut stepper = stepper(1.0);
        let mut state = StepState::new(0.0, 10.0, 1e-6, 10.0);
        state.step = 2;
        assert!(matches!(
            stepper.compute_step(&mut Context::new(&mut state, &())),
            Err(Error::NonPositiveLogTime { .. })
        ));
    }
}
