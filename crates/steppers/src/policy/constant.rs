use serde::{Deserialize, Serialize};

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of [`ConstantDt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantParams {
    /// The step size.
    pub dt: f64,

    /// Limits recovery after a cutback to this factor per step.
    #[serde(default = "default_growth_factor")]
    pub growth_factor: f64,
}

fn default_growth_factor() -> f64 {
    2.0
}

/// A constant step size that recovers gradually after a cutback.
#[derive(Debug, Clone)]
pub struct ConstantDt {
    params: ConstantParams,
}

impl ConstantDt {
    /// Creates a constant policy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `dt` is not positive or the
    /// growth factor is below one.
    pub fn new(name: &str, params: ConstantParams) -> Result<Self, Error> {
        if !(params.dt > 0.0 && params.dt.is_finite()) {
            return Err(Error::invalid(name, format!("dt must be positive, got {}", params.dt)));
        }
        if !(params.growth_factor >= 1.0) {
            return Err(Error::invalid(
                name,
                format!("growth_factor must be at least 1, got {}", params.growth_factor),
            ));
        }
        Ok(Self { params })
    }

    #[must_use]
    pub fn params(&self) -> &ConstantParams {
        &self.params
    }
}

impl Rule for ConstantDt {
    fn compute_initial_dt(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<f64, Error> {
        Ok(self.params.dt)
    }

    fn compute_dt(&mut self, core: &StepperCore, _ctx: &mut Context<'_>) -> Result<f64, Error> {
        Ok(self.params.dt.min(self.params.growth_factor * core.current_dt()))
    }
}
