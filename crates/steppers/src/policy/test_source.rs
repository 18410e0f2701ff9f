use serde::{Deserialize, Serialize};

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of [`TestSourceStepper`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestSourceParams {
    pub dt: f64,
}

/// Always proposes the same step; used to exercise compositions.
#[derive(Debug, Clone)]
pub struct TestSourceStepper {
    dt: f64,
}

impl TestSourceStepper {
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if `dt` is not positive.
    pub fn new(name: &str, params: TestSourceParams) -> Result<Self, Error> {
        if !(params.dt > 0.0 && params.dt.is_finite()) {
            return Err(Error::invalid(name, format!("dt must be positive, got {}", params.dt)));
        }
        Ok(Self { dt: params.dt })
    }
}

impl Rule for TestSourceStepper {
    fn compute_initial_dt(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<f64, Error> {
        Ok(self.dt)
    }

    fn compute_dt(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<f64, Error> {
        Ok(self.dt)
    }
}
