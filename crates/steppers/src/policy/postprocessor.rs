use serde::{Deserialize, Serialize};

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of [`PostprocessorDt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostprocessorParams {
    /// The postprocessor that provides the step size.
    pub postprocessor: String,

    /// Step size for the first step; the postprocessor value if absent.
    #[serde(default)]
    pub dt: Option<f64>,

    #[serde(default = "default_scale")]
    pub scale: f64,

    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// Takes the step size from a postprocessor, as `scale * value + offset`.
#[derive(Debug, Clone)]
pub struct PostprocessorDt {
    params: PostprocessorParams,
}

impl PostprocessorDt {
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] if the initial dt is not positive.
    pub fn new(name: &str, params: PostprocessorParams) -> Result<Self, Error> {
        if let Some(dt) = params.dt
            && !(dt > 0.0 && dt.is_finite())
        {
            return Err(Error::invalid(name, format!("dt must be positive, got {dt}")));
        }
        Ok(Self { params })
    }
}

impl Rule for PostprocessorDt {
    fn compute_initial_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        match self.params.dt {
            Some(dt) => Ok(dt),
            None => self.compute_dt(core, ctx),
        }
    }

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        let name = &self.params.postprocessor;
        let value = ctx
            .values
            .postprocessor(name)
            .ok_or_else(|| Error::UnknownPostprocessor {
                stepper: core.name().to_owned(),
                name: name.clone(),
            })?;
        Ok(self.params.scale * value + self.params.offset)
    }
}
