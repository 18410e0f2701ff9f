use serde::{Deserialize, Serialize};

use crate::{Context, Error, StepperCore, policy::Rule};

/// Parameters of [`ExplicitCriticalDt`].
///
/// The wave speed is given directly, or derived from a bulk modulus, or from
/// Young's modulus and Poisson's ratio; the moduli require a density.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplicitCriticalParams {
    /// Characteristic element size.
    pub element_size: Option<f64>,

    /// Postprocessor providing the element size, e.g. a minimum element size.
    pub element_size_postprocessor: Option<String>,

    pub wave_speed: Option<f64>,
    pub bulk_modulus: Option<f64>,
    pub youngs_modulus: Option<f64>,
    pub poissons_ratio: Option<f64>,
    pub density: Option<f64>,

    /// Safety factor applied to the critical step.
    pub factor: Option<f64>,

    /// Floor of the computed step.
    pub minimum_dt: f64,
}

/// Source of the dilatational wave speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaveSpeed {
    Given(f64),
    Bulk {
        bulk_modulus: f64,
        density: f64,
    },
    Elastic {
        youngs_modulus: f64,
        poissons_ratio: f64,
        density: f64,
    },
}

impl WaveSpeed {
    #[must_use]
    pub fn value(self) -> f64 {
        match self {
            WaveSpeed::Given(speed) => speed,
            WaveSpeed::Bulk {
                bulk_modulus,
                density,
            } => (bulk_modulus / density).sqrt(),
            WaveSpeed::Elastic {
                youngs_modulus: e,
                poissons_ratio: nu,
                density,
            } => (e * (1.0 - nu) / ((1.0 + nu) * (1.0 - 2.0 * nu) * density)).sqrt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ElementSize {
    Given(f64),
    Postprocessor(String),
}

/// Keeps the step below the stability limit of explicit time integration.
#[derive(Debug, Clone)]
pub struct ExplicitCriticalDt {
    element_size: ElementSize,
    wave_speed: f64,
    factor: f64,
    minimum_dt: f64,
}

impl ExplicitCriticalDt {
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] unless exactly one element size and
    /// one wave speed source are given with physical values.
    pub fn new(name: &str, params: ExplicitCriticalParams) -> Result<Self, Error> {
        let element_size = match (params.element_size, params.element_size_postprocessor) {
            (Some(size), None) if size > 0.0 => ElementSize::Given(size),
            (None, Some(pp)) => ElementSize::Postprocessor(pp),
            (Some(size), None) => {
                return Err(Error::invalid(name, format!("element_size must be positive, got {size}")));
            }
            _ => {
                return Err(Error::invalid(
                    name,
                    "exactly one of element_size and element_size_postprocessor is required",
                ));
            }
        };

        let wave_speed = match (
            params.wave_speed,
            params.bulk_modulus,
            params.youngs_modulus,
            params.poissons_ratio,
        ) {
            (Some(speed), None, None, None) => WaveSpeed::Given(speed),
            (None, Some(bulk_modulus), None, None) => WaveSpeed::Bulk {
                bulk_modulus,
                density: density(name, params.density)?,
            },
            (None, None, Some(youngs_modulus), Some(poissons_ratio)) => {
                if !(poissons_ratio > -1.0 && poissons_ratio < 0.5) {
                    return Err(Error::invalid(name, "poissons_ratio must be in (-1, 0.5)"));
                }
                WaveSpeed::Elastic {
                    youngs_modulus,
                    poissons_ratio,
                    density: density(name, params.density)?,
                }
            }
            _ => {
                return Err(Error::invalid(
                    name,
                    "give wave_speed, bulk_modulus, or youngs_modulus with poissons_ratio",
                ));
            }
        };
        let wave_speed = wave_speed.value();
        if !(wave_speed > 0.0 && wave_speed.is_finite()) {
            return Err(Error::invalid(name, format!("wave speed must be positive, got {wave_speed}")));
        }

        let factor = params.factor.unwrap_or(1.0);
        if !(factor > 0.0) {
            return Err(Error::invalid(name, "factor must be positive"));
        }

        Ok(Self {
            element_size,
            wave_speed,
            factor,
            minimum_dt: params.minimum_dt,
        })
    }

    #[must_use]
    pub fn wave_speed(&self) -> f64 {
        self.wave_speed
    }

    /// The critical step for the current element size.
    fn critical_dt(&self, core: &StepperCore, ctx: &Context<'_>) -> Result<f64, Error> {
        let size = match &self.element_size {
            ElementSize::Given(size) => *size,
            ElementSize::Postprocessor(name) => {
                ctx.values
                    .postprocessor(name)
                    .ok_or_else(|| Error::UnknownPostprocessor {
                        stepper: core.name().to_owned(),
                        name: name.clone(),
                    })?
            }
        };
        Ok((self.factor * size / self.wave_speed).max(self.minimum_dt))
    }
}

fn density(name: &str, density: Option<f64>) -> Result<f64, Error> {
    match density {
        Some(rho) if rho > 0.0 => Ok(rho),
        _ => Err(Error::invalid(name, "a positive density is required with elastic moduli")),
    }
}

impl Rule for ExplicitCriticalDt {
    fn compute_initial_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        self.critical_dt(core, ctx)
    }

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        self.critical_dt(core, ctx)
    }

    fn constrain_step(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
        dt: &mut f64,
    ) -> Result<bool, Error> {
        let critical = self.critical_dt(core, ctx)?;
        if *dt > critical {
            *dt = critical;
            diag!(ctx.state, "[{}] limiting dt to critical step {critical}", core.name());
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use stride_core::{StepState, ValueStore};

    #[test]
    fn wave_speed_sources() {
        assert_relative_eq!(WaveSpeed::Given(3.0).value(), 3.0);
        let bulk = WaveSpeed::Bulk {
            bulk_modulus: 16.0,
            density: 4.0,
        };
        assert_relative_eq!(bulk.value(), 2.0);
        let elastic = WaveSpeed::Elastic {
            youngs_modulus: 1.0,
            poissons_ratio: 0.0,
            density: 1.0,
        };
        assert_relative_eq!(elastic.value(), 1.0);
        let elastic = WaveSpeed::Elastic {
            youngs_modulus: 200.0e9,
            poissons_ratio: 0.25,
            density: 8000.0,
        };
        assert_relative_eq!(elastic.value(), (200.0e9_f64 * 0.75 / (1.25 * 0.5 * 8000.0)).sqrt());
    }

    #[test]
    fn critical_step_from_element_size() {
        let params = ExplicitCriticalParams {
            element_size: Some(0.5),
            bulk_modulus: Some(100.0),
            density: Some(1.0),
            factor: Some(0.8),
            ..ExplicitCriticalParams::default()
        };
        let mut policy = ExplicitCriticalDt::new("explicit", params).unwrap();
        let core = StepperCore::for_tests("explicit");
        let mut state = StepState::default();
        let mut ctx = Context::new(&mut state, &());

        assert_relative_eq!(policy.compute_dt(&core, &mut ctx).unwrap(), 0.04);

        let mut dt = 1.0;
        policy.constrain_step(&core, &mut ctx, &mut dt).unwrap();
        assert_relative_eq!(dt, 0.04);

        let mut dt = 0.01;
        policy.constrain_step(&core, &mut ctx, &mut dt).unwrap();
        assert_relative_eq!(dt, 0.01);
    }

    #[test]
    fn element_size_from_postprocessor_with_floor() {
        let params = ExplicitCriticalParams {
            element_size_postprocessor: Some("h_min".into()),
            wave_speed: Some(10.0),
            minimum_dt: 0.05,
            ..ExplicitCriticalParams::default()
        };
        let mut policy = ExplicitCriticalDt::new("explicit", params).unwrap();
        let core = StepperCore::for_tests("explicit");
        let mut state = StepState::default();

        let values = ValueStore::new().with_postprocessor("h_min", 2.0);
        let dt = policy
            .compute_dt(&core, &mut Context::new(&mut state, &values))
            .unwrap();
        assert_relative_eq!(dt, 0.2);

        let values = ValueStore::new().with_postprocessor("h_min", 0.1);
        let dt = policy
            .compute_dt(&core, &mut Context::new(&mut state, &values))
            .unwrap();
        assert_relative_eq!(dt, 0.05);
    }

    #[test]
    fn invalid_sources() {
        let both_sizes = ExplicitCriticalParams {
            element_size: Some(1.0),
            element_size_postprocessor: Some("h".into()),
            wave_speed: Some(1.0),
            ..ExplicitCriticalParams::default()
        };
        assert!(ExplicitCriticalDt::new("e", both_sizes).is_err());

        let no_density = ExplicitCriticalParams {
            element_size: Some(1.0),
            bulk_modulus: Some(1.0),
            ..ExplicitCriticalParams::default()
        };
        assert!(ExplicitCriticalDt::new("e", no_density).is_err());

        let incompressible = ExplicitCriticalParams {
            element_size: Some(1.0),
            youngs_modulus: Some(1.0),
            poissons_ratio: Some(0.5),
            density: Some(1.0),
            ..ExplicitCriticalParams::default()
        };
        assert!(ExplicitCriticalDt::new("e", incompressible).is_err());
    }
}
