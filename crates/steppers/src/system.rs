use crate::{
    CommonParams, CompositionDt, CompositionParams, Error, Policy, Registry, StepperConfig,
    TimeStepper, TimeSteppersConfig,
};

/// Name of the composition created when several steppers are configured.
pub const COMPOSITION_NAME: &str = "composition";

/// Designates the time stepper the executioner calls.
///
/// A single configured stepper is used directly. Several steppers are moved
/// into a [`CompositionDt`] named [`COMPOSITION_NAME`], which becomes final.
#[derive(Debug)]
pub struct TimeStepperSystem {
    final_stepper: TimeStepper,
}

impl TimeStepperSystem {
    /// Uses `stepper` as the final stepper.
    #[must_use]
    pub fn from_stepper(stepper: TimeStepper) -> Self {
        Self {
            final_stepper: stepper,
        }
    }

    /// Designates the final stepper among the steppers of `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSteppers`] for an empty registry, or an error from
    /// building the composition.
    pub fn from_registry(registry: Registry, composition: CompositionParams) -> Result<Self, Error> {
        match registry.len() {
            0 => Err(Error::NoSteppers),
            1 => {
                if !composition.lower_bound.is_empty() || composition.initial_dt.is_some() {
                    log::warn!("lower_bound and initial_dt are ignored with a single time stepper");
                }
                let stepper = registry
                    .into_vec()
                    .into_iter()
                    .next()
                    .ok_or(Error::NoSteppers)?;
                Ok(Self::from_stepper(stepper))
            }
            _ => {
                if registry.contains(COMPOSITION_NAME) {
                    return Err(Error::DuplicateStepper {
                        name: COMPOSITION_NAME.to_owned(),
                    });
                }
                log::debug!(
                    "combining time steppers [{}] into '{COMPOSITION_NAME}'",
                    registry.names().collect::<Vec<_>>().join(", ")
                );
                let policy = CompositionDt::new(COMPOSITION_NAME, composition, registry)?;
                let stepper = TimeStepper::new(
                    COMPOSITION_NAME,
                    CommonParams::default(),
                    Policy::Composition(policy),
                )?;
                Ok(Self::from_stepper(stepper))
            }
        }
    }

    /// Builds every configured stepper and designates the final one.
    ///
    /// # Errors
    ///
    /// Returns an error if no steppers are configured or any stepper is invalid.
    pub fn from_config(config: &TimeSteppersConfig) -> Result<Self, Error> {
        let mut registry = Registry::new();
        for (name, stepper) in &config.steppers {
            registry.insert(TimeStepper::from_config(name.as_str(), stepper)?)?;
        }
        Self::from_registry(registry, config.composition())
    }

    /// Builds a system with one configured stepper.
    ///
    /// # Errors
    ///
    /// Returns an error if the stepper is invalid.
    pub fn from_stepper_config(name: &str, config: &StepperConfig) -> Result<Self, Error> {
        Ok(Self::from_stepper(TimeStepper::from_config(name, config)?))
    }

    #[must_use]
    pub fn final_stepper(&self) -> &TimeStepper {
        &self.final_stepper
    }

    pub fn final_stepper_mut(&mut self) -> &mut TimeStepper {
        &mut self.final_stepper
    }

    #[must_use]
    pub fn into_final(self) -> TimeStepper {
        self.final_stepper
    }

    /// Looks up a stepper by name, including the sub-steppers of a composition.
    #[must_use]
    pub fn stepper(&self, name: &str) -> Option<&TimeStepper> {
        if self.final_stepper.name() == name {
            return Some(&self.final_stepper);
        }
        self.final_stepper
            .policy()
            .as_composition()
            .and_then(|composition| composition.stepper(name))
    }
}
