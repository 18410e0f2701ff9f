//! Aggregation of several time steppers.
//!
//! Every sub-stepper proposes a step; the smallest proposal wins unless a
//! stepper listed in `lower_bound` proposes more, and time-sequence steppers
//! shorten the result so that their next time is hit exactly. Calls that
//! report on the outcome of a step are forwarded to the winning sub-stepper.
//! The others only see the attempt and the accepted step, which keeps the
//! history of stateful policies current while they lose.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use stride_core::SolveReport;

use crate::{Context, Error, Kind, Registry, StepperCore, TimeStepper, policy::Rule};

/// Parameters of [`CompositionDt`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositionParams {
    /// Step size for the first step; the composed step if absent.
    pub initial_dt: Option<f64>,

    /// Sub-steppers whose largest proposal acts as a floor.
    pub lower_bound: BTreeSet<String>,
}

/// Combines several sub-steppers into one.
#[derive(Debug)]
pub struct CompositionDt {
    initial_dt: Option<f64>,
    lower_bound: BTreeSet<String>,
    steppers: Vec<TimeStepper>,
    last: Option<usize>,
}

impl CompositionDt {
    /// Creates a composition owning the steppers of `registry`.
    ///
    /// # Errors
    ///
    /// Returns an error if fewer than two steppers are given, one of them is
    /// itself a composition, or a `lower_bound` name is unknown.
    pub fn new(name: &str, params: CompositionParams, registry: Registry) -> Result<Self, Error> {
        if registry.len() < 2 {
            return Err(Error::TooFewSteppers {
                found: registry.len(),
            });
        }
        if let Some(nested) = registry.iter().find(|s| s.kind() == Kind::Composition) {
            return Err(Error::NestedComposition {
                name: nested.name().to_owned(),
            });
        }
        if let Some(unknown) = params.lower_bound.iter().find(|n| !registry.contains(n)) {
            return Err(Error::UnknownStepper {
                name: unknown.clone(),
            });
        }
        if let Some(dt) = params.initial_dt
            && !(dt > 0.0 && dt.is_finite())
        {
            return Err(Error::invalid(name, format!("initial_dt must be positive, got {dt}")));
        }

        Ok(Self {
            initial_dt: params.initial_dt,
            lower_bound: params.lower_bound,
            steppers: registry.into_vec(),
            last: None,
        })
    }

    /// The sub-stepper whose proposal was used for the current step.
    #[must_use]
    pub fn last(&self) -> Option<&TimeStepper> {
        self.last.map(|i| &self.steppers[i])
    }

    /// Name of the sub-stepper whose proposal was used for the current step.
    #[must_use]
    pub fn last_name(&self) -> Option<&str> {
        self.last().map(TimeStepper::name)
    }

    pub fn steppers(&self) -> impl Iterator<Item = &TimeStepper> {
        self.steppers.iter()
    }

    #[must_use]
    pub fn stepper(&self, name: &str) -> Option<&TimeStepper> {
        self.steppers.iter().find(|s| s.name() == name)
    }

    pub fn stepper_mut(&mut self, name: &str) -> Option<&mut TimeStepper> {
        self.steppers.iter_mut().find(|s| s.name() == name)
    }

    /// Computes the composed step and records the winning sub-stepper.
    fn compose(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        let mut smallest: Option<(f64, usize)> = None;
        let mut largest_bound: Option<(f64, usize)> = None;

        for (i, stepper) in self.steppers.iter_mut().enumerate() {
            if stepper.kind() == Kind::TimeSequence {
                continue;
            }
            stepper.compute_step(ctx)?;
            let dt = stepper.current_dt();
            if self.lower_bound.contains(stepper.name()) {
                if largest_bound.is_none_or(|(best, _)| dt > best) {
                    largest_bound = Some((dt, i));
                }
            } else if smallest.is_none_or(|(best, _)| dt < best) {
                smallest = Some((dt, i));
            }
        }

        let mut chosen = match (smallest, largest_bound) {
            (Some((dt, i)), Some((bound, j))) => {
                if bound > dt {
                    Some((bound, j))
                } else {
                    Some((dt, i))
                }
            }
            (Some(min), None) => Some(min),
            (None, bound) => bound,
        };

        let (time, tolerance) = (ctx.state.time, ctx.state.timestep_tolerance);
        for (i, stepper) in self.steppers.iter_mut().enumerate() {
            let Some(sequence) = stepper.policy_mut().as_time_sequence_mut() else {
                continue;
            };
            sequence.sync_to(time, tolerance);
            let Some(next) = sequence.next_time_after(time, tolerance) else {
                continue;
            };
            let dt = next - time;
            if chosen.is_none_or(|(best, _)| dt < best) {
                chosen = Some((dt, i));
            }
        }

        let (dt, winner) = chosen.ok_or_else(|| {
            Error::invalid(core.name(), "no sub-stepper proposed a time step")
        })?;
        self.last = Some(winner);
        diag!(
            ctx.state,
            "[{}] composed dt {dt} from time stepper '{}'",
            core.name(),
            self.steppers[winner].name()
        );
        Ok(dt)
    }
}

impl Rule for CompositionDt {
    fn init(&mut self, _core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        for stepper in &mut self.steppers {
            stepper.init(ctx)?;
        }
        Ok(())
    }

    fn pre_execute(&mut self, _core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        for stepper in &mut self.steppers {
            stepper.pre_execute(ctx)?;
        }
        Ok(())
    }

    fn compute_initial_dt(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
    ) -> Result<f64, Error> {
        match self.initial_dt {
            Some(dt) => Ok(dt),
            None => self.compose(core, ctx),
        }
    }

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        self.compose(core, ctx)
    }

    fn compute_failed_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        match self.last {
            Some(i) => {
                let stepper = &mut self.steppers[i];
                stepper.compute_step(ctx)?;
                Ok(stepper.current_dt())
            }
            None => core.cut_back(ctx.state),
        }
    }

    fn constrain_step(
        &mut self,
        _core: &StepperCore,
        ctx: &mut Context<'_>,
        dt: &mut f64,
    ) -> Result<bool, Error> {
        let mut at_sync_point = false;
        for stepper in &mut self.steppers {
            at_sync_point |= stepper.constrain_step(ctx, dt)?;
        }
        Ok(at_sync_point)
    }

    fn verdict(
        &mut self,
        _core: &StepperCore,
        ctx: &mut Context<'_>,
        report: &SolveReport,
    ) -> Result<bool, Error> {
        for (i, stepper) in self.steppers.iter_mut().enumerate() {
            if self.last != Some(i) {
                stepper.observe(ctx, report)?;
            }
        }
        match self.last {
            Some(i) => {
                let stepper = &mut self.steppers[i];
                stepper.step(ctx, report)?;
                Ok(stepper.converged())
            }
            None => Ok(report.converged),
        }
    }

    fn accept_step(&mut self, _core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        for (i, stepper) in self.steppers.iter_mut().enumerate() {
            if self.last == Some(i) {
                stepper.accept_step(ctx)?;
            } else {
                stepper.record_accepted(ctx)?;
            }
        }
        Ok(())
    }

    fn reject_step(&mut self, _core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        match self.last {
            Some(i) => self.steppers[i].reject_step(ctx),
            None => Ok(()),
        }
    }

    fn converged(&self) -> Option<bool> {
        self.last().map(TimeStepper::converged)
    }
}
