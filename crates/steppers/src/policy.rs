//! The closed set of time-step policies.
//!
//! Each policy is a struct carrying its parameters and private state. The
//! [`Policy`] enum tags them, and the crate-internal [`Rule`] trait is the single
//! interface through which [`TimeStepper`](crate::TimeStepper) drives them.

mod ab2;
mod composition;
mod constant;
mod explicit_critical;
mod fixed_point;
mod iteration_adaptive;
mod log_constant;
mod postprocessor;
mod test_source;
mod time_sequence;

use std::fmt;

use stride_core::SolveReport;

pub use ab2::{Ab2Params, Ab2PredictorCorrector};
pub use composition::{CompositionDt, CompositionParams};
pub use constant::{ConstantDt, ConstantParams};
pub use explicit_critical::{ExplicitCriticalDt, ExplicitCriticalParams, WaveSpeed};
pub use fixed_point::{FixedPointIterationAdaptiveDt, FixedPointParams};
pub use iteration_adaptive::{IterationAdaptiveDt, IterationAdaptiveParams};
pub use log_constant::{LogConstantDt, LogConstantParams};
pub use postprocessor::{PostprocessorDt, PostprocessorParams};
pub use test_source::{TestSourceParams, TestSourceStepper};
pub use time_sequence::{
    CsvTimeSequenceParams, SequenceCheckpoint, TimeSequenceParams, TimeSequenceStepper,
};

use crate::{Context, Error, StepperCore, config::PolicyParams};

/// The policy kinds, named as they appear in configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Constant,
    IterationAdaptive,
    Composition,
    TimeSequence,
    Postprocessor,
    LogConstant,
    FixedPointIterationAdaptive,
    Ab2PredictorCorrector,
    ExplicitCritical,
    TestSource,
}

impl Kind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Constant => "ConstantDT",
            Kind::IterationAdaptive => "IterationAdaptiveDT",
            Kind::Composition => "CompositionDT",
            Kind::TimeSequence => "TimeSequenceStepper",
            Kind::Postprocessor => "PostprocessorDT",
            Kind::LogConstant => "LogConstantDT",
            Kind::FixedPointIterationAdaptive => "FixedPointIterationAdaptiveDT",
            Kind::Ab2PredictorCorrector => "AB2PredictorCorrector",
            Kind::ExplicitCritical => "ExplicitCriticalDT",
            Kind::TestSource => "TestSourceStepper",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The hooks a policy may implement.
///
/// Only the initial and regular dt computations are mandatory; everything else
/// defaults to the behavior shared by all steppers.
pub(crate) trait Rule {
    fn init(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn pre_execute(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn compute_initial_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>)
    -> Result<f64, Error>;

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error>;

    fn compute_failed_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        core.cut_back(ctx.state)
    }

    /// Applies policy-specific limits after the shared bounds.
    fn constrain_step(
        &mut self,
        _core: &StepperCore,
        _ctx: &mut Context<'_>,
        _dt: &mut f64,
    ) -> Result<bool, Error> {
        Ok(false)
    }

    /// Decides whether a solve attempt counts as converged.
    fn verdict(
        &mut self,
        _core: &StepperCore,
        _ctx: &mut Context<'_>,
        report: &SolveReport,
    ) -> Result<bool, Error> {
        Ok(report.converged)
    }

    /// Records a solve attempt that another stepper judges.
    fn observe(
        &mut self,
        _core: &StepperCore,
        _ctx: &mut Context<'_>,
        _report: &SolveReport,
    ) -> Result<(), Error> {
        Ok(())
    }

    fn accept_step(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<(), Error> {
        Ok(())
    }

    /// Updates history after a step another stepper proposed was accepted.
    fn record_accepted(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<(), Error> {
        Ok(())
    }

    fn reject_step(&mut self, _core: &StepperCore, _ctx: &mut Context<'_>) -> Result<(), Error> {
        Ok(())
    }

    /// Overrides the stepper's own convergence flag.
    fn converged(&self) -> Option<bool> {
        None
    }
}

/// A time-step policy.
#[derive(Debug)]
pub enum Policy {
    Constant(ConstantDt),
    IterationAdaptive(IterationAdaptiveDt),
    Composition(CompositionDt),
    TimeSequence(TimeSequenceStepper),
    Postprocessor(PostprocessorDt),
    LogConstant(LogConstantDt),
    FixedPointIterationAdaptive(FixedPointIterationAdaptiveDt),
    Ab2PredictorCorrector(Ab2PredictorCorrector),
    ExplicitCritical(ExplicitCriticalDt),
    TestSource(TestSourceStepper),
}

macro_rules! dispatch {
    ($policy:expr, $rule:ident => $body:expr) => {
        match $policy {
            Policy::Constant($rule) => $body,
            Policy::IterationAdaptive($rule) => $body,
            Policy::Composition($rule) => $body,
            Policy::TimeSequence($rule) => $body,
            Policy::Postprocessor($rule) => $body,
            Policy::LogConstant($rule) => $body,
            Policy::FixedPointIterationAdaptive($rule) => $body,
            Policy::Ab2PredictorCorrector($rule) => $body,
            Policy::ExplicitCritical($rule) => $body,
            Policy::TestSource($rule) => $body,
        }
    };
}

impl Policy {
    /// Builds a policy from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter is invalid or a sequence file cannot be read.
    pub fn from_params(name: &str, params: &PolicyParams) -> Result<Self, Error> {
        Ok(match params {
            PolicyParams::Constant(p) => Self::Constant(ConstantDt::new(name, p.clone())?),
            PolicyParams::IterationAdaptive(p) => {
                Self::IterationAdaptive(IterationAdaptiveDt::new(name, p.clone())?)
            }
            PolicyParams::TimeSequence(p) => {
                Self::TimeSequence(TimeSequenceStepper::from_params(name, p)?)
            }
            PolicyParams::CsvTimeSequence(p) => {
                Self::TimeSequence(TimeSequenceStepper::from_csv(name, p)?)
            }
            PolicyParams::Postprocessor(p) => {
                Self::Postprocessor(PostprocessorDt::new(name, p.clone())?)
            }
            PolicyParams::LogConstant(p) => Self::LogConstant(LogConstantDt::new(name, p.clone())?),
            PolicyParams::FixedPointIterationAdaptive(p) => {
                Self::FixedPointIterationAdaptive(FixedPointIterationAdaptiveDt::new(name, p.clone())?)
            }
            PolicyParams::Ab2PredictorCorrector(p) => {
                Self::Ab2PredictorCorrector(Ab2PredictorCorrector::new(name, p.clone())?)
            }
            PolicyParams::ExplicitCritical(p) => {
                Self::ExplicitCritical(ExplicitCriticalDt::new(name, p.clone())?)
            }
            PolicyParams::TestSource(p) => Self::TestSource(TestSourceStepper::new(name, p.clone())?),
        })
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            Policy::Constant(_) => Kind::Constant,
            Policy::IterationAdaptive(_) => Kind::IterationAdaptive,
            Policy::Composition(_) => Kind::Composition,
            Policy::TimeSequence(_) => Kind::TimeSequence,
            Policy::Postprocessor(_) => Kind::Postprocessor,
            Policy::LogConstant(_) => Kind::LogConstant,
            Policy::FixedPointIterationAdaptive(_) => Kind::FixedPointIterationAdaptive,
            Policy::Ab2PredictorCorrector(_) => Kind::Ab2PredictorCorrector,
            Policy::ExplicitCritical(_) => Kind::ExplicitCritical,
            Policy::TestSource(_) => Kind::TestSource,
        }
    }

    /// Returns the time sequence if this is a sequence policy.
    #[must_use]
    pub fn as_time_sequence(&self) -> Option<&TimeSequenceStepper> {
        match self {
            Policy::TimeSequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    pub fn as_time_sequence_mut(&mut self) -> Option<&mut TimeSequenceStepper> {
        match self {
            Policy::TimeSequence(sequence) => Some(sequence),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_composition(&self) -> Option<&CompositionDt> {
        match self {
            Policy::Composition(composition) => Some(composition),
            _ => None,
        }
    }
}

impl Rule for Policy {
    fn init(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        dispatch!(self, rule => rule.init(core, ctx))
    }

    fn pre_execute(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        dispatch!(self, rule => rule.pre_execute(core, ctx))
    }

    fn compute_initial_dt(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
    ) -> Result<f64, Error> {
        dispatch!(self, rule => rule.compute_initial_dt(core, ctx))
    }

    fn compute_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        dispatch!(self, rule => rule.compute_dt(core, ctx))
    }

    fn compute_failed_dt(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<f64, Error> {
        dispatch!(self, rule => rule.compute_failed_dt(core, ctx))
    }

    fn constrain_step(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
        dt: &mut f64,
    ) -> Result<bool, Error> {
        dispatch!(self, rule => rule.constrain_step(core, ctx, dt))
    }

    fn verdict(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
        report: &SolveReport,
    ) -> Result<bool, Error> {
        dispatch!(self, rule => rule.verdict(core, ctx, report))
    }

    fn observe(
        &mut self,
        core: &StepperCore,
        ctx: &mut Context<'_>,
        report: &SolveReport,
    ) -> Result<(), Error> {
        dispatch!(self, rule => rule.observe(core, ctx, report))
    }

    fn accept_step(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        dispatch!(self, rule => rule.accept_step(core, ctx))
    }

    fn record_accepted(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        dispatch!(self, rule => rule.record_accepted(core, ctx))
    }

    fn reject_step(&mut self, core: &StepperCore, ctx: &mut Context<'_>) -> Result<(), Error> {
        dispatch!(self, rule => rule.reject_step(core, ctx))
    }

    fn converged(&self) -> Option<bool> {
        dispatch!(self, rule => rule.converged())
    }
}
