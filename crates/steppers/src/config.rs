//! Serde configuration of time steppers.
//!
//! A single stepper is configured by a table with a `type` key naming the
//! policy, the shared parameters, and the policy's own parameters:
//!
//! ```toml
//! type = "IterationAdaptiveDT"
//! dt = 0.1
//! optimal_iterations = 6
//! cutback_factor_at_failure = 0.25
//! ```
//!
//! Several steppers are configured by name in a [`TimeSteppersConfig`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    CommonParams,
    policy::{
        Ab2Params, CompositionParams, ConstantParams, CsvTimeSequenceParams,
        ExplicitCriticalParams, FixedPointParams, IterationAdaptiveParams, LogConstantParams,
        PostprocessorParams, TestSourceParams, TimeSequenceParams,
    },
};

/// Parameters of one policy, tagged by its configuration name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PolicyParams {
    #[serde(rename = "ConstantDT")]
    Constant(ConstantParams),

    #[serde(rename = "IterationAdaptiveDT")]
    IterationAdaptive(IterationAdaptiveParams),

    #[serde(rename = "TimeSequenceStepper")]
    TimeSequence(TimeSequenceParams),

    #[serde(rename = "CSVTimeSequenceStepper")]
    CsvTimeSequence(CsvTimeSequenceParams),

    #[serde(rename = "PostprocessorDT")]
    Postprocessor(PostprocessorParams),

    #[serde(rename = "LogConstantDT")]
    LogConstant(LogConstantParams),

    #[serde(rename = "FixedPointIterationAdaptiveDT")]
    FixedPointIterationAdaptive(FixedPointParams),

    #[serde(rename = "AB2PredictorCorrector")]
    Ab2PredictorCorrector(Ab2Params),

    #[serde(rename = "ExplicitCriticalDT")]
    ExplicitCritical(ExplicitCriticalParams),

    #[serde(rename = "TestSourceStepper")]
    TestSource(TestSourceParams),
}

/// Configuration of one named time stepper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepperConfig {
    #[serde(flatten)]
    pub common: CommonParams,

    #[serde(flatten)]
    pub policy: PolicyParams,
}

impl From<PolicyParams> for StepperConfig {
    fn from(policy: PolicyParams) -> Self {
        Self {
            common: CommonParams::default(),
            policy,
        }
    }
}

/// Configuration of several named time steppers.
///
/// With more than one stepper the steppers are combined by a composition;
/// `lower_bound` and `initial_dt` configure that composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSteppersConfig {
    #[serde(default)]
    pub lower_bound: BTreeSet<String>,

    #[serde(default)]
    pub initial_dt: Option<f64>,

    #[serde(flatten)]
    pub steppers: BTreeMap<String, StepperConfig>,
}

impl TimeSteppersConfig {
    /// The parameters of the composition combining the steppers.
    #[must_use]
    pub fn composition(&self) -> CompositionParams {
        CompositionParams {
            initial_dt: self.initial_dt,
            lower_bound: self.lower_bound.clone(),
        }
    }
}
