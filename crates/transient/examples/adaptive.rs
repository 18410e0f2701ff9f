//! Runs a decaying model problem with a configurable time stepper.
//!
//! # Usage
//!
//! ```text
//! cargo run --example adaptive
//! cargo run --example adaptive -- path/to/simulation.toml
//! RUST_LOG=debug cargo run --example adaptive
//! ```
//!
//! Without a path the built-in configuration is used: an iteration-adaptive
//! stepper combined with a list of output times. The model solve gets more
//! expensive with larger steps and fails above a limit, so the run shows
//! growth, cutbacks, and landing on output times.

use std::{convert::Infallible, error::Error};

use stride_core::{SolveReport, StepState, ValueStore, Values};
use stride_transient::{Event, SimulationConfig, Solve, Transient};

const DEFAULT_CONFIG: &str = r#"
[executioner]
end_time = 10.0
dtmin = 1e-4
verbose = true

[time_steppers.adaptive]
type = "IterationAdaptiveDT"
dt = 0.05
optimal_iterations = 6
growth_factor = 1.5

[time_steppers.outputs]
type = "TimeSequenceStepper"
time_sequence = [1.0, 2.5, 5.0, 7.5]
"#;

/// Implicit Euler for `du/dt = -u` with a Newton cost that grows with dt.
struct Decay {
    u: f64,
    u_accepted: f64,
    values: ValueStore,
}

impl Solve for Decay {
    type Error = Infallible;

    fn solve(&mut self, state: &StepState) -> Result<SolveReport, Infallible> {
        self.u_accepted = self.u;
        let nonlinear = 1 + (state.dt * 8.0) as usize;
        if nonlinear > 12 {
            return Ok(SolveReport::failed());
        }
        self.u /= 1.0 + state.dt;
        self.values.set_postprocessor("u", self.u);
        Ok(SolveReport::converged(nonlinear, 5 * nonlinear))
    }

    fn values(&self) -> &dyn Values {
        &self.values
    }

    fn restore(&mut self) {
        self.u = self.u_accepted;
        self.values.set_postprocessor("u", self.u);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let text = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_CONFIG.to_owned(),
    };
    let config = SimulationConfig::from_toml(&text)?;
    let mut system = config.time_stepper_system()?;
    let transient = Transient::new(config.executioner)?;

    let mut solver = Decay {
        u: 1.0,
        u_accepted: 1.0,
        values: ValueStore::new(),
    };
    let solution = transient.run(&mut system, &mut solver, |event: &Event| {
        if !event.converged {
            log::warn!("step {} with dt {:.4} failed", event.step, event.dt);
        }
        None
    })?;

    println!("{:>5} {:>10} {:>10}", "step", "time", "dt");
    for record in &solution.history {
        let marker = if record.at_sync_point { " *" } else { "" };
        println!(
            "{:>5} {:>10.4} {:>10.4}{marker}",
            record.step, record.time, record.dt
        );
    }
    println!(
        "{:?}: {} steps, {} failures, u = {:.6}",
        solution.status,
        solution.steps(),
        solution.failures,
        solver.u
    );
    Ok(())
}
