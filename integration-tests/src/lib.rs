//! Model solvers shared by the integration tests.

use std::convert::Infallible;

use stride_core::{IterationCounts, SolveReport, StepState, ValueStore, Values};
use stride_transient::Solve;

/// Implicit Euler solve of `du/dt = -k u` with a synthetic Newton cost.
///
/// Each solve reports `ceil(dt / easy_dt)` nonlinear iterations and fails
/// when that exceeds `max_iterations`. The solution is published as the
/// postprocessor `u`.
#[derive(Debug)]
pub struct DecaySolver {
    pub k: f64,
    pub easy_dt: f64,
    pub max_iterations: usize,
    u: f64,
    u_accepted: f64,
    values: ValueStore,
}

impl DecaySolver {
    #[must_use]
    pub fn new(k: f64, easy_dt: f64, max_iterations: usize) -> Self {
        let mut solver = Self {
            k,
            easy_dt,
            max_iterations,
            u: 1.0,
            u_accepted: 1.0,
            values: ValueStore::new(),
        };
        solver.publish();
        solver
    }

    /// The current solution value.
    #[must_use]
    pub fn u(&self) -> f64 {
        self.u
    }

    fn iterations(&self, dt: f64) -> usize {
        let ratio = (dt / self.easy_dt - 1e-9).ceil();
        if ratio < 1.0 { 1 } else { ratio as usize }
    }

    fn publish(&mut self) {
        self.values.set_postprocessor("u", self.u);
    }
}

impl Solve for DecaySolver {
    type Error = Infallible;

    fn solve(&mut self, state: &StepState) -> Result<SolveReport, Infallible> {
        self.u_accepted = self.u;
        let nonlinear = self.iterations(state.dt);
        if nonlinear > self.max_iterations {
            return Ok(SolveReport {
                iterations: IterationCounts {
                    nonlinear,
                    linear: 0,
                    fixed_point: 0,
                },
                ..SolveReport::failed()
            });
        }

        self.u /= 1.0 + self.k * state.dt;
        self.publish();
        Ok(SolveReport::converged(nonlinear, 4 * nonlinear).with_solution(vec![self.u]))
    }

    fn values(&self) -> &dyn Values {
        &self.values
    }

    fn restore(&mut self) {
        self.u = self.u_accepted;
        self.publish();
    }
}
