use std::error::Error as StdError;

use stride_core::{SolveReport, StepState, Values};

/// The physics solve advanced by the executioner.
///
/// The executioner sets `state.time` and `state.dt` for the attempted step and
/// calls [`Solve::solve`]. Postprocessor values and functions exposed through
/// [`Solve::values`] are visible to the time steppers when they pick the next
/// step size.
pub trait Solve {
    type Error: StdError + Send + Sync + 'static;

    /// Attempts the step described by `state`.
    ///
    /// A solve that does not converge is reported through
    /// [`SolveReport::converged`], not as an error; errors end the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the solve cannot be attempted at all.
    fn solve(&mut self, state: &StepState) -> Result<SolveReport, Self::Error>;

    /// Postprocessor values and functions computed by the solver.
    fn values(&self) -> &dyn Values {
        &()
    }

    /// Discards the rejected attempt and restores the last accepted solution.
    fn restore(&mut self) {}
}

/// Closures solve without exposing values.
impl<F, E> Solve for F
where
    F: FnMut(&StepState) -> Result<SolveReport, E>,
    E: StdError + Send + Sync + 'static,
{
    type Error = E;

    fn solve(&mut self, state: &StepState) -> Result<SolveReport, E> {
        self(state)
    }
}
