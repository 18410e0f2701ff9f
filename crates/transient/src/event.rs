/// Event emitted by the executioner after every solve attempt.
///
/// Step 0 is the initial state before any solve. Rejected attempts are
/// reported with `converged: false` and the step number they will retry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// The step number (0 for the initial state).
    pub step: usize,

    /// Simulation time at the end of the attempted step.
    pub time: f64,

    /// Size of the attempted step, or the initial dt for step 0.
    pub dt: f64,

    /// Whether the attempt was accepted.
    pub converged: bool,

    /// Whether the step was shortened to land on a sync time.
    pub at_sync_point: bool,
}
