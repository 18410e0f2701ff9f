/// Watches a transient run attempt by attempt.
///
/// An executioner hands its observer one event `E` for the initial state and
/// one after every solve attempt, converged or not. Returning `Some(action)`
/// asks the executioner to act on the run (for example to stop before the end
/// time); returning `None` leaves the run alone.
///
/// Any `FnMut(&E) -> Option<A>` closure is an observer, so recording the
/// attempts of a run only takes a closure over a `Vec`:
///
/// ```
/// use stride_core::Observer;
///
/// let mut dts = Vec::new();
/// let mut record = |dt: &f64| -> Option<()> {
///     dts.push(*dt);
///     None
/// };
/// record.observe(&0.5);
/// record.observe(&0.25);
/// assert_eq!(dts, [0.5, 0.25]);
/// ```
///
/// `()` observes nothing and never acts.
pub trait Observer<E, A> {
    /// Sees one event and optionally returns an action for the executioner.
    fn observe(&mut self, event: &E) -> Option<A>;
}

impl<E, A, F> Observer<E, A> for F
where
    F: FnMut(&E) -> Option<A>,
{
    fn observe(&mut self, event: &E) -> Option<A> {
        self(event)
    }
}

impl<E, A> Observer<E, A> for () {
    fn observe(&mut self, _event: &E) -> Option<A> {
        None
    }
}
