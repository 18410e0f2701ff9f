use std::error::Error as StdError;

/// Errors that end a transient run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("time stepper error: {0}")]
    Stepper(#[from] stride_steppers::Error),

    #[error("solver error: {0}")]
    Solver(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    pub(crate) fn solver<E: StdError + Send + Sync + 'static>(err: E) -> Self {
        Self::Solver(Box::new(err))
    }
}
