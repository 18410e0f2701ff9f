use std::{
    fmt,
    ops::{Add, Deref, Mul},
};

use thiserror::Error;

/// A strictly positive, finite duration used to advance simulation time.
///
/// `TimeIncrement` is the validated form of a step size. Every time stepper
/// produces one per call to `compute_step`, and the executioner adds it to the
/// old time to obtain the new one.
///
/// # Enforcement
///
/// - Time increments must be strictly positive and finite.
/// - Zero, negative, or non-finite values result in a [`TimeIncrementError`].
///
/// # Supported Operations
///
/// - [`Deref`] to `f64` for read access to the raw value.
/// - [`Add<TimeIncrement>` for `f64`] to advance a time by a step.
/// - [`Mul<f64>`] to scale a step, which re-validates the result.
/// - [`Display`] renders the increment as `"<value> s"`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct TimeIncrement(f64);

/// Error type returned when constructing an invalid [`TimeIncrement`].
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum TimeIncrementError {
    #[error("time increment must be greater than zero, got {0}")]
    NotPositive(f64),

    #[error("time increment must be finite, got {0}")]
    NotFinite(f64),
}

impl TimeIncrement {
    /// Constructs a `TimeIncrement` from a raw step size.
    ///
    /// # Errors
    ///
    /// Returns [`TimeIncrementError::NotPositive`] if `dt` is zero or negative,
    /// and [`TimeIncrementError::NotFinite`] if it is infinite or NaN.
    pub fn new(dt: f64) -> Result<Self, TimeIncrementError> {
        if dt.is_nan() || dt.is_infinite() {
            return Err(TimeIncrementError::NotFinite(dt));
        }
        if dt > 0.0 {
            Ok(Self(dt))
        } else {
            Err(TimeIncrementError::NotPositive(dt))
        }
    }

    /// Returns the underlying step size.
    #[must_use]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for TimeIncrement {
    type Error = TimeIncrementError;
    fn try_from(dt: f64) -> Result<Self, Self::Error> {
        Self::new(dt)
    }
}

impl Deref for TimeIncrement {
    type Target = f64;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Advances a time by the increment.
impl Add<TimeIncrement> for f64 {
    type Output = f64;
    fn add(self, rhs: TimeIncrement) -> Self::Output {
        self + rhs.0
    }
}

/// Scales the increment, failing if the factor makes it non-positive.
impl Mul<f64> for TimeIncrement {
    type Output = Result<TimeIncrement, TimeIncrementError>;
    fn mul(self, rhs: f64) -> Self::Output {
        TimeIncrement::new(self.0 * rhs)
    }
}

impl fmt::Display for TimeIncrement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} s", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn add_time_increment_to_a_time() {
        let dt = TimeIncrement::new(2.0).unwrap();
        assert_relative_eq!(5.0 + dt, 7.0);
    }

    #[test]
    fn scaling_revalidates() {
        let dt = TimeIncrement::new(2.0).unwrap();
        assert_relative_eq!((dt * 0.25).unwrap().get(), 0.5);
        assert!((dt * -1.0).is_err());
    }

    #[test]
    fn zero_time_increment_fails() {
        assert_eq!(
            TimeIncrement::new(0.0),
            Err(TimeIncrementError::NotPositive(0.0))
        );
    }

    #[test]
    fn negative_time_increment_fails() {
        assert!(TimeIncrement::new(-1.0).is_err());
    }

    #[test]
    fn non_finite_time_increment_fails() {
        assert!(matches!(
            TimeIncrement::new(f64::INFINITY),
            Err(TimeIncrementError::NotFinite(_))
        ));
        assert!(TimeIncrement::new(f64::NAN).is_err());
    }

    #[test]
    fn displays_in_seconds() {
        let dt = TimeIncrement::new(1.5).unwrap();
        assert_eq!(dt.to_string(), "1.5 s");
    }
}
