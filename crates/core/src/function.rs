use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A scalar function of simulation time.
///
/// Closures of type `Fn(f64) -> f64` implement this trait directly.
/// Tabulated functions additionally expose their knots through
/// [`TimeFunction::as_piecewise_linear`], which lets steppers solve for
/// crossing times instead of bisecting.
pub trait TimeFunction {
    /// Evaluates the function at time `t`.
    fn value(&self, t: f64) -> f64;

    /// Returns the tabulated form of the function, if it has one.
    fn as_piecewise_linear(&self) -> Option<&PiecewiseLinear> {
        None
    }
}

impl<F> TimeFunction for F
where
    F: Fn(f64) -> f64,
{
    fn value(&self, t: f64) -> f64 {
        self(t)
    }
}

/// A piecewise-linear function defined by strictly increasing knots.
///
/// Values outside the tabulated domain are held constant at the first or
/// last tabulated value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTable")]
pub struct PiecewiseLinear {
    x: Vec<f64>,
    y: Vec<f64>,
}

/// Errors that can occur when constructing a [`PiecewiseLinear`] function.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("table needs at least one point")]
    Empty,

    #[error("x and y have different lengths ({x} and {y})")]
    LengthMismatch { x: usize, y: usize },

    #[error("x values must be finite and strictly increasing (at index {index})")]
    NotIncreasing { index: usize },
}

#[derive(Deserialize)]
struct RawTable {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl TryFrom<RawTable> for PiecewiseLinear {
    type Error = TableError;
    fn try_from(raw: RawTable) -> Result<Self, Self::Error> {
        Self::new(raw.x, raw.y)
    }
}

impl PiecewiseLinear {
    /// Creates a table from knot abscissae and values.
    ///
    /// # Errors
    ///
    /// Returns a [`TableError`] if the table is empty, the lengths differ, or
    /// `x` is not strictly increasing.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Result<Self, TableError> {
        if x.is_empty() {
            return Err(TableError::Empty);
        }
        if x.len() != y.len() {
            return Err(TableError::LengthMismatch {
                x: x.len(),
                y: y.len(),
            });
        }
        if let Some(index) = x.iter().position(|v| !v.is_finite()) {
            return Err(TableError::NotIncreasing { index });
        }
        if let Some(index) = x.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(TableError::NotIncreasing { index: index + 1 });
        }
        Ok(Self { x, y })
    }

    /// Number of knots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Knot abscissa at `index`.
    #[must_use]
    pub fn domain(&self, index: usize) -> f64 {
        self.x[index]
    }

    /// Knot value at `index`.
    #[must_use]
    pub fn range(&self, index: usize) -> f64 {
        self.y[index]
    }

    /// All knot abscissae.
    #[must_use]
    pub fn knots(&self) -> &[f64] {
        &self.x
    }

    /// Evaluates the table at `t` by linear interpolation.
    #[must_use]
    pub fn sample(&self, t: f64) -> f64 {
        let upper = self.x.partition_point(|&x| x <= t);
        if upper == 0 {
            return self.y[0];
        }
        if upper == self.x.len() {
            return self.y[upper - 1];
        }
        let (x0, x1) = (self.x[upper - 1], self.x[upper]);
        let (y0, y1) = (self.y[upper - 1], self.y[upper]);
        y0 + (y1 - y0) * (t - x0) / (x1 - x0)
    }
}

impl TimeFunction for PiecewiseLinear {
    fn value(&self, t: f64) -> f64 {
        self.sample(t)
    }

    fn as_piecewise_linear(&self) -> Option<&PiecewiseLinear> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn interpolates_between_knots() {
        let f = PiecewiseLinear::new(vec![0.0, 1.0, 3.0], vec![0.0, 2.0, 0.0]).unwrap();
        assert_relative_eq!(f.sample(0.5), 1.0);
        assert_relative_eq!(f.sample(1.0), 2.0);
        assert_relative_eq!(f.sample(2.0), 1.0);
    }

    #[test]
    fn holds_values_outside_domain() {
        let f = PiecewiseLinear::new(vec![1.0, 2.0], vec![5.0, 7.0]).unwrap();
        assert_relative_eq!(f.sample(-10.0), 5.0);
        assert_relative_eq!(f.sample(10.0), 7.0);
    }

    #[test]
    fn rejects_bad_tables() {
        assert_eq!(PiecewiseLinear::new(vec![], vec![]), Err(TableError::Empty));
        assert!(matches!(
            PiecewiseLinear::new(vec![0.0, 1.0], vec![0.0]),
            Err(TableError::LengthMismatch { x: 2, y: 1 })
        ));
        assert_eq!(
            PiecewiseLinear::new(vec![0.0, 2.0, 2.0], vec![0.0, 1.0, 2.0]),
            Err(TableError::NotIncreasing { index: 2 })
        );
    }

    #[test]
    fn closures_are_time_functions() {
        let f = |t: f64| t * t;
        assert_relative_eq!(f.value(3.0), 9.0);
        assert!(f.as_piecewise_linear().is_none());
    }
}
