use std::collections::BTreeSet;

use ordered_float::NotNan;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An ordered set of simulation times the run must land on exactly.
///
/// Sync times typically come from output schedules. Time steppers shorten the
/// step that would cross the first pending sync time so that it is hit
/// exactly, and drop sync times once the simulation has passed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTimes(BTreeSet<NotNan<f64>>);

/// Error returned when inserting a NaN sync time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("sync time must not be NaN")]
pub struct SyncTimeError;

impl SyncTimes {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from any collection of times.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTimeError`] if any time is NaN.
    pub fn from_times<I>(times: I) -> Result<Self, SyncTimeError>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut set = Self::new();
        for time in times {
            set.insert(time)?;
        }
        Ok(set)
    }

    /// Adds a sync time. Duplicate times are stored once.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTimeError`] if `time` is NaN.
    pub fn insert(&mut self, time: f64) -> Result<(), SyncTimeError> {
        let time = NotNan::new(time).map_err(|_| SyncTimeError)?;
        self.0.insert(time);
        Ok(())
    }

    /// Returns the earliest pending sync time.
    #[must_use]
    pub fn first(&self) -> Option<f64> {
        self.0.first().map(|t| t.into_inner())
    }

    /// Removes every sync time at or before `time`, returning how many were dropped.
    pub fn drain_through(&mut self, time: f64) -> usize {
        let mut dropped = 0;
        while let Some(first) = self.0.first()
            && first.into_inner() <= time
        {
            self.0.pop_first();
            dropped += 1;
        }
        dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over pending sync times in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().map(|t| t.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_times_sorted_and_unique() {
        let times = SyncTimes::from_times([3.0, 1.0, 2.0, 1.0]).unwrap();
        assert_eq!(times.iter().collect::<Vec<_>>(), vec![1.0, 2.0, 3.0]);
        assert_eq!(times.first(), Some(1.0));
    }

    #[test]
    fn rejects_nan() {
        let mut times = SyncTimes::new();
        assert_eq!(times.insert(f64::NAN), Err(SyncTimeError));
        assert!(times.is_empty());
    }

    #[test]
    fn drain_through_removes_passed_times() {
        let mut times = SyncTimes::from_times([1.0, 2.0, 3.0]).unwrap();
        assert_eq!(times.drain_through(2.0), 2);
        assert_eq!(times.first(), Some(3.0));
        assert_eq!(times.drain_through(0.5), 0);
        assert_eq!(times.len(), 1);
    }
}
