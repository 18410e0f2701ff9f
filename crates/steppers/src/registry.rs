use crate::{Error, TimeStepper};

/// An ordered collection of uniquely named time steppers.
///
/// The registry is handed by value to a [`CompositionDt`](crate::CompositionDt)
/// or a [`TimeStepperSystem`](crate::TimeStepperSystem), which then own the
/// steppers for the rest of the run.
#[derive(Debug, Default)]
pub struct Registry {
    steppers: Vec<TimeStepper>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stepper.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateStepper`] if a stepper with the same name exists.
    pub fn insert(&mut self, stepper: TimeStepper) -> Result<(), Error> {
        if self.contains(stepper.name()) {
            return Err(Error::DuplicateStepper {
                name: stepper.name().to_owned(),
            });
        }
        self.steppers.push(stepper);
        Ok(())
    }

    /// Builder-style variant of [`Registry::insert`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateStepper`] if a stepper with the same name exists.
    pub fn with(mut self, stepper: TimeStepper) -> Result<Self, Error> {
        self.insert(stepper)?;
        Ok(self)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.steppers.iter().position(|s| s.name() == name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TimeStepper> {
        self.steppers.iter().find(|s| s.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut TimeStepper> {
        self.steppers.iter_mut().find(|s| s.name() == name)
    }

    /// Removes and returns the named stepper.
    pub fn remove(&mut self, name: &str) -> Option<TimeStepper> {
        let index = self.position(name)?;
        Some(self.steppers.remove(index))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steppers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steppers.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steppers.iter().map(TimeStepper::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeStepper> {
        self.steppers.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TimeStepper> {
        self.steppers.iter_mut()
    }

    pub(crate) fn into_vec(self) -> Vec<TimeStepper> {
        self.steppers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::{CommonParams, Policy, TestSourceParams, TestSourceStepper};

    fn source(name: &str) -> TimeStepper {
        let policy = TestSourceStepper::new(name, TestSourceParams { dt: 1.0 }).unwrap();
        TimeStepper::new(name, CommonParams::default(), Policy::TestSource(policy)).unwrap()
    }

    #[test]
    fn keeps_insertion_order() {
        let registry = Registry::new()
            .with(source("b"))
            .and_then(|r| r.with(source("a")))
            .unwrap();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(registry.position("a"), Some(1));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut registry = Registry::new();
        registry.insert(source("a")).unwrap();
        assert!(matches!(
            registry.insert(source("a")),
            Err(Error::DuplicateStepper { name }) if name == "a"
        ));
    }

    #[test]
    fn removes_by_name() {
        let mut registry = Registry::new().with(source("a")).unwrap();
        assert!(registry.remove("a").is_some());
        assert!(registry.is_empty());
        assert!(registry.remove("a").is_none());
    }
}
