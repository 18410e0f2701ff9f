use std::{collections::HashMap, fmt};

use crate::TimeFunction;

/// Read-only lookup of values published by other computed quantities.
///
/// Time steppers may be limited by postprocessor values (scalars recomputed
/// by the host framework every step) and by functions of time. Both are
/// looked up by name.
///
/// The unit type `()` implements `Values` with no entries.
pub trait Values {
    /// Returns the current value of the named postprocessor.
    fn postprocessor(&self, name: &str) -> Option<f64>;

    /// Returns the named function of time.
    fn function(&self, name: &str) -> Option<&dyn TimeFunction>;
}

impl Values for () {
    fn postprocessor(&self, _name: &str) -> Option<f64> {
        None
    }

    fn function(&self, _name: &str) -> Option<&dyn TimeFunction> {
        None
    }
}

/// A simple in-memory [`Values`] implementation.
#[derive(Default)]
pub struct ValueStore {
    postprocessors: HashMap<String, f64>,
    functions: HashMap<String, Box<dyn TimeFunction>>,
}

impl ValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or updates) a postprocessor value.
    pub fn set_postprocessor(&mut self, name: impl Into<String>, value: f64) {
        self.postprocessors.insert(name.into(), value);
    }

    /// Registers a function under `name`, replacing any previous one.
    pub fn add_function<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: TimeFunction + 'static,
    {
        self.functions.insert(name.into(), Box::new(function));
    }

    /// Builder-style variant of [`ValueStore::set_postprocessor`].
    #[must_use]
    pub fn with_postprocessor(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set_postprocessor(name, value);
        self
    }

    /// Builder-style variant of [`ValueStore::add_function`].
    #[must_use]
    pub fn with_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: TimeFunction + 'static,
    {
        self.add_function(name, function);
        self
    }
}

impl fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        functions.sort_unstable();
        f.debug_struct("ValueStore")
            .field("postprocessors", &self.postprocessors)
            .field("functions", &functions)
            .finish()
    }
}

impl Values for ValueStore {
    fn postprocessor(&self, name: &str) -> Option<f64> {
        self.postprocessors.get(name).copied()
    }

    fn function(&self, name: &str) -> Option<&dyn TimeFunction> {
        self.functions.get(name).map(|f| &**f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::PiecewiseLinear;

    #[test]
    fn store_looks_up_by_name() {
        let table = PiecewiseLinear::new(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        let store = ValueStore::new()
            .with_postprocessor("max_dt", 0.25)
            .with_function("load", table);

        assert_eq!(store.postprocessor("max_dt"), Some(0.25));
        assert_eq!(store.postprocessor("missing"), None);

        let load = store.function("load").expect("function registered");
        assert!(load.as_piecewise_linear().is_some());
        assert!(store.function("missing").is_none());
    }

    #[test]
    fn debug_lists_postprocessors_and_function_names() {
        let store = ValueStore::new()
            .with_postprocessor("max_dt", 0.5)
            .with_function("load", |t: f64| 2.0 * t);

        let text = format!("{store:?}");
        assert!(text.contains("max_dt"));
        assert!(text.contains("\"load\""));
    }

    #[test]
    fn unit_has_no_values() {
        assert_eq!(().postprocessor("anything"), None);
        assert!(().function("anything").is_none());
    }
}
