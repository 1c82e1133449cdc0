//! Run results registry.
//!
//! An explicit context object with publish key -> value semantics, passed
//! into the solver and read by the caller after the run.

use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct EnergyResults {
    order: Vec<String>,
    values: HashMap<String, f64>,
}

impl EnergyResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a named scalar result. Re-publishing a key overwrites the
    /// value but keeps its original position in the report.
    pub fn publish(&mut self, key: impl Into<String>, value: f64) {
        let key = key.into();
        if !self.values.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate results in publication order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.order.iter().map(|k| (k.as_str(), self.values[k]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_and_get() {
        let mut results = EnergyResults::new();
        results.publish("MP2 CORRELATION ENERGY", -0.25);
        results.publish("CURRENT ENERGY", -76.1);
        assert_eq!(results.get("MP2 CORRELATION ENERGY"), Some(-0.25));
        assert_eq!(results.get("MISSING"), None);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn republish_keeps_order() {
        let mut results = EnergyResults::new();
        results.publish("A", 1.0);
        results.publish("B", 2.0);
        results.publish("A", 3.0);
        let keys: Vec<_> = results.iter().map(|(k, _)| k.to_string()).collect();
        assert_eq!(keys, vec!["A", "B"]);
        assert_eq!(results.get("A"), Some(3.0));
    }
}
