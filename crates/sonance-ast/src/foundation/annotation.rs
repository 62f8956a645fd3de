//! Annotation maps.
//!
//! Annotations are the `[[ key: value, ... ]]` metadata lists that can be
//! attached to modules, endpoints, functions and state variables. Keys map to
//! folded constant values and keep their declaration order, so rendering an
//! annotation back out is deterministic.

use crate::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered key→constant map attached to a declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    entries: IndexMap<String, Value>,
}

impl Annotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, returning false if the key was already present.
    ///
    /// Duplicate keys within one annotation are a validation error, which the
    /// caller reports with the annotation's span.
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> bool {
        self.entries.insert(key.into(), value).is_none()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Boolean property, false when absent or not coercible.
    pub fn get_bool(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.entries.get(key).and_then(Value::as_i64)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.entries.get(key).and_then(Value::as_f64)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_keys_detected() {
        let mut a = Annotation::new();
        assert!(a.set("main", Value::from_bool(true)));
        assert!(!a.set("main", Value::from_bool(false)));
        assert_eq!(a.len(), 1);
        assert!(a.get_bool("main"));
    }

    #[test]
    fn test_declaration_order_preserved() {
        let mut a = Annotation::new();
        a.set("min", Value::from_f32(0.0));
        a.set("max", Value::from_f32(1.0));
        a.set("init", Value::from_f32(0.5));
        let keys: Vec<&str> = a.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["min", "max", "init"]);
    }
}
