//! Per-stream packet counters shared with the control plane.

use indexmap::IndexMap;
use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

/// Identifies one counter: a stream, optionally qualified by camera.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterKey {
    stream: String,
    camera: Option<String>,
}

impl CounterKey {
    pub fn stream(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            camera: None,
        }
    }

    pub fn camera(stream: impl Into<String>, camera: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            camera: Some(camera.into()),
        }
    }

    pub fn stream_name(&self) -> &str {
        &self.stream
    }

    pub fn camera_name(&self) -> Option<&str> {
        self.camera.as_deref()
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.camera {
            Some(camera) => write!(f, "{}-{}", self.stream, camera),
            None => f.write_str(&self.stream),
        }
    }
}

/// Monotonic counters keyed by [CounterKey].
///
/// Cloning yields another handle to the same table. Entries appear on
/// their first increment, in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct StreamCounters {
    inner: Arc<RwLock<IndexMap<CounterKey, u64>>>,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter and return its new value.
    pub fn increment(&self, key: &CounterKey) -> u64 {
        let mut table = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let count = table.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, key: &CounterKey) -> u64 {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table.get(key).copied().unwrap_or(0)
    }

    /// Shorthand for looking up a counter by its parts.
    pub fn count(&self, stream: &str, camera: Option<&str>) -> u64 {
        let key = match camera {
            Some(camera) => CounterKey::camera(stream, camera),
            None => CounterKey::stream(stream),
        };
        self.get(&key)
    }

    /// Number of distinct counters seen so far.
    pub fn len(&self) -> usize {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of all counters keyed by their display name.
    pub fn snapshot(&self) -> IndexMap<String, u64> {
        let table = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        table
            .iter()
            .map(|(key, &count)| (key.to_string(), count))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(CounterKey::stream("left").to_string(), "left");
        assert_eq!(
            CounterKey::camera("previewout", "rgb").to_string(),
            "previewout-rgb"
        );
    }

    #[test]
    fn test_increment_is_lazy_and_monotonic() {
        let counters = StreamCounters::new();
        let key = CounterKey::stream("left");

        assert!(counters.is_empty());
        assert_eq!(counters.get(&key), 0);

        assert_eq!(counters.increment(&key), 1);
        assert_eq!(counters.increment(&key), 2);
        assert_eq!(counters.count("left", None), 2);
        assert_eq!(counters.len(), 1);
    }

    #[test]
    fn test_clones_share_table() {
        let counters = StreamCounters::new();
        let reader = counters.clone();

        counters.increment(&CounterKey::camera("nn", "rgb"));
        assert_eq!(reader.count("nn", Some("rgb")), 1);
        assert_eq!(reader.count("nn", Some("left")), 0);
    }

    #[test]
    fn test_snapshot_preserves_first_seen_order() {
        let counters = StreamCounters::new();
        counters.increment(&CounterKey::stream("right"));
        counters.increment(&CounterKey::stream("left"));
        counters.increment(&CounterKey::stream("right"));

        let snapshot = counters.snapshot();
        let keys: Vec<_> = snapshot.keys().cloned().collect();
        assert_eq!(keys, vec!["right".to_string(), "left".to_string()]);
        assert_eq!(snapshot["right"], 2);
    }
}
