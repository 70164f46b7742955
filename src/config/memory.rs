//! In-memory property source.

use std::collections::{BTreeSet, HashMap};

use parking_lot::RwLock;

use super::source::{ChangeListener, ChangeNotifier, PropertySource};
use super::ConfigError;

/// A mutable, in-process property source.
///
/// Every mutation notifies subscribers, which is how tests and embedding
/// applications push configuration changes into live objects.
#[derive(Debug, Default)]
pub struct MemorySource {
    properties: RwLock<HashMap<String, String>>,
    notifier: ChangeNotifier,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.properties.write().insert(name.into(), value.into());
        self.notifier.notify();
    }

    pub fn set_all<K, V>(&self, properties: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        {
            let mut map = self.properties.write();
            for (name, value) in properties {
                map.insert(name.into(), value.into());
            }
        }
        self.notifier.notify();
    }

    pub fn remove(&self, name: &str) {
        self.properties.write().remove(name);
        self.notifier.notify();
    }

    pub fn clear(&self) {
        self.properties.write().clear();
        self.notifier.notify();
    }
}

impl PropertySource for MemorySource {
    fn is_set(&self, name: &str) -> bool {
        self.properties.read().contains_key(name)
    }

    fn get(&self, name: &str) -> Result<String, ConfigError> {
        self.properties
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::NotDefined(name.to_string()))
    }

    fn names(&self) -> BTreeSet<String> {
        self.properties.read().keys().cloned().collect()
    }

    fn on_change(&self, listener: ChangeListener) {
        self.notifier.subscribe(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_set_get_remove() {
        let source = MemorySource::new();
        source.set("db.host", "localhost");

        assert!(source.is_set("db.host"));
        assert_eq!(source.get("db.host").unwrap(), "localhost");

        source.remove("db.host");
        assert!(!source.is_set("db.host"));
        assert!(matches!(
            source.get("db.host"),
            Err(ConfigError::NotDefined(_))
        ));
    }

    #[test]
    fn test_names() {
        let source = MemorySource::new();
        source.set_all([("a", "1"), ("b", "2")]);

        let names: Vec<_> = source.names().into_iter().collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_every_mutation_notifies() {
        let source = MemorySource::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        source.on_change(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        source.set("a", "1");
        source.set_all([("b", "2")]);
        source.remove("a");
        source.clear();

        // one replay on subscribe plus four mutations
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
