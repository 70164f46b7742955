use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use super::source::{ChangeListener, ChangeNotifier, PropertySource};
use super::ConfigError;

/// Exposes environment variables as dotted property names.
///
/// With prefix `MYAPP` and separator `__`, the variable
/// `MYAPP__DATABASE__HOST` is visible as `database.host`. Path segments are
/// lowercased. The environment is captured when the source is created and
/// again on [`refresh`](Self::refresh).
#[derive(Debug)]
pub struct EnvSource {
    prefix: String,
    separator: String,
    snapshot: RwLock<BTreeMap<String, String>>,
    notifier: ChangeNotifier,
}

impl EnvSource {
    /// # Panics
    ///
    /// Panics if `separator` is empty.
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        let separator = separator.into();
        assert!(!separator.is_empty(), "separator must not be empty");
        let prefix = prefix.into();
        let snapshot = capture(&prefix, &separator);
        Self {
            prefix,
            separator,
            snapshot: RwLock::new(snapshot),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Re-reads the environment, notifying subscribers if anything changed.
    pub fn refresh(&self) {
        let fresh = capture(&self.prefix, &self.separator);
        let changed = {
            let mut snapshot = self.snapshot.write();
            if *snapshot == fresh {
                false
            } else {
                *snapshot = fresh;
                true
            }
        };
        if changed {
            tracing::debug!(prefix = %self.prefix, "environment properties changed");
            self.notifier.notify();
        }
    }
}

fn capture(prefix: &str, separator: &str) -> BTreeMap<String, String> {
    let prefix_with_sep = format!("{prefix}{separator}");
    let mut properties = BTreeMap::new();

    for (key, value) in std::env::vars() {
        let Some(path) = key.strip_prefix(&prefix_with_sep) else {
            continue;
        };
        if path.is_empty() {
            continue;
        }

        let name = path
            .split(separator)
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(".");
        properties.insert(name, value);
    }

    properties
}

impl PropertySource for EnvSource {
    fn is_set(&self, name: &str) -> bool {
        self.snapshot.read().contains_key(name)
    }

    fn get(&self, name: &str) -> Result<String, ConfigError> {
        self.snapshot
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::NotDefined(name.to_string()))
    }

    fn names(&self) -> BTreeSet<String> {
        self.snapshot.read().keys().cloned().collect()
    }

    fn on_change(&self, listener: ChangeListener) {
        self.notifier.subscribe(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maps_variables_to_dotted_names() {
        std::env::set_var("DIOC_ENV_A__DATABASE__HOST", "db.internal");
        std::env::set_var("DIOC_ENV_A__PORT", "5432");
        std::env::set_var("DIOC_ENV_A__", "ignored");

        let source = EnvSource::new("DIOC_ENV_A", "__");

        assert_eq!(source.get("database.host").unwrap(), "db.internal");
        assert_eq!(source.get("port").unwrap(), "5432");
        assert!(!source.is_set(""));
        assert_eq!(source.names().len(), 2);
    }

    #[test]
    fn test_refresh_picks_up_changes() {
        std::env::set_var("DIOC_ENV_B__LEVEL", "info");
        let source = EnvSource::new("DIOC_ENV_B", "__");
        assert_eq!(source.get("level").unwrap(), "info");

        std::env::set_var("DIOC_ENV_B__LEVEL", "debug");
        assert_eq!(source.get("level").unwrap(), "info");

        source.refresh();
        assert_eq!(source.get("level").unwrap(), "debug");

        std::env::remove_var("DIOC_ENV_B__LEVEL");
        source.refresh();
        assert!(!source.is_set("level"));
    }

    #[test]
    #[should_panic(expected = "separator must not be empty")]
    fn test_empty_separator_panics() {
        let _ = EnvSource::new("X", "");
    }
}
