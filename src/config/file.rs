//! File-based property source.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};
use toml::{Table, Value};

use super::source::{ChangeListener, ChangeNotifier, PropertySource};
use super::ConfigError;

/// A property source backed by a TOML file.
///
/// Nested tables are flattened into dotted names, so
///
/// ```toml
/// [cache]
/// capacity = 128
/// tiers = ["ram", "disk"]
/// ```
///
/// defines `cache.capacity = "128"` and `cache.tiers = "[\"ram\",\"disk\"]"`.
/// Arrays are exposed as JSON text, which the structured coercions accept.
///
/// Required files that don't exist fail construction; optional ones start
/// empty. A file that disappears after construction reads as empty.
#[derive(Debug)]
pub struct FileSource {
    path: PathBuf,
    required: bool,
    properties: RwLock<BTreeMap<String, String>>,
    modified: Mutex<Option<SystemTime>>,
    notifier: ChangeNotifier,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>, required: bool) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let properties = match load_property_file(&path)? {
            Some(table) => flatten(&table),
            None if required => return Err(ConfigError::FileNotFound(path)),
            None => BTreeMap::new(),
        };

        Ok(Self {
            modified: Mutex::new(modified_at(&path)),
            path,
            required,
            properties: RwLock::new(properties),
            notifier: ChangeNotifier::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Re-reads the file, notifying subscribers if its content changed.
    ///
    /// On a parse or read error the previous content is kept, but the
    /// modification time is still recorded so a watcher retries only after
    /// the next edit.
    pub fn reload(&self) -> Result<(), ConfigError> {
        *self.modified.lock() = modified_at(&self.path);
        let fresh = match load_property_file(&self.path)? {
            Some(table) => flatten(&table),
            None => {
                tracing::debug!(path = %self.path.display(), "no property file found, treating as empty");
                BTreeMap::new()
            }
        };

        let changed = {
            let mut properties = self.properties.write();
            if *properties == fresh {
                false
            } else {
                *properties = fresh;
                true
            }
        };
        if changed {
            tracing::info!(path = %self.path.display(), "reloaded property file");
            self.notifier.notify();
        }
        Ok(())
    }

    /// True if the file's modification time moved since the last reload.
    fn changed_on_disk(&self) -> bool {
        modified_at(&self.path) != *self.modified.lock()
    }

    /// Spawns a thread that polls the file's modification time every
    /// `interval` and reloads it when it changes.
    ///
    /// The thread exits once the source has been dropped.
    pub fn watch(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let source: Weak<Self> = Arc::downgrade(self);
        std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            let Some(source) = source.upgrade() else {
                return;
            };

            if !source.changed_on_disk() {
                continue;
            }
            if let Err(e) = source.reload() {
                tracing::error!(path = %source.path.display(), error = %e, "failed to reload property file");
            }
        })
    }
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Loads and parses a TOML property file.
///
/// Returns `Ok(None)` if the file doesn't exist.
fn load_property_file(path: &Path) -> Result<Option<Table>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let table = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                source: e,
            })?;
            Ok(Some(table))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

fn flatten(table: &Table) -> BTreeMap<String, String> {
    let mut properties = BTreeMap::new();
    flatten_into(table, "", &mut properties);
    properties
}

fn flatten_into(table: &Table, prefix: &str, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Table(nested) => flatten_into(nested, &name, out),
            scalar => {
                out.insert(name, value_to_string(scalar));
            }
        }
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Datetime(dt) => dt.to_string(),
        Value::Array(_) | Value::Table(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
        }
    }
}

impl PropertySource for FileSource {
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
    use crate::config::OrderedResolver;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tempfile::NamedTempFile;

    /// Rewrites `path` and moves its modification time `ahead` into the
    /// future, so the change is visible regardless of timestamp resolution.
    fn rewrite(path: &Path, contents: &str, ahead: Duration) {
        std::fs::write(path, contents).unwrap();
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() + ahead).unwrap();
    }

    #[test]
    fn test_file_source_flattens_tables() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            name = "svc"
            [cache]
            capacity = 128
            enabled = true
            tiers = ["ram", "disk"]
            "#
        )
        .unwrap();

        let source = FileSource::new(file.path(), true).unwrap();

        assert_eq!(source.get("name").unwrap(), "svc");
        assert_eq!(source.get("cache.capacity").unwrap(), "128");
        assert_eq!(source.get("cache.enabled").unwrap(), "true");
        assert_eq!(source.get("cache.tiers").unwrap(), r#"["ram","disk"]"#);
        assert!(!source.is_set("cache"));
    }

    #[test]
    fn test_file_source_required_missing() {
        let result = FileSource::new("/nonexistent/path/config.toml", true);
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_file_source_optional_missing() {
        let source = FileSource::new("/nonexistent/path/config.toml", false).unwrap();
        assert!(source.names().is_empty());
    }

    #[test]
    fn test_file_source_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "not = = toml").unwrap();

        let result = FileSource::new(file.path(), true);
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_reload_notifies_only_on_change() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "level = \"info\"").unwrap();
        let source = FileSource::new(file.path(), true).unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        source.on_change(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        source.reload().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        std::fs::write(file.path(), "level = \"debug\"\n").unwrap();
        source.reload().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.get("level").unwrap(), "debug");
    }

    #[test]
    fn test_reload_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("props.toml");
        std::fs::write(&path, "a = 1\n").unwrap();

        let source = FileSource::new(&path, true).unwrap();
        assert!(source.is_set("a"));

        std::fs::remove_file(&path).unwrap();
        source.reload().unwrap();
        assert!(!source.is_set("a"));
    }

    #[test]
    fn test_failed_reload_waits_for_next_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("props.toml");
        std::fs::write(&path, "level = \"info\"\n").unwrap();
        let source = FileSource::new(&path, true).unwrap();

        rewrite(&path, "level = = broken\n", Duration::from_secs(5));
        assert!(source.changed_on_disk());
        assert!(matches!(source.reload(), Err(ConfigError::ParseError { .. })));
        assert!(!source.changed_on_disk());
        assert_eq!(source.get("level").unwrap(), "info");

        rewrite(&path, "level = \"warn\"\n", Duration::from_secs(10));
        assert!(source.changed_on_disk());
        source.reload().unwrap();
        assert_eq!(source.get("level").unwrap(), "warn");
    }

    #[test]
    fn test_watch_updates_live_cells() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("props.toml");
        std::fs::write(&path, "level = \"info\"\n").unwrap();
        let source = Arc::new(FileSource::new(&path, true).unwrap());
        let resolver = OrderedResolver::new().with_source("file", 0, source.clone());
        let level = resolver.resolve_modifiable("level");
        let _watcher = source.watch(Duration::from_millis(10));

        rewrite(&path, "level = \"debug\"\n", Duration::from_secs(5));
        let deadline = Instant::now() + Duration::from_secs(5);
        while level.get().as_deref() != Some("debug") && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(level.get().as_deref(), Some("debug"));
    }
}
