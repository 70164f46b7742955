use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};

use super::coerce::{Coerce, Strictness};
use super::naming;
use super::source::{ChangeListener, ChangeNotifier, PropertySource};
use super::ConfigError;
use crate::modifiable::Modifiable;

#[derive(Default)]
struct Layers {
    /// Precedence slot -> source kind.
    kinds: BTreeMap<u8, String>,
    sources: HashMap<String, Arc<dyn PropertySource>>,
    default_prefixes: Vec<String>,
    non_substitutable_prefixes: Vec<String>,
}

impl Layers {
    /// Registered sources, highest precedence first.
    fn ordered_sources(&self) -> Vec<Arc<dyn PropertySource>> {
        self.kinds
            .values()
            .rev()
            .filter_map(|kind| self.sources.get(kind).cloned())
            .collect()
    }
}

struct Inner {
    layers: RwLock<Layers>,
    cells: Mutex<HashMap<String, Modifiable<String>>>,
    /// Serializes reloads. Reentrant because a cell listener may change a
    /// source and trigger a nested reload.
    reloading: ReentrantMutex<()>,
    notifier: ChangeNotifier,
}

/// Aggregates prioritized property sources into one logical namespace.
///
/// A lookup sweeps every source from highest to lowest precedence, trying
/// each spelling variant of the name (see [`naming::variants`]) against a
/// source before moving on to the next one. If nothing matches, and the name
/// does not start with a non-substitutable prefix, the sweep is repeated with
/// a leading default prefix stripped and then with every default prefix
/// prepended.
///
/// [`resolve_modifiable`](Self::resolve_modifiable) hands out one shared
/// [`Modifiable`] per name. When any source reports a change, every
/// handed-out cell is re-resolved and updated in place if its value moved.
///
/// ```
/// use dragon_ioc::{MemorySource, OrderedResolver};
/// use std::sync::Arc;
///
/// let defaults = Arc::new(MemorySource::new());
/// defaults.set("cache.max_delay", "10");
/// let overrides = Arc::new(MemorySource::new());
///
/// let resolver = OrderedResolver::new()
///     .with_source("defaults", 0, defaults.clone())
///     .with_source("run", 10, overrides.clone());
///
/// let delay = resolver.resolve_modifiable("cache.maxDelay");
/// assert_eq!(delay.get().as_deref(), Some("10"));
///
/// overrides.set("cache.maxDelay", "20");
/// assert_eq!(delay.get().as_deref(), Some("20"));
/// ```
#[derive(Clone)]
pub struct OrderedResolver {
    inner: Arc<Inner>,
}

impl OrderedResolver {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                layers: RwLock::new(Layers::default()),
                cells: Mutex::new(HashMap::new()),
                reloading: ReentrantMutex::new(()),
                notifier: ChangeNotifier::new(),
            }),
        }
    }

    /// Announces `kind` at precedence `order` and registers `source` for it.
    #[must_use]
    pub fn with_source(self, kind: &str, order: u8, source: Arc<dyn PropertySource>) -> Self {
        self.announce(kind, order);
        // announced just above, so registration cannot fail
        let _ = self.register(kind, Some(source));
        self
    }

    #[must_use]
    pub fn with_default_prefix(self, prefix: impl Into<String>) -> Self {
        self.add_default_prefix(prefix);
        self
    }

    #[must_use]
    pub fn with_non_substitutable_prefixes<I, S>(self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_non_substitutable_prefixes(prefixes);
        self
    }

    /// Declares a source kind at a precedence slot. Higher orders win.
    ///
    /// Re-announcing a kind moves it; announcing into an occupied slot
    /// evicts the kind that held it.
    pub fn announce(&self, kind: &str, order: u8) {
        let mut layers = self.inner.layers.write();
        layers.kinds.retain(|_, k| k != kind);
        layers.kinds.insert(order, kind.to_string());
    }

    pub fn order_of(&self, kind: &str) -> Option<u8> {
        self.inner
            .layers
            .read()
            .kinds
            .iter()
            .find(|(_, k)| k.as_str() == kind)
            .map(|(order, _)| *order)
    }

    /// Announced kinds, highest precedence first.
    pub fn announced_kinds(&self) -> Vec<String> {
        self.inner.layers.read().kinds.values().rev().cloned().collect()
    }

    /// Registers (or with `None`, unregisters) the source for an announced
    /// kind.
    pub fn register(
        &self,
        kind: &str,
        source: Option<Arc<dyn PropertySource>>,
    ) -> Result<(), ConfigError> {
        {
            let mut layers = self.inner.layers.write();
            if !layers.kinds.values().any(|k| k == kind) {
                return Err(ConfigError::UnannouncedSource(kind.to_string()));
            }
            match &source {
                Some(source) => {
                    layers.sources.insert(kind.to_string(), source.clone());
                }
                None => {
                    layers.sources.remove(kind);
                }
            }
        }

        match source {
            Some(source) => {
                tracing::debug!(kind, "registered property source");
                let resolver = Arc::downgrade(&self.inner);
                source.on_change(Arc::new(move || reload_weak(&resolver)));
            }
            None => self.reload(),
        }
        Ok(())
    }

    pub fn source(&self, kind: &str) -> Result<Option<Arc<dyn PropertySource>>, ConfigError> {
        let layers = self.inner.layers.read();
        if !layers.kinds.values().any(|k| k == kind) {
            return Err(ConfigError::UnannouncedSource(kind.to_string()));
        }
        Ok(layers.sources.get(kind).cloned())
    }

    pub fn add_default_prefix(&self, prefix: impl Into<String>) {
        self.inner.layers.write().default_prefixes.push(prefix.into());
    }

    pub fn set_default_prefixes<I, S>(&self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.layers.write().default_prefixes = prefixes.into_iter().map(Into::into).collect();
    }

    pub fn default_prefixes(&self) -> Vec<String> {
        self.inner.layers.read().default_prefixes.clone()
    }

    /// Names starting with one of these prefixes are never retried under a
    /// default prefix.
    pub fn set_non_substitutable_prefixes<I, S>(&self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.layers.write().non_substitutable_prefixes =
            prefixes.into_iter().map(Into::into).collect();
    }

    pub fn non_substitutable_prefixes(&self) -> Vec<String> {
        self.inner.layers.read().non_substitutable_prefixes.clone()
    }

    pub fn resolve(&self, name: &str) -> Result<String, ConfigError> {
        self.lookup(name)
            .ok_or_else(|| ConfigError::NotDefined(name.to_string()))
    }

    /// Resolves `name` and coerces it to `T`.
    pub fn resolve_as<T: Coerce>(&self, name: &str) -> Result<T, ConfigError> {
        T::coerce(&self.resolve(name)?, Strictness::Lenient)
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Returns the live cell for `name`, creating it on first request.
    ///
    /// The cell starts empty if `name` is not defined, and is kept current by
    /// every subsequent source change.
    pub fn resolve_modifiable(&self, name: &str) -> Modifiable<String> {
        let mut cells = self.inner.cells.lock();
        if let Some(cell) = cells.get(name) {
            return cell.clone();
        }
        let cell = Modifiable::with(self.lookup(name));
        cells.insert(name.to_string(), cell.clone());
        cell
    }

    /// Re-resolves every name with a live cell and updates cells whose value
    /// changed, then notifies this resolver's own listeners.
    ///
    /// Cells are updated without holding the cell table, so their listeners
    /// may resolve further properties.
    pub fn reload(&self) {
        let _reloading = self.inner.reloading.lock();
        let cells: Vec<(String, Modifiable<String>)> = self
            .inner
            .cells
            .lock()
            .iter()
            .map(|(name, cell)| (name.clone(), cell.clone()))
            .collect();

        for (name, cell) in cells {
            let current = self.lookup(&name);
            if cell.with_value(|previous| previous != current.as_ref()) {
                tracing::debug!(name, value = ?current, "property changed");
                cell.set(current);
            }
        }
        self.inner.notifier.notify();
    }

    fn lookup(&self, name: &str) -> Option<String> {
        let (sources, default_prefixes, substitutable) = {
            let layers = self.inner.layers.read();
            let substitutable = !layers
                .non_substitutable_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str()));
            (
                layers.ordered_sources(),
                layers.default_prefixes.clone(),
                substitutable,
            )
        };

        if let Some(value) = sweep(&sources, name) {
            return Some(value);
        }
        if !substitutable {
            return None;
        }

        if let Some(prefix) = default_prefixes
            .iter()
            .find(|prefix| name.starts_with(prefix.as_str()))
        {
            if let Some(value) = sweep(&sources, &name[prefix.len()..]) {
                return Some(value);
            }
        }
        default_prefixes
            .iter()
            .find_map(|prefix| sweep(&sources, &format!("{prefix}{name}")))
    }
}

fn reload_weak(resolver: &Weak<Inner>) {
    if let Some(inner) = resolver.upgrade() {
        OrderedResolver { inner }.reload();
    }
}

/// First hit across sources (outer) and name variants (inner).
fn sweep(sources: &[Arc<dyn PropertySource>], name: &str) -> Option<String> {
    let variants = naming::variants(name);
    sources.iter().find_map(|source| {
        variants
            .iter()
            .filter(|variant| source.is_set(variant))
            .find_map(|variant| source.get(variant).ok())
    })
}

impl Default for OrderedResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for OrderedResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layers = self.inner.layers.read();
        f.debug_struct("OrderedResolver")
            .field("kinds", &layers.kinds)
            .field("default_prefixes", &layers.default_prefixes)
            .field("non_substitutable_prefixes", &layers.non_substitutable_prefixes)
            .field("cells", &self.inner.cells.lock().len())
            .finish()
    }
}

impl PropertySource for OrderedResolver {
    fn is_set(&self, name: &str) -> bool {
        OrderedResolver::is_set(self, name)
    }

    fn get(&self, name: &str) -> Result<String, ConfigError> {
        self.resolve(name)
    }

    fn names(&self) -> BTreeSet<String> {
        self.inner
            .layers
            .read()
            .sources
            .values()
            .flat_map(|source| source.names())
            .collect()
    }

    fn on_change(&self, listener: ChangeListener) {
        self.inner.notifier.subscribe(listener);
    }
}
