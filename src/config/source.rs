use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::ConfigError;

/// Callback fired whenever a property source's content may have changed.
pub type ChangeListener = Arc<dyn Fn() + Send + Sync>;

/// A named provider of string values over a flat, dot-separated namespace.
///
/// Sources know nothing about precedence or name variants; the
/// [`OrderedResolver`](super::OrderedResolver) layers them.
pub trait PropertySource: Send + Sync + std::fmt::Debug {
    /// Returns true if `name` has a value in this source.
    fn is_set(&self, name: &str) -> bool;

    /// Returns the value of `name`, or [`ConfigError::NotDefined`].
    fn get(&self, name: &str) -> Result<String, ConfigError>;

    /// All names currently defined by this source.
    fn names(&self) -> BTreeSet<String>;

    /// Subscribes to change notifications.
    ///
    /// The listener is invoked once immediately so a subscriber never misses
    /// state that changed before it registered.
    fn on_change(&self, listener: ChangeListener);
}

/// Listener bookkeeping shared by the bundled sources.
#[derive(Default)]
pub struct ChangeNotifier {
    listeners: Mutex<Vec<ChangeListener>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: ChangeListener) {
        let count = {
            let mut listeners = self.listeners.lock();
            listeners.push(listener.clone());
            listeners.len()
        };
        tracing::debug!(listeners = count, "added property change listener");

        listener();
    }

    /// Invokes every listener in subscription order.
    ///
    /// The listener list is copied first, so listeners may subscribe further
    /// listeners without deadlocking.
    pub fn notify(&self) {
        let listeners = self.listeners.lock().clone();
        for listener in listeners {
            listener();
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.len())
            .finish()
    }
}
