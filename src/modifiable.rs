//! Reactive value cells.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, RwLock};

type Listener<T> = Arc<dyn Fn(Option<&T>) + Send + Sync>;

struct Cell<T> {
    value: RwLock<Option<Arc<T>>>,
    listeners: Mutex<Vec<Listener<T>>>,
    /// Held across a write and its notifications so listeners observe
    /// updates in order. Reentrant so a listener may update its own cell.
    updating: ReentrantMutex<()>,
}

/// A shared, observable box holding the current value of something that can
/// change after the owning object was built.
///
/// Clones share the same cell. Listeners are notified synchronously, in
/// subscription order, on every [`set`](Self::set), and a new listener is
/// immediately replayed the current value. No lock on the value is held
/// while listeners run, so they may read or update the cell themselves.
///
/// ```
/// use dragon_ioc::Modifiable;
/// use std::sync::{Arc, Mutex};
///
/// let cell = Modifiable::new(1);
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// cell.add_listener(move |v| sink.lock().unwrap().push(v.copied()));
/// cell.set(Some(2));
/// cell.set(None);
/// assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(2), None]);
/// ```
pub struct Modifiable<T> {
    cell: Arc<Cell<T>>,
}

impl<T> Modifiable<T> {
    pub fn new(value: T) -> Self {
        Self::with(Some(value))
    }

    pub fn empty() -> Self {
        Self::with(None)
    }

    pub fn with(value: Option<T>) -> Self {
        Self {
            cell: Arc::new(Cell {
                value: RwLock::new(value.map(Arc::new)),
                listeners: Mutex::new(Vec::new()),
                updating: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn set(&self, value: Option<T>) {
        let _updating = self.cell.updating.lock();
        let value = value.map(Arc::new);
        *self.cell.value.write() = value.clone();

        let listeners = self.cell.listeners.lock().clone();
        for listener in &listeners {
            listener(value.as_deref());
        }
    }

    pub fn add_listener(&self, listener: impl Fn(Option<&T>) + Send + Sync + 'static) {
        let _updating = self.cell.updating.lock();
        let listener: Listener<T> = Arc::new(listener);
        listener(self.current().as_deref());
        self.cell.listeners.lock().push(listener);
    }

    pub fn is_set(&self) -> bool {
        self.cell.value.read().is_some()
    }

    /// Runs `f` against the current value without cloning it.
    pub fn with_value<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.current().as_deref())
    }

    /// True if both handles refer to the same cell.
    pub fn same_cell(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    fn current(&self) -> Option<Arc<T>> {
        self.cell.value.read().clone()
    }
}

impl<T: Clone> Modifiable<T> {
    pub fn get(&self) -> Option<T> {
        self.cell.value.read().as_deref().cloned()
    }
}

impl<T> Clone for Modifiable<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T> Default for Modifiable<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: fmt::Debug> fmt::Debug for Modifiable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_value(|value| f.debug_tuple("Modifiable").field(&value).finish())
    }
}

impl<T: fmt::Display> fmt::Display for Modifiable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_value(|value| match value {
            Some(value) => value.fmt(f),
            None => f.write_str("null"),
        })
    }
}

impl<T: PartialEq + Clone> PartialEq for Modifiable<T> {
    fn eq(&self, other: &Self) -> bool {
        // never hold both locks at once
        self.same_cell(other) || self.get() == other.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set() {
        let cell = Modifiable::empty();
        assert_eq!(cell.get(), None::<u32>);
        assert!(!cell.is_set());

        cell.set(Some(3));
        assert_eq!(cell.get(), Some(3));
        assert!(cell.is_set());
    }

    #[test]
    fn test_listener_replays_current_value() {
        let cell = Modifiable::new("a".to_string());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        cell.add_listener(move |v| sink.lock().push(v.cloned()));

        assert_eq!(*seen.lock(), vec![Some("a".to_string())]);
    }

    #[test]
    fn test_listeners_notified_in_order() {
        let cell = Modifiable::empty();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for id in 0..3 {
            let sink = seen.clone();
            cell.add_listener(move |v: Option<&u8>| sink.lock().push((id, v.copied())));
        }
        seen.lock().clear();

        cell.set(Some(9));
        assert_eq!(*seen.lock(), vec![(0, Some(9)), (1, Some(9)), (2, Some(9))]);
    }

    #[test]
    fn test_clones_share_the_cell() {
        let cell = Modifiable::new(1);
        let other = cell.clone();
        other.set(Some(2));

        assert_eq!(cell.get(), Some(2));
        assert!(cell.same_cell(&other));
        assert!(!cell.same_cell(&Modifiable::new(2)));
        assert_eq!(cell, Modifiable::new(2));
    }

    #[test]
    fn test_chained_cells() {
        let source = Modifiable::new(2u32);
        let doubled = Modifiable::empty();
        let target = doubled.clone();
        source.add_listener(move |v| target.set(v.map(|v| v * 2)));

        assert_eq!(doubled.get(), Some(4));
        source.set(Some(5));
        assert_eq!(doubled.get(), Some(10));
        source.set(None);
        assert_eq!(doubled.get(), None);
    }

    #[test]
    fn test_listener_can_read_and_update_its_own_cell() {
        let cell = Modifiable::new(1u32);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (sink, handle) = (seen.clone(), cell.clone());
        cell.add_listener(move |v| {
            sink.lock().push((v.copied(), handle.get()));
            if v.is_some_and(|v| *v > 10) {
                handle.set(Some(10));
            }
        });

        cell.set(Some(20));
        assert_eq!(cell.get(), Some(10));
        assert_eq!(
            *seen.lock(),
            vec![(Some(1), Some(1)), (Some(20), Some(20)), (Some(10), Some(10))]
        );
    }

    #[test]
    fn test_listener_subscribing_during_notification() {
        let cell = Modifiable::new(0u8);
        let late = Arc::new(Mutex::new(Vec::new()));
        let (sink, handle) = (late.clone(), cell.clone());
        cell.add_listener(move |v| {
            if v == Some(&1) {
                let sink = sink.clone();
                handle.add_listener(move |v| sink.lock().push(v.copied()));
            }
        });

        cell.set(Some(1));
        cell.set(Some(2));
        assert_eq!(*late.lock(), vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_display() {
        assert_eq!(Modifiable::new(5).to_string(), "5");
        assert_eq!(Modifiable::<u8>::empty().to_string(), "null");
    }
}
