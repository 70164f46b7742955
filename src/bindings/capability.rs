use std::any::{type_name, Any, TypeId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub(crate) type Erased = Arc<dyn Any + Send + Sync>;

/// Converts a concrete object into the type-erased `Arc<C>` of one
/// capability it implements.
pub(crate) type Upcast<T> = Arc<dyn Fn(Arc<T>) -> Erased + Send + Sync>;

/// Identity of an abstract contract, usually a `dyn Trait`.
#[derive(Clone, Copy)]
pub struct Capability {
    id: TypeId,
    name: &'static str,
}

impl Capability {
    pub fn of<C: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<C>(),
            name: type_name::<C>(),
        }
    }

    /// The Rust type name, e.g. `dyn app::cache::Policy`.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type path without the `dyn ` marker, e.g. `app::cache::Policy`.
    pub fn qualified_name(&self) -> &'static str {
        self.name.strip_prefix("dyn ").unwrap_or(self.name)
    }

    /// Property names that can override the default implementation: the
    /// qualified name, then the same path with `::` replaced by `.`.
    pub(crate) fn override_properties(&self) -> Vec<String> {
        let qualified = self.qualified_name();
        let dotted = qualified.replace("::", ".");
        if dotted == qualified {
            vec![dotted]
        } else {
            vec![qualified.to_string(), dotted]
        }
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Capability {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Capability {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name
            .cmp(other.name)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualified_name())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualified_name())
    }
}

/// Capability -> referral name, steering which alternative is chosen
/// anywhere deeper in the graph.
pub type Overrides = BTreeMap<Capability, String>;

/// Builds a single-entry [`Overrides`] selecting `referral` for `C`.
pub fn override_with<C: ?Sized + 'static>(referral: impl Into<String>) -> Overrides {
    Overrides::from([(Capability::of::<C>(), referral.into())])
}

/// A constructed object, shared by every request that maps onto the same
/// cache slot.
///
/// Holds the object type-erased together with one pre-computed view per
/// capability it was registered for. Clones are cheap and refer to the same
/// object.
#[derive(Clone)]
pub struct Instance {
    object: Erased,
    type_name: &'static str,
    views: Arc<HashMap<Capability, Erased>>,
}

impl Instance {
    pub(crate) fn new<T: Send + Sync + 'static>(object: Arc<T>, upcasts: &[(Capability, Upcast<T>)]) -> Self {
        let views = upcasts
            .iter()
            .map(|(capability, upcast)| (*capability, upcast(Arc::clone(&object))))
            .collect();
        Self {
            object,
            type_name: type_name::<T>(),
            views: Arc::new(views),
        }
    }

    /// Concrete type name of the object.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// The object as capability `C`, if it was registered for it.
    pub fn view<C: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<C>> {
        self.views
            .get(&Capability::of::<C>())?
            .downcast_ref::<Arc<C>>()
            .cloned()
    }

    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.object).downcast::<T>().ok()
    }

    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.views.keys().copied()
    }

    /// True if both handles refer to the same object.
    pub fn same(&self, other: &Instance) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.object), Arc::as_ptr(&other.object))
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("capabilities", &self.views.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn upcast<T, C>(convert: impl Fn(Arc<T>) -> Arc<C> + Send + Sync + 'static) -> Upcast<T>
where
    T: Send + Sync + 'static,
    C: ?Sized + Send + Sync + 'static,
{
    Arc::new(move |object| Arc::new(convert(object)) as Erased)
}
