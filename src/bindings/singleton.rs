use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};

use parking_lot::Mutex;

use super::capability::{Capability, Instance, Overrides};
use super::dependencies::Edge;
use super::evaluator::Scope;
use super::factory::ImplementationFactory;
use crate::Error;

thread_local! {
    /// Implementations being built or traversed on this thread, innermost
    /// last.
    static ACTIVE: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

/// Marks an implementation as active on the current thread until dropped.
pub(crate) struct Active(usize);

impl Active {
    /// `None` if the implementation is already active, i.e. it was reached
    /// again through its own dependencies.
    fn enter(implementation: &Implementation) -> Option<Self> {
        let id = implementation as *const Implementation as usize;
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&id) {
                return None;
            }
            active.push(id);
            Some(Self(id))
        })
    }
}

impl Drop for Active {
    fn drop(&mut self) {
        ACTIVE.with(|active| {
            let mut active = active.borrow_mut();
            if let Some(position) = active.iter().rposition(|id| *id == self.0) {
                active.remove(position);
            }
        });
    }
}

/// A registered factory plus its override-scoped instance cache.
///
/// Requests are keyed by the part of their override context this factory can
/// actually observe, so contexts that differ only in unrelated capabilities
/// share one instance. Construction for a key happens at most once; failures
/// are not cached.
pub(crate) struct Implementation {
    factory: Box<dyn ImplementationFactory>,
    /// Overrides fixed at registration. They shadow the caller's.
    fixed: Overrides,
    instances: Mutex<HashMap<Overrides, Instance>>,
}

impl Implementation {
    pub(crate) fn new(factory: Box<dyn ImplementationFactory>, fixed: Overrides) -> Self {
        Self {
            factory,
            fixed,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn type_name(&self) -> &str {
        self.factory.type_name()
    }

    pub(crate) fn combine(&self, overrides: &Overrides) -> Overrides {
        let mut combined = overrides.clone();
        combined.extend(self.fixed.iter().map(|(c, r)| (*c, r.clone())));
        combined
    }

    /// Fails if this implementation is already being built or traversed on
    /// the current thread.
    pub(crate) fn enter(&self) -> Result<Active, Error> {
        Active::enter(self).ok_or_else(|| {
            tracing::error!(type_name = self.type_name(), "dependency cycle");
            Error::Initialization {
                type_name: self.type_name().to_string(),
                reason: "dependency cycle: the implementation depends on itself".to_string(),
            }
        })
    }

    pub(crate) fn initialize(&self, scope: &Scope<'_>) -> Result<Instance, Error> {
        let _active = self.enter()?;
        let combined = self.combine(scope.overrides);
        let scope = scope.with_overrides(&combined);

        let key: Overrides = if combined.is_empty() {
            Overrides::new()
        } else {
            let mut refs = BTreeSet::new();
            self.factory.default_refs(&scope, &mut refs);
            combined
                .iter()
                .filter(|(capability, _)| refs.contains(*capability))
                .map(|(capability, referral)| (*capability, referral.clone()))
                .collect()
        };

        // held through construction so concurrent requests for a key build once
        let mut instances = self.instances.lock();
        if let Some(instance) = instances.get(&key) {
            return Ok(instance.clone());
        }

        let instance = self.factory.initialize(&scope)?;
        tracing::debug!(
            type_name = self.type_name(),
            overrides = ?key,
            "created instance"
        );
        instances.insert(key, instance.clone());
        Ok(instance)
    }

    /// Capabilities a caller's override context can influence. Capabilities
    /// pinned by this implementation's fixed overrides are excluded.
    pub(crate) fn default_refs(&self, scope: &Scope<'_>, refs: &mut BTreeSet<Capability>) {
        // a cycle fails at initialization instead
        let Some(_active) = Active::enter(self) else {
            return;
        };
        let combined = self.combine(scope.overrides);
        let mut own = BTreeSet::new();
        self.factory
            .default_refs(&scope.with_overrides(&combined), &mut own);
        refs.extend(own.into_iter().filter(|c| !self.fixed.contains_key(c)));
    }

    /// Edges to the implementations consulted under `scope`, which must
    /// already carry this implementation's fixed overrides.
    pub(crate) fn dependencies(&self, scope: &Scope<'_>) -> Result<Vec<Edge>, Error> {
        let mut edges = Vec::new();
        self.factory.dependencies(scope, &mut edges)?;
        Ok(edges)
    }

    #[cfg(test)]
    pub(crate) fn cached(&self) -> usize {
        self.instances.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use crate::bindings::testing::*;
    use crate::bindings::{Configure, Wiring};
    use crate::Error;

    #[derive(Default)]
    struct Echo {
        inner: Option<Arc<dyn Policy>>,
    }

    impl Configure for Echo {
        fn wiring(wiring: &mut Wiring<Self>) {
            wiring.reference("inner", |e| &mut e.inner);
        }
    }

    impl Policy for Echo {
        fn name(&self) -> String {
            self.inner.as_ref().map(|p| p.name()).unwrap_or_default()
        }
    }

    #[test]
    fn test_concurrent_requests_build_once() {
        let (registry, _) = registry();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = built.clone();
        registry
            .def_with::<NamedPolicy, _>(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Ok(NamedPolicy {
                    label: "slow".to_string(),
                })
            })
            .iface::<dyn Policy>(|p| p)
            .register()
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.get::<dyn Policy>().unwrap())
            })
            .collect();
        let policies: Vec<Arc<dyn Policy>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(policies.iter().all(|p| same(p, &policies[0])));
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let (registry, _) = registry();
        registry
            .def::<Echo>()
            .iface::<dyn Policy>(|e| e)
            .reference::<dyn Policy>("inner")
            .register()
            .unwrap();

        let result = registry.get::<dyn Policy>();
        assert!(matches!(result, Err(Error::Initialization { .. })));
        let graph = registry.dependencies::<dyn Policy>();
        assert!(matches!(graph, Err(Error::Initialization { .. })));
    }

    #[test]
    fn test_cycle_leaves_other_lookups_working() {
        let (registry, _) = registry();
        register_policies(&registry);
        registry
            .def::<Echo>()
            .iface_named::<dyn Policy>("echo", |e| e)
            .reference_named::<dyn Policy>("inner", "echo")
            .register()
            .unwrap();

        assert!(registry.get_named::<dyn Policy>("echo").is_err());
        assert_eq!(registry.get::<dyn Policy>().unwrap().name(), "default");
    }

    #[test]
    fn test_decorator_reaches_the_overridden_referral() {
        let (registry, _) = registry();
        register_policies(&registry);
        registry
            .def::<Echo>()
            .iface_named::<dyn Policy>("echo", |e| e)
            .with_ref::<dyn Policy>("p1")
            .reference::<dyn Policy>("inner")
            .register()
            .unwrap();

        assert_eq!(registry.get_named::<dyn Policy>("echo").unwrap().name(), "one");
    }
}
