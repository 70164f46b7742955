use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::capability::{Capability, Overrides};
use super::evaluator::Scope;
use super::registry::WeakRegistry;
use crate::config::Strictness;

/// Every referral registered for capability `C`, by name.
///
/// The referrals are instantiated on first access, under the override
/// context the view was created with, and kept afterwards. A referral that
/// fails to initialize is left out rather than failing the collection.
pub struct Referrals<C: ?Sized> {
    registry: WeakRegistry,
    overrides: Overrides,
    strictness: Strictness,
    resolved: Arc<OnceLock<BTreeMap<String, Arc<C>>>>,
}

impl<C: ?Sized + Send + Sync + 'static> Referrals<C> {
    pub(crate) fn new(registry: WeakRegistry, overrides: Overrides, strictness: Strictness) -> Self {
        Self {
            registry,
            overrides,
            strictness,
            resolved: Arc::new(OnceLock::new()),
        }
    }

    fn resolved(&self) -> &BTreeMap<String, Arc<C>> {
        self.resolved.get_or_init(|| {
            let Some(registry) = self.registry.upgrade() else {
                return BTreeMap::new();
            };
            let capability = Capability::of::<C>();
            let scope = Scope::new(&registry, &self.overrides, self.strictness);

            registry
                .all_referrals(capability)
                .into_iter()
                .filter_map(|(name, implementation)| {
                    let instance = match implementation.initialize(&scope) {
                        Ok(instance) => instance,
                        Err(e) => {
                            tracing::warn!(%capability, referral = %name, error = %e, "skipping referral");
                            return None;
                        }
                    };
                    match instance.view::<C>() {
                        Some(view) => Some((name, view)),
                        None => {
                            tracing::warn!(
                                %capability,
                                referral = %name,
                                type_name = instance.type_name(),
                                "referral does not implement capability"
                            );
                            None
                        }
                    }
                })
                .collect()
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<C>> {
        self.resolved().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolved().contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resolved().keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<C>)> {
        self.resolved()
            .iter()
            .map(|(name, referral)| (name.as_str(), referral))
    }

    pub fn len(&self) -> usize {
        self.resolved().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved().is_empty()
    }
}

impl<C: ?Sized> Clone for Referrals<C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            overrides: self.overrides.clone(),
            strictness: self.strictness,
            resolved: Arc::clone(&self.resolved),
        }
    }
}

impl<C: ?Sized> fmt::Debug for Referrals<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Referrals")
            .field("overrides", &self.overrides)
            .field("resolved", &self.resolved.get().map(BTreeMap::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Referrals;
    use crate::bindings::capability::{override_with, Overrides};
    use crate::bindings::testing::*;
    use crate::config::Strictness;

    #[test]
    fn test_all_referrals_by_name() {
        let (registry, _) = registry();
        register_policies(&registry);

        let all = registry.all::<dyn Policy>(&Overrides::new());
        assert_eq!(all.len(), 2);
        assert_eq!(all.names().collect::<Vec<_>>(), vec!["p1", "p2"]);
        assert_eq!(all.get("p1").unwrap().name(), "one");
        assert!(!all.contains("default"));

        // shares the referral singletons
        let p2 = registry.get_named::<dyn Policy>("p2").unwrap();
        assert!(same(all.get("p2").as_ref().unwrap(), &p2));
    }

    #[test]
    fn test_failing_referral_is_absent() {
        let (registry, _) = registry();
        register_policies(&registry);
        registry
            .def::<NamedPolicy>()
            .iface_named::<dyn Policy>("broken", |p| p)
            .prop_required("label", "policy.broken.label")
            .register()
            .unwrap();

        let all = registry.all::<dyn Policy>(&Overrides::new());
        assert_eq!(all.names().collect::<Vec<_>>(), vec!["p1", "p2"]);
    }

    #[test]
    fn test_all_refs_parameter() {
        let (registry, _) = registry();
        register_policies(&registry);
        register_store(&registry);
        registry
            .def::<Catalog>()
            .all_refs::<dyn Policy>("policies")
            .all_refs::<dyn Store>("stores")
            .register()
            .unwrap();

        let catalog = registry.get::<Catalog>().unwrap();
        let policies = catalog.policies.as_ref().unwrap();
        assert_eq!(policies.len(), 2);
        assert_eq!(policies.iter().map(|(_, p)| p.name()).collect::<Vec<_>>(), vec!["one", "two"]);
        assert!(catalog.stores.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_all_refs_cache_key_follows_referral_dependencies() {
        let (registry, _) = registry();
        register_policies(&registry);
        register_store(&registry);
        registry
            .def::<PolicyStore>()
            .iface_named::<dyn Store>("s1", |s| s)
            .reference::<dyn Policy>("policy")
            .register()
            .unwrap();
        registry
            .def::<Catalog>()
            .all_refs::<dyn Store>("stores")
            .register()
            .unwrap();

        let plain = registry.get::<Catalog>().unwrap();
        let unrelated = registry
            .get_with::<Catalog>(&override_with::<dyn Unrelated>("x"))
            .unwrap();
        assert!(same(&plain, &unrelated));

        // the s1 referral consults Policy, so a Policy override is relevant
        let steered = registry
            .get_with::<Catalog>(&override_with::<dyn Policy>("p2"))
            .unwrap();
        assert!(!same(&plain, &steered));
        let store = steered.stores.as_ref().unwrap().get("s1").unwrap();
        assert_eq!(store.policy_name(), "two");
    }

    #[test]
    fn test_referrals_follow_strictness() {
        let (registry, properties) = registry();
        register_policies(&registry);
        registry
            .ternary::<dyn Policy>("flag", Some("p1"), Some("p2"))
            .named("chosen")
            .register()
            .unwrap();
        properties.set("flag", "yes");

        let strict = Referrals::<dyn Policy>::new(registry.downgrade(), Overrides::new(), Strictness::Strict);
        assert_eq!(strict.names().collect::<Vec<_>>(), vec!["p1", "p2"]);

        let lenient = registry.all::<dyn Policy>(&Overrides::new());
        assert_eq!(lenient.names().collect::<Vec<_>>(), vec!["chosen", "p1", "p2"]);
        assert_eq!(lenient.get("chosen").unwrap().name(), "two");
    }
}
