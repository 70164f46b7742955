use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::capability::{Capability, Instance, Overrides};
use super::dependencies::DependencyNode;
use super::evaluator::{resolve_capability, Scope};
use super::referrals::Referrals;
use super::singleton::Implementation;
use crate::config::{OrderedResolver, Strictness};
use crate::Error;

#[derive(Default)]
struct Binding {
    default: Option<Arc<Implementation>>,
    referrals: BTreeMap<String, Arc<Implementation>>,
}

struct Inner {
    resolver: OrderedResolver,
    bindings: RwLock<HashMap<Capability, Binding>>,
    /// Last default-override value logged per capability.
    reported_overrides: Mutex<HashMap<Capability, String>>,
}

/// Maps capabilities to their default implementation and named referrals.
///
/// Cloning is cheap; clones share the same bindings. Implementations are
/// added through the definition methods ([`def`](Self::def),
/// [`builder`](Self::builder), [`ternary`](Self::ternary)) and resolved
/// through [`get`](Self::get) and friends.
///
/// The default of a capability can be redirected at runtime: if the property
/// named after the capability's type path (for example
/// `app::cache::Policy` or `app.cache.Policy`) is set, its value is used as a
/// referral name.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

/// A non-owning registry handle, held by objects that live inside the
/// registry's own caches.
#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<Inner>);

impl WeakRegistry {
    pub(crate) fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|inner| Registry { inner })
    }
}

impl Registry {
    pub fn new(resolver: OrderedResolver) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                bindings: RwLock::new(HashMap::new()),
                reported_overrides: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn resolver(&self) -> &OrderedResolver {
        &self.inner.resolver
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    /// Binds `implementation` as the default of `capability`, or as the
    /// referral named `referral`.
    pub(crate) fn register(
        &self,
        capability: Capability,
        implementation: Arc<Implementation>,
        referral: Option<&str>,
    ) -> Result<(), Error> {
        self.register_all(&[(capability, referral.map(str::to_string))], implementation)
    }

    /// Binds `implementation` under every `(capability, referral)` pair, or
    /// under none of them if any pair is already taken.
    pub(crate) fn register_all(
        &self,
        targets: &[(Capability, Option<String>)],
        implementation: Arc<Implementation>,
    ) -> Result<(), Error> {
        let mut bindings = self.inner.bindings.write();

        for (index, (capability, referral)) in targets.iter().enumerate() {
            let repeated = targets[..index].contains(&(*capability, referral.clone()));
            let binding = bindings.get(capability);
            match referral {
                None if repeated || binding.is_some_and(|b| b.default.is_some()) => {
                    tracing::error!(%capability, "duplicate default implementation");
                    return Err(Error::IllegalContent(format!(
                        "default implementation for {capability} is already bound"
                    )));
                }
                Some(name) if repeated || binding.is_some_and(|b| b.referrals.contains_key(name)) => {
                    tracing::error!(%capability, referral = %name, "duplicate referral");
                    return Err(Error::IllegalContent(format!(
                        "referral '{name}' for {capability} is already bound"
                    )));
                }
                _ => {}
            }
        }

        for (capability, referral) in targets {
            let binding = bindings.entry(*capability).or_default();
            match referral {
                None => {
                    tracing::debug!(%capability, type_name = implementation.type_name(), "bound default");
                    binding.default = Some(Arc::clone(&implementation));
                }
                Some(name) => {
                    tracing::debug!(
                        %capability,
                        referral = %name,
                        type_name = implementation.type_name(),
                        "bound referral"
                    );
                    binding.referrals.insert(name.clone(), Arc::clone(&implementation));
                }
            }
        }
        Ok(())
    }

    /// Every `(capability, referral)` pair `implementation` is bound under.
    pub(crate) fn bindings_of(&self, implementation: &Arc<Implementation>) -> Vec<(Capability, Option<String>)> {
        let bindings = self.inner.bindings.read();
        let mut bound = Vec::new();
        for (capability, binding) in bindings.iter() {
            if binding
                .default
                .as_ref()
                .is_some_and(|default| Arc::ptr_eq(default, implementation))
            {
                bound.push((*capability, None));
            }
            for (name, referral) in &binding.referrals {
                if Arc::ptr_eq(referral, implementation) {
                    bound.push((*capability, Some(name.clone())));
                }
            }
        }
        bound.sort();
        bound
    }

    /// The default implementation, unless a property named after the
    /// capability selects a referral instead.
    pub(crate) fn resolve_default(&self, capability: Capability) -> Result<Arc<Implementation>, Error> {
        if let Some((property, referral)) = self.default_override(capability) {
            self.report_override(capability, &property, &referral);
            return self.resolve_referral(capability, &referral);
        }

        self.inner
            .bindings
            .read()
            .get(&capability)
            .and_then(|binding| binding.default.clone())
            .ok_or_else(|| {
                Error::NotDefined(format!("no default implementation bound for {capability}"))
            })
    }

    pub(crate) fn resolve_referral(
        &self,
        capability: Capability,
        name: &str,
    ) -> Result<Arc<Implementation>, Error> {
        self.inner
            .bindings
            .read()
            .get(&capability)
            .and_then(|binding| binding.referrals.get(name).cloned())
            .ok_or_else(|| {
                Error::NotDefined(format!("no implementation named '{name}' bound for {capability}"))
            })
    }

    pub(crate) fn all_referrals(&self, capability: Capability) -> BTreeMap<String, Arc<Implementation>> {
        self.inner
            .bindings
            .read()
            .get(&capability)
            .map(|binding| binding.referrals.clone())
            .unwrap_or_default()
    }

    /// An explicit referral wins, then the override context, then the
    /// default.
    pub(crate) fn select(
        &self,
        capability: Capability,
        referral: Option<&str>,
        overrides: &Overrides,
    ) -> Result<Arc<Implementation>, Error> {
        match referral.or_else(|| overrides.get(&capability).map(String::as_str)) {
            Some(name) => self.resolve_referral(capability, name),
            None => self.resolve_default(capability),
        }
    }

    fn default_override(&self, capability: Capability) -> Option<(String, String)> {
        capability.override_properties().into_iter().find_map(|property| {
            self.inner
                .resolver
                .resolve(&property)
                .ok()
                .filter(|referral| !referral.is_empty())
                .map(|referral| (property, referral))
        })
    }

    fn report_override(&self, capability: Capability, property: &str, referral: &str) {
        let mut reported = self.inner.reported_overrides.lock();
        if reported.get(&capability).map(String::as_str) != Some(referral) {
            tracing::warn!(
                %capability,
                property,
                referral,
                "default implementation overridden by property"
            );
            reported.insert(capability, referral.to_string());
        }
    }

    /// The default implementation of `C`.
    pub fn get<C: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<C>, Error> {
        self.get_with::<C>(&Overrides::new())
    }

    /// The implementation of `C` selected by `overrides`, else the default.
    pub fn get_with<C: ?Sized + Send + Sync + 'static>(&self, overrides: &Overrides) -> Result<Arc<C>, Error> {
        view(self.instance::<C>(None, overrides)?)
    }

    pub fn get_named<C: ?Sized + Send + Sync + 'static>(&self, referral: &str) -> Result<Arc<C>, Error> {
        self.get_named_with::<C>(referral, &Overrides::new())
    }

    pub fn get_named_with<C: ?Sized + Send + Sync + 'static>(
        &self,
        referral: &str,
        overrides: &Overrides,
    ) -> Result<Arc<C>, Error> {
        view(self.instance::<C>(Some(referral), overrides)?)
    }

    /// The shared instance handle behind a lookup.
    pub fn instance<C: ?Sized + 'static>(
        &self,
        referral: Option<&str>,
        overrides: &Overrides,
    ) -> Result<Instance, Error> {
        let scope = Scope::new(self, overrides, Strictness::Lenient);
        resolve_capability(&scope, Capability::of::<C>(), referral)
    }

    /// Every referral of `C`, each initialized under `overrides` on first
    /// access. Referrals that fail to initialize are left out.
    pub fn all<C: ?Sized + Send + Sync + 'static>(&self, overrides: &Overrides) -> Referrals<C> {
        Referrals::new(self.downgrade(), overrides.clone(), Strictness::Lenient)
    }

    /// The dependency graph below the default implementation of `C`.
    pub fn dependencies<C: ?Sized + 'static>(&self) -> Result<DependencyNode, Error> {
        self.dependencies_with::<C>(None, &Overrides::new())
    }

    pub fn dependencies_named<C: ?Sized + 'static>(&self, referral: &str) -> Result<DependencyNode, Error> {
        self.dependencies_with::<C>(Some(referral), &Overrides::new())
    }

    /// The dependency graph of the implementation a lookup with the same
    /// arguments would build. Nothing is constructed.
    pub fn dependencies_with<C: ?Sized + 'static>(
        &self,
        referral: Option<&str>,
        overrides: &Overrides,
    ) -> Result<DependencyNode, Error> {
        let implementation = self.select(Capability::of::<C>(), referral, overrides)?;
        DependencyNode::build(self, implementation, overrides, None)
    }

    /// The dependency graph of every referral of `C`, by name.
    pub fn all_dependencies<C: ?Sized + 'static>(&self) -> Result<BTreeMap<String, DependencyNode>, Error> {
        let overrides = Overrides::new();
        self.all_referrals(Capability::of::<C>())
            .into_iter()
            .map(|(name, implementation)| {
                DependencyNode::build(self, implementation, &overrides, None).map(|node| (name, node))
            })
            .collect()
    }

    /// True if `C` has a default or at least one referral.
    pub fn is_bound<C: ?Sized + 'static>(&self) -> bool {
        self.inner
            .bindings
            .read()
            .get(&Capability::of::<C>())
            .is_some_and(|binding| binding.default.is_some() || !binding.referrals.is_empty())
    }

    pub fn referral_names<C: ?Sized + 'static>(&self) -> Vec<String> {
        self.all_referrals(Capability::of::<C>()).into_keys().collect()
    }

    /// Instantiates every registered implementation with strict coercion
    /// and collects failures per concrete type.
    ///
    /// Intended for build-time validation; it never fails itself.
    pub fn self_test(&self) -> BTreeMap<String, Vec<String>> {
        let implementations: Vec<Arc<Implementation>> = {
            let bindings = self.inner.bindings.read();
            let mut unique: Vec<Arc<Implementation>> = Vec::new();
            for binding in bindings.values() {
                for implementation in binding.default.iter().chain(binding.referrals.values()) {
                    if !unique.iter().any(|seen| Arc::ptr_eq(seen, implementation)) {
                        unique.push(Arc::clone(implementation));
                    }
                }
            }
            unique
        };

        let overrides = Overrides::new();
        let scope = Scope::new(self, &overrides, Strictness::Strict);
        let mut failures: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for implementation in implementations {
            if let Err(e) = implementation.initialize(&scope) {
                tracing::debug!(
                    type_name = implementation.type_name(),
                    error = %e,
                    "self-test failure"
                );
                failures
                    .entry(implementation.type_name().to_string())
                    .or_default()
                    .push(e.to_string());
            }
        }
        failures
    }
}

fn view<C: ?Sized + Send + Sync + 'static>(instance: Instance) -> Result<Arc<C>, Error> {
    instance.view::<C>().ok_or_else(|| {
        Error::IllegalContent(format!(
            "{} is not registered as an implementation of {}",
            instance.type_name(),
            Capability::of::<C>()
        ))
    })
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bindings = self.inner.bindings.read();
        let mut capabilities: Vec<_> = bindings.keys().collect();
        capabilities.sort();
        f.debug_struct("Registry")
            .field("capabilities", &capabilities)
            .field("resolver", &self.inner.resolver)
            .finish()
    }
}
