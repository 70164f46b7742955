//! Shared fixtures for the binding tests.

use std::sync::Arc;

use super::{Configure, Referrals, Registry, Wiring};
use crate::config::{MemorySource, OrderedResolver};
use crate::{Error, Modifiable};

pub(crate) trait Policy: Send + Sync {
    fn name(&self) -> String;
}

pub(crate) trait Store: Send + Sync {
    fn policy(&self) -> Option<Arc<dyn Policy>>;

    fn policy_name(&self) -> String {
        self.policy().map(|p| p.name()).unwrap_or_default()
    }
}

/// Never bound; only used as an override key nothing depends on.
pub(crate) trait Unrelated: Send + Sync {}

#[derive(Default)]
pub(crate) struct NamedPolicy {
    pub label: String,
}

impl Configure for NamedPolicy {
    fn wiring(wiring: &mut Wiring<Self>) {
        wiring.value("label", |p| &mut p.label);
    }
}

impl Policy for NamedPolicy {
    fn name(&self) -> String {
        self.label.clone()
    }
}

#[derive(Default)]
pub(crate) struct PolicyStore {
    pub policy: Option<Arc<dyn Policy>>,
}

impl Configure for PolicyStore {
    fn wiring(wiring: &mut Wiring<Self>) {
        wiring.reference("policy", |s| &mut s.policy).require("policy");
    }
}

impl Store for PolicyStore {
    fn policy(&self) -> Option<Arc<dyn Policy>> {
        self.policy.clone()
    }
}

#[derive(Default)]
pub(crate) struct Throttle {
    pub limit: Modifiable<u32>,
}

impl Configure for Throttle {
    fn wiring(wiring: &mut Wiring<Self>) {
        wiring.live("limit", |t| &mut t.limit);
    }
}

#[derive(Default)]
pub(crate) struct Switch {
    pub enabled: Modifiable<bool>,
}

impl Configure for Switch {
    fn wiring(wiring: &mut Wiring<Self>) {
        wiring.live("enabled", |s| &mut s.enabled);
    }
}

#[derive(Default)]
pub(crate) struct Catalog {
    pub policies: Option<Referrals<dyn Policy>>,
    pub stores: Option<Referrals<dyn Store>>,
}

impl Configure for Catalog {
    fn wiring(wiring: &mut Wiring<Self>) {
        wiring
            .referrals("policies", |c| &mut c.policies)
            .referrals("stores", |c| &mut c.stores);
    }
}

pub(crate) fn registry() -> (Registry, Arc<MemorySource>) {
    let properties = Arc::new(MemorySource::new());
    let resolver = OrderedResolver::new().with_source("test", 0, properties.clone());
    (Registry::new(resolver), properties)
}

pub(crate) fn policy(registry: &Registry, label: &str, referral: Option<&str>) -> Result<(), Error> {
    let definition = registry.def::<NamedPolicy>().text("label", label);
    let definition = match referral {
        Some(referral) => definition.iface_named::<dyn Policy>(referral, |p| p),
        None => definition.iface::<dyn Policy>(|p| p),
    };
    definition.register()
}

/// Default `"default"`, referrals `p1` (`"one"`) and `p2` (`"two"`).
pub(crate) fn register_policies(registry: &Registry) {
    for (label, referral) in [("default", None), ("one", Some("p1")), ("two", Some("p2"))] {
        policy(registry, label, referral).unwrap();
    }
}

/// A default store referencing the default policy.
pub(crate) fn register_store(registry: &Registry) {
    registry
        .def::<PolicyStore>()
        .iface::<dyn Store>(|s| s)
        .reference::<dyn Policy>("policy")
        .register()
        .unwrap();
}

pub(crate) fn same<C: ?Sized>(a: &Arc<C>, b: &Arc<C>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
