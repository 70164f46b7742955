//! Dependency graph introspection.
//!
//! A [`DependencyNode`] describes what resolving a capability would build
//! without building it. Each node can still produce its object on demand
//! through the regular instance cache.

use std::fmt;
use std::sync::Arc;

use super::capability::{Capability, Instance, Overrides};
use super::evaluator::Scope;
use super::registry::Registry;
use super::singleton::Implementation;
use crate::config::Strictness;
use crate::Error;

/// One implementation consulted by another.
pub(crate) struct Edge {
    /// The parameter reaching the implementation; `None` when a conditional
    /// binding forwards to it.
    pub parameter: Option<String>,
    pub implementation: Arc<Implementation>,
}

/// A registered implementation together with everything it depends on under
/// one override context.
///
/// A component shared by several dependents appears once under each of them.
pub struct DependencyNode {
    registry: Registry,
    implementation: Arc<Implementation>,
    overrides: Overrides,
    parameter: Option<String>,
    bound_as: Vec<(Capability, Option<String>)>,
    dependencies: Vec<DependencyNode>,
}

impl DependencyNode {
    /// Walks the graph below `implementation`. Cycles fail with
    /// [`Error::Initialization`].
    pub(crate) fn build(
        registry: &Registry,
        implementation: Arc<Implementation>,
        overrides: &Overrides,
        parameter: Option<String>,
    ) -> Result<Self, Error> {
        let _active = implementation.enter()?;
        let combined = implementation.combine(overrides);
        let scope = Scope::new(registry, &combined, Strictness::Lenient);

        let dependencies = implementation
            .dependencies(&scope)?
            .into_iter()
            .map(|edge| Self::build(registry, edge.implementation, &combined, edge.parameter))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            registry: registry.clone(),
            bound_as: registry.bindings_of(&implementation),
            implementation,
            overrides: overrides.clone(),
            parameter,
            dependencies,
        })
    }

    /// The concrete type built by this node. Conditional bindings report
    /// their capability.
    pub fn type_name(&self) -> &str {
        self.implementation.type_name()
    }

    /// The parameter of the parent that led here, if any.
    pub fn parameter(&self) -> Option<&str> {
        self.parameter.as_deref()
    }

    pub fn dependencies(&self) -> &[DependencyNode] {
        &self.dependencies
    }

    /// Every capability this implementation is bound under, with its
    /// referral name (`None` for the default).
    pub fn bound_as(&self) -> &[(Capability, Option<String>)] {
        &self.bound_as
    }

    /// True if this implementation is bound for `C` under `referral`.
    pub fn is_bound_as<C: ?Sized + 'static>(&self, referral: Option<&str>) -> bool {
        let capability = Capability::of::<C>();
        self.bound_as
            .iter()
            .any(|(bound, name)| *bound == capability && name.as_deref() == referral)
    }

    /// This node and every node below it, depth first.
    pub fn descendants(&self) -> Vec<&DependencyNode> {
        let mut nodes = vec![self];
        for dependency in &self.dependencies {
            nodes.extend(dependency.descendants());
        }
        nodes
    }

    /// The object this node stands for, built on first request and shared
    /// with regular lookups.
    pub fn instance(&self) -> Result<Instance, Error> {
        let scope = Scope::new(&self.registry, &self.overrides, Strictness::Lenient);
        self.implementation.initialize(&scope)
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = depth * 2)?;
        if let Some(parameter) = &self.parameter {
            write!(f, "{parameter}: ")?;
        }
        writeln!(f, "{}", self.type_name())?;
        for dependency in &self.dependencies {
            dependency.write_tree(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyNode")
            .field("type_name", &self.type_name())
            .field("parameter", &self.parameter)
            .field("bound_as", &self.bound_as)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

/// An indented tree, one node per line.
impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use std::any::type_name;

    use crate::bindings::capability::{override_with, Overrides};
    use crate::bindings::testing::*;
    use crate::Error;

    #[test]
    fn test_store_depends_on_default_policy() {
        let (registry, _) = registry();
        register_policies(&registry);
        register_store(&registry);

        let store = registry.dependencies::<dyn Store>().unwrap();
        assert_eq!(store.type_name(), type_name::<PolicyStore>());
        assert!(store.is_bound_as::<dyn Store>(None));
        assert_eq!(store.parameter(), None);

        let [policy] = store.dependencies() else {
            panic!("expected one dependency, got {store:?}");
        };
        assert_eq!(policy.parameter(), Some("policy"));
        assert_eq!(policy.type_name(), type_name::<NamedPolicy>());
        assert!(policy.is_bound_as::<dyn Policy>(None));
        assert!(policy.dependencies().is_empty());
    }

    #[test]
    fn test_overrides_steer_the_graph() {
        let (registry, _) = registry();
        register_policies(&registry);
        register_store(&registry);

        let store = registry
            .dependencies_with::<dyn Store>(None, &override_with::<dyn Policy>("p2"))
            .unwrap();
        assert!(store.dependencies()[0].is_bound_as::<dyn Policy>(Some("p2")));
        assert!(!store.dependencies()[0].is_bound_as::<dyn Policy>(None));
    }

    #[test]
    fn test_all_refs_expand_to_each_referral() {
        let (registry, _) = registry();
        register_policies(&registry);
        registry
            .def::<Catalog>()
            .all_refs::<dyn Policy>("policies")
            .register()
            .unwrap();

        let catalog = registry.dependencies::<Catalog>().unwrap();
        let bound: Vec<bool> = catalog
            .dependencies()
            .iter()
            .map(|node| node.parameter() == Some("policies"))
            .collect();
        assert_eq!(bound, vec![true, true]);
        assert!(catalog.dependencies()[0].is_bound_as::<dyn Policy>(Some("p1")));
        assert!(catalog.dependencies()[1].is_bound_as::<dyn Policy>(Some("p2")));
        assert_eq!(catalog.descendants().len(), 3);
    }

    #[test]
    fn test_ternary_forwards_to_chosen_branch() {
        let (registry, properties) = registry();
        register_policies(&registry);
        registry
            .ternary::<dyn Policy>("policy.fast", Some("p1"), Some("p2"))
            .named("chosen")
            .register()
            .unwrap();
        properties.set("policy.fast", "true");

        let chosen = registry.dependencies_named::<dyn Policy>("chosen").unwrap();
        let [target] = chosen.dependencies() else {
            panic!("expected the forwarded branch, got {chosen:?}");
        };
        assert_eq!(target.parameter(), None);
        assert!(target.is_bound_as::<dyn Policy>(Some("p1")));
    }

    #[test]
    fn test_node_builds_the_shared_instance() {
        let (registry, _) = registry();
        register_policies(&registry);
        register_store(&registry);

        let store = registry.dependencies::<dyn Store>().unwrap();
        let policy = store.dependencies()[0].instance().unwrap();
        let expected = registry.instance::<dyn Policy>(None, &Overrides::new()).unwrap();
        assert!(policy.same(&expected));
    }

    #[test]
    fn test_display_is_an_indented_tree() {
        let (registry, _) = registry();
        register_policies(&registry);
        register_store(&registry);

        let tree = registry.dependencies::<dyn Store>().unwrap().to_string();
        assert_eq!(
            tree,
            format!(
                "{}\n  policy: {}\n",
                type_name::<PolicyStore>(),
                type_name::<NamedPolicy>()
            )
        );
    }

    #[test]
    fn test_unresolvable_required_reference() {
        let (registry, _) = registry();
        register_store(&registry);

        let result = registry.dependencies::<dyn Store>();
        assert!(matches!(result, Err(Error::NotDefined(_))));
    }

    #[test]
    fn test_all_dependencies_by_referral() {
        let (registry, _) = registry();
        register_policies(&registry);

        let all = registry.all_dependencies::<dyn Policy>().unwrap();
        assert_eq!(all.keys().collect::<Vec<_>>(), vec!["p1", "p2"]);
        assert!(all["p1"].is_bound_as::<dyn Policy>(Some("p1")));
    }
}
