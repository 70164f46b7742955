//! Implementation factories.
//!
//! A factory produces one fresh object per call. Caching is layered on top by
//! [`Implementation`](super::singleton::Implementation).

use std::any::type_name;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use super::capability::{Capability, Instance, Upcast};
use super::dependencies::Edge;
use super::evaluator::{
    evaluate_parameters, parameters_default_refs, parameters_dependencies, Parameter, Scope,
};
use super::singleton::Implementation;
use super::wiring::{unmatched, Configure, Wiring};
use crate::config::{naming, Coerce};
use crate::Error;

/// Error type returned by user-supplied constructors and builders.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub(crate) type Constructor<T> = Box<dyn Fn() -> Result<T, BoxError> + Send + Sync>;

pub(crate) trait ImplementationFactory: Send + Sync {
    /// Concrete type produced, for diagnostics.
    fn type_name(&self) -> &str;

    fn initialize(&self, scope: &Scope<'_>) -> Result<Instance, Error>;

    /// Adds every capability whose override could change what this factory
    /// builds under `scope`.
    fn default_refs(&self, scope: &Scope<'_>, refs: &mut BTreeSet<Capability>);

    /// Adds the implementations this factory would consult under `scope`.
    fn dependencies(&self, scope: &Scope<'_>, edges: &mut Vec<Edge>) -> Result<(), Error>;
}

/// A builder type whose product is the registered implementation.
///
/// Parameters naming builder members are applied to the builder; those
/// naming product members are applied to the product after [`build`]
/// succeeds. A parameter naming members of both is applied to both.
///
/// [`build`]: Build::build
pub trait Build: Configure + Default {
    type Output: Configure;

    fn build(self) -> Result<Self::Output, BoxError>;
}

/// Constructs a bare object, then wires parameters onto it.
pub(crate) struct DirectFactory<T> {
    construct: Constructor<T>,
    parameters: Vec<Parameter>,
    wiring: Wiring<T>,
    upcasts: Vec<(Capability, Upcast<T>)>,
}

impl<T: Configure> DirectFactory<T> {
    pub(crate) fn new(
        construct: Constructor<T>,
        parameters: Vec<Parameter>,
        upcasts: Vec<(Capability, Upcast<T>)>,
    ) -> Self {
        Self {
            construct,
            parameters,
            wiring: Wiring::describe(),
            upcasts,
        }
    }
}

impl<T: Configure> ImplementationFactory for DirectFactory<T> {
    fn type_name(&self) -> &str {
        type_name::<T>()
    }

    fn initialize(&self, scope: &Scope<'_>) -> Result<Instance, Error> {
        let product_name = type_name::<T>();
        let values = evaluate_parameters(&self.parameters, scope, product_name)?;

        let mut object = (self.construct)().map_err(|source| Error::Instantiation {
            type_name: product_name.to_string(),
            source,
        })?;
        self.wiring
            .apply(&mut object, &values, scope.strictness, product_name)?;

        Ok(Instance::new(Arc::new(object), &self.upcasts))
    }

    fn default_refs(&self, scope: &Scope<'_>, refs: &mut BTreeSet<Capability>) {
        parameters_default_refs(&self.parameters, scope, refs);
    }

    fn dependencies(&self, scope: &Scope<'_>, edges: &mut Vec<Edge>) -> Result<(), Error> {
        parameters_dependencies(&self.parameters, scope, edges)
    }
}

/// Fills a builder, builds the product, then wires the product-only
/// parameters.
pub(crate) struct BuilderFactory<B: Build> {
    parameters: Vec<Parameter>,
    builder: Wiring<B>,
    product: Wiring<B::Output>,
    upcasts: Vec<(Capability, Upcast<B::Output>)>,
}

impl<B: Build> BuilderFactory<B> {
    /// Fails if a builder member is not bound by any parameter.
    pub(crate) fn new(
        parameters: Vec<Parameter>,
        upcasts: Vec<(Capability, Upcast<B::Output>)>,
    ) -> Result<Self, Error> {
        let builder = Wiring::<B>::describe();
        let unbound: Vec<&str> = builder
            .members()
            .filter(|member| {
                !parameters
                    .iter()
                    .any(|parameter| naming::same_member(&parameter.name, member))
            })
            .collect();
        if !unbound.is_empty() {
            return Err(Error::IllegalContent(format!(
                "builder {} has members not bound by any parameter: {}",
                type_name::<B>(),
                unbound.join(", ")
            )));
        }

        Ok(Self {
            parameters,
            builder,
            product: Wiring::describe(),
            upcasts,
        })
    }
}

impl<B: Build> ImplementationFactory for BuilderFactory<B> {
    fn type_name(&self) -> &str {
        type_name::<B::Output>()
    }

    fn initialize(&self, scope: &Scope<'_>) -> Result<Instance, Error> {
        let product_name = type_name::<B::Output>();
        let values = evaluate_parameters(&self.parameters, scope, product_name)?;

        let mut for_builder = Vec::new();
        let mut for_product = Vec::new();
        for (parameter, value) in values {
            let on_builder = self.builder.has(&parameter.name);
            let on_product = self.product.has(&parameter.name);
            if !on_builder && !on_product {
                unmatched(parameter, product_name)?;
                continue;
            }
            if on_builder {
                for_builder.push((parameter, value.clone()));
            }
            if on_product {
                for_product.push((parameter, value));
            }
        }

        let mut builder = B::default();
        self.builder
            .apply(&mut builder, &for_builder, scope.strictness, type_name::<B>())?;
        let mut product = builder.build().map_err(|source| Error::Instantiation {
            type_name: product_name.to_string(),
            source,
        })?;
        self.product
            .apply(&mut product, &for_product, scope.strictness, product_name)?;

        Ok(Instance::new(Arc::new(product), &self.upcasts))
    }

    fn default_refs(&self, scope: &Scope<'_>, refs: &mut BTreeSet<Capability>) {
        parameters_default_refs(&self.parameters, scope, refs);
    }

    fn dependencies(&self, scope: &Scope<'_>, edges: &mut Vec<Edge>) -> Result<(), Error> {
        parameters_dependencies(&self.parameters, scope, edges)
    }
}

/// Forwards to one of two referrals of a capability, chosen once from a
/// boolean property.
///
/// `None` as a branch selects the capability's default (which a property
/// named after the capability can still redirect). The property is read on
/// first successful use and the choice is kept for the factory's lifetime; an
/// unset value selects the false branch. Under lenient coercion so does any
/// value that is not a boolean, while strict coercion rejects it without
/// settling the choice.
pub(crate) struct TernaryFactory {
    capability: Capability,
    property: String,
    when_true: Option<String>,
    when_false: Option<String>,
    choice: OnceLock<Option<String>>,
}

impl TernaryFactory {
    pub(crate) fn new(
        capability: Capability,
        property: String,
        when_true: Option<String>,
        when_false: Option<String>,
    ) -> Self {
        Self {
            capability,
            property,
            when_true,
            when_false,
            choice: OnceLock::new(),
        }
    }

    fn choice(&self, scope: &Scope<'_>) -> Result<Option<&str>, Error> {
        if let Some(choice) = self.choice.get() {
            return Ok(choice.as_deref());
        }

        let raw = scope.registry.resolver().resolve(&self.property).ok();
        let enabled = match raw.as_deref() {
            Some(raw) => bool::coerce(raw, scope.strictness).map_err(|e| Error::Initialization {
                type_name: self.capability.qualified_name().to_string(),
                reason: format!("property '{}' is not a boolean: {e}", self.property),
            })?,
            None => false,
        };
        let referral = if enabled {
            self.when_true.clone()
        } else {
            self.when_false.clone()
        };
        tracing::debug!(
            property = %self.property,
            value = ?raw,
            referral = ?referral,
            capability = %self.capability,
            "evaluated conditional binding"
        );
        Ok(self.choice.get_or_init(|| referral).as_deref())
    }

    fn target(&self, scope: &Scope<'_>) -> Result<Arc<Implementation>, Error> {
        match self.choice(scope)? {
            Some(referral) => scope.registry.resolve_referral(self.capability, referral),
            None => scope.registry.resolve_default(self.capability),
        }
    }
}

impl ImplementationFactory for TernaryFactory {
    fn type_name(&self) -> &str {
        self.capability.qualified_name()
    }

    fn initialize(&self, scope: &Scope<'_>) -> Result<Instance, Error> {
        self.target(scope)?.initialize(scope)
    }

    fn default_refs(&self, scope: &Scope<'_>, refs: &mut BTreeSet<Capability>) {
        if let Ok(target) = self.target(scope) {
            target.default_refs(scope, refs);
        }
    }

    fn dependencies(&self, scope: &Scope<'_>, edges: &mut Vec<Edge>) -> Result<(), Error> {
        edges.push(Edge {
            parameter: None,
            implementation: self.target(scope)?,
        });
        Ok(())
    }
}
