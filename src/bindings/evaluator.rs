//! Declarative parameter sources.
//!
//! An [`Evaluator`] describes how one construction parameter is produced. It
//! never mutates itself except for the one-time referral choice of
//! [`Evaluator::ReferenceByProperty`].

use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use super::capability::{Capability, Erased, Instance, Overrides};
use super::dependencies::Edge;
use super::referrals::Referrals;
use super::registry::Registry;
use super::singleton::Implementation;
use super::value::Value;
use crate::config::Strictness;
use crate::Error;

/// Everything a resolution call threads through the graph.
#[derive(Clone, Copy)]
pub(crate) struct Scope<'a> {
    pub registry: &'a Registry,
    pub overrides: &'a Overrides,
    pub strictness: Strictness,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(registry: &'a Registry, overrides: &'a Overrides, strictness: Strictness) -> Self {
        Self {
            registry,
            overrides,
            strictness,
        }
    }

    pub(crate) fn with_overrides<'b>(&self, overrides: &'b Overrides) -> Scope<'b>
    where
        'a: 'b,
    {
        Scope {
            registry: self.registry,
            overrides,
            strictness: self.strictness,
        }
    }
}

type ViewFn = fn(&Instance) -> Option<Erased>;
type CollectFn = fn(&Scope<'_>) -> Erased;

pub(crate) fn erased_view<C: ?Sized + Send + Sync + 'static>(instance: &Instance) -> Option<Erased> {
    instance.view::<C>().map(|view| Arc::new(view) as Erased)
}

pub(crate) fn erased_referrals<C: ?Sized + Send + Sync + 'static>(scope: &Scope<'_>) -> Erased {
    Arc::new(Referrals::<C>::new(
        scope.registry.downgrade(),
        scope.overrides.clone(),
        scope.strictness,
    ))
}

pub(crate) enum Evaluator {
    Literal(Value),
    /// A live configuration property.
    Property(String),
    Reference {
        capability: Capability,
        referral: Option<String>,
        view: ViewFn,
    },
    /// A reference whose referral name is read from a property on first use.
    ReferenceByProperty {
        capability: Capability,
        property: String,
        choice: OnceLock<String>,
        view: ViewFn,
    },
    /// Every referral registered for a capability, as a `Referrals<C>`.
    AllReferrals {
        capability: Capability,
        collect: CollectFn,
    },
}

impl Evaluator {
    pub(crate) fn reference<C: ?Sized + Send + Sync + 'static>(referral: Option<String>) -> Self {
        Evaluator::Reference {
            capability: Capability::of::<C>(),
            referral,
            view: erased_view::<C>,
        }
    }

    pub(crate) fn reference_by_property<C: ?Sized + Send + Sync + 'static>(property: String) -> Self {
        Evaluator::ReferenceByProperty {
            capability: Capability::of::<C>(),
            property,
            choice: OnceLock::new(),
            view: erased_view::<C>,
        }
    }

    pub(crate) fn all_referrals<C: ?Sized + Send + Sync + 'static>() -> Self {
        Evaluator::AllReferrals {
            capability: Capability::of::<C>(),
            collect: erased_referrals::<C>,
        }
    }

    pub(crate) fn evaluate(&self, scope: &Scope<'_>) -> Result<Value, Error> {
        match self {
            Evaluator::Literal(value) => Ok(value.clone()),
            Evaluator::Property(name) => Ok(Value::Live(
                scope.registry.resolver().resolve_modifiable(name),
            )),
            Evaluator::Reference {
                capability,
                referral,
                view,
            } => {
                let instance = resolve_capability(scope, *capability, referral.as_deref())?;
                project(&instance, *capability, *view)
            }
            Evaluator::ReferenceByProperty {
                capability,
                property,
                choice,
                view,
            } => {
                let referral = choose(scope, property, choice)?;
                let instance = resolve_capability(scope, *capability, Some(referral))?;
                project(&instance, *capability, *view)
            }
            Evaluator::AllReferrals { collect, .. } => {
                Ok(Value::Typed(collect(scope)))
            }
        }
    }

    /// Adds the capabilities this node may consult through the override
    /// context, including everything the referenced implementations consult.
    pub(crate) fn default_refs(&self, scope: &Scope<'_>, refs: &mut BTreeSet<Capability>) {
        match self {
            Evaluator::Literal(_) | Evaluator::Property(_) => {}
            Evaluator::Reference {
                capability,
                referral,
                ..
            } => reference_default_refs(scope, *capability, referral.as_deref(), refs),
            Evaluator::ReferenceByProperty {
                capability,
                property,
                choice,
                ..
            } => {
                if let Ok(referral) = choose(scope, property, choice) {
                    reference_default_refs(scope, *capability, Some(referral), refs);
                }
            }
            Evaluator::AllReferrals { capability, .. } => {
                for implementation in scope.registry.all_referrals(*capability).values() {
                    implementation.default_refs(scope, refs);
                }
            }
        }
    }

    /// Adds the implementations this node would consult, without building
    /// them.
    pub(crate) fn dependencies(
        &self,
        scope: &Scope<'_>,
        parameter: &str,
        edges: &mut Vec<Edge>,
    ) -> Result<(), Error> {
        let edge = |implementation: Arc<Implementation>| Edge {
            parameter: Some(parameter.to_string()),
            implementation,
        };
        match self {
            Evaluator::Literal(_) | Evaluator::Property(_) => {}
            Evaluator::Reference {
                capability,
                referral,
                ..
            } => {
                let implementation =
                    scope
                        .registry
                        .select(*capability, referral.as_deref(), scope.overrides)?;
                edges.push(edge(implementation));
            }
            Evaluator::ReferenceByProperty {
                capability,
                property,
                choice,
                ..
            } => {
                let referral = choose(scope, property, choice)?;
                let implementation = scope
                    .registry
                    .select(*capability, Some(referral), scope.overrides)?;
                edges.push(edge(implementation));
            }
            Evaluator::AllReferrals { capability, .. } => {
                edges.extend(scope.registry.all_referrals(*capability).into_values().map(edge));
            }
        }
        Ok(())
    }
}

/// Selects the implementation for `capability` and initializes it.
///
/// An explicit referral wins, then the override context, then the default.
pub(crate) fn resolve_capability(
    scope: &Scope<'_>,
    capability: Capability,
    referral: Option<&str>,
) -> Result<Instance, Error> {
    scope
        .registry
        .select(capability, referral, scope.overrides)?
        .initialize(scope)
}

pub(crate) fn reference_default_refs(
    scope: &Scope<'_>,
    capability: Capability,
    referral: Option<&str>,
    refs: &mut BTreeSet<Capability>,
) {
    if referral.is_none() {
        refs.insert(capability);
    }
    // unresolvable references fail at initialization instead
    if let Ok(implementation) = scope.registry.select(capability, referral, scope.overrides) {
        implementation.default_refs(scope, refs);
    }
}

fn choose<'c>(scope: &Scope<'_>, property: &str, choice: &'c OnceLock<String>) -> Result<&'c str, Error> {
    if let Some(referral) = choice.get() {
        return Ok(referral.as_str());
    }
    let referral = scope.registry.resolver().resolve(property)?;
    tracing::debug!(property, referral = %referral, "selected referral from property");
    Ok(choice.get_or_init(|| referral).as_str())
}

fn project(instance: &Instance, capability: Capability, view: ViewFn) -> Result<Value, Error> {
    view(instance).map(Value::Typed).ok_or_else(|| {
        Error::IllegalContent(format!(
            "{} is not registered as an implementation of {capability}",
            instance.type_name()
        ))
    })
}

/// A named construction parameter.
pub(crate) struct Parameter {
    pub name: String,
    pub required: bool,
    pub evaluator: Evaluator,
}

/// Evaluates every parameter in declaration order.
///
/// Failures of required parameters bubble unchanged; optional ones are
/// skipped with a warning.
pub(crate) fn evaluate_parameters<'p>(
    parameters: &'p [Parameter],
    scope: &Scope<'_>,
    type_name: &str,
) -> Result<Vec<(&'p Parameter, Value)>, Error> {
    let mut values = Vec::with_capacity(parameters.len());
    for parameter in parameters {
        match parameter.evaluator.evaluate(scope) {
            Ok(value) if parameter.required && value.is_empty() => {
                return Err(Error::Initialization {
                    type_name: type_name.to_string(),
                    reason: format!("required parameter '{}' resolved to nothing", parameter.name),
                });
            }
            Ok(value) => values.push((parameter, value)),
            Err(e) if parameter.required => return Err(e),
            Err(e) => {
                tracing::warn!(
                    type_name,
                    parameter = %parameter.name,
                    error = %e,
                    "skipping optional parameter"
                );
            }
        }
    }
    Ok(values)
}

pub(crate) fn parameters_default_refs(
    parameters: &[Parameter],
    scope: &Scope<'_>,
    refs: &mut BTreeSet<Capability>,
) {
    for parameter in parameters {
        parameter.evaluator.default_refs(scope, refs);
    }
}

/// Collects the dependencies of every parameter. Optional parameters that
/// cannot be resolved are left out, as they would be at initialization.
pub(crate) fn parameters_dependencies(
    parameters: &[Parameter],
    scope: &Scope<'_>,
    edges: &mut Vec<Edge>,
) -> Result<(), Error> {
    for parameter in parameters {
        match parameter
            .evaluator
            .dependencies(scope, &parameter.name, edges)
        {
            Ok(()) => {}
            Err(e) if parameter.required => return Err(e),
            Err(e) => {
                tracing::debug!(parameter = %parameter.name, error = %e, "no dependency for optional parameter");
            }
        }
    }
    Ok(())
}
