//! Registration surface.
//!
//! ```
//! use dragon_ioc::{Configure, MemorySource, OrderedResolver, Registry, Wiring};
//! use std::sync::Arc;
//!
//! trait Greeter: Send + Sync {
//!     fn greet(&self) -> String;
//! }
//!
//! #[derive(Default)]
//! struct Polite {
//!     name: String,
//! }
//!
//! impl Configure for Polite {
//!     fn wiring(wiring: &mut Wiring<Self>) {
//!         wiring.value("name", |p| &mut p.name);
//!     }
//! }
//!
//! impl Greeter for Polite {
//!     fn greet(&self) -> String {
//!         format!("good day, {}", self.name)
//!     }
//! }
//!
//! let properties = Arc::new(MemorySource::new());
//! properties.set("greeter.name", "Ada");
//! let registry = Registry::new(OrderedResolver::new().with_source("run", 0, properties));
//!
//! registry
//!     .def::<Polite>()
//!     .iface::<dyn Greeter>(|p| p)
//!     .prop("name", "greeter.name")
//!     .register()?;
//!
//! assert_eq!(registry.get::<dyn Greeter>()?.greet(), "good day, Ada");
//! # Ok::<(), dragon_ioc::Error>(())
//! ```

use std::any::type_name;
use std::sync::Arc;

use super::capability::{upcast, Capability, Overrides, Upcast};
use super::evaluator::{Evaluator, Parameter};
use super::factory::{
    BoxError, Build, BuilderFactory, Constructor, DirectFactory, ImplementationFactory, TernaryFactory,
};
use super::registry::Registry;
use super::singleton::Implementation;
use super::value::Value;
use super::wiring::Configure;
use crate::Error;

type MakeFactory<T> = Box<
    dyn FnOnce(Vec<Parameter>, Vec<(Capability, Upcast<T>)>) -> Result<Box<dyn ImplementationFactory>, Error>,
>;

/// Describes one implementation and the capabilities it is registered for.
///
/// Parameters are evaluated in declaration order. Required parameters abort
/// construction when they fail; optional ones are skipped with a warning.
#[must_use = "definitions do nothing until .register() is called"]
pub struct Definition<T> {
    registry: Registry,
    make: MakeFactory<T>,
    interfaces: Vec<(Capability, Option<String>, Upcast<T>)>,
    fixed: Overrides,
    parameters: Vec<Parameter>,
}

impl Registry {
    /// Defines an implementation constructed with `T::default()`.
    pub fn def<T: Configure + Default>(&self) -> Definition<T> {
        self.def_with(|| Ok(T::default()))
    }

    /// Defines an implementation constructed by `construct`. A constructor
    /// error surfaces as [`Error::Instantiation`].
    pub fn def_with<T, F>(&self, construct: F) -> Definition<T>
    where
        T: Configure,
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let construct: Constructor<T> = Box::new(construct);
        Definition::new(
            self.clone(),
            Box::new(move |parameters, upcasts| {
                Ok(Box::new(DirectFactory::new(construct, parameters, upcasts)) as Box<dyn ImplementationFactory>)
            }),
        )
    }

    /// Defines an implementation produced by the builder `B`.
    pub fn builder<B: Build>(&self) -> Definition<B::Output> {
        Definition::new(
            self.clone(),
            Box::new(|parameters, upcasts| -> Result<Box<dyn ImplementationFactory>, Error> {
                let factory = BuilderFactory::<B>::new(parameters, upcasts)?;
                Ok(Box::new(factory) as Box<dyn ImplementationFactory>)
            }),
        )
    }

    /// Defines a binding of `C` that forwards to `when_true` or `when_false`
    /// depending on the boolean `property`. `None` selects the default of
    /// `C`.
    ///
    /// The property is read once, on first use.
    pub fn ternary<C: ?Sized + 'static>(
        &self,
        property: &str,
        when_true: Option<&str>,
        when_false: Option<&str>,
    ) -> TernaryDefinition {
        TernaryDefinition {
            registry: self.clone(),
            capability: Capability::of::<C>(),
            property: property.to_string(),
            when_true: when_true.map(str::to_string),
            when_false: when_false.map(str::to_string),
            referral: None,
            fixed: Overrides::new(),
        }
    }

    /// Like [`ternary`](Self::ternary), with `true` selecting the default.
    pub fn ternary_or_default<C: ?Sized + 'static>(&self, property: &str, alternate: &str) -> TernaryDefinition {
        self.ternary::<C>(property, None, Some(alternate))
    }
}

impl<T: Configure> Definition<T> {
    fn new(registry: Registry, make: MakeFactory<T>) -> Self {
        Self {
            registry,
            make,
            interfaces: Vec::new(),
            fixed: Overrides::new(),
            parameters: Vec::new(),
        }
    }

    /// Registers as the default implementation of `C`.
    ///
    /// Without any `iface` call, the definition is registered as the default
    /// of `T` itself.
    pub fn iface<C: ?Sized + Send + Sync + 'static>(
        mut self,
        convert: impl Fn(Arc<T>) -> Arc<C> + Send + Sync + 'static,
    ) -> Self {
        self.interfaces.push((Capability::of::<C>(), None, upcast(convert)));
        self
    }

    /// Registers as the referral `referral` of `C`.
    pub fn iface_named<C: ?Sized + Send + Sync + 'static>(
        mut self,
        referral: &str,
        convert: impl Fn(Arc<T>) -> Arc<C> + Send + Sync + 'static,
    ) -> Self {
        self.interfaces
            .push((Capability::of::<C>(), Some(referral.to_string()), upcast(convert)));
        self
    }

    /// Pins capability `C` to `referral` for everything this implementation
    /// builds, regardless of the caller's overrides.
    pub fn with_ref<C: ?Sized + 'static>(mut self, referral: &str) -> Self {
        self.fixed.insert(Capability::of::<C>(), referral.to_string());
        self
    }

    fn parameter(mut self, name: &str, required: bool, evaluator: Evaluator) -> Self {
        self.parameters.push(Parameter {
            name: name.to_string(),
            required,
            evaluator,
        });
        self
    }

    /// A required literal of any type.
    pub fn set<V: Clone + Send + Sync + 'static>(self, name: &str, value: V) -> Self {
        self.parameter(name, true, Evaluator::Literal(Value::Typed(Arc::new(value))))
    }

    /// A required literal given as text and converted to the member's type.
    pub fn text(self, name: &str, value: impl Into<String>) -> Self {
        self.parameter(name, true, Evaluator::Literal(Value::Text(value.into())))
    }

    /// An optional literal given as text.
    pub fn literal(self, name: &str, value: impl Into<String>) -> Self {
        self.parameter(name, false, Evaluator::Literal(Value::Text(value.into())))
    }

    /// An optional, live configuration property.
    pub fn prop(self, name: &str, property: &str) -> Self {
        self.parameter(name, false, Evaluator::Property(property.to_string()))
    }

    /// A live configuration property that must be defined at construction.
    pub fn prop_required(self, name: &str, property: &str) -> Self {
        self.parameter(name, true, Evaluator::Property(property.to_string()))
    }

    /// The implementation of `C` selected by the override context, else its
    /// default.
    pub fn reference<C: ?Sized + Send + Sync + 'static>(self, name: &str) -> Self {
        self.parameter(name, true, Evaluator::reference::<C>(None))
    }

    pub fn reference_named<C: ?Sized + Send + Sync + 'static>(self, name: &str, referral: &str) -> Self {
        self.parameter(name, true, Evaluator::reference::<C>(Some(referral.to_string())))
    }

    /// The referral of `C` named by `property`. The property is read once.
    pub fn reference_by_property<C: ?Sized + Send + Sync + 'static>(self, name: &str, property: &str) -> Self {
        self.parameter(name, true, Evaluator::reference_by_property::<C>(property.to_string()))
    }

    /// Every referral of `C`, as [`Referrals<C>`](super::Referrals).
    pub fn all_refs<C: ?Sized + Send + Sync + 'static>(self, name: &str) -> Self {
        self.parameter(name, true, Evaluator::all_referrals::<C>())
    }

    /// Explicitly assigns null.
    pub fn null_ref(self, name: &str) -> Self {
        self.parameter(name, false, Evaluator::Literal(Value::Null))
    }

    pub fn register(self) -> Result<(), Error> {
        let Self {
            registry,
            make,
            mut interfaces,
            fixed,
            parameters,
        } = self;

        let own = Capability::of::<T>();
        if interfaces.is_empty() {
            interfaces.push((own, None, upcast(|object: Arc<T>| object)));
        }
        let mut upcasts: Vec<(Capability, Upcast<T>)> = interfaces
            .iter()
            .map(|(capability, _, upcast)| (*capability, Arc::clone(upcast)))
            .collect();
        if !upcasts.iter().any(|(capability, _)| *capability == own) {
            upcasts.push((own, upcast(|object: Arc<T>| object)));
        }

        let factory = make(parameters, upcasts).inspect_err(|e| {
            tracing::error!(type_name = type_name::<T>(), error = %e, "invalid definition");
        })?;
        let targets: Vec<(Capability, Option<String>)> = interfaces
            .into_iter()
            .map(|(capability, referral, _)| (capability, referral))
            .collect();
        registry.register_all(&targets, Arc::new(Implementation::new(factory, fixed)))
    }
}

/// A conditional binding, see [`Registry::ternary`].
#[must_use = "definitions do nothing until .register() is called"]
pub struct TernaryDefinition {
    registry: Registry,
    capability: Capability,
    property: String,
    when_true: Option<String>,
    when_false: Option<String>,
    referral: Option<String>,
    fixed: Overrides,
}

impl TernaryDefinition {
    /// Registers as a referral instead of the default.
    pub fn named(mut self, referral: &str) -> Self {
        self.referral = Some(referral.to_string());
        self
    }

    pub fn with_ref<C: ?Sized + 'static>(mut self, referral: &str) -> Self {
        self.fixed.insert(Capability::of::<C>(), referral.to_string());
        self
    }

    pub fn register(self) -> Result<(), Error> {
        if self.referral.is_none() && (self.when_true.is_none() || self.when_false.is_none()) {
            return Err(Error::IllegalContent(format!(
                "conditional default for {} cannot select the default itself",
                self.capability
            )));
        }

        let factory = TernaryFactory::new(self.capability, self.property, self.when_true, self.when_false);
        let implementation = Implementation::new(Box::new(factory), self.fixed);
        self.registry
            .register(self.capability, Arc::new(implementation), self.referral.as_deref())
    }
}
