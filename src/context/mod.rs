//! Application context owning the registry and its property resolver.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::bindings::Registry;
use crate::config::OrderedResolver;
use crate::Error;

/// A set of definitions registered together.
///
/// Implemented for any `Fn(&Registry) -> Result<(), Error>`, so plain
/// functions can be passed to [`AppContextBuilder::with_bindings`].
pub trait Bindings {
    fn register(&self, registry: &Registry) -> Result<(), Error>;
}

impl<F> Bindings for F
where
    F: Fn(&Registry) -> Result<(), Error>,
{
    fn register(&self, registry: &Registry) -> Result<(), Error> {
        self(registry)
    }
}

/// Central application context holding the registry and its configuration.
///
/// There is no process-wide registry; code that needs objects takes the
/// context (or a cloned [`Registry`]) explicitly.
///
/// ## Example
///
/// ```
/// use dragon_ioc::{AppContext, Configure, MemorySource, OrderedResolver, Registry, Wiring};
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Banner {
///     text: String,
/// }
///
/// impl Configure for Banner {
///     fn wiring(wiring: &mut Wiring<Self>) {
///         wiring.value("text", |b| &mut b.text);
///     }
/// }
///
/// fn bindings(registry: &Registry) -> Result<(), dragon_ioc::Error> {
///     registry.def::<Banner>().prop("text", "banner.text").register()
/// }
///
/// let properties = Arc::new(MemorySource::new());
/// properties.set("banner.text", "hello");
///
/// let ctx = AppContext::builder()
///     .with_resolver(OrderedResolver::new().with_source("run", 0, properties))
///     .with_bindings(bindings)
///     .build()?;
///
/// assert_eq!(ctx.get::<Banner>()?.text, "hello");
/// # Ok::<(), dragon_ioc::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct AppContext {
    registry: Registry,
}

impl AppContext {
    /// Creates a new builder for constructing an `AppContext`.
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The resolver every property parameter reads from.
    pub fn config(&self) -> &OrderedResolver {
        self.registry.resolver()
    }

    /// Shorthand for [`Registry::get`].
    pub fn get<C: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<C>, Error> {
        self.registry.get::<C>()
    }

    /// See [`Registry::self_test`].
    pub fn self_test(&self) -> BTreeMap<String, Vec<String>> {
        self.registry.self_test()
    }
}

/// Builder for constructing an [`AppContext`].
#[derive(Default)]
#[must_use = "builders do nothing until .build() is called"]
pub struct AppContextBuilder {
    resolver: Option<OrderedResolver>,
    bindings: Vec<Box<dyn Bindings>>,
}

impl AppContextBuilder {
    pub fn with_resolver(mut self, resolver: OrderedResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Adds a set of definitions. Sets are registered in the order added.
    pub fn with_bindings(mut self, bindings: impl Bindings + 'static) -> Self {
        self.bindings.push(Box::new(bindings));
        self
    }

    /// Builds the `AppContext`.
    ///
    /// Returns an error if no resolver was provided or if any binding set
    /// fails to register.
    pub fn build(self) -> Result<AppContext, Error> {
        let registry = Registry::new(self.resolver.ok_or(Error::MissingResolver)?);
        for bindings in &self.bindings {
            bindings.register(&registry)?;
        }
        tracing::debug!(sets = self.bindings.len(), "application context built");
        Ok(AppContext { registry })
    }
}

impl fmt::Debug for AppContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppContextBuilder")
            .field("resolver", &self.resolver)
            .field("bindings", &self.bindings.len())
            .finish()
    }
}
