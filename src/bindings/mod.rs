//! The object-graph builder.
//!
//! A [`Registry`] binds capabilities (usually `dyn Trait` types) to
//! implementations. Each implementation is described once with a
//! [`Definition`]: where its parameters come from (literals, live
//! properties, other capabilities) and which capabilities it serves.
//! Resolution builds the requested object and everything it references,
//! caching instances per relevant override context.

mod capability;
mod definition;
mod dependencies;
mod evaluator;
mod factory;
mod referrals;
mod registry;
mod singleton;
mod value;
mod wiring;

#[cfg(test)]
mod testing;

pub use capability::{override_with, Capability, Instance, Overrides};
pub use definition::{Definition, TernaryDefinition};
pub use dependencies::DependencyNode;
pub use factory::{BoxError, Build};
pub use referrals::Referrals;
pub use registry::Registry;
pub use wiring::{Configure, Wiring};
