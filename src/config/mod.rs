//! Layered, live configuration.
//!
//! [`PropertySource`]s provide flat string properties. An [`OrderedResolver`]
//! stacks them by precedence and hands out [`Modifiable`](crate::Modifiable)
//! cells that follow source changes.

mod coerce;
mod env;
mod error;
mod file;
mod memory;
pub mod naming;
mod resolver;
mod source;

pub use coerce::{Coerce, Json, Strictness};
pub use env::EnvSource;
pub use error::ConfigError;
pub use file::FileSource;
pub use memory::MemorySource;
pub use resolver::OrderedResolver;
pub use source::{ChangeListener, ChangeNotifier, PropertySource};
