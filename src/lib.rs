pub mod bindings;
pub mod config;
pub mod context;
mod error;
mod modifiable;

pub use bindings::{
    override_with, Build, Capability, Configure, Definition, DependencyNode, Overrides, Referrals, Registry,
    Wiring,
};
pub use config::{ConfigError, EnvSource, FileSource, MemorySource, OrderedResolver, PropertySource};
pub use context::{AppContext, Bindings};
pub use error::Error;
pub use modifiable::Modifiable;
