use crate::bindings::BoxError;
use crate::config::ConfigError;
use thiserror::Error;

/// Top-level error type for the dragon-ioc library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No binding, referral, or property exists under the requested name.
    #[error("not defined: {0}")]
    NotDefined(String),

    /// A definition or configuration value is malformed.
    #[error("illegal content: {0}")]
    IllegalContent(String),

    #[error("failed to initialize {type_name}: {reason}")]
    Initialization { type_name: String, reason: String },

    #[error("failed to instantiate {type_name}: {source}")]
    Instantiation {
        type_name: String,
        #[source]
        source: BoxError,
    },

    #[error("configuration error: {0}")]
    Config(#[source] ConfigError),

    #[error("application context requires a property resolver")]
    MissingResolver,
}

impl Error {
    /// True for lookups that found nothing, whether a binding or a property.
    pub fn is_not_defined(&self) -> bool {
        matches!(self, Self::NotDefined(_) | Self::Config(ConfigError::NotDefined(_)))
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::NotDefined(name) => Self::NotDefined(format!("property '{name}'")),
            other => Self::Config(other),
        }
    }
}
