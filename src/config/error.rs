use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("property not defined: {0}")]
    NotDefined(String),

    #[error("property source kind '{0}' has not been announced")]
    UnannouncedSource(String),

    #[error("required property file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read property file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse property file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("cannot convert \"{value}\" to {target}: {reason}")]
    Coerce {
        value: String,
        target: &'static str,
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn coerce<T>(value: &str, reason: impl ToString) -> Self {
        Self::Coerce {
            value: value.to_string(),
            target: std::any::type_name::<T>(),
            reason: reason.to_string(),
        }
    }
}
