use std::any::type_name;
use std::fmt;

use thiserror::Error;

use super::capability::Erased;
use crate::config::{Coerce, ConfigError, Strictness};
use crate::modifiable::Modifiable;

/// The result of evaluating one parameter, before it is assigned to a member.
#[derive(Clone)]
pub(crate) enum Value {
    Null,
    Text(String),
    /// An already-typed value: a literal, an `Arc<C>` or a `Referrals<C>`.
    Typed(Erased),
    /// A configuration property that may change later.
    Live(Modifiable<String>),
}

#[derive(Debug, Error)]
pub(crate) enum WireError {
    #[error("cannot assign null to {0}")]
    Null(&'static str),

    #[error("expected a value of type {0}")]
    Mismatch(&'static str),

    #[error(transparent)]
    Coerce(#[from] ConfigError),
}

impl Value {
    /// True for a null literal or a property that is currently undefined.
    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Live(cell) => !cell.is_set(),
            Value::Text(_) | Value::Typed(_) => false,
        }
    }

    /// The current value as `T`. `None` means the value resolved to nothing.
    pub(crate) fn coerce<T: Coerce>(&self, strictness: Strictness) -> Result<Option<T>, WireError> {
        match self {
            Value::Null => Ok(None),
            Value::Text(raw) => Ok(Some(T::coerce(raw, strictness)?)),
            Value::Live(cell) => current::<T>(cell, strictness),
            Value::Typed(object) => {
                if let Some(value) = T::from_any(&**object) {
                    return Ok(Some(value));
                }
                if let Some(cell) = object.downcast_ref::<Modifiable<T>>() {
                    return Ok(cell.get());
                }
                if let Some(cell) = object.downcast_ref::<Modifiable<String>>() {
                    return current::<T>(cell, strictness);
                }
                Err(WireError::Mismatch(type_name::<T>()))
            }
        }
    }

    /// A live cell of `T` that tracks this value.
    ///
    /// A property cell is followed through a listener that re-coerces every
    /// change, so the returned cell stays current without rebuilding its
    /// owner. A typed `Modifiable<T>` is shared as-is.
    pub(crate) fn follow<T: Coerce>(&self, strictness: Strictness) -> Result<Modifiable<T>, WireError> {
        match self {
            Value::Null => Ok(Modifiable::empty()),
            Value::Text(raw) => Ok(Modifiable::with(coerce_live::<T>(raw, strictness)?)),
            Value::Live(source) => follow(source, strictness),
            Value::Typed(object) => {
                if let Some(cell) = object.downcast_ref::<Modifiable<T>>() {
                    return Ok(cell.clone());
                }
                if let Some(source) = object.downcast_ref::<Modifiable<String>>() {
                    return follow(source, strictness);
                }
                T::from_any(&**object)
                    .map(Modifiable::new)
                    .ok_or(WireError::Mismatch(type_name::<T>()))
            }
        }
    }

    /// The typed payload, for members that take a value as-is.
    pub(crate) fn downcast<V: Clone + 'static>(&self) -> Result<Option<V>, WireError> {
        match self {
            Value::Null => Ok(None),
            Value::Typed(object) => object
                .downcast_ref::<V>()
                .cloned()
                .map(Some)
                .ok_or(WireError::Mismatch(type_name::<V>())),
            Value::Text(_) | Value::Live(_) => Err(WireError::Mismatch(type_name::<V>())),
        }
    }
}

fn current<T: Coerce>(cell: &Modifiable<String>, strictness: Strictness) -> Result<Option<T>, WireError> {
    cell.with_value(|raw| raw.map(|raw| T::coerce(raw, strictness)).transpose())
        .map_err(WireError::from)
}

/// An empty string clears a live value.
fn coerce_live<T: Coerce>(raw: &str, strictness: Strictness) -> Result<Option<T>, ConfigError> {
    if raw.is_empty() {
        Ok(None)
    } else {
        T::coerce(raw, strictness).map(Some)
    }
}

fn follow<T: Coerce>(source: &Modifiable<String>, strictness: Strictness) -> Result<Modifiable<T>, WireError> {
    if strictness == Strictness::Strict {
        if let Some(raw) = source.get() {
            coerce_live::<T>(&raw, strictness)?;
        }
    }

    let target = Modifiable::empty();
    let sink = target.clone();
    source.add_listener(move |raw: Option<&String>| match raw {
        None => sink.set(None),
        Some(raw) => match coerce_live::<T>(raw, Strictness::Lenient) {
            Ok(value) => sink.set(value),
            Err(e) => tracing::warn!(error = %e, "ignoring live value that cannot be converted"),
        },
    });
    Ok(target)
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Value::Typed(_) => f.write_str("Typed(..)"),
            Value::Live(cell) => f.debug_tuple("Live").field(cell).finish(),
        }
    }
}
