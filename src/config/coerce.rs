//! String to typed value conversion.
//!
//! Every configuration value arrives as a string. [`Coerce`] turns it into
//! the type of the member it is wired onto. Sequences and maps accept a JSON
//! list/object whose elements are coerced recursively.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::de::DeserializeOwned;

use super::ConfigError;

/// How forgiving coercion is about malformed values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Runtime behavior: booleans are `true` (any case) or else `false`.
    #[default]
    Lenient,
    /// Validation behavior: anything that cannot be converted with
    /// confidence is rejected.
    Strict,
}

/// A type that can be produced from a configuration string.
pub trait Coerce: Clone + Send + Sync + 'static {
    fn coerce(raw: &str, strictness: Strictness) -> Result<Self, ConfigError>;

    /// The value assigned when the source resolves to nothing, if the type
    /// has one.
    fn absent() -> Option<Self> {
        None
    }

    /// Accepts an already-typed value.
    fn from_any(value: &dyn Any) -> Option<Self> {
        value.downcast_ref::<Self>().cloned()
    }
}

impl Coerce for String {
    fn coerce(raw: &str, _: Strictness) -> Result<Self, ConfigError> {
        Ok(raw.to_string())
    }
}

impl Coerce for bool {
    fn coerce(raw: &str, strictness: Strictness) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if strictness == Strictness::Lenient || raw.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(ConfigError::coerce::<bool>(raw, "expected true or false"))
        }
    }
}

macro_rules! coerce_from_str {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Coerce for $ty {
                fn coerce(raw: &str, _: Strictness) -> Result<Self, ConfigError> {
                    <$ty>::from_str(raw.trim()).map_err(|e| ConfigError::coerce::<$ty>(raw, e))
                }
            }
        )*
    };
}

coerce_from_str!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64, char);

impl Coerce for PathBuf {
    fn coerce(raw: &str, _: Strictness) -> Result<Self, ConfigError> {
        Ok(PathBuf::from(raw))
    }
}

/// Accepts human-readable durations such as `250ms`, `2 minutes` or `1h 30m`.
impl Coerce for Duration {
    fn coerce(raw: &str, _: Strictness) -> Result<Self, ConfigError> {
        humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::coerce::<Duration>(raw, e))
    }
}

impl<T: Coerce> Coerce for Option<T> {
    fn coerce(raw: &str, strictness: Strictness) -> Result<Self, ConfigError> {
        T::coerce(raw, strictness).map(Some)
    }

    fn absent() -> Option<Self> {
        Some(None)
    }

    fn from_any(value: &dyn Any) -> Option<Self> {
        value
            .downcast_ref::<Self>()
            .cloned()
            .or_else(|| T::from_any(value).map(Some))
    }
}

/// Coerces a JSON element: strings are taken verbatim, anything else by its
/// JSON text so nested lists and maps recurse.
fn coerce_element<T: Coerce>(element: &serde_json::Value, strictness: Strictness) -> Result<T, ConfigError> {
    match element {
        serde_json::Value::String(s) => T::coerce(s, strictness),
        other => T::coerce(&other.to_string(), strictness),
    }
}

/// A JSON array, or for convenience a comma-separated list.
impl<T: Coerce> Coerce for Vec<T> {
    fn coerce(raw: &str, strictness: Strictness) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        if trimmed.starts_with('[') {
            let elements: Vec<serde_json::Value> =
                serde_json::from_str(trimmed).map_err(|e| ConfigError::coerce::<Self>(raw, e))?;
            return elements
                .iter()
                .map(|element| coerce_element(element, strictness))
                .collect();
        }
        trimmed
            .split(',')
            .map(|item| T::coerce(item.trim(), strictness))
            .collect()
    }
}

fn coerce_object<T: Coerce, M: FromIterator<(String, T)>>(
    raw: &str,
    strictness: Strictness,
) -> Result<M, ConfigError> {
    let object: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw.trim()).map_err(|e| ConfigError::coerce::<M>(raw, e))?;
    object
        .iter()
        .map(|(key, element)| Ok((key.clone(), coerce_element(element, strictness)?)))
        .collect()
}

impl<T: Coerce> Coerce for BTreeMap<String, T> {
    fn coerce(raw: &str, strictness: Strictness) -> Result<Self, ConfigError> {
        coerce_object(raw, strictness)
    }
}

impl<T: Coerce> Coerce for HashMap<String, T> {
    fn coerce(raw: &str, strictness: Strictness) -> Result<Self, ConfigError> {
        coerce_object(raw, strictness)
    }
}

/// Any deserializable type, read from JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json<T>(pub T);

impl<T> Coerce for Json<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn coerce(raw: &str, _: Strictness) -> Result<Self, ConfigError> {
        serde_json::from_str(raw)
            .map(Json)
            .map_err(|e| ConfigError::coerce::<T>(raw, e))
    }
}
