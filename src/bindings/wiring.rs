//! Statically-typed member descriptions.
//!
//! Each constructible type describes its settable members once, through
//! [`Configure`]. Parameters are then matched to members by name and assigned
//! through the recorded accessor, so wiring is an indexed call rather than a
//! runtime lookup on the object.

use std::any::type_name;
use std::sync::Arc;

use super::evaluator::Parameter;
use super::referrals::Referrals;
use super::value::{Value, WireError};
use crate::config::{naming, Coerce, Strictness};
use crate::modifiable::Modifiable;
use crate::Error;

/// A type whose members can be populated from construction parameters.
///
/// ```
/// use dragon_ioc::{Configure, Modifiable, Wiring};
/// use std::time::Duration;
///
/// #[derive(Default)]
/// struct Cache {
///     capacity: usize,
///     ttl: Modifiable<Duration>,
/// }
///
/// impl Configure for Cache {
///     fn wiring(wiring: &mut Wiring<Self>) {
///         wiring
///             .value("capacity", |c| &mut c.capacity)
///             .live("ttl", |c| &mut c.ttl)
///             .require("capacity");
///     }
/// }
/// ```
pub trait Configure: Sized + Send + Sync + 'static {
    fn wiring(wiring: &mut Wiring<Self>) {
        let _ = wiring;
    }
}

enum Assigned {
    Value,
    Null,
}

type Assign<S> = Box<dyn Fn(&mut S, &Value, Strictness) -> Result<Assigned, WireError> + Send + Sync>;

struct Slot<S> {
    name: String,
    assign: Assign<S>,
}

/// The settable members of `S`.
pub struct Wiring<S> {
    slots: Vec<Slot<S>>,
    required: Vec<String>,
}

impl<S: Configure> Wiring<S> {
    pub(crate) fn describe() -> Self {
        let mut wiring = Self {
            slots: Vec::new(),
            required: Vec::new(),
        };
        S::wiring(&mut wiring);
        wiring
    }
}

impl<S: 'static> Wiring<S> {
    /// A member converted from text or taken as-is if already of type `T`.
    ///
    /// A null value assigns [`Coerce::absent`] when the type has one (e.g.
    /// `None` for an `Option`), and fails otherwise.
    pub fn value<T, F>(&mut self, name: &str, field: F) -> &mut Self
    where
        T: Coerce,
        F: Fn(&mut S) -> &mut T + Send + Sync + 'static,
    {
        self.slot(name, move |target, value, strictness| {
            match value.coerce::<T>(strictness)? {
                Some(converted) => {
                    *field(target) = converted;
                    Ok(Assigned::Value)
                }
                None => {
                    let absent = T::absent().ok_or(WireError::Null(type_name::<T>()))?;
                    *field(target) = absent;
                    Ok(Assigned::Null)
                }
            }
        })
    }

    /// A member that keeps following its configuration source after
    /// construction.
    pub fn live<T, F>(&mut self, name: &str, field: F) -> &mut Self
    where
        T: Coerce,
        F: Fn(&mut S) -> &mut Modifiable<T> + Send + Sync + 'static,
    {
        self.slot(name, move |target, value, strictness| {
            *field(target) = value.follow::<T>(strictness)?;
            Ok(if matches!(value, Value::Null) {
                Assigned::Null
            } else {
                Assigned::Value
            })
        })
    }

    /// A member that takes a typed value as-is.
    pub fn typed<V, F>(&mut self, name: &str, field: F) -> &mut Self
    where
        V: Clone + Send + Sync + 'static,
        F: Fn(&mut S) -> &mut Option<V> + Send + Sync + 'static,
    {
        self.slot(name, move |target, value, _| {
            let typed = value.downcast::<V>()?;
            let assigned = if typed.is_some() {
                Assigned::Value
            } else {
                Assigned::Null
            };
            *field(target) = typed;
            Ok(assigned)
        })
    }

    /// A member holding another component.
    pub fn reference<C, F>(&mut self, name: &str, field: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&mut S) -> &mut Option<Arc<C>> + Send + Sync + 'static,
    {
        self.typed(name, field)
    }

    /// A member holding every referral of a capability.
    pub fn referrals<C, F>(&mut self, name: &str, field: F) -> &mut Self
    where
        C: ?Sized + Send + Sync + 'static,
        F: Fn(&mut S) -> &mut Option<Referrals<C>> + Send + Sync + 'static,
    {
        self.typed(name, field)
    }

    /// Marks a member that must be bound during initialization.
    pub fn require(&mut self, name: &str) -> &mut Self {
        self.required.push(name.to_string());
        self
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.name.as_str())
    }

    pub fn has(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn slot(
        &mut self,
        name: &str,
        assign: impl Fn(&mut S, &Value, Strictness) -> Result<Assigned, WireError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.slots.push(Slot {
            name: name.to_string(),
            assign: Box::new(assign),
        });
        self
    }

    /// Exact name first, then naming-convention equivalence.
    fn position(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.name == name)
            .or_else(|| {
                self.slots
                    .iter()
                    .position(|slot| naming::same_member(&slot.name, name))
            })
    }

    /// Assigns evaluated parameters onto `target`.
    pub(crate) fn apply(
        &self,
        target: &mut S,
        values: &[(&Parameter, Value)],
        strictness: Strictness,
        type_name: &str,
    ) -> Result<(), Error> {
        let mut bound = vec![false; self.slots.len()];

        for (parameter, value) in values {
            let Some(index) = self.position(&parameter.name) else {
                unmatched(parameter, type_name)?;
                continue;
            };
            let slot = &self.slots[index];

            match (slot.assign)(target, value, strictness) {
                Ok(Assigned::Value) => {
                    tracing::trace!(type_name, member = %slot.name, "wired parameter");
                    bound[index] = true;
                }
                Ok(Assigned::Null) => {
                    tracing::warn!(type_name, member = %slot.name, "assigned null value");
                    bound[index] = true;
                }
                Err(e) if parameter.required => {
                    return Err(Error::Initialization {
                        type_name: type_name.to_string(),
                        reason: format!("cannot assign parameter '{}': {e}", parameter.name),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        type_name,
                        member = %slot.name,
                        error = %e,
                        "leaving member untouched"
                    );
                }
            }
        }

        for name in &self.required {
            if !self.position(name).is_some_and(|index| bound[index]) {
                return Err(Error::Initialization {
                    type_name: type_name.to_string(),
                    reason: format!("required member '{name}' was not set"),
                });
            }
        }
        Ok(())
    }
}

/// Handles a parameter that names no member of the target.
pub(crate) fn unmatched(parameter: &Parameter, type_name: &str) -> Result<(), Error> {
    if parameter.required {
        return Err(Error::Initialization {
            type_name: type_name.to_string(),
            reason: format!("no member named '{}'", parameter.name),
        });
    }
    tracing::warn!(type_name, parameter = %parameter.name, "no member for optional parameter");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::evaluator::Evaluator;

    #[derive(Default)]
    struct Target {
        block_size: u32,
        label: Option<String>,
        level: Modifiable<String>,
        tags: Option<Vec<String>>,
    }

    impl Configure for Target {
        fn wiring(wiring: &mut Wiring<Self>) {
            wiring
                .value("blockSize", |t| &mut t.block_size)
                .value("label", |t| &mut t.label)
                .live("level", |t| &mut t.level)
                .typed("tags", |t| &mut t.tags)
                .require("blockSize");
        }
    }

    fn parameter(name: &str, required: bool) -> Parameter {
        Parameter {
            name: name.to_string(),
            required,
            evaluator: Evaluator::Literal(Value::Null),
        }
    }

    fn wire(values: &[(&Parameter, Value)]) -> Result<Target, Error> {
        let mut target = Target::default();
        Wiring::<Target>::describe().apply(&mut target, values, Strictness::Lenient, "Target")?;
        Ok(target)
    }

    #[test]
    fn test_members_match_by_convention() {
        let wiring = Wiring::<Target>::describe();
        assert!(wiring.has("blockSize"));
        assert!(wiring.has("block-size"));
        assert!(wiring.has("block_size"));
        assert!(!wiring.has("block"));
    }

    #[test]
    fn test_wires_every_kind() {
        let size = parameter("block-size", true);
        let label = parameter("label", false);
        let level = parameter("level", false);
        let tags = parameter("tags", false);
        let source = Modifiable::new("info".to_string());

        let target = wire(&[
            (&size, Value::Text("512".into())),
            (&label, Value::Null),
            (&level, Value::Live(source.clone())),
            (&tags, Value::Typed(Arc::new(vec!["a".to_string()]))),
        ])
        .unwrap();

        assert_eq!(target.block_size, 512);
        assert_eq!(target.label, None);
        assert_eq!(target.level.get().as_deref(), Some("info"));
        assert_eq!(target.tags, Some(vec!["a".to_string()]));

        source.set(Some("debug".into()));
        assert_eq!(target.level.get().as_deref(), Some("debug"));
    }

    #[test]
    fn test_required_member_missing() {
        let label = parameter("label", false);
        let result = wire(&[(&label, Value::Text("x".into()))]);
        assert!(matches!(result, Err(Error::Initialization { .. })));
    }

    #[test]
    fn test_required_coercion_failure() {
        let size = parameter("blockSize", true);
        let result = wire(&[(&size, Value::Text("big".into()))]);
        assert!(matches!(result, Err(Error::Initialization { .. })));
    }

    #[test]
    fn test_optional_failures_are_skipped() {
        let size = parameter("blockSize", true);
        let unknown = parameter("colour", false);
        let tags = parameter("tags", false);

        let target = wire(&[
            (&size, Value::Text("1".into())),
            (&unknown, Value::Text("red".into())),
            (&tags, Value::Text("not typed".into())),
        ])
        .unwrap();
        assert_eq!(target.block_size, 1);
        assert_eq!(target.tags, None);
    }

    #[test]
    fn test_null_for_plain_member() {
        let size = parameter("blockSize", true);
        let result = wire(&[(&size, Value::Null)]);
        assert!(matches!(result, Err(Error::Initialization { .. })));
    }

    #[test]
    fn test_required_unknown_member() {
        let size = parameter("blockSize", true);
        let unknown = parameter("colour", true);
        let result = wire(&[(&size, Value::Text("1".into())), (&unknown, Value::Null)]);
        assert!(matches!(result, Err(Error::Initialization { .. })));
    }
}
