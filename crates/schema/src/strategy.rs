//! Per-field serialize / deserialize / default behaviour.
//!
//! The strategy is a closed enum picked when the field is declared, so dispatch
//! never inspects values at runtime. Each field's live value sits in a type-erased
//! slot; the codec's function pointers are monomorphized for the declared type.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Storage for one field of a record.
pub(crate) type Slot = Box<dyn Any + Send + Sync>;

pub(crate) type DefaultFn = Arc<dyn Fn() -> Slot + Send + Sync>;

/// What a field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// A scalar or any other serde value; requires a default.
    Value,
    /// `Vec<E>`, exposed as a live list view.
    List,
    /// `BTreeSet<E>`, exposed as a live set view.
    Set,
    /// `BTreeMap<K, V>`, exposed as a live map view.
    Map,
}

/// JSON conversion for one concrete field type.
#[derive(Clone, Copy)]
pub(crate) struct SlotCodec {
    type_id: TypeId,
    type_name: &'static str,
    encode: fn(&(dyn Any + Send + Sync)) -> Result<Value, serde_json::Error>,
    decode: fn(Value) -> Result<Slot, serde_json::Error>,
}

impl SlotCodec {
    pub(crate) fn of<C>() -> Self
    where
        C: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Self {
            type_id: TypeId::of::<C>(),
            type_name: type_name::<C>(),
            encode: encode::<C>,
            decode: decode::<C>,
        }
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }
}

fn encode<C: Serialize + 'static>(slot: &(dyn Any + Send + Sync)) -> Result<Value, serde_json::Error> {
    match slot.downcast_ref::<C>() {
        Some(typed) => serde_json::to_value(typed),
        None => Err(serde::ser::Error::custom(format_args!(
            "slot does not hold a {}",
            type_name::<C>()
        ))),
    }
}

fn decode<C: DeserializeOwned + Send + Sync + 'static>(json: Value) -> Result<Slot, serde_json::Error> {
    let slot: Slot = Box::new(serde_json::from_value::<C>(json)?);
    Ok(slot)
}

pub(crate) fn empty<C: Default + Send + Sync + 'static>() -> Slot {
    Box::new(C::default())
}

/// How one declared field is rendered, parsed and defaulted.
#[derive(Clone)]
pub(crate) enum FieldStrategy {
    Value { codec: SlotCodec, default: DefaultFn },
    List { codec: SlotCodec, empty: fn() -> Slot },
    Set { codec: SlotCodec, empty: fn() -> Slot },
    Map { codec: SlotCodec, empty: fn() -> Slot },
}

impl FieldStrategy {
    pub(crate) fn kind(&self) -> FieldKind {
        match self {
            Self::Value { .. } => FieldKind::Value,
            Self::List { .. } => FieldKind::List,
            Self::Set { .. } => FieldKind::Set,
            Self::Map { .. } => FieldKind::Map,
        }
    }

    fn codec(&self) -> &SlotCodec {
        match self {
            Self::Value { codec, .. }
            | Self::List { codec, .. }
            | Self::Set { codec, .. }
            | Self::Map { codec, .. } => codec,
        }
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.codec().type_id()
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.codec().type_name()
    }

    pub(crate) fn serialize(&self, slot: &Slot) -> Result<Value, serde_json::Error> {
        (self.codec().encode)(&**slot)
    }

    pub(crate) fn deserialize(&self, json: Value) -> Result<Slot, serde_json::Error> {
        (self.codec().decode)(json)
    }

    /// A fresh default: the declared default for values, empty for collections.
    pub(crate) fn default_value(&self) -> Slot {
        match self {
            Self::Value { default, .. } => default(),
            Self::List { empty, .. } | Self::Set { empty, .. } | Self::Map { empty, .. } => empty(),
        }
    }
}

impl fmt::Debug for FieldStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldStrategy")
            .field("kind", &self.kind())
            .field("type", &self.type_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn value_strategy_uses_declared_default() {
        let strategy = FieldStrategy::Value {
            codec: SlotCodec::of::<u32>(),
            default: Arc::new(|| Box::new(3u32) as Slot),
        };
        let slot = strategy.default_value();
        assert_eq!(slot.downcast_ref::<u32>(), Some(&3));
        assert_eq!(strategy.serialize(&slot).unwrap(), serde_json::json!(3));
        assert_eq!(strategy.kind(), FieldKind::Value);
    }

    #[test]
    fn set_strategy_round_trips_through_json() {
        let strategy = FieldStrategy::Set {
            codec: SlotCodec::of::<BTreeSet<String>>(),
            empty: empty::<BTreeSet<String>>,
        };
        let slot = strategy.deserialize(serde_json::json!(["b", "a"])).unwrap();
        let set = slot.downcast_ref::<BTreeSet<String>>().unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(strategy.serialize(&slot).unwrap(), serde_json::json!(["a", "b"]));
        assert!(
            strategy
                .default_value()
                .downcast_ref::<BTreeSet<String>>()
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn mismatched_json_is_an_error() {
        let codec = SlotCodec::of::<Vec<u8>>();
        assert!((codec.decode)(serde_json::json!({"not": "a list"})).is_err());
        let wrong: Slot = Box::new("text".to_string());
        assert!((codec.encode)(&*wrong).is_err());
    }
}
