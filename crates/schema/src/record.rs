//! The field map a composite root holds, and its JSON codec.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use keepsake_persist::{Lens, PersistError, StateCodec};
use serde_json::{Map, Value};

use crate::schema::Schema;
use crate::strategy::Slot;

/// Live field values of one composite object, keyed by field name.
///
/// Every declared field is always present and holds its declared type.
/// Records only exist inside a [`PersistentObject`](crate::PersistentObject);
/// there is no public constructor.
///
/// ```compile_fail
/// let _ = keepsake_schema::Record::default();
/// ```
pub struct Record {
    slots: BTreeMap<String, Slot>,
}

impl Record {
    pub(crate) fn empty() -> Self {
        Self {
            slots: BTreeMap::new(),
        }
    }

    /// Typed borrow of a field. `None` if the name is unknown or the type differs.
    pub fn get<V: 'static>(&self, name: &str) -> Option<&V> {
        self.slots.get(name).and_then(|slot| (**slot).downcast_ref::<V>())
    }

    pub fn get_mut<V: 'static>(&mut self, name: &str) -> Option<&mut V> {
        self.slots.get_mut(name).and_then(|slot| (**slot).downcast_mut::<V>())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn slot(&self, name: &str) -> Option<&Slot> {
        self.slots.get(name)
    }

    /// Render through each field's strategy, in declaration order.
    pub(crate) fn to_json(&self, schema: &Schema) -> Result<Value, PersistError> {
        let mut doc = Map::new();
        for field in schema.fields() {
            let slot = self.slot(field.name()).ok_or_else(|| {
                PersistError::Document(format!("field {:?} missing from state", field.name()))
            })?;
            doc.insert(field.name().to_owned(), field.strategy.serialize(slot)?);
        }
        Ok(Value::Object(doc))
    }

    /// Put the record back into `schema`'s shape after a wholesale write:
    /// missing or retyped fields get their default, undeclared ones go.
    /// Returns whether anything changed.
    pub(crate) fn conform(&mut self, schema: &Schema) -> bool {
        let before = self.slots.len();
        self.slots.retain(|name, _| schema.field(name).is_some());
        let mut repaired = self.slots.len() != before;
        for field in schema.fields() {
            let fits = self
                .slots
                .get(field.name())
                .is_some_and(|slot| (**slot).type_id() == field.strategy.type_id());
            if !fits {
                self.slots
                    .insert(field.name().to_owned(), field.strategy.default_value());
                repaired = true;
            }
        }
        repaired
    }

    fn defaults(schema: &Schema) -> BTreeMap<String, Slot> {
        schema
            .fields()
            .map(|field| (field.name().to_owned(), field.strategy.default_value()))
            .collect()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("fields", &self.slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// `StateCodec` that moves a [`Record`] through one JSON object.
pub(crate) struct RecordCodec {
    schema: Arc<Schema>,
}

impl RecordCodec {
    pub(crate) fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }
}

impl StateCodec<Record> for RecordCodec {
    fn serialize(&self, state: &Record) -> Result<String, PersistError> {
        let doc = state.to_json(&self.schema)?;
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Rebuild every field from the parsed document. Keys the document lacks
    /// fall back to the field's default; keys the schema lacks are ignored.
    fn deserialize(&self, text: &str, state: &mut Record) -> Result<(), PersistError> {
        let Value::Object(mut doc) = serde_json::from_str::<Value>(text)? else {
            return Err(PersistError::Document("expected a JSON object".into()));
        };

        let mut slots = BTreeMap::new();
        for field in self.schema.fields() {
            let slot = match doc.remove(field.name()) {
                Some(json) => field.strategy.deserialize(json)?,
                None => {
                    tracing::debug!(field = field.name(), "field absent, using default");
                    field.strategy.default_value()
                }
            };
            slots.insert(field.name().to_owned(), slot);
        }
        for unknown in doc.keys() {
            tracing::debug!(key = %unknown, "ignoring undeclared key");
        }

        state.slots = slots;
        Ok(())
    }

    fn apply_default(&self, state: &mut Record) {
        state.slots = Record::defaults(&self.schema);
    }
}

/// Lens from a record to one of its fields.
pub(crate) struct FieldLens<S> {
    name: String,
    _target: PhantomData<fn() -> S>,
}

impl<S> FieldLens<S> {
    /// Callers check the field's declared type against `S` first.
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            _target: PhantomData,
        }
    }
}

impl<S: Any + Send + Sync> Lens<Record, S> for FieldLens<S> {
    fn get<'a>(&self, root: &'a Record) -> &'a S {
        root.get::<S>(&self.name)
            .expect("record holds every declared field with its declared type")
    }

    fn get_mut<'a>(&self, root: &'a mut Record) -> &'a mut S {
        root.get_mut::<S>(&self.name)
            .expect("record holds every declared field with its declared type")
    }
}
