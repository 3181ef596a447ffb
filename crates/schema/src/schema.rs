//! Field declarations and schema validation.

use std::any::{TypeId, type_name};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::SchemaError;
use crate::strategy::{DefaultFn, FieldKind, FieldStrategy, Slot, SlotCodec, empty};

struct DeclaredDefault {
    type_id: TypeId,
    type_name: &'static str,
    make: DefaultFn,
}

/// One field of a schema, as declared.
///
/// ```
/// use keepsake_schema::{FieldSpec, Schema};
///
/// let schema = Schema::builder()
///     .field(FieldSpec::list::<String>("hosts"))
///     .field(FieldSpec::value::<u32>("retries").default_value(3u32))
///     .build()?;
/// assert_eq!(schema.len(), 2);
/// # Ok::<(), keepsake_schema::SchemaError>(())
/// ```
pub struct FieldSpec {
    name: String,
    shape: Shape,
    codec: SlotCodec,
    defaults: Vec<DeclaredDefault>,
}

/// Declared kind; collections carry their empty constructor.
enum Shape {
    Value,
    List(fn() -> Slot),
    Set(fn() -> Slot),
    Map(fn() -> Slot),
}

impl FieldSpec {
    fn new(name: impl Into<String>, shape: Shape, codec: SlotCodec) -> Self {
        Self {
            name: name.into(),
            shape,
            codec,
            defaults: Vec::new(),
        }
    }

    /// A plain serde value. Needs exactly one default.
    pub fn value<V>(name: impl Into<String>) -> Self
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Self::new(name, Shape::Value, SlotCodec::of::<V>())
    }

    pub fn list<E>(name: impl Into<String>) -> Self
    where
        E: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Self::new(name, Shape::List(empty::<Vec<E>>), SlotCodec::of::<Vec<E>>())
    }

    pub fn set<E>(name: impl Into<String>) -> Self
    where
        E: Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Self::new(
            name,
            Shape::Set(empty::<BTreeSet<E>>),
            SlotCodec::of::<BTreeSet<E>>(),
        )
    }

    pub fn map<K, V>(name: impl Into<String>) -> Self
    where
        K: Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        Self::new(
            name,
            Shape::Map(empty::<BTreeMap<K, V>>),
            SlotCodec::of::<BTreeMap<K, V>>(),
        )
    }

    /// Default produced on demand (missing file, missing key, reload).
    pub fn default_with<V>(mut self, make: impl Fn() -> V + Send + Sync + 'static) -> Self
    where
        V: Send + Sync + 'static,
    {
        self.defaults.push(DeclaredDefault {
            type_id: TypeId::of::<V>(),
            type_name: type_name::<V>(),
            make: Arc::new(move || -> Slot { Box::new(make()) }),
        });
        self
    }

    pub fn default_value<V>(self, value: V) -> Self
    where
        V: Clone + Send + Sync + 'static,
    {
        self.default_with(move || value.clone())
    }

    fn into_field(self) -> Result<Field, SchemaError> {
        let Self {
            name,
            shape,
            codec,
            mut defaults,
        } = self;

        if name.is_empty() {
            return Err(SchemaError::EmptyFieldName);
        }
        let strategy = match shape {
            Shape::Value => {
                if defaults.len() > 1 {
                    return Err(SchemaError::ConflictingDefault(name));
                }
                let Some(default) = defaults.pop() else {
                    return Err(SchemaError::MissingDefault(name));
                };
                if default.type_id != codec.type_id() {
                    return Err(SchemaError::DefaultType {
                        field: name,
                        declared: codec.type_name(),
                        found: default.type_name,
                    });
                }
                FieldStrategy::Value {
                    codec,
                    default: default.make,
                }
            }
            _ if !defaults.is_empty() => return Err(SchemaError::DefaultOnCollection(name)),
            Shape::List(empty) => FieldStrategy::List { codec, empty },
            Shape::Set(empty) => FieldStrategy::Set { codec, empty },
            Shape::Map(empty) => FieldStrategy::Map { codec, empty },
        };
        Ok(Field { name, strategy })
    }
}

/// A validated field: name plus the strategy chosen for its type.
pub struct Field {
    name: String,
    pub(crate) strategy: FieldStrategy,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FieldKind {
        self.strategy.kind()
    }

    /// The Rust type the field holds.
    pub fn type_name(&self) -> &'static str {
        self.strategy.type_name()
    }
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("type", &self.type_name())
            .finish()
    }
}

/// Closed list of named, typed fields describing a composite object.
#[derive(Debug)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[derive(Default)]
pub struct SchemaBuilder {
    specs: Vec<FieldSpec>,
}

impl SchemaBuilder {
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Validate every declaration. Names must be non-empty and unique; value
    /// fields need exactly one default of their own type; collection fields
    /// take none.
    pub fn build(self) -> Result<Schema, SchemaError> {
        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(self.specs.len());
        for spec in self.specs {
            let field = spec.into_field()?;
            if !seen.insert(field.name.clone()) {
                return Err(SchemaError::DuplicateField(field.name));
            }
            fields.push(field);
        }
        tracing::debug!(fields = fields.len(), "schema built");
        Ok(Schema { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(spec: FieldSpec) -> Result<Schema, SchemaError> {
        Schema::builder().field(spec).build()
    }

    #[test]
    fn declaration_order_is_kept() {
        let schema = Schema::builder()
            .field(FieldSpec::value::<bool>("enabled").default_value(true))
            .field(FieldSpec::map::<String, u32>("limits"))
            .field(FieldSpec::set::<String>("tags"))
            .build()
            .unwrap();
        let names: Vec<&str> = schema.fields().map(Field::name).collect();
        assert_eq!(names, ["enabled", "limits", "tags"]);
        assert_eq!(schema.field("limits").unwrap().kind(), FieldKind::Map);
        assert!(schema.field("absent").is_none());
    }

    #[test]
    fn value_field_needs_one_default() {
        assert_eq!(
            build(FieldSpec::value::<u32>("retries")).unwrap_err(),
            SchemaError::MissingDefault("retries".into())
        );
        assert_eq!(
            build(
                FieldSpec::value::<u32>("retries")
                    .default_value(1u32)
                    .default_with(|| 2u32)
            )
            .unwrap_err(),
            SchemaError::ConflictingDefault("retries".into())
        );
    }

    #[test]
    fn default_must_match_field_type() {
        let err = build(FieldSpec::value::<u32>("retries").default_value(3i64)).unwrap_err();
        assert!(matches!(err, SchemaError::DefaultType { ref field, .. } if field == "retries"));
    }

    #[test]
    fn collections_reject_defaults() {
        let err = build(FieldSpec::list::<u8>("bytes").default_value(vec![1u8])).unwrap_err();
        assert_eq!(err, SchemaError::DefaultOnCollection("bytes".into()));
    }

    #[test]
    fn names_are_non_empty_and_unique() {
        assert_eq!(
            build(FieldSpec::list::<u8>("")).unwrap_err(),
            SchemaError::EmptyFieldName
        );
        let err = Schema::builder()
            .field(FieldSpec::list::<u8>("a"))
            .field(FieldSpec::set::<u8>("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateField("a".into()));
    }
}
