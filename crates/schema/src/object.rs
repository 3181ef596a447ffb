//! Composite persisted objects.

use std::any::{Any, TypeId, type_name};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use keepsake_persist::{
    ContainerConfig, FlushStats, LockedAccess, PersistError, PersistentContainer, PersistentData,
    PersistentList, PersistentMap, PersistentSet, PersistentValue,
};
use serde_json::Value;

use crate::error::{ObjectError, SchemaError};
use crate::record::{FieldLens, Record, RecordCodec};
use crate::schema::{Field, Schema};

/// A user type backed by a [`PersistentObject`].
///
/// Convenience methods that are not fields live on the implementing type.
///
/// ```no_run
/// use keepsake_schema::{Composite, FieldSpec, ObjectError, PersistentObject, Schema, SchemaError};
///
/// struct Settings(PersistentObject);
///
/// impl Composite for Settings {
///     fn schema() -> Result<Schema, SchemaError> {
///         Schema::builder()
///             .field(FieldSpec::value::<u32>("retries").default_value(3u32))
///             .build()
///     }
///
///     fn from_object(object: PersistentObject) -> Self {
///         Settings(object)
///     }
/// }
///
/// impl Settings {
///     fn retries(&self) -> Result<u32, ObjectError> {
///         self.0.get("retries")
///     }
/// }
///
/// let settings = PersistentObject::open_as::<Settings>("settings.json")?;
/// assert_eq!(settings.retries()?, 3);
/// # Ok::<(), ObjectError>(())
/// ```
pub trait Composite: Sized {
    fn schema() -> Result<Schema, SchemaError>;

    fn from_object(object: PersistentObject) -> Self;
}

/// One JSON document whose fields are described by a [`Schema`].
///
/// Collection fields are handed out as live views over the same root, so they
/// share its lock and dirty flag and follow it across `reload`.
#[derive(Clone)]
pub struct PersistentObject {
    root: PersistentContainer<Record>,
    schema: Arc<Schema>,
}

impl PersistentObject {
    pub fn open(path: impl Into<PathBuf>, schema: Schema) -> Result<Self, ObjectError> {
        Self::open_with(path, schema, ContainerConfig::default())
    }

    pub fn open_with(
        path: impl Into<PathBuf>,
        schema: Schema,
        config: ContainerConfig,
    ) -> Result<Self, ObjectError> {
        let schema = Arc::new(schema);
        let codec = RecordCodec::new(Arc::clone(&schema));
        let root = PersistentContainer::open_with(path, Record::empty, codec, config)?;
        Ok(Self { root, schema })
    }

    /// Build `C`'s schema, open the object and wrap it.
    pub fn open_as<C: Composite>(path: impl Into<PathBuf>) -> Result<C, ObjectError> {
        let schema = C::schema()?;
        Ok(C::from_object(Self::open(path, schema)?))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The declared field `name`, checked to hold `T`.
    fn field<T: Any>(&self, name: &str) -> Result<&Field, ObjectError> {
        let field = self
            .schema
            .field(name)
            .ok_or_else(|| ObjectError::UnknownField(name.to_owned()))?;
        if field.strategy.type_id() != TypeId::of::<T>() {
            return Err(mismatch::<T>(field));
        }
        Ok(field)
    }

    /// A caller holding `&mut Record` may swap in another object's record.
    fn conform(&self, record: &mut Record) -> bool {
        let repaired = record.conform(&self.schema);
        if repaired {
            tracing::warn!(
                path = %self.root.path().display(),
                "record rewritten outside its schema, missing fields reset to defaults"
            );
        }
        repaired
    }

    /// Copy of a field's current value.
    pub fn get<V: Any + Clone>(&self, name: &str) -> Result<V, ObjectError> {
        let field = self.field::<V>(name)?;
        self.root
            .read_locked(|record| record.get::<V>(field.name()).cloned())
            .ok_or_else(|| mismatch::<V>(field))
    }

    /// Replace a field's value.
    pub fn put<V: Any + Send + Sync>(&self, name: &str, value: V) -> Result<(), ObjectError> {
        let field = self.field::<V>(name)?;
        let stored = self.root.test_write_locked(
            |record| match record.get_mut::<V>(field.name()) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            |stored| *stored,
        );
        if stored { Ok(()) } else { Err(mismatch::<V>(field)) }
    }

    /// Live view of a field.
    pub fn value<V: Any + Send + Sync>(&self, name: &str) -> Result<PersistentValue<V>, ObjectError> {
        let field = self.field::<V>(name)?;
        Ok(PersistentValue::project(
            self.root.clone(),
            FieldLens::new(field.name()),
        ))
    }

    pub fn list<E: Any + Send + Sync>(&self, name: &str) -> Result<PersistentList<E>, ObjectError> {
        let field = self.field::<Vec<E>>(name)?;
        Ok(PersistentList::project(
            self.root.clone(),
            FieldLens::new(field.name()),
        ))
    }

    pub fn set<E: Any + Ord + Send + Sync>(&self, name: &str) -> Result<PersistentSet<E>, ObjectError> {
        let field = self.field::<BTreeSet<E>>(name)?;
        Ok(PersistentSet::project(
            self.root.clone(),
            FieldLens::new(field.name()),
        ))
    }

    pub fn map<K, V>(&self, name: &str) -> Result<PersistentMap<K, V>, ObjectError>
    where
        K: Any + Ord + Send + Sync,
        V: Any + Send + Sync,
    {
        let field = self.field::<BTreeMap<K, V>>(name)?;
        Ok(PersistentMap::project(
            self.root.clone(),
            FieldLens::new(field.name()),
        ))
    }

    /// The whole object as JSON, rendered under one read lock.
    pub fn to_json(&self) -> Result<Value, ObjectError> {
        Ok(self.root.read_locked(|record| record.to_json(&self.schema))?)
    }
}

fn mismatch<T>(field: &Field) -> ObjectError {
    ObjectError::FieldType {
        field: field.name().to_owned(),
        declared: field.type_name(),
        requested: type_name::<T>(),
    }
}

impl PersistentData for PersistentObject {
    fn path(&self) -> &Path {
        self.root.path()
    }

    fn mark_dirty(&self) {
        self.root.mark_dirty();
    }

    fn is_dirty(&self) -> bool {
        self.root.is_dirty()
    }

    fn reload(&self) -> Result<(), PersistError> {
        self.root.reload()
    }

    fn flush(&self) -> Result<bool, PersistError> {
        self.root.flush()
    }

    fn wait_for_flush(&self, timeout: Duration) -> bool {
        self.root.wait_for_flush(timeout)
    }

    fn stats(&self) -> FlushStats {
        self.root.stats()
    }
}

impl LockedAccess for PersistentObject {
    type Target = Record;

    fn read_locked<R>(&self, f: impl FnOnce(&Record) -> R) -> R {
        self.root.read_locked(f)
    }

    fn write_locked<R>(&self, f: impl FnOnce(&mut Record) -> R) -> R {
        self.root.write_locked(|record| {
            let out = f(record);
            self.conform(record);
            out
        })
    }

    fn test_write_locked<R>(
        &self,
        f: impl FnOnce(&mut Record) -> R,
        changed: impl FnOnce(&R) -> bool,
    ) -> R {
        let (out, _) = self.root.test_write_locked(
            |record| {
                let out = f(record);
                let repaired = self.conform(record);
                (out, repaired)
            },
            |(out, repaired)| *repaired || changed(out),
        );
        out
    }
}

impl PartialEq for PersistentObject {
    fn eq(&self, other: &Self) -> bool {
        let Ok(mine) = self.to_json() else {
            return false;
        };
        other.to_json().is_ok_and(|theirs| mine == theirs)
    }
}

impl Hash for PersistentObject {
    fn hash<H: Hasher>(&self, state: &mut H) {
        if let Ok(json) = self.to_json() {
            json.to_string().hash(state);
        }
    }
}

impl fmt::Debug for PersistentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{json}"),
            Err(err) => write!(f, "<unrenderable: {err}>"),
        }
    }
}
