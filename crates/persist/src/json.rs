//! JSON-backed container wirings.
//!
//! The serializer renders the live collection as a JSON document, the
//! deserializer installs a parsed document into the existing state, and the
//! default applier resets the state (an empty collection, or an explicit default
//! for scalar values).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::container::{ContainerConfig, PersistentContainer, StateCodec};
use crate::error::PersistError;
use crate::list::PersistentList;
use crate::map::PersistentMap;
use crate::set::PersistentSet;
use crate::value::PersistentValue;

/// `StateCodec` over `serde_json`.
pub struct JsonCodec<T> {
    pretty: bool,
    reset: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Default + 'static> JsonCodec<T> {
    /// Pretty-printed documents; the default state is `T::default()`.
    pub fn new() -> Self {
        Self::with_default(T::default)
    }
}

impl<T: Default + 'static> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> JsonCodec<T> {
    pub fn with_default(reset: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            pretty: true,
            reset: Box::new(reset),
        }
    }

    /// Single-line documents.
    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec")
            .field("pretty", &self.pretty)
            .finish_non_exhaustive()
    }
}

impl<T> StateCodec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn serialize(&self, state: &T) -> Result<String, PersistError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(state)?
        } else {
            serde_json::to_string(state)?
        };
        Ok(text)
    }

    fn deserialize(&self, text: &str, state: &mut T) -> Result<(), PersistError> {
        // Parse fully before touching the state so a bad document leaves it intact.
        *state = serde_json::from_str(text)?;
        Ok(())
    }

    fn apply_default(&self, state: &mut T) {
        *state = (self.reset)();
    }
}

/// Opens JSON-backed roots at one path with shared settings.
///
/// ```no_run
/// use keepsake_persist::json::JsonStore;
///
/// let scores = JsonStore::new("scores.json").map::<String, i64>()?;
/// scores.insert("ada".into(), 3);
/// # Ok::<(), keepsake_persist::PersistError>(())
/// ```
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    config: ContainerConfig,
    pretty: bool,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config: ContainerConfig::default(),
            pretty: true,
        }
    }

    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn compact(mut self) -> Self {
        self.pretty = false;
        self
    }

    fn codec<T>(&self, reset: impl Fn() -> T + Send + Sync + 'static) -> JsonCodec<T> {
        let codec = JsonCodec::with_default(reset);
        if self.pretty { codec } else { codec.compact() }
    }

    /// Root over any serde collection; its default state is `C::default()`.
    pub fn collection<C>(self) -> Result<PersistentContainer<C>, PersistError>
    where
        C: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
    {
        let codec = self.codec(C::default);
        PersistentContainer::open_with(self.path, C::default, codec, self.config)
    }

    pub fn list<E>(self) -> Result<PersistentList<E>, PersistError>
    where
        E: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.collection::<Vec<E>>().map(PersistentList::new)
    }

    pub fn set<E>(self) -> Result<PersistentSet<E>, PersistError>
    where
        E: Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.collection::<BTreeSet<E>>().map(PersistentSet::new)
    }

    pub fn map<K, V>(self) -> Result<PersistentMap<K, V>, PersistError>
    where
        K: Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        self.collection::<BTreeMap<K, V>>().map(PersistentMap::new)
    }

    /// Scalar root. `default` supplies the value while no file exists.
    pub fn value<V>(
        self,
        default: impl Fn() -> V + Send + Sync + 'static,
    ) -> Result<PersistentValue<V>, PersistError>
    where
        V: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let initial = default();
        let codec = self.codec(default);
        PersistentContainer::open_with(self.path, || initial, codec, self.config)
            .map(PersistentValue::new)
    }
}

pub fn open_collection<C>(path: impl Into<PathBuf>) -> Result<PersistentContainer<C>, PersistError>
where
    C: Serialize + DeserializeOwned + Default + Send + Sync + 'static,
{
    JsonStore::new(path).collection()
}

pub fn open_list<E>(path: impl Into<PathBuf>) -> Result<PersistentList<E>, PersistError>
where
    E: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    JsonStore::new(path).list()
}

pub fn open_set<E>(path: impl Into<PathBuf>) -> Result<PersistentSet<E>, PersistError>
where
    E: Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    JsonStore::new(path).set()
}

pub fn open_map<K, V>(path: impl Into<PathBuf>) -> Result<PersistentMap<K, V>, PersistError>
where
    K: Ord + Serialize + DeserializeOwned + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    JsonStore::new(path).map()
}

pub fn open_value<V>(
    path: impl Into<PathBuf>,
    default: impl Fn() -> V + Send + Sync + 'static,
) -> Result<PersistentValue<V>, PersistError>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    JsonStore::new(path).value(default)
}
