//! Document-collection store abstraction.
//!
//! The pipeline never talks to a database directly. It reads and writes
//! JSON documents through [`DocumentStore`], an async trait with the five
//! operations every backing engine can offer: `get`, `find` (conjunctive
//! equality filter), `insert`, `update` (shallow merge) and `delete`.
//!
//! ## Field spellings
//!
//! Older records reference their owner scope and parents with snake_case
//! keys (`owner_scope_id`, `region_id`, `sub_area_id`). New records use
//! camelCase. Lookups walk [`LOOKUP_ORDER`] and stop at the first spelling
//! that yields a match; see [`find_first`] and [`find_all`].
//!
//! ## MemoryStore
//!
//! [`MemoryStore`] keeps collections in an `Arc<RwLock<..>>` and can be
//! snapshotted to and from a JSON file, which is how the CLI persists state
//! between runs.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
    sync::{Arc, RwLock},
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

pub type Document = serde_json::Map<String, Value>;

pub const ID_FIELD: &str = "id";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Regions,
    SubAreas,
    LeafRecords,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Regions => "regions",
            Collection::SubAreas => "subAreas",
            Collection::LeafRecords => "leafRecords",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spelling {
    Current,
    Legacy,
}

pub const LOOKUP_ORDER: [Spelling; 2] = [Spelling::Current, Spelling::Legacy];

/// Reference fields whose key changed between naming conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    OwnerScopeId,
    RegionId,
    SubAreaId,
    CityId,
}

impl Field {
    pub fn name(self, spelling: Spelling) -> &'static str {
        match (self, spelling) {
            (Field::OwnerScopeId, Spelling::Current) => "ownerScopeId",
            (Field::OwnerScopeId, Spelling::Legacy) => "owner_scope_id",
            (Field::RegionId, Spelling::Current) => "regionId",
            (Field::RegionId, Spelling::Legacy) => "region_id",
            (Field::SubAreaId, Spelling::Current) => "subAreaId",
            (Field::SubAreaId, Spelling::Legacy) => "sub_area_id",
            (Field::CityId, Spelling::Current) => "cityId",
            (Field::CityId, Spelling::Legacy) => "city_id",
        }
    }
}

/// Conjunction of `field == value` clauses.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.clauses
            .iter()
            .all(|(field, value)| document.get(field) == Some(value))
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>>;

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>>;

    /// Inserts `document`, generating an `id` when it carries none. Returns the id.
    async fn insert(&self, collection: Collection, document: Document) -> StoreResult<String>;

    /// Shallow-merges `patch` into the document `id`.
    async fn update(&self, collection: Collection, id: &str, patch: Document) -> StoreResult<()>;

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()>;
}

pub fn document_id(document: &Document) -> Option<&str> {
    document.get(ID_FIELD).and_then(Value::as_str)
}

/// Runs `filter_for` once per spelling in [`LOOKUP_ORDER`] and returns the first
/// document accepted by `accept`.
pub async fn find_first<S, F, A>(
    store: &S,
    collection: Collection,
    filter_for: F,
    accept: A,
) -> StoreResult<Option<Document>>
where
    S: DocumentStore + ?Sized,
    F: Fn(Spelling) -> Filter,
    A: Fn(&Document) -> bool,
{
    for spelling in LOOKUP_ORDER {
        let found = store.find(collection, &filter_for(spelling)).await?;
        if let Some(document) = found.into_iter().find(|doc| accept(doc)) {
            return Ok(Some(document));
        }
    }
    Ok(None)
}

/// Union of the matches of every spelling, de-duplicated by id.
pub async fn find_all<S, F>(
    store: &S,
    collection: Collection,
    filter_for: F,
) -> StoreResult<Vec<Document>>
where
    S: DocumentStore + ?Sized,
    F: Fn(Spelling) -> Filter,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for spelling in LOOKUP_ORDER {
        for document in store.find(collection, &filter_for(spelling)).await? {
            let id = document_id(&document).unwrap_or_default().to_string();
            if seen.insert(id) {
                merged.push(document);
            }
        }
    }
    Ok(merged)
}

type Collections = BTreeMap<Collection, BTreeMap<String, Document>>;

/// In-memory [`DocumentStore`], cloneable and shareable across tasks.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON snapshot written by [`MemoryStore::save_json`]; a missing file yields an empty store.
    pub fn load_json(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let file = File::open(path).with_context(|| format!("Opening store file {path:?}"))?;
        let data: Collections = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing store file {path:?}"))?;
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
        })
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        let file = File::create(path).with_context(|| format!("Creating store file {path:?}"))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &snapshot)
            .with_context(|| format!("Writing store file {path:?}"))?;
        writer.flush()?;
        Ok(())
    }

    fn snapshot(&self) -> StoreResult<Collections> {
        Ok(self.read()?.clone())
    }

    /// All documents of `collection`, ordered by id.
    pub fn documents(&self, collection: Collection) -> Vec<Document> {
        self.read()
            .map(|data| {
                data.get(&collection)
                    .map(|docs| docs.values().cloned().collect())
                    .unwrap_or_default()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.read()
            .map(|data| data.get(&collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.read()
            .map(|data| data.values().all(BTreeMap::is_empty))
            .unwrap_or(true)
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Collections>> {
        self.data
            .read()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
    }

    fn write(&self) -> StoreResult<std::sync::RwLockWriteGuard<'_, Collections>> {
        self.data
            .write()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        Ok(self
            .read()?
            .get(&collection)
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        Ok(self
            .read()?
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| filter.matches(doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert(&self, collection: Collection, mut document: Document) -> StoreResult<String> {
        let id = match document_id(&document) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = Uuid::new_v4().to_string();
                document.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };
        self.write()?
            .entry(collection)
            .or_default()
            .insert(id.clone(), document);
        Ok(id)
    }

    async fn update(&self, collection: Collection, id: &str, patch: Document) -> StoreResult<()> {
        let mut data = self.write()?;
        let document = data
            .get_mut(&collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        for (key, value) in patch {
            if key != ID_FIELD {
                document.insert(key, value);
            }
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        if let Some(docs) = self.write()?.get_mut(&collection) {
            docs.remove(id);
        }
        Ok(())
    }
}
