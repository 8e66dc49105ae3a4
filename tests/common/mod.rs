#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::{TempDir, tempdir};
use territory_sync::{
    error::{StoreError, StoreResult},
    model::{LeafRecord, SubArea, from_document},
    store::{Collection, Document, DocumentStore, Filter, MemoryStore},
};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

pub fn doc(value: Value) -> Document {
    value.as_object().cloned().expect("object literal")
}

pub fn leaf_records(store: &MemoryStore) -> Vec<LeafRecord> {
    store
        .documents(Collection::LeafRecords)
        .into_iter()
        .map(|d| from_document(d, Collection::LeafRecords).expect("leaf record"))
        .collect()
}

pub fn sub_areas(store: &MemoryStore) -> Vec<SubArea> {
    store
        .documents(Collection::SubAreas)
        .into_iter()
        .map(|d| from_document(d, Collection::SubAreas).expect("sub-area"))
        .collect()
}

/// Wraps a [`MemoryStore`], counting calls and failing writes whose document
/// carries a street listed in `poisoned_streets`.
#[derive(Debug, Default)]
pub struct InstrumentedStore {
    pub inner: MemoryStore,
    pub finds: AtomicUsize,
    pub writes: AtomicUsize,
    poisoned_streets: Mutex<Vec<String>>,
    fail_deletes: Mutex<Vec<String>>,
}

impl InstrumentedStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    pub fn poison_street(&self, street: &str) {
        self.poisoned_streets
            .lock()
            .unwrap()
            .push(street.to_string());
    }

    pub fn fail_delete_of(&self, id: &str) {
        self.fail_deletes.lock().unwrap().push(id.to_string());
    }

    pub fn find_count(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_poison(&self, document: &Document) -> StoreResult<()> {
        let Some(street) = document.get("street").and_then(Value::as_str) else {
            return Ok(());
        };
        let poisoned = self.poisoned_streets.lock().unwrap().iter().any(|p| p == street);
        if poisoned {
            return Err(StoreError::unavailable(format!("write rejected for '{street}'")));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InstrumentedStore {
    async fn get(&self, collection: Collection, id: &str) -> StoreResult<Option<Document>> {
        self.inner.get(collection, id).await
    }

    async fn find(&self, collection: Collection, filter: &Filter) -> StoreResult<Vec<Document>> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        self.inner.find(collection, filter).await
    }

    async fn insert(&self, collection: Collection, document: Document) -> StoreResult<String> {
        self.check_poison(&document)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(collection, document).await
    }

    async fn update(&self, collection: Collection, id: &str, patch: Document) -> StoreResult<()> {
        self.check_poison(&patch)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(collection, id, patch).await
    }

    async fn delete(&self, collection: Collection, id: &str) -> StoreResult<()> {
        if self.fail_deletes.lock().unwrap().iter().any(|f| f == id) {
            return Err(StoreError::unavailable(format!("delete of {id} timed out")));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(collection, id).await
    }
}
