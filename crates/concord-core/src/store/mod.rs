//! Document store backing concept state.
//!
//! Concepts keep their state in named collections of JSON documents. Every
//! document carries its id under [`ID_KEY`]. Two backends exist: an
//! in-process [`MemoryStore`] and a file-backed [`RedbStore`].

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use regex::Regex;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::record::Dict;

pub const ID_KEY: &str = "_id";

static COLLECTION_RE: OnceLock<Option<Regex>> = OnceLock::new();

pub(crate) fn check_collection(name: &str) -> Result<(), StoreError> {
    let valid = COLLECTION_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.\-]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

/// Assign a fresh id to `doc`, returning it.
pub(crate) fn assign_id(doc: &mut Dict) -> String {
    let id = Uuid::new_v4().to_string();
    doc.insert(ID_KEY.to_string(), id.clone().into());
    id
}

/// Shallow merge: top-level fields of `patch` overwrite those of `doc`.
/// The id is never overwritten.
pub(crate) fn merge(doc: &mut Dict, patch: Dict) {
    for (key, value) in patch {
        if key != ID_KEY {
            doc.insert(key, value);
        }
    }
}

/// Every top-level field of `filter` is present in `doc` with an equal value.
pub fn matches(doc: &Dict, filter: &Dict) -> bool {
    filter.iter().all(|(k, v)| doc.get(k) == Some(v))
}

/// Collections of JSON documents. Result order of `find` is unspecified.
pub trait Store: Send + Sync {
    /// Insert `doc` under a newly generated id and return the id.
    fn insert(&self, collection: &str, doc: Dict) -> Result<String, StoreError>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Dict>, StoreError>;

    /// Shallow-merge `patch` into the document and return the result.
    fn update(&self, collection: &str, id: &str, patch: Dict) -> Result<Dict, StoreError>;

    /// Returns whether a document was removed.
    fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    fn find(&self, collection: &str, filter: &Dict) -> Result<Vec<Dict>, StoreError>;

    fn find_one(&self, collection: &str, filter: &Dict) -> Result<Option<Dict>, StoreError> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }
}

/// Open the store described by `config`: redb when a path is set, memory otherwise.
pub fn open(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
    match &config.path {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening redb store");
            Ok(Arc::new(RedbStore::open(path)?))
        }
        None => Ok(Arc::new(MemoryStore::new())),
    }
}
