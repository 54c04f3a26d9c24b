use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{assign_id, check_collection, matches, merge, Store, ID_KEY};
use crate::error::StoreError;
use crate::record::Dict;

/// In-process store; contents are lost when it is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Dict>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Dict>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn has_id(doc: &Dict, id: &str) -> bool {
    doc.get(ID_KEY).and_then(|v| v.as_str()) == Some(id)
}

impl Store for MemoryStore {
    fn insert(&self, collection: &str, mut doc: Dict) -> Result<String, StoreError> {
        check_collection(collection)?;
        let id = assign_id(&mut doc);
        self.lock()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
        Ok(id)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Dict>, StoreError> {
        check_collection(collection)?;
        Ok(self
            .lock()
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| has_id(d, id)).cloned()))
    }

    fn update(&self, collection: &str, id: &str, patch: Dict) -> Result<Dict, StoreError> {
        check_collection(collection)?;
        let mut collections = self.lock();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| has_id(d, id)))
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;
        merge(doc, patch);
        Ok(doc.clone())
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        check_collection(collection)?;
        let mut collections = self.lock();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|d| !has_id(d, id));
        Ok(docs.len() != before)
    }

    fn find(&self, collection: &str, filter: &Dict) -> Result<Vec<Dict>, StoreError> {
        check_collection(collection)?;
        Ok(self
            .lock()
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).cloned().collect())
            .unwrap_or_default())
    }
}
