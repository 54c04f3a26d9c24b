//! redb-backed document store.
//!
//! One table per collection, keyed by document id, with JSON-encoded
//! documents as values. Reading a collection that was never written yields
//! nothing rather than an error.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition, TableError};

use super::{assign_id, check_collection, matches, merge, Store};
use crate::error::StoreError;
use crate::record::Dict;

fn table(collection: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(collection)
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(backend)?;
            }
        }
        let db = Database::create(path).map_err(backend)?;
        Ok(Self { db })
    }

    fn write(&self, collection: &str, id: &str, doc: &Dict) -> Result<(), StoreError> {
        let value = serde_json::to_vec(doc)?;
        let wt = self.db.begin_write().map_err(backend)?;
        {
            let mut t = wt.open_table(table(collection)).map_err(backend)?;
            t.insert(id, value.as_slice()).map_err(backend)?;
        }
        wt.commit().map_err(backend)?;
        Ok(())
    }
}

impl Store for RedbStore {
    fn insert(&self, collection: &str, mut doc: Dict) -> Result<String, StoreError> {
        check_collection(collection)?;
        let id = assign_id(&mut doc);
        self.write(collection, &id, &doc)?;
        Ok(id)
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Dict>, StoreError> {
        check_collection(collection)?;
        let rt = self.db.begin_read().map_err(backend)?;
        let t = match rt.open_table(table(collection)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(backend(e)),
        };
        let found = t.get(id).map_err(backend)?;
        match found {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    fn update(&self, collection: &str, id: &str, patch: Dict) -> Result<Dict, StoreError> {
        check_collection(collection)?;
        let not_found = || StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        };

        let wt = self.db.begin_write().map_err(backend)?;
        let doc = {
            let mut t = wt.open_table(table(collection)).map_err(backend)?;
            let existing: Option<Dict> = match t.get(id).map_err(backend)? {
                Some(v) => Some(serde_json::from_slice(v.value())?),
                None => None,
            };
            let mut doc = existing.ok_or_else(not_found)?;
            merge(&mut doc, patch);
            let value = serde_json::to_vec(&doc)?;
            t.insert(id, value.as_slice()).map_err(backend)?;
            doc
        };
        wt.commit().map_err(backend)?;
        Ok(doc)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        check_collection(collection)?;
        let wt = self.db.begin_write().map_err(backend)?;
        let removed = {
            let mut t = wt.open_table(table(collection)).map_err(backend)?;
            let removed = t.remove(id).map_err(backend)?.is_some();
            removed
        };
        wt.commit().map_err(backend)?;
        Ok(removed)
    }

    fn find(&self, collection: &str, filter: &Dict) -> Result<Vec<Dict>, StoreError> {
        check_collection(collection)?;
        let rt = self.db.begin_read().map_err(backend)?;
        let t = match rt.open_table(table(collection)) {
            Ok(t) => t,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(backend(e)),
        };

        let mut out = Vec::new();
        for entry in t.iter().map_err(backend)? {
            let (_, v) = entry.map_err(backend)?;
            let doc: Dict = serde_json::from_slice(v.value())?;
            if matches(&doc, filter) {
                out.push(doc);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::dict;
    use crate::store::ID_KEY;
    use serde_json::json;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RedbStore {
        RedbStore::open(&dir.path().join("state/concord.redb")).unwrap()
    }

    #[test]
    fn unknown_collection_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.get("lists", "x").unwrap().is_none());
        assert!(store.find("lists", &Dict::new()).unwrap().is_empty());
    }

    #[test]
    fn insert_update_delete() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let id = store
            .insert("lists", dict(json!({ "name": "Groceries", "items": [] })))
            .unwrap();
        let doc = store
            .update("lists", &id, dict(json!({ "items": ["eggs"] })))
            .unwrap();
        assert_eq!(doc["name"], "Groceries");
        assert_eq!(doc[ID_KEY], id.as_str());

        let found = store
            .find("lists", &dict(json!({ "name": "Groceries" })))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["items"], json!(["eggs"]));

        assert!(store.delete("lists", &id).unwrap());
        assert!(store.get("lists", &id).unwrap().is_none());
        assert!(matches!(
            store.update("lists", &id, Dict::new()),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn documents_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = open(&dir);
            store.insert("lists", dict(json!({ "name": "Chores" }))).unwrap()
        };
        let store = open(&dir);
        let doc = store.get("lists", &id).unwrap().unwrap();
        assert_eq!(doc["name"], "Chores");
    }
}
