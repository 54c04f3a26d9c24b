//! ListCreation: named lists of items.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use concord_core::store::ID_KEY;
use concord_core::{dict, error_output, ActionSpec, Concept, ConceptError, Dict, Store};

use crate::args;

pub const CONCEPT: &str = "ListCreation";
const LISTS: &str = "ListCreation.lists";

const INTERFACE: &[ActionSpec] = &[
    ActionSpec::new("newList", &["listName", "owner"], &["list"]),
    ActionSpec::new("deleteList", &["list"], &["list"]),
    ActionSpec::new("addItem", &["list", "item"], &["list", "item"]),
    ActionSpec::new("removeItem", &["list", "item"], &["list", "item"]),
    ActionSpec::new("_getLists", &["owner"], &["lists"]),
    ActionSpec::new("_getList", &["list"], &["list", "listName", "owner", "items"]),
];

pub struct ListCreation {
    store: Arc<dyn Store>,
    /// Serializes check-then-write sequences across concurrent bursts.
    writes: Mutex<()>,
}

/// Public form of a stored list.
fn view(doc: &Dict) -> Value {
    json!({
        "list": doc.get(ID_KEY).cloned().unwrap_or(Value::Null),
        "listName": doc.get("listName").cloned().unwrap_or(Value::Null),
        "owner": doc.get("owner").cloned().unwrap_or(Value::Null),
        "items": doc.get("items").cloned().unwrap_or_else(|| json!([])),
    })
}

fn items(doc: &Dict) -> Vec<Value> {
    doc.get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn not_found(list: &str) -> Dict {
    error_output(format!("List '{list}' not found."))
}

impl ListCreation {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            writes: Mutex::new(()),
        }
    }

    fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn new_list(&self, input: &Dict) -> Result<Dict, ConceptError> {
        let list_name = args::name(input, "listName")?;
        let owner = args::optional_string(input, "owner")?;

        let _write = self.write_lock();
        let existing = self
            .store
            .find_one(LISTS, &dict(json!({ "listName": list_name })))?;
        if existing.is_some() {
            return Ok(error_output(format!(
                "List with name '{list_name}' already exists."
            )));
        }

        let id = self.store.insert(
            LISTS,
            dict(json!({
                "listName": list_name,
                "owner": owner,
                "items": [],
                "createdAt": Utc::now().to_rfc3339(),
            })),
        )?;
        tracing::debug!(list = %id, list_name, "list created");
        Ok(dict(json!({ "list": id })))
    }

    fn delete_list(&self, input: &Dict) -> Result<Dict, ConceptError> {
        let list = args::string(input, "list")?;
        if !self.store.delete(LISTS, list)? {
            return Ok(not_found(list));
        }
        Ok(dict(json!({ "list": list })))
    }

    fn add_item(&self, input: &Dict) -> Result<Dict, ConceptError> {
        let list = args::string(input, "list")?;
        let item = args::name(input, "item")?;
        let _write = self.write_lock();
        let Some(doc) = self.store.get(LISTS, list)? else {
            return Ok(not_found(list));
        };

        let mut items = items(&doc);
        if items.iter().any(|i| i.as_str() == Some(item)) {
            return Ok(error_output(format!("Item '{item}' is already on the list.")));
        }
        items.push(Value::String(item.to_string()));
        self.store
            .update(LISTS, list, dict(json!({ "items": items })))?;
        Ok(dict(json!({ "list": list, "item": item })))
    }

    fn remove_item(&self, input: &Dict) -> Result<Dict, ConceptError> {
        let list = args::string(input, "list")?;
        let item = args::string(input, "item")?;
        let _write = self.write_lock();
        let Some(doc) = self.store.get(LISTS, list)? else {
            return Ok(not_found(list));
        };

        let mut items = items(&doc);
        let before = items.len();
        items.retain(|i| i.as_str() != Some(item));
        if items.len() == before {
            return Ok(error_output(format!("Item '{item}' is not on the list.")));
        }
        self.store
            .update(LISTS, list, dict(json!({ "items": items })))?;
        Ok(dict(json!({ "list": list, "item": item })))
    }

    fn get_lists(&self, input: &Dict) -> Result<Dict, ConceptError> {
        let filter = match args::optional_string(input, "owner")? {
            Some(owner) => dict(json!({ "owner": owner })),
            None => Dict::new(),
        };
        let mut docs = self.store.find(LISTS, &filter)?;
        docs.sort_by(|a, b| {
            let name = |d: &Dict| d.get("listName").and_then(Value::as_str).map(str::to_string);
            name(a).cmp(&name(b))
        });
        let lists: Vec<Value> = docs.iter().map(view).collect();
        Ok(dict(json!({ "lists": lists })))
    }

    fn get_list(&self, input: &Dict) -> Result<Dict, ConceptError> {
        let list = args::string(input, "list")?;
        match self.store.get(LISTS, list)? {
            Some(doc) => Ok(dict(view(&doc))),
            None => Ok(not_found(list)),
        }
    }
}

#[async_trait]
impl Concept for ListCreation {
    fn interface(&self) -> &'static [ActionSpec] {
        INTERFACE
    }

    async fn perform(&self, action: &str, input: Dict) -> Result<Dict, ConceptError> {
        match action {
            "newList" => self.new_list(&input),
            "deleteList" => self.delete_list(&input),
            "addItem" => self.add_item(&input),
            "removeItem" => self.remove_item(&input),
            "_getLists" => self.get_lists(&input),
            "_getList" => self.get_list(&input),
            other => Err(ConceptError::UnknownAction(other.to_string())),
        }
    }
}
