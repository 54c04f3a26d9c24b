//! Notifying: per-recipient notification inbox.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use concord_core::store::ID_KEY;
use concord_core::{
    dict, error_output, ActionRef, ActionSpec, Concept, ConceptError, Dict, Store,
};

use crate::args;

pub const CONCEPT: &str = "Notifying";
const NOTIFICATIONS: &str = "Notifying.notifications";

pub const NOTIFY: ActionRef = ActionRef::from_static(CONCEPT, "notify");
pub const MARK_READ: ActionRef = ActionRef::from_static(CONCEPT, "markRead");
pub const GET_NOTIFICATIONS: ActionRef = ActionRef::from_static(CONCEPT, "_getNotifications");

const INTERFACE: &[ActionSpec] = &[
    ActionSpec::new("notify", &["recipient", "topic"], &["notification"]),
    ActionSpec::new("markRead", &["notification"], &["notification"]),
    ActionSpec::new("_getNotifications", &["recipient"], &["notifications"]),
];

pub struct Notifying {
    store: Arc<dyn Store>,
}

impl Notifying {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Stores every input field; `recipient` and `topic` are required.
    fn notify(&self, input: Dict) -> Result<Dict, ConceptError> {
        args::name(&input, "recipient")?;
        args::name(&input, "topic")?;

        let mut doc = input;
        doc.insert("read".to_string(), Value::Bool(false));
        doc.insert("createdAt".to_string(), Value::String(Utc::now().to_rfc3339()));
        let id = self.store.insert(NOTIFICATIONS, doc)?;
        Ok(dict(json!({ "notification": id })))
    }

    fn mark_read(&self, input: &Dict) -> Result<Dict, ConceptError> {
        let id = args::string(input, "notification")?;
        if self.store.get(NOTIFICATIONS, id)?.is_none() {
            return Ok(error_output(format!("Notification '{id}' not found.")));
        }
        self.store
            .update(NOTIFICATIONS, id, dict(json!({ "read": true })))?;
        Ok(dict(json!({ "notification": id })))
    }

    fn get_notifications(&self, input: &Dict) -> Result<Dict, ConceptError> {
        let recipient = args::string(input, "recipient")?;
        let mut docs = self
            .store
            .find(NOTIFICATIONS, &dict(json!({ "recipient": recipient })))?;
        let key = |d: &Dict| {
            (
                d.get("createdAt").and_then(Value::as_str).map(str::to_string),
                d.get(ID_KEY).and_then(Value::as_str).map(str::to_string),
            )
        };
        docs.sort_by_key(key);

        let notifications: Vec<Value> = docs
            .into_iter()
            .map(|mut d| {
                if let Some(id) = d.remove(ID_KEY) {
                    d.insert("notification".to_string(), id);
                }
                Value::Object(d)
            })
            .collect();
        Ok(dict(json!({ "notifications": notifications })))
    }
}

#[async_trait]
impl Concept for Notifying {
    fn interface(&self) -> &'static [ActionSpec] {
        INTERFACE
    }

    async fn perform(&self, action: &str, input: Dict) -> Result<Dict, ConceptError> {
        match action {
            "notify" => self.notify(input),
            "markRead" => self.mark_read(&input),
            "_getNotifications" => self.get_notifications(&input),
            other => Err(ConceptError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_core::store::MemoryStore;

    #[tokio::test]
    async fn notify_then_read_inbox() {
        let n = Notifying::new(Arc::new(MemoryStore::new()));
        let out = n
            .perform(
                "notify",
                dict(json!({ "recipient": "ann", "topic": "list_created", "list": "l1" })),
            )
            .await
            .unwrap();
        let id = out["notification"].as_str().unwrap().to_string();

        n.perform("markRead", dict(json!({ "notification": id })))
            .await
            .unwrap();

        let inbox = n
            .perform("_getNotifications", dict(json!({ "recipient": "ann" })))
            .await
            .unwrap();
        let items = inbox["notifications"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["notification"], id.as_str());
        assert_eq!(items[0]["list"], "l1");
        assert_eq!(items[0]["read"], true);

        let other = n
            .perform("_getNotifications", dict(json!({ "recipient": "bob" })))
            .await
            .unwrap();
        assert!(other["notifications"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn notify_requires_recipient_and_topic() {
        let n = Notifying::new(Arc::new(MemoryStore::new()));
        let err = n
            .perform("notify", dict(json!({ "topic": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, ConceptError::MissingArgument(ref f) if f == "recipient"));

        let out = n
            .perform("markRead", dict(json!({ "notification": "ghost" })))
            .await
            .unwrap();
        assert!(out.contains_key("error"));
    }
}
