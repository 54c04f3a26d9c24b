use concord_core::requesting::REQUEST;
use concord_core::{shape, ActionRef, SyncRule, SyncSpec};

use super::route;
use crate::list_creation::CONCEPT;
use crate::notifying;

pub const NEW_LIST: ActionRef = ActionRef::from_static(CONCEPT, "newList");
pub const DELETE_LIST: ActionRef = ActionRef::from_static(CONCEPT, "deleteList");
pub const ADD_ITEM: ActionRef = ActionRef::from_static(CONCEPT, "addItem");
pub const REMOVE_ITEM: ActionRef = ActionRef::from_static(CONCEPT, "removeItem");
pub const GET_LISTS: ActionRef = ActionRef::from_static(CONCEPT, "_getLists");
pub const GET_LIST: ActionRef = ActionRef::from_static(CONCEPT, "_getList");

pub fn syncs() -> Vec<SyncRule> {
    let mut syncs = Vec::new();
    syncs.extend(route(NEW_LIST, &["listName"], &["list"]));
    syncs.extend(route(DELETE_LIST, &["list"], &["list"]));
    syncs.extend(route(ADD_ITEM, &["list", "item"], &["list", "item"]));
    syncs.extend(route(REMOVE_ITEM, &["list", "item"], &["list", "item"]));
    syncs.extend(route(GET_LISTS, &[], &["lists"]));
    syncs.extend(route(GET_LIST, &["list"], &["list", "listName", "items"]));
    syncs.push(notify_owner_on_new_list());
    syncs
}

/// A `newList` request carrying an `owner` notifies that owner once the
/// list exists.
pub fn notify_owner_on_new_list() -> SyncRule {
    SyncRule::new("NotifyOwnerOnNewList", |v| {
        let [owner, list_name, list] = v.vars(["owner", "listName", "list"]);
        SyncSpec::new()
            .when(
                REQUEST,
                shape! { "path" => "/ListCreation/newList", "owner" => &owner },
                shape! {},
            )
            .when(
                NEW_LIST,
                shape! { "listName" => &list_name },
                shape! { "list" => &list },
            )
            .then(
                notifying::NOTIFY,
                shape! {
                    "recipient" => &owner,
                    "topic" => "list_created",
                    "list" => &list,
                    "listName" => &list_name,
                },
            )
    })
}
