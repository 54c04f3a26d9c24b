//! Sync definitions wiring the concepts to the Requesting boundary.
//!
//! Each HTTP-exposed action gets three syncs: `<Concept><Action>Request`
//! turns a `Requesting.request` on the action's path into the action,
//! `<Concept><Action>Response` answers with its success output, and
//! `<Concept><Action>ErrorResponse` answers with its `error`.

pub mod list_creation;
pub mod notifying;

use concord_core::pattern::Shape;
use concord_core::requesting::{REQUEST, REQUEST_KEY, RESPOND};
use concord_core::{shape, ActionRef, SyncRule, SyncSpec};

/// Every sync of the application, in installation order.
pub fn all() -> Vec<SyncRule> {
    let mut syncs = list_creation::syncs();
    syncs.extend(notifying::syncs());
    syncs
}

/// `_getLists` -> `GetLists`, `newList` -> `NewList`.
fn pascal(action: &str) -> String {
    let trimmed = action.trim_start_matches('_');
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Request / Response / ErrorResponse syncs exposing `action` at its path.
///
/// `inputs` are copied from the request into the action and must all be
/// present for the request to be handled; `outputs` are copied from the
/// action's result into the response.
pub fn route(action: ActionRef, inputs: &[&str], outputs: &[&str]) -> [SyncRule; 3] {
    let base = format!("{}{}", action.concept, pascal(&action.action));
    let path = action.path();

    let request = SyncRule::new(format!("{base}Request"), |v| {
        let mut input = shape! { "path" => path.as_str() };
        let mut args = Shape::new();
        for name in inputs {
            let x = v.var(name);
            input = input.with(*name, &x);
            args = args.with(*name, &x);
        }
        SyncSpec::new()
            .when(REQUEST, input, shape! {})
            .then(action.clone(), args)
    });

    let response = SyncRule::new(format!("{base}Response"), |v| {
        let request = v.var(REQUEST_KEY);
        let mut output = Shape::new();
        let mut args = shape! { "request" => &request };
        for name in outputs {
            let x = v.var(name);
            output = output.with(*name, &x);
            args = args.with(*name, &x);
        }
        SyncSpec::new()
            .when(
                REQUEST,
                shape! { "path" => path.as_str() },
                shape! { "request" => &request },
            )
            .when(action.clone(), Shape::new(), output)
            .then(RESPOND, args)
    });

    let error_response = SyncRule::new(format!("{base}ErrorResponse"), |v| {
        let [request, error] = v.vars([REQUEST_KEY, "error"]);
        SyncSpec::new()
            .when(
                REQUEST,
                shape! { "path" => path.as_str() },
                shape! { "request" => &request },
            )
            .when(action.clone(), Shape::new(), shape! { "error" => &error })
            .then(RESPOND, shape! { "request" => &request, "error" => &error })
    });

    [request, response, error_response]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_names_follow_concept_and_action() {
        let names: Vec<String> = route(
            ActionRef::from_static("ListCreation", "_getLists"),
            &[],
            &["lists"],
        )
        .iter()
        .map(|r| r.name().to_string())
        .collect();
        assert_eq!(
            names,
            [
                "ListCreationGetListsRequest",
                "ListCreationGetListsResponse",
                "ListCreationGetListsErrorResponse"
            ]
        );
    }

    #[test]
    fn route_syncs_bind_everything_they_use() {
        for rule in all() {
            assert!(rule.unbound_vars().is_empty(), "{} has unbound vars", rule.name());
        }
    }

    #[test]
    fn sync_names_are_unique() {
        let mut names: Vec<String> = all().iter().map(|r| r.name().to_string()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
