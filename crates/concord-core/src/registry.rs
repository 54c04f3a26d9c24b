//! Action registry: `(concept, action)` -> callable.
//!
//! Concepts declare their action set statically through
//! [`Concept::interface`]; registration stores one handle per declared
//! action. Registering a concept name again replaces every handle of the
//! earlier registration.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use crate::error::{ConceptError, RegistryError};
use crate::record::{error_output, ActionRef, Dict, QUERY_PREFIX};

// ---------------------------------------------------------------------------
// Interface declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Action,
    Query,
}

/// Static signature of one concept action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActionSpec {
    pub name: &'static str,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
}

impl ActionSpec {
    pub const fn new(
        name: &'static str,
        inputs: &'static [&'static str],
        outputs: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            inputs,
            outputs,
        }
    }

    pub fn kind(&self) -> ActionKind {
        if self.name.starts_with(QUERY_PREFIX) {
            ActionKind::Query
        } else {
            ActionKind::Action
        }
    }
}

/// A concept: an independent module exposing named actions over its own state.
#[async_trait]
pub trait Concept: Send + Sync + 'static {
    /// Every action and query this concept exposes.
    fn interface(&self) -> &'static [ActionSpec];

    /// Perform `action` with one argument dict, returning one result dict.
    ///
    /// Failures may be returned either as `Err` or as an `{ "error": .. }`
    /// result; the engine records both the same way.
    async fn perform(&self, action: &str, input: Dict) -> Result<Dict, ConceptError>;
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// A resolved, invocable action.
#[derive(Clone)]
pub struct ActionHandle {
    action: ActionRef,
    spec: ActionSpec,
    concept: Arc<dyn Concept>,
}

impl ActionHandle {
    pub fn action(&self) -> &ActionRef {
        &self.action
    }

    pub fn spec(&self) -> &ActionSpec {
        &self.spec
    }

    /// Invoke the action. Concept errors are folded into an `error` output.
    pub async fn call(&self, input: Dict) -> Dict {
        match self.concept.perform(&self.action.action, input).await {
            Ok(output) => output,
            Err(e) => error_output(e.to_string()),
        }
    }
}

impl std::fmt::Debug for ActionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionHandle")
            .field("action", &self.action)
            .field("spec", &self.spec)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

static NAME_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Identifier check for concept and action names. A pattern that failed to
/// compile accepts nothing.
fn valid_name(name: &str) -> bool {
    NAME_RE
        .get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(name))
}

/// Registered interface of one concept, for listing.
#[derive(Debug, Clone, Serialize)]
pub struct ConceptSummary {
    pub concept: String,
    pub actions: Vec<ActionSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionSummary {
    pub name: &'static str,
    pub kind: ActionKind,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
}

#[derive(Default)]
pub struct ActionRegistry {
    concepts: BTreeMap<String, Arc<dyn Concept>>,
    actions: HashMap<ActionRef, ActionHandle>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `instance` under `concept`, replacing any earlier
    /// registration of the same name. Returns the number of actions stored.
    pub fn register(
        &mut self,
        concept: &str,
        instance: Arc<dyn Concept>,
    ) -> Result<usize, RegistryError> {
        if !valid_name(concept) {
            return Err(RegistryError::InvalidConceptName(concept.to_string()));
        }

        let mut seen = HashSet::new();
        for spec in instance.interface() {
            if !valid_name(spec.name) {
                return Err(RegistryError::InvalidActionName {
                    concept: concept.to_string(),
                    action: spec.name.to_string(),
                });
            }
            if !seen.insert(spec.name) {
                return Err(RegistryError::DuplicateAction {
                    concept: concept.to_string(),
                    action: spec.name.to_string(),
                });
            }
        }

        self.actions.retain(|key, _| key.concept != concept);
        for spec in instance.interface() {
            let action = ActionRef::new(concept, spec.name);
            self.actions.insert(
                action.clone(),
                ActionHandle {
                    action,
                    spec: *spec,
                    concept: Arc::clone(&instance),
                },
            );
        }
        self.concepts.insert(concept.to_string(), instance);
        Ok(seen.len())
    }

    pub fn resolve(&self, action: &ActionRef) -> Result<ActionHandle, RegistryError> {
        self.actions
            .get(action)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(action.clone()))
    }

    pub fn contains(&self, action: &ActionRef) -> bool {
        self.actions.contains_key(action)
    }

    pub fn concept_names(&self) -> impl Iterator<Item = &str> {
        self.concepts.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Interfaces of every registered concept, sorted by concept name.
    pub fn summaries(&self) -> Vec<ConceptSummary> {
        self.concepts
            .iter()
            .map(|(name, concept)| ConceptSummary {
                concept: name.clone(),
                actions: concept
                    .interface()
                    .iter()
                    .map(|spec| ActionSummary {
                        name: spec.name,
                        kind: spec.kind(),
                        inputs: spec.inputs,
                        outputs: spec.outputs,
                    })
                    .collect(),
            })
            .collect()
    }
}
