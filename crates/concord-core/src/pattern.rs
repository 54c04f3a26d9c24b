//! Patterns, terms and bindings.
//!
//! A `Shape` is a partial map from field name to `Term`. A literal term
//! requires equality, a variable term binds (or must agree with an earlier
//! binding of) the field's value, and fields the shape does not mention are
//! unconstrained.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::record::{ActionRecord, ActionRef, Dict, ERROR_KEY};

// ---------------------------------------------------------------------------
// Var / Term
// ---------------------------------------------------------------------------

/// A named placeholder handed out by `Vars::var`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Var(Var),
    Lit(Value),
}

impl From<Var> for Term {
    fn from(v: Var) -> Self {
        Term::Var(v)
    }
}

impl From<&Var> for Term {
    fn from(v: &Var) -> Self {
        Term::Var(v.clone())
    }
}

impl From<Value> for Term {
    fn from(v: Value) -> Self {
        Term::Lit(v)
    }
}

impl From<&str> for Term {
    fn from(s: &str) -> Self {
        Term::Lit(Value::String(s.to_string()))
    }
}

impl From<String> for Term {
    fn from(s: String) -> Self {
        Term::Lit(Value::String(s))
    }
}

impl From<bool> for Term {
    fn from(b: bool) -> Self {
        Term::Lit(Value::Bool(b))
    }
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Lit(Value::from(n))
    }
}

impl From<u64> for Term {
    fn from(n: u64) -> Self {
        Term::Lit(Value::from(n))
    }
}

impl From<i32> for Term {
    fn from(n: i32) -> Self {
        Term::Lit(Value::from(n))
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Variable name -> concrete value, built up while matching one rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Binding(BTreeMap<String, Value>);

impl Binding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Stable textual form; two equal bindings always render identically.
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Shape
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape(BTreeMap<String, Term>);

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, term: impl Into<Term>) -> Self {
        self.0.insert(key.into(), term.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Term> {
        self.0.get(key)
    }

    pub fn mentions(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.0.iter().map(|(k, t)| (k.as_str(), t))
    }

    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        self.0.values().filter_map(|t| match t {
            Term::Var(v) => Some(v),
            Term::Lit(_) => None,
        })
    }

    /// Unify `fields` against this shape, extending `binding` in place.
    /// On `false` the binding may be partially extended and must be dropped.
    fn unify(&self, fields: &Dict, binding: &mut Binding) -> bool {
        for (key, term) in &self.0 {
            let Some(actual) = fields.get(key) else {
                return false;
            };
            match term {
                Term::Lit(expected) => {
                    if actual != expected {
                        return false;
                    }
                }
                Term::Var(var) => match binding.get(var.name()) {
                    Some(bound) if bound != actual => return false,
                    Some(_) => {}
                    None => binding.insert(var.name(), actual.clone()),
                },
            }
        }
        true
    }

    /// Substitute bound variables, producing a concrete argument dict.
    pub fn resolve(&self, binding: &Binding) -> Result<Dict, UnboundVariable> {
        let mut out = Dict::new();
        for (key, term) in &self.0 {
            let value = match term {
                Term::Lit(v) => v.clone(),
                Term::Var(var) => binding
                    .get(var.name())
                    .cloned()
                    .ok_or_else(|| UnboundVariable(var.name().to_string()))?,
            };
            out.insert(key.clone(), value);
        }
        Ok(out)
    }
}

/// Build a `Shape` from `"field" => term` pairs.
///
/// ```
/// use concord_core::{shape, Var};
/// let list = Var::new("list");
/// let s = shape! { "path" => "/ListCreation/newList", "list" => &list };
/// assert!(s.mentions("path"));
/// ```
#[macro_export]
macro_rules! shape {
    () => {
        $crate::pattern::Shape::new()
    };
    ($($key:literal => $term:expr),+ $(,)?) => {{
        let shape = $crate::pattern::Shape::new();
        $( let shape = shape.with($key, $term); )+
        shape
    }};
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("variable '{0}' is not bound")]
pub struct UnboundVariable(pub String);

// ---------------------------------------------------------------------------
// Pattern / Invocation
// ---------------------------------------------------------------------------

/// One `when` clause: an action reference plus input and output shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub action: ActionRef,
    pub input: Shape,
    pub output: Shape,
}

impl Pattern {
    pub fn new(action: ActionRef, input: Shape, output: Shape) -> Self {
        Self {
            action,
            input,
            output,
        }
    }

    /// Does this pattern apply to records of `action` at all?
    pub fn targets(&self, action: &ActionRef) -> bool {
        &self.action == action
    }

    /// Try to match `record` under `binding`, returning the extended binding.
    ///
    /// An error record only matches a pattern whose output shape mentions
    /// the `error` field.
    pub fn unify(&self, record: &ActionRecord, binding: &Binding) -> Option<Binding> {
        if !self.targets(&record.action) {
            return None;
        }
        if record.is_error() && !self.output.mentions(ERROR_KEY) {
            return None;
        }
        let mut next = binding.clone();
        if self.input.unify(&record.input, &mut next) && self.output.unify(&record.output, &mut next)
        {
            Some(next)
        } else {
            None
        }
    }

    pub fn vars(&self) -> impl Iterator<Item = &Var> {
        self.input.vars().chain(self.output.vars())
    }
}

/// One `then` entry: the action to dispatch and its argument shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub action: ActionRef,
    pub args: Shape,
}

impl Invocation {
    pub fn new(action: ActionRef, args: Shape) -> Self {
        Self { action, args }
    }

    pub fn resolve(&self, binding: &Binding) -> Result<Dict, UnboundVariable> {
        self.args.resolve(binding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{dict, error_output, BurstId};
    use chrono::Utc;
    use serde_json::json;

    const NEW_LIST: ActionRef = ActionRef::from_static("ListCreation", "newList");

    fn record(action: ActionRef, input: Value, output: Dict) -> ActionRecord {
        ActionRecord {
            seq: 1,
            burst: BurstId::new(),
            depth: 0,
            action,
            input: dict(input),
            output,
            synced_by: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn literal_fields_require_equality() {
        let p = Pattern::new(NEW_LIST, shape! { "listName" => "Groceries" }, shape! {});
        let hit = record(NEW_LIST, json!({ "listName": "Groceries" }), Dict::new());
        let miss = record(NEW_LIST, json!({ "listName": "Chores" }), Dict::new());
        assert!(p.unify(&hit, &Binding::new()).is_some());
        assert!(p.unify(&miss, &Binding::new()).is_none());
    }

    #[test]
    fn variables_bind_and_must_agree() {
        let name = Var::new("name");
        let p = Pattern::new(NEW_LIST, shape! { "listName" => &name }, shape! {});
        let r = record(NEW_LIST, json!({ "listName": "Groceries" }), Dict::new());

        let b = p.unify(&r, &Binding::new()).unwrap();
        assert_eq!(b.get("name"), Some(&json!("Groceries")));

        let mut conflicting = Binding::new();
        conflicting.insert("name", json!("Chores"));
        assert!(p.unify(&r, &conflicting).is_none());
    }

    #[test]
    fn missing_field_does_not_match_variable() {
        let list = Var::new("list");
        let p = Pattern::new(NEW_LIST, shape! {}, shape! { "list" => &list });
        let r = record(NEW_LIST, json!({}), dict(json!({ "other": 1 })));
        assert!(p.unify(&r, &Binding::new()).is_none());
    }

    #[test]
    fn unmentioned_fields_are_wildcards() {
        let p = Pattern::new(NEW_LIST, shape! {}, shape! {});
        let r = record(NEW_LIST, json!({ "listName": "x", "extra": true }), Dict::new());
        assert!(p.unify(&r, &Binding::new()).is_some());
    }

    #[test]
    fn error_records_only_match_error_patterns() {
        let err = Var::new("error");
        let success = Pattern::new(NEW_LIST, shape! {}, shape! {});
        let failure = Pattern::new(NEW_LIST, shape! {}, shape! { "error" => &err });
        let r = record(NEW_LIST, json!({}), error_output("exists"));

        assert!(success.unify(&r, &Binding::new()).is_none());
        let b = failure.unify(&r, &Binding::new()).unwrap();
        assert_eq!(b.get("error"), Some(&json!("exists")));
    }

    #[test]
    fn wrong_action_never_matches() {
        let p = Pattern::new(NEW_LIST, shape! {}, shape! {});
        let r = record(
            ActionRef::from_static("ListCreation", "deleteList"),
            json!({}),
            Dict::new(),
        );
        assert!(p.unify(&r, &Binding::new()).is_none());
    }

    #[test]
    fn resolve_substitutes_bound_variables() {
        let list = Var::new("list");
        let inv = Invocation::new(NEW_LIST, shape! { "list" => &list, "source" => "sync" });
        let mut b = Binding::new();
        b.insert("list", json!("abc123"));
        let args = inv.resolve(&b).unwrap();
        assert_eq!(args["list"], "abc123");
        assert_eq!(args["source"], "sync");
    }

    #[test]
    fn resolve_reports_unbound_variable() {
        let list = Var::new("list");
        let inv = Invocation::new(NEW_LIST, shape! { "list" => &list });
        assert_eq!(
            inv.resolve(&Binding::new()),
            Err(UnboundVariable("list".into()))
        );
    }

    #[test]
    fn canonical_binding_is_order_independent() {
        let mut a = Binding::new();
        a.insert("x", json!(1));
        a.insert("y", json!(2));
        let mut b = Binding::new();
        b.insert("y", json!(2));
        b.insert("x", json!(1));
        assert_eq!(a.canonical(), b.canonical());
    }
}
