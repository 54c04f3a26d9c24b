//! Declarative sync rules.
//!
//! A rule is declared once, at startup, by a pure function that receives a
//! `Vars` placeholder factory and returns the rule's `when` patterns and
//! `then` invocations:
//!
//! ```
//! use concord_core::{shape, ActionRef, SyncRule, SyncSpec};
//!
//! const REQUEST: ActionRef = ActionRef::from_static("Requesting", "request");
//! const NEW_LIST: ActionRef = ActionRef::from_static("ListCreation", "newList");
//!
//! let rule = SyncRule::new("ListCreationNewListRequest", |v| {
//!     let [request, list_name] = v.vars(["request", "listName"]);
//!     SyncSpec::new()
//!         .when(
//!             REQUEST,
//!             shape! { "path" => "/ListCreation/newList", "listName" => &list_name },
//!             shape! { "request" => &request },
//!         )
//!         .then(NEW_LIST, shape! { "listName" => &list_name })
//! });
//! assert_eq!(rule.when().len(), 1);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::pattern::{Binding, Invocation, Pattern, Shape, Var};
use crate::record::ActionRef;

/// Placeholder factory passed to rule declarations.
#[derive(Debug, Default)]
pub struct Vars(());

impl Vars {
    pub fn var(&self, name: &str) -> Var {
        Var::new(name)
    }

    pub fn vars<const N: usize>(&self, names: [&str; N]) -> [Var; N] {
        names.map(Var::new)
    }
}

/// Pure predicate over a complete binding (the rule's `where`).
pub type Filter = Arc<dyn Fn(&Binding) -> bool + Send + Sync>;

/// The data a rule declaration produces.
#[derive(Clone, Default)]
pub struct SyncSpec {
    when: Vec<Pattern>,
    then: Vec<Invocation>,
    filter: Option<Filter>,
}

impl SyncSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when(mut self, action: ActionRef, input: Shape, output: Shape) -> Self {
        self.when.push(Pattern::new(action, input, output));
        self
    }

    pub fn then(mut self, action: ActionRef, args: Shape) -> Self {
        self.then.push(Invocation::new(action, args));
        self
    }

    pub fn filter(mut self, f: impl Fn(&Binding) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for SyncSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSpec")
            .field("when", &self.when)
            .field("then", &self.then)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// A named, registered sync.
#[derive(Debug, Clone)]
pub struct SyncRule {
    name: String,
    spec: SyncSpec,
}

impl SyncRule {
    pub fn new(name: impl Into<String>, declare: impl FnOnce(&Vars) -> SyncSpec) -> Self {
        Self {
            name: name.into(),
            spec: declare(&Vars::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn when(&self) -> &[Pattern] {
        &self.spec.when
    }

    pub fn then(&self) -> &[Invocation] {
        &self.spec.then
    }

    pub fn has_filter(&self) -> bool {
        self.spec.filter.is_some()
    }

    pub fn accepts(&self, binding: &Binding) -> bool {
        self.spec.filter.as_ref().is_none_or(|f| f(binding))
    }

    /// Every action reference the rule mentions, `when` first.
    pub fn references(&self) -> impl Iterator<Item = &ActionRef> {
        self.spec
            .when
            .iter()
            .map(|p| &p.action)
            .chain(self.spec.then.iter().map(|i| &i.action))
    }

    /// Variables bound by at least one `when` pattern.
    pub fn bound_vars(&self) -> BTreeSet<&str> {
        self.spec
            .when
            .iter()
            .flat_map(Pattern::vars)
            .map(Var::name)
            .collect()
    }

    /// Variables a `then` invocation needs that no `when` pattern binds.
    pub fn unbound_vars(&self) -> BTreeSet<String> {
        let bound = self.bound_vars();
        self.spec
            .then
            .iter()
            .flat_map(|i| i.args.vars())
            .map(Var::name)
            .filter(|name| !bound.contains(name))
            .map(str::to_string)
            .collect()
    }
}
