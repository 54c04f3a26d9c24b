//! The sync engine: evaluates rules after every appended record and
//! dispatches the `then` actions of every rule that fires.
//!
//! # Burst lifecycle
//!
//! ```text
//! Idle ──stimulus──▶ Evaluating ──rule fires──▶ Dispatching
//!                      ▲                            │
//!                      └──── record appended ◀──────┘
//!                      │
//!                      └──nothing left to dispatch──▶ Quiescent
//! ```
//!
//! Dispatch is depth-first: the consequences of a dispatched action run
//! before the next `then` entry of the rule that dispatched it. Records are
//! appended to the log strictly in dispatch order, and each one is evaluated
//! immediately after its append, so a rule always observes every record its
//! causal predecessors produced.
//!
//! Concept actions run outside every engine lock; only the append and the
//! (synchronous) matching step hold the log lock.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};

use crate::config::EngineConfig;
use crate::error::{EngineError, RegistryError};
use crate::log::{ActionLog, NewRecord};
use crate::matcher::find_anchored;
use crate::pattern::Binding;
use crate::record::{ActionRecord, ActionRef, BurstId, Dict};
use crate::registry::{ActionHandle, ActionRegistry, Concept, ConceptSummary};
use crate::sync::SyncRule;

// ---------------------------------------------------------------------------
// Burst types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstState {
    Idle,
    Evaluating,
    Dispatching,
    Quiescent,
    Failed,
}

/// One rule firing inside a burst.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Firing {
    pub sync: String,
    /// Sequence number of the record whose append caused the firing.
    pub trigger: u64,
    /// Records chosen for the rule's patterns, in pattern order.
    pub records: Vec<u64>,
    pub binding: Binding,
}

/// Everything one stimulus caused.
#[derive(Debug, Clone)]
pub struct BurstReport {
    pub id: BurstId,
    pub root: Arc<ActionRecord>,
    /// All records of the burst in append order, `root` first.
    pub records: Vec<Arc<ActionRecord>>,
    pub firings: Vec<Firing>,
    pub state: BurstState,
    pub failure: Option<EngineError>,
}

impl BurstReport {
    pub fn records_of(
        &self,
        action: &ActionRef,
    ) -> impl Iterator<Item = &Arc<ActionRecord>> + '_ {
        let action = action.clone();
        self.records.iter().filter(move |r| r.action == action)
    }

    pub fn fired(&self, sync: &str) -> usize {
        self.firings.iter().filter(|f| f.sync == sync).count()
    }

    pub fn into_result(self) -> Result<Self, EngineError> {
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// A burst whose root action has run and been recorded, but whose rules
/// have not been evaluated yet.
pub struct StartedBurst {
    engine: Arc<Engine>,
    burst: Burst,
    root: Arc<ActionRecord>,
}

impl StartedBurst {
    pub fn id(&self) -> BurstId {
        self.burst.id
    }

    pub fn root(&self) -> &Arc<ActionRecord> {
        &self.root
    }

    /// Evaluate and dispatch until the burst is quiescent or fails.
    pub async fn run(self) -> BurstReport {
        let StartedBurst {
            engine,
            burst,
            root,
        } = self;
        engine.settle(burst, root).await
    }
}

/// `(sync, binding)` pairs along one causal chain. Seeing a pair again on
/// the same chain means the chain would repeat forever.
struct Lineage {
    key: String,
    parent: Option<Arc<Lineage>>,
}

impl Lineage {
    fn contains(chain: &Option<Arc<Lineage>>, key: &str) -> bool {
        let mut cur = chain.as_deref();
        while let Some(link) = cur {
            if link.key == key {
                return true;
            }
            cur = link.parent.as_deref();
        }
        false
    }
}

/// A `then` entry waiting to be dispatched.
struct Pending {
    sync: Arc<SyncRule>,
    index: usize,
    binding: Binding,
    depth: u32,
    lineage: Option<Arc<Lineage>>,
}

struct Burst {
    id: BurstId,
    state: BurstState,
    appended: usize,
    firings: Vec<Firing>,
}

impl Burst {
    fn new() -> Self {
        Self {
            id: BurstId::new(),
            state: BurstState::Idle,
            appended: 0,
            firings: Vec::new(),
        }
    }

    fn enter(&mut self, next: BurstState) {
        if self.state != next {
            tracing::debug!(burst = %self.id, from = ?self.state, to = ?next, "burst state");
            self.state = next;
        }
    }
}

// ---------------------------------------------------------------------------
// Sync table
// ---------------------------------------------------------------------------

#[derive(Default)]
struct SyncTable {
    rules: Vec<Arc<SyncRule>>,
    /// Action -> (rule index, pattern index) for every pattern targeting it.
    index: HashMap<ActionRef, Vec<(usize, usize)>>,
}

impl SyncTable {
    /// Insert or replace (by name). Returns true if a rule was replaced.
    fn upsert(&mut self, rule: SyncRule) -> bool {
        let rule = Arc::new(rule);
        let replaced = match self.rules.iter().position(|r| r.name() == rule.name()) {
            Some(pos) => {
                self.rules[pos] = rule;
                true
            }
            None => {
                self.rules.push(rule);
                false
            }
        };
        self.reindex();
        replaced
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (ri, rule) in self.rules.iter().enumerate() {
            for (pi, pattern) in rule.when().iter().enumerate() {
                self.index
                    .entry(pattern.action.clone())
                    .or_default()
                    .push((ri, pi));
            }
        }
    }

    /// Rules with at least one pattern on `action`, in registration order,
    /// each with the indices of its patterns that target `action`.
    fn triggered_by(&self, action: &ActionRef) -> Vec<(Arc<SyncRule>, Vec<usize>)> {
        let mut out: Vec<(Arc<SyncRule>, Vec<usize>)> = Vec::new();
        let Some(entries) = self.index.get(action) else {
            return out;
        };
        let mut last_rule = None;
        for &(ri, pi) in entries {
            if last_rule == Some(ri) {
                if let Some((_, anchors)) = out.last_mut() {
                    anchors.push(pi);
                }
            } else {
                out.push((Arc::clone(&self.rules[ri]), vec![pi]));
                last_rule = Some(ri);
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub sync: String,
    pub problem: String,
}

/// Outcome of installing a batch of syncs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub installed: Vec<String>,
    pub replaced: Vec<String>,
    pub rejected: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

fn validate_rule(rule: &SyncRule, registry: &ActionRegistry) -> Vec<String> {
    let mut problems = Vec::new();
    if rule.when().is_empty() {
        problems.push("sync has no when patterns".to_string());
    }
    for action in rule.references() {
        if !registry.contains(action) {
            problems.push(RegistryError::NotFound(action.clone()).to_string());
        }
    }
    for var in rule.unbound_vars() {
        problems.push(format!(
            "variable '{var}' is used in then but never bound by when"
        ));
    }
    problems
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub struct Engine {
    config: EngineConfig,
    registry: RwLock<ActionRegistry>,
    syncs: RwLock<SyncTable>,
    log: Mutex<ActionLog>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let log = ActionLog::new(config.history);
        Self {
            config,
            registry: RwLock::new(ActionRegistry::new()),
            syncs: RwLock::new(SyncTable::default()),
            log: Mutex::new(log),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn log(&self) -> MutexGuard<'_, ActionLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a concept. Registering a name again replaces the earlier
    /// concept's actions.
    pub fn register(
        &self,
        concept: &str,
        instance: Arc<dyn Concept>,
    ) -> Result<usize, RegistryError> {
        let n = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(concept, instance)?;
        tracing::debug!(concept, actions = n, "concept registered");
        Ok(n)
    }

    /// Validate and install syncs. Invalid syncs are logged and skipped;
    /// a sync whose name is already installed replaces the earlier one.
    pub fn install(&self, rules: impl IntoIterator<Item = SyncRule>) -> ValidationReport {
        let mut report = ValidationReport::default();
        let registry = read(&self.registry);
        let mut table = self.syncs.write().unwrap_or_else(PoisonError::into_inner);

        for rule in rules {
            let problems = validate_rule(&rule, &registry);
            if !problems.is_empty() {
                for problem in problems {
                    tracing::error!(sync = rule.name(), %problem, "sync rejected");
                    report.rejected.push(ValidationIssue {
                        sync: rule.name().to_string(),
                        problem,
                    });
                }
                continue;
            }
            let name = rule.name().to_string();
            if table.upsert(rule) {
                report.replaced.push(name.clone());
            }
            report.installed.push(name);
        }
        report
    }

    pub fn resolve(&self, action: &ActionRef) -> Result<ActionHandle, RegistryError> {
        read(&self.registry).resolve(action)
    }

    pub fn concepts(&self) -> Vec<ConceptSummary> {
        read(&self.registry).summaries()
    }

    pub fn syncs(&self) -> Vec<Arc<SyncRule>> {
        read(&self.syncs).rules.clone()
    }

    /// The most recent records across all bursts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Arc<ActionRecord>> {
        self.log().recent(limit)
    }

    // -----------------------------------------------------------------------
    // Bursts
    // -----------------------------------------------------------------------

    /// Invoke `action` as the stimulus of a new burst and run the burst to
    /// quiescence.
    ///
    /// Returns `Err` only if `action` itself cannot be resolved. Burst-level
    /// failures (depth, budget, cycles) come back in `BurstReport::failure`
    /// together with everything the burst recorded before failing.
    pub async fn stimulate(
        &self,
        action: ActionRef,
        input: Dict,
    ) -> Result<BurstReport, EngineError> {
        let (burst, root) = self.open(action, input).await?;
        Ok(self.settle(burst, root).await)
    }

    /// Invoke `action` as the stimulus of a new burst but leave its
    /// consequences to [`StartedBurst::run`].
    ///
    /// The root record is available as soon as this returns, so a caller can
    /// act on the root output (a correlation id, say) while the rest of the
    /// burst runs elsewhere.
    pub async fn begin(
        self: &Arc<Self>,
        action: ActionRef,
        input: Dict,
    ) -> Result<StartedBurst, EngineError> {
        let (burst, root) = self.open(action, input).await?;
        Ok(StartedBurst {
            engine: Arc::clone(self),
            burst,
            root,
        })
    }

    async fn open(
        &self,
        action: ActionRef,
        input: Dict,
    ) -> Result<(Burst, Arc<ActionRecord>), EngineError> {
        let handle = self.resolve(&action)?;
        let mut burst = Burst::new();
        let id = burst.id;
        tracing::debug!(burst = %id, %action, "burst started");

        let output = handle.call(input.clone()).await;
        let root = self.append(
            &mut burst,
            NewRecord {
                burst: id,
                depth: 0,
                action,
                input,
                output,
                synced_by: None,
            },
        );
        Ok((burst, root))
    }

    /// Run an opened burst to quiescence or failure.
    async fn settle(&self, mut burst: Burst, root: Arc<ActionRecord>) -> BurstReport {
        let id = burst.id;
        let outcome = self.run(&mut burst, &root).await;
        let records = self.log().close_burst(id);

        let failure = match outcome {
            Ok(()) => {
                burst.enter(BurstState::Quiescent);
                None
            }
            Err(e) => {
                burst.enter(BurstState::Failed);
                tracing::error!(burst = %burst.id, error = %e, "burst failed");
                Some(e)
            }
        };

        BurstReport {
            id: burst.id,
            root,
            records,
            firings: burst.firings,
            state: burst.state,
            failure,
        }
    }

    fn append(&self, burst: &mut Burst, new: NewRecord) -> Arc<ActionRecord> {
        let record = self.log().append(new);
        burst.appended += 1;
        if let Some(error) = record.error() {
            tracing::warn!(burst = %burst.id, action = %record.action, %error, "action returned an error");
        }
        record
    }

    async fn run(&self, burst: &mut Burst, root: &Arc<ActionRecord>) -> Result<(), EngineError> {
        let mut stack: Vec<Pending> = Vec::new();
        self.evaluate(burst, root, None, &mut stack)?;

        while let Some(pending) = stack.pop() {
            burst.enter(BurstState::Dispatching);
            let invocation = &pending.sync.then()[pending.index];

            let args = match invocation.resolve(&pending.binding) {
                Ok(args) => args,
                Err(e) => {
                    tracing::error!(sync = pending.sync.name(), action = %invocation.action, error = %e, "skipping then entry");
                    continue;
                }
            };
            let handle = match self.resolve(&invocation.action) {
                Ok(handle) => handle,
                Err(e) => {
                    tracing::error!(sync = pending.sync.name(), error = %e, "skipping then entry");
                    continue;
                }
            };

            if burst.appended >= self.config.max_actions {
                return Err(EngineError::BudgetExceeded {
                    burst: burst.id,
                    limit: self.config.max_actions,
                });
            }

            let output = handle.call(args.clone()).await;
            let id = burst.id;
            let record = self.append(
                burst,
                NewRecord {
                    burst: id,
                    depth: pending.depth,
                    action: invocation.action.clone(),
                    input: args,
                    output,
                    synced_by: Some(pending.sync.name().to_string()),
                },
            );

            let lineage = Some(Arc::new(Lineage {
                key: lineage_key(&pending.sync, &pending.binding),
                parent: pending.lineage.clone(),
            }));
            self.evaluate(burst, &record, lineage, &mut stack)?;
        }
        Ok(())
    }

    /// Find every rule newly satisfied by `record` and queue its `then`
    /// entries so they pop in declaration order.
    fn evaluate(
        &self,
        burst: &mut Burst,
        record: &Arc<ActionRecord>,
        lineage: Option<Arc<Lineage>>,
        stack: &mut Vec<Pending>,
    ) -> Result<(), EngineError> {
        burst.enter(BurstState::Evaluating);

        let matches = {
            let table = read(&self.syncs);
            let log = self.log();
            let records = log.burst_records(burst.id);
            table
                .triggered_by(&record.action)
                .into_iter()
                .filter_map(|(rule, anchors)| {
                    let accept = |b: &Binding| rule.accepts(b);
                    let found = anchors
                        .into_iter()
                        .find_map(|anchor| find_anchored(rule.when(), records, anchor, record, &accept));
                    found.map(|m| (rule, m))
                })
                .collect::<Vec<_>>()
        };

        let mut queued = Vec::new();
        for (rule, m) in matches {
            let depth = record.depth + 1;
            if depth > self.config.max_depth {
                return Err(EngineError::DepthExceeded {
                    burst: burst.id,
                    limit: self.config.max_depth,
                    sync: rule.name().to_string(),
                });
            }
            if Lineage::contains(&lineage, &lineage_key(&rule, &m.binding)) {
                return Err(EngineError::CycleDetected {
                    burst: burst.id,
                    sync: rule.name().to_string(),
                });
            }

            tracing::debug!(burst = %burst.id, sync = rule.name(), trigger = record.seq, "sync fired");
            burst.firings.push(Firing {
                sync: rule.name().to_string(),
                trigger: record.seq,
                records: m.records,
                binding: m.binding.clone(),
            });
            for index in 0..rule.then().len() {
                queued.push(Pending {
                    sync: Arc::clone(&rule),
                    index,
                    binding: m.binding.clone(),
                    depth,
                    lineage: lineage.clone(),
                });
            }
        }

        stack.extend(queued.into_iter().rev());
        Ok(())
    }
}

fn lineage_key(rule: &SyncRule, binding: &Binding) -> String {
    format!("{}:{}", rule.name(), binding.canonical())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConceptError;
    use crate::record::{dict, error_output};
    use crate::registry::ActionSpec;
    use crate::shape;
    use crate::sync::SyncSpec;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    const PING: ActionRef = ActionRef::from_static("Relay", "ping");
    const PONG: ActionRef = ActionRef::from_static("Relay", "pong");
    const DONE: ActionRef = ActionRef::from_static("Relay", "done");
    const FAIL: ActionRef = ActionRef::from_static("Relay", "fail");
    const INC: ActionRef = ActionRef::from_static("Relay", "inc");

    /// Test concept: echoes inputs, fails on demand, counts.
    struct Relay;

    #[async_trait]
    impl Concept for Relay {
        fn interface(&self) -> &'static [ActionSpec] {
            const ACTIONS: &[ActionSpec] = &[
                ActionSpec::new("ping", &["v"], &["v"]),
                ActionSpec::new("pong", &["v"], &["v"]),
                ActionSpec::new("done", &["v"], &[]),
                ActionSpec::new("fail", &["v"], &[]),
                ActionSpec::new("inc", &["n"], &["n"]),
            ];
            ACTIONS
        }

        async fn perform(&self, action: &str, input: Dict) -> Result<Dict, ConceptError> {
            match action {
                "ping" | "pong" => Ok(input),
                "done" => Ok(Dict::new()),
                "fail" => Ok(error_output("refused")),
                "inc" => {
                    let n = input.get("n").and_then(Value::as_i64).unwrap_or(0);
                    Ok(dict(json!({ "n": n + 1 })))
                }
                other => Err(ConceptError::UnknownAction(other.to_string())),
            }
        }
    }

    /// Same name, fewer actions: used to simulate a hot reload dropping one.
    struct RelayWithoutPong;

    #[async_trait]
    impl Concept for RelayWithoutPong {
        fn interface(&self) -> &'static [ActionSpec] {
            const ACTIONS: &[ActionSpec] = &[
                ActionSpec::new("ping", &["v"], &["v"]),
                ActionSpec::new("done", &["v"], &[]),
            ];
            ACTIONS
        }

        async fn perform(&self, action: &str, input: Dict) -> Result<Dict, ConceptError> {
            Relay.perform(action, input).await
        }
    }

    fn engine() -> Engine {
        let engine = Engine::new(EngineConfig::default());
        engine.register("Relay", Arc::new(Relay)).unwrap();
        engine
    }

    fn relay(name: &str, from: ActionRef, to: ActionRef) -> SyncRule {
        SyncRule::new(name, |v| {
            let x = v.var("x");
            SyncSpec::new()
                .when(from, shape! {}, shape! { "v" => &x })
                .then(to, shape! { "v" => &x })
        })
    }

    #[tokio::test]
    async fn chained_rules_observe_each_other() {
        let engine = engine();
        let report = engine.install([
            relay("PingToPong", PING, PONG),
            SyncRule::new("PongToDone", |v| {
                let x = v.var("x");
                SyncSpec::new()
                    .when(PING, shape! { "v" => &x }, shape! {})
                    .when(PONG, shape! {}, shape! { "v" => &x })
                    .then(DONE, shape! { "v" => &x })
            }),
        ]);
        assert!(report.is_clean());

        let burst = engine
            .stimulate(PING, dict(json!({ "v": "hello" })))
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(burst.state, BurstState::Quiescent);
        let done: Vec<_> = burst.records_of(&DONE).collect();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].input["v"], "hello");
        assert_eq!(done[0].depth, 2);
        assert_eq!(done[0].synced_by.as_deref(), Some("PongToDone"));
        assert_eq!(burst.fired("PingToPong"), 1);
        assert_eq!(burst.fired("PongToDone"), 1);
    }

    #[tokio::test]
    async fn three_hop_chain_reaches_the_final_rule_once() {
        let engine = engine();
        let report = engine.install([
            relay("PingToPong", PING, PONG),
            SyncRule::new("PongToInc", |v| {
                let x = v.var("x");
                SyncSpec::new()
                    .when(PONG, shape! {}, shape! { "v" => &x })
                    .then(INC, shape! { "n" => &x })
            }),
            SyncRule::new("IncToDone", |v| {
                let [x, n] = v.vars(["x", "n"]);
                SyncSpec::new()
                    .when(PING, shape! { "v" => &x }, shape! {})
                    .when(INC, shape! {}, shape! { "n" => &n })
                    .then(DONE, shape! { "v" => &n, "from" => &x })
            }),
        ]);
        assert!(report.is_clean());

        let burst = engine
            .stimulate(PING, dict(json!({ "v": 41 })))
            .await
            .unwrap()
            .into_result()
            .unwrap();

        assert_eq!(burst.fired("PingToPong"), 1);
        assert_eq!(burst.fired("PongToInc"), 1);
        assert_eq!(burst.fired("IncToDone"), 1);
        let done: Vec<_> = burst.records_of(&DONE).collect();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].input["v"], 42);
        assert_eq!(done[0].input["from"], 41);
        assert_eq!(done[0].depth, 3);
    }

    #[tokio::test]
    async fn begun_burst_records_root_before_running_rules() {
        let engine = Arc::new(engine());
        engine.install([relay("PingToPong", PING, PONG)]);

        let started = engine
            .begin(PING, dict(json!({ "v": "x" })))
            .await
            .unwrap();
        assert_eq!(started.root().output["v"], "x");
        assert_eq!(engine.recent(10).len(), 1);

        let id = started.id();
        let burst = tokio::spawn(started.run()).await.unwrap();
        assert_eq!(burst.id, id);
        assert_eq!(burst.state, BurstState::Quiescent);
        assert_eq!(burst.records_of(&PONG).count(), 1);
    }

    #[tokio::test]
    async fn then_entries_dispatch_depth_first_in_order() {
        let engine = engine();
        engine.install([
            SyncRule::new("Fan", |v| {
                let x = v.var("x");
                SyncSpec::new()
                    .when(PING, shape! {}, shape! { "v" => &x })
                    .then(PONG, shape! { "v" => &x })
                    .then(DONE, shape! { "v" => "second" })
            }),
            relay("PongToDone", PONG, DONE),
        ]);

        let burst = engine
            .stimulate(PING, dict(json!({ "v": "first" })))
            .await
            .unwrap();
        let order: Vec<String> = burst
            .records
            .iter()
            .map(|r| format!("{}:{}", r.action.action, r.input["v"].as_str().unwrap_or("")))
            .collect();
        assert_eq!(order, ["ping:first", "pong:first", "done:first", "done:second"]);
        let seqs: Vec<u64> = burst.records.iter().map(|r| r.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn shared_variable_must_unify() {
        let engine = engine();
        engine.install([
            SyncRule::new("PingToOtherPong", |_| {
                SyncSpec::new()
                    .when(PING, shape! {}, shape! {})
                    .then(PONG, shape! { "v" => "other" })
            }),
            SyncRule::new("Joined", |v| {
                let x = v.var("x");
                SyncSpec::new()
                    .when(PING, shape! { "v" => &x }, shape! {})
                    .when(PONG, shape! {}, shape! { "v" => &x })
                    .then(DONE, shape! { "v" => &x })
            }),
        ]);

        let burst = engine
            .stimulate(PING, dict(json!({ "v": "a" })))
            .await
            .unwrap();
        assert_eq!(burst.records_of(&PONG).count(), 1);
        assert_eq!(burst.fired("Joined"), 0);
        assert_eq!(burst.records_of(&DONE).count(), 0);

        let agreeing = engine
            .stimulate(PING, dict(json!({ "v": "other" })))
            .await
            .unwrap();
        assert_eq!(agreeing.fired("Joined"), 1);
    }

    #[tokio::test]
    async fn error_outputs_only_reach_error_rules() {
        let engine = engine();
        engine.install([
            relay("PingToFail", PING, FAIL),
            SyncRule::new("FailSuccess", |_| {
                SyncSpec::new()
                    .when(FAIL, shape! {}, shape! {})
                    .then(DONE, shape! { "v" => "ok" })
            }),
            SyncRule::new("FailError", |v| {
                let e = v.var("e");
                SyncSpec::new()
                    .when(FAIL, shape! {}, shape! { "error" => &e })
                    .then(DONE, shape! { "v" => &e })
            }),
        ]);

        let burst = engine
            .stimulate(PING, dict(json!({ "v": "x" })))
            .await
            .unwrap();
        assert_eq!(burst.fired("FailSuccess"), 0);
        assert_eq!(burst.fired("FailError"), 1);
        let done: Vec<_> = burst.records_of(&DONE).collect();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].input["v"], "refused");
        assert!(burst.failure.is_none());
    }

    #[tokio::test]
    async fn literal_discrimination_between_overlapping_rules() {
        let engine = engine();
        engine.install([
            SyncRule::new("OnlyA", |_| {
                SyncSpec::new()
                    .when(PING, shape! { "v" => "a" }, shape! {})
                    .then(DONE, shape! { "v" => "from-a" })
            }),
            SyncRule::new("OnlyB", |_| {
                SyncSpec::new()
                    .when(PING, shape! { "v" => "b" }, shape! {})
                    .then(DONE, shape! { "v" => "from-b" })
            }),
        ]);

        let burst = engine
            .stimulate(PING, dict(json!({ "v": "b" })))
            .await
            .unwrap();
        let done: Vec<_> = burst.records_of(&DONE).collect();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].input["v"], "from-b");
    }

    #[tokio::test]
    async fn duplicate_registration_does_not_duplicate_dispatch() {
        let engine = engine();
        engine.register("Relay", Arc::new(Relay)).unwrap();
        engine.install([relay("PingToDone", PING, DONE)]);
        let second = engine.install([relay("PingToDone", PING, DONE)]);
        assert_eq!(second.replaced, ["PingToDone"]);
        assert_eq!(engine.syncs().len(), 1);

        let burst = engine
            .stimulate(PING, dict(json!({ "v": 1 })))
            .await
            .unwrap();
        assert_eq!(burst.records_of(&DONE).count(), 1);
    }

    #[tokio::test]
    async fn runaway_chain_hits_depth_limit() {
        let engine = Engine::new(EngineConfig {
            max_depth: 5,
            ..EngineConfig::default()
        });
        engine.register("Relay", Arc::new(Relay)).unwrap();
        engine.install([SyncRule::new("Forever", |v| {
            let n = v.var("n");
            SyncSpec::new()
                .when(INC, shape! {}, shape! { "n" => &n })
                .then(INC, shape! { "n" => &n })
        })]);

        let burst = engine
            .stimulate(INC, dict(json!({ "n": 0 })))
            .await
            .unwrap();
        assert_eq!(burst.state, BurstState::Failed);
        assert!(matches!(
            burst.failure,
            Some(EngineError::DepthExceeded { limit: 5, .. })
        ));
        assert_eq!(burst.records_of(&INC).count(), 6);
    }

    #[tokio::test]
    async fn identical_refiring_is_a_cycle() {
        let engine = engine();
        engine.install([relay("PingToPong", PING, PONG), relay("PongToPing", PONG, PING)]);

        let burst = engine
            .stimulate(PING, dict(json!({ "v": "loop" })))
            .await
            .unwrap();
        match burst.failure {
            Some(EngineError::CycleDetected { ref sync, .. }) => assert_eq!(sync, "PingToPong"),
            ref other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_siblings_are_not_a_cycle() {
        let engine = engine();
        engine.install([
            SyncRule::new("Twice", |_| {
                SyncSpec::new()
                    .when(PING, shape! {}, shape! {})
                    .then(PONG, shape! { "v" => "same" })
                    .then(PONG, shape! { "v" => "same" })
            }),
            relay("PongToDone", PONG, DONE),
        ]);

        let burst = engine
            .stimulate(PING, dict(json!({ "v": 0 })))
            .await
            .unwrap()
            .into_result()
            .unwrap();
        assert_eq!(burst.records_of(&DONE).count(), 2);
    }

    #[tokio::test]
    async fn action_budget_is_enforced() {
        let engine = Engine::new(EngineConfig {
            max_actions: 3,
            ..EngineConfig::default()
        });
        engine.register("Relay", Arc::new(Relay)).unwrap();
        engine.install([SyncRule::new("Wide", |_| {
            let spec = SyncSpec::new().when(PING, shape! {}, shape! {});
            (0..5).fold(spec, |s, i| s.then(DONE, shape! { "v" => i }))
        })]);

        let burst = engine
            .stimulate(PING, dict(json!({ "v": 0 })))
            .await
            .unwrap();
        assert!(matches!(
            burst.failure,
            Some(EngineError::BudgetExceeded { limit: 3, .. })
        ));
        assert_eq!(burst.records.len(), 3);
    }

    #[tokio::test]
    async fn unresolvable_then_entry_is_skipped() {
        let engine = engine();
        engine.install([SyncRule::new("PingFanOut", |v| {
            let x = v.var("x");
            SyncSpec::new()
                .when(PING, shape! {}, shape! { "v" => &x })
                .then(PONG, shape! { "v" => &x })
                .then(DONE, shape! { "v" => &x })
        })]);
        // Hot reload drops `pong` after the sync was validated.
        engine
            .register("Relay", Arc::new(RelayWithoutPong))
            .unwrap();

        let burst = engine
            .stimulate(PING, dict(json!({ "v": "x" })))
            .await
            .unwrap();
        assert!(burst.failure.is_none());
        assert_eq!(burst.records_of(&PONG).count(), 0);
        assert_eq!(burst.records_of(&DONE).count(), 1);
    }

    #[tokio::test]
    async fn unknown_stimulus_is_an_error() {
        let engine = engine();
        let err = engine
            .stimulate(ActionRef::from_static("Nope", "x"), Dict::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Registry(RegistryError::NotFound(_))));
    }

    #[test]
    fn install_rejects_invalid_syncs_and_keeps_valid_ones() {
        let engine = engine();
        let report = engine.install([
            relay("Good", PING, PONG),
            relay("UnknownTarget", PING, ActionRef::from_static("Ghost", "boo")),
            SyncRule::new("Unbound", |v| {
                let y = v.var("y");
                SyncSpec::new()
                    .when(PING, shape! {}, shape! {})
                    .then(DONE, shape! { "v" => &y })
            }),
            SyncRule::new("Empty", |_| SyncSpec::new().then(DONE, shape! {})),
        ]);

        assert_eq!(report.installed, ["Good"]);
        let rejected: Vec<&str> = report.rejected.iter().map(|i| i.sync.as_str()).collect();
        assert_eq!(rejected, ["UnknownTarget", "Unbound", "Empty"]);
        assert!(report.rejected[1].problem.contains("'y'"));
        assert_eq!(engine.syncs().len(), 1);
    }

    #[tokio::test]
    async fn bursts_do_not_see_each_other() {
        let engine = engine();
        engine.install([SyncRule::new("NeedsBoth", |v| {
            let x = v.var("x");
            SyncSpec::new()
                .when(PING, shape! { "v" => &x }, shape! {})
                .when(PONG, shape! { "v" => &x }, shape! {})
                .then(DONE, shape! { "v" => &x })
        })]);

        engine
            .stimulate(PING, dict(json!({ "v": "shared" })))
            .await
            .unwrap();
        let second = engine
            .stimulate(PONG, dict(json!({ "v": "shared" })))
            .await
            .unwrap();
        assert_eq!(second.fired("NeedsBoth"), 0);
        assert_eq!(engine.recent(10).len(), 2);
    }

    #[tokio::test]
    async fn filter_prevents_firing() {
        let engine = engine();
        engine.install([SyncRule::new("BigOnly", |v| {
            let n = v.var("n");
            SyncSpec::new()
                .when(INC, shape! {}, shape! { "n" => &n })
                .filter(|b| b.get("n").and_then(Value::as_i64).unwrap_or(0) > 10)
                .then(DONE, shape! { "v" => &n })
        })]);

        let small = engine
            .stimulate(INC, dict(json!({ "n": 1 })))
            .await
            .unwrap();
        assert_eq!(small.fired("BigOnly"), 0);
        let big = engine
            .stimulate(INC, dict(json!({ "n": 20 })))
            .await
            .unwrap();
        assert_eq!(big.fired("BigOnly"), 1);
    }
}
