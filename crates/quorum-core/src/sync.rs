//! Reconciling the edited forest with the server's flat list.
//!
//! # Plan
//!
//! `SyncPlan::diff` compares the form against the last-loaded server nodes:
//! server ids missing from the form are deleted, temporary ids (or ids the
//! server never returned) are created, and everything else is updated. Saves
//! are listed parent-before-child. Deletes are grouped into waves by their
//! depth in the server's tree, deepest first, so a removed subtree goes away
//! leaf-first.
//!
//! # Execution
//!
//! `SyncEngine::run` issues each delete wave concurrently, lets it settle
//! before the next, and lets the last wave settle before driving every save
//! concurrently. Each save owns a resolution
//! slot (a `watch` channel) that starts `Pending` and ends `Resolved(server
//! id)` or `Failed`. A save first waits on its parent's slot, bounded by the
//! dependency timeout, and only then calls the API with the parent's real id.
//! A failed parent fails its children at once, without a call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use quorum_contracts::{
    error::{QuorumError, QuorumResult},
    node::{NodeId, PolicyNode},
    report::{FailureKind, NodeFailure, Operation},
    wire::PolicyRequest,
};

use crate::{forest::Forest, traits::PolicyApi};

/// Which call a surviving form node needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveKind {
    Create,
    Update,
}

impl SaveKind {
    pub fn operation(self) -> Operation {
        match self {
            SaveKind::Create => Operation::Create,
            SaveKind::Update => Operation::Update,
        }
    }
}

/// One create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSave {
    pub node: PolicyNode,
    pub kind: SaveKind,
}

/// The calls a submission will make.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Server ids absent from the form, in waves: deepest first, server
    /// order within a wave.
    pub deletes: Vec<Vec<NodeId>>,
    /// Every form node, parents before children.
    pub saves: Vec<PlannedSave>,
}

impl SyncPlan {
    /// Diff `form` against `server`.
    ///
    /// Fails with `UnknownUpstream` or `CyclicUpstream` if some form node
    /// cannot be reached from the root.
    pub fn diff(form: &Forest, server: &[PolicyNode]) -> QuorumResult<Self> {
        let by_id: HashMap<&NodeId, &PolicyNode> = server.iter().map(|node| (&node.id, node)).collect();
        let mut waves: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for node in server.iter().filter(|node| !form.contains(&node.id)) {
            waves
                .entry(server_depth(&by_id, node))
                .or_default()
                .push(node.id.clone());
        }
        let deletes: Vec<Vec<NodeId>> = waves.into_values().rev().collect();

        let known: HashSet<&NodeId> = server.iter().map(|node| &node.id).collect();
        let ordered = form.walk();

        if ordered.len() < form.len() {
            let reached: HashSet<&NodeId> = ordered.iter().map(|(_, node)| &node.id).collect();
            if let Some(stray) = form.iter().find(|node| !reached.contains(&node.id)) {
                return Err(unreachable_error(form, stray));
            }
        }

        let saves = ordered
            .into_iter()
            .map(|(_, node)| PlannedSave {
                kind: if node.id.is_temporary() || !known.contains(&node.id) {
                    SaveKind::Create
                } else {
                    SaveKind::Update
                },
                node: node.clone(),
            })
            .collect();

        Ok(Self { deletes, saves })
    }

    pub fn count(&self, kind: SaveKind) -> usize {
        self.saves.iter().filter(|save| save.kind == kind).count()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.iter().map(Vec::len).sum()
    }
}

/// Hops from `node` up to the root within the server list.
fn server_depth(by_id: &HashMap<&NodeId, &PolicyNode>, node: &PolicyNode) -> usize {
    let mut depth = 0;
    let mut upstream = &node.upstream_id;
    // Bounded so a cyclic server list still terminates.
    while depth < by_id.len() {
        match by_id.get(upstream) {
            Some(parent) => {
                depth += 1;
                upstream = &parent.upstream_id;
            }
            None => break,
        }
    }
    depth
}

fn unreachable_error(form: &Forest, stray: &PolicyNode) -> QuorumError {
    // Walk up until we either fall off the forest or revisit a node.
    let mut seen: HashSet<&NodeId> = HashSet::new();
    let mut current = stray;
    loop {
        if !seen.insert(&current.id) {
            return QuorumError::CyclicUpstream { node_id: stray.id.clone() };
        }
        match form.get(&current.upstream_id) {
            Some(parent) => current = parent,
            None => {
                return QuorumError::UnknownUpstream {
                    node_id: current.id.clone(),
                    upstream_id: current.upstream_id.clone(),
                }
            }
        }
    }
}

/// Per-node results of running a plan.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Ids whose delete succeeded.
    pub deleted: Vec<NodeId>,
    /// Form id → server id for every successful save.
    pub saved: BTreeMap<NodeId, NodeId>,
    /// Every failed delete and save.
    pub failures: Vec<NodeFailure>,
}

impl SyncOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Resolution {
    Pending,
    Resolved(NodeId),
    Failed,
}

/// Runs a `SyncPlan` against a `PolicyApi`.
pub struct SyncEngine {
    api: Arc<dyn PolicyApi>,
    entity_id: String,
    dependency_timeout: Duration,
}

impl SyncEngine {
    pub fn new(api: Arc<dyn PolicyApi>, entity_id: impl Into<String>, dependency_timeout: Duration) -> Self {
        Self {
            api,
            entity_id: entity_id.into(),
            dependency_timeout,
        }
    }

    /// Delete phase, then create/update phase. Never rolls anything back.
    pub async fn run(&self, plan: &SyncPlan) -> SyncOutcome {
        let mut outcome = SyncOutcome::default();

        info!(
            entity_id = %self.entity_id,
            deletes = plan.delete_count(),
            creates = plan.count(SaveKind::Create),
            updates = plan.count(SaveKind::Update),
            "sync starting"
        );

        self.delete_phase(&plan.deletes, &mut outcome).await;
        self.save_phase(&plan.saves, &mut outcome).await;

        info!(
            entity_id = %self.entity_id,
            deleted = outcome.deleted.len(),
            saved = outcome.saved.len(),
            failed = outcome.failures.len(),
            "sync settled"
        );
        outcome
    }

    async fn delete_phase(&self, waves: &[Vec<NodeId>], outcome: &mut SyncOutcome) {
        for (depth, wave) in waves.iter().enumerate() {
            debug!(entity_id = %self.entity_id, wave = depth, count = wave.len(), "delete wave starting");
            let calls = wave.iter().map(|id| async move {
                debug!(entity_id = %self.entity_id, policy_id = %id, "deleting policy");
                (id, self.api.delete(&self.entity_id, id).await)
            });

            for (id, result) in join_all(calls).await {
                match result {
                    Ok(()) => outcome.deleted.push(id.clone()),
                    Err(e) => {
                        warn!(policy_id = %id, error = %e, "delete failed");
                        outcome.failures.push(NodeFailure {
                            node_id: id.clone(),
                            operation: Operation::Delete,
                            kind: FailureKind::RequestFailure,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }
    }

    async fn save_phase(&self, saves: &[PlannedSave], outcome: &mut SyncOutcome) {
        let mut slots: HashMap<NodeId, watch::Sender<Resolution>> = HashMap::new();
        slots.insert(NodeId::root(), watch::channel(Resolution::Resolved(NodeId::root())).0);
        for save in saves {
            slots.insert(save.node.id.clone(), watch::channel(Resolution::Pending).0);
        }

        let results = join_all(saves.iter().map(|save| self.save_one(save, &slots))).await;

        for (save, result) in saves.iter().zip(results) {
            match result {
                Ok(server_id) => {
                    outcome.saved.insert(save.node.id.clone(), server_id);
                }
                Err(failure) => outcome.failures.push(failure),
            }
        }
    }

    async fn save_one(
        &self,
        save: &PlannedSave,
        slots: &HashMap<NodeId, watch::Sender<Resolution>>,
    ) -> Result<NodeId, NodeFailure> {
        let result = self.persist(save, slots).await;

        if let Some(slot) = slots.get(&save.node.id) {
            slot.send_replace(match &result {
                Ok(server_id) => Resolution::Resolved(server_id.clone()),
                Err(_) => Resolution::Failed,
            });
        }
        result
    }

    async fn persist(
        &self,
        save: &PlannedSave,
        slots: &HashMap<NodeId, watch::Sender<Resolution>>,
    ) -> Result<NodeId, NodeFailure> {
        let node = &save.node;
        let operation = save.kind.operation();
        let fail = |kind: FailureKind, error: QuorumError| {
            warn!(node_id = %node.id, ?operation, error = %error, "policy not saved");
            NodeFailure {
                node_id: node.id.clone(),
                operation,
                kind,
                reason: error.to_string(),
            }
        };

        let upstream_failed = || QuorumError::UpstreamFailed {
            node_id: node.id.clone(),
            upstream_id: node.upstream_id.clone(),
        };

        let Some(parent) = slots.get(&node.upstream_id) else {
            return Err(fail(FailureKind::UpstreamFailed, upstream_failed()));
        };

        let mut watcher = parent.subscribe();
        let waited = tokio::time::timeout(self.dependency_timeout, async {
            match watcher.wait_for(|r| *r != Resolution::Pending).await {
                Ok(resolution) => (*resolution).clone(),
                Err(_) => Resolution::Failed,
            }
        })
        .await;

        let upstream = match waited {
            Ok(Resolution::Resolved(id)) => id,
            Ok(_) => return Err(fail(FailureKind::UpstreamFailed, upstream_failed())),
            Err(_) => {
                return Err(fail(
                    FailureKind::DependencyTimeout,
                    QuorumError::DependencyTimeout {
                        node_id: node.id.clone(),
                        upstream_id: node.upstream_id.clone(),
                        waited_ms: u64::try_from(self.dependency_timeout.as_millis()).unwrap_or(u64::MAX),
                    },
                ))
            }
        };

        debug!(
            node_id = %node.id,
            upstream_id = %node.upstream_id,
            resolved_upstream = %upstream,
            ?operation,
            "upstream resolved, saving policy"
        );

        let request = PolicyRequest::for_node(node, upstream);
        let response = match save.kind {
            SaveKind::Create => self.api.create(&self.entity_id, &request).await,
            SaveKind::Update => self.api.update(&self.entity_id, &node.id, &request).await,
        };

        response
            .map(|record| record.id)
            .map_err(|e| fail(FailureKind::RequestFailure, e))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use quorum_contracts::{
        error::QuorumError,
        node::{NodeId, PolicyNode},
        report::{FailureKind, Operation},
    };

    use super::{PlannedSave, SaveKind, SyncEngine, SyncPlan};
    use crate::forest::Forest;
    use crate::testkit::{node, role_of, Call, MockApi};

    // ── Plan ──────────────────────────────────────────────────────────────────

    #[test]
    fn test_diff_classifies_nodes() {
        let server = vec![node("pol-1", "root", "a"), node("pol-2", "pol-1", "b"), node("pol-3", "root", "c")];
        let form = Forest::build(vec![
            node("pol-1", "root", "a"),
            node("~new", "pol-1", "d"),
            node("pol-3", "root", "c"),
        ]);

        let plan = SyncPlan::diff(&form, &server).unwrap();

        assert_eq!(plan.deletes, vec![vec![NodeId::new("pol-2")]]);
        let kinds: Vec<(&str, SaveKind)> =
            plan.saves.iter().map(|s| (s.node.id.as_str(), s.kind)).collect();
        assert_eq!(
            kinds,
            vec![("pol-1", SaveKind::Update), ("~new", SaveKind::Create), ("pol-3", SaveKind::Update)]
        );
    }

    /// An id the server never returned is created even without the temporary marker.
    #[test]
    fn test_diff_creates_unknown_plain_ids() {
        let form = Forest::build(vec![node("root_a", "root", "a")]);
        let plan = SyncPlan::diff(&form, &[]).unwrap();
        assert_eq!(plan.saves[0].kind, SaveKind::Create);
    }

    #[test]
    fn test_diff_orders_parents_first() {
        let form = Forest::build(vec![
            node("~c", "~b", "c"),
            node("~b", "~a", "b"),
            node("~a", "root", "a"),
        ]);

        let plan = SyncPlan::diff(&form, &[]).unwrap();
        let order: Vec<&str> = plan.saves.iter().map(|s| s.node.id.as_str()).collect();
        assert_eq!(order, vec!["~a", "~b", "~c"]);
    }

    #[test]
    fn test_diff_rejects_dangling_and_cycles() {
        let dangling = Forest::build(vec![node("~x", "pol-gone", "x")]);
        assert!(matches!(
            SyncPlan::diff(&dangling, &[]),
            Err(QuorumError::UnknownUpstream { .. })
        ));

        let cyclic = Forest::build(vec![node("~x", "~y", "x"), node("~y", "~x", "y")]);
        assert!(matches!(
            SyncPlan::diff(&cyclic, &[]),
            Err(QuorumError::CyclicUpstream { .. })
        ));
    }

    #[test]
    fn test_removed_subtree_deletes_leaf_first() {
        let server = vec![
            node("pol-1", "root", "a"),
            node("pol-2", "pol-1", "b"),
            node("pol-3", "pol-2", "c"),
            node("pol-4", "pol-1", "d"),
            node("pol-5", "root", "e"),
        ];
        let form = Forest::build(vec![node("pol-5", "root", "e")]);

        let plan = SyncPlan::diff(&form, &server).unwrap();

        let id = |s: &str| NodeId::new(s);
        assert_eq!(
            plan.deletes,
            vec![vec![id("pol-3")], vec![id("pol-2"), id("pol-4")], vec![id("pol-1")]]
        );
        assert_eq!(plan.delete_count(), 4);
    }

    #[test]
    fn test_unchanged_form_plans_only_updates() {
        let server = vec![node("pol-1", "root", "a"), node("pol-2", "pol-1", "b")];
        let plan = SyncPlan::diff(&Forest::build(server.clone()), &server).unwrap();

        assert!(plan.deletes.is_empty());
        assert_eq!(plan.count(SaveKind::Update), 2);
        assert_eq!(plan.count(SaveKind::Create), 0);
    }

    // ── Engine ────────────────────────────────────────────────────────────────

    fn engine(api: &Arc<MockApi>, timeout: Duration) -> SyncEngine {
        SyncEngine::new(api.clone(), "entity-1", timeout)
    }

    fn save(node: PolicyNode, kind: SaveKind) -> PlannedSave {
        PlannedSave { node, kind }
    }

    /// The child task starts first and its parent's create is slow; the child
    /// must still be created under the parent's server id.
    #[tokio::test(start_paused = true)]
    async fn test_child_waits_for_parent_server_id() {
        let api = Arc::new(MockApi::new());
        api.delay(|call| call.role() == Some("parent"), Duration::from_millis(300));

        let plan = SyncPlan {
            deletes: vec![],
            saves: vec![
                save(node("~child", "~parent", "child"), SaveKind::Create),
                save(node("~parent", "root", "parent"), SaveKind::Create),
            ],
        };

        let outcome = engine(&api, Duration::from_secs(5)).run(&plan).await;

        assert!(outcome.is_clean(), "failures: {:?}", outcome.failures);
        let parent_id = outcome.saved[&NodeId::new("~parent")].clone();
        assert!(!parent_id.is_temporary());

        let child_create = api
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::Create(request) if role_of(&request) == "child" => Some(request),
                _ => None,
            })
            .expect("child create issued");
        assert_eq!(child_create.upstream_policy_id, parent_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deletes_settle_before_saves_start() {
        let api = Arc::new(MockApi::new());
        api.seed(vec![node("pol-old", "root", "old")]);
        api.delay(|call| matches!(call, Call::Delete(_)), Duration::from_millis(200));

        let plan = SyncPlan {
            deletes: vec![vec![NodeId::new("pol-old")]],
            saves: vec![save(node("~new", "root", "new"), SaveKind::Create)],
        };
        let outcome = engine(&api, Duration::from_secs(5)).run(&plan).await;

        assert!(outcome.is_clean());
        let calls = api.calls();
        assert!(matches!(calls[0], Call::Delete(_)));
        assert!(matches!(calls[1], Call::Create(_)));
        assert_eq!(outcome.deleted, vec![NodeId::new("pol-old")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependency_timeout_fails_child() {
        let api = Arc::new(MockApi::new());
        api.delay(|call| call.role() == Some("parent"), Duration::from_secs(10));

        let plan = SyncPlan {
            deletes: vec![],
            saves: vec![
                save(node("~parent", "root", "parent"), SaveKind::Create),
                save(node("~child", "~parent", "child"), SaveKind::Create),
            ],
        };
        let outcome = engine(&api, Duration::from_secs(1)).run(&plan).await;

        // The parent still lands; only the child gave up.
        assert!(outcome.saved.contains_key(&NodeId::new("~parent")));
        assert_eq!(outcome.failures.len(), 1);
        let failure = &outcome.failures[0];
        assert_eq!(failure.node_id, NodeId::new("~child"));
        assert_eq!(failure.kind, FailureKind::DependencyTimeout);
        assert_eq!(failure.operation, Operation::Create);
        assert_eq!(api.create_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_parent_short_circuits_subtree() {
        let api = Arc::new(MockApi::new());
        api.reject(|call| call.role() == Some("parent"));

        let plan = SyncPlan {
            deletes: vec![],
            saves: vec![
                save(node("~parent", "root", "parent"), SaveKind::Create),
                save(node("~child", "~parent", "child"), SaveKind::Create),
                save(node("~grandchild", "~child", "grandchild"), SaveKind::Create),
                save(node("~sibling", "root", "sibling"), SaveKind::Create),
            ],
        };

        let started = tokio::time::Instant::now();
        let outcome = engine(&api, Duration::from_secs(30)).run(&plan).await;

        // Nothing waited out the timeout.
        assert!(started.elapsed() < Duration::from_secs(30));

        let kinds: Vec<(&str, FailureKind)> = outcome
            .failures
            .iter()
            .map(|f| (f.node_id.as_str(), f.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("~parent", FailureKind::RequestFailure),
                ("~child", FailureKind::UpstreamFailed),
                ("~grandchild", FailureKind::UpstreamFailed),
            ]
        );
        assert!(outcome.saved.contains_key(&NodeId::new("~sibling")));
        // Only the parent and the sibling reached the API.
        assert_eq!(api.create_count(), 2);
    }

    /// A wave only starts once the deeper one has settled, even when the
    /// deeper deletes are slow.
    #[tokio::test(start_paused = true)]
    async fn test_delete_waves_run_in_order() {
        let api = Arc::new(MockApi::new());
        api.seed(vec![
            node("pol-1", "root", "a"),
            node("pol-2", "pol-1", "b"),
            node("pol-3", "pol-2", "c"),
        ]);
        api.delay(|call| call == &Call::Delete(NodeId::new("pol-3")), Duration::from_millis(500));

        let plan = SyncPlan {
            deletes: vec![
                vec![NodeId::new("pol-3")],
                vec![NodeId::new("pol-2")],
                vec![NodeId::new("pol-1")],
            ],
            saves: vec![],
        };
        let outcome = engine(&api, Duration::from_secs(1)).run(&plan).await;

        assert!(outcome.is_clean());
        let order: Vec<Call> = api.calls();
        assert_eq!(
            order,
            vec![
                Call::Delete(NodeId::new("pol-3")),
                Call::Delete(NodeId::new("pol-2")),
                Call::Delete(NodeId::new("pol-1")),
            ]
        );
        assert!(api.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_waited_millis() {
        let api = Arc::new(MockApi::new());
        api.delay(|call| call.role() == Some("parent"), Duration::from_secs(10));

        let plan = SyncPlan {
            deletes: vec![],
            saves: vec![
                save(node("~parent", "root", "parent"), SaveKind::Create),
                save(node("~child", "~parent", "child"), SaveKind::Create),
            ],
        };
        let outcome = engine(&api, Duration::from_millis(1500)).run(&plan).await;

        assert!(outcome.failures[0].reason.contains("1500"));
    }

    #[tokio::test]
    async fn test_failed_delete_is_recorded() {
        let api = Arc::new(MockApi::new());
        api.seed(vec![node("pol-1", "root", "a")]);
        api.reject(|call| matches!(call, Call::Delete(_)));

        let plan = SyncPlan {
            deletes: vec![vec![NodeId::new("pol-1")]],
            saves: vec![],
        };
        let outcome = engine(&api, Duration::from_secs(1)).run(&plan).await;

        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.failures[0].operation, Operation::Delete);
        assert_eq!(outcome.failures[0].kind, FailureKind::RequestFailure);
    }
}
