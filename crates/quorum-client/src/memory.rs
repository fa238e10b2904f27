//! In-memory implementation of `PolicyApi`.
//!
//! `InMemoryPolicyApi` behaves like the remote policy service for one or more
//! entities: it mints ids, enforces referential integrity between policies,
//! and records every call it receives. Faults can be injected per call to
//! reject or delay matching requests, which is how the reference scenarios
//! and tests exercise partial failures and slow parents.
//!
//! Clones share the same state.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use quorum_contracts::{
    error::{QuorumError, QuorumResult},
    node::{NodeId, PolicyNode},
    wire::{PolicyRecord, PolicyRequest, PolicyResponse},
};
use quorum_core::traits::PolicyApi;

/// One call as the server received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    List {
        entity_id: String,
    },
    Create {
        entity_id: String,
        request: PolicyRequest,
    },
    Update {
        entity_id: String,
        policy_id: NodeId,
        request: PolicyRequest,
    },
    Delete {
        entity_id: String,
        policy_id: NodeId,
    },
}

impl ApiCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, ApiCall::List { .. })
    }

    /// The request body of a create or update.
    pub fn request(&self) -> Option<&PolicyRequest> {
        match self {
            ApiCall::Create { request, .. } | ApiCall::Update { request, .. } => Some(request),
            _ => None,
        }
    }

    /// The addressed policy of an update or delete.
    pub fn policy_id(&self) -> Option<&NodeId> {
        match self {
            ApiCall::Update { policy_id, .. } | ApiCall::Delete { policy_id, .. } => Some(policy_id),
            _ => None,
        }
    }
}

/// What an injected fault does to a matching call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultAction {
    /// Fail the call with `RequestFailed` carrying this reason.
    Reject(String),
    /// Hold the call for this long before handling it.
    Delay(Duration),
}

type CallMatcher = Box<dyn Fn(&ApiCall) -> bool + Send + Sync>;

struct Fault {
    matcher: CallMatcher,
    action: FaultAction,
    /// `None` means the fault never wears off.
    remaining: Option<usize>,
}

// ── Internal mutable state ────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct InMemoryState {
    /// Policies per entity, in creation order.
    pub(crate) entities: BTreeMap<String, Vec<PolicyRecord>>,
    pub(crate) next_id: u64,
    pub(crate) calls: Vec<ApiCall>,
    faults: Vec<Fault>,
}

impl InMemoryState {
    fn mint_id(&mut self) -> NodeId {
        self.next_id += 1;
        NodeId::new(format!("pol-{:04}", self.next_id))
    }

    /// Apply every fault matching `call`, consuming one use of each.
    fn trip(&mut self, call: &ApiCall) -> (Option<Duration>, Option<String>) {
        let mut delay = None;
        let mut reject = None;
        for fault in self.faults.iter_mut().filter(|f| (f.matcher)(call)) {
            match &fault.action {
                FaultAction::Delay(by) => delay = Some(delay.map_or(*by, |d: Duration| d.max(*by))),
                FaultAction::Reject(reason) => {
                    reject.get_or_insert_with(|| reason.clone());
                }
            }
            if let Some(n) = fault.remaining.as_mut() {
                *n = n.saturating_sub(1);
            }
        }
        self.faults.retain(|f| f.remaining != Some(0));
        (delay, reject)
    }
}

// ── Public server ─────────────────────────────────────────────────────────────

/// An in-process approval-policy service.
#[derive(Clone, Default)]
pub struct InMemoryPolicyApi {
    pub(crate) state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryPolicyApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `nodes` for `entity_id` under their own ids, bypassing the call
    /// log and integrity checks.
    pub fn seed(&self, entity_id: &str, nodes: &[PolicyNode]) {
        let mut state = self.state();
        state
            .entities
            .entry(entity_id.to_string())
            .or_default()
            .extend(nodes.iter().map(PolicyRecord::from));
    }

    /// Inject a fault for every call `matcher` accepts.
    pub fn inject(&self, matcher: impl Fn(&ApiCall) -> bool + Send + Sync + 'static, action: FaultAction) {
        self.push_fault(Box::new(matcher), action, None);
    }

    /// Inject a fault that applies to the next `times` matching calls only.
    pub fn inject_times(
        &self,
        matcher: impl Fn(&ApiCall) -> bool + Send + Sync + 'static,
        action: FaultAction,
        times: usize,
    ) {
        self.push_fault(Box::new(matcher), action, Some(times));
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// The stored policies of `entity_id`.
    pub fn policies(&self, entity_id: &str) -> Vec<PolicyRecord> {
        self.state().entities.get(entity_id).cloned().unwrap_or_default()
    }

    fn push_fault(&self, matcher: CallMatcher, action: FaultAction, remaining: Option<usize>) {
        self.state().faults.push(Fault { matcher, action, remaining });
    }

    /// Accessor lock for inspection helpers; a poisoned lock still yields the data.
    fn state(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> QuorumResult<MutexGuard<'_, InMemoryState>> {
        self.state.lock().map_err(|e| QuorumError::RequestFailed {
            reason: format!("policy store lock poisoned: {}", e),
        })
    }

    /// Log `call`, then honour any fault that matches it.
    async fn admit(&self, call: ApiCall) -> QuorumResult<()> {
        let (delay, reject) = {
            let mut state = self.lock()?;
            let tripped = state.trip(&call);
            state.calls.push(call);
            tripped
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match reject {
            Some(reason) => Err(QuorumError::RequestFailed { reason }),
            None => Ok(()),
        }
    }
}

fn rejected(reason: String) -> QuorumError {
    QuorumError::RequestFailed { reason }
}

/// Check that `upstream` exists and that pointing `policy_id` at it would
/// not close a loop.
fn check_upstream(records: &[PolicyRecord], policy_id: Option<&NodeId>, upstream: &NodeId) -> QuorumResult<()> {
    let mut cursor = upstream;
    let mut hops = 0usize;
    while !cursor.is_root() {
        if Some(cursor) == policy_id || hops > records.len() {
            return Err(rejected(format!("upstream '{}' would create a cycle", upstream)));
        }
        hops += 1;
        match records.iter().find(|r| &r.id == cursor) {
            Some(parent) => cursor = &parent.upstream_policy_id,
            None => return Err(rejected(format!("upstream policy '{}' does not exist", cursor))),
        }
    }
    Ok(())
}

// ── PolicyApi impl ────────────────────────────────────────────────────────────

#[async_trait]
impl PolicyApi for InMemoryPolicyApi {
    async fn list(&self, entity_id: &str) -> QuorumResult<Vec<PolicyRecord>> {
        self.admit(ApiCall::List {
            entity_id: entity_id.to_string(),
        })
        .await?;
        let state = self.lock()?;
        Ok(state.entities.get(entity_id).cloned().unwrap_or_default())
    }

    async fn create(&self, entity_id: &str, request: &PolicyRequest) -> QuorumResult<PolicyResponse> {
        self.admit(ApiCall::Create {
            entity_id: entity_id.to_string(),
            request: request.clone(),
        })
        .await?;

        let mut state = self.lock()?;
        let existing = state.entities.get(entity_id).map(Vec::as_slice).unwrap_or_default();
        check_upstream(existing, None, &request.upstream_policy_id)?;

        let record = PolicyRecord {
            id: state.mint_id(),
            upstream_policy_id: request.upstream_policy_id.clone(),
            trigger: request.trigger.clone(),
            rule: request.rule.clone(),
        };
        state
            .entities
            .entry(entity_id.to_string())
            .or_default()
            .push(record.clone());
        debug!(entity_id, policy_id = %record.id, upstream_id = %record.upstream_policy_id, "policy created");
        Ok(record)
    }

    async fn update(
        &self,
        entity_id: &str,
        policy_id: &NodeId,
        request: &PolicyRequest,
    ) -> QuorumResult<PolicyResponse> {
        self.admit(ApiCall::Update {
            entity_id: entity_id.to_string(),
            policy_id: policy_id.clone(),
            request: request.clone(),
        })
        .await?;

        let mut state = self.lock()?;
        let records = state.entities.entry(entity_id.to_string()).or_default();
        check_upstream(records, Some(policy_id), &request.upstream_policy_id)?;

        let Some(existing) = records.iter_mut().find(|r| &r.id == policy_id) else {
            return Err(rejected(format!("policy '{}' not found", policy_id)));
        };
        existing.upstream_policy_id = request.upstream_policy_id.clone();
        existing.trigger = request.trigger.clone();
        existing.rule = request.rule.clone();
        debug!(entity_id, policy_id = %policy_id, "policy updated");
        Ok(existing.clone())
    }

    async fn delete(&self, entity_id: &str, policy_id: &NodeId) -> QuorumResult<()> {
        self.admit(ApiCall::Delete {
            entity_id: entity_id.to_string(),
            policy_id: policy_id.clone(),
        })
        .await?;

        let mut state = self.lock()?;
        let records = state.entities.entry(entity_id.to_string()).or_default();
        if !records.iter().any(|r| &r.id == policy_id) {
            return Err(rejected(format!("policy '{}' not found", policy_id)));
        }
        if records.iter().any(|r| &r.upstream_policy_id == policy_id) {
            return Err(rejected(format!(
                "policy '{}' still has downstream policies",
                policy_id
            )));
        }
        records.retain(|r| &r.id != policy_id);
        info!(entity_id, policy_id = %policy_id, "policy deleted");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
