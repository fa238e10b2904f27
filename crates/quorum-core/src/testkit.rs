//! Test doubles shared by the engine's unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use quorum_contracts::{
    error::{QuorumError, QuorumResult},
    node::{NodeId, PolicyNode},
    rule::{Rule, RulePayload},
    verify::{ValidationCheck, ValidationFailure, ValidationReport},
    wire::{PolicyRecord, PolicyRequest, PolicyResponse},
};

use crate::{
    forest::Forest,
    traits::{PolicyApi, Validator},
};

/// A trigger-less node; `role` doubles as a readable tag in assertions.
pub(crate) fn node(id: &str, upstream: &str, role: &str) -> PolicyNode {
    PolicyNode {
        id: NodeId::new(id),
        upstream_id: NodeId::new(upstream),
        triggers: vec![],
        rule: Rule::roles(1, [role]),
    }
}

pub(crate) fn role_of(request: &PolicyRequest) -> &str {
    match &request.rule {
        RulePayload::Approver(rule) => rule
            .identifier_source
            .entries()
            .iter()
            .next()
            .map(String::as_str)
            .unwrap_or(""),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    List,
    Create(PolicyRequest),
    Update(NodeId, PolicyRequest),
    Delete(NodeId),
}

impl Call {
    pub(crate) fn role(&self) -> Option<&str> {
        match self {
            Call::Create(request) | Call::Update(_, request) => Some(role_of(request)),
            _ => None,
        }
    }
}

type Matcher = Box<dyn Fn(&Call) -> bool + Send + Sync>;

#[derive(Default)]
struct MockState {
    records: Vec<PolicyRecord>,
    calls: Vec<Call>,
    next_id: u64,
    delays: Vec<(Matcher, Duration)>,
    rejects: Vec<Matcher>,
}

/// In-process `PolicyApi` with per-call delays and rejections.
#[derive(Default)]
pub(crate) struct MockApi {
    state: Mutex<MockState>,
}

impl MockApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seed(&self, nodes: Vec<PolicyNode>) {
        let mut state = self.state.lock().unwrap();
        state.records.extend(nodes.iter().map(PolicyRecord::from));
    }

    pub(crate) fn delay(&self, matcher: impl Fn(&Call) -> bool + Send + Sync + 'static, by: Duration) {
        self.state.lock().unwrap().delays.push((Box::new(matcher), by));
    }

    pub(crate) fn reject(&self, matcher: impl Fn(&Call) -> bool + Send + Sync + 'static) {
        self.state.lock().unwrap().rejects.push(Box::new(matcher));
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn create_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Create(_))).count()
    }

    pub(crate) fn write_count(&self) -> usize {
        self.calls().iter().filter(|c| !matches!(c, Call::List)).count()
    }

    pub(crate) fn records(&self) -> Vec<PolicyRecord> {
        self.state.lock().unwrap().records.clone()
    }

    /// Log the call and report its configured delay and rejection.
    fn enter(&self, call: Call) -> (Option<Duration>, bool) {
        let mut state = self.state.lock().unwrap();
        let delay = state.delays.iter().find(|(m, _)| m(&call)).map(|(_, d)| *d);
        let reject = state.rejects.iter().any(|m| m(&call));
        state.calls.push(call);
        (delay, reject)
    }

    async fn gate(&self, call: Call) -> QuorumResult<()> {
        let (delay, reject) = self.enter(call);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if reject {
            return Err(QuorumError::RequestFailed {
                reason: "rejected by mock".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyApi for MockApi {
    async fn list(&self, _entity_id: &str) -> QuorumResult<Vec<PolicyRecord>> {
        self.gate(Call::List).await?;
        Ok(self.records())
    }

    async fn create(&self, _entity_id: &str, request: &PolicyRequest) -> QuorumResult<PolicyResponse> {
        self.gate(Call::Create(request.clone())).await?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let record = PolicyRecord {
            id: NodeId::new(format!("srv-{}", state.next_id)),
            upstream_policy_id: request.upstream_policy_id.clone(),
            trigger: request.trigger.clone(),
            rule: request.rule.clone(),
        };
        state.records.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        _entity_id: &str,
        policy_id: &NodeId,
        request: &PolicyRequest,
    ) -> QuorumResult<PolicyResponse> {
        self.gate(Call::Update(policy_id.clone(), request.clone())).await?;
        let mut state = self.state.lock().unwrap();
        let record = PolicyRecord {
            id: policy_id.clone(),
            upstream_policy_id: request.upstream_policy_id.clone(),
            trigger: request.trigger.clone(),
            rule: request.rule.clone(),
        };
        match state.records.iter_mut().find(|r| &r.id == policy_id) {
            Some(existing) => *existing = record.clone(),
            None => {
                return Err(QuorumError::RequestFailed {
                    reason: format!("no policy '{}'", policy_id),
                })
            }
        }
        Ok(record)
    }

    async fn delete(&self, _entity_id: &str, policy_id: &NodeId) -> QuorumResult<()> {
        self.gate(Call::Delete(policy_id.clone())).await?;
        self.state.lock().unwrap().records.retain(|r| &r.id != policy_id);
        Ok(())
    }
}

/// Passes every forest.
pub(crate) struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _forest: &Forest) -> ValidationReport {
        ValidationReport::default()
    }
}

/// Fails the first node of every non-empty forest.
pub(crate) struct RejectFirst;

impl Validator for RejectFirst {
    fn validate(&self, forest: &Forest) -> ValidationReport {
        let failures = forest
            .iter()
            .take(1)
            .map(|node| ValidationFailure {
                node_index: 0,
                node_id: node.id.clone(),
                check: ValidationCheck::InsufficientUsers,
                message: "needs 3 approvers but lists 2 users".to_string(),
            })
            .collect();
        ValidationReport { failures }
    }
}
