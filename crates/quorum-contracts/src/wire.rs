//! Server representation of approval policies.
//!
//! The server stores policies as a flat list of records. Each record names
//! its parent through `upstreamPolicyId`; the value `"root"` marks a
//! top-level policy.

use serde::{Deserialize, Serialize};

use crate::{
    node::{NodeId, PolicyNode},
    rule::RulePayload,
    trigger::TriggerCondition,
};

/// One policy as returned by LIST, CREATE, and UPDATE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    /// Server-assigned id.
    pub id: NodeId,
    /// Parent policy id; absent or `"root"` for top-level policies.
    #[serde(default = "NodeId::root")]
    pub upstream_policy_id: NodeId,
    /// Trigger conditions, ANDed.
    #[serde(default)]
    pub trigger: Vec<TriggerCondition>,
    /// The approval rule.
    pub rule: RulePayload,
}

/// What CREATE and UPDATE return.
pub type PolicyResponse = PolicyRecord;

/// Body of CREATE and UPDATE.
///
/// `upstream_policy_id` always carries a *resolved* id: `"root"` or a
/// server-assigned id, never a temporary one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRequest {
    pub upstream_policy_id: NodeId,
    pub trigger: Vec<TriggerCondition>,
    pub rule: RulePayload,
}

impl PolicyRequest {
    /// Build the request for `node`, substituting the resolved parent id.
    pub fn for_node(node: &PolicyNode, resolved_upstream: NodeId) -> Self {
        Self {
            upstream_policy_id: resolved_upstream,
            trigger: node.triggers.clone(),
            rule: RulePayload::from(node.rule.clone()),
        }
    }
}

impl From<PolicyRecord> for PolicyNode {
    fn from(record: PolicyRecord) -> Self {
        PolicyNode {
            id: record.id,
            upstream_id: record.upstream_policy_id,
            triggers: record.trigger,
            rule: record.rule.into(),
        }
    }
}

impl From<&PolicyNode> for PolicyRecord {
    fn from(node: &PolicyNode) -> Self {
        PolicyRecord {
            id: node.id.clone(),
            upstream_policy_id: node.upstream_id.clone(),
            trigger: node.triggers.clone(),
            rule: RulePayload::from(node.rule.clone()),
        }
    }
}
