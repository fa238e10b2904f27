//! Submission outcome types.
//!
//! `SubmitReport` is what the submitter returns after the delete and
//! create/update phases settle. Already-applied changes are never rolled
//! back, so a partial failure leaves the server holding a mix of old and new
//! state; the report says exactly which nodes did not make it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node::{NodeId, PolicyNode};

/// The remote call a node needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Why a node's operation did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The server (or transport) rejected the call.
    RequestFailure,
    /// The parent's id did not resolve within the dependency timeout.
    DependencyTimeout,
    /// The parent's own operation failed, so no call was made.
    UpstreamFailed,
}

/// One node that did not reach the server state the form asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    /// The node's id as the form knew it (possibly temporary).
    pub node_id: NodeId,
    pub operation: Operation,
    pub kind: FailureKind,
    /// Human-readable reason, suitable for an itemized notification.
    pub reason: String,
}

/// Aggregate outcome of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Every delete and every create/update succeeded.
    Success,
    /// At least one per-node operation failed.
    PartialFailure,
}

/// Everything the caller needs to render the result and allow a retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitReport {
    pub outcome: SubmitOutcome,
    /// Ids whose delete call succeeded.
    pub deleted: Vec<NodeId>,
    /// Form id → server id for every successful create or update.
    pub saved: BTreeMap<NodeId, NodeId>,
    /// Nodes that did not make it, in plan order.
    pub failures: Vec<NodeFailure>,
    /// The server list fetched after a fully successful submission.
    pub reloaded: Option<Vec<PolicyNode>>,
    /// Why that fetch failed, when every call succeeded but the reload did not.
    #[serde(default)]
    pub reload_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SubmitReport {
    pub fn is_success(&self) -> bool {
        self.outcome == SubmitOutcome::Success
    }

    /// Ids of every failed node, in plan order.
    pub fn failed_ids(&self) -> Vec<NodeId> {
        self.failures.iter().map(|f| f.node_id.clone()).collect()
    }

    /// The single notification line shown for this submission.
    pub fn summary(&self) -> String {
        match self.outcome {
            SubmitOutcome::Success => {
                let mut line = format!(
                    "approval policies saved ({} saved, {} deleted)",
                    self.saved.len(),
                    self.deleted.len()
                );
                if let Some(reason) = &self.reload_error {
                    line.push_str(&format!("; reload failed: {}", reason));
                }
                line
            }
            SubmitOutcome::PartialFailure => {
                let ids = self
                    .failures
                    .iter()
                    .map(|f| f.node_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "approval policies partially saved; {} failed: {}",
                    self.failures.len(),
                    ids
                )
            }
        }
    }

    /// Turn a partial failure into `QuorumError::PartialFailure`.
    pub fn into_result(self) -> crate::error::QuorumResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(crate::error::QuorumError::PartialFailure {
                failed: self.failed_ids(),
            })
        }
    }
}
