//! Error types for the approval-policy editor.
//!
//! All fallible operations in the quorum crates return `QuorumResult<T>`.
//! Per-node failures during a submission are not errors of the submission
//! itself; they are collected into `SubmitReport::failures`.

use thiserror::Error;

use crate::{
    node::NodeId,
    trigger::TriggerKind,
    verify::ValidationFailure,
};

/// The unified error type for the quorum editor.
#[derive(Debug, Error)]
pub enum QuorumError {
    /// The validation gate rejected the forest. No network call was made.
    #[error("validation failed: {}", join_failures(.failures))]
    Validation { failures: Vec<ValidationFailure> },

    /// A node waited too long for its parent's server id.
    #[error("policy '{node_id}' timed out after {waited_ms}ms waiting for upstream '{upstream_id}'")]
    DependencyTimeout {
        node_id: NodeId,
        upstream_id: NodeId,
        waited_ms: u64,
    },

    /// A node's parent failed to persist, so the node was never sent.
    #[error("policy '{node_id}' skipped: upstream '{upstream_id}' failed to save")]
    UpstreamFailed { node_id: NodeId, upstream_id: NodeId },

    /// A single API call was rejected by the server or the transport.
    #[error("request failed: {reason}")]
    RequestFailed { reason: String },

    /// Some per-node operations succeeded and others failed.
    #[error("submission partially failed for: {}", join_ids(.failed))]
    PartialFailure { failed: Vec<NodeId> },

    /// Another submission is still in flight.
    #[error("a submission is already in progress")]
    SubmissionInProgress,

    /// The submission was aborted before it settled.
    #[error("submission cancelled")]
    Cancelled,

    /// Adding another root-level policy would exceed the configured cap.
    #[error("at most {max} root-level policies are allowed")]
    RootCapExceeded { max: usize },

    /// The referenced node is not part of the forest.
    #[error("unknown policy '{id}'")]
    UnknownNode { id: NodeId },

    /// A node names a parent that is neither `root` nor in the forest.
    #[error("policy '{node_id}' references unknown upstream '{upstream_id}'")]
    UnknownUpstream { node_id: NodeId, upstream_id: NodeId },

    /// Following upstream links from this node never reaches `root`.
    #[error("policy '{node_id}' is part of an upstream cycle")]
    CyclicUpstream { node_id: NodeId },

    /// The node already carries a condition of this exclusive kind.
    #[error("policy '{node_id}' already has a {kind} condition")]
    DuplicateTrigger { node_id: NodeId, kind: TriggerKind },

    /// Another metadata condition on the node already uses this key.
    #[error("policy '{node_id}' already matches metadata key '{key}'")]
    DuplicateMetadataKey { node_id: NodeId, key: String },

    /// The trigger slot index is out of range.
    #[error("policy '{node_id}' has no trigger slot {slot}")]
    InvalidSlot { node_id: NodeId, slot: usize },

    /// A configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

fn join_failures(failures: &[ValidationFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter().map(NodeId::as_str).collect::<Vec<_>>().join(", ")
}

/// Convenience alias used throughout the quorum crates.
pub type QuorumResult<T> = Result<T, QuorumError>;
