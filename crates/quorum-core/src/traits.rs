//! Trait seams of the editor engine.
//!
//! - `PolicyApi`: the remote policy service (untrusted, may fail per call)
//! - `Validator`: the pre-submit gate (pure, runs before any network call)
//!
//! The submitter wires them together: nothing reaches `PolicyApi` unless the
//! validator's report passed.

use async_trait::async_trait;

use quorum_contracts::{
    error::QuorumResult,
    node::NodeId,
    verify::ValidationReport,
    wire::{PolicyRecord, PolicyRequest, PolicyResponse},
};

use crate::forest::Forest;

/// The remote approval-policy service for one or more entities.
///
/// Every method is one network round trip. Implementations report server
/// rejections and transport errors as `QuorumError::RequestFailed`.
#[async_trait]
pub trait PolicyApi: Send + Sync {
    /// Fetch the flat list of policies for `entity_id`.
    async fn list(&self, entity_id: &str) -> QuorumResult<Vec<PolicyRecord>>;

    /// Create a policy. The response carries the server-assigned id.
    async fn create(&self, entity_id: &str, request: &PolicyRequest) -> QuorumResult<PolicyResponse>;

    /// Replace the stored fields of `policy_id`.
    async fn update(
        &self,
        entity_id: &str,
        policy_id: &NodeId,
        request: &PolicyRequest,
    ) -> QuorumResult<PolicyResponse>;

    /// Delete `policy_id`. The server may refuse while children still point at it.
    async fn delete(&self, entity_id: &str, policy_id: &NodeId) -> QuorumResult<()>;
}

/// The validation gate.
///
/// Implementations inspect the whole forest and return every failure found.
/// A report that did not pass blocks the submission with no partial effect.
pub trait Validator: Send + Sync {
    fn validate(&self, forest: &Forest) -> ValidationReport;
}
