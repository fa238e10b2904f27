//! Accounts-payable reference scenarios.
//!
//! Each scenario is a self-contained module that wires the real editor
//! components (forest, quorum validator, submitter, session) to the
//! in-memory policy service and demonstrates one distinct behavior.

pub mod partial_failure;
pub mod prune_leaf;
pub mod quorum_rejection;
pub mod tiered_approval;
