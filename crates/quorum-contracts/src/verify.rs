//! Pre-submit validation report types.
//!
//! The validation gate runs over every node of the edited forest and collects
//! all failures before returning, so the editor can show the full list at
//! once. A report with any failure blocks the whole submission.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::node::NodeId;

/// Which check a node failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationCheck {
    /// The identifier set has no non-blank entry.
    EmptyIdentifierList,
    /// A user list names fewer users than `num_approvers`.
    InsufficientUsers,
    /// `num_approvers` is zero.
    ZeroApprovers,
    /// Two `Amount` or two `VendorMembership` conditions on one node.
    DuplicateTrigger,
    /// Two metadata conditions share a key.
    DuplicateMetadataKey,
    /// A trigger is missing a required field (currency, vendors, key, value).
    IncompleteTrigger,
    /// `upstream_id` names a node that is not in the forest.
    DanglingUpstream,
    /// Following `upstream_id` links never reaches the root.
    CyclicUpstream,
    /// More root-level nodes than `max_root_rules`.
    RootCapExceeded,
}

/// A single failure within a `ValidationReport`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    /// Position of the node in the forest's flat order, starting at 0.
    pub node_index: usize,
    /// The offending node.
    pub node_id: NodeId,
    /// The failed check.
    pub check: ValidationCheck,
    /// Human-readable explanation.
    pub message: String,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule #{} ({}): {}", self.node_index + 1, self.node_id, self.message)
    }
}

/// Outcome of running the validation gate over a forest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Every failure found. Empty on pass.
    pub failures: Vec<ValidationFailure>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// Failures recorded against `node_id`.
    pub fn failures_for<'a>(
        &'a self,
        node_id: &'a NodeId,
    ) -> impl Iterator<Item = &'a ValidationFailure> + 'a {
        self.failures.iter().filter(move |f| &f.node_id == node_id)
    }
}
