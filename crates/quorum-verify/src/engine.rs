//! Quorum validator for the approval-policy editor.
//!
//! `QuorumValidator` implements the `Validator` trait from `quorum-core`.
//! Every node is checked in the forest's flat order and all failures are
//! collected before returning, so the editor can mark every offending rule
//! at once:
//!
//! 1. **Quorum**: the identifier set has a non-blank entry, `num_approvers`
//!    is at least one, and a user list names at least `num_approvers` users.
//! 2. **Triggers**: no duplicate `Amount` / `VendorMembership`, distinct
//!    metadata keys, and every required field filled in.
//! 3. **Structure**: every upstream resolves, no upstream cycles, and the
//!    root-level count stays within `max_root_rules`.

use std::collections::HashSet;

use tracing::{debug, warn};

use quorum_contracts::{
    node::{NodeId, PolicyNode},
    rule::IdentifierSource,
    trigger::{TriggerCondition, TriggerKind},
    verify::{ValidationCheck, ValidationFailure, ValidationReport},
};
use quorum_core::{forest::Forest, traits::Validator};

/// The pre-submit gate.
#[derive(Debug, Clone, Default)]
pub struct QuorumValidator {
    /// Overrides the forest's own root cap when set.
    max_root_rules: Option<usize>,
}

impl QuorumValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce at most `max` root-level policies.
    pub fn with_root_cap(max: usize) -> Self {
        Self {
            max_root_rules: Some(max),
        }
    }

    // ── Per-node checks ───────────────────────────────────────────────────────

    fn check_quorum(node: &PolicyNode, out: &mut Vec<(ValidationCheck, String)>) {
        let rule = &node.rule;
        let listed = rule.identifier_source.non_empty_count();

        if listed == 0 {
            out.push((
                ValidationCheck::EmptyIdentifierList,
                format!("{} list has no entries", rule.identifier_source.type_name()),
            ));
        }
        if rule.num_approvers == 0 {
            out.push((
                ValidationCheck::ZeroApprovers,
                "at least one approver is required".to_string(),
            ));
        }
        if let IdentifierSource::UserList(_) = rule.identifier_source {
            if listed > 0 && rule.num_approvers as usize > listed {
                out.push((
                    ValidationCheck::InsufficientUsers,
                    format!(
                        "needs {} approvers but lists only {} user{}",
                        rule.num_approvers,
                        listed,
                        if listed == 1 { "" } else { "s" }
                    ),
                ));
            }
        }
    }

    fn check_triggers(node: &PolicyNode, out: &mut Vec<(ValidationCheck, String)>) {
        let mut kinds: HashSet<TriggerKind> = HashSet::new();
        let mut keys: HashSet<&str> = HashSet::new();

        for (slot, condition) in node.triggers.iter().enumerate() {
            let kind = condition.kind();
            if kind.is_exclusive() && !kinds.insert(kind) {
                out.push((
                    ValidationCheck::DuplicateTrigger,
                    format!("more than one {} condition", kind),
                ));
            }

            if let Some(missing) = missing_field(condition) {
                out.push((
                    ValidationCheck::IncompleteTrigger,
                    format!("condition {} ({}) is missing its {}", slot + 1, kind, missing),
                ));
            }

            if let Some(key) = condition.metadata_key().filter(|k| !k.trim().is_empty()) {
                if !keys.insert(key) {
                    out.push((
                        ValidationCheck::DuplicateMetadataKey,
                        format!("metadata key '{}' is matched more than once", key),
                    ));
                }
            }
        }
    }

    fn check_structure(
        forest: &Forest,
        node: &PolicyNode,
        out: &mut Vec<(ValidationCheck, String)>,
    ) {
        if node.upstream_id.is_root() {
            return;
        }
        if !forest.contains(&node.upstream_id) {
            out.push((
                ValidationCheck::DanglingUpstream,
                format!("upstream policy '{}' no longer exists", node.upstream_id),
            ));
            return;
        }

        let mut seen: HashSet<&NodeId> = HashSet::from([&node.id]);
        let mut cursor = &node.upstream_id;
        while let Some(parent) = forest.get(cursor) {
            if !seen.insert(&parent.id) {
                out.push((
                    ValidationCheck::CyclicUpstream,
                    "upstream chain never reaches the root".to_string(),
                ));
                return;
            }
            cursor = &parent.upstream_id;
        }
    }
}

/// Name of the first required field `condition` leaves blank.
fn missing_field(condition: &TriggerCondition) -> Option<&'static str> {
    match condition {
        TriggerCondition::Amount { currency, .. } if currency.trim().is_empty() => Some("currency"),
        TriggerCondition::VendorMembership { vendor_ids } if vendor_ids.is_empty() => Some("vendors"),
        TriggerCondition::Metadata { key, .. } if key.trim().is_empty() => Some("key"),
        TriggerCondition::Metadata { value, .. } if value.is_empty() => Some("value"),
        _ => None,
    }
}

impl Validator for QuorumValidator {
    fn validate(&self, forest: &Forest) -> ValidationReport {
        let cap = self.max_root_rules.or(forest.max_root_rules());
        let mut failures: Vec<ValidationFailure> = Vec::new();
        let mut roots_seen = 0usize;

        for (node_index, node) in forest.iter().enumerate() {
            let mut found: Vec<(ValidationCheck, String)> = Vec::new();

            Self::check_quorum(node, &mut found);
            Self::check_triggers(node, &mut found);
            Self::check_structure(forest, node, &mut found);

            if node.is_root_level() {
                roots_seen += 1;
                if let Some(max) = cap.filter(|max| roots_seen > *max) {
                    found.push((
                        ValidationCheck::RootCapExceeded,
                        format!("at most {} root-level policies are allowed", max),
                    ));
                }
            }

            for (check, message) in found {
                warn!(node_id = %node.id, ?check, %message, "validation failure");
                failures.push(ValidationFailure {
                    node_index,
                    node_id: node.id.clone(),
                    check,
                    message,
                });
            }
        }

        debug!(
            nodes = forest.len(),
            failure_count = failures.len(),
            "validation complete"
        );
        ValidationReport { failures }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
