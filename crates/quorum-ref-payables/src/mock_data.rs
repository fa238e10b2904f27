//! Simulated accounts-payable data for the reference scenarios.
//!
//! All policies, users and vendors here are fictional. The in-memory policy
//! service stands in for the real approval-policy backend.

use std::sync::Arc;

use quorum_client::InMemoryPolicyApi;
use quorum_contracts::{
    error::QuorumResult,
    node::{NodeId, PolicyNode},
    rule::{IdentifierSource, Rule},
    trigger::{MetadataValue, TriggerCondition},
};
use quorum_core::{config::EditorConfig, forest::Forest, Submitter};
use quorum_verify::QuorumValidator;

/// The entity every scenario edits.
pub const ENTITY_ID: &str = "acme-payables";

/// Editor settings used by the scenarios.
pub const PAYABLES_CONFIG: &str = r#"
max_root_rules = 4
dependency_timeout_ms = 2000

[api]
base_url = "http://localhost:8080/v1"
request_timeout_secs = 10
"#;

pub fn payables_config() -> QuorumResult<EditorConfig> {
    EditorConfig::from_toml_str(PAYABLES_CONFIG)
}

// ── Existing policies (mock) ──────────────────────────────────────────────────

/// The policy forest the entity already has on the server:
///
/// ```text
/// pol-0101  amount >= 5000.00 USD           1 of role [ap-manager]
///   pol-0102  amount >= 25000.00 USD        1 of role [finance-director]
///     pol-0103  always                      1 of user [u-cfo, u-controller]
/// pol-0104  vendor in [v-acme-logistics, v-northwind]  1 of role [procurement]
/// pol-0105  department = capex              2 of user [u-cfo, u-controller, u-vp-ops]
/// ```
pub fn existing_policies() -> Vec<PolicyNode> {
    vec![
        policy(
            "pol-0101",
            "root",
            vec![TriggerCondition::amount(500_000, "USD")],
            Rule::roles(1, ["ap-manager"]),
        ),
        policy(
            "pol-0102",
            "pol-0101",
            vec![TriggerCondition::amount(2_500_000, "USD")],
            Rule::roles(1, ["finance-director"]),
        ),
        policy("pol-0103", "pol-0102", vec![], Rule::users(1, ["u-cfo", "u-controller"])),
        policy(
            "pol-0104",
            "root",
            vec![TriggerCondition::vendors(["v-acme-logistics", "v-northwind"])],
            Rule::roles(1, ["procurement"]),
        ),
        policy(
            "pol-0105",
            "root",
            vec![TriggerCondition::metadata("department", "capex")],
            Rule::users(2, ["u-cfo", "u-controller", "u-vp-ops"]),
        ),
    ]
}

fn policy(id: &str, upstream: &str, triggers: Vec<TriggerCondition>, rule: Rule) -> PolicyNode {
    PolicyNode {
        id: NodeId::new(id),
        upstream_id: NodeId::new(upstream),
        triggers,
        rule,
    }
}

/// An in-memory service already holding `existing_policies()`.
pub fn seeded_api() -> InMemoryPolicyApi {
    let api = InMemoryPolicyApi::new();
    api.seed(ENTITY_ID, &existing_policies());
    api
}

/// A submitter for `ENTITY_ID` over `api`, gated by the quorum validator.
pub fn payables_submitter(api: &InMemoryPolicyApi) -> QuorumResult<Submitter> {
    Ok(Submitter::new(
        Arc::new(api.clone()),
        Arc::new(QuorumValidator::new()),
        ENTITY_ID,
        payables_config()?,
    ))
}

// ── Rendering ─────────────────────────────────────────────────────────────────

/// One line per node, indented by depth.
pub fn render_forest(forest: &Forest) -> String {
    forest
        .walk()
        .into_iter()
        .map(|(depth, node)| {
            format!(
                "{}{:<10} {:<44} {}",
                "  ".repeat(depth),
                node.id.as_str(),
                describe_triggers(&node.triggers),
                describe_rule(&node.rule)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn describe_triggers(triggers: &[TriggerCondition]) -> String {
    if triggers.is_empty() {
        return "always".to_string();
    }
    triggers
        .iter()
        .map(|condition| match condition {
            TriggerCondition::Amount { threshold, currency } => {
                format!("amount >= {}.{:02} {}", threshold / 100, threshold % 100, currency)
            }
            TriggerCondition::VendorMembership { vendor_ids } => {
                format!("vendor in [{}]", join(vendor_ids))
            }
            TriggerCondition::Metadata { key, value } => match value {
                MetadataValue::One(v) => format!("{} = {}", key, v),
                MetadataValue::AnyOf(values) => format!("{} in [{}]", key, join(values)),
            },
        })
        .collect::<Vec<_>>()
        .join(" and ")
}

pub fn describe_rule(rule: &Rule) -> String {
    let pool = match &rule.identifier_source {
        IdentifierSource::RoleList(set) => format!("role [{}]", join(set)),
        IdentifierSource::UserList(set) => format!("user [{}]", join(set)),
    };
    format!("{} of {}", rule.num_approvers, pool)
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
    items.into_iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}
