//! Scenario 1: Tiered Approval Chain
//!
//! Builds a brand-new three-stage chain in one submission. Every stage has a
//! temporary id until the server answers, and the top stage's create is held
//! back by the service, so each child must wait for its parent's real id
//! before it can be created.
//!
//! Walk-through:
//!   1. Add a root stage and set its trigger slot by slot
//!   2. Add a director stage under it, then an executive stage under that
//!   3. Submit: the executive and director creates wait on their parents
//!   4. Every create names a server id as its upstream, never a temporary one
//!   5. After the reload the form holds only server ids

use std::time::Duration;

use quorum_client::{ApiCall, FaultAction, InMemoryPolicyApi};
use quorum_contracts::{
    error::QuorumResult,
    node::NodeId,
    report::SubmitReport,
    rule::Rule,
    trigger::{TriggerCondition, TriggerKind},
    wire::PolicyRequest,
};
use quorum_core::{editing, PolicyEditor};

use crate::mock_data::{payables_submitter, render_forest, ENTITY_ID};

/// What the scenario produced, for printing and for tests.
pub struct TieredOutcome {
    pub report: SubmitReport,
    /// Form ids of the manager, director and executive stages.
    pub stages: [NodeId; 3],
    /// Create bodies in the order the service received them.
    pub creates: Vec<PolicyRequest>,
    pub rendered: String,
}

/// Build and submit the chain against `api`.
pub async fn play(api: &InMemoryPolicyApi) -> QuorumResult<TieredOutcome> {
    let mut editor = PolicyEditor::open(payables_submitter(api)?).await?;

    let form = editor.form_mut();
    let manager = form.add_node(NodeId::root(), vec![], Rule::roles(1, ["ap-manager"]))?;
    editing::select_kind(form, &manager, 0, TriggerKind::Amount)?;
    editing::update_trigger(form, &manager, 0, TriggerCondition::amount(1_000_000, "USD"))?;

    let director = form.add_node(
        manager.clone(),
        vec![TriggerCondition::amount(5_000_000, "USD")],
        Rule::roles(1, ["finance-director"]),
    )?;
    let executive = form.add_node(
        director.clone(),
        vec![],
        Rule::users(2, ["u-ceo", "u-cfo", "u-controller"]),
    )?;

    let report = editor.submit().await?.into_result()?;

    let creates = api
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            ApiCall::Create { request, .. } => Some(request),
            _ => None,
        })
        .collect();

    Ok(TieredOutcome {
        report,
        stages: [manager, director, executive],
        creates,
        rendered: render_forest(editor.form()),
    })
}

/// Run Scenario 1: Tiered Approval Chain.
pub async fn run_scenario() -> QuorumResult<()> {
    println!("=== Scenario 1: Tiered Approval Chain ===");
    println!();

    let api = InMemoryPolicyApi::new();
    // Hold the top stage's create so its children are ready first.
    api.inject(
        |call| matches!(call, ApiCall::Create { request, .. } if request.upstream_policy_id.is_root()),
        FaultAction::Delay(Duration::from_millis(250)),
    );

    let outcome = play(&api).await?;

    println!("  Entity:        {}", ENTITY_ID);
    println!("  New stages:    {}", outcome.stages.iter().map(NodeId::as_str).collect::<Vec<_>>().join(" -> "));
    println!();
    println!("  Creates as received by the service:");
    for request in &outcome.creates {
        println!("    POST upstreamPolicyId = {}", request.upstream_policy_id);
    }
    if let Some(first) = outcome.creates.first() {
        let body = serde_json::to_string(first).unwrap_or_default();
        println!();
        println!("  First request body: {}", body);
    }
    println!();
    println!("  Id resolution:");
    for stage in &outcome.stages {
        if let Some(server_id) = outcome.report.saved.get(stage) {
            println!("    {} -> {}", stage, server_id);
        }
    }
    println!();
    println!("  Saved forest:");
    for line in outcome.rendered.lines() {
        println!("    {}", line);
    }
    println!();
    println!("  {}", outcome.report.summary());
    println!();
    println!("  Scenario 1 complete.");
    println!();

    Ok(())
}
