//! Scenario 2: Prune a Leaf Stage
//!
//! Removes the executive sign-off at the bottom of the large-invoice chain,
//! then submits the same form a second time.
//!
//! Walk-through:
//!   1. Load the existing five-policy forest
//!   2. Remove `pol-0103` (a leaf) from the form
//!   3. Submit: exactly one DELETE, the four survivors are re-sent unchanged
//!   4. Submit again with no edits: no DELETE, no POST, only identical PATCHes

use quorum_client::{ApiCall, InMemoryPolicyApi};
use quorum_contracts::{error::QuorumResult, node::NodeId, report::SubmitReport};
use quorum_core::PolicyEditor;

use crate::mock_data::{payables_submitter, render_forest, seeded_api};

pub const PRUNED_LEAF: &str = "pol-0103";

pub struct PruneOutcome {
    pub first: SubmitReport,
    pub first_calls: Vec<ApiCall>,
    pub second: SubmitReport,
    pub second_calls: Vec<ApiCall>,
    pub rendered: String,
}

pub async fn play(api: &InMemoryPolicyApi) -> QuorumResult<PruneOutcome> {
    let mut editor = PolicyEditor::open(payables_submitter(api)?).await?;
    editor.form_mut().remove_node(&NodeId::new(PRUNED_LEAF))?;

    api.clear_calls();
    let first = editor.submit().await?.into_result()?;
    let first_calls = api.calls();

    api.clear_calls();
    let second = editor.submit().await?.into_result()?;
    let second_calls = api.calls();

    Ok(PruneOutcome {
        first,
        first_calls,
        second,
        second_calls,
        rendered: render_forest(editor.form()),
    })
}

fn tally(calls: &[ApiCall]) -> (usize, usize, usize) {
    calls.iter().fold((0, 0, 0), |(d, c, u), call| match call {
        ApiCall::Delete { .. } => (d + 1, c, u),
        ApiCall::Create { .. } => (d, c + 1, u),
        ApiCall::Update { .. } => (d, c, u + 1),
        ApiCall::List { .. } => (d, c, u),
    })
}

/// Run Scenario 2: Prune a Leaf Stage.
pub async fn run_scenario() -> QuorumResult<()> {
    println!("=== Scenario 2: Prune a Leaf Stage ===");
    println!();

    let api = seeded_api();
    let outcome = play(&api).await?;

    let (deletes, creates, updates) = tally(&outcome.first_calls);
    println!("  Removed from form:  {}", PRUNED_LEAF);
    println!("  First submit:       {} DELETE, {} POST, {} PATCH", deletes, creates, updates);
    println!("                      {}", outcome.first.summary());

    let (deletes, creates, updates) = tally(&outcome.second_calls);
    println!("  Re-submit:          {} DELETE, {} POST, {} PATCH", deletes, creates, updates);
    println!("                      {}", outcome.second.summary());
    println!();
    println!("  Forest after pruning:");
    for line in outcome.rendered.lines() {
        println!("    {}", line);
    }
    println!();
    println!("  Scenario 2 complete.");
    println!();

    Ok(())
}
