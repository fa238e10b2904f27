//! Scenario 3: Unsatisfiable Quorum
//!
//! Edits that can never be approved are caught before anything is sent.
//!
//! Walk-through:
//!   1. Raise the capex stage to 3 approvers while naming only 2 users
//!   2. Add a vendor stage with no vendors and no approvers
//!   3. Submit: the validation gate lists every problem, node by node
//!   4. The service received no write at all

use quorum_client::InMemoryPolicyApi;
use quorum_contracts::{
    error::{QuorumError, QuorumResult},
    node::NodeId,
    rule::Rule,
    trigger::TriggerCondition,
    verify::ValidationFailure,
};
use quorum_core::PolicyEditor;

use crate::mock_data::{payables_submitter, seeded_api};

pub struct RejectionOutcome {
    pub failures: Vec<ValidationFailure>,
    pub writes: usize,
}

pub async fn play(api: &InMemoryPolicyApi) -> QuorumResult<RejectionOutcome> {
    let mut editor = PolicyEditor::open(payables_submitter(api)?).await?;

    let form = editor.form_mut();
    form.set_rule(&NodeId::new("pol-0105"), Rule::users(3, ["u-cfo", "u-vp-ops"]))?;
    form.add_node(
        NodeId::root(),
        vec![TriggerCondition::vendors(Vec::<String>::new())],
        Rule::roles(1, Vec::<String>::new()),
    )?;

    let failures = match editor.submit().await {
        Err(QuorumError::Validation { failures }) => failures,
        Err(other) => return Err(other),
        Ok(report) => {
            return Err(QuorumError::RequestFailed {
                reason: format!("expected the validation gate to block, got: {}", report.summary()),
            })
        }
    };

    let writes = api.calls().iter().filter(|c| c.is_write()).count();
    Ok(RejectionOutcome { failures, writes })
}

/// Run Scenario 3: Unsatisfiable Quorum.
pub async fn run_scenario() -> QuorumResult<()> {
    println!("=== Scenario 3: Unsatisfiable Quorum ===");
    println!();

    let api = seeded_api();
    let outcome = play(&api).await?;

    println!("  Submission blocked by validation ({} problem(s)):", outcome.failures.len());
    for failure in &outcome.failures {
        println!("    - {}", failure);
    }
    println!();
    println!("  Writes sent to the service: {}", outcome.writes);
    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(())
}
