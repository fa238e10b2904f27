//! Scenario 4: Partial Failure and Retry
//!
//! The service rejects one create. Nothing already applied is rolled back;
//! the session keeps the failed edit and the retry only redoes what is left.
//!
//! Walk-through:
//!   1. Add a procurement-lead stage under the vendor rule
//!   2. Add a treasury stage under the large-invoice rule, plus a child of it
//!   3. The service rejects the treasury create once
//!   4. Submit: procurement-lead lands, treasury fails, its child is skipped
//!   5. Retry: only the treasury stage and its child are created

use quorum_client::{ApiCall, FaultAction, InMemoryPolicyApi};
use quorum_contracts::{
    error::QuorumResult,
    node::NodeId,
    report::SubmitReport,
    rule::Rule,
};
use quorum_core::PolicyEditor;

use crate::mock_data::{payables_submitter, render_forest, seeded_api};

pub struct PartialOutcome {
    pub first: SubmitReport,
    pub retry: SubmitReport,
    pub retry_creates: usize,
    pub rendered: String,
}

fn is_treasury_create(call: &ApiCall) -> bool {
    match call {
        ApiCall::Create { request, .. } => {
            let rule: Rule = request.rule.clone().into();
            rule.identifier_source.entries().contains("treasury")
        }
        _ => false,
    }
}

pub async fn play(api: &InMemoryPolicyApi) -> QuorumResult<PartialOutcome> {
    let mut editor = PolicyEditor::open(payables_submitter(api)?).await?;

    let form = editor.form_mut();
    form.add_node(NodeId::new("pol-0104"), vec![], Rule::roles(1, ["procurement-lead"]))?;
    let treasury = form.add_node(NodeId::new("pol-0101"), vec![], Rule::roles(1, ["treasury"]))?;
    form.add_node(treasury, vec![], Rule::users(1, ["u-treasurer"]))?;

    api.inject_times(
        is_treasury_create,
        FaultAction::Reject("HTTP 503: policy service unavailable".to_string()),
        1,
    );

    let first = editor.submit().await?;

    api.clear_calls();
    let retry = editor.submit().await?.into_result()?;
    let retry_creates = api
        .calls()
        .iter()
        .filter(|c| matches!(c, ApiCall::Create { .. }))
        .count();

    Ok(PartialOutcome {
        first,
        retry,
        retry_creates,
        rendered: render_forest(editor.form()),
    })
}

/// Run Scenario 4: Partial Failure and Retry.
pub async fn run_scenario() -> QuorumResult<()> {
    println!("=== Scenario 4: Partial Failure and Retry ===");
    println!();

    let api = seeded_api();
    let outcome = play(&api).await?;

    println!("  First submit:  {}", outcome.first.summary());
    for failure in &outcome.first.failures {
        println!("    - {} [{:?}]: {}", failure.node_id, failure.kind, failure.reason);
    }
    println!();
    println!("  Retry:         {}", outcome.retry.summary());
    println!("                 {} create(s) re-sent", outcome.retry_creates);
    println!();
    println!("  Forest after retry:");
    for line in outcome.rendered.lines() {
        println!("    {}", line);
    }
    println!();
    println!("  Scenario 4 complete.");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use quorum_contracts::report::{FailureKind, SubmitOutcome};

    use super::play;
    use crate::mock_data::{seeded_api, ENTITY_ID};

    #[tokio::test]
    async fn test_rejected_parent_skips_child_and_keeps_sibling() {
        let api = seeded_api();
        let outcome = play(&api).await.unwrap();

        assert_eq!(outcome.first.outcome, SubmitOutcome::PartialFailure);
        let kinds: Vec<FailureKind> = outcome.first.failures.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FailureKind::RequestFailure, FailureKind::UpstreamFailed]);
        // Five updates plus the procurement-lead create went through.
        assert_eq!(outcome.first.saved.len(), 6);
        assert!(outcome.first.reloaded.is_none());
    }

    #[tokio::test]
    async fn test_retry_only_creates_what_failed() {
        let api = seeded_api();
        let outcome = play(&api).await.unwrap();

        assert!(outcome.retry.is_success());
        assert_eq!(outcome.retry_creates, 2);
        assert_eq!(api.policies(ENTITY_ID).len(), 8);
        assert!(!outcome.rendered.contains('~'));
    }
}
