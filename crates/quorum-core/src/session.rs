//! An editing session over one entity's policies.
//!
//! `PolicyEditor` owns the working forest and the last-known server list and
//! keeps them consistent across submissions. After a full success both are
//! replaced by the reloaded server list. After a partial failure (or a
//! clean run whose reload failed) the form
//! keeps every unsaved edit, saved temporary ids are swapped for their
//! server ids, and the server list is patched with what is known to have
//! landed, so a retry only redoes what failed.

use std::collections::BTreeMap;

use tracing::debug;

use quorum_contracts::{
    error::QuorumResult,
    node::{NodeId, PolicyNode},
    report::SubmitReport,
};

use crate::{abort::AbortSignal, forest::Forest, submitter::Submitter};

pub struct PolicyEditor {
    submitter: Submitter,
    form: Forest,
    server: Vec<PolicyNode>,
}

impl PolicyEditor {
    /// Load the entity's policies and start editing them.
    pub async fn open(submitter: Submitter) -> QuorumResult<Self> {
        let server = submitter.load().await?;
        Ok(Self::from_server(submitter, server))
    }

    /// Start editing from an already-fetched server list.
    pub fn from_server(submitter: Submitter, server: Vec<PolicyNode>) -> Self {
        let form = Forest::build(server.clone()).with_root_cap(submitter.config().max_root_rules);
        Self { submitter, form, server }
    }

    pub fn form(&self) -> &Forest {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut Forest {
        &mut self.form
    }

    /// The server list the next submission will be diffed against.
    pub fn server_nodes(&self) -> &[PolicyNode] {
        &self.server
    }

    /// True when the form differs from the server list.
    pub fn is_dirty(&self) -> bool {
        let form: BTreeMap<&NodeId, &PolicyNode> = self.form.iter().map(|n| (&n.id, n)).collect();
        let server: BTreeMap<&NodeId, &PolicyNode> = self.server.iter().map(|n| (&n.id, n)).collect();
        form != server
    }

    /// Throw away every unsaved edit.
    pub fn discard_changes(&mut self) {
        self.form = Forest::build(self.server.clone()).with_root_cap(self.form.max_root_rules());
    }

    /// Re-fetch the server list and reset the form to it.
    pub async fn reload(&mut self) -> QuorumResult<()> {
        self.server = self.submitter.load().await?;
        self.discard_changes();
        Ok(())
    }

    pub async fn submit(&mut self) -> QuorumResult<SubmitReport> {
        self.submit_with_abort(&AbortSignal::never()).await
    }

    /// Submit the form and fold the outcome back into the session.
    ///
    /// Errors leave the session untouched.
    pub async fn submit_with_abort(&mut self, abort: &AbortSignal) -> QuorumResult<SubmitReport> {
        let report = self
            .submitter
            .submit_with_abort(&self.form, &self.server, abort)
            .await?;
        self.absorb(&report);
        Ok(report)
    }

    fn absorb(&mut self, report: &SubmitReport) {
        if let Some(reloaded) = &report.reloaded {
            self.server = reloaded.clone();
            self.discard_changes();
            return;
        }

        self.form.apply_resolved_ids(&report.saved);
        self.server.retain(|node| !report.deleted.contains(&node.id));

        for server_id in report.saved.values() {
            let Some(saved) = self.form.get(server_id) else {
                continue;
            };
            match self.server.iter_mut().find(|node| &node.id == server_id) {
                Some(existing) => *existing = saved.clone(),
                None => self.server.push(saved.clone()),
            }
        }

        debug!(
            entity_id = %self.submitter.entity_id(),
            pending = report.failures.len(),
            "partial submission folded into session"
        );
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quorum_contracts::{node::NodeId, rule::Rule};

    use super::PolicyEditor;
    use crate::config::EditorConfig;
    use crate::submitter::Submitter;
    use crate::testkit::{node, AcceptAll, Call, MockApi};

    fn submitter(api: &Arc<MockApi>) -> Submitter {
        Submitter::new(api.clone(), Arc::new(AcceptAll), "entity-1", EditorConfig::default())
    }

    #[tokio::test]
    async fn test_open_loads_and_is_clean() {
        let api = Arc::new(MockApi::new());
        api.seed(vec![node("pol-1", "root", "a")]);

        let editor = PolicyEditor::open(submitter(&api)).await.unwrap();

        assert_eq!(editor.form().len(), 1);
        assert!(!editor.is_dirty());
    }

    #[tokio::test]
    async fn test_success_replaces_temporary_ids() {
        let api = Arc::new(MockApi::new());
        let mut editor = PolicyEditor::open(submitter(&api)).await.unwrap();

        let parent = editor
            .form_mut()
            .add_node(NodeId::root(), vec![], Rule::roles(1, ["finance"]))
            .unwrap();
        editor
            .form_mut()
            .add_node(parent, vec![], Rule::roles(1, ["cfo"]))
            .unwrap();
        assert!(editor.is_dirty());

        let report = editor.submit().await.unwrap();

        assert!(report.is_success());
        assert!(!editor.is_dirty());
        assert!(editor.form().iter().all(|n| !n.id.is_temporary()));
        assert_eq!(editor.server_nodes().len(), 2);
    }

    #[tokio::test]
    async fn test_partial_failure_retry_only_redoes_failures() {
        let api = Arc::new(MockApi::new());
        api.reject(|call| call.role() == Some("b"));
        let mut editor = PolicyEditor::from_server(submitter(&api), vec![]);

        editor.form_mut().add_node(NodeId::root(), vec![], Rule::roles(1, ["a"])).unwrap();
        let failing = editor
            .form_mut()
            .add_node(NodeId::root(), vec![], Rule::roles(1, ["b"]))
            .unwrap();

        let report = editor.submit().await.unwrap();
        assert!(!report.is_success());

        // The saved node now carries its server id in both views; the failed
        // one is still a temporary form node.
        assert_eq!(editor.server_nodes().len(), 1);
        assert!(editor.form().contains(&failing));
        assert!(editor.form().contains(&editor.server_nodes()[0].id));

        let creates_before = api.create_count();
        let _ = editor.submit().await.unwrap();
        let calls = api.calls();
        // The retry updates the saved node and re-creates only the failed one.
        assert_eq!(api.create_count(), creates_before + 1);
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Update(..))).count(), 1);
    }

    #[tokio::test]
    async fn test_failed_reload_does_not_duplicate_creates() {
        let api = Arc::new(MockApi::new());
        api.seed(vec![node("pol-1", "root", "a")]);
        let mut editor = PolicyEditor::open(submitter(&api)).await.unwrap();

        api.reject(|call| matches!(call, Call::List));
        let auditor = editor
            .form_mut()
            .add_node(NodeId::new("pol-1"), vec![], Rule::roles(1, ["auditor"]))
            .unwrap();

        let first = editor.submit().await.unwrap();
        assert!(first.reload_error.is_some());
        assert!(!editor.form().contains(&auditor));
        assert!(editor.form().iter().all(|n| !n.id.is_temporary()));
        assert_eq!(editor.server_nodes().len(), 2);

        editor.submit().await.unwrap();

        assert_eq!(api.create_count(), 1);
        let auditors = api.records().iter().filter(|r| r.id.as_str() != "pol-1").count();
        assert_eq!(auditors, 1);
        assert!(!editor.is_dirty());
    }

    #[tokio::test]
    async fn test_discard_changes_restores_server_view() {
        let api = Arc::new(MockApi::new());
        api.seed(vec![node("pol-1", "root", "a")]);
        let mut editor = PolicyEditor::open(submitter(&api)).await.unwrap();

        editor.form_mut().remove_node(&NodeId::new("pol-1")).unwrap();
        assert!(editor.is_dirty());

        editor.discard_changes();
        assert!(!editor.is_dirty());
        assert!(api.calls().iter().all(|c| matches!(c, Call::List)));
    }
}
