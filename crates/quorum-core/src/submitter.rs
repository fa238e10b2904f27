//! The submission orchestrator.
//!
//! The submitter enforces the save pipeline:
//!
//!   Guard → Validate → Plan → Delete phase → Save phase → Reload
//!
//! Nothing reaches the `PolicyApi` unless the validator's report passed and
//! no other submission is in flight. Per-node failures do not abort the
//! pipeline; they are collected into the `SubmitReport`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;
use tracing::{debug, info, warn};

use quorum_contracts::{
    error::{QuorumError, QuorumResult},
    node::PolicyNode,
    report::{SubmitOutcome, SubmitReport},
};

use crate::{
    abort::AbortSignal,
    config::EditorConfig,
    forest::Forest,
    sync::{SyncEngine, SyncOutcome, SyncPlan},
    traits::{PolicyApi, Validator},
};

/// Saves one entity's edited forest.
///
/// Clones share the in-flight flag, so at most one submission per submitter
/// family runs at a time.
#[derive(Clone)]
pub struct Submitter {
    api: Arc<dyn PolicyApi>,
    validator: Arc<dyn Validator>,
    entity_id: String,
    config: EditorConfig,
    in_flight: Arc<AtomicBool>,
}

impl Submitter {
    pub fn new(
        api: Arc<dyn PolicyApi>,
        validator: Arc<dyn Validator>,
        entity_id: impl Into<String>,
        config: EditorConfig,
    ) -> Self {
        Self {
            api,
            validator,
            entity_id: entity_id.into(),
            config,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Fetch the server's flat list for this entity.
    pub async fn load(&self) -> QuorumResult<Vec<PolicyNode>> {
        let records = self.api.list(&self.entity_id).await?;
        debug!(entity_id = %self.entity_id, count = records.len(), "policies loaded");
        Ok(records.into_iter().map(PolicyNode::from).collect())
    }

    /// Submit `form` against the last-loaded `server` list.
    pub async fn submit(&self, form: &Forest, server: &[PolicyNode]) -> QuorumResult<SubmitReport> {
        self.submit_with_abort(form, server, &AbortSignal::never()).await
    }

    /// Like `submit`, but gives up with `Cancelled` once `abort` fires.
    ///
    /// # Errors
    ///
    /// - `SubmissionInProgress` if another submission holds the guard
    /// - `Validation` if the gate rejected the forest; no call was made
    /// - `UnknownUpstream` / `CyclicUpstream` if the forest cannot be ordered
    /// - `Cancelled` if aborted; calls already issued are not undone
    ///
    /// Per-node failures are not errors: they yield `Ok` with a
    /// `PartialFailure` report. A failed post-save reload is not one either:
    /// the report carries `reload_error` and no `reloaded` list.
    pub async fn submit_with_abort(
        &self,
        form: &Forest,
        server: &[PolicyNode],
        abort: &AbortSignal,
    ) -> QuorumResult<SubmitReport> {
        let _guard = InFlightGuard::acquire(&self.in_flight)?;
        let started_at = Utc::now();

        // ── Step 1: Validation gate ──────────────────────────────────────────
        let report = self.validator.validate(form);
        if !report.passed() {
            warn!(
                entity_id = %self.entity_id,
                failures = report.failures.len(),
                "submission blocked by validation"
            );
            return Err(QuorumError::Validation { failures: report.failures });
        }

        // ── Step 2: Plan ─────────────────────────────────────────────────────
        let plan = SyncPlan::diff(form, server)?;

        // ── Step 3: Delete and save phases, then reload ──────────────────────
        let engine = SyncEngine::new(
            self.api.clone(),
            self.entity_id.clone(),
            self.config.dependency_timeout(),
        );
        let run = async {
            let outcome = engine.run(&plan).await;
            let reload = if outcome.is_clean() {
                Some(self.load().await)
            } else {
                None
            };
            (outcome, reload)
        };

        let (outcome, reload) = tokio::select! {
            biased;
            _ = abort.aborted() => {
                warn!(entity_id = %self.entity_id, "submission cancelled");
                return Err(QuorumError::Cancelled);
            }
            result = run => result,
        };

        // The writes already landed, so a failed reload must not hide them.
        let (reloaded, reload_error) = match reload {
            Some(Ok(nodes)) => (Some(nodes), None),
            Some(Err(e)) => {
                warn!(entity_id = %self.entity_id, error = %e, "reload after save failed");
                (None, Some(e.to_string()))
            }
            None => (None, None),
        };

        let report = assemble(outcome, reloaded, reload_error, started_at);
        if report.is_success() {
            info!(entity_id = %self.entity_id, "{}", report.summary());
        } else {
            warn!(entity_id = %self.entity_id, "{}", report.summary());
        }
        Ok(report)
    }
}

fn assemble(
    outcome: SyncOutcome,
    reloaded: Option<Vec<PolicyNode>>,
    reload_error: Option<String>,
    started_at: chrono::DateTime<Utc>,
) -> SubmitReport {
    SubmitReport {
        outcome: if outcome.is_clean() {
            SubmitOutcome::Success
        } else {
            SubmitOutcome::PartialFailure
        },
        deleted: outcome.deleted,
        saved: outcome.saved,
        failures: outcome.failures,
        reloaded,
        reload_error,
        started_at,
        finished_at: Utc::now(),
    }
}

/// Holds the in-flight flag for the life of one submission.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> QuorumResult<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| QuorumError::SubmissionInProgress)?;
        Ok(Self { flag: flag.clone() })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
