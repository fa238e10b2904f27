//! # quorum-ref-payables
//!
//! Accounts-payable reference runtime for the quorum approval-policy editor.
//!
//! Demonstrates four editing sessions against mock data:
//!
//! 1. **Tiered Approval Chain**: a new three-stage chain saved in one
//!    submission, with each child waiting for its parent's server id.
//! 2. **Prune a Leaf Stage**: one DELETE, then an idempotent re-submit.
//! 3. **Unsatisfiable Quorum**: the validation gate blocks the submission
//!    before any write.
//! 4. **Partial Failure and Retry**: a rejected create, its skipped child,
//!    and a retry that only redoes what failed.
//!
//! All data is fictional. No external service is contacted.

pub mod mock_data;
pub mod scenarios;
