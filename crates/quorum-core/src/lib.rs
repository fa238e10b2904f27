//! # quorum-core
//!
//! The editing and submission engine for hierarchical approval policies.
//!
//! This crate provides:
//! - `Forest`, the editable tree over a flat policy list, and the trigger
//!   slot editing rules in `editing`
//! - The two trait seams (`PolicyApi`, `Validator`)
//! - `SyncPlan` / `SyncEngine`, which turn a form into ordered remote calls
//!   with explicit parent-id resolution
//! - The `Submitter` that gates, runs and reports a submission, and the
//!   `PolicyEditor` session on top of it
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quorum_core::{PolicyEditor, Submitter, config::EditorConfig};
//!
//! let submitter = Submitter::new(api, validator, "entity-1", EditorConfig::default());
//! let mut editor = PolicyEditor::open(submitter).await?;
//! editor.form_mut().add_node(NodeId::root(), vec![], rule)?;
//! let report = editor.submit().await?;
//! ```

pub mod abort;
pub mod config;
pub mod editing;
pub mod forest;
pub mod session;
pub mod submitter;
pub mod sync;
pub mod traits;

#[cfg(test)]
mod testkit;

pub use abort::{abort_pair, AbortHandle, AbortSignal};
pub use forest::Forest;
pub use session::PolicyEditor;
pub use submitter::Submitter;
pub use sync::{SyncEngine, SyncPlan};
