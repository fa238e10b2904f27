//! # quorum-verify
//!
//! The pre-submit validation gate for the quorum editor.
//!
//! This crate provides [`engine::QuorumValidator`], which implements the
//! [`quorum_core::traits::Validator`] trait. It checks every node of the
//! edited forest and returns all failures in one report; a report with any
//! failure blocks the submission before the first network call.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use quorum_verify::engine::QuorumValidator;
//!
//! let validator = QuorumValidator::with_root_cap(5);
//! let report = validator.validate(editor.form());
//! for failure in &report.failures {
//!     println!("{failure}");
//! }
//! ```

pub mod engine;

pub use engine::QuorumValidator;
