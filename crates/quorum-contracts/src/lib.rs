//! # quorum-contracts
//!
//! Shared types, wire shapes, and contracts for the quorum approval-policy
//! editor.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate: only data definitions, conversions, and error types.

pub mod error;
pub mod node;
pub mod report;
pub mod rule;
pub mod trigger;
pub mod verify;
pub mod wire;
