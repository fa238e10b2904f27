//! # quorum-client
//!
//! Implementations of [`quorum_core::traits::PolicyApi`].
//!
//! - [`memory::InMemoryPolicyApi`]: an in-process policy service with
//!   referential integrity, a call log, and injectable faults. Used by the
//!   reference scenarios and tests.
//! - [`http::HttpPolicyApi`]: the JSON/HTTP client for the real service.

pub mod http;
pub mod memory;

pub use http::HttpPolicyApi;
pub use memory::{ApiCall, FaultAction, InMemoryPolicyApi};
