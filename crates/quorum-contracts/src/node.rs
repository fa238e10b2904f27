//! Policy node identity and the normalized node type.
//!
//! A node is one stage of an approval chain. Nodes reference their parent by
//! id rather than holding child pointers, so a forest of nodes is just a flat
//! collection plus a derived index (see `quorum_core::forest`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{rule::Rule, trigger::TriggerCondition};

/// Identity of a policy node.
///
/// Three shapes share this type:
/// - the sentinel `"root"`, the virtual ancestor of all top-level nodes;
/// - a *temporary* id minted on the client (`~` followed by a UUID v4);
/// - a *persisted* id assigned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// The virtual ancestor. Never persisted.
    pub const ROOT: &'static str = "root";

    /// Marker prefix distinguishing client-minted ids from server ids.
    pub const TEMPORARY_PREFIX: char = '~';

    /// Wrap any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The `"root"` sentinel.
    pub fn root() -> Self {
        Self(Self::ROOT.to_string())
    }

    /// Mint a fresh temporary id.
    pub fn temporary() -> Self {
        Self(format!("{}{}", Self::TEMPORARY_PREFIX, uuid::Uuid::new_v4()))
    }

    pub fn is_root(&self) -> bool {
        self.0 == Self::ROOT
    }

    /// True for ids minted by `NodeId::temporary()` (or any id carrying the marker).
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(Self::TEMPORARY_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The normalized unit of an approval rule.
///
/// `triggers` are ANDed conditions; an empty list makes the rule
/// unconditional. `upstream_id` is either `"root"` or the id of another node
/// in the same forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyNode {
    /// Temporary or persisted identity.
    pub id: NodeId,
    /// Parent node id, or `"root"`.
    pub upstream_id: NodeId,
    /// Ordered trigger conditions.
    pub triggers: Vec<TriggerCondition>,
    /// The quorum this stage requires.
    pub rule: Rule,
}

impl PolicyNode {
    /// True when this node hangs directly off the virtual root.
    pub fn is_root_level(&self) -> bool {
        self.upstream_id.is_root()
    }

    /// True when the rule applies to every invoice reaching this stage.
    pub fn is_unconditional(&self) -> bool {
        self.triggers.is_empty()
    }
}
