//! Quorum rule types.
//!
//! A `Rule` says how many approvals a stage needs and from whom. The
//! identifier source is either a set of roles (any holder may approve) or an
//! explicit set of users.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Where approvers come from.
///
/// Wire shape: `{ "type": "role" | "user", "value": [..] }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum IdentifierSource {
    #[serde(rename = "role")]
    RoleList(BTreeSet<String>),
    #[serde(rename = "user")]
    UserList(BTreeSet<String>),
}

impl IdentifierSource {
    /// Build a role list from any iterator of names.
    pub fn roles<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IdentifierSource::RoleList(names.into_iter().map(Into::into).collect())
    }

    /// Build a user list from any iterator of user ids.
    pub fn users<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        IdentifierSource::UserList(ids.into_iter().map(Into::into).collect())
    }

    /// The raw identifier set, whichever variant holds it.
    pub fn entries(&self) -> &BTreeSet<String> {
        match self {
            IdentifierSource::RoleList(set) | IdentifierSource::UserList(set) => set,
        }
    }

    /// Number of entries that are not blank.
    pub fn non_empty_count(&self) -> usize {
        self.entries().iter().filter(|e| !e.trim().is_empty()).count()
    }

    pub fn is_user_list(&self) -> bool {
        matches!(self, IdentifierSource::UserList(_))
    }

    /// "role" or "user", as used in messages and on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            IdentifierSource::RoleList(_) => "role",
            IdentifierSource::UserList(_) => "user",
        }
    }
}

/// The quorum required to satisfy one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// How many distinct approvals the stage needs. Must be at least 1.
    pub num_approvers: u32,
    /// The approver pool.
    #[serde(rename = "identifierList")]
    pub identifier_source: IdentifierSource,
    /// Whether the server assigns approvers automatically.
    #[serde(default)]
    pub auto_assign: bool,
}

impl Rule {
    /// `num_approvers` approvals from holders of any of `roles`.
    pub fn roles<I, S>(num_approvers: u32, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            num_approvers,
            identifier_source: IdentifierSource::roles(roles),
            auto_assign: false,
        }
    }

    /// `num_approvers` approvals from the listed `users`.
    pub fn users<I, S>(num_approvers: u32, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            num_approvers,
            identifier_source: IdentifierSource::users(users),
            auto_assign: false,
        }
    }
}

/// The rule as the server represents it: internally tagged with `"type"`.
///
/// Only approver rules exist today; the tag keeps room for other rule types
/// the server may add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RulePayload {
    Approver(Rule),
}

impl From<Rule> for RulePayload {
    fn from(rule: Rule) -> Self {
        RulePayload::Approver(rule)
    }
}

impl From<RulePayload> for Rule {
    fn from(payload: RulePayload) -> Self {
        match payload {
            RulePayload::Approver(rule) => rule,
        }
    }
}
