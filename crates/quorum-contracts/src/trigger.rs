//! Trigger conditions gating a policy node.
//!
//! A node's rule applies to an invoice only if every trigger holds. A node
//! carries at most one `Amount` and one `VendorMembership` condition, and any
//! number of `Metadata` conditions with distinct keys.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single predicate over an invoice.
///
/// JSON shape, as the server stores it:
/// ```json
/// { "type": "amount", "threshold": 10000, "currency": "USD" }
/// { "type": "vendor", "vendorIds": ["v-1", "v-2"] }
/// { "type": "metadata", "key": "department", "value": "ops" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Invoice total is at or above `threshold` (minor units of `currency`).
    Amount {
        threshold: u64,
        /// ISO 4217 code.
        currency: String,
    },

    /// Invoice counterpart is one of `vendor_ids`.
    #[serde(rename = "vendor")]
    VendorMembership {
        #[serde(rename = "vendorIds")]
        vendor_ids: BTreeSet<String>,
    },

    /// Invoice metadata under `key` matches `value`.
    Metadata { key: String, value: MetadataValue },
}

/// Value side of a metadata condition: one string or a set of accepted strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    One(String),
    AnyOf(BTreeSet<String>),
}

impl MetadataValue {
    pub fn is_empty(&self) -> bool {
        match self {
            MetadataValue::One(v) => v.trim().is_empty(),
            MetadataValue::AnyOf(set) => set.iter().all(|v| v.trim().is_empty()),
        }
    }
}

/// The discriminant of a `TriggerCondition`, used by slot editing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Amount,
    VendorMembership,
    Metadata,
}

impl TriggerKind {
    /// Every kind, in the order an option list presents them.
    pub const ALL: [TriggerKind; 3] = [
        TriggerKind::Amount,
        TriggerKind::VendorMembership,
        TriggerKind::Metadata,
    ];

    /// Kinds that may appear at most once per node.
    pub fn is_exclusive(self) -> bool {
        matches!(self, TriggerKind::Amount | TriggerKind::VendorMembership)
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TriggerKind::Amount => "amount",
            TriggerKind::VendorMembership => "vendor",
            TriggerKind::Metadata => "metadata",
        };
        f.write_str(name)
    }
}

impl TriggerCondition {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerCondition::Amount { .. } => TriggerKind::Amount,
            TriggerCondition::VendorMembership { .. } => TriggerKind::VendorMembership,
            TriggerCondition::Metadata { .. } => TriggerKind::Metadata,
        }
    }

    /// A condition of `kind` with every field unset.
    ///
    /// Used when a slot switches type: nothing from the previous variant
    /// survives the switch.
    pub fn blank(kind: TriggerKind) -> Self {
        match kind {
            TriggerKind::Amount => TriggerCondition::Amount {
                threshold: 0,
                currency: String::new(),
            },
            TriggerKind::VendorMembership => TriggerCondition::VendorMembership {
                vendor_ids: BTreeSet::new(),
            },
            TriggerKind::Metadata => TriggerCondition::Metadata {
                key: String::new(),
                value: MetadataValue::One(String::new()),
            },
        }
    }

    /// Convenience constructor for an amount threshold.
    pub fn amount(threshold: u64, currency: impl Into<String>) -> Self {
        TriggerCondition::Amount {
            threshold,
            currency: currency.into(),
        }
    }

    /// Convenience constructor for a vendor set.
    pub fn vendors<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TriggerCondition::VendorMembership {
            vendor_ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Convenience constructor for a single-valued metadata match.
    pub fn metadata(key: impl Into<String>, value: impl Into<String>) -> Self {
        TriggerCondition::Metadata {
            key: key.into(),
            value: MetadataValue::One(value.into()),
        }
    }

    /// The metadata key, if this is a metadata condition.
    pub fn metadata_key(&self) -> Option<&str> {
        match self {
            TriggerCondition::Metadata { key, .. } => Some(key.as_str()),
            _ => None,
        }
    }
}
