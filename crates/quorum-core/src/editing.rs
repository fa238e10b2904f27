//! Trigger slot editing.
//!
//! A node's triggers are edited slot by slot. Choosing a type for a slot
//! replaces the slot with a blank condition of that type, so no field of the
//! previous type survives. `Amount` and `VendorMembership` may each appear
//! once per node, checked against every other slot regardless of position;
//! metadata keys must be distinct.

use tracing::debug;

use quorum_contracts::{
    error::{QuorumError, QuorumResult},
    node::{NodeId, PolicyNode},
    trigger::{TriggerCondition, TriggerKind},
};

use crate::forest::Forest;

/// The types a user may pick for `slot` of `node`.
///
/// `slot == node.triggers.len()` asks for the options of a new slot.
pub fn available_kinds(node: &PolicyNode, slot: usize) -> Vec<TriggerKind> {
    TriggerKind::ALL
        .into_iter()
        .filter(|kind| !kind.is_exclusive() || !used_elsewhere(&node.triggers, slot, *kind))
        .collect()
}

/// Set the type of `slot`, clearing whatever the slot held before.
///
/// Appends a new slot when `slot` equals the current slot count.
pub fn select_kind(
    forest: &mut Forest,
    id: &NodeId,
    slot: usize,
    kind: TriggerKind,
) -> QuorumResult<()> {
    debug!(node_id = %id, slot, %kind, "selecting trigger kind");
    put(forest, id, slot, TriggerCondition::blank(kind))
}

/// Replace `slot` with a fully specified condition.
pub fn update_trigger(
    forest: &mut Forest,
    id: &NodeId,
    slot: usize,
    condition: TriggerCondition,
) -> QuorumResult<()> {
    put(forest, id, slot, condition)
}

/// Remove `slot`; later slots shift down by one.
pub fn remove_trigger(forest: &mut Forest, id: &NodeId, slot: usize) -> QuorumResult<TriggerCondition> {
    let triggers = forest.triggers_mut(id)?;
    if slot >= triggers.len() {
        return Err(QuorumError::InvalidSlot { node_id: id.clone(), slot });
    }
    Ok(triggers.remove(slot))
}

fn put(forest: &mut Forest, id: &NodeId, slot: usize, condition: TriggerCondition) -> QuorumResult<()> {
    let triggers = forest.triggers_mut(id)?;
    if slot > triggers.len() {
        return Err(QuorumError::InvalidSlot { node_id: id.clone(), slot });
    }

    let kind = condition.kind();
    if kind.is_exclusive() && used_elsewhere(triggers, slot, kind) {
        return Err(QuorumError::DuplicateTrigger { node_id: id.clone(), kind });
    }
    if let Some(key) = condition.metadata_key().filter(|key| !key.is_empty()) {
        let taken = triggers
            .iter()
            .enumerate()
            .any(|(i, other)| i != slot && other.metadata_key() == Some(key));
        if taken {
            return Err(QuorumError::DuplicateMetadataKey {
                node_id: id.clone(),
                key: key.to_string(),
            });
        }
    }

    if slot == triggers.len() {
        triggers.push(condition);
    } else {
        triggers[slot] = condition;
    }
    Ok(())
}

fn used_elsewhere(triggers: &[TriggerCondition], slot: usize, kind: TriggerKind) -> bool {
    triggers
        .iter()
        .enumerate()
        .any(|(i, condition)| i != slot && condition.kind() == kind)
}

// ── Tests ────────────────────────────────────────────────────────────────────
