//! The editable policy forest.
//!
//! Nodes live in a flat arena keyed by id, in stable insertion order. The
//! `upstream_id → [child ids]` index is derived from the arena and rebuilt
//! after every structural change, so it can never disagree with the nodes.
//! Nothing here talks to the network.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::debug;

use quorum_contracts::{
    error::{QuorumError, QuorumResult},
    node::{NodeId, PolicyNode},
    rule::Rule,
    trigger::TriggerCondition,
};

/// A rooted forest of policy nodes under the virtual `"root"`.
#[derive(Debug, Clone, Default)]
pub struct Forest {
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, PolicyNode>,
    children: HashMap<NodeId, Vec<NodeId>>,
    max_root_rules: Option<usize>,
}

impl Forest {
    /// Build a forest from a flat node list.
    ///
    /// The list is taken as-is: dangling upstream references and cycles are
    /// kept so the validation gate can report them. A repeated id keeps its
    /// first position and its last value.
    pub fn build(nodes: impl IntoIterator<Item = PolicyNode>) -> Self {
        let mut forest = Forest::default();
        for node in nodes {
            if forest.nodes.insert(node.id.clone(), node.clone()).is_none() {
                forest.order.push(node.id);
            }
        }
        forest.reindex();
        forest
    }

    /// Cap the number of root-level nodes `add_node` and `move_node` accept.
    pub fn with_root_cap(mut self, max_root_rules: Option<usize>) -> Self {
        self.max_root_rules = max_root_rules;
        self
    }

    pub fn max_root_rules(&self) -> Option<usize> {
        self.max_root_rules
    }

    /// Every node, in insertion order.
    pub fn flatten(&self) -> Vec<PolicyNode> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PolicyNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Position of `id` in insertion order.
    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.order.iter().position(|candidate| candidate == id)
    }

    pub fn get(&self, id: &NodeId) -> Option<&PolicyNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Direct children of `id` (use `NodeId::root()` for top-level nodes).
    pub fn children(&self, id: &NodeId) -> &[NodeId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn roots(&self) -> &[NodeId] {
        self.children(&NodeId::root())
    }

    pub fn root_count(&self) -> usize {
        self.roots().len()
    }

    /// Depth-first walk from the root, parents before children, with depth
    /// (top-level nodes are depth 0). Nodes not reachable from the root are
    /// left out.
    pub fn walk(&self) -> Vec<(usize, &PolicyNode)> {
        let mut out = Vec::with_capacity(self.len());
        let mut visited: HashSet<&NodeId> = HashSet::new();
        let mut stack: Vec<(usize, &NodeId)> =
            self.roots().iter().rev().map(|id| (0, id)).collect();

        while let Some((depth, id)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            out.push((depth, node));
            for child in self.children(id).iter().rev() {
                stack.push((depth + 1, child));
            }
        }
        out
    }

    /// All nodes below `id`, breadth-first, not including `id` itself.
    pub fn descendants(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut seen: HashSet<NodeId> = HashSet::from([id.clone()]);
        let mut queue: VecDeque<&NodeId> = self.children(id).iter().collect();

        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            out.push(next.clone());
            queue.extend(self.children(next).iter());
        }
        out
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Add a new node under `upstream_id` and return its temporary id.
    ///
    /// Fails with `UnknownNode` if the parent is not in the forest and with
    /// `RootCapExceeded` if a root-level add would pass `max_root_rules`.
    pub fn add_node(
        &mut self,
        upstream_id: NodeId,
        triggers: Vec<TriggerCondition>,
        rule: Rule,
    ) -> QuorumResult<NodeId> {
        if upstream_id.is_root() {
            self.check_root_cap()?;
        } else if !self.contains(&upstream_id) {
            return Err(QuorumError::UnknownNode { id: upstream_id });
        }

        let id = NodeId::temporary();
        debug!(node_id = %id, upstream_id = %upstream_id, "adding policy node");

        self.nodes.insert(
            id.clone(),
            PolicyNode {
                id: id.clone(),
                upstream_id,
                triggers,
                rule,
            },
        );
        self.order.push(id.clone());
        self.reindex();
        Ok(id)
    }

    /// Remove `id` and its whole subtree; returns the removed nodes in
    /// insertion order.
    pub fn remove_node(&mut self, id: &NodeId) -> QuorumResult<Vec<PolicyNode>> {
        if !self.contains(id) {
            return Err(QuorumError::UnknownNode { id: id.clone() });
        }

        let mut doomed: HashSet<NodeId> = self.descendants(id).into_iter().collect();
        doomed.insert(id.clone());

        let mut removed = Vec::with_capacity(doomed.len());
        for candidate in &self.order {
            if doomed.contains(candidate) {
                if let Some(node) = self.nodes.remove(candidate) {
                    removed.push(node);
                }
            }
        }
        self.order.retain(|candidate| !doomed.contains(candidate));
        self.reindex();

        debug!(node_id = %id, removed = removed.len(), "removed policy subtree");
        Ok(removed)
    }

    /// Re-parent `id` under `new_upstream`.
    pub fn move_node(&mut self, id: &NodeId, new_upstream: NodeId) -> QuorumResult<()> {
        let current = match self.nodes.get(id) {
            Some(node) => node.upstream_id.clone(),
            None => return Err(QuorumError::UnknownNode { id: id.clone() }),
        };
        if current == new_upstream {
            return Ok(());
        }

        if new_upstream.is_root() {
            self.check_root_cap()?;
        } else {
            if !self.contains(&new_upstream) {
                return Err(QuorumError::UnknownNode { id: new_upstream });
            }
            if &new_upstream == id || self.descendants(id).contains(&new_upstream) {
                return Err(QuorumError::CyclicUpstream { node_id: id.clone() });
            }
        }

        if let Some(node) = self.nodes.get_mut(id) {
            node.upstream_id = new_upstream;
        }
        self.reindex();
        Ok(())
    }

    /// Replace the rule of `id`.
    pub fn set_rule(&mut self, id: &NodeId, rule: Rule) -> QuorumResult<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| QuorumError::UnknownNode { id: id.clone() })?;
        node.rule = rule;
        Ok(())
    }

    /// Mutable access to the trigger slots of `id`.
    ///
    /// Triggers do not take part in the child index, so editing them needs no
    /// reindex.
    pub fn triggers_mut(&mut self, id: &NodeId) -> QuorumResult<&mut Vec<TriggerCondition>> {
        self.nodes
            .get_mut(id)
            .map(|node| &mut node.triggers)
            .ok_or_else(|| QuorumError::UnknownNode { id: id.clone() })
    }

    /// Swap temporary ids for the server ids in `resolved`, rewriting upstream
    /// references that point at them.
    pub fn apply_resolved_ids(&mut self, resolved: &BTreeMap<NodeId, NodeId>) {
        for (from, to) in resolved {
            if from == to {
                continue;
            }
            if let Some(mut node) = self.nodes.remove(from) {
                node.id = to.clone();
                self.nodes.insert(to.clone(), node);
            }
            for slot in self.order.iter_mut() {
                if slot == from {
                    *slot = to.clone();
                }
            }
        }
        for node in self.nodes.values_mut() {
            if let Some(to) = resolved.get(&node.upstream_id) {
                node.upstream_id = to.clone();
            }
        }
        self.reindex();
    }

    fn check_root_cap(&self) -> QuorumResult<()> {
        match self.max_root_rules {
            Some(max) if self.root_count() >= max => Err(QuorumError::RootCapExceeded { max }),
            _ => Ok(()),
        }
    }

    fn reindex(&mut self) {
        self.children.clear();
        for id in &self.order {
            if let Some(node) = self.nodes.get(id) {
                self.children
                    .entry(node.upstream_id.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashSet};

    use quorum_contracts::{
        error::QuorumError,
        node::{NodeId, PolicyNode},
        rule::Rule,
        trigger::TriggerCondition,
    };

    use super::Forest;

    fn node(id: &str, upstream: &str) -> PolicyNode {
        PolicyNode {
            id: NodeId::new(id),
            upstream_id: NodeId::new(upstream),
            triggers: vec![],
            rule: Rule::roles(1, ["admin"]),
        }
    }

    fn as_set(nodes: &[PolicyNode]) -> HashSet<String> {
        nodes
            .iter()
            .map(|n| serde_json::to_string(n).unwrap())
            .collect()
    }

    /// flatten(build(L)) is set-equal to L, including dangling and cyclic input.
    #[test]
    fn test_build_flatten_round_trip() {
        let lists = vec![
            vec![],
            vec![node("a", "root")],
            vec![node("a", "root"), node("b", "a"), node("c", "a"), node("d", "b")],
            vec![node("c", "b"), node("b", "a"), node("a", "root")],
            vec![node("orphan", "gone"), node("x", "y"), node("y", "x")],
        ];

        for list in lists {
            let forest = Forest::build(list.clone());
            assert_eq!(as_set(&forest.flatten()), as_set(&list));
            assert_eq!(forest.len(), list.len());
        }
    }

    #[test]
    fn test_children_index() {
        let forest = Forest::build(vec![
            node("a", "root"),
            node("b", "a"),
            node("c", "a"),
            node("d", "root"),
        ]);

        assert_eq!(forest.roots(), &[NodeId::new("a"), NodeId::new("d")]);
        assert_eq!(forest.children(&NodeId::new("a")), &[NodeId::new("b"), NodeId::new("c")]);
        assert!(forest.children(&NodeId::new("b")).is_empty());
        assert_eq!(forest.root_count(), 2);
    }

    #[test]
    fn test_walk_visits_parents_first() {
        let forest = Forest::build(vec![
            node("d", "b"),
            node("b", "a"),
            node("a", "root"),
            node("c", "a"),
            node("lost", "nowhere"),
        ]);

        let walked: Vec<(usize, &str)> = forest
            .walk()
            .into_iter()
            .map(|(depth, n)| (depth, n.id.as_str()))
            .collect();

        assert_eq!(walked, vec![(0, "a"), (1, "b"), (2, "d"), (1, "c")]);
    }

    #[test]
    fn test_add_node_mints_temporary_id() {
        let mut forest = Forest::build(vec![node("a", "root")]);
        let id = forest
            .add_node(NodeId::new("a"), vec![TriggerCondition::amount(100, "USD")], Rule::roles(1, ["cfo"]))
            .unwrap();

        assert!(id.is_temporary());
        assert_eq!(forest.children(&NodeId::new("a")), &[id.clone()]);
        assert_eq!(forest.index_of(&id), Some(1));
    }

    #[test]
    fn test_add_node_rejects_unknown_upstream() {
        let mut forest = Forest::default();
        let result = forest.add_node(NodeId::new("missing"), vec![], Rule::roles(1, ["admin"]));

        assert!(matches!(result, Err(QuorumError::UnknownNode { .. })));
        assert!(forest.is_empty());
    }

    /// With max_root_rules = N and N root-level nodes, the (N+1)th is refused.
    #[test]
    fn test_root_cap_enforced() {
        let mut forest =
            Forest::build(vec![node("a", "root"), node("b", "root")]).with_root_cap(Some(2));

        let result = forest.add_node(NodeId::root(), vec![], Rule::roles(1, ["admin"]));
        match result {
            Err(QuorumError::RootCapExceeded { max }) => assert_eq!(max, 2),
            other => panic!("expected RootCapExceeded, got {:?}", other),
        }
        assert_eq!(forest.root_count(), 2);

        // Non-root additions are unaffected by the cap.
        assert!(forest.add_node(NodeId::new("a"), vec![], Rule::roles(1, ["admin"])).is_ok());
    }

    #[test]
    fn test_remove_node_takes_subtree() {
        let mut forest = Forest::build(vec![
            node("a", "root"),
            node("b", "a"),
            node("c", "b"),
            node("d", "root"),
        ]);

        let removed = forest.remove_node(&NodeId::new("b")).unwrap();
        let removed_ids: Vec<&str> = removed.iter().map(|n| n.id.as_str()).collect();

        assert_eq!(removed_ids, vec!["b", "c"]);
        assert_eq!(forest.len(), 2);
        assert!(forest.children(&NodeId::new("a")).is_empty());
    }

    #[test]
    fn test_move_node_rejects_cycles() {
        let mut forest =
            Forest::build(vec![node("a", "root"), node("b", "a"), node("c", "b")]);

        let result = forest.move_node(&NodeId::new("a"), NodeId::new("c"));
        assert!(matches!(result, Err(QuorumError::CyclicUpstream { .. })));

        forest.move_node(&NodeId::new("c"), NodeId::new("a")).unwrap();
        assert_eq!(forest.children(&NodeId::new("a")), &[NodeId::new("b"), NodeId::new("c")]);
    }

    #[test]
    fn test_move_to_root_respects_cap() {
        let mut forest = Forest::build(vec![node("a", "root"), node("b", "a")]).with_root_cap(Some(1));

        let result = forest.move_node(&NodeId::new("b"), NodeId::root());
        assert!(matches!(result, Err(QuorumError::RootCapExceeded { max: 1 })));
    }

    #[test]
    fn test_apply_resolved_ids_rewrites_references() {
        let mut forest = Forest::build(vec![node("~p", "root"), node("~c", "~p"), node("k", "~c")]);

        let mut resolved = BTreeMap::new();
        resolved.insert(NodeId::new("~p"), NodeId::new("pol-0001"));
        resolved.insert(NodeId::new("~c"), NodeId::new("pol-0002"));
        forest.apply_resolved_ids(&resolved);

        assert_eq!(forest.roots(), &[NodeId::new("pol-0001")]);
        assert_eq!(forest.children(&NodeId::new("pol-0001")), &[NodeId::new("pol-0002")]);
        assert_eq!(
            forest.get(&NodeId::new("k")).unwrap().upstream_id,
            NodeId::new("pol-0002")
        );
        assert_eq!(forest.index_of(&NodeId::new("pol-0002")), Some(1));
    }
}
