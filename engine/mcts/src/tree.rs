//! MCTS tree structure with arena allocation.
//!
//! Nodes are stored in a contiguous Vec and referenced by NodeId indices.
//! A tree can be re-rooted onto a descendant so the statistics gathered for
//! the position actually reached survive into the next search.

use std::collections::VecDeque;

use crate::distribution::ActionVisits;
use crate::node::{MctsNode, NodeId};

/// MCTS tree with arena-based node storage.
#[derive(Debug, Clone)]
pub struct MctsTree<S, A> {
    /// Arena storing all nodes
    nodes: Vec<MctsNode<S, A>>,

    /// Root node index (always 0)
    root: NodeId,
}

impl<S: Clone + PartialEq, A: Copy> MctsTree<S, A> {
    /// Create a new tree with the given root state.
    pub fn new(root_state: S) -> Self {
        Self {
            nodes: vec![MctsNode::new_root(root_state)],
            root: NodeId(0),
        }
    }

    /// Get the root node ID.
    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// State at the root
    #[inline]
    pub fn root_state(&self) -> &S {
        &self.get(self.root).state
    }

    /// Get a reference to a node by ID.
    #[inline]
    pub fn get(&self, id: NodeId) -> &MctsNode<S, A> {
        &self.nodes[id.index()]
    }

    /// Get a mutable reference to a node by ID.
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut MctsNode<S, A> {
        &mut self.nodes[id.index()]
    }

    fn allocate(&mut self, node: MctsNode<S, A>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Get the total number of nodes in the tree.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if tree is empty (never true after construction).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Select the child of `node_id` with the highest UCB score.
    ///
    /// Ties keep the earliest child in legal-move order: a later child only
    /// wins with a strictly greater score.
    pub fn select_child(&self, node_id: NodeId, c_puct: f32) -> Option<NodeId> {
        let node = self.get(node_id);
        let parent_visits_sqrt = (node.visit_count as f32).sqrt();

        let mut best: Option<(NodeId, f32)> = None;
        for &(_, child_id) in &node.children {
            let score = self.get(child_id).ucb_score(parent_visits_sqrt, c_puct);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ if score.is_nan() => {}
                _ => best = Some((child_id, score)),
            }
        }
        best.map(|(id, _)| id)
            .or_else(|| node.children.first().map(|&(_, id)| id))
    }

    /// Add a child to a parent node.
    /// Returns the new child's NodeId.
    pub fn add_child(
        &mut self,
        parent_id: NodeId,
        action: A,
        prior: f32,
        state: S,
        terminal_value: Option<f32>,
    ) -> NodeId {
        let child = MctsNode::new_child(parent_id, action, prior, state, terminal_value);
        let child_id = self.allocate(child);
        self.get_mut(parent_id).children.push((action, child_id));
        child_id
    }

    /// Backpropagate a value from a leaf to the root.
    /// Value is negated at each level (opponent's perspective).
    pub fn backpropagate(&mut self, leaf_id: NodeId, value: f32) {
        let mut current_id = leaf_id;
        let mut current_value = value;

        while current_id.is_some() {
            let node = self.get_mut(current_id);
            node.visit_count += 1;
            node.value_sum += current_value;

            current_value = -current_value;
            current_id = node.parent;
        }
    }

    /// Most visited root action, first in legal-move order on ties.
    pub fn best_action(&self) -> Option<(A, u32)> {
        let mut best: Option<(A, u32)> = None;
        for &(action, id) in &self.get(self.root).children {
            let visits = self.get(id).visit_count;
            if best.map_or(true, |(_, v)| visits > v) {
                best = Some((action, visits));
            }
        }
        best
    }

    /// Visit counts and temperature-scaled probabilities of the root children.
    ///
    /// `π(a) ∝ N(a)^(1/τ)`; a temperature below 1e-6 puts all mass on
    /// `best_action`. When no child has been visited the priors are used.
    pub fn root_visits(&self, temperature: f32) -> Vec<ActionVisits<A>> {
        let root = self.get(self.root);
        let mut entries: Vec<ActionVisits<A>> = root
            .children
            .iter()
            .map(|&(action, id)| ActionVisits {
                action,
                visits: self.get(id).visit_count,
                probability: 0.0,
            })
            .collect();

        if entries.is_empty() {
            return entries;
        }

        let total_visits: u32 = entries.iter().map(|e| e.visits).sum();
        if total_visits == 0 {
            for (entry, &(_, id)) in entries.iter_mut().zip(root.children.iter()) {
                entry.probability = self.get(id).prior;
            }
            return entries;
        }

        if temperature < 1e-6 {
            let mut best = 0;
            for (i, entry) in entries.iter().enumerate() {
                if entry.visits > entries[best].visits {
                    best = i;
                }
            }
            entries[best].probability = 1.0;
        } else {
            let weights: Vec<f32> = entries
                .iter()
                .map(|e| {
                    let v = e.visits as f32;
                    if temperature == 1.0 {
                        v
                    } else {
                        v.powf(1.0 / temperature)
                    }
                })
                .collect();
            let total: f32 = weights.iter().sum();
            if total > 0.0 && total.is_finite() {
                for (entry, w) in entries.iter_mut().zip(weights) {
                    entry.probability = w / total;
                }
            } else {
                // Very low temperatures can overflow; fall back to arg-max
                return self.root_visits(0.0);
            }
        }

        entries
    }

    /// Find the node holding `state` within `max_depth` plies of the root.
    pub fn find_descendant(&self, state: &S, max_depth: usize) -> Option<NodeId> {
        let mut queue = VecDeque::from([(self.root, 0usize)]);
        while let Some((id, depth)) = queue.pop_front() {
            let node = self.get(id);
            if &node.state == state {
                return Some(id);
            }
            if depth < max_depth {
                queue.extend(node.children.iter().map(|&(_, c)| (c, depth + 1)));
            }
        }
        None
    }

    /// Copy the subtree under `node` into a fresh arena rooted there.
    pub fn rerooted(&self, node: NodeId) -> Self {
        let old_root = self.get(node);
        let mut root = old_root.clone();
        root.parent = NodeId::NONE;
        root.action = None;
        root.prior = 1.0;
        root.children = Vec::new();

        let mut tree = Self {
            nodes: vec![root],
            root: NodeId(0),
        };

        // (old id, new id) pairs whose children still need copying
        let mut pending = vec![(node, tree.root)];
        while let Some((old_id, new_id)) = pending.pop() {
            for &(action, old_child) in &self.get(old_id).children {
                let mut child = self.get(old_child).clone();
                child.parent = new_id;
                child.children = Vec::new();
                let child_id = tree.allocate(child);
                tree.get_mut(new_id).children.push((action, child_id));
                pending.push((old_child, child_id));
            }
        }

        tree
    }

    /// Get statistics about the tree for debugging.
    pub fn stats(&self) -> TreeStats {
        let root = self.get(self.root);
        TreeStats {
            total_nodes: self.nodes.len(),
            root_visits: root.visit_count,
            root_value: root.mean_value(),
            max_depth: self.compute_max_depth(),
        }
    }

    fn compute_max_depth(&self) -> u32 {
        let mut max_depth = 0;
        let mut stack = vec![(self.root, 0u32)];
        while let Some((id, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            stack.extend(self.get(id).children.iter().map(|&(_, c)| (c, depth + 1)));
        }
        max_depth
    }
}

/// Statistics about an MCTS tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub root_visits: u32,
    pub root_value: f32,
    pub max_depth: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    type Tree = MctsTree<u32, u8>;

    #[test]
    fn test_new_tree() {
        let tree = Tree::new(7);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), NodeId(0));
        assert_eq!(*tree.root_state(), 7);
        assert!(tree.get(tree.root()).parent.is_none());
    }

    #[test]
    fn test_add_child() {
        let mut tree = Tree::new(0);
        let child_id = tree.add_child(tree.root(), 1, 0.5, 1, None);

        assert_eq!(tree.len(), 2);
        assert_eq!(child_id, NodeId(1));

        let root = tree.get(tree.root());
        assert_eq!(root.children, vec![(1, NodeId(1))]);

        let child = tree.get(child_id);
        assert_eq!(child.parent, tree.root());
        assert_eq!(child.action, Some(1));
        assert!((child.prior - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_backpropagate() {
        let mut tree = Tree::new(0);

        let child_id = tree.add_child(tree.root(), 0, 0.5, 1, None);
        let grandchild_id = tree.add_child(child_id, 1, 0.5, 2, None);

        tree.backpropagate(grandchild_id, 1.0);

        assert_eq!(tree.get(grandchild_id).visit_count, 1);
        assert_eq!(tree.get(child_id).visit_count, 1);
        assert_eq!(tree.get(tree.root()).visit_count, 1);

        // Values are negated at each level
        assert!((tree.get(grandchild_id).value_sum - 1.0).abs() < 1e-6);
        assert!((tree.get(child_id).value_sum - (-1.0)).abs() < 1e-6);
        assert!((tree.get(tree.root()).value_sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_select_child_prefers_prior() {
        let mut tree = Tree::new(0);
        tree.add_child(tree.root(), 0, 0.3, 1, None);
        tree.add_child(tree.root(), 1, 0.7, 2, None);
        tree.get_mut(tree.root()).visit_count = 1;

        let best = tree.select_child(tree.root(), 1.0).unwrap();
        assert_eq!(best, NodeId(2));
    }

    #[test]
    fn test_select_child_ties_go_to_first() {
        let mut tree = Tree::new(0);
        for a in 0..4u8 {
            tree.add_child(tree.root(), a, 0.25, a as u32 + 1, None);
        }
        tree.get_mut(tree.root()).visit_count = 1;

        assert_eq!(tree.select_child(tree.root(), 1.0), Some(NodeId(1)));

        // Root never visited: every score is zero, still the first child
        tree.get_mut(tree.root()).visit_count = 0;
        assert_eq!(tree.select_child(tree.root(), 1.0), Some(NodeId(1)));
    }

    #[test]
    fn test_root_visits_temperature() {
        let mut tree = Tree::new(0);
        let c1 = tree.add_child(tree.root(), 0, 0.5, 1, None);
        let c2 = tree.add_child(tree.root(), 1, 0.5, 2, None);
        tree.get_mut(c1).visit_count = 30;
        tree.get_mut(c2).visit_count = 70;

        let visits = tree.root_visits(1.0);
        assert_eq!(visits[0].visits, 30);
        assert!((visits[0].probability - 0.3).abs() < 1e-6);
        assert!((visits[1].probability - 0.7).abs() < 1e-6);

        let greedy = tree.root_visits(0.0);
        assert_eq!(greedy[0].probability, 0.0);
        assert_eq!(greedy[1].probability, 1.0);

        let sharp = tree.root_visits(0.5);
        assert!(sharp[1].probability > 0.7);
    }

    #[test]
    fn test_root_visits_greedy_tie_goes_to_first() {
        let mut tree = Tree::new(0);
        let c1 = tree.add_child(tree.root(), 0, 0.5, 1, None);
        let c2 = tree.add_child(tree.root(), 1, 0.5, 2, None);
        tree.get_mut(c1).visit_count = 5;
        tree.get_mut(c2).visit_count = 5;

        let greedy = tree.root_visits(0.0);
        assert_eq!(greedy[0].probability, 1.0);
        assert_eq!(tree.best_action(), Some((0, 5)));
    }

    #[test]
    fn test_root_visits_fall_back_to_priors() {
        let mut tree = Tree::new(0);
        tree.add_child(tree.root(), 0, 0.25, 1, None);
        tree.add_child(tree.root(), 1, 0.75, 2, None);

        let visits = tree.root_visits(1.0);
        assert!((visits[1].probability - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_find_descendant_and_reroot() {
        let mut tree = Tree::new(0);
        let a = tree.add_child(tree.root(), 0, 0.5, 10, None);
        let b = tree.add_child(tree.root(), 1, 0.5, 20, None);
        let a1 = tree.add_child(a, 0, 1.0, 11, None);
        tree.add_child(a1, 0, 1.0, 12, Some(1.0));
        tree.backpropagate(a1, 0.5);
        tree.backpropagate(b, 0.5);

        assert_eq!(tree.find_descendant(&11, 2), Some(a1));
        assert_eq!(tree.find_descendant(&12, 2), None);
        assert_eq!(tree.find_descendant(&99, 5), None);

        let sub = tree.rerooted(a);
        assert_eq!(sub.len(), 3);
        assert_eq!(*sub.root_state(), 10);
        let root = sub.get(sub.root());
        assert!(root.parent.is_none());
        assert!(root.action.is_none());
        assert_eq!(root.visit_count, 1);

        let (_, child) = root.children[0];
        assert_eq!(sub.get(child).state, 11);
        assert_eq!(sub.get(child).parent, sub.root());
        let (_, leaf) = sub.get(child).children[0];
        assert!(sub.get(leaf).is_terminal);
    }

    #[test]
    fn test_tree_stats() {
        let mut tree = Tree::new(0);
        let c = tree.add_child(tree.root(), 0, 0.5, 1, None);
        tree.add_child(c, 0, 1.0, 2, None);

        let stats = tree.stats();
        assert_eq!(stats.total_nodes, 3);
        assert_eq!(stats.max_depth, 2);
    }
}
