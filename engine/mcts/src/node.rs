//! MCTS tree node representation.
//!
//! Each node represents a game state reached by taking an action from the parent.
//! Nodes store visit statistics used for UCB selection and policy improvement.

/// Index into the node arena. Using a newtype for type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    #[inline]
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// A node in the MCTS tree.
#[derive(Debug, Clone)]
pub struct MctsNode<S, A> {
    /// Parent node index (NONE for root)
    pub parent: NodeId,

    /// Action that led to this node from parent (None for root)
    pub action: Option<A>,

    /// Game state at this node
    pub state: S,

    /// Number of times this node has been visited
    pub visit_count: u32,

    /// Sum of values backpropagated through this node.
    /// Q(s) = value_sum / visit_count, from the perspective of the player
    /// to move at this node.
    pub value_sum: f32,

    /// Prior probability of reaching this node from its parent.
    pub prior: f32,

    /// Whether this is a terminal state (game over)
    pub is_terminal: bool,

    /// Outcome value for the player to move here (only valid if is_terminal)
    pub terminal_value: f32,

    /// Children in legal-move order. Empty until node is expanded.
    pub children: Vec<(A, NodeId)>,
}

impl<S, A> MctsNode<S, A> {
    /// Create a new root node.
    pub fn new_root(state: S) -> Self {
        Self {
            parent: NodeId::NONE,
            action: None,
            state,
            visit_count: 0,
            value_sum: 0.0,
            prior: 1.0,
            is_terminal: false,
            terminal_value: 0.0,
            children: Vec::new(),
        }
    }

    /// Create a new child node. `terminal_value` is `Some` for game-over states.
    pub fn new_child(
        parent: NodeId,
        action: A,
        prior: f32,
        state: S,
        terminal_value: Option<f32>,
    ) -> Self {
        Self {
            parent,
            action: Some(action),
            state,
            visit_count: 0,
            value_sum: 0.0,
            prior,
            is_terminal: terminal_value.is_some(),
            terminal_value: terminal_value.unwrap_or(0.0),
            children: Vec::new(),
        }
    }

    /// Calculate mean value Q = value_sum / visit_count.
    /// Returns 0.0 if never visited.
    #[inline]
    pub fn mean_value(&self) -> f32 {
        if self.visit_count == 0 {
            0.0
        } else {
            self.value_sum / self.visit_count as f32
        }
    }

    /// UCB score of this node as seen by its parent.
    /// UCB(s,a) = -Q(child) + c_puct * P(s,a) * sqrt(N_parent) / (1 + N(s,a))
    ///
    /// The child's value is stored from the opponent's perspective, so the
    /// parent negates it.
    #[inline]
    pub fn ucb_score(&self, parent_visits_sqrt: f32, c_puct: f32) -> f32 {
        let q = -self.mean_value();
        let u = c_puct * self.prior * parent_visits_sqrt / (1.0 + self.visit_count as f32);
        q + u
    }

    /// Check if this node has been expanded (has children).
    #[inline]
    pub fn is_expanded(&self) -> bool {
        !self.children.is_empty()
    }

    /// Check if this is a leaf node (not expanded or terminal).
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.is_terminal || !self.is_expanded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_none() {
        assert!(NodeId::NONE.is_none());
        assert!(!NodeId::NONE.is_some());
        assert!(NodeId(0).is_some());
    }

    #[test]
    fn test_new_root() {
        let node: MctsNode<u8, u8> = MctsNode::new_root(3);

        assert!(node.parent.is_none());
        assert!(node.action.is_none());
        assert_eq!(node.visit_count, 0);
        assert!((node.prior - 1.0).abs() < 1e-6);
        assert!(!node.is_terminal);
        assert!(node.children.is_empty());
    }

    #[test]
    fn test_new_terminal_child() {
        let node = MctsNode::new_child(NodeId(0), 2u8, 0.5, 7u8, Some(-1.0));
        assert!(node.is_terminal);
        assert_eq!(node.terminal_value, -1.0);
        assert_eq!(node.action, Some(2));
    }

    #[test]
    fn test_mean_value() {
        let mut node: MctsNode<u8, u8> = MctsNode::new_root(0);

        // Unvisited
        assert!((node.mean_value()).abs() < 1e-6);

        node.visit_count = 4;
        node.value_sum = 2.0;
        assert!((node.mean_value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_ucb_score() {
        let mut node = MctsNode::new_child(NodeId(0), 0u8, 0.5, 0u8, None);
        node.visit_count = 10;
        node.value_sum = 5.0; // Q from child's perspective = 0.5

        // UCB = -0.5 + 1.0 * 0.5 * 10 / 11 ≈ -0.0455
        let ucb = node.ucb_score(10.0, 1.0);
        assert!((ucb - (-0.0455)).abs() < 0.01);
    }

    #[test]
    fn test_is_leaf() {
        let mut node: MctsNode<u8, u8> = MctsNode::new_root(0);
        assert!(node.is_leaf());

        node.children.push((0, NodeId(1)));
        assert!(!node.is_leaf());

        // Terminal nodes are always leaves
        let mut terminal = MctsNode::new_child(NodeId(0), 1u8, 1.0, 0u8, Some(0.0));
        terminal.children.push((0, NodeId(1)));
        assert!(terminal.is_leaf());
    }
}
