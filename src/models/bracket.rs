//! Index-arena bracket tree.

use crate::models::node::{EliminationNode, MatchOutcome, NodeId, NodeState};
use serde::{Deserialize, Serialize};

/// Number of rounds needed to reduce `participants` to a single winner.
pub fn rounds_for(participants: usize) -> u32 {
    if participants <= 1 {
        return 0;
    }
    usize::BITS - (participants - 1).leading_zeros()
}

/// Number of first-round byes for a bracket of `participants`.
pub fn byes_for(participants: usize) -> usize {
    if participants <= 1 {
        return 0;
    }
    (1usize << rounds_for(participants)) - participants
}

/// A single-elimination bracket. Nodes live in one vector and refer to each other by index,
/// so tearing the tree down is just clearing the vector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BracketTree<T> {
    nodes: Vec<EliminationNode<T>>,
    root: NodeId,
    pub total_rounds: u32,
    /// Participants who skip round 1.
    pub byes: Vec<T>,
}

impl<T: Clone + PartialEq> BracketTree<T> {
    /// A one-node tree holding `occupant` at the root.
    pub fn with_root(occupant: T) -> Self {
        Self {
            nodes: vec![EliminationNode::leaf(occupant, None)],
            root: 0,
            total_rounds: 0,
            byes: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &EliminationNode<T> {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut EliminationNode<T> {
        &mut self.nodes[id]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        0..self.nodes.len()
    }

    /// Split leaf `target` into a match between its current occupant and `challenger`.
    /// Returns the new (left, right) leaves.
    pub fn split_leaf(&mut self, target: NodeId, challenger: T) -> (NodeId, NodeId) {
        let incumbent = self.nodes[target]
            .occupant
            .take()
            .unwrap_or_else(|| challenger.clone());
        let left = self.nodes.len();
        self.nodes.push(EliminationNode::leaf(incumbent, Some(target)));
        let right = self.nodes.len();
        self.nodes.push(EliminationNode::leaf(challenger, Some(target)));
        self.nodes[target].children = Some([left, right]);
        (left, right)
    }

    /// Distance from the root.
    pub fn depth(&self, id: NodeId) -> u32 {
        let mut depth = 0;
        let mut current = self.nodes[id].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent].parent;
        }
        depth
    }

    /// Round in which the match at `id` is played (the root match is the last round).
    pub fn round_of(&self, id: NodeId) -> u32 {
        self.total_rounds.saturating_sub(self.depth(id))
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        self.node_ids().filter(|&id| self.nodes[id].is_leaf()).collect()
    }

    /// Decided-but-unplayed matches, in arena order.
    pub fn available_nodes(&self) -> Vec<NodeId> {
        self.node_ids()
            .filter(|&id| self.nodes[id].state == NodeState::Available)
            .collect()
    }

    /// Occupants of both children of `id`, if it has children.
    pub fn pairing(&self, id: NodeId) -> Option<(Option<&T>, Option<&T>)> {
        let [left, right] = self.nodes[id].children?;
        Some((
            self.nodes[left].occupant.as_ref(),
            self.nodes[right].occupant.as_ref(),
        ))
    }

    /// The available node whose children hold `a` and `b`, in either order.
    pub fn find_available(&self, a: &T, b: &T) -> Option<NodeId> {
        self.available_nodes().into_iter().find(|&id| {
            matches!(
                self.pairing(id),
                Some((Some(x), Some(y))) if (x == a && y == b) || (x == b && y == a)
            )
        })
    }

    /// The available node that `occupant` is due to play in, if any.
    pub fn available_node_of(&self, occupant: &T) -> Option<NodeId> {
        self.available_nodes().into_iter().find(|&id| {
            matches!(self.pairing(id), Some((x, y)) if x == Some(occupant) || y == Some(occupant))
        })
    }

    /// The node closest to the root that `occupant` currently holds.
    pub fn current_node_of(&self, occupant: &T) -> Option<NodeId> {
        self.node_ids()
            .filter(|&id| self.nodes[id].occupant.as_ref() == Some(occupant))
            .min_by_key(|&id| self.depth(id))
    }

    /// Which side (0 or 1) of `id` holds `occupant`.
    pub fn side_of(&self, id: NodeId, occupant: &T) -> Option<usize> {
        let (left, right) = self.pairing(id)?;
        if left == Some(occupant) {
            Some(0)
        } else if right == Some(occupant) {
            Some(1)
        } else {
            None
        }
    }

    /// Close the match at `id`. The selected child's occupant moves up. Returns the winner.
    pub fn record_result(
        &mut self,
        id: NodeId,
        outcome: MatchOutcome,
        score: Option<(u32, u32)>,
        walkover: bool,
    ) -> Option<T> {
        let children = self.nodes[id].children?;
        let winner = self.nodes[children[outcome.winner_index()]].occupant.clone();
        let node = &mut self.nodes[id];
        node.occupant = winner.clone();
        node.state = NodeState::Finished;
        node.result = Some(outcome);
        node.score = score;
        node.walkover = walkover;
        winner
    }

    /// Close the match at `id` with nobody advancing.
    pub fn record_void(&mut self, id: NodeId) {
        let node = &mut self.nodes[id];
        node.occupant = None;
        node.state = NodeState::Finished;
        node.result = None;
        node.score = None;
        node.walkover = true;
    }

    /// Walk and drop every node.
    pub fn unlink(&mut self) {
        for node in &mut self.nodes {
            node.parent = None;
            node.children = None;
            node.occupant = None;
        }
        self.nodes.clear();
        self.byes.clear();
    }
}
