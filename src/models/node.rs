//! A single bracket slot and the outcome of the match played there.

use serde::{Deserialize, Serialize};

/// Index of a node inside its `BracketTree` arena.
pub type NodeId = usize;

/// Scheduling state of a bracket slot.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    #[default]
    Unscheduled,
    /// Both feeder slots hold occupants; the match can be played.
    Available,
    /// The match has a recorded result (or was voided by a double disqualification).
    Finished,
}

/// Match outcome relative to the first side (children[0] on a node, player A in a report).
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchOutcome {
    Win,
    Loss,
}

impl MatchOutcome {
    /// The same outcome seen from the other side.
    pub fn flip(self) -> Self {
        match self {
            MatchOutcome::Win => MatchOutcome::Loss,
            MatchOutcome::Loss => MatchOutcome::Win,
        }
    }

    /// Index of the winning side (0 or 1).
    pub fn winner_index(self) -> usize {
        match self {
            MatchOutcome::Win => 0,
            MatchOutcome::Loss => 1,
        }
    }

    /// Outcome for which side `index` wins.
    pub fn for_winner_index(index: usize) -> Self {
        if index == 0 {
            MatchOutcome::Win
        } else {
            MatchOutcome::Loss
        }
    }
}

/// One bracket slot. Ownership flows root to leaves through `children`;
/// `parent` is only used to walk upward.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EliminationNode<T> {
    /// Set on seeded leaves and on any node whose match has a winner.
    pub occupant: Option<T>,
    pub children: Option<[NodeId; 2]>,
    pub parent: Option<NodeId>,
    pub state: NodeState,
    pub result: Option<MatchOutcome>,
    /// Score as (children[0], children[1]).
    pub score: Option<(u32, u32)>,
    /// Resolved without play.
    pub walkover: bool,
}

impl<T> EliminationNode<T> {
    pub fn leaf(occupant: T, parent: Option<NodeId>) -> Self {
        Self {
            occupant: Some(occupant),
            children: None,
            parent,
            state: NodeState::Unscheduled,
            result: None,
            score: None,
            walkover: false,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    /// A slot is decided once it holds an occupant or its match is closed, even without a winner.
    pub fn is_decided(&self) -> bool {
        self.occupant.is_some() || self.state == NodeState::Finished
    }
}
