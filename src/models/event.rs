//! Events emitted to the host and read-only views of the bracket.

use crate::models::node::{NodeId, NodeState};
use crate::models::player::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bracket updates the host can mirror in its own UI.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BracketEvent {
    MatchAvailable(MatchView),
    TournamentEnded { winner: Option<PlayerId> },
}

/// A playable match.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MatchView {
    pub node: NodeId,
    pub round: u32,
    pub player_a: PlayerId,
    pub player_b: PlayerId,
}

/// Current frontier, grouped by round.
pub type MatchesByRound = BTreeMap<u32, Vec<MatchView>>;

/// One node of the bracket as shown to the host.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub children: Option<[NodeId; 2]>,
    pub round: u32,
    pub occupant: Option<PlayerId>,
    pub occupant_name: Option<String>,
    pub state: NodeState,
    pub score: Option<(u32, u32)>,
    pub walkover: bool,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BracketSnapshot {
    pub total_rounds: u32,
    pub root: Option<NodeId>,
    pub byes: Vec<PlayerId>,
    pub nodes: Vec<NodeView>,
}

/// Final standings.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Placements {
    pub winner: Option<PlayerId>,
    pub runner_up: Option<PlayerId>,
    pub semifinalists: Vec<PlayerId>,
}
