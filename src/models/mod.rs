//! Data structures for the bracket: players, nodes, teams, tournament state.

mod bracket;
mod config;
mod event;
mod node;
mod player;
mod team;
mod tournament;

pub use bracket::{byes_for, rounds_for, BracketTree};
pub use config::{FormatRules, TournamentConfig};
pub use event::{BracketEvent, BracketSnapshot, MatchView, MatchesByRound, NodeView, Placements};
pub use node::{EliminationNode, MatchOutcome, NodeId, NodeState};
pub use player::{Player, PlayerId, PlayerStats};
pub use team::{
    canonical, Item, Team, TeamChange, TeamChangeRules, TeamState, MAX_TEAM_SIZE, MIN_TEAM_SIZE,
};
pub use tournament::{TournamentError, TournamentId, TournamentState};
