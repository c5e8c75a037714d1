//! Single-elimination tournaments whose match results reshape each player's team.
//! Library with models, bracket logic and the seams to external services.

pub mod external;
pub mod logic;
pub mod models;

pub use external::{Catalog, MemoryTransport, StaticCatalog, Transport, TransportError};
pub use logic::{
    build_bracket, required_pool_size, ActivityTimeouts, EliminationOrchestrator, MatchSupervisor,
    ResourcePool, SupervisorState, SupervisorVerdict, TeamConstraintEngine,
};
pub use models::{
    BracketEvent, BracketSnapshot, BracketTree, EliminationNode, FormatRules, Item, MatchOutcome,
    MatchView, MatchesByRound, NodeId, NodeState, Placements, Player, PlayerId, PlayerStats, Team,
    TeamChange, TeamState, TournamentConfig, TournamentError, TournamentId, TournamentState,
};
