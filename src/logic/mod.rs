//! Bracket business logic: construction, team constraints, supervision, orchestration.

mod builder;
mod orchestrator;
mod pool;
mod supervisor;
mod team_constraints;

pub use builder::build_bracket;
pub use orchestrator::{EliminationOrchestrator, EventHook};
pub use pool::{
    pool_size_for, required_pool_size, sample_with_budget, tournament_rng, ResourcePool, Sample,
};
pub use supervisor::{
    ActivityTimeouts, MatchSupervisor, SupervisorState, SupervisorVerdict, TimeoutCheck,
};
pub use team_constraints::TeamConstraintEngine;
