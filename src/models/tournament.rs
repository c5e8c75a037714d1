//! Tournament identity, phase and errors.

use crate::models::player::PlayerId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors that can occur during tournament operations.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TournamentError {
    /// A result was reported for a pair that is not currently playing.
    NoSuchMatch { player_a: PlayerId, player_b: PlayerId },
    /// A submitted team is not one of the player's possible teams.
    IllegalTeamSubmission { player: PlayerId, summary: Option<String> },
    /// The shared pool cannot supply every entrant at the player cap.
    PoolExhausted { required: usize, available: usize },
    /// Not enough players to start.
    NotEnoughPlayers { required: usize },
    /// Signups are full.
    PlayerCapReached { cap: usize },
    /// A player with this name already exists (names are unique, case-insensitive).
    DuplicatePlayerName,
    PlayerNotFound(PlayerId),
    /// Tournament is not in a state that allows this action.
    InvalidState,
    /// A setting is outside the range the engine supports.
    InvalidConfig(String),
}

impl std::fmt::Display for TournamentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TournamentError::NoSuchMatch { player_a, player_b } => {
                write!(f, "No available match between {} and {}", player_a, player_b)
            }
            TournamentError::IllegalTeamSubmission { summary, .. } => match summary {
                Some(summary) => write!(f, "Illegal team submitted: {}", summary),
                None => write!(f, "Illegal team submitted"),
            },
            TournamentError::PoolExhausted { required, available } => write!(
                f,
                "Resource pool too small: need {} items, have {}",
                required, available
            ),
            TournamentError::NotEnoughPlayers { required } => {
                write!(f, "Need at least {} players to start", required)
            }
            TournamentError::PlayerCapReached { cap } => {
                write!(f, "The tournament is full ({} players)", cap)
            }
            TournamentError::DuplicatePlayerName => write!(f, "A player with this name already exists"),
            TournamentError::PlayerNotFound(_) => write!(f, "Player not found"),
            TournamentError::InvalidState => write!(f, "Invalid state for this action"),
            TournamentError::InvalidConfig(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for TournamentError {}

/// Unique identifier for a tournament.
pub type TournamentId = Uuid;

/// Current phase of the tournament.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentState {
    /// Taking signups; no bracket yet.
    #[default]
    Setup,
    /// Bracket built; matches being played.
    InProgress,
    /// Root match decided (or voided).
    Completed,
    /// Force-ended before completion.
    Cancelled,
}
