//! Player and PlayerStats data structures.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a player (used as bracket occupant and in lookups).
pub type PlayerId = Uuid;

/// Statistics view of a player (for API / display).
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub round: u32,
    pub wins: u32,
    pub walkovers: u32,
    pub eliminated: bool,
    pub disqualification: Option<String>,
}

impl PlayerStats {
    pub fn from_player(p: &Player) -> Self {
        Self {
            round: p.round,
            wins: p.wins,
            walkovers: p.walkovers,
            eliminated: p.eliminated,
            disqualification: p.disqualification.clone(),
        }
    }
}

/// A participant in the bracket.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    /// Current round number. Starts at 1, incremented on each win, walkover or bye.
    pub round: u32,
    /// Matches won on the board (walkovers not included).
    pub wins: u32,
    pub walkovers: u32,
    pub eliminated: bool,
    /// Reason given when the player was disqualified, if they were.
    pub disqualification: Option<String>,
    /// Whether the player has been part of a finished match (played, walked over or lost).
    pub has_played: bool,
}

impl Player {
    /// Create a new player with the given name. Other fields start at their round-1 values.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            round: 1,
            wins: 0,
            walkovers: 0,
            eliminated: false,
            disqualification: None,
            has_played: false,
        }
    }

    /// Current stats as a separate struct (for API responses).
    pub fn stats(&self) -> PlayerStats {
        PlayerStats::from_player(self)
    }

    /// Record a win on the board and advance a round.
    pub fn add_win(&mut self) {
        self.wins += 1;
        self.round += 1;
        self.has_played = true;
    }

    /// Record a win by walkover and advance a round.
    pub fn add_walkover(&mut self) {
        self.walkovers += 1;
        self.round += 1;
        self.has_played = true;
    }

    /// Advance past round 1 without playing.
    pub fn record_bye(&mut self) {
        self.round += 1;
    }

    /// Mark the player as eliminated.
    pub fn eliminate(&mut self) {
        self.eliminated = true;
        self.has_played = true;
    }

    /// Mark the player as eliminated by disqualification. The first reason given sticks.
    pub fn disqualify(&mut self, reason: impl Into<String>) {
        self.eliminated = true;
        if self.disqualification.is_none() {
            self.disqualification = Some(reason.into());
        }
    }
}
