//! Tournament settings. Every field has a default so a partial JSON body is enough.

use crate::models::team::{TeamChangeRules, MAX_TEAM_SIZE, MIN_TEAM_SIZE};
use crate::models::TournamentError;
use serde::{Deserialize, Serialize};

/// Format handed to the species catalog when filtering pools.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct FormatRules {
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub banned: Vec<String>,
}

impl FormatRules {
    pub fn is_banned(&self, item: &str) -> bool {
        self.banned.iter().any(|b| b.eq_ignore_ascii_case(item))
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TournamentConfig {
    #[serde(default = "default_starting_team_size")]
    pub starting_team_size: usize,
    #[serde(default = "default_one")]
    pub additions_per_round: u32,
    #[serde(default = "default_one")]
    pub drops_per_round: u32,
    #[serde(default)]
    pub evolutions_per_round: i32,
    #[serde(default = "default_true")]
    pub required_addition: bool,
    #[serde(default = "default_true")]
    pub required_drop: bool,
    #[serde(default = "default_true")]
    pub required_evolution: bool,
    #[serde(default = "default_min_players")]
    pub min_players: usize,
    #[serde(default = "default_player_cap")]
    pub player_cap: usize,
    /// Starting items each player must always bring. 0 disables cloaked items.
    #[serde(default)]
    pub cloaked_items: usize,
    #[serde(default = "default_activity_warn_secs")]
    pub activity_warn_secs: i64,
    #[serde(default = "default_activity_dq_secs")]
    pub activity_dq_secs: i64,
    #[serde(default = "default_scouting_poll_secs")]
    pub scouting_poll_secs: i64,
    #[serde(default = "default_scouting_retries")]
    pub scouting_retries: u32,
    #[serde(default = "default_liveness_recheck_secs")]
    pub liveness_recheck_secs: i64,
    #[serde(default = "default_possible_teams_limit")]
    pub possible_teams_limit: usize,
    /// Seed for pool shuffling and sampling. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_venue")]
    pub venue: String,
    #[serde(default)]
    pub format: FormatRules,
}

fn default_starting_team_size() -> usize {
    MAX_TEAM_SIZE
}

fn default_one() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_min_players() -> usize {
    2
}

fn default_player_cap() -> usize {
    32
}

fn default_activity_warn_secs() -> i64 {
    90
}

fn default_activity_dq_secs() -> i64 {
    120
}

fn default_scouting_poll_secs() -> i64 {
    10
}

fn default_scouting_retries() -> u32 {
    3
}

fn default_liveness_recheck_secs() -> i64 {
    15
}

fn default_possible_teams_limit() -> usize {
    20_000
}

fn default_venue() -> String {
    "lobby".to_string()
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            starting_team_size: default_starting_team_size(),
            additions_per_round: default_one(),
            drops_per_round: default_one(),
            evolutions_per_round: 0,
            required_addition: true,
            required_drop: true,
            required_evolution: true,
            min_players: default_min_players(),
            player_cap: default_player_cap(),
            cloaked_items: 0,
            activity_warn_secs: default_activity_warn_secs(),
            activity_dq_secs: default_activity_dq_secs(),
            scouting_poll_secs: default_scouting_poll_secs(),
            scouting_retries: default_scouting_retries(),
            liveness_recheck_secs: default_liveness_recheck_secs(),
            possible_teams_limit: default_possible_teams_limit(),
            seed: None,
            venue: default_venue(),
            format: FormatRules::default(),
        }
    }
}

impl TournamentConfig {
    /// Reject settings the engine would otherwise have to clamp.
    pub fn validate(&self) -> Result<(), TournamentError> {
        if !(MIN_TEAM_SIZE..=MAX_TEAM_SIZE).contains(&self.starting_team_size) {
            return Err(TournamentError::InvalidConfig(format!(
                "starting_team_size must be between {} and {}",
                MIN_TEAM_SIZE, MAX_TEAM_SIZE
            )));
        }
        Ok(())
    }

    pub fn change_rules(&self) -> TeamChangeRules {
        TeamChangeRules {
            additions: self.additions_per_round,
            drops: self.drops_per_round,
            evolutions: self.evolutions_per_round,
            required_addition: self.required_addition,
            required_drop: self.required_drop,
            required_evolution: self.required_evolution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let config: TournamentConfig =
            serde_json::from_str(r#"{"starting_team_size": 3, "evolutions_per_round": -1}"#)
                .unwrap();
        assert_eq!(config.starting_team_size, 3);
        assert_eq!(config.evolutions_per_round, -1);
        assert_eq!(config.additions_per_round, 1);
        assert_eq!(config.player_cap, 32);
        assert_eq!(config.venue, "lobby");
        assert!(config.required_drop);
    }

    #[test]
    fn team_size_outside_bounds_is_rejected() {
        let config = TournamentConfig {
            starting_team_size: 0,
            ..TournamentConfig::default()
        };
        assert!(matches!(config.validate(), Err(TournamentError::InvalidConfig(_))));
        let config = TournamentConfig {
            starting_team_size: 7,
            ..TournamentConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(TournamentConfig::default().validate().is_ok());
    }
}
