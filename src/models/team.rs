//! Items, teams and the per-player constraint state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A resource drawn from the shared pool (e.g. a species name).
pub type Item = String;

/// A team in canonical (sorted) order so that equal teams compare equal.
pub type Team = Vec<Item>;

pub const MIN_TEAM_SIZE: usize = 1;
pub const MAX_TEAM_SIZE: usize = 6;

/// Sort a submitted team into canonical order.
pub fn canonical(team: &[Item]) -> Team {
    let mut team = team.to_vec();
    team.sort();
    team
}

/// What changes each round, and whether each change is forced.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TeamChangeRules {
    pub additions: u32,
    pub drops: u32,
    /// Negative values de-volve.
    pub evolutions: i32,
    pub required_addition: bool,
    pub required_drop: bool,
    pub required_evolution: bool,
}

impl TeamChangeRules {
    pub fn has_changes(&self) -> bool {
        self.additions > 0 || self.drops > 0 || self.evolutions != 0
    }
}

/// One round's change, as applied to a player.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct TeamChange {
    pub drops: u32,
    pub additions: u32,
    /// Items the player may choose their additions from.
    pub candidate_choices: Vec<Item>,
    pub evolutions: i32,
}

impl TeamChange {
    /// Net size change of the change.
    pub fn net(&self) -> i64 {
        i64::from(self.additions) - i64::from(self.drops)
    }

    /// Human-readable instruction for the player.
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if self.drops > 0 {
            parts.push(format!("remove {} member(s)", self.drops));
        }
        if self.additions > 0 {
            parts.push(format!(
                "add {} of {}",
                self.additions,
                self.candidate_choices.join(", ")
            ));
        }
        match self.evolutions {
            0 => {}
            e if e > 0 => parts.push(format!("evolve {} member(s)", e)),
            e => parts.push(format!("de-volve {} member(s)", -e)),
        }
        if parts.is_empty() {
            "keep your team".to_string()
        } else {
            parts.join(", then ")
        }
    }
}

/// Constraint state for one player.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TeamState {
    /// The initial allocation.
    pub starting: Vec<Item>,
    /// Every team still consistent with the player's history. Only meaningful while `exact`.
    pub possible_teams: BTreeSet<Team>,
    pub team_change_log: Vec<TeamChange>,
    /// Items the player must always bring (cloaked items).
    pub required_items: Vec<Item>,
    /// Every item the player has had access to.
    pub item_pool: BTreeSet<Item>,
    /// Team sizes still reachable.
    pub allowed_sizes: BTreeSet<usize>,
    /// False once enumeration outgrew its limit; legality then falls back to `item_pool`.
    pub exact: bool,
}

impl TeamState {
    pub fn new(starting: Vec<Item>) -> Self {
        Self {
            item_pool: starting.iter().cloned().collect(),
            allowed_sizes: BTreeSet::from([starting.len()]),
            starting,
            possible_teams: BTreeSet::new(),
            team_change_log: Vec::new(),
            required_items: Vec::new(),
            exact: true,
        }
    }

    /// Starting size plus the net of every logged change, held within team-size bounds.
    pub fn current_size(&self) -> usize {
        let net: i64 = self.team_change_log.iter().map(TeamChange::net).sum();
        let size = self.starting.len() as i64 + net;
        size.clamp(MIN_TEAM_SIZE as i64, MAX_TEAM_SIZE as i64) as usize
    }

    /// The single remaining team, when the history pins it down.
    pub fn known_team(&self) -> Option<&Team> {
        if self.exact && self.possible_teams.len() == 1 {
            self.possible_teams.iter().next()
        } else {
            None
        }
    }
}
