//! Per-player team constraints: starting allocations, round-by-round changes and legality.
//!
//! Every player carries the set of teams still consistent with what they started with and
//! every change applied since. A change drops members, adds members from a candidate list
//! (normally the beaten opponent's team) and optionally evolves members. The set is the union
//! over every way of making those choices, filtered by the species clause and the catalog's
//! usability rules. If the set would become empty the change is relaxed instead of failing.

use crate::external::{evolution_targets, Catalog};
use crate::logic::pool::{required_pool_size, sample_with_budget, tournament_rng, ResourcePool};
use crate::models::{
    canonical, FormatRules, Item, PlayerId, Team, TeamChange, TeamChangeRules, TeamState,
    TournamentConfig, TournamentError, MAX_TEAM_SIZE, MIN_TEAM_SIZE,
};
use rand::rngs::StdRng;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Shuffles tried before the substitute sampler relaxes its rule.
const SAMPLE_RETRY_BUDGET: usize = 8;

/// Recoverable failure inside a change application. Always resolved by relaxing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ConstraintError {
    EmptyConstraintSet,
}

pub struct TeamConstraintEngine {
    catalog: Arc<dyn Catalog>,
    rules: TeamChangeRules,
    format: FormatRules,
    starting_team_size: usize,
    cloaked_items: usize,
    possible_teams_limit: usize,
    pool: ResourcePool,
    rng: StdRng,
    teams: HashMap<PlayerId, TeamState>,
    /// Pool items drawn as bye candidates, returned with the player's allocation.
    bye_draws: HashMap<PlayerId, Vec<Item>>,
}

impl TeamConstraintEngine {
    pub fn new(catalog: Arc<dyn Catalog>, config: &TournamentConfig) -> Self {
        let mut rng = tournament_rng(config.seed);
        let pool = ResourcePool::new(catalog.legal_pool(&config.format), &mut rng);
        Self {
            catalog,
            rules: config.change_rules(),
            format: config.format.clone(),
            starting_team_size: config.starting_team_size.clamp(MIN_TEAM_SIZE, MAX_TEAM_SIZE),
            cloaked_items: config.cloaked_items,
            possible_teams_limit: config.possible_teams_limit.max(1),
            pool,
            rng,
            teams: HashMap::new(),
            bye_draws: HashMap::new(),
        }
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    pub fn rules(&self) -> &TeamChangeRules {
        &self.rules
    }

    /// Reject a tournament whose pool cannot serve every entrant count it accepts.
    pub fn check_pool(&self, config: &TournamentConfig) -> Result<(), TournamentError> {
        let required = required_pool_size(config);
        let available = self.pool.len();
        if available < required {
            return Err(TournamentError::PoolExhausted {
                required,
                available,
            });
        }
        Ok(())
    }

    pub fn team_state(&self, player: PlayerId) -> Option<&TeamState> {
        self.teams.get(&player)
    }

    pub fn possible_teams(&self, player: PlayerId) -> Option<&BTreeSet<Team>> {
        self.teams.get(&player).map(|s| &s.possible_teams)
    }

    /// Draw a player's starting allocation from the pool.
    pub fn allocate_start(&mut self, player: PlayerId) -> Result<Vec<Item>, TournamentError> {
        let available = self.pool.len();
        let starting = self
            .pool
            .take(self.starting_team_size)
            .ok_or(TournamentError::PoolExhausted {
                required: self.starting_team_size,
                available,
            })?;

        let mut state = TeamState::new(starting.clone());
        state.required_items = starting.iter().take(self.cloaked_items).cloned().collect();
        let options: Vec<Vec<Item>> = starting
            .iter()
            .map(|item| {
                let formes = self.usable_formes(item);
                if formes.is_empty() {
                    vec![item.clone()]
                } else {
                    formes
                }
            })
            .collect();
        for team in cartesian(&options) {
            if state.possible_teams.len() >= self.possible_teams_limit {
                state.exact = false;
                break;
            }
            state.possible_teams.insert(canonical(&team));
        }
        if !state.exact {
            state.possible_teams.clear();
        }
        for team in &state.possible_teams {
            state.item_pool.extend(team.iter().cloned());
        }
        log::debug!(
            "Allocated {} to {} ({} possible team(s))",
            starting.join(", "),
            player,
            state.possible_teams.len()
        );
        self.teams.insert(player, state);
        Ok(starting)
    }

    /// Withdraw a player who has not played yet: their allocation, and any bye candidates
    /// drawn for them, go back to the pool.
    pub fn withdraw(&mut self, player: PlayerId) -> Option<Vec<Item>> {
        let state = self.teams.remove(&player)?;
        self.pool.push_back(state.starting.clone());
        if let Some(drawn) = self.bye_draws.remove(&player) {
            self.pool.push_back(drawn);
        }
        Some(state.starting)
    }

    /// Undo the most recent allocation, restoring the pool's previous order.
    pub fn undo_allocation(&mut self, player: PlayerId) -> Option<Vec<Item>> {
        let state = self.teams.remove(&player)?;
        self.pool.restore(state.starting.clone());
        Some(state.starting)
    }

    /// Apply one round's change to a bye player, with candidates drawn from the pool.
    pub fn apply_bye(&mut self, player: PlayerId) -> Option<TeamChange> {
        let state = self.teams.get(&player)?;
        let (_, additions) = self.change_size(state);
        let candidates = match self.pool.take(additions) {
            Some(drawn) => {
                if !drawn.is_empty() {
                    self.bye_draws.insert(player, drawn.clone());
                }
                drawn
            }
            None => {
                log::warn!("Pool cannot cover bye candidates for {}; sampling substitutes", player);
                self.substitute_candidates(player, additions)
            }
        };
        self.apply_with_candidates(player, candidates)
    }

    /// Apply one round's change to a match winner. Additions are chosen from the
    /// opponent's revealed team when known, otherwise from sampled substitutes.
    pub fn apply_change(
        &mut self,
        player: PlayerId,
        revealed_opponent_team: Option<&[Item]>,
    ) -> Option<TeamChange> {
        let state = self.teams.get(&player)?;
        let (_, additions) = self.change_size(state);
        let candidates = match revealed_opponent_team {
            _ if additions == 0 => Vec::new(),
            Some(team) if !team.is_empty() => team.to_vec(),
            _ => self.substitute_candidates(player, self.starting_team_size.max(additions)),
        };
        self.apply_with_candidates(player, candidates)
    }

    /// Whether `team` is one of the player's possible teams (and carries their cloaked items).
    pub fn is_legal_team(&self, player: PlayerId, team: &[Item]) -> bool {
        let Some(state) = self.teams.get(&player) else {
            return false;
        };
        if state.required_items.iter().any(|r| !team.contains(r)) {
            return false;
        }
        if state.exact {
            state.possible_teams.contains(&canonical(team))
        } else {
            state.allowed_sizes.contains(&team.len())
                && team.iter().all(|i| state.item_pool.contains(i))
                && self.species_clause_ok(team)
                && team.iter().all(|i| self.catalog.is_usable(i, &self.format))
        }
    }

    /// Short operator-facing hint for an illegal team. `None` when the team is legal or
    /// there is nothing to compare against.
    pub fn closest_legal_summary(&self, player: PlayerId, team: &[Item]) -> Option<String> {
        let state = self.teams.get(&player)?;
        if self.is_legal_team(player, team) {
            return None;
        }
        if let Some(missing) = state.required_items.iter().find(|r| !team.contains(*r)) {
            return Some(format!("you must bring {}", missing));
        }
        if !state.allowed_sizes.contains(&team.len()) {
            let sizes: Vec<String> = state.allowed_sizes.iter().map(|s| s.to_string()).collect();
            return Some(format!(
                "bring {} member(s), not {}",
                sizes.join(" or "),
                team.len()
            ));
        }
        if !state.exact {
            let unavailable: Vec<&str> = team
                .iter()
                .filter(|i| !state.item_pool.contains(*i))
                .map(String::as_str)
                .collect();
            if unavailable.is_empty() {
                return Some("your team breaks the species clause".to_string());
            }
            return Some(format!("{} not available to you", unavailable.join(", ")));
        }

        let overlap = |candidate: &Team| candidate.iter().filter(|i| team.contains(*i)).count();
        let best = state.possible_teams.iter().map(overlap).max()?;
        let closest: Vec<&Team> = state
            .possible_teams
            .iter()
            .filter(|t| overlap(t) == best)
            .collect();
        let extra: Vec<&str> = team
            .iter()
            .filter(|i| !closest.iter().any(|t| t.contains(*i)))
            .map(String::as_str)
            .collect();
        let options: BTreeSet<&str> = closest
            .iter()
            .flat_map(|t| t.iter())
            .filter(|i| !team.contains(*i))
            .map(String::as_str)
            .collect();
        let options: Vec<&str> = options.into_iter().collect();
        if extra.is_empty() {
            return Some(format!("use one of {}", options.join(", ")));
        }
        Some(format!(
            "replace {} with one of {}",
            extra.join(", "),
            options.join(", ")
        ))
    }

    /// (drops, additions) for the next change, keeping team size within bounds.
    fn change_size(&self, state: &TeamState) -> (usize, usize) {
        let current = state.current_size();
        let additions = self.rules.additions as usize;
        let floor = if additions > 0 { 0 } else { MIN_TEAM_SIZE };
        let drops = (self.rules.drops as usize).min(current.saturating_sub(floor));
        let additions = additions.min(MAX_TEAM_SIZE.saturating_sub(current - drops));
        (drops, additions)
    }

    fn apply_with_candidates(&mut self, player: PlayerId, candidates: Vec<Item>) -> Option<TeamChange> {
        let mut state = self.teams.remove(&player)?;
        let (drops, additions) = self.change_size(&state);
        let mut change = TeamChange {
            drops: drops as u32,
            additions: additions as u32,
            candidate_choices: if additions > 0 { candidates } else { Vec::new() },
            evolutions: self.rules.evolutions,
        };

        let was_exact = state.exact;
        if was_exact {
            let teams = match self.transform(&state, &change) {
                Ok(teams) => teams,
                Err(ConstraintError::EmptyConstraintSet) => {
                    log::warn!(
                        "No legal team for {} after the change; offering substitute candidates",
                        player
                    );
                    change.candidate_choices = if additions > 0 {
                        self.substitute_candidates_for(&state, self.starting_team_size.max(additions))
                    } else {
                        Vec::new()
                    };
                    match self.transform(&state, &change) {
                        Ok(teams) => teams,
                        Err(ConstraintError::EmptyConstraintSet) => {
                            log::warn!("Skipping this round's change for {}", player);
                            change.drops = 0;
                            change.additions = 0;
                            change.evolutions = 0;
                            change.candidate_choices.clear();
                            state.possible_teams.clone()
                        }
                    }
                }
            };
            self.store_teams(&mut state, teams);
        }
        if !was_exact {
            self.widen(&mut state, &change);
        }
        let usable: Vec<Item> = change
            .candidate_choices
            .iter()
            .flat_map(|i| self.usable_formes(i))
            .collect();
        state.item_pool.extend(usable);

        log::debug!(
            "{}: {} ({} possible team(s))",
            player,
            change.describe(),
            state.possible_teams.len()
        );
        state.team_change_log.push(change.clone());
        self.teams.insert(player, state);
        Some(change)
    }

    fn store_teams(&self, state: &mut TeamState, teams: BTreeSet<Team>) {
        if teams.len() > self.possible_teams_limit {
            log::warn!(
                "Possible teams exceeded {}; switching to item-pool legality",
                self.possible_teams_limit
            );
            for team in &teams {
                state.item_pool.extend(team.iter().cloned());
            }
            state.allowed_sizes = teams.iter().map(Vec::len).collect();
            state.possible_teams.clear();
            state.exact = false;
            return;
        }
        state.allowed_sizes = teams.iter().map(Vec::len).collect();
        for team in &teams {
            state.item_pool.extend(team.iter().cloned());
        }
        state.possible_teams = teams;
    }

    /// Relaxed bookkeeping once enumeration is off: track reachable sizes and items only.
    fn widen(&self, state: &mut TeamState, change: &TeamChange) {
        let drop_counts = counts(change.drops as usize, self.rules.required_drop);
        let add_counts = counts(change.additions as usize, self.rules.required_addition);
        let mut sizes = BTreeSet::new();
        for &size in &state.allowed_sizes {
            for &d in &drop_counts {
                for &a in &add_counts {
                    let next = (size + a).saturating_sub(d);
                    if (MIN_TEAM_SIZE..=MAX_TEAM_SIZE).contains(&next) && d <= size {
                        sizes.insert(next);
                    }
                }
            }
        }
        if !sizes.is_empty() {
            state.allowed_sizes = sizes;
        }
        for item in &change.candidate_choices {
            state.item_pool.extend(self.usable_formes(item));
        }
        if change.evolutions != 0 {
            let targets: Vec<Item> = state
                .item_pool
                .iter()
                .flat_map(|i| evolution_targets(self.catalog.as_ref(), i, change.evolutions))
                .collect();
            state.item_pool.extend(targets);
        }
    }

    /// Apply drops, additions and evolutions to every possible team.
    fn transform(
        &self,
        state: &TeamState,
        change: &TeamChange,
    ) -> Result<BTreeSet<Team>, ConstraintError> {
        let drop_counts = counts(change.drops as usize, self.rules.required_drop);
        let add_counts = counts(change.additions as usize, self.rules.required_addition);
        let candidates: Vec<Item> = dedup(&change.candidate_choices);
        // Enumeration stops a little past the limit; store_teams then switches modes.
        let ceiling = self.possible_teams_limit.saturating_add(1);

        let mut changed = BTreeSet::new();
        'teams: for team in &state.possible_teams {
            let droppable: Vec<Item> = team
                .iter()
                .filter(|i| !state.required_items.contains(*i))
                .cloned()
                .collect();
            let fixed: Vec<Item> = team
                .iter()
                .filter(|i| state.required_items.contains(*i))
                .cloned()
                .collect();
            for &d in &drop_counts {
                if d > droppable.len() {
                    continue;
                }
                for kept_free in combinations(&droppable, droppable.len() - d) {
                    let mut kept = fixed.clone();
                    kept.extend(kept_free);
                    for &a in &add_counts {
                        let size = kept.len() + a;
                        if !(MIN_TEAM_SIZE..=MAX_TEAM_SIZE).contains(&size) {
                            continue;
                        }
                        for added in combinations(&candidates, a) {
                            let options: Vec<Vec<Item>> =
                                added.iter().map(|i| self.usable_formes(i)).collect();
                            for expansion in cartesian(&options) {
                                let mut next = kept.clone();
                                next.extend(expansion);
                                if self.species_clause_ok(&next) {
                                    changed.insert(canonical(&next));
                                }
                            }
                        }
                    }
                    if changed.len() > ceiling {
                        break 'teams;
                    }
                }
            }
        }

        if changed.is_empty() {
            return Err(ConstraintError::EmptyConstraintSet);
        }
        if change.evolutions == 0 {
            return Ok(changed);
        }
        Ok(self.evolve(&changed, &state.required_items, change.evolutions))
    }

    /// Replace `|evolutions|` members of every team by an evolution step. Teams that
    /// cannot comply are dropped; if none can, each team evolves as many members as it can.
    fn evolve(&self, teams: &BTreeSet<Team>, required: &[Item], evolutions: i32) -> BTreeSet<Team> {
        let count = evolutions.unsigned_abs() as usize;
        let direction = evolutions.signum();
        let evolution_counts = counts(count, self.rules.required_evolution);

        let mut evolved = BTreeSet::new();
        for team in teams {
            for &c in &evolution_counts {
                evolved.extend(self.evolve_team(team, required, c, direction));
            }
        }
        if !evolved.is_empty() {
            return evolved;
        }

        log::warn!(
            "No team can make {} evolution step(s); relaxing for members without a target",
            count
        );
        for team in teams {
            let available = self.evolvable(team, required).len();
            let relaxed = self.evolve_team(team, required, count.min(available), direction);
            if relaxed.is_empty() {
                evolved.insert(team.clone());
            } else {
                evolved.extend(relaxed);
            }
        }
        evolved
    }

    fn evolvable(&self, team: &Team, required: &[Item]) -> Vec<(usize, Vec<Item>)> {
        team.iter()
            .enumerate()
            .filter(|(_, item)| !required.contains(*item))
            .filter_map(|(idx, item)| {
                let targets: Vec<Item> =
                    evolution_targets(self.catalog.as_ref(), item, self.rules.evolutions)
                        .into_iter()
                        .filter(|t| self.catalog.is_usable(t, &self.format))
                        .collect();
                (!targets.is_empty()).then_some((idx, targets))
            })
            .collect()
    }

    fn evolve_team(&self, team: &Team, required: &[Item], count: usize, direction: i32) -> Vec<Team> {
        if count == 0 || direction == 0 {
            return vec![team.clone()];
        }
        let evolvable = self.evolvable(team, required);
        if evolvable.len() < count {
            return Vec::new();
        }
        let mut out = Vec::new();
        for chosen in combinations(&evolvable, count) {
            let options: Vec<Vec<Item>> = chosen.iter().map(|(_, t)| t.clone()).collect();
            for replacement in cartesian(&options) {
                let mut next = team.clone();
                for ((idx, _), target) in chosen.iter().zip(replacement) {
                    next[*idx] = target;
                }
                if self.species_clause_ok(&next) {
                    out.push(canonical(&next));
                }
            }
        }
        out
    }

    /// Usable formes of `item`. Empty when none is usable, which drops the candidate.
    fn usable_formes(&self, item: &str) -> Vec<Item> {
        self.catalog
            .formes(item)
            .into_iter()
            .filter(|f| self.catalog.is_usable(f, &self.format))
            .collect()
    }

    fn species_clause_ok(&self, team: &[Item]) -> bool {
        let mut seen = BTreeSet::new();
        team.iter().all(|i| seen.insert(self.catalog.species(i)))
    }

    fn substitute_candidates(&mut self, player: PlayerId, n: usize) -> Vec<Item> {
        match self.teams.get(&player).cloned() {
            Some(state) => self.substitute_candidates_for(&state, n),
            None => Vec::new(),
        }
    }

    /// Legal items the player has never held, sampled with a retry budget.
    fn substitute_candidates_for(&mut self, state: &TeamState, n: usize) -> Vec<Item> {
        let catalog = Arc::clone(&self.catalog);
        let held: BTreeSet<String> = state.item_pool.iter().map(|i| catalog.species(i)).collect();
        let legal: Vec<Item> = catalog
            .legal_pool(&self.format)
            .into_iter()
            .filter(|i| !held.contains(&catalog.species(i)))
            .collect();
        let sample = sample_with_budget(&legal, n, &mut self.rng, SAMPLE_RETRY_BUDGET, |picked, item| {
            let species = catalog.species(item);
            !picked.iter().any(|p| catalog.species(p) == species)
        });
        sample.items
    }
}

/// Counts to enumerate for a change of `max`: exactly `max` when required, else 0..=max.
fn counts(max: usize, required: bool) -> Vec<usize> {
    if required {
        vec![max]
    } else {
        (0..=max).collect()
    }
}

fn dedup(items: &[Item]) -> Vec<Item> {
    let mut seen = BTreeSet::new();
    items.iter().filter(|i| seen.insert(*i)).cloned().collect()
}

/// Every `k`-element subset of `items`, preserving order.
fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    if k > items.len() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut idx: Vec<usize> = (0..k).collect();
    loop {
        out.push(idx.iter().map(|&i| items[i].clone()).collect());
        let Some(pos) = (0..k).rev().find(|&p| idx[p] != p + items.len() - k) else {
            return out;
        };
        idx[pos] += 1;
        for p in pos + 1..k {
            idx[p] = idx[p - 1] + 1;
        }
    }
}

/// Every way to pick one element from each option list.
fn cartesian(options: &[Vec<Item>]) -> Vec<Vec<Item>> {
    options.iter().fold(vec![Vec::new()], |acc, choices| {
        acc.iter()
            .flat_map(|prefix| {
                choices.iter().map(move |c| {
                    let mut next = prefix.clone();
                    next.push(c.clone());
                    next
                })
            })
            .collect()
    })
}
