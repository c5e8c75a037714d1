//! Shared resource pool and bounded random sampling.

use crate::models::{byes_for, Item, TournamentConfig, MAX_TEAM_SIZE, MIN_TEAM_SIZE};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeSet;

/// RNG for a tournament: seeded when the config asks for reproducibility.
pub fn tournament_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Shuffled, destructively consumed sequence of distinct items.
#[derive(Clone, Debug)]
pub struct ResourcePool {
    items: Vec<Item>,
    initial_size: usize,
    taken: usize,
}

impl ResourcePool {
    pub fn new(items: impl IntoIterator<Item = Item>, rng: &mut StdRng) -> Self {
        let distinct: BTreeSet<Item> = items.into_iter().collect();
        let mut items: Vec<Item> = distinct.into_iter().collect();
        items.shuffle(rng);
        Self {
            initial_size: items.len(),
            items,
            taken: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    /// Items currently held by players.
    pub fn taken(&self) -> usize {
        self.taken
    }

    /// Remove and return `n` items, or nothing at all if fewer remain.
    pub fn take(&mut self, n: usize) -> Option<Vec<Item>> {
        if n > self.items.len() {
            return None;
        }
        let drawn: Vec<Item> = self.items.drain(..n).collect();
        self.taken += drawn.len();
        Some(drawn)
    }

    /// Return a withdrawn player's allocation.
    pub fn push_back(&mut self, items: Vec<Item>) {
        self.taken = self.taken.saturating_sub(items.len());
        self.items.extend(items);
    }

    /// Put the last draw back at the front, as if it had never been taken.
    pub fn restore(&mut self, items: Vec<Item>) {
        self.taken = self.taken.saturating_sub(items.len());
        self.items.splice(0..0, items);
    }
}

/// Pool items needed for `players` entrants: every starting allocation plus the
/// candidates drawn for each first-round bye.
pub fn pool_size_for(players: usize, config: &TournamentConfig) -> usize {
    let team_size = config.starting_team_size.clamp(MIN_TEAM_SIZE, MAX_TEAM_SIZE);
    players * team_size + byes_for(players) * config.additions_per_round as usize
}

/// Smallest pool that serves any entrant count the tournament accepts.
pub fn required_pool_size(config: &TournamentConfig) -> usize {
    (config.min_players.max(2)..=config.player_cap.max(2))
        .map(|n| pool_size_for(n, config))
        .max()
        .unwrap_or(0)
}

/// Result of a bounded sample.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Sample {
    pub items: Vec<Item>,
    /// The acceptance rule was dropped after the retry budget ran out.
    pub relaxed: bool,
}

/// Draw up to `n` distinct items from `candidates` such that each pick is accepted
/// given the picks before it. Retries with fresh shuffles up to `retry_budget` times,
/// then falls back to an unfiltered draw so sampling always terminates.
pub fn sample_with_budget<F>(
    candidates: &[Item],
    n: usize,
    rng: &mut StdRng,
    retry_budget: usize,
    accept: F,
) -> Sample
where
    F: Fn(&[Item], &Item) -> bool,
{
    let mut shuffled = candidates.to_vec();
    let mut best = Vec::new();
    for _ in 0..retry_budget.max(1) {
        shuffled.shuffle(rng);
        let mut picked: Vec<Item> = Vec::with_capacity(n);
        for item in &shuffled {
            if picked.len() == n {
                break;
            }
            if !picked.contains(item) && accept(&picked, item) {
                picked.push(item.clone());
            }
        }
        if picked.len() == n {
            return Sample {
                items: picked,
                relaxed: false,
            };
        }
        if picked.len() > best.len() {
            best = picked;
        }
    }
    if best.len() == n.min(shuffled.len()) && !best.is_empty() {
        return Sample {
            items: best,
            relaxed: false,
        };
    }
    log::warn!(
        "Sampler exhausted its retry budget for {} item(s); relaxing constraints",
        n
    );
    shuffled.shuffle(rng);
    let mut items: Vec<Item> = Vec::with_capacity(n);
    for item in shuffled {
        if items.len() == n {
            break;
        }
        if !items.contains(&item) {
            items.push(item);
        }
    }
    Sample {
        items,
        relaxed: true,
    }
}
