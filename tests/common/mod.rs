//! Shared fixtures for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use elimination_tournament::{
    BracketEvent, Catalog, EliminationOrchestrator, FormatRules, Item, MemoryTransport, PlayerId,
    StaticCatalog, TournamentConfig,
};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

/// Catalog with a fixed pool and explicit evolution lines.
pub struct TestCatalog {
    pub pool: Vec<Item>,
    pub lines: Vec<Vec<Item>>,
}

impl TestCatalog {
    pub fn new(pool: &[&str], lines: &[&[&str]]) -> Self {
        Self {
            pool: pool.iter().map(|s| s.to_string()).collect(),
            lines: lines
                .iter()
                .map(|line| line.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }
}

impl Catalog for TestCatalog {
    fn legal_pool(&self, _rules: &FormatRules) -> BTreeSet<Item> {
        self.pool.iter().cloned().collect()
    }

    fn evolution_line(&self, item: &str) -> Vec<Item> {
        self.lines
            .iter()
            .find(|line| line.iter().any(|i| i == item))
            .cloned()
            .unwrap_or_else(|| vec![item.to_string()])
    }

    fn is_usable(&self, _item: &str, _rules: &FormatRules) -> bool {
        true
    }
}

pub fn numbered_catalog(n: usize) -> StaticCatalog {
    StaticCatalog::from_names((0..n).map(|i| format!("mon{i:03}")))
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap()
}

pub fn config() -> TournamentConfig {
    TournamentConfig {
        player_cap: 8,
        seed: Some(42),
        ..TournamentConfig::default()
    }
}

pub fn static_config() -> TournamentConfig {
    TournamentConfig {
        additions_per_round: 0,
        drops_per_round: 0,
        ..config()
    }
}

/// Orchestrator with `n` players named P1..Pn signed up in order.
pub fn orchestrator(
    n: usize,
    config: TournamentConfig,
) -> (EliminationOrchestrator, Vec<PlayerId>, Arc<MemoryTransport>) {
    let transport = Arc::new(MemoryTransport::new());
    let mut orch =
        EliminationOrchestrator::new(config, Arc::new(numbered_catalog(200)), transport.clone());
    let ids = (1..=n)
        .map(|i| orch.add_player(format!("P{i}")).unwrap())
        .collect();
    (orch, ids, transport)
}

/// Record every event the orchestrator emits.
pub fn record_events(orch: &mut EliminationOrchestrator) -> Arc<Mutex<Vec<BracketEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let available = Arc::clone(&events);
    orch.on_match_available(move |e| available.lock().unwrap().push(e.clone()));
    let ended = Arc::clone(&events);
    orch.on_tournament_end(move |e| ended.lock().unwrap().push(e.clone()));
    events
}
