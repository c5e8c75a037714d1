//! Elimination bracket coordinator: signups, start, results, disqualifications, timeouts.
//!
//! All mutations of one tournament go through `&mut self`, so the orchestrator and its
//! supervisors form a single serialized event stream. Host events are queued while an
//! operation runs and only delivered once the tree is consistent again.

use crate::external::{Catalog, Transport};
use crate::logic::builder::build_bracket;
use crate::logic::supervisor::{ActivityTimeouts, MatchSupervisor, SupervisorState, SupervisorVerdict};
use crate::logic::team_constraints::TeamConstraintEngine;
use crate::models::{
    BracketEvent, BracketSnapshot, BracketTree, Item, MatchOutcome, MatchView, MatchesByRound,
    NodeId, NodeState, NodeView, Placements, Player, PlayerId, TeamState, TournamentConfig,
    TournamentError, TournamentId, TournamentState,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use uuid::Uuid;

/// Callback registered by the host.
pub type EventHook = Box<dyn FnMut(&BracketEvent) + Send + Sync>;

pub struct EliminationOrchestrator {
    pub id: TournamentId,
    config: TournamentConfig,
    state: TournamentState,
    players: Vec<Player>,
    tree: Option<BracketTree<PlayerId>>,
    engine: TeamConstraintEngine,
    supervisors: BTreeMap<NodeId, MatchSupervisor>,
    transport: Arc<dyn Transport>,
    timeouts: ActivityTimeouts,
    /// Clock of the operation being applied; matches opened by it are timed from here.
    now: DateTime<Utc>,
    pending: Vec<BracketEvent>,
    match_available_hooks: Vec<EventHook>,
    tournament_end_hooks: Vec<EventHook>,
    placements: Option<Placements>,
    final_snapshot: Option<BracketSnapshot>,
}

impl EliminationOrchestrator {
    pub fn new(
        config: TournamentConfig,
        catalog: Arc<dyn Catalog>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let engine = TeamConstraintEngine::new(catalog, &config);
        Self {
            id: Uuid::new_v4(),
            timeouts: ActivityTimeouts::from_config(&config),
            config,
            state: TournamentState::Setup,
            players: Vec::new(),
            tree: None,
            engine,
            supervisors: BTreeMap::new(),
            transport,
            now: Utc::now(),
            pending: Vec::new(),
            match_available_hooks: Vec::new(),
            tournament_end_hooks: Vec::new(),
            placements: None,
            final_snapshot: None,
        }
    }

    pub fn config(&self) -> &TournamentConfig {
        &self.config
    }

    pub fn state(&self) -> TournamentState {
        self.state
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }

    fn name_of(&self, id: PlayerId) -> String {
        self.player(id)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn engine(&self) -> &TeamConstraintEngine {
        &self.engine
    }

    pub fn team_state(&self, player: PlayerId) -> Option<&TeamState> {
        self.engine.team_state(player)
    }

    pub fn tree(&self) -> Option<&BracketTree<PlayerId>> {
        self.tree.as_ref()
    }

    pub fn supervisor_state(&self, node: NodeId) -> Option<SupervisorState> {
        self.supervisors.get(&node).map(MatchSupervisor::state)
    }

    pub fn placements(&self) -> Option<&Placements> {
        self.placements.as_ref()
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.placements.as_ref().and_then(|p| p.winner)
    }

    pub fn on_match_available(&mut self, hook: impl FnMut(&BracketEvent) + Send + Sync + 'static) {
        self.match_available_hooks.push(Box::new(hook));
    }

    pub fn on_tournament_end(&mut self, hook: impl FnMut(&BracketEvent) + Send + Sync + 'static) {
        self.tournament_end_hooks.push(Box::new(hook));
    }

    /// Sign up a player. Names must be unique (case-insensitive).
    pub fn add_player(&mut self, name: impl Into<String>) -> Result<PlayerId, TournamentError> {
        if self.state != TournamentState::Setup {
            return Err(TournamentError::InvalidState);
        }
        let name: String = name.into();
        let name = name.trim();
        if name.is_empty() {
            return Err(TournamentError::InvalidState);
        }
        if self.players.len() >= self.config.player_cap {
            return Err(TournamentError::PlayerCapReached {
                cap: self.config.player_cap,
            });
        }
        if self.players.iter().any(|p| p.name.eq_ignore_ascii_case(name)) {
            return Err(TournamentError::DuplicatePlayerName);
        }
        let player = Player::new(name);
        let id = player.id;
        self.players.push(player);
        Ok(id)
    }

    /// Remove a signup (only valid in Setup).
    pub fn remove_player(&mut self, player_id: PlayerId) -> Result<(), TournamentError> {
        if self.state != TournamentState::Setup {
            return Err(TournamentError::InvalidState);
        }
        let idx = self
            .players
            .iter()
            .position(|p| p.id == player_id)
            .ok_or(TournamentError::PlayerNotFound(player_id))?;
        self.players.remove(idx);
        Ok(())
    }

    /// Build the bracket, hand out starting teams, advance byes and open the first matches.
    /// Fails without touching the pool or building anything when the pool is too small.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TournamentError> {
        if self.state != TournamentState::Setup {
            return Err(TournamentError::InvalidState);
        }
        let required = self.config.min_players.max(2);
        if self.players.len() < required {
            return Err(TournamentError::NotEnoughPlayers { required });
        }
        self.config.validate()?;
        self.engine.check_pool(&self.config)?;

        let ids: Vec<PlayerId> = self.players.iter().map(|p| p.id).collect();
        let tree = build_bracket(&ids)?;

        let mut allocated = Vec::with_capacity(ids.len());
        for &id in &ids {
            match self.engine.allocate_start(id) {
                Ok(_) => allocated.push(id),
                Err(e) => {
                    for id in allocated.into_iter().rev() {
                        self.engine.undo_allocation(id);
                    }
                    return Err(e);
                }
            }
        }

        self.now = now;
        self.state = TournamentState::InProgress;
        let has_changes = self.engine.rules().has_changes();
        for &bye in &tree.byes {
            if let Some(player) = self.player_mut(bye) {
                player.record_bye();
            }
            if has_changes {
                self.engine.apply_bye(bye);
            }
        }
        log::info!(
            "Tournament {} started: {} players, {} rounds, {} bye(s)",
            self.id,
            ids.len(),
            tree.total_rounds,
            tree.byes.len()
        );

        let available = tree.available_nodes();
        self.tree = Some(tree);
        for node in available {
            self.open_match(node);
        }
        self.flush_events();
        Ok(())
    }

    /// Evidence that a pair started playing: stops their activity timers.
    pub fn record_match_started(
        &mut self,
        player_a: PlayerId,
        player_b: PlayerId,
        now: DateTime<Utc>,
    ) -> Result<(), TournamentError> {
        self.advance_clock(now);
        let node = self.available_node(player_a, player_b)?;
        if let Some(supervisor) = self.supervisors.get_mut(&node) {
            supervisor.record_activity();
        }
        Ok(())
    }

    /// Record the result of the available match between `player_a` and `player_b`.
    /// `outcome` and `score` are from `player_a`'s side.
    pub fn report_result(
        &mut self,
        player_a: PlayerId,
        player_b: PlayerId,
        outcome: MatchOutcome,
        score: (u32, u32),
        loser_revealed_team: Option<Vec<Item>>,
        now: DateTime<Utc>,
    ) -> Result<(), TournamentError> {
        let node = self.available_node(player_a, player_b)?;
        self.advance_clock(now);
        let a_side = self
            .tree
            .as_ref()
            .and_then(|t| t.side_of(node, &player_a))
            .ok_or(TournamentError::NoSuchMatch { player_a, player_b })?;
        let (outcome, score) = if a_side == 0 {
            (outcome, score)
        } else {
            (outcome.flip(), (score.1, score.0))
        };
        self.resolve_match(node, outcome, Some(score), false, loser_revealed_team);
        self.flush_events();
        Ok(())
    }

    /// Validate both teams brought to a finished battle before recording it.
    /// Offending sides are disqualified as one batch; the returned list holds the
    /// contained violations (empty when the result was recorded as played).
    pub fn report_battle(
        &mut self,
        winner: PlayerId,
        loser: PlayerId,
        score: (u32, u32),
        winner_team: &[Item],
        loser_team: &[Item],
        now: DateTime<Utc>,
    ) -> Result<Vec<TournamentError>, TournamentError> {
        self.available_node(winner, loser)?;

        let mut violations = Vec::new();
        for (player, team) in [(winner, winner_team), (loser, loser_team)] {
            if !self.engine.is_legal_team(player, team) {
                let summary = self.engine.closest_legal_summary(player, team);
                log::info!(
                    "{} brought an illegal team: {}",
                    self.name_of(player),
                    summary.as_deref().unwrap_or("no legal team to compare")
                );
                violations.push(TournamentError::IllegalTeamSubmission { player, summary });
            }
        }

        if violations.is_empty() {
            self.report_result(
                winner,
                loser,
                MatchOutcome::Win,
                score,
                Some(loser_team.to_vec()),
                now,
            )?;
            return Ok(violations);
        }

        let offenders: Vec<(PlayerId, String)> = violations
            .iter()
            .filter_map(|v| match v {
                TournamentError::IllegalTeamSubmission { player, .. } => {
                    Some((*player, "illegal team".to_string()))
                }
                _ => None,
            })
            .collect();
        self.disqualify(offenders, now)?;
        Ok(violations)
    }

    /// Disqualify a batch of players. Players due to play lose by default; both players of
    /// one match disqualified together void that match. Events go out once the whole batch
    /// is applied. A player listed twice keeps the first reason.
    pub fn disqualify(
        &mut self,
        players_and_reasons: impl IntoIterator<Item = (PlayerId, String)>,
        now: DateTime<Utc>,
    ) -> Result<(), TournamentError> {
        let mut seen = BTreeSet::new();
        let batch: Vec<(PlayerId, String)> = players_and_reasons
            .into_iter()
            .filter(|(id, _)| seen.insert(*id))
            .collect();
        for (id, _) in &batch {
            if self.player(*id).is_none() {
                return Err(TournamentError::PlayerNotFound(*id));
            }
        }
        match self.state {
            TournamentState::Setup => {
                for (id, reason) in batch {
                    log::info!("Removing {} before start: {}", self.name_of(id), reason);
                    self.remove_player(id)?;
                }
                Ok(())
            }
            TournamentState::InProgress => {
                self.advance_clock(now);
                self.apply_disqualifications(batch);
                self.flush_events();
                Ok(())
            }
            TournamentState::Completed | TournamentState::Cancelled => {
                Err(TournamentError::InvalidState)
            }
        }
    }

    /// Advance every supervisor to `now`, applying verdicts in node order. A verdict for a
    /// node torn down earlier in the same pass is dropped.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<SupervisorVerdict> {
        self.advance_clock(now);
        let mut applied = Vec::new();
        if self.state != TournamentState::InProgress {
            return applied;
        }
        let nodes: Vec<NodeId> = self.supervisors.keys().copied().collect();
        for node in nodes {
            let Some(supervisor) = self.supervisors.get_mut(&node) else {
                continue;
            };
            let Some(verdict) = supervisor.poll(now, self.transport.as_ref(), &self.config.venue)
            else {
                continue;
            };
            self.apply_disqualifications(verdict.disqualify.clone());
            applied.push(verdict);
            if self.state != TournamentState::InProgress {
                break;
            }
        }
        self.flush_events();
        applied
    }

    /// Stop the tournament now: cancel every timer, then unlink the tree.
    pub fn force_end(&mut self) -> Result<(), TournamentError> {
        if !matches!(
            self.state,
            TournamentState::Setup | TournamentState::InProgress
        ) {
            return Err(TournamentError::InvalidState);
        }
        for supervisor in self.supervisors.values_mut() {
            supervisor.cancel();
        }
        self.supervisors.clear();
        self.final_snapshot = Some(self.get_bracket_snapshot());
        if let Some(mut tree) = self.tree.take() {
            tree.unlink();
        }
        self.state = TournamentState::Cancelled;
        log::info!("Tournament {} was force-ended", self.id);
        self.pending.push(BracketEvent::TournamentEnded { winner: None });
        self.flush_events();
        Ok(())
    }

    /// Playable matches grouped by round. Pure read.
    pub fn get_matches_by_round(&self) -> MatchesByRound {
        let mut by_round = MatchesByRound::new();
        let Some(tree) = &self.tree else {
            return by_round;
        };
        for node in tree.available_nodes() {
            if let Some(view) = match_view(tree, node) {
                by_round.entry(view.round).or_default().push(view);
            }
        }
        by_round
    }

    /// Full bracket projection. After the tournament ends this is the final bracket.
    pub fn get_bracket_snapshot(&self) -> BracketSnapshot {
        let Some(tree) = &self.tree else {
            return self.final_snapshot.clone().unwrap_or_default();
        };
        BracketSnapshot {
            total_rounds: tree.total_rounds,
            root: Some(tree.root()),
            byes: tree.byes.clone(),
            nodes: tree
                .node_ids()
                .map(|id| {
                    let node = tree.node(id);
                    NodeView {
                        id,
                        parent: node.parent,
                        children: node.children,
                        round: tree.round_of(id),
                        occupant: node.occupant,
                        occupant_name: node.occupant.map(|p| self.name_of(p)),
                        state: node.state,
                        score: node.score,
                        walkover: node.walkover,
                    }
                })
                .collect(),
        }
    }

    /// The orchestrator clock never runs backwards.
    fn advance_clock(&mut self, now: DateTime<Utc>) {
        if now > self.now {
            self.now = now;
        }
    }

    fn available_node(&self, player_a: PlayerId, player_b: PlayerId) -> Result<NodeId, TournamentError> {
        if self.state != TournamentState::InProgress {
            return Err(TournamentError::NoSuchMatch { player_a, player_b });
        }
        self.tree
            .as_ref()
            .and_then(|t| t.find_available(&player_a, &player_b))
            .ok_or(TournamentError::NoSuchMatch { player_a, player_b })
    }

    fn is_live(&self, player: Option<PlayerId>) -> bool {
        player
            .and_then(|id| self.player(id))
            .is_some_and(|p| !p.eliminated)
    }

    fn apply_disqualifications(&mut self, batch: Vec<(PlayerId, String)>) {
        let mut affected = BTreeSet::new();
        for (id, reason) in batch {
            let Some(player) = self.player_mut(id) else {
                continue;
            };
            if player.eliminated {
                log::debug!("{} is already out; ignoring disqualification", player.name);
                continue;
            }
            player.disqualify(reason.clone());
            let has_played = player.has_played;
            log::info!("{} was disqualified: {}", self.name_of(id), reason);
            self.transport
                .notify(id, &format!("You were disqualified: {}", reason));

            if !has_played && self.engine.withdraw(id).is_some() {
                log::debug!("Returned the starting team of {} to the pool", id);
            }
            if let Some(node) = self.tree.as_ref().and_then(|t| t.available_node_of(&id)) {
                if let Some(mut supervisor) = self.supervisors.remove(&node) {
                    supervisor.cancel();
                }
                affected.insert(node);
            }
        }

        for node in affected {
            let Some(tree) = &self.tree else {
                return;
            };
            if tree.node(node).state != NodeState::Available {
                continue;
            }
            let Some((left, right)) = tree.pairing(node) else {
                continue;
            };
            let (left, right) = (left.copied(), right.copied());
            match (self.is_live(left), self.is_live(right)) {
                (true, false) => {
                    self.resolve_match(node, MatchOutcome::Win, Some((1, 0)), true, None)
                }
                (false, true) => {
                    self.resolve_match(node, MatchOutcome::Loss, Some((0, 1)), true, None)
                }
                (false, false) => self.resolve_void(node),
                (true, true) => {}
            }
        }
    }

    /// Close the match at `node`, eliminate the loser and push the winner upward.
    fn resolve_match(
        &mut self,
        node: NodeId,
        outcome: MatchOutcome,
        score: Option<(u32, u32)>,
        walkover: bool,
        loser_revealed_team: Option<Vec<Item>>,
    ) {
        if let Some(mut supervisor) = self.supervisors.remove(&node) {
            supervisor.cancel();
        }
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        let Some([left, right]) = tree.node(node).children else {
            return;
        };
        let loser_node = if outcome.winner_index() == 0 { right } else { left };
        let loser = tree.node(loser_node).occupant;
        let Some(winner) = tree.record_result(node, outcome, score, walkover) else {
            return;
        };
        let parent = tree.node(node).parent;

        if let Some(p) = self.player_mut(winner) {
            if walkover {
                p.add_walkover();
            } else {
                p.add_win();
            }
        }
        if let Some(loser) = loser {
            if let Some(p) = self.player_mut(loser) {
                p.eliminate();
            }
        }
        log::info!(
            "{} beat {}{}",
            self.name_of(winner),
            loser.map(|l| self.name_of(l)).unwrap_or_default(),
            if walkover { " by walkover" } else { "" }
        );

        let Some(parent) = parent else {
            self.finish(Some(winner));
            return;
        };

        if self.engine.rules().has_changes() {
            let revealed = loser_revealed_team.or_else(|| {
                loser
                    .and_then(|l| self.engine.team_state(l))
                    .and_then(|s| s.known_team().cloned())
            });
            self.engine.apply_change(winner, revealed.as_deref());
        }
        self.advance(parent);
    }

    /// Close the match at `node` with nobody advancing.
    fn resolve_void(&mut self, node: NodeId) {
        if let Some(mut supervisor) = self.supervisors.remove(&node) {
            supervisor.cancel();
        }
        let Some(tree) = self.tree.as_mut() else {
            return;
        };
        tree.record_void(node);
        let parent = tree.node(node).parent;
        log::info!("Match at node {} was voided", node);
        match parent {
            Some(parent) => self.advance(parent),
            None => self.finish(None),
        }
    }

    /// Re-evaluate `node` after one of its children was decided.
    fn advance(&mut self, node: NodeId) {
        let Some(tree) = &self.tree else {
            return;
        };
        let Some([left, right]) = tree.node(node).children else {
            return;
        };
        if tree.node(node).state != NodeState::Unscheduled
            || !tree.node(left).is_decided()
            || !tree.node(right).is_decided()
        {
            return;
        }
        let left = tree.node(left).occupant;
        let right = tree.node(right).occupant;
        match (self.is_live(left), self.is_live(right)) {
            (true, true) => {
                if let Some(tree) = self.tree.as_mut() {
                    tree.node_mut(node).state = NodeState::Available;
                }
                self.open_match(node);
            }
            (true, false) => self.resolve_match(node, MatchOutcome::Win, None, true, None),
            (false, true) => self.resolve_match(node, MatchOutcome::Loss, None, true, None),
            (false, false) => self.resolve_void(node),
        }
    }

    /// Start supervising a newly available match and tell everyone about it.
    fn open_match(&mut self, node: NodeId) {
        let Some(view) = self.tree.as_ref().and_then(|t| match_view(t, node)) else {
            return;
        };
        let supervisor = MatchSupervisor::new(
            node,
            [view.player_a, view.player_b],
            self.timeouts,
            self.now,
        );
        self.supervisors.insert(node, supervisor);

        let (a, b) = (self.name_of(view.player_a), self.name_of(view.player_b));
        log::info!("Round {} match available: {} vs {}", view.round, a, b);
        self.transport.broadcast(
            &self.config.venue,
            &format!("Round {}: {} vs {} is ready", view.round, a, b),
        );
        for (player, opponent) in [(view.player_a, &b), (view.player_b, &a)] {
            let mut message = format!("Your round {} opponent is {}.", view.round, opponent);
            if let Some(change) = self
                .engine
                .team_state(player)
                .and_then(|s| s.team_change_log.last())
            {
                message.push_str(&format!(" Team change: {}.", change.describe()));
            }
            self.transport.notify(player, &message);
        }
        self.pending.push(BracketEvent::MatchAvailable(view));
    }

    fn finish(&mut self, winner: Option<PlayerId>) {
        for supervisor in self.supervisors.values_mut() {
            supervisor.cancel();
        }
        self.supervisors.clear();
        self.state = TournamentState::Completed;
        if let Some(tree) = &self.tree {
            self.placements = Some(placements_of(tree));
        }
        self.final_snapshot = Some(self.get_bracket_snapshot());
        if let Some(mut tree) = self.tree.take() {
            tree.unlink();
        }
        match winner {
            Some(w) => log::info!("Tournament {} won by {}", self.id, self.name_of(w)),
            None => log::info!("Tournament {} ended without a winner", self.id),
        }
        self.pending.push(BracketEvent::TournamentEnded { winner });
    }

    fn flush_events(&mut self) {
        for event in std::mem::take(&mut self.pending) {
            let hooks = match event {
                BracketEvent::MatchAvailable(_) => &mut self.match_available_hooks,
                BracketEvent::TournamentEnded { .. } => &mut self.tournament_end_hooks,
            };
            for hook in hooks.iter_mut() {
                hook(&event);
            }
        }
    }
}

fn match_view(tree: &BracketTree<PlayerId>, node: NodeId) -> Option<MatchView> {
    match tree.pairing(node)? {
        (Some(&player_a), Some(&player_b)) => Some(MatchView {
            node,
            round: tree.round_of(node),
            player_a,
            player_b,
        }),
        _ => None,
    }
}

fn placements_of(tree: &BracketTree<PlayerId>) -> Placements {
    let root = tree.node(tree.root());
    let winner = root.occupant;
    let mut placements = Placements {
        winner,
        ..Placements::default()
    };
    let Some(finalists) = root.children else {
        return placements;
    };
    placements.runner_up = finalists
        .iter()
        .filter_map(|&c| tree.node(c).occupant)
        .find(|&p| Some(p) != winner);
    for finalist in finalists {
        let advanced = tree.node(finalist).occupant;
        if let Some(semis) = tree.node(finalist).children {
            placements.semifinalists.extend(
                semis
                    .iter()
                    .filter_map(|&c| tree.node(c).occupant)
                    .filter(|&p| Some(p) != advanced),
            );
        }
    }
    placements
}
