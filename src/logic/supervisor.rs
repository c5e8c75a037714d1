//! Activity supervision for one available match.
//!
//! A supervisor never mutates the bracket. It is polled with the current time and
//! answers with a verdict the orchestrator turns into disqualifications.

use crate::external::Transport;
use crate::models::{NodeId, PlayerId, TournamentConfig};
use chrono::{DateTime, Duration, Utc};

/// Timer lengths for a supervisor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ActivityTimeouts {
    pub warn: Duration,
    /// Counted from the moment the warning fires.
    pub dq: Duration,
    pub scouting_poll: Duration,
    pub scouting_retries: u32,
    pub liveness_recheck: Duration,
}

impl ActivityTimeouts {
    pub fn from_config(config: &TournamentConfig) -> Self {
        Self {
            warn: Duration::seconds(config.activity_warn_secs.max(0)),
            dq: Duration::seconds(config.activity_dq_secs.max(0)),
            scouting_poll: Duration::seconds(config.scouting_poll_secs.max(1)),
            scouting_retries: config.scouting_retries.max(1),
            liveness_recheck: Duration::seconds(config.liveness_recheck_secs.max(1)),
        }
    }
}

/// What the supervisor is waiting on after the activity deadline passed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeoutCheck {
    /// The liveness check failed once; it gets one more try.
    LivenessRecheck,
    /// Both players are present; polling for a declared battle.
    Scouting { attempts: u32 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SupervisorState {
    AwaitingStart { warned: bool },
    InProgress,
    TimedOut(TimeoutCheck),
    /// A verdict has been handed to the orchestrator.
    Disqualifying,
    Resolved,
}

/// Disqualifications requested by a supervisor, with reasons.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SupervisorVerdict {
    pub node: NodeId,
    pub disqualify: Vec<(PlayerId, String)>,
}

#[derive(Clone, Debug)]
pub struct MatchSupervisor {
    node: NodeId,
    players: [PlayerId; 2],
    timeouts: ActivityTimeouts,
    state: SupervisorState,
    warn_deadline: Option<DateTime<Utc>>,
    dq_deadline: Option<DateTime<Utc>>,
    check_deadline: Option<DateTime<Utc>>,
}

impl MatchSupervisor {
    /// Start supervising the match at `node`, with timers relative to `now`.
    pub fn new(node: NodeId, players: [PlayerId; 2], timeouts: ActivityTimeouts, now: DateTime<Utc>) -> Self {
        Self {
            node,
            players,
            timeouts,
            state: SupervisorState::AwaitingStart { warned: false },
            warn_deadline: Some(now + timeouts.warn),
            dq_deadline: None,
            check_deadline: None,
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn players(&self) -> [PlayerId; 2] {
        self.players
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn involves(&self, player: PlayerId) -> bool {
        self.players.contains(&player)
    }

    /// Earliest pending deadline, if any timer is running.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        [self.warn_deadline, self.dq_deadline, self.check_deadline]
            .into_iter()
            .flatten()
            .min()
    }

    /// Evidence that the match started: stop every activity timer.
    pub fn record_activity(&mut self) -> bool {
        match self.state {
            SupervisorState::AwaitingStart { .. } | SupervisorState::TimedOut(_) => {
                log::debug!("Match at node {} is in progress", self.node);
                self.state = SupervisorState::InProgress;
                self.clear_timers();
                true
            }
            _ => false,
        }
    }

    /// Tear down: the match is resolved or one of its players is gone.
    pub fn cancel(&mut self) {
        self.state = SupervisorState::Resolved;
        self.clear_timers();
    }

    fn clear_timers(&mut self) {
        self.warn_deadline = None;
        self.dq_deadline = None;
        self.check_deadline = None;
    }

    /// Advance timers to `now`. Returns a verdict when players should be disqualified.
    pub fn poll(
        &mut self,
        now: DateTime<Utc>,
        transport: &dyn Transport,
        venue: &str,
    ) -> Option<SupervisorVerdict> {
        match self.state {
            SupervisorState::AwaitingStart { warned } => {
                let mut warned = warned;
                if !warned && self.warn_deadline.is_some_and(|d| now >= d) {
                    for player in self.players {
                        transport.notify(
                            player,
                            "Your match is waiting. Start it soon or you will be disqualified for inactivity.",
                        );
                    }
                    self.warn_deadline = None;
                    self.dq_deadline = Some(now + self.timeouts.dq);
                    self.state = SupervisorState::AwaitingStart { warned: true };
                    warned = true;
                }
                if warned && self.dq_deadline.is_some_and(|d| now >= d) {
                    self.dq_deadline = None;
                    log::info!("Match at node {} hit its activity deadline", self.node);
                    return self.check_liveness(now, transport, venue, false);
                }
                None
            }
            SupervisorState::TimedOut(check) => {
                if !self.check_deadline.is_some_and(|d| now >= d) {
                    return None;
                }
                self.check_deadline = None;
                match check {
                    TimeoutCheck::LivenessRecheck => self.check_liveness(now, transport, venue, true),
                    TimeoutCheck::Scouting { attempts } => self.scout(now, transport, attempts),
                }
            }
            SupervisorState::InProgress
            | SupervisorState::Disqualifying
            | SupervisorState::Resolved => None,
        }
    }

    fn check_liveness(
        &mut self,
        now: DateTime<Utc>,
        transport: &dyn Transport,
        venue: &str,
        recheck: bool,
    ) -> Option<SupervisorVerdict> {
        let presence: Result<Vec<(PlayerId, bool)>, _> = self
            .players
            .iter()
            .map(|&p| transport.is_present(p, venue).map(|present| (p, present)))
            .collect();

        let presence = match presence {
            Ok(presence) => presence,
            Err(e) if !recheck => {
                log::warn!("Liveness check for node {} failed ({}); checking again", self.node, e);
                self.state = SupervisorState::TimedOut(TimeoutCheck::LivenessRecheck);
                self.check_deadline = Some(now + self.timeouts.liveness_recheck);
                return None;
            }
            Err(e) => {
                log::warn!(
                    "Liveness check for node {} failed again ({}); treating both players as inactive",
                    self.node,
                    e
                );
                return self.verdict(self.players.to_vec(), "inactive");
            }
        };

        let absent: Vec<PlayerId> = presence
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(p, _)| p)
            .collect();
        if !absent.is_empty() {
            return self.verdict(absent, "not present for their match");
        }

        self.state = SupervisorState::TimedOut(TimeoutCheck::Scouting { attempts: 0 });
        self.check_deadline = Some(now + self.timeouts.scouting_poll);
        None
    }

    fn scout(
        &mut self,
        now: DateTime<Utc>,
        transport: &dyn Transport,
        attempts: u32,
    ) -> Option<SupervisorVerdict> {
        let [a, b] = self.players;
        match transport.battle_declared(a, b) {
            Ok(true) => {
                self.record_activity();
                return None;
            }
            Ok(false) => {}
            Err(e) => log::warn!("Battle lookup for node {} failed: {}", self.node, e),
        }
        let attempts = attempts + 1;
        if attempts >= self.timeouts.scouting_retries {
            return self.verdict(self.players.to_vec(), "inactive");
        }
        for player in self.players {
            transport.notify(player, "Both players are here: start your battle now.");
        }
        self.state = SupervisorState::TimedOut(TimeoutCheck::Scouting { attempts });
        self.check_deadline = Some(now + self.timeouts.scouting_poll);
        None
    }

    fn verdict(&mut self, players: Vec<PlayerId>, reason: &str) -> Option<SupervisorVerdict> {
        self.state = SupervisorState::Disqualifying;
        self.clear_timers();
        Some(SupervisorVerdict {
            node: self.node,
            disqualify: players.into_iter().map(|p| (p, reason.to_string())).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::MemoryTransport;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn timeouts() -> ActivityTimeouts {
        ActivityTimeouts {
            warn: Duration::seconds(60),
            dq: Duration::seconds(60),
            scouting_poll: Duration::seconds(10),
            scouting_retries: 2,
            liveness_recheck: Duration::seconds(15),
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn supervisor() -> (MatchSupervisor, [PlayerId; 2]) {
        let players = [Uuid::new_v4(), Uuid::new_v4()];
        (MatchSupervisor::new(3, players, timeouts(), start()), players)
    }

    #[test]
    fn warns_before_disqualifying() {
        let (mut sup, [a, b]) = supervisor();
        let transport = MemoryTransport::new();
        assert!(sup.poll(start() + Duration::seconds(30), &transport, "lobby").is_none());
        assert!(transport.sent().is_empty());

        assert!(sup.poll(start() + Duration::seconds(61), &transport, "lobby").is_none());
        assert_eq!(transport.notifications_for(a).len(), 1);
        assert_eq!(transport.notifications_for(b).len(), 1);

        transport.set_present(a, true);
        let verdict = sup
            .poll(start() + Duration::seconds(121), &transport, "lobby")
            .unwrap();
        assert_eq!(verdict.node, 3);
        assert_eq!(verdict.disqualify.len(), 1);
        assert_eq!(verdict.disqualify[0].0, b);
        assert_eq!(sup.state(), SupervisorState::Disqualifying);
    }

    #[test]
    fn late_poll_only_warns() {
        let (mut sup, [a, _]) = supervisor();
        let transport = MemoryTransport::new();
        let late = start() + Duration::seconds(600);
        assert!(sup.poll(late, &transport, "lobby").is_none());
        assert_eq!(transport.notifications_for(a).len(), 1);
        assert_eq!(sup.state(), SupervisorState::AwaitingStart { warned: true });
        assert_eq!(sup.next_deadline(), Some(late + Duration::seconds(60)));

        assert!(sup.poll(late + Duration::seconds(59), &transport, "lobby").is_none());
        assert!(sup.poll(late + Duration::seconds(60), &transport, "lobby").is_some());
    }

    #[test]
    fn activity_cancels_timers() {
        let (mut sup, _) = supervisor();
        let transport = MemoryTransport::new();
        assert!(sup.record_activity());
        assert_eq!(sup.next_deadline(), None);
        assert!(sup.poll(start() + Duration::seconds(600), &transport, "lobby").is_none());
        assert_eq!(sup.state(), SupervisorState::InProgress);
    }

    #[test]
    fn both_present_goes_to_scouting_then_disqualifies() {
        let (mut sup, [a, b]) = supervisor();
        let transport = MemoryTransport::new();
        transport.set_present(a, true);
        transport.set_present(b, true);
        sup.poll(start() + Duration::seconds(60), &transport, "lobby");
        assert!(sup.poll(start() + Duration::seconds(120), &transport, "lobby").is_none());
        assert_eq!(
            sup.state(),
            SupervisorState::TimedOut(TimeoutCheck::Scouting { attempts: 0 })
        );
        assert!(sup.poll(start() + Duration::seconds(130), &transport, "lobby").is_none());
        let verdict = sup
            .poll(start() + Duration::seconds(140), &transport, "lobby")
            .unwrap();
        assert_eq!(verdict.disqualify.len(), 2);
    }

    #[test]
    fn scouting_finds_declared_battle() {
        let (mut sup, [a, b]) = supervisor();
        let transport = MemoryTransport::new();
        transport.set_present(a, true);
        transport.set_present(b, true);
        sup.poll(start() + Duration::seconds(60), &transport, "lobby");
        sup.poll(start() + Duration::seconds(120), &transport, "lobby");
        transport.declare_battle(b, a);
        assert!(sup.poll(start() + Duration::seconds(130), &transport, "lobby").is_none());
        assert_eq!(sup.state(), SupervisorState::InProgress);
    }

    #[test]
    fn failed_liveness_check_is_retried_once() {
        let (mut sup, _) = supervisor();
        let transport = MemoryTransport::new();
        transport.set_unavailable(true);
        sup.poll(start() + Duration::seconds(60), &transport, "lobby");
        assert!(sup.poll(start() + Duration::seconds(120), &transport, "lobby").is_none());
        assert_eq!(
            sup.state(),
            SupervisorState::TimedOut(TimeoutCheck::LivenessRecheck)
        );
        let verdict = sup
            .poll(start() + Duration::seconds(135), &transport, "lobby")
            .unwrap();
        assert_eq!(verdict.disqualify.len(), 2);
        assert!(verdict.disqualify.iter().all(|(_, r)| r == "inactive"));
    }

    #[test]
    fn cancelled_supervisor_ignores_time() {
        let (mut sup, _) = supervisor();
        let transport = MemoryTransport::new();
        sup.cancel();
        assert!(sup.poll(start() + Duration::seconds(600), &transport, "lobby").is_none());
        assert!(!sup.record_activity());
    }
}
