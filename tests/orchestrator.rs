//! End-to-end tests for the elimination orchestrator.

mod common;

use chrono::Duration;
use common::{config, numbered_catalog, orchestrator, record_events, static_config, t0};
use elimination_tournament::{
    BracketEvent, EliminationOrchestrator, Item, MatchOutcome, MemoryTransport, NodeState,
    SupervisorState, TournamentConfig, TournamentError, TournamentState,
};
use std::sync::Arc;

fn available_count(events: &[BracketEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, BracketEvent::MatchAvailable(_)))
        .count()
}

#[test]
fn eight_players_play_to_a_winner() {
    let (mut orch, ids, _) = orchestrator(8, static_config());
    let events = record_events(&mut orch);
    orch.start(t0()).unwrap();
    assert_eq!(available_count(&events.lock().unwrap()), 4);

    let mut reports = 0;
    while orch.state() == TournamentState::InProgress {
        let matches = orch.get_matches_by_round();
        let (_, first_round) = matches.iter().next().unwrap();
        let m = first_round[0].clone();
        orch.report_result(m.player_a, m.player_b, MatchOutcome::Win, (2, 0), None, t0())
            .unwrap();
        reports += 1;
    }

    assert_eq!(reports, 7);
    assert_eq!(orch.state(), TournamentState::Completed);
    assert_eq!(orch.winner(), Some(ids[0]));
    assert_eq!(orch.player(ids[0]).unwrap().wins, 3);

    let placements = orch.placements().unwrap();
    assert_eq!(placements.runner_up, Some(ids[1]));
    let mut semis = placements.semifinalists.clone();
    semis.sort();
    let mut expected = vec![ids[2], ids[3]];
    expected.sort();
    assert_eq!(semis, expected);

    let events = events.lock().unwrap();
    assert_eq!(available_count(&events), 7);
    assert_eq!(
        events.last(),
        Some(&BracketEvent::TournamentEnded {
            winner: Some(ids[0])
        })
    );

    let snapshot = orch.get_bracket_snapshot();
    let root = snapshot.root.unwrap();
    assert_eq!(snapshot.nodes[root].occupant, Some(ids[0]));
    assert_eq!(snapshot.nodes[root].occupant_name.as_deref(), Some("P1"));
    assert!(orch.get_matches_by_round().is_empty());
    assert!(orch.tree().is_none());
}

#[test]
fn second_report_for_same_pair_is_rejected() {
    let (mut orch, ids, _) = orchestrator(4, static_config());
    orch.start(t0()).unwrap();
    orch.report_result(ids[0], ids[2], MatchOutcome::Win, (2, 1), None, t0())
        .unwrap();
    assert_eq!(
        orch.report_result(ids[0], ids[2], MatchOutcome::Win, (2, 1), None, t0()),
        Err(TournamentError::NoSuchMatch {
            player_a: ids[0],
            player_b: ids[2]
        })
    );
    assert!(matches!(
        orch.report_result(ids[0], ids[1], MatchOutcome::Win, (2, 1), None, t0()),
        Err(TournamentError::NoSuchMatch { .. })
    ));
}

#[test]
fn result_is_oriented_by_reporting_side() {
    let (mut orch, ids, _) = orchestrator(5, config());
    orch.start(t0()).unwrap();
    // P5 reports a loss to P1; P1 sits on the left of that match.
    orch.report_result(ids[4], ids[0], MatchOutcome::Loss, (1, 2), None, t0())
        .unwrap();
    assert!(orch.player(ids[4]).unwrap().eliminated);
    assert_eq!(orch.player(ids[0]).unwrap().wins, 1);

    let snapshot = orch.get_bracket_snapshot();
    let decided = snapshot
        .nodes
        .iter()
        .find(|n| n.state == NodeState::Finished && n.round == 1)
        .unwrap();
    assert_eq!(decided.occupant, Some(ids[0]));
    assert_eq!(decided.score, Some((2, 1)));
    assert!(!decided.walkover);
}

#[test]
fn five_players_give_three_byes() {
    let (mut orch, ids, _) = orchestrator(5, config());
    orch.start(t0()).unwrap();

    for &bye in &ids[1..4] {
        assert_eq!(orch.player(bye).unwrap().round, 2);
        assert_eq!(orch.team_state(bye).unwrap().team_change_log.len(), 1);
    }
    for &player in &[ids[0], ids[4]] {
        assert_eq!(orch.player(player).unwrap().round, 1);
        assert!(orch.team_state(player).unwrap().team_change_log.is_empty());
    }

    let matches = orch.get_matches_by_round();
    assert_eq!(matches.len(), 2);
    let first = &matches[&1];
    assert_eq!(first.len(), 1);
    assert_eq!((first[0].player_a, first[0].player_b), (ids[0], ids[4]));
    let second = &matches[&2];
    assert_eq!(second.len(), 1);
    assert_eq!((second[0].player_a, second[0].player_b), (ids[1], ids[3]));

    let pool = orch.engine().pool();
    assert_eq!(pool.taken(), 5 * 6 + 3);
    assert_eq!(pool.taken() + pool.len(), pool.initial_size());
}

#[test]
fn double_disqualification_voids_the_match() {
    let (mut orch, ids, _) = orchestrator(4, config());
    let events = record_events(&mut orch);
    orch.start(t0()).unwrap();
    assert_eq!(available_count(&events.lock().unwrap()), 2);

    orch.disqualify([(ids[0], "no-show".to_string()), (ids[2], "no-show".to_string())], t0())
        .unwrap();
    assert_eq!(available_count(&events.lock().unwrap()), 2);
    let root = orch.tree().unwrap().root();
    assert_eq!(orch.tree().unwrap().node(root).state, NodeState::Unscheduled);
    assert_eq!(orch.get_matches_by_round().values().flatten().count(), 1);
    assert_eq!(
        orch.player(ids[0]).unwrap().disqualification.as_deref(),
        Some("no-show")
    );

    orch.report_result(ids[1], ids[3], MatchOutcome::Win, (2, 0), None, t0())
        .unwrap();
    assert_eq!(orch.state(), TournamentState::Completed);
    assert_eq!(orch.winner(), Some(ids[1]));
    let winner = orch.player(ids[1]).unwrap();
    assert_eq!((winner.wins, winner.walkovers), (1, 1));
    assert_eq!(available_count(&events.lock().unwrap()), 2);
}

#[test]
fn disqualified_player_in_play_loses_by_walkover() {
    let (mut orch, ids, transport) = orchestrator(4, config());
    orch.start(t0()).unwrap();
    orch.disqualify([(ids[2], "unsporting".to_string())], t0()).unwrap();

    let p1 = orch.player(ids[0]).unwrap();
    assert_eq!((p1.wins, p1.walkovers, p1.round), (0, 1, 2));
    assert!(transport
        .notifications_for(ids[2])
        .iter()
        .any(|m| m.contains("disqualified")));
    // Reason is not overwritten by a later disqualification.
    orch.disqualify([(ids[2], "again".to_string())], t0()).unwrap();
    assert_eq!(
        orch.player(ids[2]).unwrap().disqualification.as_deref(),
        Some("unsporting")
    );
}

#[test]
fn pool_exhaustion_blocks_start_without_side_effects() {
    let transport = Arc::new(MemoryTransport::new());
    let mut orch =
        EliminationOrchestrator::new(config(), Arc::new(numbered_catalog(10)), transport);
    orch.add_player("P1").unwrap();
    orch.add_player("P2").unwrap();

    assert_eq!(
        orch.start(t0()),
        Err(TournamentError::PoolExhausted {
            required: 48,
            available: 10
        })
    );
    assert_eq!(orch.state(), TournamentState::Setup);
    assert!(orch.tree().is_none());
    assert_eq!(orch.engine().pool().len(), 10);
    assert_eq!(orch.engine().pool().taken(), 0);
}

#[test]
fn disqualifying_a_waiting_bye_player_gives_a_walkover() {
    let (mut orch, ids, _) = orchestrator(5, config());
    orch.start(t0()).unwrap();
    let before = orch.engine().pool().len();

    orch.disqualify([(ids[2], "left".to_string())], t0()).unwrap();
    assert!(orch.team_state(ids[2]).is_none());
    let pool = orch.engine().pool();
    // Starting team plus the bye candidate drawn for them.
    assert_eq!(pool.len(), before + 7);
    assert_eq!(pool.taken() + pool.len(), pool.initial_size());

    orch.report_result(ids[0], ids[4], MatchOutcome::Win, (2, 0), None, t0())
        .unwrap();
    let p1 = orch.player(ids[0]).unwrap();
    assert_eq!((p1.wins, p1.walkovers, p1.round), (1, 1, 3));

    let matches = orch.get_matches_by_round();
    assert_eq!(matches.len(), 1);
    let second = &matches[&2];
    assert_eq!((second[0].player_a, second[0].player_b), (ids[1], ids[3]));
}

#[test]
fn absent_player_is_disqualified_after_timeout() {
    let (mut orch, ids, transport) = orchestrator(2, static_config());
    let events = record_events(&mut orch);
    transport.set_present(ids[0], true);
    orch.start(t0()).unwrap();

    assert!(orch.tick(t0() + Duration::seconds(60)).is_empty());
    assert!(orch.tick(t0() + Duration::seconds(100)).is_empty());
    assert!(transport
        .notifications_for(ids[1])
        .iter()
        .any(|m| m.contains("waiting")));

    let verdicts = orch.tick(t0() + Duration::seconds(300));
    assert_eq!(verdicts.len(), 1);
    assert_eq!(
        verdicts[0].disqualify,
        vec![(ids[1], "not present for their match".to_string())]
    );
    assert_eq!(orch.state(), TournamentState::Completed);
    assert_eq!(orch.winner(), Some(ids[0]));
    assert_eq!(orch.player(ids[0]).unwrap().walkovers, 1);
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&BracketEvent::TournamentEnded {
            winner: Some(ids[0])
        })
    );
}

#[test]
fn failed_liveness_checks_disqualify_both_players() {
    let (mut orch, ids, transport) = orchestrator(2, static_config());
    transport.set_unavailable(true);
    orch.start(t0()).unwrap();

    // Warning at +300, activity deadline at +420, one recheck 15 s later.
    assert!(orch.tick(t0() + Duration::seconds(300)).is_empty());
    assert!(orch.tick(t0() + Duration::seconds(420)).is_empty());
    let verdicts = orch.tick(t0() + Duration::seconds(435));
    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].disqualify.len(), 2);
    assert_eq!(orch.state(), TournamentState::Completed);
    assert_eq!(orch.winner(), None);
    assert!(ids.iter().all(|&id| orch.player(id).unwrap().eliminated));
}

#[test]
fn reported_result_beats_later_timeout() {
    let (mut orch, ids, _) = orchestrator(4, static_config());
    orch.start(t0()).unwrap();
    orch.report_result(ids[0], ids[2], MatchOutcome::Win, (2, 0), None, t0())
        .unwrap();

    // Nobody is present: only the unplayed match times out.
    assert!(orch.tick(t0() + Duration::seconds(100)).is_empty());
    let verdicts = orch.tick(t0() + Duration::seconds(300));
    assert_eq!(verdicts.len(), 1);
    let mut dq = verdicts[0].disqualify.iter().map(|(p, _)| *p).collect::<Vec<_>>();
    dq.sort();
    let mut expected = vec![ids[1], ids[3]];
    expected.sort();
    assert_eq!(dq, expected);

    assert_eq!(orch.player(ids[0]).unwrap().disqualification, None);
    assert_eq!(orch.winner(), Some(ids[0]));
    assert!(orch.tick(t0() + Duration::seconds(900)).is_empty());
}

#[test]
fn started_match_stops_activity_timers() {
    let (mut orch, ids, _) = orchestrator(2, static_config());
    orch.start(t0()).unwrap();
    let root = orch.tree().unwrap().root();
    assert_eq!(
        orch.supervisor_state(root),
        Some(SupervisorState::AwaitingStart { warned: false })
    );

    orch.record_match_started(ids[1], ids[0], t0()).unwrap();
    assert_eq!(orch.supervisor_state(root), Some(SupervisorState::InProgress));
    assert!(orch.tick(t0() + Duration::seconds(1000)).is_empty());
    assert_eq!(orch.state(), TournamentState::InProgress);

    let stranger = uuid::Uuid::new_v4();
    assert!(matches!(
        orch.record_match_started(ids[0], stranger, t0()),
        Err(TournamentError::NoSuchMatch { .. })
    ));
}

#[test]
fn match_opened_by_a_result_is_timed_from_that_result() {
    let (mut orch, ids, transport) = orchestrator(4, static_config());
    orch.start(t0()).unwrap();
    orch.record_match_started(ids[0], ids[2], t0()).unwrap();
    orch.record_match_started(ids[1], ids[3], t0()).unwrap();

    let reported = t0() + Duration::minutes(15);
    orch.report_result(ids[0], ids[2], MatchOutcome::Win, (2, 0), None, reported)
        .unwrap();
    orch.report_result(ids[1], ids[3], MatchOutcome::Win, (2, 0), None, reported)
        .unwrap();
    let root = orch.tree().unwrap().root();
    assert_eq!(
        orch.supervisor_state(root),
        Some(SupervisorState::AwaitingStart { warned: false })
    );

    // A late first poll only warns; the disqualification clock starts there.
    let late = t0() + Duration::minutes(20);
    assert!(orch.tick(late).is_empty());
    assert_eq!(orch.state(), TournamentState::InProgress);
    assert_eq!(
        orch.supervisor_state(root),
        Some(SupervisorState::AwaitingStart { warned: true })
    );
    assert!(transport
        .notifications_for(ids[0])
        .iter()
        .any(|m| m.contains("waiting")));

    assert!(orch.tick(late + Duration::seconds(119)).is_empty());
    let verdicts = orch.tick(late + Duration::seconds(120));
    assert_eq!(verdicts.len(), 1);
    assert_eq!(verdicts[0].node, root);
    assert_eq!(orch.winner(), None);
}

#[test]
fn match_opened_by_a_disqualification_is_timed_from_it() {
    let (mut orch, ids, transport) = orchestrator(4, static_config());
    orch.start(t0()).unwrap();
    orch.report_result(ids[1], ids[3], MatchOutcome::Win, (2, 0), None, t0() + Duration::seconds(30))
        .unwrap();

    let dq_at = t0() + Duration::minutes(10);
    orch.disqualify([(ids[2], "left".to_string())], dq_at).unwrap();
    let root = orch.tree().unwrap().root();
    assert_eq!(orch.tree().unwrap().node(root).state, NodeState::Available);

    assert!(orch.tick(dq_at + Duration::seconds(60)).is_empty());
    assert!(!transport
        .notifications_for(ids[1])
        .iter()
        .any(|m| m.contains("waiting")));
    assert!(orch.tick(dq_at + Duration::seconds(90)).is_empty());
    assert!(transport
        .notifications_for(ids[1])
        .iter()
        .any(|m| m.contains("waiting")));
    assert_eq!(orch.state(), TournamentState::InProgress);
}

#[test]
fn out_of_range_team_size_is_rejected_before_building() {
    let config = TournamentConfig {
        starting_team_size: 0,
        ..config()
    };
    let (mut orch, _, _) = orchestrator(4, config);
    let pool_before = orch.engine().pool().len();

    assert!(matches!(
        orch.start(t0()),
        Err(TournamentError::InvalidConfig(_))
    ));
    assert_eq!(orch.state(), TournamentState::Setup);
    assert!(orch.tree().is_none());
    assert_eq!(orch.engine().pool().len(), pool_before);
    assert_eq!(orch.engine().pool().taken(), 0);
}

#[test]
fn repeated_id_in_setup_batch_removes_once() {
    let (mut orch, ids, _) = orchestrator(4, config());
    orch.disqualify(
        [
            (ids[3], "first".to_string()),
            (ids[3], "second".to_string()),
        ],
        t0(),
    )
    .unwrap();
    assert_eq!(orch.players().len(), 3);
    assert!(orch.player(ids[3]).is_none());
}

fn starting_team(orch: &EliminationOrchestrator, player: uuid::Uuid) -> Vec<Item> {
    orch.team_state(player).unwrap().starting.clone()
}

#[test]
fn legal_battle_is_recorded_as_played() {
    let (mut orch, ids, _) = orchestrator(2, static_config());
    orch.start(t0()).unwrap();
    let (winner_team, loser_team) = (starting_team(&orch, ids[0]), starting_team(&orch, ids[1]));

    let violations = orch
        .report_battle(ids[0], ids[1], (1, 0), &winner_team, &loser_team, t0())
        .unwrap();
    assert!(violations.is_empty());
    assert_eq!(orch.winner(), Some(ids[0]));
    assert_eq!(orch.player(ids[0]).unwrap().wins, 1);
}

#[test]
fn illegal_team_disqualifies_its_owner() {
    let (mut orch, ids, _) = orchestrator(2, static_config());
    orch.start(t0()).unwrap();
    let winner_team = starting_team(&orch, ids[0]);

    let violations = orch
        .report_battle(ids[0], ids[1], (1, 0), &winner_team, &["nonsense".to_string()], t0())
        .unwrap();
    assert_eq!(
        violations,
        vec![TournamentError::IllegalTeamSubmission {
            player: ids[1],
            summary: Some("bring 6 member(s), not 1".to_string())
        }]
    );
    assert_eq!(
        orch.player(ids[1]).unwrap().disqualification.as_deref(),
        Some("illegal team")
    );
    assert_eq!(orch.winner(), Some(ids[0]));
    assert_eq!(orch.player(ids[0]).unwrap().walkovers, 1);
}

#[test]
fn both_illegal_teams_void_the_final() {
    let (mut orch, ids, _) = orchestrator(2, static_config());
    let events = record_events(&mut orch);
    orch.start(t0()).unwrap();
    let junk = vec!["nonsense".to_string()];

    let violations = orch
        .report_battle(ids[0], ids[1], (1, 0), &junk, &junk, t0())
        .unwrap();
    assert_eq!(violations.len(), 2);
    assert_eq!(orch.state(), TournamentState::Completed);
    assert_eq!(orch.winner(), None);
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&BracketEvent::TournamentEnded { winner: None })
    );
}

#[test]
fn force_end_cancels_and_keeps_final_bracket() {
    let (mut orch, ids, _) = orchestrator(4, config());
    let events = record_events(&mut orch);
    orch.start(t0()).unwrap();
    orch.force_end().unwrap();

    assert_eq!(orch.state(), TournamentState::Cancelled);
    assert!(orch.get_matches_by_round().is_empty());
    assert_eq!(orch.get_bracket_snapshot().nodes.len(), 7);
    assert!(orch.tick(t0() + Duration::seconds(900)).is_empty());
    assert!(matches!(
        orch.report_result(ids[0], ids[2], MatchOutcome::Win, (1, 0), None, t0()),
        Err(TournamentError::NoSuchMatch { .. })
    ));
    assert_eq!(orch.force_end(), Err(TournamentError::InvalidState));
    assert_eq!(
        events.lock().unwrap().last(),
        Some(&BracketEvent::TournamentEnded { winner: None })
    );
}

#[test]
fn signups_are_validated() {
    let (mut orch, ids, _) = orchestrator(7, config());
    assert_eq!(orch.add_player("p1"), Err(TournamentError::DuplicatePlayerName));
    assert_eq!(orch.add_player("   "), Err(TournamentError::InvalidState));
    orch.add_player("P8").unwrap();
    assert_eq!(
        orch.add_player("P9"),
        Err(TournamentError::PlayerCapReached { cap: 8 })
    );

    orch.remove_player(ids[6]).unwrap();
    assert_eq!(
        orch.remove_player(ids[6]),
        Err(TournamentError::PlayerNotFound(ids[6]))
    );
    orch.disqualify([(ids[5], "changed their mind".to_string())], t0())
        .unwrap();
    assert_eq!(orch.players().len(), 6);

    orch.start(t0()).unwrap();
    assert_eq!(orch.add_player("Late"), Err(TournamentError::InvalidState));
    assert_eq!(orch.remove_player(ids[0]), Err(TournamentError::InvalidState));
}

#[test]
fn start_needs_two_players() {
    let (mut orch, _, _) = orchestrator(1, config());
    assert_eq!(
        orch.start(t0()),
        Err(TournamentError::NotEnoughPlayers { required: 2 })
    );
    assert_eq!(orch.state(), TournamentState::Setup);
}

#[test]
fn reads_do_not_change_state() {
    let (mut orch, _, _) = orchestrator(5, config());
    let events = record_events(&mut orch);
    orch.start(t0()).unwrap();
    let emitted = events.lock().unwrap().len();

    let first = orch.get_bracket_snapshot();
    let matches = orch.get_matches_by_round();
    assert_eq!(first, orch.get_bracket_snapshot());
    assert_eq!(matches, orch.get_matches_by_round());
    assert_eq!(events.lock().unwrap().len(), emitted);

    assert_eq!(first.nodes.len(), 9);
    assert_eq!(first.byes.len(), 3);
    assert_eq!(first.total_rounds, 3);
    assert!(first
        .nodes
        .iter()
        .filter(|n| n.children.is_none())
        .all(|n| n.occupant_name.is_some()));
}
