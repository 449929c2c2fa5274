//! Full-flow scenarios driven through the engine with the mock game API.
//!
//! Each test feeds classified stream events into the engine exactly as the
//! receiver task would, then awaits the worker pool so detached submissions
//! and reconciliations are observable.

use std::sync::Arc;

use hideout::client::events::{RoomFrame, ServerEvent};
use hideout::client::GameApi;
use hideout::config::AppConfig;
use hideout::engine::{DecisionTrigger, Engine};
use hideout::storage::StrategyProfile;
use hideout::strategy::Strategy;
use hideout::types::{BetOutcome, RoomId, RoundPhase, RunMode};

use crate::mock_api::MockGameApi;

// ---- helpers -----------------------------------------------------------

fn test_config() -> Arc<AppConfig> {
    let mut cfg = AppConfig::default();
    // No reason to wait for the server-side ledger in tests.
    cfg.timing.settle_fetch_delay_ms = 0;
    Arc::new(cfg)
}

fn round_robin_profile() -> StrategyProfile {
    StrategyProfile {
        strategy: Strategy::RoundRobin,
        ..StrategyProfile::default()
    }
}

fn make_engine(
    api: &Arc<MockGameApi>,
    profile: StrategyProfile,
    run_mode: RunMode,
) -> Arc<Engine> {
    let api_dyn: Arc<dyn GameApi> = Arc::clone(api) as Arc<dyn GameApi>;
    Engine::new(test_config(), api_dyn, &profile, run_mode)
}

fn frames() -> Vec<RoomFrame> {
    RoomId::ALL
        .iter()
        .map(|room| RoomFrame {
            room: *room,
            players: 10 + room.0 as u32,
            stake: 100.0 * room.0 as f64,
        })
        .collect()
}

async fn open_round(engine: &Arc<Engine>, id: u64) {
    engine
        .handle_event(ServerEvent::RoundStat {
            round_id: Some(id),
            start_time: None,
            rooms: frames(),
        })
        .await;
}

async fn countdown(engine: &Arc<Engine>, value: u32) {
    engine.handle_event(ServerEvent::Countdown(value)).await;
}

async fn settle(engine: &Arc<Engine>, killed: u8) {
    engine
        .handle_event(ServerEvent::RoundResult {
            killed: RoomId(killed),
        })
        .await;
}

// ---- decision & submission ---------------------------------------------

#[tokio::test]
async fn test_round_flow_places_one_stake() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    let stakes = api.stakes();
    assert_eq!(stakes.len(), 1);
    assert_eq!(stakes[0].round_id, 101);
    // Round-robin starts at the first room.
    assert_eq!(stakes[0].room, RoomId(1));
    assert!((stakes[0].amount - 1.0).abs() < 1e-10);

    let summary = engine.summary().await;
    assert_eq!(summary.phase, RoundPhase::Predicted);
    assert_eq!(summary.predicted, Some(RoomId(1)));
    assert_eq!(summary.bets_placed, 1);
}

#[tokio::test]
async fn test_high_countdown_does_not_trigger() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 30).await;
    engine.pool().wait_idle().await;

    assert!(api.stakes().is_empty());
    assert_eq!(engine.summary().await.phase, RoundPhase::Analyzing);
}

#[tokio::test]
async fn test_second_trigger_is_noop() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    // Countdown keeps ticking and the monitor may race in: none of these
    // may produce a second stake for the same round.
    countdown(&engine, 8).await;
    countdown(&engine, 3).await;
    engine.decide(DecisionTrigger::AnalysisElapsed).await;
    engine.pool().wait_idle().await;

    assert_eq!(api.stakes().len(), 1);
}

#[tokio::test]
async fn test_rejected_stake_is_not_retried() {
    let api = MockGameApi::new(Some(100.0));
    api.set_accept_stakes(false);
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;
    assert_eq!(api.stakes().len(), 1);

    // The round is committed once submitted: later ticks must not resubmit
    // even though the server rejected the stake.
    countdown(&engine, 5).await;
    engine.decide(DecisionTrigger::AnalysisElapsed).await;
    engine.pool().wait_idle().await;
    assert_eq!(api.stakes().len(), 1);
}

#[tokio::test]
async fn test_observe_mode_predicts_without_staking() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Observe);

    open_round(&engine, 101).await;
    countdown(&engine, 5).await;
    engine.pool().wait_idle().await;

    assert!(api.stakes().is_empty());
    let summary = engine.summary().await;
    assert_eq!(summary.phase, RoundPhase::Predicted);
    assert!(summary.predicted.is_some());
}

#[tokio::test]
async fn test_unknown_balance_defers_decision_then_retries() {
    let api = MockGameApi::new(None);
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    // Balance fetch failed: the lock was released and no stake went out.
    assert!(api.stakes().is_empty());
    assert!(api.balance_fetches() >= 1);
    let summary = engine.summary().await;
    assert_eq!(summary.phase, RoundPhase::Analyzing);
    assert!(summary.predicted.is_none());

    // The wallet recovers; the next countdown tick retries and succeeds.
    api.set_balance(Some(50.0));
    countdown(&engine, 8).await;
    engine.pool().wait_idle().await;

    assert_eq!(api.stakes().len(), 1);
    assert_eq!(api.stakes()[0].round_id, 101);
}

// ---- settlement ---------------------------------------------------------

#[tokio::test]
async fn test_settlement_applies_history_and_outcome() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    // Predicted room 1 survives; room 4 is killed.
    api.set_balance(Some(107.0));
    settle(&engine, 4).await;
    engine.pool().wait_idle().await;

    // Exactly one kill, seven survivals.
    assert_eq!(engine.room_history(RoomId(4)).await.kills, 1);
    for room in RoomId::ALL.iter().filter(|r| **r != RoomId(4)) {
        assert_eq!(engine.room_history(*room).await.survivals, 1);
        assert_eq!(engine.room_history(*room).await.kills, 0);
    }

    let bets = engine.bets().await;
    assert_eq!(bets[0].outcome, BetOutcome::Won);
    assert_eq!(bets[0].win_streak_at_time, 1);
    // Exact delta from the captured before-snapshot: 107 - 100.
    assert_eq!(bets[0].balance_delta, Some(7.0));

    let summary = engine.summary().await;
    assert_eq!(summary.phase, RoundPhase::Settled);
    assert_eq!(summary.win_streak, 1);
    assert!((summary.current_stake - 1.0).abs() < 1e-10);
}

#[tokio::test]
async fn test_settlement_replay_is_idempotent() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    settle(&engine, 4).await;
    settle(&engine, 4).await;
    settle(&engine, 5).await; // even a contradictory replay is ignored
    engine.pool().wait_idle().await;

    assert_eq!(engine.room_history(RoomId(4)).await.kills, 1);
    assert_eq!(engine.room_history(RoomId(5)).await.kills, 0);
    assert_eq!(engine.room_history(RoomId(1)).await.survivals, 1);
    assert_eq!(engine.summary().await.win_streak, 1);
}

#[tokio::test]
async fn test_martingale_progression_across_rounds() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    // Round 1: round-robin picks room 1; the killer takes it. Loss.
    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;
    settle(&engine, 1).await;
    engine.pool().wait_idle().await;

    let summary = engine.summary().await;
    assert_eq!(summary.lose_streak, 1);
    assert!((summary.current_stake - 2.0).abs() < 1e-10);

    // Round 2: stake doubles; room 2 predicted and survives. Win.
    open_round(&engine, 102).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    let stakes = api.stakes();
    assert_eq!(stakes.len(), 2);
    assert_eq!(stakes[1].room, RoomId(2));
    assert!((stakes[1].amount - 2.0).abs() < 1e-10);

    settle(&engine, 8).await;
    engine.pool().wait_idle().await;

    let summary = engine.summary().await;
    assert_eq!(summary.win_streak, 1);
    assert_eq!(summary.lose_streak, 0);
    assert!((summary.current_stake - 1.0).abs() < 1e-10);

    let bets = engine.bets().await;
    assert_eq!(bets[0].outcome, BetOutcome::Lost);
    assert_eq!(bets[1].outcome, BetOutcome::Won);
}

// ---- skip policies -------------------------------------------------------

#[tokio::test]
async fn test_rest_after_losses_skips_rounds() {
    let api = MockGameApi::new(Some(100.0));
    let profile = StrategyProfile {
        rest_after_n_losses: 2,
        ..round_robin_profile()
    };
    let engine = make_engine(&api, profile, RunMode::Auto);

    // Lose round 1.
    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;
    settle(&engine, 1).await;
    engine.pool().wait_idle().await;

    // Rounds 2 and 3: predictions surface but no stake is sent.
    for id in [102u64, 103] {
        open_round(&engine, id).await;
        countdown(&engine, 9).await;
        engine.pool().wait_idle().await;
        assert_eq!(engine.summary().await.phase, RoundPhase::Predicted);
        settle(&engine, 8).await;
        engine.pool().wait_idle().await;
    }
    assert_eq!(api.stakes().len(), 1);

    // Round 4: the rest counter is spent; staking resumes.
    open_round(&engine, 104).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;
    assert_eq!(api.stakes().len(), 2);
    assert_eq!(api.stakes()[1].round_id, 104);
}

#[tokio::test]
async fn test_rest_every_n_rounds_inserts_skip() {
    let api = MockGameApi::new(Some(100.0));
    let profile = StrategyProfile {
        rest_every_n_rounds: 1,
        ..round_robin_profile()
    };
    let engine = make_engine(&api, profile, RunMode::Auto);

    for id in [101u64, 102, 103] {
        open_round(&engine, id).await;
        countdown(&engine, 9).await;
        engine.pool().wait_idle().await;
        settle(&engine, 8).await;
        engine.pool().wait_idle().await;
    }

    // Rounds 101 and 103 staked; 102 was the mandated rest.
    let rounds: Vec<u64> = api.stakes().iter().map(|s| s.round_id).collect();
    assert_eq!(rounds, vec![101, 103]);
}

// ---- stop conditions ------------------------------------------------------

#[tokio::test]
async fn test_profit_target_stops_the_agent() {
    let api = MockGameApi::new(Some(100.0));
    let profile = StrategyProfile {
        profit_target: Some(105.0),
        stop_on_profit: true,
        ..round_robin_profile()
    };
    let engine = make_engine(&api, profile, RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    // The win pushes the balance past the target before settlement lands.
    api.set_balance(Some(110.0));
    engine.refresh_balance().await;
    settle(&engine, 8).await;
    engine.pool().wait_idle().await;

    assert!(engine.is_stopped());

    // No further decisions once stopped.
    open_round(&engine, 102).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;
    assert_eq!(api.stakes().len(), 1);
}

#[tokio::test]
async fn test_loss_floor_stops_the_agent() {
    let api = MockGameApi::new(Some(100.0));
    let profile = StrategyProfile {
        loss_floor: Some(95.0),
        stop_on_loss: true,
        ..round_robin_profile()
    };
    let engine = make_engine(&api, profile, RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    api.set_balance(Some(90.0));
    engine.refresh_balance().await;
    settle(&engine, 1).await;
    engine.pool().wait_idle().await;

    assert!(engine.is_stopped());
}

#[tokio::test]
async fn test_unaffordable_base_stake_is_fatal() {
    let api = MockGameApi::new(Some(2.0));
    let profile = StrategyProfile {
        base_stake: 5.0,
        ..round_robin_profile()
    };
    let engine = make_engine(&api, profile, RunMode::Auto);

    open_round(&engine, 101).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    assert!(api.stakes().is_empty());
    assert!(engine.is_stopped());
}

#[tokio::test]
async fn test_unaffordable_progression_resets_to_base() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    // Three straight losses: the schedule wants 8.0 next.
    for (id, killed) in [(101u64, 1u8), (102, 2), (103, 3)] {
        open_round(&engine, id).await;
        countdown(&engine, 9).await;
        engine.pool().wait_idle().await;
        settle(&engine, killed).await;
        engine.pool().wait_idle().await;
    }
    assert!((engine.summary().await.current_stake - 8.0).abs() < 1e-10);

    // Balance only covers the base stake: the progression resets.
    api.set_balance(Some(3.0));
    engine.refresh_balance().await;
    open_round(&engine, 104).await;
    countdown(&engine, 9).await;
    engine.pool().wait_idle().await;

    let stakes = api.stakes();
    assert_eq!(stakes.len(), 4);
    assert!((stakes[3].amount - 1.0).abs() < 1e-10);
    assert!(!engine.is_stopped());
}

// ---- session entry ---------------------------------------------------------

#[tokio::test]
async fn test_session_entry_seeds_statistics() {
    let api = MockGameApi::new(Some(100.0));
    let engine = make_engine(&api, round_robin_profile(), RunMode::Auto);

    engine
        .handle_event(ServerEvent::SessionEntered {
            start_time: None,
            end_time: None,
            last_killed: Some(RoomId(6)),
            rooms: frames(),
        })
        .await;

    // Seeding must not fabricate history counters.
    assert_eq!(engine.room_history(RoomId(6)).await.kills, 0);

    // But the follow-killer strategy sees the seeded last kill.
    let api2 = MockGameApi::new(Some(100.0));
    let profile = StrategyProfile {
        strategy: Strategy::FollowKiller,
        ..StrategyProfile::default()
    };
    let engine2 = make_engine(&api2, profile, RunMode::Auto);
    engine2
        .handle_event(ServerEvent::SessionEntered {
            start_time: None,
            end_time: None,
            last_killed: Some(RoomId(6)),
            rooms: frames(),
        })
        .await;
    open_round(&engine2, 201).await;
    countdown(&engine2, 9).await;
    engine2.pool().wait_idle().await;

    assert_eq!(api2.stakes()[0].room, RoomId(6));
}
