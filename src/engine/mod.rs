//! The state-owning engine.
//!
//! All mutable agent state — round machine, room statistics, selector,
//! money manager, bet ledger, balances — lives inside one mutex-guarded
//! struct with command-style operations. The stream receiver, liveness
//! monitor, and balance poller all go through these operations; nothing
//! writes a field from outside. Detached work (stake submission and
//! settlement reconciliation) runs on the supervised [`workers::WorkerPool`]
//! so it never blocks the receiver and tests can await completion.

pub mod monitor;
pub mod round;
pub mod workers;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::client::events::ServerEvent;
use crate::client::GameApi;
use crate::config::AppConfig;
use crate::money::MoneyManager;
use crate::stats::{RoomHistory, RoomTracker};
use crate::storage::StrategyProfile;
use crate::strategy::Selector;
use crate::types::{Balances, BetOutcome, PendingBet, RoomId, RoundPhase, RunMode};

use round::RoundTracker;
use workers::WorkerPool;

/// Submitted-bet ring buffer length.
const BET_HISTORY_CAP: usize = 200;

/// Concurrent detached jobs (submissions + reconciliations).
const WORKER_LIMIT: usize = 8;

// ---------------------------------------------------------------------------
// Bet ledger
// ---------------------------------------------------------------------------

/// Ring buffer of submitted bets plus the submitted-round-id set that
/// enforces one stake per round.
#[derive(Debug, Default)]
struct BetLedger {
    bets: VecDeque<PendingBet>,
    submitted: HashSet<u64>,
}

impl BetLedger {
    /// Claim the round id for submission. False if already claimed.
    fn try_claim(&mut self, round_id: u64) -> bool {
        self.submitted.insert(round_id)
    }

    fn record(&mut self, bet: PendingBet) {
        if self.bets.len() == BET_HISTORY_CAP {
            self.bets.pop_front();
        }
        self.bets.push_back(bet);
    }

    /// Most recent bet for a round id (scanning backwards).
    fn latest_for_round_mut(&mut self, round_id: u64) -> Option<&mut PendingBet> {
        self.bets
            .iter_mut()
            .rev()
            .find(|b| b.round_id == round_id)
    }
}

// ---------------------------------------------------------------------------
// Engine state
// ---------------------------------------------------------------------------

struct EngineState {
    rounds: RoundTracker,
    rooms: RoomTracker,
    selector: Selector,
    money: MoneyManager,
    ledger: BetLedger,
    balances: Balances,
    run_mode: RunMode,

    /// Rest one round after this many consecutive staked rounds (0 = off).
    rest_every_n_rounds: u32,
    staked_since_rest: u32,
    skip_next_round: bool,

    /// Rest this many rounds after each loss (0 = off).
    rest_after_n_losses: u32,
    rest_rounds_remaining: u32,
}

/// What fired the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionTrigger {
    /// Server countdown reached the threshold.
    Countdown,
    /// The analysis window elapsed without a countdown trigger.
    AnalysisElapsed,
}

/// Plan produced under the lock in the first decision phase.
struct DecisionPlan {
    round_id: u64,
    room: RoomId,
    balance: Option<f64>,
    strategy_id: &'static str,
}

/// Inputs for a deferred settlement reconciliation.
struct ReconcileJob {
    round_id: u64,
    won: bool,
    amount: f64,
    /// Balance snapshot captured before settlement was applied.
    before: Option<f64>,
}

/// Point-in-time view of the engine for logs and tests.
#[derive(Debug, Clone)]
pub struct EngineSummary {
    pub round_id: Option<u64>,
    pub round_index: u64,
    pub phase: RoundPhase,
    pub predicted: Option<RoomId>,
    pub balance: Option<f64>,
    pub cumulative_profit: f64,
    pub current_stake: f64,
    pub win_streak: u32,
    pub lose_streak: u32,
    pub max_win_streak: u32,
    pub max_lose_streak: u32,
    pub bets_placed: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    state: Mutex<EngineState>,
    api: Arc<dyn GameApi>,
    cfg: Arc<AppConfig>,
    pool: WorkerPool,
    stop_tx: watch::Sender<bool>,
    // Retained so the watch channel stays open even when no external task is
    // subscribed; otherwise `stop_tx.send` would fail and the flag never sets.
    _stop_rx: watch::Receiver<bool>,
}

impl Engine {
    pub fn new(
        cfg: Arc<AppConfig>,
        api: Arc<dyn GameApi>,
        profile: &StrategyProfile,
        run_mode: RunMode,
    ) -> Arc<Self> {
        let (stop_tx, _stop_rx) = watch::channel(false);
        Arc::new(Self {
            state: Mutex::new(EngineState {
                rounds: RoundTracker::new(),
                rooms: RoomTracker::new(),
                selector: Selector::new(profile.strategy),
                money: MoneyManager::from_profile(profile),
                ledger: BetLedger::default(),
                balances: Balances::default(),
                run_mode,
                rest_every_n_rounds: profile.rest_every_n_rounds,
                staked_since_rest: 0,
                skip_next_round: false,
                rest_after_n_losses: profile.rest_after_n_losses,
                rest_rounds_remaining: 0,
            }),
            api,
            cfg,
            pool: WorkerPool::new(WORKER_LIMIT),
            stop_tx,
            _stop_rx,
        })
    }

    // -- Stop flag ---------------------------------------------------------

    /// Subscribe to the process-wide stop flag.
    pub fn stop_rx(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Raise the stop flag: no further stakes or round transitions, and the
    /// stream connection closes. In-flight detached jobs may finish.
    pub fn shutdown(&self, reason: &str) {
        if !self.is_stopped() {
            info!(reason, "Stop flag raised");
            let _ = self.stop_tx.send(true);
        }
    }

    /// The detached-work pool (tests await its quiescence).
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    // -- Event routing -------------------------------------------------------

    /// Route a classified stream event. Called by the receiver task, one
    /// event at a time in arrival order.
    pub async fn handle_event(self: &Arc<Self>, event: ServerEvent) {
        if self.is_stopped() {
            return;
        }
        match event {
            ServerEvent::SessionEntered {
                start_time,
                end_time,
                last_killed,
                rooms,
            } => {
                let mut s = self.state.lock().await;
                for frame in &rooms {
                    s.rooms.apply_frame(frame.room, frame.players, frame.stake);
                }
                if let Some(last) = last_killed {
                    s.rooms.seed_last_killed(last);
                }
                s.rounds.seed_times(start_time, end_time);
                info!(rooms = rooms.len(), last_killed = ?last_killed, "Session entered");
            }

            ServerEvent::RoundStat {
                round_id,
                start_time,
                rooms,
            } => {
                let mut s = self.state.lock().await;
                for frame in &rooms {
                    s.rooms.apply_frame(frame.room, frame.players, frame.stake);
                }
                if let Some(id) = round_id {
                    if s.rounds.observe_round(id, start_time, None) {
                        info!(
                            round = id,
                            index = s.rounds.round_index(),
                            "New round opened"
                        );
                    }
                }
            }

            ServerEvent::Countdown(value) => {
                let due = {
                    let mut s = self.state.lock().await;
                    s.rounds.set_countdown(value);
                    s.rounds.countdown_trigger_due(self.cfg.game.countdown_trigger)
                };
                if due {
                    self.decide(DecisionTrigger::Countdown).await;
                }
            }

            ServerEvent::RoundResult { killed } => {
                self.apply_settlement(killed).await;
            }
        }
    }

    // -- Decision ------------------------------------------------------------

    /// Make the one-shot round decision: lock the prediction, evaluate skip
    /// policies, size the stake, and hand submission to the pool.
    ///
    /// Both triggers funnel here; the prediction-lock CAS inside
    /// [`RoundTracker::try_lock`] makes them mutually exclusive.
    pub async fn decide(self: &Arc<Self>, trigger: DecisionTrigger) {
        if self.is_stopped() {
            return;
        }

        // Phase 1 (locked): claim the round and predict.
        let plan = {
            let mut guard = self.state.lock().await;
            let s = &mut *guard;
            if s.money.stopped().is_some() {
                return;
            }
            if !s.rounds.try_lock() {
                return;
            }
            let Some(round_id) = s.rounds.round_id() else {
                return;
            };

            let room = s.selector.choose(&s.rooms);
            s.rounds.mark_predicted(room);
            info!(
                round = round_id,
                room = %room,
                strategy = s.selector.strategy().id(),
                trigger = ?trigger,
                "Prediction locked"
            );

            // Skip policies, in order; each surfaces the prediction but
            // short-circuits betting for this round.
            if s.rest_rounds_remaining > 0 {
                s.rest_rounds_remaining -= 1;
                info!(
                    remaining = s.rest_rounds_remaining,
                    "Resting after loss, no stake this round"
                );
                return;
            }
            if s.skip_next_round {
                s.skip_next_round = false;
                info!("Skipping one round, no stake");
                return;
            }
            if s.run_mode != RunMode::Auto {
                return;
            }

            DecisionPlan {
                round_id,
                room,
                balance: s.balances.primary,
                strategy_id: s.selector.strategy().id(),
            }
        };

        // Phase 2 (unlocked): one best-effort balance refresh if unknown.
        let balance = match plan.balance {
            Some(b) => b,
            None => match self.api.fetch_balances().await {
                Ok(fresh) if fresh.primary.is_some() => {
                    let mut s = self.state.lock().await;
                    s.balances.merge(fresh);
                    let primary = s.balances.primary;
                    if let Some(p) = primary {
                        s.money.observe_balance(p);
                    }
                    match primary {
                        Some(p) => p,
                        None => return,
                    }
                }
                _ => {
                    warn!(
                        round = plan.round_id,
                        "Balance unknown at decision time, releasing lock for retry"
                    );
                    let mut s = self.state.lock().await;
                    if s.rounds.round_id() == Some(plan.round_id) {
                        s.rounds.release_lock();
                    }
                    return;
                }
            },
        };

        // Phase 3 (locked): size the stake and claim the submission slot.
        let submission = {
            let mut guard = self.state.lock().await;
            let s = &mut *guard;
            if s.rounds.round_id() != Some(plan.round_id)
                || s.rounds.phase() == RoundPhase::Settled
            {
                // Round moved on or settled while we were off the lock.
                return;
            }

            let amount = match s.money.plan_stake(balance) {
                Ok(a) => a,
                Err(e) => {
                    warn!(error = %e, "Base stake unaffordable");
                    self.shutdown("insufficient funds");
                    return;
                }
            };

            if !s.ledger.try_claim(plan.round_id) {
                debug!(round = plan.round_id, "Stake already submitted for round");
                return;
            }

            s.ledger.record(PendingBet {
                round_id: plan.round_id,
                room: plan.room,
                amount,
                submitted_at: Utc::now(),
                strategy: plan.strategy_id.to_string(),
                outcome: BetOutcome::Pending,
                balance_delta: None,
                win_streak_at_time: s.money.win_streak,
                lose_streak_at_time: s.money.lose_streak,
            });

            s.staked_since_rest += 1;
            if s.rest_every_n_rounds > 0 && s.staked_since_rest >= s.rest_every_n_rounds {
                s.skip_next_round = true;
                s.staked_since_rest = 0;
            }

            (plan.round_id, plan.room, amount)
        };

        // Phase 4 (detached): submit without blocking the receiver.
        let (round_id, room, amount) = submission;
        let api = Arc::clone(&self.api);
        self.pool.spawn(async move {
            match api.place_stake(round_id, room, amount).await {
                Ok(ack) if ack.accepted => {
                    info!(round = round_id, room = %room, amount, "Stake accepted");
                }
                Ok(ack) => {
                    warn!(round = round_id, ack = %ack, "Stake rejected");
                }
                Err(e) => {
                    warn!(round = round_id, error = %e, "Stake submission failed");
                }
            }
        });
    }

    // -- Settlement ----------------------------------------------------------

    /// Apply a settlement event: statistics, matching bet, money manager,
    /// stop conditions; then schedule the deferred balance reconciliation.
    /// Idempotent per round id.
    pub async fn apply_settlement(self: &Arc<Self>, killed: RoomId) {
        let (reconcile, stop_reason) = {
            let mut guard = self.state.lock().await;
            let s = &mut *guard;

            let Some(round_id) = s.rounds.begin_settlement(killed) else {
                debug!(killed = %killed, "Duplicate or out-of-round settlement ignored");
                return;
            };

            let round_index = s.rounds.round_index();
            s.rooms.apply_settlement(killed, round_index);
            info!(round = round_id, killed = %killed, "Round settled");

            let before = s.balances.primary;
            let mut reconcile = None;

            let matched = s
                .ledger
                .latest_for_round_mut(round_id)
                .map(|bet| (bet.room != killed, bet.amount));

            if let Some((won, amount)) = matched {
                if won {
                    s.money.record_win();
                } else {
                    s.money.record_loss();
                    if s.rest_after_n_losses > 0 {
                        s.rest_rounds_remaining = s.rest_after_n_losses;
                    }
                }

                if let Some(bet) = s.ledger.latest_for_round_mut(round_id) {
                    bet.outcome = if won { BetOutcome::Won } else { BetOutcome::Lost };
                    bet.win_streak_at_time = s.money.win_streak;
                    bet.lose_streak_at_time = s.money.lose_streak;
                }

                info!(
                    round = round_id,
                    won,
                    next_stake = format!("{:.2}", s.money.current_stake()),
                    win_streak = s.money.win_streak,
                    lose_streak = s.money.lose_streak,
                    "Bet resolved"
                );

                reconcile = Some(ReconcileJob {
                    round_id,
                    won,
                    amount,
                    before,
                });
            }

            // Stop conditions are evaluated only after the settlement has
            // been fully applied to statistics and the money manager.
            let stop_reason = match s.balances.primary {
                Some(balance) => s.money.evaluate_stops(balance),
                None => None,
            };

            (reconcile, stop_reason)
        };

        if let Some(reason) = stop_reason {
            self.shutdown(&reason.to_string());
        }

        if let Some(job) = reconcile {
            let this = Arc::clone(self);
            self.pool.spawn(async move {
                this.reconcile_bet(job).await;
            });
        }
    }

    /// Deferred post-settlement balance read. Computes the exact delta from
    /// the captured pre-settlement snapshot, or falls back to the estimate
    /// (`±stake`, wins scaled by the configured payout multiple).
    async fn reconcile_bet(&self, job: ReconcileJob) {
        tokio::time::sleep(Duration::from_millis(self.cfg.timing.settle_fetch_delay_ms)).await;

        let fetched = match self.api.fetch_balances().await {
            Ok(b) => Some(b),
            Err(e) => {
                warn!(round = job.round_id, error = %e, "Reconciliation fetch failed");
                None
            }
        };

        let mut s = self.state.lock().await;
        if let Some(fresh) = fetched {
            s.balances.merge(fresh);
            if let Some(p) = s.balances.primary {
                s.money.observe_balance(p);
            }
        }

        let after = fetched.and_then(|b| b.primary);
        let delta = settlement_delta(
            job.before,
            after,
            job.won,
            job.amount,
            self.cfg.game.estimated_win_multiple,
        );

        if let Some(delta) = delta {
            if let Some(bet) = s.ledger.latest_for_round_mut(job.round_id) {
                bet.balance_delta = Some(delta);
            }
            debug!(
                round = job.round_id,
                delta = format!("{delta:+.4}"),
                "Bet delta reconciled"
            );
        }
    }

    // -- Periodic operations --------------------------------------------------

    /// Refresh balances (balance poller). Returns the observed delta when a
    /// fresh primary balance arrived.
    pub async fn refresh_balance(&self) -> Option<f64> {
        match self.api.fetch_balances().await {
            Ok(fresh) => {
                let mut s = self.state.lock().await;
                let previous = s.balances.primary;
                s.balances.merge(fresh);
                let current = s.balances.primary?;
                s.money.observe_balance(current);

                let delta = previous.map(|p| current - p).unwrap_or(0.0);
                if previous.is_none() || delta.abs() > 0.0 {
                    info!(
                        balance = format!("{current:.2}"),
                        delta = format!("{delta:+.2}"),
                        profit = format!("{:+.2}", s.money.cumulative_profit()),
                        "Balance updated"
                    );
                }
                Some(delta)
            }
            Err(e) => {
                debug!(error = %e, "Balance poll failed");
                None
            }
        }
    }

    /// Fire the elapsed-analysis decision trigger if due (liveness monitor).
    pub async fn tick_analysis_deadline(self: &Arc<Self>) {
        let due = {
            let s = self.state.lock().await;
            s.rounds.analysis_trigger_due(self.cfg.game.analysis_secs)
        };
        if due {
            self.decide(DecisionTrigger::AnalysisElapsed).await;
        }
    }

    // -- Introspection ---------------------------------------------------------

    pub async fn summary(&self) -> EngineSummary {
        let s = self.state.lock().await;
        EngineSummary {
            round_id: s.rounds.round_id(),
            round_index: s.rounds.round_index(),
            phase: s.rounds.phase(),
            predicted: s.rounds.predicted(),
            balance: s.balances.primary,
            cumulative_profit: s.money.cumulative_profit(),
            current_stake: s.money.current_stake(),
            win_streak: s.money.win_streak,
            lose_streak: s.money.lose_streak,
            max_win_streak: s.money.max_win_streak,
            max_lose_streak: s.money.max_lose_streak,
            bets_placed: s.ledger.bets.len(),
        }
    }

    /// Snapshot of the submitted-bet history, oldest first.
    pub async fn bets(&self) -> Vec<PendingBet> {
        let s = self.state.lock().await;
        s.ledger.bets.iter().cloned().collect()
    }

    /// One room's historical counters.
    pub async fn room_history(&self, room: RoomId) -> RoomHistory {
        let s = self.state.lock().await;
        s.rooms.history(room)
    }
}

// ---------------------------------------------------------------------------
// Settlement delta
// ---------------------------------------------------------------------------

/// Delta for a settled bet: exact when both balance snapshots exist,
/// estimated from the stake when the pre-settlement snapshot is missing,
/// unknown when the deferred read failed entirely.
fn settlement_delta(
    before: Option<f64>,
    after: Option<f64>,
    won: bool,
    amount: f64,
    win_multiple: f64,
) -> Option<f64> {
    match (before, after) {
        (Some(before), Some(after)) => Some(after - before),
        (None, Some(_)) => Some(if won { amount * win_multiple } else { -amount }),
        (_, None) => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
