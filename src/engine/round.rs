//! Round lifecycle state machine.
//!
//! Pure state — no I/O, no clocks of its own — so every transition is unit
//! testable. The engine drives it from stream events and monitor ticks.
//!
//! Lifecycle: a new round id moves the machine into `Analyzing` and clears
//! the prediction lock; the decision trigger (countdown at or under the
//! threshold, or the analysis window elapsing) may claim the lock exactly
//! once per round; settlement moves to `Settled` and is idempotent per
//! round id.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Instant;

use crate::types::{Round, RoundPhase, RoomId};

#[derive(Debug)]
pub struct RoundTracker {
    round: Option<Round>,
    phase: RoundPhase,
    locked: bool,
    predicted: Option<RoomId>,
    countdown: Option<u32>,
    analysis_started: Option<Instant>,
    /// Process-local count of rounds observed, used as the history index.
    round_index: u64,
    /// Round ids whose settlement has already been applied.
    settled: HashSet<u64>,
}

impl Default for RoundTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundTracker {
    pub fn new() -> Self {
        Self {
            round: None,
            phase: RoundPhase::Waiting,
            locked: false,
            predicted: None,
            countdown: None,
            analysis_started: None,
            round_index: 0,
            settled: HashSet::new(),
        }
    }

    // -- Round transitions -------------------------------------------------

    /// Observe a round id from telemetry. A previously unseen id supersedes
    /// the current round: the kill marker, prediction lock, and countdown
    /// all reset and analysis restarts. Returns true when a new round began.
    pub fn observe_round(
        &mut self,
        id: u64,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> bool {
        if self.round.as_ref().is_some_and(|r| r.id == id) {
            if let Some(round) = self.round.as_mut() {
                if start_time.is_some() {
                    round.start_time = start_time;
                }
                if end_time.is_some() {
                    round.end_time = end_time;
                }
            }
            return false;
        }

        let mut round = Round::new(id);
        round.start_time = start_time.or_else(|| Some(Utc::now()));
        round.end_time = end_time;
        self.round = Some(round);
        self.phase = RoundPhase::Analyzing;
        self.locked = false;
        self.predicted = None;
        self.countdown = None;
        self.analysis_started = Some(Instant::now());
        self.round_index += 1;
        true
    }

    /// Record advisory session times without opening a round.
    pub fn seed_times(
        &mut self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) {
        if let Some(round) = self.round.as_mut() {
            if start_time.is_some() {
                round.start_time = start_time;
            }
            if end_time.is_some() {
                round.end_time = end_time;
            }
        }
    }

    pub fn set_countdown(&mut self, value: u32) {
        self.countdown = Some(value);
    }

    // -- Decision trigger ---------------------------------------------------

    /// Whether the countdown-based trigger should fire now.
    pub fn countdown_trigger_due(&self, threshold: u32) -> bool {
        self.phase == RoundPhase::Analyzing
            && !self.locked
            && self.countdown.is_some_and(|c| c <= threshold)
    }

    /// Whether the elapsed-analysis trigger should fire now.
    pub fn analysis_trigger_due(&self, analysis_secs: f64) -> bool {
        self.phase == RoundPhase::Analyzing
            && !self.locked
            && self
                .analysis_started
                .is_some_and(|t| t.elapsed().as_secs_f64() >= analysis_secs)
    }

    /// Claim the prediction lock (compare-and-set). Returns false if no
    /// round is open or a decision was already locked for this round.
    pub fn try_lock(&mut self) -> bool {
        if self.round.is_none() || self.locked || self.phase == RoundPhase::Settled {
            return false;
        }
        self.locked = true;
        true
    }

    /// Release the lock after a deferred decision (unknown balance), so the
    /// next trigger can retry within the same round.
    pub fn release_lock(&mut self) {
        self.locked = false;
        self.predicted = None;
        if self.phase == RoundPhase::Predicted {
            self.phase = RoundPhase::Analyzing;
        }
    }

    /// Record the chosen room and move to `Predicted`.
    pub fn mark_predicted(&mut self, room: RoomId) {
        self.predicted = Some(room);
        self.phase = RoundPhase::Predicted;
    }

    // -- Settlement ---------------------------------------------------------

    /// Begin settlement for the current round. Returns the round id exactly
    /// once per round; replays and settlements without an open round return
    /// None.
    pub fn begin_settlement(&mut self, killed: RoomId) -> Option<u64> {
        let round = self.round.as_mut()?;
        if round.killed_room.is_some() || self.settled.contains(&round.id) {
            return None;
        }
        round.killed_room = Some(killed);
        self.settled.insert(round.id);
        self.phase = RoundPhase::Settled;
        Some(round.id)
    }

    // -- Accessors ----------------------------------------------------------

    pub fn round_id(&self) -> Option<u64> {
        self.round.as_ref().map(|r| r.id)
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn predicted(&self) -> Option<RoomId> {
        self.predicted
    }

    pub fn countdown(&self) -> Option<u32> {
        self.countdown
    }

    pub fn round_index(&self) -> u64 {
        self.round_index
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
