//! Room statistics store.
//!
//! Tracks two kinds of state per room: live counters (player count and stake
//! volume, overwritten wholesale on every telemetry frame) and historical
//! outcome counters (kills/survivals, mutated exactly once per settlement).
//! Also keeps the bounded killer-profile window and the recent-kill log used
//! by the adversary-modelling strategies.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::types::RoomId;

/// Killer-profile window length (settlements remembered).
const KILLER_PROFILE_CAP: usize = 20;

/// Recent-kill log length (rounds remembered).
const KILL_LOG_CAP: usize = 10;

// ---------------------------------------------------------------------------
// Per-room state
// ---------------------------------------------------------------------------

/// Live counters for one room, valid for the current frame only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RoomLive {
    pub players: u32,
    pub stake: f64,
}

/// Historical outcome counters for one room, accumulated over the process
/// lifetime.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RoomHistory {
    pub kills: u32,
    pub survivals: u32,
    pub last_kill_round: Option<u64>,
    /// Player count seen in the frame before the current one.
    pub prev_players: u32,
    /// Stake volume seen in the frame before the current one.
    pub prev_stake: f64,
}

impl RoomHistory {
    /// Laplace-smoothed survival rate: (survivals+1)/(kills+survivals+2).
    pub fn survival_rate(&self) -> f64 {
        (self.survivals as f64 + 1.0) / (self.kills as f64 + self.survivals as f64 + 2.0)
    }

    /// Laplace-smoothed kill rate: (kills+1)/(kills+survivals+2).
    pub fn kill_rate(&self) -> f64 {
        (self.kills as f64 + 1.0) / (self.kills as f64 + self.survivals as f64 + 2.0)
    }
}

/// Snapshot of the killed room's crowd/stake conditions at settlement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KillerSnapshot {
    pub players: u32,
    pub stake: f64,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// The statistics store for the whole room set.
#[derive(Debug, Clone)]
pub struct RoomTracker {
    live: BTreeMap<RoomId, RoomLive>,
    history: BTreeMap<RoomId, RoomHistory>,
    killer_profile: VecDeque<KillerSnapshot>,
    kill_log: VecDeque<RoomId>,
    last_killed: Option<RoomId>,
}

impl Default for RoomTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomTracker {
    pub fn new() -> Self {
        let mut live = BTreeMap::new();
        let mut history = BTreeMap::new();
        for room in RoomId::ALL {
            live.insert(room, RoomLive::default());
            history.insert(room, RoomHistory::default());
        }
        Self {
            live,
            history,
            killer_profile: VecDeque::with_capacity(KILLER_PROFILE_CAP),
            kill_log: VecDeque::with_capacity(KILL_LOG_CAP),
            last_killed: None,
        }
    }

    // -- Telemetry path ---------------------------------------------------

    /// Apply one room's counters from a telemetry frame.
    ///
    /// Frames may cover only a subset of rooms; unreported rooms keep their
    /// previous live values. The pre-update counters are retained as the
    /// previous-frame snapshot so spike detection has something to diff
    /// against.
    pub fn apply_frame(&mut self, room: RoomId, players: u32, stake: f64) {
        if !room.is_known() {
            return;
        }
        let live = self.live.entry(room).or_default();
        let prev = *live;
        *live = RoomLive { players, stake };

        let hist = self.history.entry(room).or_default();
        hist.prev_players = prev.players;
        hist.prev_stake = prev.stake;
    }

    // -- Settlement path --------------------------------------------------

    /// Apply a settlement: the killed room's kill counter increments, every
    /// other room's survival counter increments, and the killed room's live
    /// conditions are appended to the killer profile.
    pub fn apply_settlement(&mut self, killed: RoomId, round_index: u64) {
        for room in RoomId::ALL {
            let hist = self.history.entry(room).or_default();
            if room == killed {
                hist.kills += 1;
                hist.last_kill_round = Some(round_index);
            } else {
                hist.survivals += 1;
            }
        }

        let conditions = self.live.get(&killed).copied().unwrap_or_default();
        if self.killer_profile.len() == KILLER_PROFILE_CAP {
            self.killer_profile.pop_front();
        }
        self.killer_profile.push_back(KillerSnapshot {
            players: conditions.players,
            stake: conditions.stake,
        });

        if self.kill_log.len() == KILL_LOG_CAP {
            self.kill_log.pop_front();
        }
        self.kill_log.push_back(killed);
        self.last_killed = Some(killed);
    }

    /// Record the last-killed room reported by a session-entry frame, without
    /// touching the counters (the settlement it belongs to predates us).
    pub fn seed_last_killed(&mut self, room: RoomId) {
        self.last_killed = Some(room);
    }

    // -- Accessors --------------------------------------------------------

    pub fn live(&self, room: RoomId) -> RoomLive {
        self.live.get(&room).copied().unwrap_or_default()
    }

    pub fn history(&self, room: RoomId) -> RoomHistory {
        self.history.get(&room).copied().unwrap_or_default()
    }

    pub fn last_killed(&self) -> Option<RoomId> {
        self.last_killed
    }

    pub fn killer_profile(&self) -> &VecDeque<KillerSnapshot> {
        &self.killer_profile
    }

    /// The room killed two rounds ago, if the log reaches back that far.
    pub fn killed_two_rounds_ago(&self) -> Option<RoomId> {
        if self.kill_log.len() >= 2 {
            self.kill_log.get(self.kill_log.len() - 2).copied()
        } else {
            None
        }
    }

    /// Whether any live counter is non-zero (false on cold start).
    pub fn has_live_activity(&self) -> bool {
        self.live.values().any(|l| l.players > 0 || l.stake > 0.0)
    }

    /// Highest live player count across rooms, floored at 1 for use as a
    /// normalizing divisor.
    pub fn max_players(&self) -> u32 {
        self.live.values().map(|l| l.players).max().unwrap_or(0).max(1)
    }

    /// Highest live stake volume across rooms, floored at 1.0 for use as a
    /// normalizing divisor.
    pub fn max_stake(&self) -> f64 {
        let max = self
            .live
            .values()
            .map(|l| l.stake)
            .fold(0.0_f64, f64::max);
        if max > 0.0 {
            max
        } else {
            1.0
        }
    }

    /// Mean players/stake over the killer-profile window. None if empty.
    pub fn killer_means(&self) -> Option<(f64, f64)> {
        if self.killer_profile.is_empty() {
            return None;
        }
        let n = self.killer_profile.len() as f64;
        let players = self.killer_profile.iter().map(|k| k.players as f64).sum::<f64>() / n;
        let stake = self.killer_profile.iter().map(|k| k.stake).sum::<f64>() / n;
        Some((players, stake))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_tracker_is_cold() {
        let tracker = RoomTracker::new();
        assert!(!tracker.has_live_activity());
        assert!(tracker.last_killed().is_none());
        assert!(tracker.killer_means().is_none());
        assert_eq!(tracker.live(RoomId(1)), RoomLive::default());
    }

    #[test]
    fn test_frame_overwrites_live_and_keeps_prev() {
        let mut tracker = RoomTracker::new();
        tracker.apply_frame(RoomId(3), 10, 100.0);
        tracker.apply_frame(RoomId(3), 50, 500.0);

        assert_eq!(tracker.live(RoomId(3)).players, 50);
        assert_eq!(tracker.history(RoomId(3)).prev_players, 10);
        assert_eq!(tracker.history(RoomId(3)).prev_stake, 100.0);
    }

    #[test]
    fn test_partial_frame_preserves_unreported_rooms() {
        let mut tracker = RoomTracker::new();
        tracker.apply_frame(RoomId(1), 5, 50.0);
        tracker.apply_frame(RoomId(2), 7, 70.0);
        // Next frame only reports room 2
        tracker.apply_frame(RoomId(2), 8, 80.0);

        assert_eq!(tracker.live(RoomId(1)).players, 5);
        assert_eq!(tracker.live(RoomId(2)).players, 8);
    }

    #[test]
    fn test_unknown_room_id_is_ignored() {
        let mut tracker = RoomTracker::new();
        tracker.apply_frame(RoomId(42), 9, 9.0);
        assert!(!tracker.has_live_activity());
    }

    #[test]
    fn test_settlement_increments_exactly_one_kill() {
        let mut tracker = RoomTracker::new();
        tracker.apply_settlement(RoomId(4), 1);

        let kills: u32 = RoomId::ALL.iter().map(|r| tracker.history(*r).kills).sum();
        let survivals: u32 = RoomId::ALL
            .iter()
            .map(|r| tracker.history(*r).survivals)
            .sum();
        assert_eq!(kills, 1);
        assert_eq!(survivals, 7);
        assert_eq!(tracker.history(RoomId(4)).last_kill_round, Some(1));
        assert_eq!(tracker.last_killed(), Some(RoomId(4)));
    }

    #[test]
    fn test_killer_profile_captures_live_conditions() {
        let mut tracker = RoomTracker::new();
        tracker.apply_frame(RoomId(2), 30, 300.0);
        tracker.apply_settlement(RoomId(2), 1);

        let snap = tracker.killer_profile().back().unwrap();
        assert_eq!(snap.players, 30);
        assert_eq!(snap.stake, 300.0);
        assert_eq!(tracker.killer_means(), Some((30.0, 300.0)));
    }

    #[test]
    fn test_killer_profile_is_bounded() {
        let mut tracker = RoomTracker::new();
        for i in 0..25 {
            tracker.apply_settlement(RoomId(1 + (i % 8) as u8), i as u64);
        }
        assert_eq!(tracker.killer_profile().len(), KILLER_PROFILE_CAP);
    }

    #[test]
    fn test_killed_two_rounds_ago() {
        let mut tracker = RoomTracker::new();
        assert_eq!(tracker.killed_two_rounds_ago(), None);
        tracker.apply_settlement(RoomId(5), 1);
        assert_eq!(tracker.killed_two_rounds_ago(), None);
        tracker.apply_settlement(RoomId(6), 2);
        assert_eq!(tracker.killed_two_rounds_ago(), Some(RoomId(5)));
        tracker.apply_settlement(RoomId(7), 3);
        assert_eq!(tracker.killed_two_rounds_ago(), Some(RoomId(6)));
    }

    #[test]
    fn test_survival_rate_smoothing() {
        let hist = RoomHistory {
            kills: 2,
            survivals: 8,
            ..Default::default()
        };
        assert!((hist.survival_rate() - 0.75).abs() < 1e-10);
        assert!((hist.kill_rate() - 0.25).abs() < 1e-10);

        // Cold start: no divisions by zero, neutral 0.5
        let cold = RoomHistory::default();
        assert!((cold.survival_rate() - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_normalizing_divisors_never_zero() {
        let tracker = RoomTracker::new();
        assert_eq!(tracker.max_players(), 1);
        assert_eq!(tracker.max_stake(), 1.0);
    }

    #[test]
    fn test_seed_last_killed_leaves_counters_alone() {
        let mut tracker = RoomTracker::new();
        tracker.seed_last_killed(RoomId(8));
        assert_eq!(tracker.last_killed(), Some(RoomId(8)));
        assert_eq!(tracker.history(RoomId(8)).kills, 0);
        assert!(tracker.killer_profile().is_empty());
    }
}
