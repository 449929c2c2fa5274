//! Selection engine — nine interchangeable room-picking strategies.
//!
//! Strategies are a closed set of enum variants dispatched through one
//! `Selector::choose` entry point; adding a strategy means adding a variant,
//! not editing a lookup table. Every strategy is total: on cold start (no
//! telemetry or history yet) it degrades to a uniform random pick, and all
//! divisors are smoothed so nothing here can panic mid-round.

mod crowd;
mod elimination;
mod killer;

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::stats::RoomTracker;
use crate::types::RoomId;

// ---------------------------------------------------------------------------
// Strategy identifiers
// ---------------------------------------------------------------------------

/// The closed set of prediction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Uniform random pick over all rooms.
    Random,
    /// Fewest players and lowest stake volume by combined rank.
    LeastCrowded,
    /// Highest Laplace-smoothed historical survival rate.
    SurvivalRate,
    /// The room killed in the immediately preceding round.
    FollowKiller,
    /// Deterministic cycle through all rooms in fixed order.
    RoundRobin,
    /// Most dissimilar to the killer's historical target profile.
    KillerPersonality,
    /// Linear blend of survival rate, crowd, and stake safety.
    WeightedSafety,
    /// Sequential rule-based candidate elimination ("10-rule").
    Elimination,
    /// Composite danger minimization ("hide-seek").
    HideSeek,
}

impl Strategy {
    /// All strategies, in menu order.
    pub const ALL: &'static [Strategy] = &[
        Strategy::Random,
        Strategy::LeastCrowded,
        Strategy::SurvivalRate,
        Strategy::FollowKiller,
        Strategy::RoundRobin,
        Strategy::KillerPersonality,
        Strategy::WeightedSafety,
        Strategy::Elimination,
        Strategy::HideSeek,
    ];

    /// Stable identifier used in the persisted profile.
    pub fn id(&self) -> &'static str {
        match self {
            Strategy::Random => "random",
            Strategy::LeastCrowded => "least_crowded",
            Strategy::SurvivalRate => "survival_rate",
            Strategy::FollowKiller => "follow_killer",
            Strategy::RoundRobin => "round_robin",
            Strategy::KillerPersonality => "killer_personality",
            Strategy::WeightedSafety => "weighted_safety",
            Strategy::Elimination => "elimination",
            Strategy::HideSeek => "hide_seek",
        }
    }

    /// Human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::Random => "Uniform random",
            Strategy::LeastCrowded => "Least crowded",
            Strategy::SurvivalRate => "Historical survival",
            Strategy::FollowKiller => "Follow the killer",
            Strategy::RoundRobin => "Round robin",
            Strategy::KillerPersonality => "Killer-personality avoidance",
            Strategy::WeightedSafety => "Weighted safety",
            Strategy::Elimination => "Sequential elimination",
            Strategy::HideSeek => "Composite danger minimization",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for Strategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.to_lowercase();
        Strategy::ALL
            .iter()
            .find(|st| st.id() == key)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Unknown strategy: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

/// Stateful wrapper around the strategy set.
///
/// Holds the round-robin cursor (the only strategy with memory) and the
/// active strategy id. One selector per engine; `choose` is called exactly
/// once per round, at the decision trigger.
#[derive(Debug, Clone)]
pub struct Selector {
    strategy: Strategy,
    rr_cursor: usize,
}

impl Selector {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            rr_cursor: 0,
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Pick a room with the process RNG.
    pub fn choose(&mut self, board: &RoomTracker) -> RoomId {
        self.choose_with(board, &mut rand::rng())
    }

    /// Pick a room with a caller-supplied RNG (deterministic in tests).
    pub fn choose_with<R: Rng + ?Sized>(&mut self, board: &RoomTracker, rng: &mut R) -> RoomId {
        match self.strategy {
            Strategy::Random => uniform(rng),
            Strategy::LeastCrowded => crowd::least_crowded(board, rng),
            Strategy::SurvivalRate => crowd::survival_rate(board),
            Strategy::FollowKiller => killer::follow_killer(board, rng),
            Strategy::RoundRobin => {
                let room = RoomId::ALL[self.rr_cursor];
                self.rr_cursor = (self.rr_cursor + 1) % RoomId::ALL.len();
                room
            }
            Strategy::KillerPersonality => killer::killer_personality(board, rng),
            Strategy::WeightedSafety => crowd::weighted_safety(board),
            Strategy::Elimination => elimination::ten_rule(board, rng),
            Strategy::HideSeek => killer::hide_seek(board),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Uniform random pick over the full room set.
pub(crate) fn uniform<R: Rng + ?Sized>(rng: &mut R) -> RoomId {
    RoomId::ALL[rng.random_range(0..RoomId::ALL.len())]
}

/// Uniform random pick excluding one room (used by fallback paths).
pub(crate) fn uniform_except<R: Rng + ?Sized>(rng: &mut R, exclude: Option<RoomId>) -> RoomId {
    let pool: Vec<RoomId> = RoomId::ALL
        .iter()
        .copied()
        .filter(|r| Some(*r) != exclude)
        .collect();
    if pool.is_empty() {
        return uniform(rng);
    }
    pool[rng.random_range(0..pool.len())]
}

/// First room (in fixed order) with the strictly highest score.
pub(crate) fn argmax_room<F: Fn(RoomId) -> f64>(rooms: &[RoomId], score: F) -> Option<RoomId> {
    let mut best: Option<(RoomId, f64)> = None;
    for &room in rooms {
        let s = score(room);
        match best {
            Some((_, bs)) if s <= bs => {}
            _ => best = Some((room, s)),
        }
    }
    best.map(|(r, _)| r)
}

/// First room (in fixed order) with the strictly lowest score.
pub(crate) fn argmin_room<F: Fn(RoomId) -> f64>(rooms: &[RoomId], score: F) -> Option<RoomId> {
    argmax_room(rooms, |r| -score(r))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_strategy_id_roundtrip() {
        for st in Strategy::ALL {
            let parsed: Strategy = st.id().parse().unwrap();
            assert_eq!(parsed, *st);
        }
        assert!("made_up".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_serde_uses_snake_case_ids() {
        let json = serde_json::to_string(&Strategy::WeightedSafety).unwrap();
        assert_eq!(json, "\"weighted_safety\"");
        let parsed: Strategy = serde_json::from_str("\"hide_seek\"").unwrap();
        assert_eq!(parsed, Strategy::HideSeek);
    }

    #[test]
    fn test_round_robin_cycles_in_order_and_wraps() {
        let board = RoomTracker::new();
        let mut selector = Selector::new(Strategy::RoundRobin);
        let mut rng = rng();

        let picks: Vec<u8> = (0..9)
            .map(|_| selector.choose_with(&board, &mut rng).0)
            .collect();
        assert_eq!(picks, vec![1, 2, 3, 4, 5, 6, 7, 8, 1]);
    }

    #[test]
    fn test_all_strategies_total_on_cold_start() {
        // No telemetry, no history: every strategy must still return a room.
        let board = RoomTracker::new();
        let mut rng = rng();
        for st in Strategy::ALL {
            let mut selector = Selector::new(*st);
            let room = selector.choose_with(&board, &mut rng);
            assert!(room.is_known(), "{st} returned unknown room on cold start");
        }
    }

    #[test]
    fn test_uniform_stays_in_room_set() {
        let mut rng = rng();
        for _ in 0..100 {
            assert!(uniform(&mut rng).is_known());
        }
    }

    #[test]
    fn test_uniform_except_excludes() {
        let mut rng = rng();
        for _ in 0..100 {
            assert_ne!(uniform_except(&mut rng, Some(RoomId(4))), RoomId(4));
        }
    }

    #[test]
    fn test_argmax_prefers_first_on_tie() {
        let rooms = RoomId::ALL;
        let winner = argmax_room(&rooms, |_| 1.0).unwrap();
        assert_eq!(winner, RoomId(1));

        let winner = argmax_room(&rooms, |r| if r == RoomId(6) { 2.0 } else { 1.0 }).unwrap();
        assert_eq!(winner, RoomId(6));
    }

    #[test]
    fn test_argmin_prefers_first_on_tie() {
        let rooms = RoomId::ALL;
        let winner = argmin_room(&rooms, |r| if r == RoomId(3) { -5.0 } else { 0.0 }).unwrap();
        assert_eq!(winner, RoomId(3));
    }
}
