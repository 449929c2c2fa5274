//! Crowd- and history-driven strategies.
//!
//! These score rooms from what is directly observable: live player counts,
//! live stake volume, and the per-room kill/survival history.

use rand::Rng;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{argmax_room, argmin_room, uniform};
use crate::stats::RoomTracker;
use crate::types::RoomId;

/// Penalty added to the last-killed room's combined rank score.
const LAST_KILL_RANK_PENALTY: f64 = 0.5;

/// Least-crowded: rank rooms by ascending players and ascending stake,
/// sum the two ranks, nudge the last-killed room down, pick the minimum.
pub(super) fn least_crowded<R: Rng + ?Sized>(board: &RoomTracker, rng: &mut R) -> RoomId {
    if !board.has_live_activity() {
        return uniform(rng);
    }

    let mut by_players: Vec<RoomId> = RoomId::ALL.to_vec();
    by_players.sort_by_key(|r| board.live(*r).players);

    let mut by_stake: Vec<RoomId> = RoomId::ALL.to_vec();
    by_stake.sort_by(|a, b| {
        board
            .live(*a)
            .stake
            .partial_cmp(&board.live(*b).stake)
            .unwrap_or(Ordering::Equal)
    });

    let mut scores: BTreeMap<RoomId, f64> = BTreeMap::new();
    for (rank, room) in by_players.iter().enumerate() {
        *scores.entry(*room).or_insert(0.0) += rank as f64;
    }
    for (rank, room) in by_stake.iter().enumerate() {
        *scores.entry(*room).or_insert(0.0) += rank as f64;
    }
    if let Some(last) = board.last_killed() {
        *scores.entry(last).or_insert(0.0) += LAST_KILL_RANK_PENALTY;
    }

    argmin_room(&RoomId::ALL, |r| scores.get(&r).copied().unwrap_or(0.0))
        .unwrap_or_else(|| uniform(rng))
}

/// Historical survival: pick the room with the highest Laplace-smoothed
/// survival rate. Deterministic; ties go to the first room in fixed order.
pub(super) fn survival_rate(board: &RoomTracker) -> RoomId {
    argmax_room(&RoomId::ALL, |r| board.history(r).survival_rate()).unwrap_or(RoomId::ALL[0])
}

/// Weighted safety: 0.4×survival-rate + 0.3×(1 − players/max) +
/// 0.3×(1 − stake/max) − 0.5 if last-killed; pick the maximum.
pub(super) fn weighted_safety(board: &RoomTracker) -> RoomId {
    let max_players = board.max_players() as f64;
    let max_stake = board.max_stake();
    let last = board.last_killed();

    argmax_room(&RoomId::ALL, |r| {
        let live = board.live(r);
        let survival = board.history(r).survival_rate();
        let player_score = 1.0 - (live.players as f64 / max_players);
        let stake_score = 1.0 - (live.stake / max_stake);
        let penalty = if last == Some(r) { 0.5 } else { 0.0 };
        0.4 * survival + 0.3 * player_score + 0.3 * stake_score - penalty
    })
    .unwrap_or(RoomId::ALL[0])
}
