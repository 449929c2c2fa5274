//! Adversary-modelling strategies.
//!
//! These use the killer-profile window — snapshots of the crowd/stake
//! conditions of previously killed rooms — to either chase the killer's
//! last target or stay as far from its habits as possible.

use rand::Rng;

use super::{argmax_room, argmin_room, uniform};
use crate::stats::RoomTracker;
use crate::types::RoomId;

/// Follow-the-killer: bet on the room killed in the preceding round.
pub(super) fn follow_killer<R: Rng + ?Sized>(board: &RoomTracker, rng: &mut R) -> RoomId {
    match board.last_killed() {
        Some(room) if room.is_known() => room,
        _ => uniform(rng),
    }
}

/// Killer-personality avoidance: score each room by normalized distance from
/// the killer profile's mean players/stake and pick the most dissimilar.
/// The last-killed room is disqualified outright.
pub(super) fn killer_personality<R: Rng + ?Sized>(board: &RoomTracker, rng: &mut R) -> RoomId {
    let Some((avg_players, avg_stake)) = board.killer_means() else {
        return uniform(rng);
    };
    let last = board.last_killed();

    let candidates: Vec<RoomId> = RoomId::ALL
        .iter()
        .copied()
        .filter(|r| Some(*r) != last)
        .collect();

    argmax_room(&candidates, |r| {
        let live = board.live(r);
        let player_dist = (live.players as f64 - avg_players).abs() / (avg_players + 1.0);
        let stake_dist = (live.stake - avg_stake).abs() / (avg_stake + 1.0);
        player_dist + stake_dist
    })
    .unwrap_or_else(|| uniform(rng))
}

/// Hide-seek: composite danger score, lower is safer.
///
/// danger = 0.3×historical kill-rate + 0.2×normalized crowd
///        + 0.2×normalized stake + 0.3×similarity to the killer profile
///        + 1.0 if last-killed.
pub(super) fn hide_seek(board: &RoomTracker) -> RoomId {
    let max_players = board.max_players() as f64;
    let max_stake = board.max_stake();
    let killer_means = board.killer_means();
    let last = board.last_killed();

    argmin_room(&RoomId::ALL, |r| {
        let live = board.live(r);
        let hist_danger = board.history(r).kill_rate();
        let crowd_danger = live.players as f64 / max_players;
        let money_danger = live.stake / max_stake;

        let personality_danger = match killer_means {
            Some((avg_players, avg_stake)) => {
                let player_sim = 1.0
                    - (live.players as f64 - avg_players).abs()
                        / (avg_players + max_players + 1.0);
                let stake_sim =
                    1.0 - (live.stake - avg_stake).abs() / (avg_stake + max_stake + 1.0);
                (player_sim + stake_sim) / 2.0
            }
            None => 0.0,
        };

        let recency_penalty = if last == Some(r) { 1.0 } else { 0.0 };

        0.3 * hist_danger
            + 0.2 * crowd_danger
            + 0.2 * money_danger
            + 0.3 * personality_danger
            + recency_penalty
    })
    .unwrap_or(RoomId::ALL[0])
}
