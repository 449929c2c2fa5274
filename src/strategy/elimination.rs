//! Sequential elimination ("10-rule") strategy.
//!
//! Starts with every room as a candidate and strikes rooms in a fixed
//! priority order — each rule targeting one recognizable trap pattern —
//! until a single candidate remains or all rules have run. The final pick
//! is uniform among the survivors, so the strategy stays unpredictable
//! even when few rules fire.

use rand::Rng;

use super::{argmax_room, uniform_except};
use crate::stats::RoomTracker;
use crate::types::RoomId;

/// Player-count jump over the previous frame that counts as a herding spike.
const SPIKE_THRESHOLD: i64 = 5;

pub(super) fn ten_rule<R: Rng + ?Sized>(board: &RoomTracker, rng: &mut R) -> RoomId {
    let mut candidates: Vec<RoomId> = RoomId::ALL.to_vec();
    let last = board.last_killed();

    // Rule 1: the room just killed.
    remove_room(&mut candidates, last);

    // Rule 2: the most crowded room (crowd target).
    remove_top(&mut candidates, |r| board.live(r).players as f64);

    // Rule 3: the highest-stake room (big-money target).
    remove_top(&mut candidates, |r| board.live(r).stake);

    // Rule 4: the historically most-killed room.
    remove_top(&mut candidates, |r| board.history(r).kill_rate());

    // Rule 5: the highest stake-per-player room (whale trap).
    remove_top(&mut candidates, |r| {
        let live = board.live(r);
        if live.players > 0 {
            live.stake / live.players as f64
        } else {
            0.0
        }
    });

    // Rule 6: the least crowded room (empty-room trap).
    remove_top(&mut candidates, |r| -(board.live(r).players as f64));

    // Rule 7: an anomalous player-count spike over the previous frame.
    if candidates.len() > 1 {
        let delta =
            |r: RoomId| board.live(r).players as i64 - board.history(r).prev_players as i64;
        if candidates.iter().any(|r| delta(*r) > SPIKE_THRESHOLD) {
            remove_top(&mut candidates, |r| delta(r) as f64);
        }
    }

    // Rule 8: the room killed two rounds ago (pattern repeat).
    remove_room(&mut candidates, board.killed_two_rounds_ago());

    // The guards above keep at least one candidate, but stay safe anyway.
    if candidates.is_empty() {
        return uniform_except(rng, last);
    }
    candidates[rng.random_range(0..candidates.len())]
}

/// Remove a specific room, unless it is the only candidate left.
fn remove_room(candidates: &mut Vec<RoomId>, target: Option<RoomId>) {
    if candidates.len() > 1 {
        if let Some(t) = target {
            candidates.retain(|r| *r != t);
        }
    }
}

/// Remove the highest-scoring candidate, unless only one is left.
fn remove_top<F: Fn(RoomId) -> f64>(candidates: &mut Vec<RoomId>, score: F) {
    if candidates.len() > 1 {
        if let Some(worst) = argmax_room(candidates, score) {
            candidates.retain(|r| *r != worst);
        }
    }
}
