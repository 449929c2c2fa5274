//! Inbound frame decoding and classification.
//!
//! The stream delivers loosely-schema'd JSON: key names drift between
//! snake_case and camelCase, numbers arrive as strings, payloads are
//! sometimes single-quoted or double-encoded under a string `data` field,
//! and timestamps switch between seconds and milliseconds. Everything here
//! is pure and total: a frame either classifies into a [`ServerEvent`] or is
//! dropped as unrecognized — never an error that could stall the receiver.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::numeric::parse_number;
use crate::types::RoomId;

// ---------------------------------------------------------------------------
// Event model
// ---------------------------------------------------------------------------

/// One room's counters as reported inside a telemetry frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomFrame {
    pub room: RoomId,
    pub players: u32,
    pub stake: f64,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Session-entry notification: advisory round times, initial room
    /// telemetry, and the previously killed room.
    SessionEntered {
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        last_killed: Option<RoomId>,
        rooms: Vec<RoomFrame>,
    },
    /// Periodic round/telemetry notification.
    RoundStat {
        round_id: Option<u64>,
        start_time: Option<DateTime<Utc>>,
        rooms: Vec<RoomFrame>,
    },
    /// Countdown notification.
    Countdown(u32),
    /// Result notification: the killed room is known.
    RoundResult { killed: RoomId },
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode and classify a raw frame. Returns None for frames that are
/// unparseable or of an unrecognized type.
pub fn decode_frame(raw: &str) -> Option<ServerEvent> {
    let data = lenient_json(raw)?;
    let data = merge_nested_data(data);

    let msg_type = data
        .get("msg_type")
        .or_else(|| data.get("type"))
        .and_then(Value::as_str)
        .unwrap_or("");

    if msg_type == "notify_enter_game" {
        return Some(decode_session_entry(&data));
    }
    if msg_type == "notify_issue_stat" || msg_type.contains("issue_stat") {
        return Some(decode_round_stat(&data));
    }
    if msg_type == "notify_count_down" || msg_type.contains("count_down") {
        return decode_countdown(&data).map(ServerEvent::Countdown);
    }
    if msg_type == "notify_result" || msg_type.contains("result") {
        return extract_killed(&data).map(|killed| ServerEvent::RoundResult { killed });
    }

    None
}

/// Parse JSON, falling back to a single-quote-to-double-quote rewrite for
/// the occasional frame the server emits with single-quoted strings.
fn lenient_json(raw: &str) -> Option<Value> {
    serde_json::from_str(raw)
        .ok()
        .or_else(|| serde_json::from_str(&raw.replace('\'', "\"")).ok())
}

/// If the frame carries a string-encoded JSON object under `data`, decode it
/// and merge its fields over the envelope's.
fn merge_nested_data(data: Value) -> Value {
    let Value::Object(mut map) = data else {
        return data;
    };
    if let Some(Value::String(inner)) = map.get("data") {
        if let Ok(Value::Object(inner_map)) = serde_json::from_str::<Value>(inner) {
            for (k, v) in inner_map {
                map.insert(k, v);
            }
        }
    }
    Value::Object(map)
}

fn decode_session_entry(data: &Value) -> ServerEvent {
    let info = data.get("info").filter(|v| v.is_object());
    let start_time = info
        .and_then(|i| i.get("start_time"))
        .and_then(parse_number)
        .and_then(normalize_epoch);
    let end_time = info
        .and_then(|i| i.get("end_time"))
        .and_then(parse_number)
        .and_then(normalize_epoch);

    let last_killed = data
        .get("last_killed_room_id")
        .and_then(parse_number)
        .map(|n| RoomId(n as u8))
        .filter(RoomId::is_known);

    let rooms = data
        .get("room_stat")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(room_frame).collect())
        .unwrap_or_default();

    ServerEvent::SessionEntered {
        start_time,
        end_time,
        last_killed,
        rooms,
    }
}

fn decode_round_stat(data: &Value) -> ServerEvent {
    let rooms_value = data
        .get("rooms")
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
        .or_else(|| {
            data.get("data")
                .and_then(|d| d.get("rooms"))
                .and_then(Value::as_array)
        });

    let rooms = rooms_value
        .map(|items| items.iter().filter_map(room_frame).collect())
        .unwrap_or_default();

    ServerEvent::RoundStat {
        round_id: extract_round_id(data),
        start_time: data
            .get("start_time")
            .and_then(parse_number)
            .and_then(normalize_epoch),
        rooms,
    }
}

fn decode_countdown(data: &Value) -> Option<u32> {
    for key in ["count_down", "countDown", "count"] {
        if let Some(n) = data.get(key).and_then(parse_number) {
            if n >= 0.0 {
                return Some(n as u32);
            }
        }
    }
    None
}

/// Accepted key spellings for the round id, checked at the top level first
/// and then one level down under `data`.
const ROUND_ID_KEYS: [&str; 4] = ["issue_id", "issueId", "issue", "id"];

pub(crate) fn extract_round_id(data: &Value) -> Option<u64> {
    for key in ROUND_ID_KEYS {
        if let Some(n) = data.get(key).and_then(parse_number) {
            return Some(n as u64);
        }
    }
    let nested = data.get("data")?;
    for key in ROUND_ID_KEYS {
        if let Some(n) = nested.get(key).and_then(parse_number) {
            return Some(n as u64);
        }
    }
    None
}

/// Accepted key spellings for the killed room in result frames.
const KILLED_KEYS: [&str; 5] = [
    "killed_room",
    "killed_room_id",
    "killedRoom",
    "killedRoomId",
    "kill_room",
];

fn extract_killed(data: &Value) -> Option<RoomId> {
    let lookup = |v: &Value| -> Option<RoomId> {
        for key in KILLED_KEYS {
            if let Some(n) = v.get(key).and_then(parse_number) {
                return Some(RoomId(n as u8));
            }
        }
        None
    };
    lookup(data)
        .or_else(|| data.get("data").and_then(|d| lookup(d)))
        .filter(RoomId::is_known)
}

fn room_frame(v: &Value) -> Option<RoomFrame> {
    let room = ["room_id", "roomId", "id"]
        .iter()
        .find_map(|k| v.get(*k).and_then(parse_number))
        .map(|n| RoomId(n as u8))
        .filter(RoomId::is_known)?;

    let players = ["user_cnt", "userCount"]
        .iter()
        .find_map(|k| v.get(*k).and_then(parse_number))
        .unwrap_or(0.0)
        .max(0.0) as u32;

    let stake = ["total_bet_amount", "totalBet", "bet"]
        .iter()
        .find_map(|k| v.get(*k).and_then(parse_number))
        .unwrap_or(0.0)
        .max(0.0);

    Some(RoomFrame {
        room,
        players,
        stake,
    })
}

/// Normalize an epoch timestamp that may be in seconds or milliseconds.
fn normalize_epoch(raw: f64) -> Option<DateTime<Utc>> {
    if raw <= 0.0 {
        return None;
    }
    // Millisecond timestamps are three orders of magnitude past any
    // plausible second count.
    let secs = if raw > 1.0e12 { raw / 1000.0 } else { raw };
    Utc.timestamp_opt(secs as i64, 0).single()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_stat_frame() {
        let raw = r#"{
            "msg_type": "notify_issue_stat",
            "issue_id": 101,
            "rooms": [
                {"room_id": 1, "user_cnt": 12, "total_bet_amount": 340},
                {"room_id": 2, "user_cnt": "7", "total_bet_amount": "1,250.5"}
            ]
        }"#;
        let Some(ServerEvent::RoundStat {
            round_id, rooms, ..
        }) = decode_frame(raw)
        else {
            panic!("expected RoundStat");
        };
        assert_eq!(round_id, Some(101));
        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].players, 12);
        assert_eq!(rooms[1].stake, 1250.5);
    }

    #[test]
    fn test_round_stat_camel_case_keys() {
        let raw = r#"{
            "msg_type": "game_issue_stat",
            "issueId": "202",
            "rooms": [{"roomId": 4, "userCount": 3, "totalBet": 99}]
        }"#;
        let Some(ServerEvent::RoundStat {
            round_id, rooms, ..
        }) = decode_frame(raw)
        else {
            panic!("expected RoundStat");
        };
        assert_eq!(round_id, Some(202));
        assert_eq!(rooms[0].room, RoomId(4));
    }

    #[test]
    fn test_single_quoted_frame_fallback() {
        let raw = "{'msg_type': 'notify_count_down', 'count_down': 9}";
        assert_eq!(decode_frame(raw), Some(ServerEvent::Countdown(9)));
    }

    #[test]
    fn test_nested_string_data_is_merged() {
        let raw = r#"{"msg_type": "notify_result", "data": "{\"killed_room_id\": 6}"}"#;
        assert_eq!(
            decode_frame(raw),
            Some(ServerEvent::RoundResult { killed: RoomId(6) })
        );
    }

    #[test]
    fn test_result_key_variants() {
        for key in ["killed_room", "killed_room_id", "killedRoom", "kill_room"] {
            let raw = format!(r#"{{"msg_type": "notify_result", "{key}": 3}}"#);
            assert_eq!(
                decode_frame(&raw),
                Some(ServerEvent::RoundResult { killed: RoomId(3) }),
                "key {key} not accepted"
            );
        }
    }

    #[test]
    fn test_result_nested_under_data_object() {
        let raw = r#"{"msg_type": "notify_result", "data": {"killedRoomId": 8}}"#;
        // The nested `data` here is an object, not a string: the lookup must
        // still find the killed room one level down.
        assert_eq!(
            decode_frame(raw),
            Some(ServerEvent::RoundResult { killed: RoomId(8) })
        );
    }

    #[test]
    fn test_result_with_unknown_room_dropped() {
        let raw = r#"{"msg_type": "notify_result", "killed_room_id": 77}"#;
        assert_eq!(decode_frame(raw), None);
    }

    #[test]
    fn test_session_entry() {
        let raw = r#"{
            "msg_type": "notify_enter_game",
            "info": {"start_time": 1754500000000, "end_time": 1754500060000},
            "last_killed_room_id": 5,
            "room_stat": [{"room_id": 1, "user_cnt": 4, "total_bet_amount": 10}]
        }"#;
        let Some(ServerEvent::SessionEntered {
            start_time,
            end_time,
            last_killed,
            rooms,
        }) = decode_frame(raw)
        else {
            panic!("expected SessionEntered");
        };
        assert_eq!(last_killed, Some(RoomId(5)));
        assert_eq!(rooms.len(), 1);
        // Millisecond timestamps are normalized to seconds.
        assert_eq!(start_time.unwrap().timestamp(), 1_754_500_000);
        assert_eq!(end_time.unwrap().timestamp(), 1_754_500_060);
    }

    #[test]
    fn test_countdown_key_variants() {
        assert_eq!(
            decode_frame(r#"{"msg_type": "notify_count_down", "countDown": "15"}"#),
            Some(ServerEvent::Countdown(15))
        );
        assert_eq!(
            decode_frame(r#"{"type": "count_down_tick", "count": 3}"#),
            Some(ServerEvent::Countdown(3))
        );
    }

    #[test]
    fn test_unrecognized_and_garbage_frames_dropped() {
        assert_eq!(decode_frame("not json at all"), None);
        assert_eq!(decode_frame(r#"{"msg_type": "notify_chat", "text": "hi"}"#), None);
        assert_eq!(decode_frame("[1,2,3]"), None);
    }

    #[test]
    fn test_partial_room_frames_skip_malformed_entries() {
        let raw = r#"{
            "msg_type": "notify_issue_stat",
            "issue_id": 55,
            "rooms": [
                {"room_id": 2, "user_cnt": 5},
                {"no_id_here": true},
                {"room_id": 99, "user_cnt": 5}
            ]
        }"#;
        let Some(ServerEvent::RoundStat { rooms, .. }) = decode_frame(raw) else {
            panic!("expected RoundStat");
        };
        // Malformed and unknown-room entries are dropped, valid ones kept.
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room, RoomId(2));
        assert_eq!(rooms[0].stake, 0.0);
    }
}
