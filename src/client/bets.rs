//! Stake submission.
//!
//! Fire-and-forget: one POST per round, no automatic retry — the round is
//! committed the moment it is submitted, and retrying a possibly-landed
//! stake risks a double spend. Rejections come back as an ack with
//! `accepted == false` and are logged by the caller.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use tracing::debug;

use super::HttpGameApi;
use crate::types::{RoomId, StakeAck};

impl HttpGameApi {
    pub(super) async fn place_stake_http(
        &self,
        round_id: u64,
        room: RoomId,
        amount: f64,
    ) -> Result<StakeAck> {
        let payload = json!({
            "asset_type": self.cfg().game.asset_type,
            "user_id": self.creds().user_id(),
            "room_id": room.0,
            "bet_amount": amount,
        });

        debug!(round_id, room = room.0, amount, "Submitting stake");

        let resp = self
            .http()
            .post(&self.cfg().endpoints.bet_url)
            .headers(self.auth_headers())
            .json(&payload)
            .send()
            .await
            .context("Stake request failed")?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("Stake response unparseable (HTTP {status})"))?;

        Ok(parse_stake_ack(&body))
    }
}

/// Interpret a submission response. The server signals acceptance through
/// any of `msg == "ok"`, `code == 0`, or `status` ∈ {"ok", 1}.
pub fn parse_stake_ack(body: &Value) -> StakeAck {
    let msg = body
        .get("msg")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let code = body.get("code").and_then(Value::as_i64);

    let status_ok = match body.get("status") {
        Some(Value::String(s)) => s == "ok",
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    };

    let accepted = msg.as_deref() == Some("ok") || code == Some(0) || status_ok;

    StakeAck {
        accepted,
        code,
        message: msg,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
