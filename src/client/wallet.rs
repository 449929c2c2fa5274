//! Wallet balance fetching.
//!
//! The wallet endpoint's response schema drifts: the canonical shape nests
//! the currencies under `data.user_asset`, older shapes scatter them across
//! `data.cwallet` or top-level keys, and values arrive as numbers or
//! strings. Parsing is two-phase — exact known keys first, then a recursive
//! keyword scan — so a schema change degrades to the fallback instead of a
//! hard failure.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::HttpGameApi;
use crate::numeric::{find_keyed_number, parse_number};
use crate::types::Balances;

/// Attempts per fetch (first try + retries).
const FETCH_ATTEMPTS: u32 = 3;

impl HttpGameApi {
    /// Fetch wallet balances with retry and increasing backoff.
    pub(super) async fn fetch_balances_http(&self) -> Result<Balances> {
        let payload = json!({
            "user_id": self.creds().user_id(),
            "source": "home",
        });

        let mut last_err: Option<anyhow::Error> = None;
        for attempt in 1..=FETCH_ATTEMPTS {
            match self.fetch_once(&payload).await {
                Ok(balances) => return Ok(balances),
                Err(e) => {
                    debug!(attempt, error = %e, "Wallet fetch attempt failed");
                    last_err = Some(e);
                    let backoff = (1.5 * attempt as f64).min(4.0);
                    tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                }
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow::anyhow!("wallet fetch failed"));
        warn!(error = %err, "Wallet fetch exhausted retries");
        Err(err)
    }

    async fn fetch_once(&self, payload: &Value) -> Result<Balances> {
        let resp = self
            .http()
            .post(&self.cfg().endpoints.wallet_url)
            .headers(self.wallet_headers())
            .json(payload)
            .send()
            .await
            .context("Wallet request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Wallet API error {status}: {body}");
        }

        let body: Value = resp
            .json()
            .await
            .context("Failed to parse wallet response as JSON")?;

        Ok(parse_wallet_balances(&body))
    }
}

/// Extract the three currencies from a wallet response.
///
/// Lookup precedence, per currency:
/// 1. `data.user_asset.{BUILD,WORLD,USDT}` — the canonical shape.
/// 2. Known alternative keys: `data.cwallet.{ctoken_contribute, ctoken,
///    build, balance, amount}` and flat `data.{build, ctoken, usdt, kusdt,
///    usdt_balance, world, xworld}`.
/// 3. Recursive scan for any numeric field whose key path contains a
///    recognizable substring (`ctoken`/`build`/`contribute`/`balance`,
///    `usdt`, `world`).
pub fn parse_wallet_balances(body: &Value) -> Balances {
    let data = body.get("data").filter(|d| d.is_object()).unwrap_or(body);
    let user_asset = data.get("user_asset");

    let mut primary = user_asset
        .and_then(|u| u.get("BUILD"))
        .and_then(parse_number);
    let mut world = user_asset
        .and_then(|u| u.get("WORLD"))
        .and_then(parse_number);
    let mut usdt = user_asset
        .and_then(|u| u.get("USDT"))
        .and_then(parse_number);

    // Known alternative shapes.
    if primary.is_none() {
        if let Some(cwallet) = data.get("cwallet").filter(|c| c.is_object()) {
            for key in ["ctoken_contribute", "ctoken", "build", "balance", "amount"] {
                if primary.is_none() {
                    primary = cwallet.get(key).and_then(parse_number);
                }
            }
        }
    }
    for key in ["build", "ctoken", "ctoken_contribute"] {
        if primary.is_none() {
            primary = data.get(key).and_then(parse_number);
        }
    }
    for key in ["usdt", "kusdt", "usdt_balance"] {
        if usdt.is_none() {
            usdt = data.get(key).and_then(parse_number);
        }
    }
    for key in ["world", "xworld"] {
        if world.is_none() {
            world = data.get(key).and_then(parse_number);
        }
    }

    // Fallback: recursive keyword scan over the whole document.
    if primary.is_none() {
        primary = find_keyed_number(body, &["ctoken", "build", "contribute", "balance"]);
    }
    if usdt.is_none() {
        usdt = find_keyed_number(body, &["usdt"]);
    }
    if world.is_none() {
        world = find_keyed_number(body, &["world", "xworld"]);
    }

    Balances {
        primary,
        usdt,
        world,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
