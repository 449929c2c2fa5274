//! Game server clients.
//!
//! Defines the `GameApi` trait — the seam between the engine and the
//! request/response endpoints — and its production HTTP implementation.
//! The streaming connection lives in [`stream`]; frame decoding in
//! [`events`].

pub mod bets;
pub mod events;
pub mod stream;
pub mod wallet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{AppConfig, Credentials};
use crate::types::{Balances, RoomId, StakeAck};

/// Abstraction over the game's request/response endpoints.
///
/// The engine only talks to this trait, so tests drive it with an in-memory
/// implementation and never touch the network.
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Fetch the wallet balances. Implementations retry transient failures
    /// internally; an `Err` means the balance is genuinely unavailable.
    async fn fetch_balances(&self) -> Result<Balances>;

    /// Submit a stake for a round. Transport errors are `Err`; a reachable
    /// server that rejects the stake is an `Ok` ack with `accepted == false`.
    async fn place_stake(&self, round_id: u64, room: RoomId, amount: f64) -> Result<StakeAck>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Production client for the bet and wallet endpoints.
pub struct HttpGameApi {
    http: Client,
    cfg: Arc<AppConfig>,
    creds: Credentials,
}

impl HttpGameApi {
    pub fn new(cfg: Arc<AppConfig>, creds: Credentials) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.timing.http_timeout_secs))
            .user_agent(
                "Mozilla/5.0 (Linux; Android 6.0; Nexus 5) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/137.0.0.0 Mobile Safari/537.36",
            )
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, cfg, creds })
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub(crate) fn creds(&self) -> &Credentials {
        &self.creds
    }

    /// Credential headers attached to every API call.
    pub(crate) fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str(&self.creds.user_id().to_string()) {
            headers.insert("user-id", v);
        }
        if let Ok(v) = HeaderValue::from_str(self.creds.secret_key()) {
            headers.insert("user-secret-key", v);
        }
        headers
    }

    /// The browser-shaped header set the wallet endpoint expects on top of
    /// the credentials.
    pub(crate) fn wallet_headers(&self) -> HeaderMap {
        let mut headers = self.auth_headers();
        headers.insert("accept", HeaderValue::from_static("*/*"));
        headers.insert("accept-language", HeaderValue::from_static("vi,en;q=0.9"));
        headers.insert("cache-control", HeaderValue::from_static("no-cache"));
        headers.insert("country-code", HeaderValue::from_static("vn"));
        headers.insert("origin", HeaderValue::from_static("https://xworld.info"));
        headers.insert("pragma", HeaderValue::from_static("no-cache"));
        headers.insert("referer", HeaderValue::from_static("https://xworld.info/"));
        headers.insert("user-login", HeaderValue::from_static("login_v2"));
        headers.insert("xb-language", HeaderValue::from_static("vi-VN"));
        headers
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn fetch_balances(&self) -> Result<Balances> {
        self.fetch_balances_http().await
    }

    async fn place_stake(&self, round_id: u64, room: RoomId, amount: f64) -> Result<StakeAck> {
        self.place_stake_http(round_id, room, amount).await
    }
}
