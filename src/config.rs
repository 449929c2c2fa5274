//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field carries a serde default matching the live game's parameters, so the
//! binary runs without a config file. Account credentials never live here —
//! they come from the account store or the environment and are wrapped in
//! `SecretString` (see [`Credentials`]).

use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::storage::Account;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub endpoints: EndpointsConfig,
    pub game: GameConfig,
    pub timing: TimingConfig,
    pub backoff: BackoffConfig,
}

/// Server endpoints.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointsConfig {
    pub stream_url: String,
    pub bet_url: String,
    pub wallet_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            stream_url: "wss://api.escapemaster.net/escape_master/ws".to_string(),
            bet_url: "https://api.escapemaster.net/escape_game/bet".to_string(),
            wallet_url: "https://wallet.3games.io/api/wallet/user_asset".to_string(),
        }
    }
}

/// Game-level parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GameConfig {
    /// Currency stakes are denominated in.
    pub asset_type: String,
    /// Countdown value (server time units) at or below which the decision
    /// trigger fires.
    pub countdown_trigger: u32,
    /// Fallback decision trigger: seconds of analysis before deciding even
    /// without a countdown frame.
    pub analysis_secs: f64,
    /// Estimated payout multiple used for the win-delta fallback when no
    /// pre-settlement balance snapshot exists.
    pub estimated_win_multiple: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            asset_type: "BUILD".to_string(),
            countdown_trigger: 10,
            analysis_secs: 45.0,
            estimated_win_multiple: 7.0,
        }
    }
}

/// Loop intervals and timeouts.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    /// Balance poller interval (seconds).
    pub balance_poll_secs: f64,
    /// Liveness monitor tick (milliseconds).
    pub monitor_tick_ms: u64,
    /// Seconds of stream silence before re-sending the handshake.
    pub handshake_silence_secs: f64,
    /// Seconds of stream silence before forcing a reconnect.
    pub reconnect_silence_secs: f64,
    /// Delay before the post-settlement balance fetch (milliseconds),
    /// giving the server-side ledger time to update.
    pub settle_fetch_delay_ms: u64,
    /// Timeout applied to every HTTP call (seconds).
    pub http_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            balance_poll_secs: 4.0,
            monitor_tick_ms: 600,
            handshake_silence_secs: 12.0,
            reconnect_silence_secs: 45.0,
            settle_fetch_delay_ms: 2500,
            http_timeout_secs: 8,
        }
    }
}

/// Stream reconnect backoff parameters.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackoffConfig {
    pub initial_secs: f64,
    pub factor: f64,
    pub max_secs: f64,
    /// Upper bound of the uniform random jitter added to each delay.
    pub jitter_secs: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_secs: 1.0,
            factor: 1.8,
            max_secs: 30.0,
            jitter_secs: 0.8,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load the config file if present, otherwise fall back to defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Runtime account credentials. The secret key only leaves the wrapper at
/// the HTTP header boundary.
#[derive(Debug, Clone)]
pub struct Credentials {
    user_id: u64,
    secret_key: SecretString,
}

impl Credentials {
    pub fn new(user_id: u64, secret_key: impl Into<String>) -> Self {
        Self {
            user_id,
            secret_key: SecretString::new(secret_key.into()),
        }
    }

    pub fn from_account(account: &Account) -> Self {
        Self::new(account.user_id, account.secret_key.clone())
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    /// Expose the secret key for a request header.
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
