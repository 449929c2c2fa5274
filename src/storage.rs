//! Persistence layer.
//!
//! Saves and loads the strategy profile and the account list to/from flat
//! JSON files. Both documents are small and written atomically enough for
//! our purposes with a plain overwrite; a database would be overkill here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::strategy::Strategy;

/// Default strategy profile path.
const DEFAULT_PROFILE_FILE: &str = "hideout_profile.json";

/// Default account list path.
const DEFAULT_ACCOUNTS_FILE: &str = "hideout_accounts.json";

// ---------------------------------------------------------------------------
// Strategy profile
// ---------------------------------------------------------------------------

/// The persisted run configuration: stake schedule, strategy choice, and
/// risk limits. Saved as a flat JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyProfile {
    pub base_stake: f64,
    pub multiplier: f64,
    pub strategy: Strategy,
    /// Rest for one round after this many consecutive staked rounds
    /// (0 disables).
    pub rest_every_n_rounds: u32,
    /// Rest this many rounds after a loss (0 disables).
    pub rest_after_n_losses: u32,
    /// Stop when balance reaches this level (requires `stop_on_profit`).
    pub profit_target: Option<f64>,
    pub stop_on_profit: bool,
    /// Stop when balance falls to this level (requires `stop_on_loss`).
    pub loss_floor: Option<f64>,
    pub stop_on_loss: bool,
}

impl Default for StrategyProfile {
    fn default() -> Self {
        Self {
            base_stake: 1.0,
            multiplier: 2.0,
            strategy: Strategy::Random,
            rest_every_n_rounds: 0,
            rest_after_n_losses: 0,
            profit_target: None,
            stop_on_profit: false,
            loss_floor: None,
            stop_on_loss: false,
        }
    }
}

/// Save the strategy profile to a JSON file.
pub fn save_profile(profile: &StrategyProfile, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_PROFILE_FILE);
    let json = serde_json::to_string_pretty(profile)
        .context("Failed to serialise strategy profile")?;

    std::fs::write(path, &json)
        .context(format!("Failed to write profile to {path}"))?;

    debug!(path, strategy = profile.strategy.id(), "Profile saved");
    Ok(())
}

/// Load the strategy profile from a JSON file.
/// Returns None if the file doesn't exist (caller decides on defaults).
pub fn load_profile(path: Option<&str>) -> Result<Option<StrategyProfile>> {
    let path = path.unwrap_or(DEFAULT_PROFILE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved profile found");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read profile from {path}"))?;

    let profile: StrategyProfile = serde_json::from_str(&json)
        .context(format!("Failed to parse profile from {path}"))?;

    info!(
        path,
        strategy = profile.strategy.id(),
        base_stake = profile.base_stake,
        multiplier = profile.multiplier,
        "Profile loaded from disk"
    );

    Ok(Some(profile))
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A stored game account. The secret key is kept verbatim here because the
/// file IS the credential store; it is wrapped in `SecretString` the moment
/// it enters the running process (see `config::Credentials`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: u64,
    pub secret_key: String,
}

/// Load the ordered account list. A missing file is an empty list.
pub fn load_accounts(path: Option<&str>) -> Result<Vec<Account>> {
    let path = path.unwrap_or(DEFAULT_ACCOUNTS_FILE);

    if !Path::new(path).exists() {
        return Ok(Vec::new());
    }

    let json = std::fs::read_to_string(path)
        .context(format!("Failed to read accounts from {path}"))?;
    let accounts: Vec<Account> = serde_json::from_str(&json)
        .context(format!("Failed to parse accounts from {path}"))?;
    Ok(accounts)
}

/// Save the account list.
pub fn save_accounts(accounts: &[Account], path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_ACCOUNTS_FILE);
    let json = serde_json::to_string_pretty(accounts)
        .context("Failed to serialise accounts")?;
    std::fs::write(path, &json)
        .context(format!("Failed to write accounts to {path}"))?;
    Ok(())
}

/// Add an account to the list, rejecting duplicate user ids.
pub fn add_account(accounts: &mut Vec<Account>, account: Account) -> Result<()> {
    if accounts.iter().any(|a| a.user_id == account.user_id) {
        anyhow::bail!("Account with user_id {} already exists", account.user_id);
    }
    info!(user_id = account.user_id, "Account added");
    accounts.push(account);
    Ok(())
}

/// Parse an account out of a game link of the form
/// `https://host/path?userId=123&secretKey=abc`.
///
/// The game client hands players such links; they are the only place the
/// credentials appear together, so this is how accounts get enrolled.
pub fn parse_account_link(link: &str) -> Result<Account> {
    let query = link
        .split_once('?')
        .map(|(_, q)| q)
        .context("Link has no query string")?;

    let mut user_id: Option<u64> = None;
    let mut secret_key: Option<String> = None;

    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key {
            "userId" | "user_id" => {
                user_id = urlencoding::decode(value)
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok());
            }
            "secretKey" | "secret_key" => {
                secret_key = urlencoding::decode(value).ok().map(|v| v.into_owned());
            }
            _ => {}
        }
    }

    match (user_id, secret_key) {
        (Some(user_id), Some(secret_key)) if !secret_key.is_empty() => Ok(Account {
            user_id,
            secret_key,
        }),
        _ => anyhow::bail!("Link is missing userId or secretKey"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
