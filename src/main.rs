//! HIDEOUT — autonomous survival-betting agent
//!
//! Entry point. Loads configuration and the persisted strategy profile,
//! initialises structured logging, resolves account credentials, and runs
//! the stream receiver, liveness monitor, and balance poller until the stop
//! flag is raised or the process is interrupted.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use hideout::client::stream::{self, LinkHealth};
use hideout::client::HttpGameApi;
use hideout::config::{AppConfig, Credentials};
use hideout::engine::{monitor, Engine};
use hideout::storage;
use hideout::types::RunMode;

const BANNER: &str = r#"
 _   _ ___ ____  _____ ___  _   _ _____
| | | |_ _|  _ \| ____/ _ \| | | |_   _|
| |_| || || | | |  _|| | | | | | | | |
|  _  || || |_| | |__| |_| | |_| | | |
|_| |_|___|____/|_____\___/ \___/  |_|

  Survival-Betting Agent
  v0.1.0 — pick the room the killer won't
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = Arc::new(AppConfig::load_or_default("config.toml")?);

    init_logging();
    println!("{BANNER}");

    // -- Strategy profile -------------------------------------------------

    let profile = match storage::load_profile(None)? {
        Some(p) => p,
        None => {
            warn!("No saved profile, using defaults (base stake 1.0, x2, random)");
            storage::StrategyProfile::default()
        }
    };

    let run_mode: RunMode = std::env::var("HIDEOUT_RUN_MODE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(RunMode::Auto);

    info!(
        strategy = profile.strategy.id(),
        base_stake = profile.base_stake,
        multiplier = profile.multiplier,
        mode = %run_mode,
        "HIDEOUT starting up"
    );

    // -- Credentials -------------------------------------------------------

    let creds = resolve_credentials().context(
        "No account available: set HIDEOUT_USER_ID/HIDEOUT_SECRET_KEY or add an \
         account to the accounts file",
    )?;
    info!(user_id = creds.user_id(), "Account selected");

    // -- Wire up tasks ------------------------------------------------------

    let api = Arc::new(HttpGameApi::new(Arc::clone(&cfg), creds.clone())?);
    let engine = Engine::new(Arc::clone(&cfg), api, &profile, run_mode);

    let health = Arc::new(LinkHealth::new());
    let (link_tx, link_rx) = mpsc::channel(8);

    let stream_task = tokio::spawn(stream::run_stream(
        Arc::clone(&engine),
        Arc::clone(&cfg),
        creds,
        Arc::clone(&health),
        link_rx,
        engine.stop_rx(),
    ));
    let monitor_task = tokio::spawn(monitor::run_monitor(
        Arc::clone(&engine),
        Arc::clone(&cfg),
        health,
        link_tx,
        engine.stop_rx(),
    ));
    let poller_task = tokio::spawn(monitor::run_balance_poller(
        Arc::clone(&engine),
        Arc::clone(&cfg),
        engine.stop_rx(),
    ));

    // -- Run until stopped ---------------------------------------------------

    let mut stop_rx = engine.stop_rx();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received");
            engine.shutdown("interrupted by user");
        }
        _ = stop_rx.changed() => {
            info!("Stop flag raised, shutting down");
        }
    }

    // Let detached submissions/reconciliations finish, then join the loops.
    engine.pool().wait_idle().await;
    let _ = tokio::join!(stream_task, monitor_task, poller_task);

    let summary = engine.summary().await;
    info!(
        rounds = summary.round_index,
        bets = summary.bets_placed,
        profit = format!("{:+.2}", summary.cumulative_profit),
        max_win_streak = summary.max_win_streak,
        max_lose_streak = summary.max_lose_streak,
        "HIDEOUT shut down cleanly."
    );

    Ok(())
}

/// Pick credentials: explicit env vars win, otherwise the first stored
/// account.
fn resolve_credentials() -> Result<Credentials> {
    let env_uid = std::env::var("HIDEOUT_USER_ID")
        .ok()
        .and_then(|v| v.parse::<u64>().ok());
    let env_key = std::env::var("HIDEOUT_SECRET_KEY").ok();

    if let (Some(uid), Some(key)) = (env_uid, env_key) {
        return Ok(Credentials::new(uid, key));
    }

    let accounts = storage::load_accounts(None)?;
    let account = accounts
        .first()
        .context("accounts file is empty")?;
    Ok(Credentials::from_account(account))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hideout=info"));

    let json_logging = std::env::var("HIDEOUT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
