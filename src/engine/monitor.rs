//! Background loops: liveness monitor and balance poller.
//!
//! The liveness monitor watches the stream's receive clock — re-sending the
//! handshake after a short silence, forcing a reconnect after a long one —
//! and fires the elapsed-analysis decision trigger. The balance poller
//! refreshes the wallet on a fixed interval, independent of settlements.
//! Both loops exit when the stop flag is raised.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::client::stream::{LinkCommand, LinkHealth};
use crate::config::AppConfig;
use crate::engine::Engine;

/// Liveness monitor loop (sub-second tick).
pub async fn run_monitor(
    engine: Arc<Engine>,
    cfg: Arc<AppConfig>,
    health: Arc<LinkHealth>,
    link: mpsc::Sender<LinkCommand>,
    mut stop: watch::Receiver<bool>,
) {
    let tick = Duration::from_millis(cfg.timing.monitor_tick_ms);

    loop {
        tokio::select! {
            _ = tokio::time::sleep(tick) => {}
            _ = stop.changed() => {}
        }
        if *stop.borrow() {
            break;
        }

        let silence = health.silence_secs();

        if silence > cfg.timing.reconnect_silence_secs {
            info!(
                silence = format!("{silence:.0}s"),
                "Stream silent too long, forcing reconnect"
            );
            let _ = link.try_send(LinkCommand::Reconnect);
            // Restart the clock so the command isn't re-issued every tick
            // while the reconnect is in progress.
            health.touch();
        } else if silence > cfg.timing.handshake_silence_secs {
            debug!(
                silence = format!("{silence:.0}s"),
                "Stream quiet, re-sending handshake"
            );
            let _ = link.try_send(LinkCommand::ResendHandshake);
        }

        // Second writer of the decision trigger; the prediction-lock CAS
        // keeps it mutually exclusive with the countdown path.
        engine.tick_analysis_deadline().await;
    }

    info!("Monitor task exiting");
}

/// Balance poller loop (few-second interval).
pub async fn run_balance_poller(
    engine: Arc<Engine>,
    cfg: Arc<AppConfig>,
    mut stop: watch::Receiver<bool>,
) {
    let interval = Duration::from_secs_f64(cfg.timing.balance_poll_secs.max(1.0));

    loop {
        engine.refresh_balance().await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = stop.changed() => {}
        }
        if *stop.borrow() {
            break;
        }
    }

    info!("Balance poller exiting");
}
