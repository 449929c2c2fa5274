//! Streaming ingestion.
//!
//! Maintains one logical WebSocket connection to the game server: sends the
//! "enter game" handshake on connect, decodes and routes every inbound
//! frame into the engine, answers pings, and reconnects with capped
//! exponential backoff plus jitter until the process-wide stop flag is set.
//! The liveness monitor steers the connection through [`LinkCommand`]s.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::events::decode_frame;
use crate::config::{AppConfig, BackoffConfig, Credentials};
use crate::engine::Engine;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Keepalive ping interval.
const PING_INTERVAL: Duration = Duration::from_secs(15);

// ---------------------------------------------------------------------------
// Link control
// ---------------------------------------------------------------------------

/// Commands from the liveness monitor to the stream task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkCommand {
    /// Re-send the enter-game handshake on the current connection.
    ResendHandshake,
    /// Tear the connection down and reconnect.
    Reconnect,
}

/// Shared receive-liveness clock: touched on every inbound frame, read by
/// the monitor to detect silent or half-open connections.
#[derive(Debug)]
pub struct LinkHealth {
    last_frame: StdMutex<Instant>,
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkHealth {
    pub fn new() -> Self {
        Self {
            last_frame: StdMutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        if let Ok(mut guard) = self.last_frame.lock() {
            *guard = Instant::now();
        }
    }

    /// Seconds since the last inbound frame.
    pub fn silence_secs(&self) -> f64 {
        self.last_frame
            .lock()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Reconnect backoff
// ---------------------------------------------------------------------------

/// Capped exponential backoff with uniform jitter. The base delay grows by
/// `factor` per consecutive failure and resets on a successful connection.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: f64,
    initial: f64,
    factor: f64,
    max: f64,
    jitter: f64,
}

impl ReconnectBackoff {
    pub fn new(cfg: &BackoffConfig) -> Self {
        Self {
            base: cfg.initial_secs,
            initial: cfg.initial_secs,
            factor: cfg.factor,
            max: cfg.max_secs,
            jitter: cfg.jitter_secs,
        }
    }

    pub fn reset(&mut self) {
        self.base = self.initial;
    }

    /// Delay to sleep before the next attempt; advances the schedule.
    pub fn next_delay<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let jitter = if self.jitter > 0.0 {
            rng.random_range(0.0..self.jitter)
        } else {
            0.0
        };
        let delay = (self.base + jitter).min(self.max);
        self.base = (self.base * self.factor).min(self.max);
        delay
    }
}

// ---------------------------------------------------------------------------
// Stream task
// ---------------------------------------------------------------------------

/// Run the streaming connection until the stop flag is raised.
pub async fn run_stream(
    engine: Arc<Engine>,
    cfg: Arc<AppConfig>,
    creds: Credentials,
    health: Arc<LinkHealth>,
    mut commands: mpsc::Receiver<LinkCommand>,
    mut stop: watch::Receiver<bool>,
) {
    let mut backoff = ReconnectBackoff::new(&cfg.backoff);

    loop {
        if *stop.borrow() {
            break;
        }

        let connected = match tokio::time::timeout(
            Duration::from_secs(cfg.timing.http_timeout_secs),
            connect_async(cfg.endpoints.stream_url.as_str()),
        )
        .await
        {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(_) => Err(anyhow::anyhow!("connect timed out")),
        };

        match connected {
            Ok((ws, _)) => {
                info!(url = %cfg.endpoints.stream_url, "Stream connected");
                backoff.reset();
                health.touch();
                match drive_connection(ws, &engine, &cfg, &creds, &health, &mut commands, &mut stop)
                    .await
                {
                    Ok(()) => {
                        // Clean shutdown via the stop flag.
                        break;
                    }
                    Err(e) => warn!(error = %e, "Stream session ended"),
                }
            }
            Err(e) => warn!(error = %e, "Stream connect failed"),
        }

        if *stop.borrow() {
            break;
        }
        let delay = backoff.next_delay(&mut rand::rng());
        debug!(secs = format!("{delay:.1}"), "Reconnecting after backoff");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs_f64(delay)) => {}
            _ = stop.changed() => {}
        }
    }

    info!("Stream task exiting");
}

/// Drive one established connection. Returns Ok on a stop-flag shutdown and
/// Err on any condition requiring a reconnect.
async fn drive_connection(
    ws: WsStream,
    engine: &Arc<Engine>,
    cfg: &Arc<AppConfig>,
    creds: &Credentials,
    health: &Arc<LinkHealth>,
    commands: &mut mpsc::Receiver<LinkCommand>,
    stop: &mut watch::Receiver<bool>,
) -> Result<()> {
    let (mut sink, mut source) = ws.split();
    send_handshake(&mut sink, cfg, creds).await?;

    let mut ping_timer = tokio::time::interval(PING_INTERVAL);
    ping_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping_timer.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            msg = source.next() => {
                let msg = msg.context("stream closed by server")??;
                handle_message(msg, engine, health, &mut sink).await?;
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(LinkCommand::ResendHandshake) => {
                        debug!("Re-sending handshake on monitor request");
                        send_handshake(&mut sink, cfg, creds).await?;
                    }
                    Some(LinkCommand::Reconnect) => {
                        anyhow::bail!("reconnect requested by liveness monitor");
                    }
                    None => anyhow::bail!("link command channel closed"),
                }
            }

            _ = ping_timer.tick() => {
                sink.send(Message::Ping(Vec::new()))
                    .await
                    .context("keepalive ping failed")?;
            }

            _ = stop.changed() => {
                if *stop.borrow() {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_message(
    msg: Message,
    engine: &Arc<Engine>,
    health: &Arc<LinkHealth>,
    sink: &mut WsSink,
) -> Result<()> {
    match msg {
        Message::Text(text) => {
            health.touch();
            dispatch_frame(engine, &text).await;
        }
        Message::Binary(bin) => {
            health.touch();
            if let Ok(text) = String::from_utf8(bin) {
                dispatch_frame(engine, &text).await;
            }
        }
        Message::Ping(payload) => {
            sink.send(Message::Pong(payload)).await?;
        }
        Message::Pong(_) => {
            health.touch();
        }
        Message::Close(frame) => {
            anyhow::bail!("server closed connection: {frame:?}");
        }
        _ => {}
    }
    Ok(())
}

async fn dispatch_frame(engine: &Arc<Engine>, raw: &str) {
    match decode_frame(raw) {
        Some(event) => engine.handle_event(event).await,
        None => {
            let preview: String = raw.chars().take(200).collect();
            debug!(frame = %preview, "Unrecognized frame dropped");
        }
    }
}

async fn send_handshake(sink: &mut WsSink, cfg: &AppConfig, creds: &Credentials) -> Result<()> {
    let payload = json!({
        "msg_type": "handle_enter_game",
        "asset_type": cfg.game.asset_type,
        "user_id": creds.user_id(),
        "user_secret_key": creds.secret_key(),
    });
    sink.send(Message::Text(payload.to_string()))
        .await
        .context("enter-game handshake failed")?;
    debug!("Handshake sent");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
