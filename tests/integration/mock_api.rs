//! Mock game API for integration testing.
//!
//! Provides a deterministic `GameApi` implementation that returns a
//! controllable wallet balance and records every submitted stake — all
//! in-memory with no external dependencies.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hideout::client::GameApi;
use hideout::types::{Balances, RoomId, StakeAck};

/// A submitted stake, as seen by the server side.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStake {
    pub round_id: u64,
    pub room: RoomId,
    pub amount: f64,
}

/// Deterministic in-memory game API.
///
/// The balance is fully controllable from test code: `set_balance(None)`
/// makes fetches fail, simulating an unreachable wallet.
pub struct MockGameApi {
    balance: Mutex<Option<f64>>,
    stakes: Mutex<Vec<RecordedStake>>,
    accept_stakes: Mutex<bool>,
    balance_fetches: AtomicUsize,
}

impl MockGameApi {
    pub fn new(initial_balance: Option<f64>) -> Arc<Self> {
        Arc::new(Self {
            balance: Mutex::new(initial_balance),
            stakes: Mutex::new(Vec::new()),
            accept_stakes: Mutex::new(true),
            balance_fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_balance(&self, balance: Option<f64>) {
        *self.balance.lock().unwrap() = balance;
    }

    pub fn set_accept_stakes(&self, accept: bool) {
        *self.accept_stakes.lock().unwrap() = accept;
    }

    pub fn stakes(&self) -> Vec<RecordedStake> {
        self.stakes.lock().unwrap().clone()
    }

    pub fn balance_fetches(&self) -> usize {
        self.balance_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GameApi for MockGameApi {
    async fn fetch_balances(&self) -> Result<Balances> {
        self.balance_fetches.fetch_add(1, Ordering::SeqCst);
        match *self.balance.lock().unwrap() {
            Some(primary) => Ok(Balances {
                primary: Some(primary),
                usdt: None,
                world: None,
            }),
            None => Err(anyhow!("wallet unreachable")),
        }
    }

    async fn place_stake(&self, round_id: u64, room: RoomId, amount: f64) -> Result<StakeAck> {
        self.stakes.lock().unwrap().push(RecordedStake {
            round_id,
            room,
            amount,
        });
        let accepted = *self.accept_stakes.lock().unwrap();
        Ok(StakeAck {
            accepted,
            code: Some(if accepted { 0 } else { 1002 }),
            message: Some(if accepted { "ok" } else { "rejected" }.to_string()),
        })
    }
}
