//! Volatile ledger used when no database is configured
//!
//! Keeps every committed signature (so idempotency never forgets within the
//! process) but only a bounded window of full purchase records. Totals are
//! updated under the same write lock as the insert they belong to.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::{BurnRecord, LedgerStore, LedgerTotals, PurchaseRecord};
use crate::presale::error::LedgerError;

pub const DEFAULT_HISTORY: usize = 500;

#[derive(Default)]
struct MemoryState {
    /// Grows with every purchase for the life of the process; only `recent` is capped
    signatures: HashSet<String>,
    /// Newest at the back
    recent: VecDeque<PurchaseRecord>,
    totals: LedgerTotals,
}

pub struct MemoryLedger {
    state: RwLock<MemoryState>,
    history: usize,
}

impl MemoryLedger {
    pub fn new(history: usize) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            history: history.max(1),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn is_durable(&self) -> bool {
        false
    }

    async fn seen(&self, signature: &str) -> Result<bool, LedgerError> {
        Ok(self.state.read().await.signatures.contains(signature))
    }

    async fn commit_purchase(&self, record: &PurchaseRecord) -> Result<bool, LedgerError> {
        let mut state = self.state.write().await;
        if !state.signatures.insert(record.signature.clone()) {
            debug!("Purchase {} already recorded", record.signature);
            return Ok(false);
        }

        state.totals.base += record.base_amount;
        state.totals.tokens = state.totals.tokens.saturating_add(record.token_amount);
        state.recent.push_back(record.clone());
        while state.recent.len() > self.history {
            state.recent.pop_front();
        }
        Ok(true)
    }

    async fn commit_burn(&self, record: &BurnRecord) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        state.totals.burned = state.totals.burned.saturating_add(record.amount);
        Ok(())
    }

    async fn totals(&self) -> Result<LedgerTotals, LedgerError> {
        Ok(self.state.read().await.totals)
    }

    async fn recent_purchases(&self, limit: usize) -> Result<Vec<PurchaseRecord>, LedgerError> {
        let state = self.state.read().await;
        Ok(state.recent.iter().rev().take(limit).cloned().collect())
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}
