//! Ledger Store
//!
//! Idempotent record of fulfilled deposits and executed burns. The
//! signature of the source transaction is the idempotency key: a second
//! commit for the same signature is dropped, never applied twice.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use super::error::LedgerError;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

/// One fulfilled deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PurchaseRecord {
    /// Source transaction signature (idempotency key)
    pub signature: String,
    pub sender: String,
    /// SOL received
    #[schema(value_type = String)]
    pub base_amount: Decimal,
    /// Whole tokens paid to the buyer, after burn split and cap pro-ration
    pub token_amount: u64,
    pub recorded_at: DateTime<Utc>,
}

impl PurchaseRecord {
    pub fn new(signature: String, sender: String, base_amount: Decimal, token_amount: u64) -> Self {
        Self {
            signature,
            sender,
            base_amount,
            token_amount,
            recorded_at: Utc::now(),
        }
    }
}

/// One executed burn
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BurnRecord {
    pub amount: u64,
    pub recorded_at: DateTime<Utc>,
}

impl BurnRecord {
    pub fn new(amount: u64) -> Self {
        Self {
            amount,
            recorded_at: Utc::now(),
        }
    }
}

/// Aggregates taken in one consistent read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    pub base: Decimal,
    pub tokens: u64,
    pub burned: u64,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Whether records survive a restart
    fn is_durable(&self) -> bool;

    /// Whether a purchase for `signature` was already committed
    async fn seen(&self, signature: &str) -> Result<bool, LedgerError>;

    /// Insert-or-ignore. Returns false when the signature was already present
    async fn commit_purchase(&self, record: &PurchaseRecord) -> Result<bool, LedgerError>;

    /// Append a burn fact
    async fn commit_burn(&self, record: &BurnRecord) -> Result<(), LedgerError>;

    async fn totals(&self) -> Result<LedgerTotals, LedgerError>;

    /// Newest first
    async fn recent_purchases(&self, limit: usize) -> Result<Vec<PurchaseRecord>, LedgerError>;

    async fn total_burned(&self) -> Result<u64, LedgerError> {
        Ok(self.totals().await?.burned)
    }

    /// Storage reachability
    async fn health_check(&self) -> Result<(), LedgerError>;
}
