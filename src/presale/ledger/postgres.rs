//! Durable ledger on PostgreSQL

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use super::{BurnRecord, LedgerStore, LedgerTotals, PurchaseRecord};
use crate::presale::error::LedgerError;

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS presale_purchases (
           signature    TEXT PRIMARY KEY,
           sender       TEXT NOT NULL,
           base_amount  NUMERIC(30, 9) NOT NULL CHECK (base_amount > 0),
           token_amount BIGINT NOT NULL CHECK (token_amount >= 0),
           recorded_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
       )"#,
    r#"CREATE INDEX IF NOT EXISTS idx_presale_purchases_recorded_at
           ON presale_purchases (recorded_at DESC)"#,
    r#"CREATE TABLE IF NOT EXISTS presale_burns (
           id          BIGSERIAL PRIMARY KEY,
           amount      BIGINT NOT NULL CHECK (amount > 0),
           recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
       )"#,
];

/// PostgreSQL-backed ledger
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    /// Create a new connection pool
    pub async fn connect(database_url: &str) -> Result<Self, LedgerError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        info!("PostgreSQL ledger pool established");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables if they do not exist yet
    pub async fn init_schema(&self) -> Result<(), LedgerError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Ledger schema ready");
        Ok(())
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64, LedgerError> {
    i64::try_from(value).map_err(|_| LedgerError::OutOfRange(format!("{} {}", what, value)))
}

fn to_u64(value: i64, what: &str) -> Result<u64, LedgerError> {
    u64::try_from(value).map_err(|_| LedgerError::OutOfRange(format!("{} {}", what, value)))
}

#[async_trait]
impl LedgerStore for PgLedger {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    fn is_durable(&self) -> bool {
        true
    }

    async fn seen(&self, signature: &str) -> Result<bool, LedgerError> {
        let exists: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM presale_purchases WHERE signature = $1")
                .bind(signature)
                .fetch_optional(&self.pool)
                .await?;
        Ok(exists.is_some())
    }

    async fn commit_purchase(&self, record: &PurchaseRecord) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            r#"INSERT INTO presale_purchases
               (signature, sender, base_amount, token_amount, recorded_at)
               VALUES ($1, $2, $3, $4, $5)
               ON CONFLICT (signature) DO NOTHING"#,
        )
        .bind(&record.signature)
        .bind(&record.sender)
        .bind(record.base_amount)
        .bind(to_i64(record.token_amount, "token_amount")?)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn commit_burn(&self, record: &BurnRecord) -> Result<(), LedgerError> {
        sqlx::query("INSERT INTO presale_burns (amount, recorded_at) VALUES ($1, $2)")
            .bind(to_i64(record.amount, "burn amount")?)
            .bind(record.recorded_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn totals(&self) -> Result<LedgerTotals, LedgerError> {
        // One statement, one snapshot
        let row = sqlx::query(
            r#"SELECT
                 (SELECT COALESCE(SUM(base_amount), 0) FROM presale_purchases) AS base,
                 (SELECT COALESCE(SUM(token_amount), 0)::BIGINT FROM presale_purchases) AS tokens,
                 (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM presale_burns) AS burned"#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerTotals {
            base: row.try_get::<Decimal, _>("base")?,
            tokens: to_u64(row.try_get("tokens")?, "tokens")?,
            burned: to_u64(row.try_get("burned")?, "burned")?,
        })
    }

    async fn recent_purchases(&self, limit: usize) -> Result<Vec<PurchaseRecord>, LedgerError> {
        let rows = sqlx::query(
            r#"SELECT signature, sender, base_amount, token_amount, recorded_at
               FROM presale_purchases
               ORDER BY recorded_at DESC, signature DESC
               LIMIT $1"#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(PurchaseRecord {
                    signature: r.try_get("signature")?,
                    sender: r.try_get("sender")?,
                    base_amount: r.try_get("base_amount")?,
                    token_amount: to_u64(r.try_get("token_amount")?, "token_amount")?,
                    recorded_at: r.try_get::<DateTime<Utc>, _>("recorded_at")?,
                })
            })
            .collect()
    }

    async fn total_burned(&self) -> Result<u64, LedgerError> {
        let burned: i64 =
            sqlx::query_scalar("SELECT COALESCE(SUM(amount), 0)::BIGINT FROM presale_burns")
                .fetch_one(&self.pool)
                .await?;
        to_u64(burned, "burned")
    }

    async fn health_check(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
