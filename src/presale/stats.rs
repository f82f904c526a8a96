//! Stats Aggregator - read path for the query surface
//!
//! Never fails outward: a ledger error degrades the snapshot to zeros and
//! sets `degraded`, recent purchases degrade to an empty list.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use super::ledger::{LedgerStore, LedgerTotals, PurchaseRecord};
use super::policy::BurnMode;
use crate::config::{AllocationShare, PresaleSettings};
use crate::money::bps_of_decimal;

/// Upper bound for the recent purchases listing
pub const MAX_RECENT: usize = 25;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LiquidityStats {
    /// Share of raised SOL set aside for liquidity
    #[schema(value_type = String)]
    pub reserved: Decimal,
    /// SOL already added to the pool
    #[schema(value_type = String)]
    pub added: Decimal,
    pub reserve_bps: u32,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StatsSnapshot {
    #[schema(value_type = String)]
    pub total_base_raised: Decimal,
    pub total_token_sold: u64,
    pub total_burned: u64,
    pub cap: Option<u64>,
    pub cap_remaining: Option<u64>,
    #[schema(value_type = Option<String>)]
    pub goal: Option<Decimal>,
    pub burn_mode: BurnMode,
    pub burn_rate_bps: u32,
    pub allocation: Vec<AllocationShare>,
    pub liquidity: LiquidityStats,
    /// Ledger could not be read; figures are zeros
    pub degraded: bool,
}

pub struct StatsAggregator {
    ledger: Arc<dyn LedgerStore>,
    settings: Arc<PresaleSettings>,
}

impl StatsAggregator {
    pub fn new(ledger: Arc<dyn LedgerStore>, settings: Arc<PresaleSettings>) -> Self {
        Self { ledger, settings }
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        let (totals, degraded) = match self.ledger.totals().await {
            Ok(totals) => (totals, false),
            Err(e) => {
                warn!("Stats read failed, reporting zeros: {}", e);
                (LedgerTotals::default(), true)
            }
        };

        let policy = &self.settings.policy;
        let liquidity = &self.settings.liquidity;

        StatsSnapshot {
            total_base_raised: totals.base,
            total_token_sold: totals.tokens,
            total_burned: totals.burned,
            cap: policy.cap(),
            cap_remaining: policy.cap_remaining(totals.tokens),
            goal: self.settings.goal,
            burn_mode: policy.burn_mode(),
            burn_rate_bps: policy.burn_rate_bps(),
            allocation: self.settings.allocation.clone(),
            liquidity: LiquidityStats {
                reserved: bps_of_decimal(totals.base, liquidity.reserve_bps),
                added: liquidity.added,
                reserve_bps: liquidity.reserve_bps,
            },
            degraded,
        }
    }

    /// Newest first, at most [`MAX_RECENT`]
    pub async fn recent(&self, limit: usize) -> Vec<PurchaseRecord> {
        let limit = limit.clamp(1, MAX_RECENT);
        self.ledger
            .recent_purchases(limit)
            .await
            .unwrap_or_else(|e| {
                warn!("Recent purchases read failed: {}", e);
                Vec::new()
            })
    }

    /// Storage reachability; always fine for the volatile ledger
    pub async fn storage_healthy(&self) -> bool {
        match self.ledger.health_check().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Ledger health check failed: {}", e);
                false
            }
        }
    }

    pub fn backend(&self) -> &'static str {
        self.ledger.backend()
    }

    pub fn is_durable(&self) -> bool {
        self.ledger.is_durable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presale::error::LedgerError;
    use crate::presale::ledger::{BurnRecord, MemoryLedger};
    use crate::presale::policy::{DistributionPolicy, GuardConfig};
    use crate::presale::pricing::PricingResolver;
    use crate::presale::solana::Pubkey;
    use async_trait::async_trait;
    use std::str::FromStr;

    struct BrokenLedger;

    #[async_trait]
    impl LedgerStore for BrokenLedger {
        fn backend(&self) -> &'static str {
            "broken"
        }
        fn is_durable(&self) -> bool {
            true
        }
        async fn seen(&self, _signature: &str) -> Result<bool, LedgerError> {
            Err(LedgerError::OutOfRange("down".to_string()))
        }
        async fn commit_purchase(&self, _record: &PurchaseRecord) -> Result<bool, LedgerError> {
            Err(LedgerError::OutOfRange("down".to_string()))
        }
        async fn commit_burn(&self, _record: &BurnRecord) -> Result<(), LedgerError> {
            Err(LedgerError::OutOfRange("down".to_string()))
        }
        async fn totals(&self) -> Result<LedgerTotals, LedgerError> {
            Err(LedgerError::OutOfRange("down".to_string()))
        }
        async fn recent_purchases(&self, _limit: usize) -> Result<Vec<PurchaseRecord>, LedgerError> {
            Err(LedgerError::OutOfRange("down".to_string()))
        }
        async fn health_check(&self) -> Result<(), LedgerError> {
            Err(LedgerError::OutOfRange("down".to_string()))
        }
    }

    fn settings(cap: u64) -> Arc<PresaleSettings> {
        let mut settings = PresaleSettings::new(
            Pubkey::new_from_array([3; 32]),
            Pubkey::new_from_array([9; 32]),
            6,
            Pubkey::new_from_array([1; 32]),
            PricingResolver::new(vec![], Decimal::from(1000)),
            DistributionPolicy::new(GuardConfig::default(), cap, BurnMode::Extra, 100),
        );
        settings.liquidity.reserve_bps = 2_000;
        settings.liquidity.added = Decimal::from_str("1.5").unwrap();
        Arc::new(settings)
    }

    #[tokio::test]
    async fn test_snapshot_derives_from_ledger() {
        let ledger = Arc::new(MemoryLedger::default());
        ledger
            .commit_purchase(&PurchaseRecord::new(
                "a".to_string(),
                "buyer".to_string(),
                Decimal::from(10),
                8_000_000,
            ))
            .await
            .unwrap();
        ledger.commit_burn(&BurnRecord::new(80_000)).await.unwrap();

        let stats = StatsAggregator::new(ledger, settings(10_000_000));
        let snapshot = stats.snapshot().await;

        assert!(!snapshot.degraded);
        assert_eq!(snapshot.total_base_raised, Decimal::from(10));
        assert_eq!(snapshot.total_token_sold, 8_000_000);
        assert_eq!(snapshot.total_burned, 80_000);
        assert_eq!(snapshot.cap, Some(10_000_000));
        assert_eq!(snapshot.cap_remaining, Some(2_000_000));
        assert_eq!(snapshot.burn_mode, BurnMode::Extra);
        assert_eq!(snapshot.liquidity.reserved, Decimal::from(2));
        assert_eq!(snapshot.liquidity.added, Decimal::from_str("1.5").unwrap());
    }

    #[tokio::test]
    async fn test_uncapped_reports_no_remaining() {
        let stats = StatsAggregator::new(Arc::new(MemoryLedger::default()), settings(0));
        let snapshot = stats.snapshot().await;
        assert_eq!(snapshot.cap, None);
        assert_eq!(snapshot.cap_remaining, None);
    }

    #[tokio::test]
    async fn test_store_failure_degrades() {
        let stats = StatsAggregator::new(Arc::new(BrokenLedger), settings(100));
        let snapshot = stats.snapshot().await;

        assert!(snapshot.degraded);
        assert_eq!(snapshot.total_token_sold, 0);
        assert_eq!(snapshot.cap_remaining, Some(100));
        assert!(stats.recent(25).await.is_empty());
        assert!(!stats.storage_healthy().await);
    }

    #[tokio::test]
    async fn test_recent_is_clamped() {
        let ledger = Arc::new(MemoryLedger::default());
        for i in 0..30 {
            ledger
                .commit_purchase(&PurchaseRecord::new(
                    format!("sig{}", i),
                    "buyer".to_string(),
                    Decimal::ONE,
                    1,
                ))
                .await
                .unwrap();
        }
        let stats = StatsAggregator::new(ledger, settings(0));
        assert_eq!(stats.recent(100).await.len(), MAX_RECENT);
        assert_eq!(stats.recent(3).await.len(), 3);
    }
}
