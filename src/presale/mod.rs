//! Presale Engine
//!
//! Watches the treasury for native SOL deposits and pays out the presale
//! token exactly once per deposit:
//! - Poller lists and classifies treasury transactions
//! - Pricing Resolver and Distribution Policy decide the payout
//! - Distribution Executor pays, burns and commits to the ledger
//! - Stats Aggregator serves the read path

pub mod chain;
pub mod error;
pub mod executor;
pub mod ledger;
pub mod policy;
pub mod poller;
pub mod pricing;
pub mod solana;
pub mod stats;

pub use chain::{ChainClient, ParsedInstruction, ParsedTransaction, SignatureInfo};
pub use error::{ChainError, LedgerError, PresaleError};
pub use executor::{Distribution, DistributionExecutor};
pub use ledger::{
    BurnRecord, LedgerStore, LedgerTotals, MemoryLedger, PgLedger, PurchaseRecord,
};
pub use policy::{Allocation, BurnMode, DistributionPolicy, GuardConfig, Ineligible};
pub use poller::{CycleReport, Deposit, Poller, classify};
pub use pricing::{PriceTier, PricingResolver};
pub use solana::{Keypair, Pubkey, SolanaRpcClient};
pub use stats::{StatsAggregator, StatsSnapshot};
