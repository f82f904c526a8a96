//! API response envelope and DTOs
//!
//! - `ApiResponse<T>`: unified response wrapper
//! - `error_codes`: standard error code constants
//! - Response DTOs for the read-only presale endpoints

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::presale::policy::BurnMode;

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

/// Standard API error codes
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Server errors (5xxx)
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
    pub const CHAIN_UNAVAILABLE: i32 = 5002;
}

/// One fixed-price package
#[derive(Debug, Serialize, ToSchema)]
pub struct TierData {
    #[schema(example = "0.10")]
    pub price: String,
    #[schema(example = 5000000)]
    pub tokens: u64,
}

/// Static distribution parameters
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigData {
    /// Address buyers send SOL to
    #[schema(example = "4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T")]
    pub recipient: String,
    pub token_mint: String,
    pub token_decimals: u8,
    pub distributor: String,
    pub tiers: Vec<TierData>,
    /// Linear fallback rate
    pub tokens_per_sol: String,
    pub min_sol: Option<String>,
    pub max_sol: Option<String>,
    pub cap: Option<u64>,
    pub goal: Option<String>,
    pub burn_mode: BurnMode,
    pub burn_rate_bps: u32,
    pub dry_run: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountBalance {
    pub address: String,
    pub lamports: u64,
    #[schema(example = "1.5")]
    pub sol: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalancesData {
    pub treasury: AccountBalance,
    pub distributor: AccountBalance,
    /// Distributor token holdings in base units
    pub distributor_tokens: u64,
    /// Same figure scaled by the token decimals
    pub distributor_tokens_display: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Server timestamp in milliseconds
    #[schema(example = 1703494800000_u64)]
    pub timestamp_ms: u64,
    /// Build revision
    pub version: String,
    /// Ledger backend in use
    #[schema(example = "postgres")]
    pub ledger: String,
    pub durable: bool,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentQuery {
    /// Number of purchases to return (1-25, default 25)
    pub limit: Option<usize>,
}
