use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::presale::policy::{BurnMode, DistributionPolicy, GuardConfig, MAX_BPS};
use crate::presale::pricing::{PriceTier, PricingResolver};
use crate::presale::solana::keys::{Keypair, Pubkey, Signer, parse_keypair, read_keypair};

/// Inline distributor key, overrides the file
pub const ENV_DISTRIBUTOR_KEY: &str = "PRESALE_DISTRIBUTOR_KEY";
/// Durable ledger URL, overrides `postgres_url`
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Largest token precision whose `10^decimals` fits in u64
const MAX_TOKEN_DECIMALS: u8 = 19;
/// Node-side cap for getSignaturesForAddress
const MAX_SIGNATURE_WINDOW: usize = 1_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid address for {field}: {reason}")]
    Address { field: &'static str, reason: String },

    #[error("Invalid distributor key: {0}")]
    Key(String),

    #[error("No distributor key: set presale.distributor_key_path or PRESALE_DISTRIBUTOR_KEY")]
    MissingKey,

    #[error("Invalid presale setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    #[serde(default)]
    pub use_json: bool,
    pub rotation: String,
    pub gateway: GatewayConfig,
    pub chain: ChainConfig,
    pub presale: PresaleConfig,
    /// Selects the durable ledger when set
    #[serde(default)]
    pub postgres_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    #[serde(default = "default_commitment")]
    pub commitment: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_confirm_timeout_ms")]
    pub confirm_timeout_ms: u64,
    /// Pause between signature status checks while confirming
    #[serde(default = "default_status_poll_ms")]
    pub status_poll_ms: u64,
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_confirm_timeout_ms() -> u64 {
    60_000
}

fn default_status_poll_ms() -> u64 {
    500
}

/// Presale parameters as written in the file
#[derive(Debug, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PresaleConfig {
    pub treasury: String,
    pub token_mint: String,
    pub token_decimals: u8,
    #[serde(default)]
    pub distributor_key_path: Option<String>,
    /// Inline key material; wins over the path
    #[serde(default)]
    pub distributor_key: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_signature_window")]
    pub signature_window: usize,
    /// Checked in listed order
    #[serde(default)]
    pub tiers: Vec<PriceTier>,
    /// Linear fallback rate, whole tokens per SOL
    #[serde(default)]
    pub tokens_per_sol: Decimal,
    #[serde(default)]
    pub min_sol: Option<Decimal>,
    #[serde(default)]
    pub max_sol: Option<Decimal>,
    /// 0 = uncapped
    #[serde(default)]
    pub cap_tokens: u64,
    #[serde(default)]
    pub goal_sol: Option<Decimal>,
    #[serde(default)]
    pub burn: BurnConfig,
    #[serde(default)]
    pub allocation: Vec<AllocationShare>,
    #[serde(default)]
    pub liquidity: LiquidityConfig,
    #[serde(default)]
    pub dry_run: bool,
    /// Records kept by the volatile ledger
    #[serde(default = "default_memory_history")]
    pub memory_history: usize,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_signature_window() -> usize {
    50
}

fn default_memory_history() -> usize {
    500
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct BurnConfig {
    #[serde(default)]
    pub mode: BurnMode,
    #[serde(default)]
    pub rate_bps: u32,
}

/// Token supply breakdown, display only
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, ToSchema)]
pub struct AllocationShare {
    pub name: String,
    #[schema(value_type = String)]
    pub percent: Decimal,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct LiquidityConfig {
    #[serde(default)]
    pub reserve_bps: u32,
    #[serde(default)]
    pub added_sol: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiquiditySettings {
    pub reserve_bps: u32,
    pub added: Decimal,
}

/// Validated presale parameters, built once at startup and shared read-only
#[derive(Debug, Clone)]
pub struct PresaleSettings {
    pub treasury: Pubkey,
    pub token_mint: Pubkey,
    pub token_decimals: u8,
    pub distributor: Pubkey,
    pub poll_interval: Duration,
    pub signature_window: usize,
    pub pricing: PricingResolver,
    pub policy: DistributionPolicy,
    pub goal: Option<Decimal>,
    pub allocation: Vec<AllocationShare>,
    pub liquidity: LiquiditySettings,
    pub dry_run: bool,
    pub memory_history: usize,
}

impl PresaleSettings {
    /// Settings with default polling, no goal and no allocation breakdown
    pub fn new(
        treasury: Pubkey,
        token_mint: Pubkey,
        token_decimals: u8,
        distributor: Pubkey,
        pricing: PricingResolver,
        policy: DistributionPolicy,
    ) -> Self {
        Self {
            treasury,
            token_mint,
            token_decimals,
            distributor,
            poll_interval: Duration::from_millis(default_poll_interval_ms()),
            signature_window: default_signature_window(),
            pricing,
            policy,
            goal: None,
            allocation: Vec::new(),
            liquidity: LiquiditySettings::default(),
            dry_run: false,
            memory_history: default_memory_history(),
        }
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml` and apply environment overrides
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        Self::load_from(format!("config/{}.yaml", env))
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: AppConfig = serde_yaml::from_str(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Replace file values with whatever `lookup` yields
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(ENV_DISTRIBUTOR_KEY).filter(|v| !v.trim().is_empty()) {
            self.presale.distributor_key = Some(key);
        }
        if let Some(url) = lookup(ENV_DATABASE_URL).filter(|v| !v.trim().is_empty()) {
            self.postgres_url = Some(url);
        }
    }

    /// Check the presale section and load the distributor key
    pub fn validate(&self) -> Result<(PresaleSettings, Keypair), ConfigError> {
        let p = &self.presale;

        let treasury = parse_address("presale.treasury", &p.treasury)?;
        let token_mint = parse_address("presale.token_mint", &p.token_mint)?;
        let keypair = self.load_distributor()?;

        if p.token_decimals > MAX_TOKEN_DECIMALS {
            return Err(invalid(format!(
                "token_decimals {} exceeds {}",
                p.token_decimals, MAX_TOKEN_DECIMALS
            )));
        }
        if p.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms must be positive"));
        }
        if p.signature_window == 0 || p.signature_window > MAX_SIGNATURE_WINDOW {
            return Err(invalid(format!(
                "signature_window must be within 1..={}",
                MAX_SIGNATURE_WINDOW
            )));
        }
        if p.burn.rate_bps > MAX_BPS {
            return Err(invalid(format!("burn.rate_bps {} exceeds {}", p.burn.rate_bps, MAX_BPS)));
        }
        if p.liquidity.reserve_bps > MAX_BPS {
            return Err(invalid(format!(
                "liquidity.reserve_bps {} exceeds {}",
                p.liquidity.reserve_bps, MAX_BPS
            )));
        }
        if p.tokens_per_sol.is_sign_negative() {
            return Err(invalid("tokens_per_sol must not be negative"));
        }
        for (i, tier) in p.tiers.iter().enumerate() {
            if tier.price <= Decimal::ZERO || tier.tokens == 0 {
                return Err(invalid(format!(
                    "tier {} needs a positive price and payout",
                    i
                )));
            }
        }
        if p.tiers.is_empty() && p.tokens_per_sol.is_zero() {
            return Err(invalid("no tiers and a zero tokens_per_sol pays nothing"));
        }
        for (name, bound) in [("min_sol", p.min_sol), ("max_sol", p.max_sol)] {
            if bound.is_some_and(|v| v.is_sign_negative()) {
                return Err(invalid(format!("{} must not be negative", name)));
            }
        }
        if let (Some(min), Some(max)) = (p.min_sol, p.max_sol)
            && min > max
        {
            return Err(invalid(format!("min_sol {} is above max_sol {}", min, max)));
        }
        let allocated: Decimal = p.allocation.iter().map(|a| a.percent).sum();
        if p.allocation.iter().any(|a| a.percent.is_sign_negative())
            || allocated > Decimal::ONE_HUNDRED
        {
            return Err(invalid(format!("allocation shares add up to {}%", allocated)));
        }

        let settings = PresaleSettings {
            treasury,
            token_mint,
            token_decimals: p.token_decimals,
            distributor: keypair.pubkey(),
            poll_interval: Duration::from_millis(p.poll_interval_ms),
            signature_window: p.signature_window,
            pricing: PricingResolver::new(p.tiers.clone(), p.tokens_per_sol),
            policy: DistributionPolicy::new(
                GuardConfig {
                    min_base: p.min_sol,
                    max_base: p.max_sol,
                },
                p.cap_tokens,
                p.burn.mode,
                p.burn.rate_bps,
            ),
            goal: p.goal_sol,
            allocation: p.allocation.clone(),
            liquidity: LiquiditySettings {
                reserve_bps: p.liquidity.reserve_bps,
                added: p.liquidity.added_sol,
            },
            dry_run: p.dry_run,
            memory_history: p.memory_history.max(1),
        };

        Ok((settings, keypair))
    }

    fn load_distributor(&self) -> Result<Keypair, ConfigError> {
        let key = match (&self.presale.distributor_key, &self.presale.distributor_key_path) {
            (Some(inline), _) => parse_keypair(inline),
            (None, Some(path)) => read_keypair(path),
            (None, None) => return Err(ConfigError::MissingKey),
        };
        key.map_err(|e| ConfigError::Key(e.to_string()))
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Pubkey, ConfigError> {
    Pubkey::from_str(value.trim()).map_err(|e| ConfigError::Address {
        field,
        reason: e.to_string(),
    })
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
