//! Presale Sentinel - deposit watcher and token distributor
//!
//! Detects native SOL deposits to a treasury address and airdrops the
//! purchased token from a distributor account, exactly once per deposit.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration and startup validation
//! - [`logging`] - tracing subscriber setup
//! - [`money`] - lamport and token base-unit conversions
//! - [`presale`] - detection, pricing, policy, execution and the ledger
//! - [`gateway`] - read-only HTTP query surface

pub mod config;
pub mod gateway;
pub mod logging;
pub mod money;
pub mod presale;

pub use config::{AppConfig, ConfigError, PresaleSettings};
pub use presale::{Poller, PresaleError};
