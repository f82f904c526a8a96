//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::OpenApi;

use crate::config::AllocationShare;
use crate::gateway::types::{AccountBalance, BalancesData, ConfigData, HealthResponse, TierData};
use crate::presale::ledger::PurchaseRecord;
use crate::presale::policy::BurnMode;
use crate::presale::stats::{LiquidityStats, StatsSnapshot};

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Presale Sentinel API",
        version = "1.0.0",
        description = "Read-only view of a presale: configuration, totals, recent purchases and live balances.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::get_config,
        crate::gateway::handlers::get_stats,
        crate::gateway::handlers::get_recent,
        crate::gateway::handlers::get_balances,
    ),
    components(
        schemas(
            HealthResponse,
            ConfigData,
            TierData,
            StatsSnapshot,
            LiquidityStats,
            AllocationShare,
            BurnMode,
            PurchaseRecord,
            BalancesData,
            AccountBalance,
        )
    ),
    tags(
        (name = "Presale", description = "Presale configuration, totals and purchases"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;
