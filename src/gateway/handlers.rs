//! Read-only presale endpoints

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};

use super::state::AppState;
use super::types::{
    AccountBalance, ApiResponse, BalancesData, ConfigData, HealthResponse, RecentQuery, TierData,
    error_codes,
};
use crate::money::{base_units_to_decimal, lamports_to_sol};
use crate::presale::ledger::PurchaseRecord;
use crate::presale::stats::{MAX_RECENT, StatsSnapshot};

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn ok<T>(data: T) -> ApiResult<T> {
    (StatusCode::OK, Json(ApiResponse::success(data)))
}

/// Distribution parameters
#[utoipa::path(
    get,
    path = "/api/v1/config",
    responses(
        (status = 200, description = "Presale configuration", body = ConfigData)
    ),
    tag = "Presale"
)]
pub async fn get_config(State(state): State<Arc<AppState>>) -> ApiResult<ConfigData> {
    let s = &state.settings;
    let guards = s.policy.guards();

    ok(ConfigData {
        recipient: s.treasury.to_string(),
        token_mint: s.token_mint.to_string(),
        token_decimals: s.token_decimals,
        distributor: s.distributor.to_string(),
        tiers: s
            .pricing
            .tiers()
            .iter()
            .map(|t| TierData {
                price: t.price.to_string(),
                tokens: t.tokens,
            })
            .collect(),
        tokens_per_sol: s.pricing.tokens_per_sol().to_string(),
        min_sol: guards.min_base.map(|v| v.to_string()),
        max_sol: guards.max_base.map(|v| v.to_string()),
        cap: s.policy.cap(),
        goal: s.goal.map(|v| v.to_string()),
        burn_mode: s.policy.burn_mode(),
        burn_rate_bps: s.policy.burn_rate_bps(),
        dry_run: s.dry_run,
    })
}

/// Totals derived from the ledger
///
/// Degrades to zeros (with `degraded: true`) when the ledger is unreachable.
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    responses(
        (status = 200, description = "Presale totals", body = StatsSnapshot)
    ),
    tag = "Presale"
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<StatsSnapshot> {
    ok(state.stats.snapshot().await)
}

/// Most recent purchases, newest first
#[utoipa::path(
    get,
    path = "/api/v1/recent",
    params(RecentQuery),
    responses(
        (status = 200, description = "Recent purchases", body = Vec<PurchaseRecord>)
    ),
    tag = "Presale"
)]
pub async fn get_recent(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Vec<PurchaseRecord>> {
    let limit = query.limit.unwrap_or(MAX_RECENT);
    ok(state.stats.recent(limit).await)
}

/// Live on-chain balances of the treasury and the distributor
#[utoipa::path(
    get,
    path = "/api/v1/balances",
    responses(
        (status = 200, description = "Balances", body = BalancesData),
        (status = 503, description = "Chain node unreachable")
    ),
    tag = "Presale"
)]
pub async fn get_balances(State(state): State<Arc<AppState>>) -> ApiResult<BalancesData> {
    let s = &state.settings;
    let chain = &state.chain;

    let result = async {
        let treasury = chain.native_balance(&s.treasury).await?;
        let distributor = chain.native_balance(&s.distributor).await?;
        let tokens = chain.token_balance(&s.distributor).await?;
        Ok::<_, crate::presale::error::ChainError>((treasury, distributor, tokens))
    }
    .await;

    match result {
        Ok((treasury, distributor, tokens)) => ok(BalancesData {
            treasury: AccountBalance {
                address: s.treasury.to_string(),
                lamports: treasury,
                sol: lamports_to_sol(treasury).normalize().to_string(),
            },
            distributor: AccountBalance {
                address: s.distributor.to_string(),
                lamports: distributor,
                sol: lamports_to_sol(distributor).normalize().to_string(),
            },
            distributor_tokens: tokens,
            distributor_tokens_display: base_units_to_decimal(tokens, s.token_decimals as u32)
                .normalize()
                .to_string(),
        }),
        Err(e) => {
            tracing::warn!("[BALANCES] chain read failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse::error(
                    error_codes::CHAIN_UNAVAILABLE,
                    "chain unavailable",
                )),
            )
        }
    }
}

/// Health check endpoint
///
/// - Healthy: 200 OK + {code: 0, data: {...}}
/// - Durable ledger configured but unreachable: 503 + {code: 5001}
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "Service healthy", body = HealthResponse, content_type = "application/json"),
        (status = 503, description = "Ledger storage unreachable")
    ),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> ApiResult<HealthResponse> {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);

    if state.stats.is_durable() && !state.stats.storage_healthy().await {
        tracing::error!("[HEALTH] {} ledger unreachable", state.stats.backend());
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::error(
                error_codes::SERVICE_UNAVAILABLE,
                "unavailable",
            )),
        );
    }

    ok(HealthResponse {
        timestamp_ms: now_ms,
        version: env!("GIT_HASH").to_string(),
        ledger: state.stats.backend().to_string(),
        durable: state.stats.is_durable(),
    })
}
