//! Trade previews and execution handoff.
//!
//! Previews are persisted with a TTL. Executing an expired preview
//! re-prices it first and emits a `drift_warning` when the re-previewed
//! cost differs from the original by more than the configured tolerance.
//! Order submission itself is delegated to the broker layer.

use crate::config::EngineConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{BasketTradeGroup, Store, TradePreview, TradeSide};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use palisade_contracts::{build_roll, CalendarSpread, ContractCatalog, LegAction, RollDirection};
use palisade_prices::PriceStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// A single-leg trade request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRequest {
    /// Owning user.
    pub user_id: String,
    /// Symbol to trade (futures as `ROOT:YYYYMM`).
    pub symbol: String,
    /// Quantity in shares or contracts.
    pub quantity: f64,
    /// Side.
    pub side: TradeSide,
}

/// Execution outcome for one preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeExecution {
    /// The (possibly re-previewed) preview that was executed.
    pub preview: TradePreview,
    /// True when the preview expired and was re-generated.
    pub re_previewed: bool,
    /// True when the re-previewed cost drifted past the tolerance.
    pub drift_warning: bool,
    /// Relative cost drift observed.
    pub drift: f64,
}

fn futures_root(symbol: &str) -> &str {
    symbol.split(':').next().unwrap_or(symbol)
}

async fn estimate(
    prices: &PriceStore,
    catalog: &ContractCatalog,
    symbol: &str,
    quantity: f64,
    as_of: NaiveDate,
) -> ServiceResult<(f64, f64)> {
    if quantity <= 0.0 || !quantity.is_finite() {
        return Err(ServiceError::validation("quantity must be positive"));
    }
    let root = futures_root(symbol);
    let lookback = as_of - ChronoDuration::days(10);
    let series = prices.daily_close(root, lookback, as_of).await?;
    let price = series
        .at_or_before(as_of)
        .ok_or_else(|| ServiceError::PriceUnavailable {
            symbol: symbol.to_string(),
        })?;

    let cost = match catalog.lookup(root) {
        Some(spec) => spec.notional(quantity, price),
        None => quantity * price,
    };
    Ok((price, cost))
}

/// Builds and persists a preview for one trade.
pub async fn preview_trade(
    store: &dyn Store,
    prices: &PriceStore,
    catalog: &ContractCatalog,
    config: &EngineConfig,
    request: &TradeRequest,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> ServiceResult<TradePreview> {
    let (price, cost) = estimate(prices, catalog, &request.symbol, request.quantity, as_of).await?;

    let preview = TradePreview {
        id: Uuid::new_v4().to_string(),
        user_id: request.user_id.clone(),
        symbol: request.symbol.to_ascii_uppercase(),
        quantity: request.quantity,
        side: request.side,
        estimated_price: price,
        estimated_cost: cost,
        created_at: now,
        expires_at: now
            + ChronoDuration::from_std(config.preview_ttl)
                .unwrap_or_else(|_| ChronoDuration::seconds(900)),
        executed: false,
        group_id: None,
    };
    store.put_trade_preview(&preview)?;
    info!(preview = %preview.id, symbol = %preview.symbol, cost, "trade previewed");
    Ok(preview)
}

/// Executes a previewed trade, re-pricing expired previews.
pub async fn execute_trade(
    store: &dyn Store,
    prices: &PriceStore,
    catalog: &ContractCatalog,
    config: &EngineConfig,
    preview_id: &str,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> ServiceResult<TradeExecution> {
    let mut preview = store
        .get_trade_preview(preview_id)?
        .ok_or_else(|| ServiceError::not_found("trade preview", preview_id))?;
    if preview.executed {
        return Err(ServiceError::validation("preview already executed"));
    }

    let mut re_previewed = false;
    let mut drift = 0.0;
    if preview.is_expired(now) {
        let (price, cost) = estimate(prices, catalog, &preview.symbol, preview.quantity, as_of).await?;
        drift = if preview.estimated_cost.abs() > f64::EPSILON {
            ((cost - preview.estimated_cost) / preview.estimated_cost).abs()
        } else {
            0.0
        };
        re_previewed = true;
        preview.estimated_price = price;
        preview.estimated_cost = cost;
        preview.expires_at = now
            + ChronoDuration::from_std(config.preview_ttl)
                .unwrap_or_else(|_| ChronoDuration::seconds(900));
    }
    let drift_warning = drift > config.preview_drift_tolerance;
    if drift_warning {
        warn!(preview = %preview.id, drift, "re-previewed cost drifted past tolerance");
    }

    // Broker order submission is the caller's concern; the engine only
    // records that the preview was consumed.
    preview.executed = true;
    store.put_trade_preview(&preview)?;
    info!(preview = %preview.id, re_previewed, "trade executed");

    Ok(TradeExecution {
        preview,
        re_previewed,
        drift_warning,
        drift,
    })
}

/// Previews a multi-leg basket trade and links the legs in a group.
pub async fn preview_basket_trade(
    store: &dyn Store,
    prices: &PriceStore,
    catalog: &ContractCatalog,
    config: &EngineConfig,
    user_id: &str,
    legs: &[TradeRequest],
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> ServiceResult<(BasketTradeGroup, Vec<TradePreview>)> {
    if legs.is_empty() {
        return Err(ServiceError::validation("basket trade has no legs"));
    }
    let group_id = Uuid::new_v4().to_string();
    let mut previews = Vec::with_capacity(legs.len());
    for leg in legs {
        let mut preview =
            preview_trade(store, prices, catalog, config, leg, as_of, now).await?;
        preview.group_id = Some(group_id.clone());
        store.put_trade_preview(&preview)?;
        previews.push(preview);
    }
    let group = BasketTradeGroup {
        id: group_id,
        user_id: user_id.to_string(),
        preview_ids: previews.iter().map(|p| p.id.clone()).collect(),
        created_at: now,
    };
    store.put_trade_group(&group)?;
    Ok((group, previews))
}

/// Executes every leg of a basket-trade group.
pub async fn execute_basket_trade(
    store: &dyn Store,
    prices: &PriceStore,
    catalog: &ContractCatalog,
    config: &EngineConfig,
    group_id: &str,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> ServiceResult<Vec<TradeExecution>> {
    let group = store
        .get_trade_group(group_id)?
        .ok_or_else(|| ServiceError::not_found("basket trade group", group_id))?;
    let mut executions = Vec::with_capacity(group.preview_ids.len());
    for preview_id in &group.preview_ids {
        executions
            .push(execute_trade(store, prices, catalog, config, preview_id, as_of, now).await?);
    }
    Ok(executions)
}

/// A previewed futures roll: the spread plus per-leg previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollPreview {
    /// The calendar spread (BAG) to submit.
    pub spread: CalendarSpread,
    /// Leg previews (front, back).
    pub legs: Vec<TradePreview>,
    /// Linking group.
    pub group_id: String,
}

/// Previews rolling `quantity` contracts between months.
pub async fn preview_futures_roll(
    store: &dyn Store,
    prices: &PriceStore,
    catalog: &ContractCatalog,
    config: &EngineConfig,
    user_id: &str,
    symbol: &str,
    front_month: u32,
    back_month: u32,
    direction: RollDirection,
    quantity: f64,
    as_of: NaiveDate,
    now: DateTime<Utc>,
) -> ServiceResult<RollPreview> {
    if catalog.lookup(symbol).is_none() {
        return Err(ServiceError::validation(format!(
            "unknown futures contract '{symbol}'"
        )));
    }
    let spread = build_roll(symbol, front_month, back_month, direction)?;

    let legs: Vec<TradeRequest> = spread
        .legs
        .iter()
        .map(|leg| TradeRequest {
            user_id: user_id.to_string(),
            symbol: format!("{}:{}", spread.symbol, leg.contract_month),
            quantity,
            side: match leg.action {
                LegAction::Buy => TradeSide::Buy,
                LegAction::Sell => TradeSide::Sell,
            },
        })
        .collect();

    let (group, previews) =
        preview_basket_trade(store, prices, catalog, config, user_id, &legs, as_of, now).await?;

    Ok(RollPreview {
        spread,
        legs: previews,
        group_id: group.id,
    })
}
