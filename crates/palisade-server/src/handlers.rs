//! Request handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use palisade_engine::{
    execute_basket_trade, execute_trade, preview_basket_trade, preview_trade,
    FactorAnalysisKind, OutputFormat, PerformanceMode, RequestContext, RiskService, Segment,
    ServiceError, TradeRequest, TradeSide,
};
use palisade_intel::{Basket, WeightingMethod};
use palisade_optimizer::{Objective, WhatIfRequest};
use palisade_providers::Scope;

/// Application state.
pub struct AppState {
    /// The risk service.
    pub service: Arc<RiskService>,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
}

/// Health check handler.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Error payload with the stable service code.
#[derive(Serialize)]
pub struct ErrorResponse {
    code: String,
    message: String,
}

/// Service error wrapper implementing `IntoResponse`.
pub struct ApiError(pub ServiceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Validation { .. } => StatusCode::BAD_REQUEST,
            ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::PriceUnavailable { .. }
            | ServiceError::ProviderUnavailable { .. } => StatusCode::BAD_GATEWAY,
            ServiceError::Infeasible { .. } | ServiceError::CrossSourceAmbiguity { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::Solver { .. }
            | ServiceError::Storage { .. }
            | ServiceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Common query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextQuery {
    /// User identifier.
    pub user: Option<String>,
    /// Provider source filter.
    pub source: Option<String>,
    /// Institution filter.
    pub institution: Option<String>,
    /// Account filter.
    pub account: Option<String>,
    /// As-of date (YYYY-MM-DD).
    pub as_of: Option<NaiveDate>,
    /// Output format.
    pub format: Option<String>,
    /// Segment filter for risk analysis.
    pub segment: Option<String>,
    /// Performance mode.
    pub mode: Option<String>,
    /// Benchmark ticker.
    pub benchmark_ticker: Option<String>,
    /// Include user baskets in factor panels.
    pub include_baskets: Option<bool>,
    /// Overexposed factor for recommendations.
    pub overexposed_factor: Option<String>,
    /// Optimization objective.
    pub objective: Option<String>,
}

impl ContextQuery {
    fn context(&self) -> ApiResult<RequestContext> {
        let scope = if let Some(account) = &self.account {
            Scope::Account(account.clone())
        } else if let Some(institution) = &self.institution {
            Scope::Institution(institution.clone())
        } else if let Some(source) = &self.source {
            Scope::Provider(
                source
                    .parse()
                    .map_err(|e: palisade_core::CoreError| {
                        ApiError(ServiceError::validation(e.to_string()))
                    })?,
            )
        } else {
            Scope::All
        };
        let format = match self.format.as_deref() {
            None | Some("full") => OutputFormat::Full,
            Some("summary") => OutputFormat::Summary,
            Some("agent") => OutputFormat::Agent,
            Some(other) => {
                return Err(ApiError(ServiceError::validation(format!(
                    "unknown format '{other}'"
                ))))
            }
        };
        Ok(RequestContext {
            user_id: self.user.clone().unwrap_or_else(|| "demo".to_string()),
            scope,
            as_of: self.as_of.unwrap_or_else(|| Utc::now().date_naive()),
            format,
        })
    }
}

fn parse_segment(segment: &Option<String>) -> ApiResult<Segment> {
    match segment.as_deref() {
        None | Some("all") => Ok(Segment::All),
        Some("equities") => Ok(Segment::Equities),
        Some("futures") => Ok(Segment::Futures),
        Some(other) => Err(ApiError(ServiceError::validation(format!(
            "unknown segment '{other}'"
        )))),
    }
}

// ============================================================================
// Analysis handlers
// ============================================================================

/// GET /api/risk/analysis
pub async fn risk_analysis(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let segment = parse_segment(&query.segment)?;
    Ok(Json(state.service.risk_analysis(&ctx, segment).await?))
}

/// GET /api/risk/score
pub async fn risk_score(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.risk_score(&ctx).await?))
}

/// GET /api/performance
pub async fn performance(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let mode = match query.mode.as_deref() {
        None | Some("realized") => PerformanceMode::Realized,
        Some("hypothetical") => PerformanceMode::Hypothetical,
        Some(other) => {
            return Err(ApiError(ServiceError::validation(format!(
                "unknown mode '{other}'"
            ))))
        }
    };
    Ok(Json(
        state
            .service
            .performance(&ctx, mode, query.benchmark_ticker.as_deref())
            .await?,
    ))
}

/// What-if request body.
#[derive(Debug, Deserialize)]
pub struct WhatIfBody {
    /// Absolute target weights.
    pub target_weights: Option<BTreeMap<String, f64>>,
    /// Relative deltas.
    pub delta_changes: Option<BTreeMap<String, f64>>,
}

/// POST /api/whatif
pub async fn whatif(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
    Json(body): Json<WhatIfBody>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let request = WhatIfRequest {
        target_weights: body.target_weights,
        delta_changes: body.delta_changes,
    };
    Ok(Json(state.service.whatif(&ctx, &request).await?))
}

/// POST /api/optimize
pub async fn optimize(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let objective = match query.objective.as_deref() {
        None | Some("min_variance") => Objective::MinVariance,
        Some("max_return") => Objective::MaxReturn,
        Some(other) => {
            return Err(ApiError(ServiceError::validation(format!(
                "unknown objective '{other}'"
            ))))
        }
    };
    Ok(Json(state.service.optimize(&ctx, objective).await?))
}

/// GET /api/factors/{kind}
pub async fn factor_analysis(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let kind = match kind.as_str() {
        "correlations" => FactorAnalysisKind::Correlations,
        "performance" => FactorAnalysisKind::Performance,
        "returns" => FactorAnalysisKind::Returns,
        other => {
            return Err(ApiError(ServiceError::validation(format!(
                "unknown analysis '{other}'"
            ))))
        }
    };
    Ok(Json(
        state
            .service
            .factor_analysis(&ctx, kind, query.include_baskets.unwrap_or(false))
            .await?,
    ))
}

/// GET /api/factors/recommendations
pub async fn factor_recommendations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(
        state
            .service
            .factor_recommendations(
                &ctx,
                query.overexposed_factor.as_deref(),
                query.include_baskets.unwrap_or(false),
            )
            .await?,
    ))
}

/// GET /api/positions
pub async fn positions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.positions(&ctx).await?))
}

/// GET /api/risk/leverage
pub async fn leverage_capacity(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.leverage_capacity(&ctx).await?))
}

/// GET /api/risk/exit-signals
pub async fn exit_signals(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.exit_signals(&ctx).await?))
}

// ============================================================================
// Risk profile
// ============================================================================

/// GET /api/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.get_risk_profile(&ctx.user_id)?))
}

/// Profile update body.
#[derive(Debug, Deserialize)]
pub struct ProfileBody {
    /// Template name.
    pub template: String,
}

/// PUT /api/profile
pub async fn set_profile(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
    Json(body): Json<ProfileBody>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let template = body
        .template
        .parse()
        .map_err(|e: palisade_core::CoreError| ApiError(ServiceError::validation(e.to_string())))?;
    Ok(Json(
        state
            .service
            .set_risk_profile_template(&ctx.user_id, template)?,
    ))
}

// ============================================================================
// Baskets
// ============================================================================

/// Basket body for create/update.
#[derive(Debug, Deserialize)]
pub struct BasketBody {
    /// Basket name.
    pub name: String,
    /// Component tickers.
    pub tickers: Vec<String>,
    /// Custom weights.
    pub weights: Option<Vec<f64>>,
    /// Weighting method.
    pub weighting_method: Option<String>,
}

impl BasketBody {
    fn into_basket(self, user_id: &str) -> ApiResult<Basket> {
        let weighting_method = match self.weighting_method.as_deref() {
            None | Some("equal") => WeightingMethod::Equal,
            Some("market_cap") => WeightingMethod::MarketCap,
            Some("custom") => WeightingMethod::Custom,
            Some(other) => {
                return Err(ApiError(ServiceError::validation(format!(
                    "unknown weighting method '{other}'"
                ))))
            }
        };
        Ok(Basket {
            user_id: user_id.to_string(),
            name: self.name,
            tickers: self.tickers,
            weights: self.weights,
            weighting_method,
            updated_at: Utc::now(),
        })
    }
}

/// GET /api/baskets
pub async fn list_baskets(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.list_baskets(&ctx.user_id)?))
}

/// GET /api/baskets/{name}
pub async fn get_basket(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.get_basket(&ctx.user_id, &name)?))
}

/// POST /api/baskets
pub async fn create_basket(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
    Json(body): Json<BasketBody>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let basket = body.into_basket(&ctx.user_id)?;
    state.service.create_basket(basket)?;
    Ok(StatusCode::CREATED)
}

/// PUT /api/baskets/{name}
pub async fn update_basket(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ContextQuery>,
    Json(mut body): Json<BasketBody>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    body.name = name;
    let basket = body.into_basket(&ctx.user_id)?;
    state.service.update_basket(basket)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/baskets/{name}
pub async fn delete_basket(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    state.service.delete_basket(&ctx.user_id, &name)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/baskets/{name}/analysis
pub async fn analyze_basket(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.analyze_basket(&ctx, &name).await?))
}

// ============================================================================
// Futures & trades
// ============================================================================

/// GET /api/futures/{symbol}/months
pub async fn futures_months(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(
        state.service.futures_months(&symbol, ctx.as_of).await?,
    ))
}

/// GET /api/futures/{symbol}/curve
pub async fn futures_curve(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(state.service.futures_curve(&ctx, &symbol).await?))
}

/// Trade body for previews.
#[derive(Debug, Deserialize)]
pub struct TradeBody {
    /// Symbol to trade.
    pub symbol: String,
    /// Quantity.
    pub quantity: f64,
    /// BUY or SELL.
    pub side: String,
}

fn parse_side(side: &str) -> ApiResult<TradeSide> {
    match side.to_ascii_uppercase().as_str() {
        "BUY" => Ok(TradeSide::Buy),
        "SELL" => Ok(TradeSide::Sell),
        other => Err(ApiError(ServiceError::validation(format!(
            "unknown side '{other}'"
        )))),
    }
}

/// POST /api/trades/preview
pub async fn trade_preview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
    Json(body): Json<TradeBody>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let request = TradeRequest {
        user_id: ctx.user_id.clone(),
        symbol: body.symbol,
        quantity: body.quantity,
        side: parse_side(&body.side)?,
    };
    Ok(Json(
        preview_trade(
            state.service.store(),
            state.service.prices(),
            state.service.catalog(),
            state.service.config(),
            &request,
            ctx.as_of,
            Utc::now(),
        )
        .await?,
    ))
}

/// POST /api/trades/{id}/execute
pub async fn trade_execute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(
        execute_trade(
            state.service.store(),
            state.service.prices(),
            state.service.catalog(),
            state.service.config(),
            &id,
            ctx.as_of,
            Utc::now(),
        )
        .await?,
    ))
}

/// Basket trade body.
#[derive(Debug, Deserialize)]
pub struct BasketTradeBody {
    /// The legs to preview.
    pub legs: Vec<TradeBody>,
}

/// POST /api/trades/basket/preview
pub async fn basket_trade_preview(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ContextQuery>,
    Json(body): Json<BasketTradeBody>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    let mut legs = Vec::with_capacity(body.legs.len());
    for leg in body.legs {
        legs.push(TradeRequest {
            user_id: ctx.user_id.clone(),
            symbol: leg.symbol,
            quantity: leg.quantity,
            side: parse_side(&leg.side)?,
        });
    }
    let (group, previews) = preview_basket_trade(
        state.service.store(),
        state.service.prices(),
        state.service.catalog(),
        state.service.config(),
        &ctx.user_id,
        &legs,
        ctx.as_of,
        Utc::now(),
    )
    .await?;
    Ok(Json(serde_json::json!({"group": group, "legs": previews})))
}

/// POST /api/trades/basket/{id}/execute
pub async fn basket_trade_execute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<ContextQuery>,
) -> ApiResult<impl IntoResponse> {
    let ctx = query.context()?;
    Ok(Json(
        execute_basket_trade(
            state.service.store(),
            state.service.prices(),
            state.service.catalog(),
            state.service.config(),
            &id,
            ctx.as_of,
            Utc::now(),
        )
        .await?,
    ))
}
