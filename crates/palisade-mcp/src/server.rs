//! MCP server implementation for Palisade.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::schemars::JsonSchema;
use rmcp::serde::{Deserialize, Serialize};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};

use palisade_core::ProfileTemplate;
use palisade_engine::{
    execute_basket_trade, execute_trade, preview_basket_trade, preview_futures_roll,
    preview_trade, FactorAnalysisKind, OutputFormat, PerformanceMode, RequestContext,
    RiskService, Segment, ServiceError, TradeRequest, TradeSide,
};
use palisade_intel::{Basket, WeightingMethod};
use palisade_optimizer::{Objective, WhatIfRequest};
use palisade_providers::Scope;

use crate::demo::demo_service;
use crate::{SERVER_NAME, SERVER_VERSION};

/// MCP server wrapping the risk service.
#[derive(Clone)]
pub struct PalisadeMcpServer {
    service: Arc<RiskService>,
    tool_router: ToolRouter<Self>,
}

impl PalisadeMcpServer {
    /// Wraps an existing service.
    #[must_use]
    pub fn new(service: Arc<RiskService>) -> Self {
        Self {
            service,
            tool_router: Self::tool_router(),
        }
    }

    /// Builds a server over the fixture-backed demo service.
    #[must_use]
    pub fn with_demo_mode() -> Self {
        Self::new(Arc::new(demo_service()))
    }

    /// Create a success result with JSON content.
    fn json_result<T: serde::Serialize>(value: &T) -> Result<CallToolResult, McpError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

fn mcp_err(err: ServiceError) -> McpError {
    let message = format!("{}: {err}", err.code());
    match err {
        ServiceError::Validation { .. } | ServiceError::NotFound { .. } => {
            McpError::invalid_params(message, None)
        }
        _ => McpError::internal_error(message, None),
    }
}

fn parse_date(value: &Option<String>) -> Result<NaiveDate, McpError> {
    match value {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| McpError::invalid_params(format!("invalid date '{raw}'"), None)),
        None => Ok(Utc::now().date_naive()),
    }
}

fn parse_format(value: &Option<String>) -> Result<OutputFormat, McpError> {
    match value.as_deref() {
        None | Some("full") => Ok(OutputFormat::Full),
        Some("summary") => Ok(OutputFormat::Summary),
        Some("agent") => Ok(OutputFormat::Agent),
        Some(other) => Err(McpError::invalid_params(
            format!("unknown format '{other}'"),
            None,
        )),
    }
}

fn parse_scope(
    source: &Option<String>,
    institution: &Option<String>,
    account: &Option<String>,
) -> Result<Scope, McpError> {
    if let Some(account) = account {
        return Ok(Scope::Account(account.clone()));
    }
    if let Some(institution) = institution {
        return Ok(Scope::Institution(institution.clone()));
    }
    if let Some(source) = source {
        let kind = source
            .parse()
            .map_err(|e: palisade_core::CoreError| McpError::invalid_params(e.to_string(), None))?;
        return Ok(Scope::Provider(kind));
    }
    Ok(Scope::All)
}

// ============================================================================
// Tool Parameter Types
// ============================================================================

/// Common context fields shared by most tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ContextParams {
    /// User identifier (email).
    pub user_email: Option<String>,
    /// Restrict to one provider source (schwab, ibkr, plaid, snaptrade).
    pub source: Option<String>,
    /// Restrict to one institution by name.
    pub institution: Option<String>,
    /// Restrict to one account id.
    pub account: Option<String>,
    /// As-of date (YYYY-MM-DD); defaults to today.
    pub as_of: Option<String>,
    /// Output format: full, summary, or agent.
    pub format: Option<String>,
}

impl ContextParams {
    fn to_context(&self) -> Result<RequestContext, McpError> {
        Ok(RequestContext {
            user_id: self
                .user_email
                .clone()
                .unwrap_or_else(|| "demo".to_string()),
            scope: parse_scope(&self.source, &self.institution, &self.account)?,
            as_of: parse_date(&self.as_of)?,
            format: parse_format(&self.format)?,
        })
    }
}

/// Risk analysis parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RiskAnalysisParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Segment: all, equities, or futures.
    pub segment: Option<String>,
}

/// Performance parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct PerformanceParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Mode: hypothetical or realized.
    pub mode: Option<String>,
    /// Benchmark ticker for comparison.
    pub benchmark_ticker: Option<String>,
}

/// What-if parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct WhatIfParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Absolute target weights by symbol.
    pub target_weights: Option<BTreeMap<String, f64>>,
    /// Relative weight deltas by symbol.
    pub delta_changes: Option<BTreeMap<String, f64>>,
}

/// Optimization parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct OptimizationParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Objective: min_variance or max_return.
    pub objective: Option<String>,
}

/// Factor-analysis parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct FactorAnalysisParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Analysis: correlations, performance, or returns.
    pub analysis_type: Option<String>,
    /// Inject the user's baskets into the panel.
    pub include_baskets: Option<bool>,
}

/// Factor-recommendation parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RecommendationParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Mode: single (one factor) or portfolio.
    pub mode: Option<String>,
    /// Factor to hedge in single mode.
    pub overexposed_factor: Option<String>,
    /// Inject the user's baskets into the panel.
    pub include_baskets: Option<bool>,
}

/// Risk-profile update parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SetProfileParams {
    /// User identifier.
    pub user_email: Option<String>,
    /// Template: income, growth, trading, or balanced.
    pub template: String,
}

/// Basket identity parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct BasketNameParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Basket name.
    pub name: String,
}

/// Basket create/update parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct BasketParams {
    /// User identifier.
    pub user_email: Option<String>,
    /// Basket name.
    pub name: String,
    /// Component tickers.
    pub tickers: Vec<String>,
    /// Custom weights, parallel to tickers.
    pub weights: Option<Vec<f64>>,
    /// Weighting: equal, market_cap, or custom.
    pub weighting_method: Option<String>,
}

impl BasketParams {
    fn to_basket(&self) -> Result<Basket, McpError> {
        let weighting_method = match self.weighting_method.as_deref() {
            None | Some("equal") => WeightingMethod::Equal,
            Some("market_cap") => WeightingMethod::MarketCap,
            Some("custom") => WeightingMethod::Custom,
            Some(other) => {
                return Err(McpError::invalid_params(
                    format!("unknown weighting method '{other}'"),
                    None,
                ))
            }
        };
        Ok(Basket {
            user_id: self
                .user_email
                .clone()
                .unwrap_or_else(|| "demo".to_string()),
            name: self.name.clone(),
            tickers: self.tickers.clone(),
            weights: self.weights.clone(),
            weighting_method,
            updated_at: Utc::now(),
        })
    }
}

/// Futures month-listing parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct FuturesSymbolParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Futures root symbol (e.g., ES).
    pub symbol: String,
}

/// Futures roll parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct RollParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Futures root symbol.
    pub symbol: String,
    /// Front contract month (YYYYMM).
    pub front_month: String,
    /// Back contract month (YYYYMM).
    pub back_month: String,
    /// Direction: long_roll or short_roll.
    pub direction: Option<String>,
    /// Contracts to roll.
    pub quantity: f64,
}

/// Single-trade parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TradeParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Symbol to trade (futures as ROOT:YYYYMM).
    pub symbol: String,
    /// Quantity in shares or contracts.
    pub quantity: f64,
    /// Side: BUY or SELL.
    pub side: String,
}

/// Execute-by-id parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ExecuteParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Preview (or group) identifier.
    pub id: String,
}

/// Basket-trade parameters.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct BasketTradeParams {
    /// Shared context.
    #[serde(flatten)]
    pub context: ContextParams,
    /// Legs to preview.
    pub legs: Vec<TradeLegParams>,
}

/// One leg of a basket trade.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TradeLegParams {
    /// Symbol to trade.
    pub symbol: String,
    /// Quantity.
    pub quantity: f64,
    /// Side: BUY or SELL.
    pub side: String,
}

fn parse_side(side: &str) -> Result<TradeSide, McpError> {
    match side.to_ascii_uppercase().as_str() {
        "BUY" => Ok(TradeSide::Buy),
        "SELL" => Ok(TradeSide::Sell),
        other => Err(McpError::invalid_params(
            format!("unknown side '{other}'"),
            None,
        )),
    }
}

// ============================================================================
// Tool Implementations
// ============================================================================

#[tool_router]
impl PalisadeMcpServer {
    /// Factor decomposition plus limit compliance.
    #[tool(
        description = "Run the factor-model risk decomposition and limit compliance for the \
                       portfolio. segment: all | equities | futures."
    )]
    pub async fn get_risk_analysis(
        &self,
        Parameters(params): Parameters<RiskAnalysisParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let segment = match params.segment.as_deref() {
            None | Some("all") => Segment::All,
            Some("equities") => Segment::Equities,
            Some("futures") => Segment::Futures,
            Some(other) => {
                return Err(McpError::invalid_params(
                    format!("unknown segment '{other}'"),
                    None,
                ))
            }
        };
        let result = self
            .service
            .risk_analysis(&ctx, segment)
            .await
            .map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Composite 0-100 risk score.
    #[tool(
        description = "Composite 0-100 risk score with top risk factors and recommendations."
    )]
    pub async fn get_risk_score(
        &self,
        Parameters(params): Parameters<ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.to_context()?;
        let result = self.service.risk_score(&ctx).await.map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Realized or hypothetical performance.
    #[tool(
        description = "Portfolio performance. mode: realized (GIPS TWR from transactions) or \
                       hypothetical (weighted factor returns). Optional benchmark_ticker."
    )]
    pub async fn get_performance(
        &self,
        Parameters(params): Parameters<PerformanceParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let mode = match params.mode.as_deref() {
            None | Some("realized") => PerformanceMode::Realized,
            Some("hypothetical") => PerformanceMode::Hypothetical,
            Some(other) => {
                return Err(McpError::invalid_params(
                    format!("unknown mode '{other}'"),
                    None,
                ))
            }
        };
        let result = self
            .service
            .performance(&ctx, mode, params.benchmark_ticker.as_deref())
            .await
            .map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// What-if scenario.
    #[tool(
        description = "Re-evaluate risk on a hypothetical portfolio. Provide exactly one of \
                       target_weights (absolute) or delta_changes (relative)."
    )]
    pub async fn run_whatif(
        &self,
        Parameters(params): Parameters<WhatIfParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let request = WhatIfRequest {
            target_weights: params.target_weights,
            delta_changes: params.delta_changes,
        };
        let result = self.service.whatif(&ctx, &request).await.map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Constrained optimization.
    #[tool(
        description = "Constrained portfolio optimization. objective: min_variance or max_return."
    )]
    pub async fn run_optimization(
        &self,
        Parameters(params): Parameters<OptimizationParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let objective = match params.objective.as_deref() {
            None | Some("min_variance") => Objective::MinVariance,
            Some("max_return") => Objective::MaxReturn,
            Some(other) => {
                return Err(McpError::invalid_params(
                    format!("unknown objective '{other}'"),
                    None,
                ))
            }
        };
        let result = self
            .service
            .optimize(&ctx, objective)
            .await
            .map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Factor correlations, profiles, or returns.
    #[tool(
        description = "Factor panel analytics. analysis_type: correlations | performance | \
                       returns. include_baskets injects the user's baskets."
    )]
    pub async fn get_factor_analysis(
        &self,
        Parameters(params): Parameters<FactorAnalysisParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let kind = match params.analysis_type.as_deref() {
            None | Some("correlations") => FactorAnalysisKind::Correlations,
            Some("performance") => FactorAnalysisKind::Performance,
            Some("returns") => FactorAnalysisKind::Returns,
            Some(other) => {
                return Err(McpError::invalid_params(
                    format!("unknown analysis type '{other}'"),
                    None,
                ))
            }
        };
        let result = self
            .service
            .factor_analysis(&ctx, kind, params.include_baskets.unwrap_or(false))
            .await
            .map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Hedge/offset recommendations.
    #[tool(
        description = "Hedge recommendations. mode: single (requires overexposed_factor) or \
                       portfolio (hedges the largest non-market exposure)."
    )]
    pub async fn get_factor_recommendations(
        &self,
        Parameters(params): Parameters<RecommendationParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let factor = match params.mode.as_deref() {
            Some("single") => {
                let factor = params.overexposed_factor.as_deref().ok_or_else(|| {
                    McpError::invalid_params("single mode requires overexposed_factor", None)
                })?;
                Some(factor)
            }
            _ => params.overexposed_factor.as_deref(),
        };
        let result = self
            .service
            .factor_recommendations(&ctx, factor, params.include_baskets.unwrap_or(false))
            .await
            .map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Leverage headroom.
    #[tool(description = "Remaining notional leverage capacity under the risk profile cap.")]
    pub async fn get_leverage_capacity(
        &self,
        Parameters(params): Parameters<ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.to_context()?;
        let result = self
            .service
            .leverage_capacity(&ctx)
            .await
            .map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Loss-limit exit signals.
    #[tool(description = "Positions whose loss from cost basis breaches the profile loss limit.")]
    pub async fn check_exit_signals(
        &self,
        Parameters(params): Parameters<ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.to_context()?;
        let result = self.service.exit_signals(&ctx).await.map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Canonical positions.
    #[tool(description = "Canonical merged positions for the requested scope.")]
    pub async fn get_positions(
        &self,
        Parameters(params): Parameters<ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.to_context()?;
        let result = self.service.positions(&ctx).await.map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Current risk profile.
    #[tool(description = "The user's active risk profile (stored or default template).")]
    pub async fn get_risk_profile(
        &self,
        Parameters(params): Parameters<ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.to_context()?;
        let profile = self
            .service
            .get_risk_profile(&ctx.user_id)
            .map_err(mcp_err)?;
        Self::json_result(&profile)
    }

    /// Replace the risk profile from a template.
    #[tool(
        description = "Set the user's risk profile. template: income | growth | trading | \
                       balanced."
    )]
    pub async fn set_risk_profile(
        &self,
        Parameters(params): Parameters<SetProfileParams>,
    ) -> Result<CallToolResult, McpError> {
        let user = params.user_email.unwrap_or_else(|| "demo".to_string());
        let template: ProfileTemplate = params
            .template
            .parse()
            .map_err(|e: palisade_core::CoreError| McpError::invalid_params(e.to_string(), None))?;
        let profile = self
            .service
            .set_risk_profile_template(&user, template)
            .map_err(mcp_err)?;
        Self::json_result(&profile)
    }

    // ========================================================================
    // Baskets
    // ========================================================================

    /// List baskets.
    #[tool(description = "List the user's factor baskets.")]
    pub async fn list_baskets(
        &self,
        Parameters(params): Parameters<ContextParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.to_context()?;
        let baskets = self.service.list_baskets(&ctx.user_id).map_err(mcp_err)?;
        Self::json_result(&baskets)
    }

    /// Fetch one basket.
    #[tool(description = "Fetch one basket by name.")]
    pub async fn get_basket(
        &self,
        Parameters(params): Parameters<BasketNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let basket = self
            .service
            .get_basket(&ctx.user_id, &params.name)
            .map_err(mcp_err)?;
        Self::json_result(&basket)
    }

    /// Create a basket.
    #[tool(description = "Create a basket. weighting_method: equal | market_cap | custom.")]
    pub async fn create_basket(
        &self,
        Parameters(params): Parameters<BasketParams>,
    ) -> Result<CallToolResult, McpError> {
        let basket = params.to_basket()?;
        self.service
            .create_basket(basket.clone())
            .map_err(mcp_err)?;
        Self::json_result(&serde_json::json!({"status": "created", "name": basket.name}))
    }

    /// Update a basket.
    #[tool(description = "Update an existing basket's components or weighting.")]
    pub async fn update_basket(
        &self,
        Parameters(params): Parameters<BasketParams>,
    ) -> Result<CallToolResult, McpError> {
        let basket = params.to_basket()?;
        self.service
            .update_basket(basket.clone())
            .map_err(mcp_err)?;
        Self::json_result(&serde_json::json!({"status": "updated", "name": basket.name}))
    }

    /// Delete a basket.
    #[tool(description = "Delete a basket by name.")]
    pub async fn delete_basket(
        &self,
        Parameters(params): Parameters<BasketNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        self.service
            .delete_basket(&ctx.user_id, &params.name)
            .map_err(mcp_err)?;
        Self::json_result(&serde_json::json!({"status": "deleted", "name": params.name}))
    }

    /// Analyze a basket against the factor panel.
    #[tool(description = "Performance profile and factor correlations for one basket.")]
    pub async fn analyze_basket(
        &self,
        Parameters(params): Parameters<BasketNameParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let result = self
            .service
            .analyze_basket(&ctx, &params.name)
            .await
            .map_err(mcp_err)?;
        Self::json_result(&result)
    }

    // ========================================================================
    // Futures
    // ========================================================================

    /// Tradable contract months.
    #[tool(description = "Tradable contract months for a futures root, nearest first.")]
    pub async fn get_futures_months(
        &self,
        Parameters(params): Parameters<FuturesSymbolParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let months = self
            .service
            .futures_months(&params.symbol, ctx.as_of)
            .await
            .map_err(mcp_err)?;
        Self::json_result(&months)
    }

    /// Contract curve and economics.
    #[tool(description = "Contract months plus tick/multiplier economics for a futures root.")]
    pub async fn get_futures_curve(
        &self,
        Parameters(params): Parameters<FuturesSymbolParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let result = self
            .service
            .futures_curve(&ctx, &params.symbol)
            .await
            .map_err(mcp_err)?;
        Self::json_result(&result)
    }

    /// Preview a calendar roll.
    #[tool(
        description = "Preview rolling a futures position. direction: long_roll (SELL front, \
                       BUY back) or short_roll."
    )]
    pub async fn preview_futures_roll(
        &self,
        Parameters(params): Parameters<RollParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let front = palisade_contracts::parse_contract_month(&params.front_month)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let back = palisade_contracts::parse_contract_month(&params.back_month)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;
        let direction = match params.direction.as_deref() {
            None | Some("long_roll") => palisade_contracts::RollDirection::LongRoll,
            Some("short_roll") => palisade_contracts::RollDirection::ShortRoll,
            Some(other) => {
                return Err(McpError::invalid_params(
                    format!("unknown direction '{other}'"),
                    None,
                ))
            }
        };
        let roll = preview_futures_roll(
            self.service.store(),
            self.service.prices(),
            self.service.catalog(),
            self.service.config(),
            &ctx.user_id,
            &params.symbol,
            front,
            back,
            direction,
            params.quantity,
            ctx.as_of,
            Utc::now(),
        )
        .await
        .map_err(mcp_err)?;
        Self::json_result(&roll)
    }

    /// Execute a previewed roll.
    #[tool(description = "Execute a previewed futures roll by its group id.")]
    pub async fn execute_futures_roll(
        &self,
        Parameters(params): Parameters<ExecuteParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let executions = execute_basket_trade(
            self.service.store(),
            self.service.prices(),
            self.service.catalog(),
            self.service.config(),
            &params.id,
            ctx.as_of,
            Utc::now(),
        )
        .await
        .map_err(mcp_err)?;
        Self::json_result(&executions)
    }

    // ========================================================================
    // Trades
    // ========================================================================

    /// Preview a single trade.
    #[tool(description = "Preview a trade's estimated cost. side: BUY or SELL.")]
    pub async fn preview_trade(
        &self,
        Parameters(params): Parameters<TradeParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let request = TradeRequest {
            user_id: ctx.user_id.clone(),
            symbol: params.symbol,
            quantity: params.quantity,
            side: parse_side(&params.side)?,
        };
        let preview = preview_trade(
            self.service.store(),
            self.service.prices(),
            self.service.catalog(),
            self.service.config(),
            &request,
            ctx.as_of,
            Utc::now(),
        )
        .await
        .map_err(mcp_err)?;
        Self::json_result(&preview)
    }

    /// Execute a previewed trade.
    #[tool(
        description = "Execute a previewed trade by id. Expired previews are re-priced and a \
                       drift_warning is set when cost moved more than 1%."
    )]
    pub async fn execute_trade(
        &self,
        Parameters(params): Parameters<ExecuteParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let execution = execute_trade(
            self.service.store(),
            self.service.prices(),
            self.service.catalog(),
            self.service.config(),
            &params.id,
            ctx.as_of,
            Utc::now(),
        )
        .await
        .map_err(mcp_err)?;
        Self::json_result(&execution)
    }

    /// Preview a multi-leg basket trade.
    #[tool(description = "Preview a multi-leg basket trade; legs are linked in one group.")]
    pub async fn preview_basket_trade(
        &self,
        Parameters(params): Parameters<BasketTradeParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let mut legs = Vec::with_capacity(params.legs.len());
        for leg in &params.legs {
            legs.push(TradeRequest {
                user_id: ctx.user_id.clone(),
                symbol: leg.symbol.clone(),
                quantity: leg.quantity,
                side: parse_side(&leg.side)?,
            });
        }
        let (group, previews) = preview_basket_trade(
            self.service.store(),
            self.service.prices(),
            self.service.catalog(),
            self.service.config(),
            &ctx.user_id,
            &legs,
            ctx.as_of,
            Utc::now(),
        )
        .await
        .map_err(mcp_err)?;
        Self::json_result(&serde_json::json!({"group": group, "legs": previews}))
    }

    /// Execute a basket trade group.
    #[tool(description = "Execute every leg of a previewed basket trade by its group id.")]
    pub async fn execute_basket_trade(
        &self,
        Parameters(params): Parameters<ExecuteParams>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = params.context.to_context()?;
        let executions = execute_basket_trade(
            self.service.store(),
            self.service.prices(),
            self.service.catalog(),
            self.service.config(),
            &params.id,
            ctx.as_of,
            Utc::now(),
        )
        .await
        .map_err(mcp_err)?;
        Self::json_result(&executions)
    }
}

#[tool_handler]
impl ServerHandler for PalisadeMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
                title: Some("Palisade Portfolio Risk Analytics".to_string()),
                icons: None,
                website_url: Some("https://github.com/palisade-risk/palisade".to_string()),
            },
            instructions: Some(
                "Palisade MCP Server - portfolio risk analytics. Start with get_positions \
                 and get_risk_analysis; use run_whatif and run_optimization to explore \
                 changes, and get_factor_recommendations for hedges."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scope_precedence() {
        let scope = parse_scope(
            &Some("schwab".to_string()),
            &None,
            &Some("acct-9".to_string()),
        )
        .unwrap();
        assert_eq!(scope, Scope::Account("acct-9".to_string()));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format(&None).unwrap(), OutputFormat::Full);
        assert_eq!(
            parse_format(&Some("agent".to_string())).unwrap(),
            OutputFormat::Agent
        );
        assert!(parse_format(&Some("yaml".to_string())).is_err());
    }

    #[test]
    fn test_parse_side() {
        assert_eq!(parse_side("buy").unwrap(), TradeSide::Buy);
        assert_eq!(parse_side("SELL").unwrap(), TradeSide::Sell);
        assert!(parse_side("hold").is_err());
    }

    #[test]
    fn test_demo_server_builds() {
        let server = PalisadeMcpServer::with_demo_mode();
        let info = server.get_info();
        assert_eq!(info.server_info.name, SERVER_NAME);
    }
}
