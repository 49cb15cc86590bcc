//! The risk service: orchestration behind the tool/API surface.
//!
//! Every analytical operation follows the same shape: complete all
//! upstream I/O (provider fan-out, price/panel fetches), then run the
//! purely numerical stages, then wrap the outcome in the stable result
//! envelope. Results are cached by
//! `(operation, user, portfolio fingerprint, params, data version)`;
//! every mutation bumps the data version and invalidates the user's
//! entries.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use palisade_contracts::{ContractCatalog, ContractMonth, FuturesGateway};
use palisade_core::{InstrumentClass, Position, ProfileTemplate, RiskProfile};
use palisade_factors::{
    assign_proxies, collect_inputs, decompose, DecompositionConfig, FactorInputs, ProxyConfig,
};
use palisade_intel::{
    basket_overlay, category_correlations, column_correlations, factor_profiles, inject_baskets,
    recommend_for_portfolio, recommend_offsets, Basket,
};
use palisade_optimizer::{run_optimization, run_whatif, Objective, WhatIfRequest};
use palisade_performance::{compute_realized, AccountInput, PerformanceConfig};
use palisade_prices::PriceStore;
use palisade_providers::{
    canonicalize, normalize_positions, normalize_transactions, CanonicalPortfolio,
    CanonicalizerConfig, ProviderAdapter, Scope,
};
use palisade_risk::{check_exit_signals, evaluate, leverage_capacity, Severity};

use crate::cache::{params_hash, ResultCache, ResultCacheStats, ResultKey};
use crate::config::EngineConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::results::{AnalysisResult, OutputFormat, ResultMetadata, Snapshot};
use crate::store::Store;

/// Portfolio segment filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    /// Everything.
    #[default]
    All,
    /// Equities, ETFs, and bonds only.
    Equities,
    /// Futures only.
    Futures,
}

/// Performance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceMode {
    /// Factor-model weighted return reconstruction.
    Hypothetical,
    /// Transaction-reconstructed GIPS TWR.
    Realized,
}

/// Factor-analysis flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorAnalysisKind {
    /// Correlation matrices.
    Correlations,
    /// Per-factor performance profiles.
    Performance,
    /// Recent factor return columns.
    Returns,
}

/// Per-request context.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Requesting user.
    pub user_id: String,
    /// Portfolio scope.
    pub scope: Scope,
    /// As-of date.
    pub as_of: NaiveDate,
    /// Output format.
    pub format: OutputFormat,
}

/// Internal cached bundle: everything but the metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnalysisBundle {
    summary: serde_json::Value,
    detail: serde_json::Value,
    flags: Vec<palisade_risk::Flag>,
    snapshot: Snapshot,
}

/// The orchestration facade consumed by the MCP and HTTP layers.
pub struct RiskService {
    providers: Vec<Arc<dyn ProviderAdapter>>,
    prices: Arc<PriceStore>,
    catalog: Arc<ContractCatalog>,
    gateway: Option<Arc<dyn FuturesGateway>>,
    proxy_config: ProxyConfig,
    canonicalizer_config: CanonicalizerConfig,
    config: EngineConfig,
    store: Arc<dyn Store>,
    cache: ResultCache,
    data_version: AtomicU64,
}

impl RiskService {
    /// Builds a service over the given providers, price store, and
    /// storage backend.
    ///
    /// The price store must be built with the config's pool width
    /// (`PriceStore::with_fallback(vendor, .., config.fetch_concurrency)`);
    /// use [`Self::from_vendor`] to get that wiring for free.
    #[must_use]
    pub fn new(
        providers: Vec<Arc<dyn ProviderAdapter>>,
        prices: Arc<PriceStore>,
        catalog: Arc<ContractCatalog>,
        store: Arc<dyn Store>,
        config: EngineConfig,
    ) -> Self {
        let mut proxy_config = ProxyConfig::standard();
        proxy_config.rate_factor_classes =
            config.rate_factor_classes.iter().cloned().collect();
        let cache = ResultCache::new(config.cache_ttl);
        Self {
            providers,
            prices,
            catalog,
            gateway: None,
            proxy_config,
            canonicalizer_config: CanonicalizerConfig::default(),
            config,
            store,
            cache,
            data_version: AtomicU64::new(1),
        }
    }

    /// Builds a service from price vendors, constructing the store with
    /// the config's fan-out pool width.
    #[must_use]
    pub fn from_vendor(
        providers: Vec<Arc<dyn ProviderAdapter>>,
        primary: Arc<dyn palisade_prices::PriceVendor>,
        secondary: Option<Arc<dyn palisade_prices::PriceVendor>>,
        catalog: Arc<ContractCatalog>,
        store: Arc<dyn Store>,
        config: EngineConfig,
    ) -> Self {
        let prices = PriceStore::with_fallback(primary, secondary, config.fetch_concurrency);
        Self::new(providers, Arc::new(prices), catalog, store, config)
    }

    /// Attaches a futures gateway for month listings.
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn FuturesGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Immutable engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared price store.
    #[must_use]
    pub fn prices(&self) -> &PriceStore {
        &self.prices
    }

    /// The contract catalog.
    #[must_use]
    pub fn catalog(&self) -> &ContractCatalog {
        &self.catalog
    }

    /// The persistence backend.
    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Result-cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> ResultCacheStats {
        self.cache.stats()
    }

    fn touch(&self, user_id: &str) {
        self.data_version.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate_user(user_id);
    }

    // =========================================================================
    // PORTFOLIO ASSEMBLY
    // =========================================================================

    /// Fans out position fetches across providers (bounded by the
    /// per-request deadline), normalizes, and canonicalizes.
    ///
    /// Partial provider failures do not fail the analysis as long as one
    /// provider delivered; failed sources land in
    /// `data_quality.excluded_sources`.
    pub async fn build_portfolio(
        &self,
        ctx: &RequestContext,
    ) -> ServiceResult<(CanonicalPortfolio, Vec<Position>)> {
        let (positions, excluded) = self.gather_positions(ctx.as_of).await?;
        let mut portfolio = canonicalize(
            &positions,
            &self.catalog,
            &ctx.scope,
            &self.canonicalizer_config,
            ctx.as_of,
        )?;
        portfolio.data_quality.excluded_sources = excluded;

        if portfolio.positions.is_empty() && !portfolio.data_quality.cross_source_leakage.is_empty()
        {
            return Err(ServiceError::CrossSourceAmbiguity {
                symbols: portfolio.data_quality.cross_source_leakage.clone(),
            });
        }
        Ok((portfolio, positions))
    }

    async fn gather_positions(
        &self,
        as_of: NaiveDate,
    ) -> ServiceResult<(Vec<Position>, Vec<String>)> {
        let fetches = self.providers.iter().map(|provider| {
            let provider = provider.clone();
            async move {
                let kind = provider.kind();
                let result = tokio::time::timeout(
                    self.config.provider_deadline,
                    provider.fetch_positions(as_of),
                )
                .await;
                (kind, result)
            }
        });
        let results = futures::future::join_all(fetches).await;

        let mut positions = Vec::new();
        let mut excluded = Vec::new();
        let mut any_ok = false;
        for (kind, result) in results {
            match result {
                Ok(Ok(raw)) => match normalize_positions(&raw) {
                    Ok(mut normalized) => {
                        any_ok = true;
                        positions.append(&mut normalized);
                    }
                    Err(err) => {
                        warn!(source = %kind, %err, "normalization failed, excluding source");
                        excluded.push(kind.label().to_string());
                    }
                },
                Ok(Err(err)) => {
                    warn!(source = %kind, %err, "provider failed, excluding source");
                    excluded.push(kind.label().to_string());
                }
                Err(_) => {
                    warn!(source = %kind, "provider timed out, excluding source");
                    excluded.push(kind.label().to_string());
                }
            }
        }

        if !any_ok {
            let source = self
                .providers
                .first()
                .map(|p| p.kind())
                .ok_or_else(|| ServiceError::validation("no providers configured"))?;
            return Err(ServiceError::ProviderUnavailable { source });
        }
        excluded.sort();
        Ok((positions, excluded))
    }

    fn filter_segment(portfolio: &CanonicalPortfolio, segment: Segment) -> CanonicalPortfolio {
        if segment == Segment::All {
            return portfolio.clone();
        }
        let mut filtered = portfolio.clone();
        filtered.positions.retain(|_, p| match segment {
            Segment::All => true,
            Segment::Equities => {
                p.classification != InstrumentClass::Futures
            }
            Segment::Futures => {
                p.classification == InstrumentClass::Futures || p.classification.is_cash()
            }
        });

        // Re-normalize over the surviving non-cash gross.
        let gross: f64 = filtered
            .non_cash()
            .map(|p| p.notional_value.abs())
            .sum();
        filtered.gross_notional = gross;
        filtered.margin_total = filtered.positions.values().map(|p| p.margin_value).sum();
        for position in filtered.positions.values_mut() {
            if !position.classification.is_cash() && gross > 0.0 {
                position.weight_by_notional = position.notional_value / gross;
            }
        }
        let has_futures = filtered.has_futures();
        filtered.notional_leverage = if !has_futures || filtered.margin_total <= 0.0 {
            1.0
        } else {
            gross / filtered.margin_total
        };
        filtered
    }

    fn fingerprint(portfolio: &CanonicalPortfolio) -> String {
        let encoded = serde_json::to_string(portfolio).unwrap_or_default();
        let mut hasher = DefaultHasher::new();
        encoded.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    fn analysis_window(&self, as_of: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = as_of
            .checked_sub_months(Months::new(self.config.analysis_window_months))
            .unwrap_or(as_of);
        (start, as_of)
    }

    async fn factor_inputs(
        &self,
        portfolio: &CanonicalPortfolio,
        as_of: NaiveDate,
    ) -> ServiceResult<FactorInputs> {
        let proxies = assign_proxies(portfolio, &self.proxy_config)?;
        let (start, end) = self.analysis_window(as_of);
        Ok(collect_inputs(&self.prices, portfolio, proxies, start, end).await?)
    }

    /// The effective risk profile: stored override or the configured
    /// default template.
    pub fn risk_profile(&self, user_id: &str) -> ServiceResult<RiskProfile> {
        Ok(self
            .store
            .get_risk_profile(user_id)?
            .unwrap_or_else(|| self.config.default_risk_profile()))
    }

    fn metadata(&self, ctx: &RequestContext, operation: &str, cached: bool) -> ResultMetadata {
        ResultMetadata {
            analysis_date: ctx.as_of,
            portfolio_name: scope_label(&ctx.scope),
            user_id: ctx.user_id.clone(),
            operation: operation.to_string(),
            cached,
        }
    }

    fn cached_result(
        &self,
        ctx: &RequestContext,
        operation: &str,
        key: &ResultKey,
    ) -> Option<AnalysisResult> {
        let value = self.cache.get(key)?;
        let bundle: AnalysisBundle = serde_json::from_value((*value).clone()).ok()?;
        Some(AnalysisResult::ok(
            self.metadata(ctx, operation, true),
            bundle.summary,
            bundle.detail,
            bundle.flags,
            bundle.snapshot,
            ctx.format,
        ))
    }

    fn finish(
        &self,
        ctx: &RequestContext,
        operation: &str,
        key: ResultKey,
        bundle: AnalysisBundle,
    ) -> AnalysisResult {
        if let Ok(value) = serde_json::to_value(&bundle) {
            self.cache.put(key, value);
        }
        AnalysisResult::ok(
            self.metadata(ctx, operation, false),
            bundle.summary,
            bundle.detail,
            bundle.flags,
            bundle.snapshot,
            ctx.format,
        )
    }

    fn result_key<P: Serialize>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        fingerprint: &str,
        params: &P,
    ) -> ResultKey {
        ResultKey {
            operation: operation.to_string(),
            user_id: ctx.user_id.clone(),
            portfolio_fingerprint: fingerprint.to_string(),
            params_hash: params_hash(params),
            data_version: self.data_version.load(Ordering::SeqCst),
        }
    }

    // =========================================================================
    // RISK ANALYSIS
    // =========================================================================

    /// Full risk decomposition plus compliance for a scope/segment.
    pub async fn risk_analysis(
        &self,
        ctx: &RequestContext,
        segment: Segment,
    ) -> ServiceResult<AnalysisResult> {
        const OPERATION: &str = "risk_analysis";
        let (portfolio, _) = self.build_portfolio(ctx).await?;
        let portfolio = Self::filter_segment(&portfolio, segment);
        if portfolio.positions.is_empty() {
            return Err(ServiceError::validation("no positions in requested segment"));
        }
        let fingerprint = Self::fingerprint(&portfolio);
        let key = self.result_key(ctx, OPERATION, &fingerprint, &segment);
        if let Some(cached) = self.cached_result(ctx, OPERATION, &key) {
            return Ok(cached);
        }

        let inputs = self.factor_inputs(&portfolio, ctx.as_of).await?;
        let decomposition = decompose(&inputs, &DecompositionConfig::default())?;
        let profile = self.risk_profile(&ctx.user_id)?;
        let report = evaluate(&portfolio, &decomposition, &inputs.panel, &profile);

        let mut data_quality = portfolio.data_quality.clone();
        data_quality.missing_prices = inputs.missing_prices.clone();

        let verdict = if report.passes { "pass" } else { "violations" };
        let mut metrics = serde_json::Map::new();
        metrics.insert(
            "volatility_annual".to_string(),
            serde_json::json!(decomposition.volatility_annual),
        );
        metrics.insert(
            "factor_pct".to_string(),
            serde_json::json!(decomposition.factor_pct),
        );
        metrics.insert(
            "leverage".to_string(),
            serde_json::json!(portfolio.notional_leverage),
        );
        metrics.insert(
            "score".to_string(),
            serde_json::json!(report.score.composite),
        );

        let bundle = AnalysisBundle {
            summary: serde_json::json!({
                "volatility_annual": decomposition.volatility_annual,
                "factor_pct": decomposition.factor_pct,
                "idio_pct": decomposition.idio_pct,
                "notional_leverage": portfolio.notional_leverage,
                "passes": report.passes,
                "score": report.score,
            }),
            detail: serde_json::json!({
                "decomposition": decomposition,
                "checks": report.checks,
                "positions": portfolio.positions,
                "data_quality": data_quality,
            }),
            snapshot: Snapshot {
                verdict: verdict.to_string(),
                metrics,
                flags: report.flags.iter().map(|f| f.message.clone()).collect(),
                file_path: None,
            },
            flags: report.flags,
        };
        info!(user = %ctx.user_id, ?segment, verdict, "risk analysis complete");
        Ok(self.finish(ctx, OPERATION, key, bundle))
    }

    /// Composite score with top risk factors and recommendations.
    pub async fn risk_score(&self, ctx: &RequestContext) -> ServiceResult<AnalysisResult> {
        const OPERATION: &str = "risk_score";
        let (portfolio, _) = self.build_portfolio(ctx).await?;
        let fingerprint = Self::fingerprint(&portfolio);
        let key = self.result_key(ctx, OPERATION, &fingerprint, &"score");
        if let Some(cached) = self.cached_result(ctx, OPERATION, &key) {
            return Ok(cached);
        }

        let inputs = self.factor_inputs(&portfolio, ctx.as_of).await?;
        let decomposition = decompose(&inputs, &DecompositionConfig::default())?;
        let profile = self.risk_profile(&ctx.user_id)?;
        let report = evaluate(&portfolio, &decomposition, &inputs.panel, &profile);

        let mut top_factors: Vec<(String, f64)> = decomposition
            .factor_variance_shares
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        top_factors.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        top_factors.truncate(5);

        let recommendations: Vec<String> = report
            .flags_at_least(Severity::Warning)
            .iter()
            .map(|f| format!("reduce {}", f.flag_type))
            .collect();

        let composite = report.score.composite;
        let mut metrics = serde_json::Map::new();
        metrics.insert("score".to_string(), serde_json::json!(composite));
        let bundle = AnalysisBundle {
            summary: serde_json::json!({
                "score": report.score,
                "passes": report.passes,
                "top_risk_factors": top_factors,
                "recommendations": recommendations,
            }),
            detail: serde_json::json!({
                "checks": report.checks,
            }),
            snapshot: Snapshot {
                verdict: format!("{composite:.0}"),
                metrics,
                flags: report.flags.iter().map(|f| f.message.clone()).collect(),
                file_path: None,
            },
            flags: report.flags,
        };
        Ok(self.finish(ctx, OPERATION, key, bundle))
    }

    // =========================================================================
    // PERFORMANCE
    // =========================================================================

    /// Realized or hypothetical performance.
    pub async fn performance(
        &self,
        ctx: &RequestContext,
        mode: PerformanceMode,
        benchmark_ticker: Option<&str>,
    ) -> ServiceResult<AnalysisResult> {
        const OPERATION: &str = "performance";
        let (portfolio, positions) = self.build_portfolio(ctx).await?;
        let fingerprint = Self::fingerprint(&portfolio);
        let key = self.result_key(ctx, OPERATION, &fingerprint, &(mode, benchmark_ticker));
        if let Some(cached) = self.cached_result(ctx, OPERATION, &key) {
            return Ok(cached);
        }

        let bundle = match mode {
            PerformanceMode::Realized => {
                self.realized_performance(ctx, &positions, benchmark_ticker)
                    .await?
            }
            PerformanceMode::Hypothetical => {
                self.hypothetical_performance(ctx, &portfolio, benchmark_ticker)
                    .await?
            }
        };
        Ok(self.finish(ctx, OPERATION, key, bundle))
    }

    async fn realized_performance(
        &self,
        ctx: &RequestContext,
        positions: &[Position],
        benchmark_ticker: Option<&str>,
    ) -> ServiceResult<AnalysisBundle> {
        let (start, end) = self.analysis_window(ctx.as_of);

        // Gather transactions per provider; failures reduce coverage.
        let mut by_account: BTreeMap<String, AccountInput> = BTreeMap::new();
        let mut excluded_sources = Vec::new();
        for provider in &self.providers {
            let kind = provider.kind();
            let fetched = tokio::time::timeout(
                self.config.provider_deadline,
                provider.fetch_transactions(start, end),
            )
            .await;
            let raw = match fetched {
                Ok(Ok(raw)) => raw,
                Ok(Err(err)) => {
                    warn!(source = %kind, %err, "transactions unavailable");
                    excluded_sources.push(kind.label().to_string());
                    continue;
                }
                Err(_) => {
                    warn!(source = %kind, "transaction fetch timed out");
                    excluded_sources.push(kind.label().to_string());
                    continue;
                }
            };
            let transactions = normalize_transactions(&raw, kind);
            let flows = provider.derive_flows(&transactions);
            for tx in transactions {
                by_account
                    .entry(tx.account_id.clone())
                    .or_insert_with(|| AccountInput {
                        account_id: tx.account_id.clone(),
                        ..AccountInput::default()
                    })
                    .transactions
                    .push(tx);
            }
            for flow in flows {
                by_account
                    .entry(flow.account_id.clone())
                    .or_insert_with(|| AccountInput {
                        account_id: flow.account_id.clone(),
                        ..AccountInput::default()
                    })
                    .flows
                    .push(flow);
            }
        }
        for position in positions {
            if let Some(input) = by_account.get_mut(&position.account_id) {
                input.positions.push(position.clone());
            }
        }

        let accounts: Vec<AccountInput> = by_account.into_values().collect();
        let performance_config = PerformanceConfig {
            risk_free_annual: self.config.risk_free_annual,
            small_base_threshold: self.config.small_base_threshold,
            base_currency: palisade_core::Currency::USD,
        };
        let mut realized =
            compute_realized(&self.prices, &accounts, &performance_config, ctx.as_of).await?;
        realized.data_quality.excluded_sources = excluded_sources;

        let benchmark = match benchmark_ticker {
            Some(ticker) => {
                match self.prices.monthly_returns(ticker, start, end).await {
                    Ok(series) => Some(serde_json::json!({
                        "ticker": ticker,
                        "metrics": palisade_performance::compute_metrics(
                            &series,
                            self.config.risk_free_annual,
                        ),
                    })),
                    Err(err) => {
                        warn!(ticker, %err, "benchmark unavailable");
                        None
                    }
                }
            }
            None => None,
        };

        let total_return = realized.metrics.total_return;
        let mut metrics = serde_json::Map::new();
        metrics.insert("total_return".to_string(), serde_json::json!(total_return));
        metrics.insert(
            "annualized_return".to_string(),
            serde_json::json!(realized.metrics.annualized_return),
        );
        metrics.insert(
            "sharpe".to_string(),
            serde_json::json!(realized.metrics.sharpe_ratio),
        );
        metrics.insert(
            "max_drawdown".to_string(),
            serde_json::json!(realized.metrics.max_drawdown),
        );

        Ok(AnalysisBundle {
            summary: serde_json::json!({
                "mode": "realized",
                "metrics": realized.metrics,
                "benchmark": benchmark,
            }),
            detail: serde_json::json!({
                "monthly_returns": realized.monthly_returns,
                "per_account": realized.per_account,
                "data_quality": realized.data_quality,
            }),
            snapshot: Snapshot {
                verdict: if total_return >= 0.0 {
                    "positive".to_string()
                } else {
                    "negative".to_string()
                },
                metrics,
                flags: Vec::new(),
                file_path: None,
            },
            flags: Vec::new(),
        })
    }

    async fn hypothetical_performance(
        &self,
        ctx: &RequestContext,
        portfolio: &CanonicalPortfolio,
        benchmark_ticker: Option<&str>,
    ) -> ServiceResult<AnalysisBundle> {
        let inputs = self.factor_inputs(portfolio, ctx.as_of).await?;

        // Weighted sum of asset monthly returns, inner-joined on dates.
        let weights = portfolio.weights();
        let mut dates: Option<Vec<NaiveDate>> = None;
        for (symbol, _) in &weights {
            if let Some(series) = inputs.asset_returns.get(symbol) {
                let own = series.dates();
                dates = Some(match dates {
                    None => own,
                    Some(mut existing) => {
                        existing.retain(|d| series.get(*d).is_some());
                        existing
                    }
                });
            }
        }
        let dates = dates.ok_or_else(|| {
            ServiceError::validation("no asset return series for hypothetical performance")
        })?;

        let monthly = palisade_prices::Series::from_pairs(dates.into_iter().map(|date| {
            let value: f64 = weights
                .iter()
                .filter_map(|(symbol, weight)| {
                    inputs
                        .asset_returns
                        .get(symbol)
                        .and_then(|s| s.get(date))
                        .map(|r| weight * r)
                })
                .sum();
            (date, value)
        }));
        let metrics_out =
            palisade_performance::compute_metrics(&monthly, self.config.risk_free_annual);

        let benchmark = match benchmark_ticker {
            Some(ticker) => {
                let (start, end) = self.analysis_window(ctx.as_of);
                self.prices
                    .monthly_returns(ticker, start, end)
                    .await
                    .ok()
                    .map(|series| {
                        serde_json::json!({
                            "ticker": ticker,
                            "metrics": palisade_performance::compute_metrics(
                                &series,
                                self.config.risk_free_annual,
                            ),
                        })
                    })
            }
            None => None,
        };

        let total_return = metrics_out.total_return;
        let mut metrics = serde_json::Map::new();
        metrics.insert("total_return".to_string(), serde_json::json!(total_return));
        metrics.insert(
            "volatility".to_string(),
            serde_json::json!(metrics_out.volatility_annual),
        );

        Ok(AnalysisBundle {
            summary: serde_json::json!({
                "mode": "hypothetical",
                "metrics": metrics_out,
                "benchmark": benchmark,
            }),
            detail: serde_json::json!({
                "monthly_returns": monthly,
                "missing_prices": inputs.missing_prices,
            }),
            snapshot: Snapshot {
                verdict: if total_return >= 0.0 {
                    "positive".to_string()
                } else {
                    "negative".to_string()
                },
                metrics,
                flags: Vec::new(),
                file_path: None,
            },
            flags: Vec::new(),
        })
    }

    // =========================================================================
    // WHAT-IF & OPTIMIZATION
    // =========================================================================

    /// Scenario analysis over hypothetical weights.
    pub async fn whatif(
        &self,
        ctx: &RequestContext,
        request: &WhatIfRequest,
    ) -> ServiceResult<AnalysisResult> {
        const OPERATION: &str = "whatif";
        let (portfolio, _) = self.build_portfolio(ctx).await?;
        let fingerprint = Self::fingerprint(&portfolio);
        let key = self.result_key(ctx, OPERATION, &fingerprint, request);
        if let Some(cached) = self.cached_result(ctx, OPERATION, &key) {
            return Ok(cached);
        }

        let inputs = self.factor_inputs(&portfolio, ctx.as_of).await?;
        let profile = self.risk_profile(&ctx.user_id)?;
        let result = run_whatif(
            &portfolio,
            &inputs,
            &profile,
            request,
            &DecompositionConfig::default(),
        )?;

        let mut metrics = serde_json::Map::new();
        metrics.insert(
            "vol_before".to_string(),
            serde_json::json!(result.before.volatility_annual),
        );
        metrics.insert(
            "vol_after".to_string(),
            serde_json::json!(result.after.volatility_annual),
        );
        let verdict = if result.after.passes {
            "pass"
        } else {
            "violations"
        };
        let bundle = AnalysisBundle {
            summary: serde_json::json!({
                "before": result.before,
                "after": result.after,
            }),
            detail: serde_json::json!({
                "position_changes": result.position_changes,
                "compliance": result.compliance,
            }),
            snapshot: Snapshot {
                verdict: verdict.to_string(),
                metrics,
                flags: result.flags.iter().map(|f| f.message.clone()).collect(),
                file_path: None,
            },
            flags: result.flags.clone(),
        };
        Ok(self.finish(ctx, OPERATION, key, bundle))
    }

    /// Constrained optimization.
    pub async fn optimize(
        &self,
        ctx: &RequestContext,
        objective: Objective,
    ) -> ServiceResult<AnalysisResult> {
        const OPERATION: &str = "optimization";
        let (portfolio, _) = self.build_portfolio(ctx).await?;
        let fingerprint = Self::fingerprint(&portfolio);
        let key = self.result_key(ctx, OPERATION, &fingerprint, &objective);
        if let Some(cached) = self.cached_result(ctx, OPERATION, &key) {
            return Ok(cached);
        }

        let inputs = self.factor_inputs(&portfolio, ctx.as_of).await?;
        let profile = self.risk_profile(&ctx.user_id)?;
        let result = run_optimization(
            &inputs,
            &profile,
            objective,
            &DecompositionConfig::default(),
        )?;

        let mut metrics = serde_json::Map::new();
        metrics.insert(
            "expected_volatility".to_string(),
            serde_json::json!(result.expected_volatility),
        );
        metrics.insert("l1_distance".to_string(), serde_json::json!(result.l1_distance));
        let top_changes: Vec<_> = result.top_changes.iter().take(5).cloned().collect();
        let bundle = AnalysisBundle {
            summary: serde_json::json!({
                "objective": result.objective,
                "verdict": result.verdict,
                "expected_volatility": result.expected_volatility,
                "l1_distance": result.l1_distance,
                "top_changes": top_changes,
            }),
            detail: serde_json::json!({
                "weights": result.weights,
                "current_weights": result.current_weights,
                "compliance": result.compliance,
                "all_changes": result.top_changes,
            }),
            snapshot: Snapshot {
                verdict: format!("{:?}", result.verdict).to_lowercase(),
                metrics,
                flags: Vec::new(),
                file_path: None,
            },
            flags: Vec::new(),
        };
        Ok(self.finish(ctx, OPERATION, key, bundle))
    }

    // =========================================================================
    // FACTOR INTELLIGENCE
    // =========================================================================

    async fn panel_with_baskets(
        &self,
        ctx: &RequestContext,
        include_baskets: bool,
    ) -> ServiceResult<(palisade_factors::FactorPanel, String, Vec<String>)> {
        let (portfolio, _) = self.build_portfolio(ctx).await?;
        let inputs = self.factor_inputs(&portfolio, ctx.as_of).await?;
        if !include_baskets {
            return Ok((inputs.panel, String::new(), Vec::new()));
        }
        let baskets: Vec<Basket> = self.store.list_baskets(&ctx.user_id)?;
        let (start, end) = self.analysis_window(ctx.as_of);
        let injection = inject_baskets(
            &self.prices,
            &inputs.panel,
            &baskets,
            &std::collections::HashMap::new(),
            start,
            end,
        )
        .await;
        let warnings = injection
            .skipped
            .iter()
            .map(|s| format!("basket '{}' skipped: {}", s.name, s.reason))
            .collect();
        Ok((injection.panel, injection.fingerprint, warnings))
    }

    /// Correlations, performance profiles, or recent factor returns.
    pub async fn factor_analysis(
        &self,
        ctx: &RequestContext,
        kind: FactorAnalysisKind,
        include_baskets: bool,
    ) -> ServiceResult<AnalysisResult> {
        const OPERATION: &str = "factor_analysis";
        let (panel, basket_fingerprint, warnings) =
            self.panel_with_baskets(ctx, include_baskets).await?;
        let key = self.result_key(
            ctx,
            OPERATION,
            &basket_fingerprint,
            &(kind, include_baskets),
        );
        if let Some(cached) = self.cached_result(ctx, OPERATION, &key) {
            return Ok(cached);
        }

        let detail = match kind {
            FactorAnalysisKind::Correlations => serde_json::json!({
                "bucketed": category_correlations(&panel),
                "columns": column_correlations(&panel),
                "basket_overlay": basket_overlay(&panel),
            }),
            FactorAnalysisKind::Performance => serde_json::json!({
                "profiles": factor_profiles(&panel, self.config.risk_free_annual)?,
            }),
            FactorAnalysisKind::Returns => serde_json::json!({
                "columns": panel.columns,
                "labels": panel.labels,
                "categories": panel.categories,
            }),
        };

        let bundle = AnalysisBundle {
            summary: serde_json::json!({
                "kind": kind,
                "column_count": panel.column_names().len(),
                "basket_fingerprint": basket_fingerprint,
                "warnings": warnings,
            }),
            detail,
            snapshot: Snapshot {
                verdict: "ok".to_string(),
                metrics: serde_json::Map::new(),
                flags: Vec::new(),
                file_path: None,
            },
            flags: Vec::new(),
        };
        Ok(self.finish(ctx, OPERATION, key, bundle))
    }

    /// Hedge/offset recommendations for one factor or the whole
    /// portfolio.
    pub async fn factor_recommendations(
        &self,
        ctx: &RequestContext,
        overexposed_factor: Option<&str>,
        include_baskets: bool,
    ) -> ServiceResult<AnalysisResult> {
        const OPERATION: &str = "factor_recommendations";
        let (portfolio, _) = self.build_portfolio(ctx).await?;
        let inputs = self.factor_inputs(&portfolio, ctx.as_of).await?;
        let (panel, basket_fingerprint, _) =
            self.panel_with_baskets(ctx, include_baskets).await?;
        let key = self.result_key(
            ctx,
            OPERATION,
            &basket_fingerprint,
            &(overexposed_factor, include_baskets),
        );
        if let Some(cached) = self.cached_result(ctx, OPERATION, &key) {
            return Ok(cached);
        }

        let recommendation = match overexposed_factor {
            Some(factor) => recommend_offsets(&panel, factor, 5)?,
            None => {
                let decomposition = decompose(&inputs, &DecompositionConfig::default())?;
                recommend_for_portfolio(&panel, &decomposition.factor_variance_shares, 5)?
            }
        };

        let overexposed = recommendation.overexposed.clone();
        let bundle = AnalysisBundle {
            summary: serde_json::json!({
                "overexposed": overexposed.clone(),
                "top_candidate": recommendation.candidates.first(),
            }),
            detail: serde_json::json!({ "recommendation": recommendation }),
            snapshot: Snapshot {
                verdict: overexposed,
                metrics: serde_json::Map::new(),
                flags: Vec::new(),
                file_path: None,
            },
            flags: Vec::new(),
        };
        Ok(self.finish(ctx, OPERATION, key, bundle))
    }

    // =========================================================================
    // SMALLER SURFACES
    // =========================================================================

    /// Leverage headroom against the profile cap.
    pub async fn leverage_capacity(&self, ctx: &RequestContext) -> ServiceResult<AnalysisResult> {
        let (portfolio, _) = self.build_portfolio(ctx).await?;
        let profile = self.risk_profile(&ctx.user_id)?;
        let capacity = leverage_capacity(&portfolio, &profile);
        let mut metrics = serde_json::Map::new();
        metrics.insert(
            "utilization".to_string(),
            serde_json::json!(capacity.utilization),
        );
        Ok(AnalysisResult::ok(
            self.metadata(ctx, "leverage_capacity", false),
            serde_json::to_value(&capacity).map_err(|e| ServiceError::internal(e.to_string()))?,
            serde_json::Value::Null,
            Vec::new(),
            Snapshot {
                verdict: if capacity.utilization <= 1.0 {
                    "within_cap".to_string()
                } else {
                    "over_cap".to_string()
                },
                metrics,
                flags: Vec::new(),
                file_path: None,
            },
            ctx.format,
        ))
    }

    /// Positions losing past the profile's loss limit.
    pub async fn exit_signals(&self, ctx: &RequestContext) -> ServiceResult<AnalysisResult> {
        let (_, positions) = self.build_portfolio(ctx).await?;
        let profile = self.risk_profile(&ctx.user_id)?;
        let signals = check_exit_signals(&positions, &profile);
        let mut metrics = serde_json::Map::new();
        metrics.insert("signal_count".to_string(), serde_json::json!(signals.len()));
        Ok(AnalysisResult::ok(
            self.metadata(ctx, "check_exit_signals", false),
            serde_json::json!({ "signal_count": signals.len() }),
            serde_json::json!({ "signals": signals }),
            Vec::new(),
            Snapshot {
                verdict: if signals.is_empty() {
                    "clear".to_string()
                } else {
                    "exit_signals".to_string()
                },
                metrics,
                flags: Vec::new(),
                file_path: None,
            },
            ctx.format,
        ))
    }

    /// Canonical positions for a scope.
    pub async fn positions(&self, ctx: &RequestContext) -> ServiceResult<AnalysisResult> {
        let (portfolio, _) = self.build_portfolio(ctx).await?;
        let mut metrics = serde_json::Map::new();
        metrics.insert(
            "position_count".to_string(),
            serde_json::json!(portfolio.positions.len()),
        );
        metrics.insert("nav".to_string(), serde_json::json!(portfolio.margin_total));
        Ok(AnalysisResult::ok(
            self.metadata(ctx, "get_positions", false),
            serde_json::json!({
                "position_count": portfolio.positions.len(),
                "margin_total": portfolio.margin_total,
                "notional_leverage": portfolio.notional_leverage,
            }),
            serde_json::json!({
                "positions": portfolio.positions,
                "data_quality": portfolio.data_quality,
            }),
            Vec::new(),
            Snapshot {
                verdict: "ok".to_string(),
                metrics,
                flags: Vec::new(),
                file_path: None,
            },
            ctx.format,
        ))
    }

    /// Stored (or default) risk profile.
    pub fn get_risk_profile(&self, user_id: &str) -> ServiceResult<RiskProfile> {
        self.risk_profile(user_id)
    }

    /// Replaces the user's risk profile from a template, invalidating
    /// cached results.
    pub fn set_risk_profile_template(
        &self,
        user_id: &str,
        template: ProfileTemplate,
    ) -> ServiceResult<RiskProfile> {
        let profile = RiskProfile::from_template(template);
        profile.validate()?;
        self.store.put_risk_profile(user_id, &profile)?;
        self.touch(user_id);
        Ok(profile)
    }

    /// Replaces the user's risk profile wholesale (override path).
    pub fn set_risk_profile(&self, user_id: &str, profile: RiskProfile) -> ServiceResult<()> {
        profile.validate()?;
        self.store.put_risk_profile(user_id, &profile)?;
        self.touch(user_id);
        Ok(())
    }

    // =========================================================================
    // BASKETS
    // =========================================================================

    /// Lists a user's baskets.
    pub fn list_baskets(&self, user_id: &str) -> ServiceResult<Vec<Basket>> {
        self.store.list_baskets(user_id)
    }

    /// Fetches one basket.
    pub fn get_basket(&self, user_id: &str, name: &str) -> ServiceResult<Basket> {
        self.store
            .get_basket(user_id, name)?
            .ok_or_else(|| ServiceError::not_found("basket", name))
    }

    /// Creates a basket; rejects duplicates.
    pub fn create_basket(&self, basket: Basket) -> ServiceResult<()> {
        if self
            .store
            .get_basket(&basket.user_id, &basket.name)?
            .is_some()
        {
            return Err(ServiceError::validation(format!(
                "basket '{}' already exists",
                basket.name
            )));
        }
        let user = basket.user_id.clone();
        self.store.put_basket(&basket)?;
        self.touch(&user);
        Ok(())
    }

    /// Updates an existing basket.
    pub fn update_basket(&self, basket: Basket) -> ServiceResult<()> {
        if self
            .store
            .get_basket(&basket.user_id, &basket.name)?
            .is_none()
        {
            return Err(ServiceError::not_found("basket", &basket.name));
        }
        let user = basket.user_id.clone();
        self.store.put_basket(&basket)?;
        self.touch(&user);
        Ok(())
    }

    /// Deletes a basket.
    pub fn delete_basket(&self, user_id: &str, name: &str) -> ServiceResult<()> {
        if !self.store.delete_basket(user_id, name)? {
            return Err(ServiceError::not_found("basket", name));
        }
        self.touch(user_id);
        Ok(())
    }

    /// Profiles one basket against the factor panel.
    pub async fn analyze_basket(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> ServiceResult<AnalysisResult> {
        let basket = self.get_basket(&ctx.user_id, name)?;
        let (start, end) = self.analysis_window(ctx.as_of);
        let series = basket
            .build_series(&self.prices, &std::collections::HashMap::new(), start, end)
            .await?;

        let mut panel = palisade_factors::FactorPanel::default();
        if let Ok(market) = self
            .prices
            .monthly_returns(&self.proxy_config.market, start, end)
            .await
        {
            panel.add_column(
                self.proxy_config.market.clone(),
                market,
                "market",
                self.proxy_config.market.clone(),
            );
        }
        panel.add_column(
            basket.name.clone(),
            series,
            palisade_factors::CATEGORY_USER_BASKETS,
            format!("Basket: {}", basket.name),
        );
        let profiles = factor_profiles(&panel, self.config.risk_free_annual)?;
        let overlay = basket_overlay(&panel);

        Ok(AnalysisResult::ok(
            self.metadata(ctx, "analyze_basket", false),
            serde_json::json!({
                "basket": basket.name.clone(),
                "profile": profiles.get(&basket.name),
            }),
            serde_json::json!({
                "profiles": profiles,
                "overlay": overlay,
            }),
            Vec::new(),
            Snapshot {
                verdict: "ok".to_string(),
                metrics: serde_json::Map::new(),
                flags: Vec::new(),
                file_path: None,
            },
            ctx.format,
        ))
    }

    // =========================================================================
    // FUTURES
    // =========================================================================

    /// Tradable contract months for a root symbol.
    pub async fn futures_months(
        &self,
        symbol: &str,
        as_of: NaiveDate,
    ) -> ServiceResult<Vec<ContractMonth>> {
        if self.catalog.lookup(symbol).is_none() {
            return Err(ServiceError::validation(format!(
                "unknown futures contract '{symbol}'"
            )));
        }
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| ServiceError::validation("no futures gateway configured"))?;
        Ok(palisade_contracts::list_months(gateway.as_ref(), symbol, as_of).await?)
    }

    /// Month listing plus contract economics at the current root price.
    pub async fn futures_curve(
        &self,
        ctx: &RequestContext,
        symbol: &str,
    ) -> ServiceResult<AnalysisResult> {
        let spec = self
            .catalog
            .lookup(symbol)
            .ok_or_else(|| {
                ServiceError::validation(format!("unknown futures contract '{symbol}'"))
            })?
            .clone();
        let months = self.futures_months(symbol, ctx.as_of).await?;

        let lookback = ctx.as_of - chrono::Duration::days(10);
        let spot = self
            .prices
            .daily_close(symbol, lookback, ctx.as_of)
            .await
            .ok()
            .and_then(|s| s.at_or_before(ctx.as_of));

        Ok(AnalysisResult::ok(
            self.metadata(ctx, "get_futures_curve", false),
            serde_json::json!({
                "symbol": spec.root.clone(),
                "months": months.len(),
                "spot": spot,
                "tick_value": spec.tick_value(),
                "multiplier": spec.multiplier,
            }),
            serde_json::json!({ "months": months, "contract": spec }),
            Vec::new(),
            Snapshot {
                verdict: "ok".to_string(),
                metrics: serde_json::Map::new(),
                flags: Vec::new(),
                file_path: None,
            },
            ctx.format,
        ))
    }
}

fn scope_label(scope: &Scope) -> String {
    match scope {
        Scope::All => "all".to_string(),
        Scope::Provider(kind) => kind.label().to_string(),
        Scope::Institution(name) => name.clone(),
        Scope::Account(id) => id.clone(),
    }
}

/// Current wall-clock timestamp; thin wrapper for call sites that also
/// need an as-of date.
#[must_use]
pub fn now_utc() -> chrono::DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration as ChronoDuration;
    use palisade_core::ProviderKind;
    use palisade_prices::{Series, StaticVendor};
    use palisade_providers::{RawPosition, StaticProvider};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn raw(ticker: &str, quantity: f64, price: f64, source: &str) -> RawPosition {
        RawPosition {
            ticker: ticker.to_string(),
            quantity,
            unit_price: price,
            currency: "USD".to_string(),
            cost_basis: Some(quantity * price),
            account_id: format!("{source}-1"),
            brokerage_name: source.to_string(),
            instrument_type: "equity".to_string(),
            source: source.to_string(),
            contract_month: None,
        }
    }

    fn monthly(drift: f64) -> Series {
        Series::from_pairs((0..40).map(|i| {
            let year = 2022 + (i / 12) as i32;
            let month = (i % 12) as u32 + 1;
            (
                NaiveDate::from_ymd_opt(year, month, 28).unwrap(),
                100.0 * (1.0 + drift).powi(i),
            )
        }))
    }

    fn wiggly(scale: f64) -> Series {
        let mut level = 100.0f64;
        Series::from_pairs((0..40).map(move |i| {
            let year = 2022 + (i / 12) as i32;
            let month = (i % 12) as u32 + 1;
            level *= 1.0 + scale * (((i * 7) % 11) as f64 - 5.0) / 5.0;
            (NaiveDate::from_ymd_opt(year, month, 28).unwrap(), level)
        }))
    }

    fn daily(price: f64) -> Series {
        Series::from_pairs(
            (0..900).map(|i| (date(2023, 1, 1) + ChronoDuration::days(i), price)),
        )
    }

    fn service() -> RiskService {
        let provider = StaticProvider::new(ProviderKind::NativeSchwab).with_positions(vec![
            raw("AAPL", 100.0, 255.0, "schwab"),
            raw("VTI", 50.0, 280.0, "schwab"),
        ]);
        let vendor = StaticVendor::named("test")
            .with_monthly("AAPL", wiggly(0.02))
            .with_monthly("VTI", wiggly(0.012))
            .with_monthly("SPY", wiggly(0.01))
            .with_monthly("MTUM", wiggly(0.011))
            .with_monthly("VTV", wiggly(0.008))
            .with_monthly("XLK", wiggly(0.015))
            .with_monthly("IEF", monthly(0.002))
            .with_daily("AAPL", daily(255.0))
            .with_daily("VTI", daily(280.0));
        RiskService::from_vendor(
            vec![Arc::new(provider)],
            Arc::new(vendor),
            None,
            Arc::new(ContractCatalog::standard()),
            Arc::new(MemoryStore::new()),
            EngineConfig::default(),
        )
    }

    fn ctx() -> RequestContext {
        RequestContext {
            user_id: "u1".to_string(),
            scope: Scope::All,
            as_of: date(2025, 4, 28),
            format: OutputFormat::Agent,
        }
    }

    #[tokio::test]
    async fn test_risk_analysis_envelope() {
        let service = service();
        let result = service.risk_analysis(&ctx(), Segment::All).await.unwrap();
        assert!(result.success);
        assert!(result.snapshot.is_some());
        let snapshot = result.snapshot.unwrap();
        assert!(snapshot.metrics.contains_key("volatility_annual"));
        assert_eq!(result.metadata.operation, "risk_analysis");
        assert!(!result.metadata.cached);
    }

    #[tokio::test]
    async fn test_risk_analysis_cached_second_call() {
        let service = service();
        let first = service.risk_analysis(&ctx(), Segment::All).await.unwrap();
        let second = service.risk_analysis(&ctx(), Segment::All).await.unwrap();
        assert!(!first.metadata.cached);
        assert!(second.metadata.cached);
        assert_eq!(first.summary, second.summary);
    }

    #[tokio::test]
    async fn test_mutation_invalidates_cache() {
        let service = service();
        let _ = service.risk_analysis(&ctx(), Segment::All).await.unwrap();
        service
            .set_risk_profile_template("u1", ProfileTemplate::Income)
            .unwrap();
        let after = service.risk_analysis(&ctx(), Segment::All).await.unwrap();
        assert!(!after.metadata.cached);
    }

    #[tokio::test]
    async fn test_partial_provider_failure_tolerated() {
        let good = StaticProvider::new(ProviderKind::NativeSchwab)
            .with_positions(vec![raw("AAPL", 100.0, 255.0, "schwab")]);
        let bad = StaticProvider::new(ProviderKind::AggregatorPlaid).failing();
        let vendor = StaticVendor::named("test")
            .with_monthly("AAPL", wiggly(0.02))
            .with_monthly("SPY", wiggly(0.01))
            .with_monthly("MTUM", wiggly(0.011))
            .with_monthly("VTV", wiggly(0.008))
            .with_monthly("XLK", wiggly(0.015));
        let service = RiskService::from_vendor(
            vec![Arc::new(good), Arc::new(bad)],
            Arc::new(vendor),
            None,
            Arc::new(ContractCatalog::standard()),
            Arc::new(MemoryStore::new()),
            EngineConfig::default(),
        );

        let (portfolio, _) = service.build_portfolio(&ctx()).await.unwrap();
        assert_eq!(
            portfolio.data_quality.excluded_sources,
            vec!["plaid".to_string()]
        );
        assert!(portfolio.positions.contains_key("AAPL"));
    }

    #[tokio::test]
    async fn test_all_providers_failed_is_error() {
        let bad = StaticProvider::new(ProviderKind::NativeSchwab).failing();
        let service = RiskService::from_vendor(
            vec![Arc::new(bad)],
            Arc::new(StaticVendor::named("test")),
            None,
            Arc::new(ContractCatalog::standard()),
            Arc::new(MemoryStore::new()),
            EngineConfig::default(),
        );
        let err = service.build_portfolio(&ctx()).await.unwrap_err();
        assert_eq!(err.code(), "PROVIDER_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_configured_fetch_concurrency_reaches_store() {
        let config = EngineConfig::default()
            .with_toml("fetch_concurrency = 4")
            .unwrap();
        let service = RiskService::from_vendor(
            Vec::new(),
            Arc::new(StaticVendor::named("test")),
            None,
            Arc::new(ContractCatalog::standard()),
            Arc::new(MemoryStore::new()),
            config,
        );
        assert_eq!(service.prices().fetch_concurrency(), 4);
        assert_eq!(service.config().fetch_concurrency, 4);
    }

    #[tokio::test]
    async fn test_basket_crud_and_invalidation() {
        let service = service();
        let basket = Basket {
            user_id: "u1".to_string(),
            name: "Tech".to_string(),
            tickers: vec!["AAPL".to_string()],
            weights: None,
            weighting_method: palisade_intel::WeightingMethod::Equal,
            updated_at: Utc::now(),
        };
        service.create_basket(basket.clone()).unwrap();
        assert!(service.create_basket(basket.clone()).is_err());
        assert_eq!(service.list_baskets("u1").unwrap().len(), 1);
        service.delete_basket("u1", "Tech").unwrap();
        assert!(service.get_basket("u1", "Tech").is_err());
    }

    #[tokio::test]
    async fn test_optimization_end_to_end() {
        let service = service();
        let mut context = ctx();
        context.format = OutputFormat::Full;
        let result = service
            .optimize(&context, Objective::MinVariance)
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.detail["weights"].is_object());
    }

    #[tokio::test]
    async fn test_factor_analysis_correlations() {
        let service = service();
        let mut context = ctx();
        context.format = OutputFormat::Full;
        let result = service
            .factor_analysis(&context, FactorAnalysisKind::Correlations, false)
            .await
            .unwrap();
        assert!(result.detail["basket_overlay"].is_object());
    }
}
