//! Route definitions.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use palisade_engine::RiskService;

use crate::handlers::{self, AppState};

/// Creates the API router over a risk service.
pub fn create_router(service: Arc<RiskService>, permissive_cors: bool) -> Router {
    let state = Arc::new(AppState { service });

    let mut router = Router::new()
        // Health
        .route("/health", get(handlers::health))
        // Risk
        .route("/api/risk/analysis", get(handlers::risk_analysis))
        .route("/api/risk/score", get(handlers::risk_score))
        .route("/api/risk/leverage", get(handlers::leverage_capacity))
        .route("/api/risk/exit-signals", get(handlers::exit_signals))
        // Performance
        .route("/api/performance", get(handlers::performance))
        // Scenarios
        .route("/api/whatif", post(handlers::whatif))
        .route("/api/optimize", post(handlers::optimize))
        // Factor intelligence
        .route(
            "/api/factors/recommendations",
            get(handlers::factor_recommendations),
        )
        .route("/api/factors/{kind}", get(handlers::factor_analysis))
        // Positions & profile
        .route("/api/positions", get(handlers::positions))
        .route(
            "/api/profile",
            get(handlers::get_profile).put(handlers::set_profile),
        )
        // Baskets
        .route(
            "/api/baskets",
            get(handlers::list_baskets).post(handlers::create_basket),
        )
        .route(
            "/api/baskets/{name}",
            get(handlers::get_basket)
                .put(handlers::update_basket)
                .delete(handlers::delete_basket),
        )
        .route(
            "/api/baskets/{name}/analysis",
            get(handlers::analyze_basket),
        )
        // Futures
        .route(
            "/api/futures/{symbol}/months",
            get(handlers::futures_months),
        )
        .route("/api/futures/{symbol}/curve", get(handlers::futures_curve))
        // Trades
        .route("/api/trades/preview", post(handlers::trade_preview))
        .route(
            "/api/trades/basket/preview",
            post(handlers::basket_trade_preview),
        )
        .route(
            "/api/trades/basket/{id}/execute",
            post(handlers::basket_trade_execute),
        )
        .route("/api/trades/{id}/execute", post(handlers::trade_execute))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if permissive_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}
