//! REST API integration tests over the fixture-backed service.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use palisade_engine::fixtures::demo_service;
use palisade_server::create_router;

fn router() -> axum::Router {
    create_router(Arc::new(demo_service()), true)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_positions_envelope() {
    let response = router()
        .oneshot(
            Request::get("/api/positions?as_of=2025-06-28")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert!(json["summary"]["position_count"].as_u64().unwrap() > 0);
    assert_eq!(json["metadata"]["operation"], "get_positions");
}

#[tokio::test]
async fn test_risk_analysis_agent_format() {
    let response = router()
        .oneshot(
            Request::get("/api/risk/analysis?as_of=2025-06-28&format=agent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert!(json["snapshot"]["verdict"].is_string());
    assert!(json["snapshot"]["metrics"]["volatility_annual"].is_number());
}

#[tokio::test]
async fn test_unknown_segment_is_validation_error() {
    let response = router()
        .oneshot(
            Request::get("/api/risk/analysis?segment=crypto&as_of=2025-06-28")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION");
}

#[tokio::test]
async fn test_basket_crud_roundtrip() {
    let app = router();

    let create = Request::post("/api/baskets?user=u1")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({
                "name": "Tech Picks",
                "tickers": ["AAPL", "MSFT"],
                "weighting_method": "equal"
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let list = Request::get("/api/baskets?user=u1").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(list).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    let delete = Request::delete("/api/baskets/Tech%20Picks?user=u1")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(delete).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let missing = Request::get("/api/baskets/Tech%20Picks?user=u1")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(missing).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_whatif_rejects_empty_body() {
    let request = Request::post("/api/whatif?as_of=2025-06-28")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let response = router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION");
}

#[tokio::test]
async fn test_trade_preview_and_execute() {
    let app = router();

    let preview = Request::post("/api/trades/preview?user=u1&as_of=2025-06-20")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({"symbol": "AAPL", "quantity": 10.0, "side": "BUY"}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(preview).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let id = json["id"].as_str().unwrap().to_string();
    assert!((json["estimated_cost"].as_f64().unwrap() - 2550.0).abs() < 1e-6);

    let execute = Request::post(format!("/api/trades/{id}/execute?user=u1&as_of=2025-06-20"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(execute).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["preview"]["executed"], true);
}
