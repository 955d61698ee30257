mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use common::*;
use dexbot::api::router::create_router;

fn build_test_app(api_token: Option<&str>) -> (axum::Router, dexbot::execution::engine::TradingContext) {
    let ctx = context(Setup::new(arbitrage_venues()));
    let (state, _pause_flag) = app_state(ctx.clone(), api_token);
    (create_router(state), ctx)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, _ctx) = build_test_app(None);

    let resp = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["mode"], "simulation");
}

#[tokio::test]
async fn test_status_reports_balance_as_strings() {
    let (app, _ctx) = build_test_app(None);

    let resp = app.oneshot(get("/api/status")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["success"], true);
    let data = &json["data"];
    assert_eq!(data["mode"], "simulation");
    assert_eq!(data["paused"], false);
    assert_eq!(data["halted"], false);
    assert_eq!(data["balance"]["current_amount"], "10000000000");
    assert_eq!(data["daily_loss_limit_remaining"], "1000000000");
    assert_eq!(data["open_positions"], 0);
    assert_eq!(data["performance"]["total_trades"], 0);
}

#[tokio::test]
async fn test_positions_filter_and_detail() {
    let (app, ctx) = build_test_app(None);
    let position = open_weth_position(&ctx, WETH_UNIT / 2, 500 * USDC);

    let resp = app.clone().oneshot(get("/api/positions")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["cost_basis"], "500000000");

    let resp = app.clone().oneshot(get("/api/positions?status=closed")).await.unwrap();
    let json = body_json(resp).await;
    assert!(json["data"].as_array().unwrap().is_empty());

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/positions/{}", position.id)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["data"]["status"], "open");

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/positions/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = app.oneshot(get("/api/positions?status=pending")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_trades_and_snapshot() {
    let (app, ctx) = build_test_app(None);
    ctx.executor.execute(&arbitrage_opportunity(), 500 * USDC).await;

    let resp = app.clone().oneshot(get("/api/trades?limit=10")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let trades = json["data"].as_array().unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0]["outcome"], "success");
    assert_eq!(trades[0]["net_result"], "50000000");

    let resp = app.oneshot(get("/api/ledger/snapshot")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["balance"]["current_amount"], "10050000000");
    assert_eq!(json["trades"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_activity_feed() {
    let (app, ctx) = build_test_app(None);
    ctx.activity.info("hello operator");

    let resp = app.oneshot(get("/api/activity?limit=5")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    let events = json["data"].as_array().unwrap();
    assert_eq!(events.last().unwrap()["message"], "hello operator");
}

#[tokio::test]
async fn test_auth_required_when_token_set() {
    let (app, _ctx) = build_test_app(Some("s3cret"));

    let resp = app.clone().oneshot(get("/api/status")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .header("authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .header("authorization", "Bearer s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Health and metrics stay public.
    let resp = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
