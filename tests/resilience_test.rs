//! Breaker, rate limit and counter-store failure behavior over HTTP.

use serde_json::Value;

use dashboard_api::config::{FailurePolicy, RouteLimitConfig};
use dashboard_api::resilience::CircuitState;

mod common;

use common::{spawn_app, test_config, TREND_PATH};

async fn error_kind(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_breaker_opens_after_relational_failures() {
    let app = spawn_app(test_config()).await;
    app.relational.set_available(false);

    for _ in 0..5 {
        let res = app.get("/lots").await;
        assert_eq!(res.status(), 502);
        assert_eq!(error_kind(res).await, "store_unavailable");
    }
    let calls = app.relational.call_count();

    let res = app.get("/lots").await;
    assert_eq!(res.status(), 503);
    assert_eq!(error_kind(res).await, "breaker_open");
    assert_eq!(app.relational.call_count(), calls);

    // Writes go through the same breaker.
    let res = app.client.delete(app.url("/lots/L3")).send().await.unwrap();
    assert_eq!(res.status(), 503);

    let health: Value = app.get("/health").await.json().await.unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["breakers"][0]["state"], "open");
    assert_eq!(app.state.breakers.relational.state(), CircuitState::Open);
    assert_eq!(app.state.breakers.document.state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_cached_trend_survives_open_breaker() {
    let app = spawn_app(test_config()).await;

    let warm = app.get(TREND_PATH).await;
    assert_eq!(warm.status(), 200);

    app.relational.set_available(false);
    app.state.breakers.relational.force_open();

    let res = app.get(TREND_PATH).await;
    assert_eq!(res.status(), 200);

    let cold = app.get("/yield/trend?date_from=2023-01-01&date_to=2023-01-31").await;
    assert_eq!(cold.status(), 503);
    assert_eq!(error_kind(cold).await, "breaker_open");
}

#[tokio::test]
async fn test_rate_limit_rejects_with_retry_after() {
    let mut config = test_config();
    config.rate_limit.routes.push(RouteLimitConfig {
        path_prefix: "/lots".to_string(),
        capacity: 3.0,
        refill_per_sec: 0.5,
    });
    let app = spawn_app(config).await;

    for _ in 0..3 {
        assert_eq!(app.get("/lots").await.status(), 200);
    }
    let res = app.get("/lots").await;
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()["retry-after"], "2");
    assert_eq!(error_kind(res).await, "rate_limit_exceeded");

    // Other paths have their own buckets; health is never limited.
    assert_eq!(app.get("/defects/details?lots=L1").await.status(), 200);
    for _ in 0..5 {
        assert_eq!(app.get("/health").await.status(), 200);
    }
}

#[tokio::test]
async fn test_rate_limit_and_open_breaker_are_distinct() {
    let mut config = test_config();
    config.rate_limit.routes.push(RouteLimitConfig {
        path_prefix: "/lots".to_string(),
        capacity: 6.0,
        refill_per_sec: 0.0,
    });
    let app = spawn_app(config).await;
    app.relational.set_available(false);

    let mut statuses = Vec::new();
    for _ in 0..7 {
        statuses.push(app.get("/lots").await.status().as_u16());
    }

    assert_eq!(statuses, vec![502, 502, 502, 502, 502, 503, 429]);
}

#[tokio::test]
async fn test_ratelimit_store_down_fails_closed() {
    let app = spawn_app(test_config()).await;
    app.ratelimit_store.set_available(false);

    let res = app.get("/lots").await;
    assert_eq!(res.status(), 503);
    assert_eq!(error_kind(res).await, "cache_store_unavailable");
    assert_eq!(app.relational.call_count(), 0);
}

#[tokio::test]
async fn test_ratelimit_store_down_fails_open_when_configured() {
    let mut config = test_config();
    config.rate_limit.failure_policy = FailurePolicy::Open;
    let app = spawn_app(config).await;
    app.ratelimit_store.set_available(false);

    assert_eq!(app.get("/lots").await.status(), 200);
}

#[tokio::test]
async fn test_cache_store_down_recomputes() {
    let app = spawn_app(test_config()).await;
    app.cache_store.set_available(false);

    assert_eq!(app.get(TREND_PATH).await.status(), 200);
    let calls = app.relational.call_count();
    assert_eq!(app.get(TREND_PATH).await.status(), 200);
    assert!(app.relational.call_count() > calls);

    // Writes still succeed; invalidation failure is logged only.
    let res = app
        .client
        .put(app.url("/lots/L2"))
        .json(&serde_json::json!({"good": 80}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
}

#[tokio::test]
async fn test_cache_store_down_fail_closed_surfaces() {
    let mut config = test_config();
    config.cache.failure_policy = FailurePolicy::Closed;
    let app = spawn_app(config).await;
    app.cache_store.set_available(false);

    let res = app.get(TREND_PATH).await;
    assert_eq!(res.status(), 503);
    assert_eq!(error_kind(res).await, "cache_store_unavailable");
}

#[tokio::test]
async fn test_writes_rejected_by_open_breakers() {
    let app = spawn_app(test_config()).await;
    app.get(TREND_PATH).await;

    app.state.breakers.document.force_open();
    let res = app
        .client
        .post(app.url("/defects/details"))
        .json(&serde_json::json!({"lot_id": "L1", "defect_type": "scratch"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(error_kind(res).await, "breaker_open");
    assert_eq!(app.documents.len(), 1);
    // Nothing was written, so the cached trend stays.
    assert_eq!(app.cache_store.len(), 1);

    app.state.breakers.relational.force_open();
    let res = app.client.post(app.url("/seed?rng_seed=1")).send().await.unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(app.documents.len(), 1);

    let res = app.get("/filter/dates").await;
    assert_eq!(res.status(), 503);
    assert_eq!(error_kind(res).await, "breaker_open");
}
