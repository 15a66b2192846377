//! Shared utilities for integration tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use dashboard_api::config::AppConfig;
use dashboard_api::lifecycle::{build_state, BackingStores, CounterStores, Shutdown};
use dashboard_api::records::{
    DefectDetail, DefectSummary, InMemoryDocumentStore, InMemoryRelationalStore, Lot, YieldRecord,
};
use dashboard_api::store::InMemoryCounterStore;
use dashboard_api::{AppState, HttpServer};

/// Trend query matching the seeded data for station S1.
pub const TREND_PATH: &str = "/yield/trend?date_from=2024-01-01&date_to=2024-01-31&station=S1";

/// A running server plus handles on every store behind it.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub state: AppState,
    pub relational: InMemoryRelationalStore,
    pub documents: InMemoryDocumentStore,
    pub cache_store: InMemoryCounterStore,
    pub ratelimit_store: InMemoryCounterStore,
    shutdown: Shutdown,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("server unreachable")
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Defaults with limits high enough that only tests which lower them are
/// ever rate limited.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.rate_limit.capacity = 1_000.0;
    config.rate_limit.refill_per_sec = 1_000.0;
    config.observability.metrics_enabled = false;
    config
}

/// Boot the API on an ephemeral port with seeded in-process stores.
pub async fn spawn_app(config: AppConfig) -> TestApp {
    let relational = InMemoryRelationalStore::new();
    let documents = InMemoryDocumentStore::new();
    seed(&relational, &documents);

    let cache_store = InMemoryCounterStore::new("cache");
    let ratelimit_store = InMemoryCounterStore::new("ratelimit");

    let state = build_state(
        &config,
        CounterStores {
            cache: Arc::new(cache_store.clone()),
            ratelimit: Arc::new(ratelimit_store.clone()),
        },
        BackingStores {
            relational: Arc::new(relational.clone()),
            documents: Arc::new(documents.clone()),
        },
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(
        state.clone(),
        Duration::from_secs(config.timeouts.request_secs),
    );
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    let client = reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap();

    TestApp {
        addr,
        client,
        state,
        relational,
        documents,
        cache_store,
        ratelimit_store,
        shutdown,
    }
}

/// Two S1 lots with yields on Jan 2nd and 3rd, one S2 lot, defects for all.
pub fn seed(relational: &InMemoryRelationalStore, documents: &InMemoryDocumentStore) {
    for (lot_id, station) in [("L1", "S1"), ("L2", "S1"), ("L3", "S2")] {
        relational.add_lot(Lot {
            lot_id: lot_id.to_string(),
            product: "P1".to_string(),
            station: station.to_string(),
            total: 100,
            good: 90,
        });
    }
    for (lot_id, day, rate) in [("L1", 2, 90.0), ("L2", 2, 95.0), ("L1", 3, 80.0), ("L3", 3, 10.0)] {
        relational.add_yield(YieldRecord {
            lot_id: lot_id.to_string(),
            good: rate as i64,
            total: 100,
            yield_rate: rate,
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 9, 30, 0).unwrap(),
        });
    }
    for (lot_id, defect_type, count) in [("L1", "scratch", 3), ("L2", "particle", 7)] {
        relational.add_defect_summary(DefectSummary {
            lot_id: lot_id.to_string(),
            defect_type: defect_type.to_string(),
            count,
        });
    }
    documents.add_detail(DefectDetail {
        lot_id: "L1".to_string(),
        defect_type: "scratch".to_string(),
        x: Some(10.0),
        y: Some(12.5),
        severity: Some("minor".to_string()),
        wafer: Some(3),
    });
}
