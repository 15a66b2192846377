//! Redis-compatible counter store (Redis, Dragonfly, KeyDB).

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::{bounded, ttl_secs, SharedCounterStore, StoreError, StoreHealth};
use crate::observability::metrics;

/// Keys fetched per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// Counter store backed by a Redis connection manager.
///
/// The connection manager reconnects on its own; a dropped connection surfaces
/// as `StoreError::Unavailable` for the calls in flight.
#[derive(Clone)]
pub struct RedisCounterStore {
    name: String,
    connection: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCounterStore {
    /// Connect to `url` and verify the connection with a PING.
    pub async fn connect(name: &str, url: &str, op_timeout: Duration) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(|e| {
            warn!(store = %name, error = %e, "Failed to create Redis client");
            StoreError::Unavailable(format!("invalid Redis URL: {}", e))
        })?;

        let connection = bounded("connect", op_timeout, async {
            ConnectionManager::new(client)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))
        })
        .await?;

        let store = Self {
            name: name.to_string(),
            connection,
            op_timeout,
        };

        if !store.ping().await.is_healthy() {
            return Err(StoreError::Unavailable(format!("PING to {} failed", name)));
        }

        debug!(store = %name, "Connected to counter store");
        Ok(store)
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }

    fn fail(&self, op: &'static str, e: redis::RedisError) -> StoreError {
        metrics::record_store_error(&self.name, op);
        warn!(store = %self.name, op, error = %e, "Counter store command failed");
        StoreError::Unavailable(e.to_string())
    }
}

#[async_trait]
impl SharedCounterStore for RedisCounterStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn();
        bounded("get", self.op_timeout, async {
            redis::cmd("GET")
                .arg(key)
                .query_async::<Option<Vec<u8>>>(&mut conn)
                .await
                .map_err(|e| self.fail("get", e))
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn();
        bounded("set", self.op_timeout, async {
            redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_secs(ttl))
                .query_async::<()>(&mut conn)
                .await
                .map_err(|e| self.fail("set", e))
        })
        .await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn();
        bounded("hgetall", self.op_timeout, async {
            redis::cmd("HGETALL")
                .arg(key)
                .query_async::<HashMap<String, String>>(&mut conn)
                .await
                .map_err(|e| self.fail("hgetall", e))
        })
        .await
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(*field).arg(value);
        }

        let mut conn = self.conn();
        bounded("hset", self.op_timeout, async {
            cmd.query_async::<i64>(&mut conn)
                .await
                .map(|_| ())
                .map_err(|e| self.fail("hset", e))
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn();
        bounded("expire", self.op_timeout, async {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs(ttl))
                .query_async::<i64>(&mut conn)
                .await
                .map(|_| ())
                .map_err(|e| self.fail("expire", e))
        })
        .await
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        // SCAN instead of KEYS so a large keyspace never blocks the server.
        let mut conn = self.conn();
        bounded("scan", self.op_timeout, async {
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| self.fail("scan", e))?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            keys.sort();
            keys.dedup();
            Ok(keys)
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(key);
        }

        let mut conn = self.conn();
        bounded("del", self.op_timeout, async {
            cmd.query_async::<u64>(&mut conn)
                .await
                .map_err(|e| self.fail("del", e))
        })
        .await
    }

    async fn ping(&self) -> StoreHealth {
        let mut conn = self.conn();
        let result = bounded("ping", self.op_timeout, async {
            redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .map_err(|e| self.fail("ping", e))
        })
        .await;

        match result {
            Ok(_) => StoreHealth::Healthy,
            Err(e) => {
                warn!(store = %self.name, error = %e, "Counter store ping failed");
                StoreHealth::Unhealthy
            }
        }
    }
}
