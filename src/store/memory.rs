//! In-process counter store.
//!
//! Used when Redis is disabled (single replica, local development) and as the
//! store behind unit and integration tests. Expiry is evaluated lazily on read.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{SharedCounterStore, StoreError, StoreHealth};

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// DashMap-backed store with the same semantics as the Redis store.
#[derive(Clone)]
pub struct InMemoryCounterStore {
    name: String,
    entries: Arc<DashMap<String, Entry>>,
    available: Arc<AtomicBool>,
}

impl InMemoryCounterStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Simulate an outage: while unavailable every operation fails and
    /// `ping` reports unhealthy.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of live (non-expired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining time-to-live of a key, if it has one.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{} is offline", self.name)))
        }
    }

    /// Live entry for `key`, evicting it if it has expired.
    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|e| e.value().clone())?;
        if entry.is_expired(now) {
            self.evict_if_expired(key, now);
            return None;
        }
        Some(entry)
    }

    /// Remove `key` only if the entry stored now is still expired; a write
    /// that landed after the read above survives.
    fn evict_if_expired(&self, key: &str, now: Instant) -> bool {
        self.entries.remove_if(key, |_, e| e.is_expired(now)).is_some()
    }
}

#[async_trait]
impl SharedCounterStore for InMemoryCounterStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check()?;
        match self.live(key) {
            Some(Entry { value: Value::Bytes(bytes), .. }) => Ok(Some(bytes)),
            Some(_) => Err(StoreError::Unavailable(format!(
                "WRONGTYPE {} holds a hash",
                key
            ))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Bytes(value.to_vec()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.check()?;
        match self.live(key) {
            Some(Entry { value: Value::Hash(fields), .. }) => Ok(fields),
            Some(_) => Err(StoreError::Unavailable(format!(
                "WRONGTYPE {} holds a plain value",
                key
            ))),
            None => Ok(HashMap::new()),
        }
    }

    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        self.check()?;
        // Drop an expired entry first so stale fields do not resurface.
        let _ = self.live(key);

        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Hash(map) => {
                for (field, value) in fields {
                    map.insert((*field).to_string(), value.clone());
                }
                Ok(())
            }
            Value::Bytes(_) => Err(StoreError::Unavailable(format!(
                "WRONGTYPE {} holds a plain value",
                key
            ))),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.check()?;
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.is_expired(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check()?;
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.entries.remove(key) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    async fn ping(&self) -> StoreHealth {
        if self.check().is_ok() {
            StoreHealth::Healthy
        } else {
            StoreHealth::Unhealthy
        }
    }
}

/// Redis-style glob matching for `*` (any run) and `?` (any single char).
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
