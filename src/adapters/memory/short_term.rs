//! Short-term memory adapters: in-process TTL map and Redis.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::ShortTermMemory;

fn cache_error(err: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::CacheError, err.to_string())
}

/// Minimum time between sweeps of expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Default)]
struct Entries {
    values: HashMap<String, (String, Instant)>,
    last_sweep: Option<Instant>,
}

/// In-process TTL map. Expired entries are dropped on read, and writes
/// sweep out every expired entry at most once per [`SWEEP_INTERVAL`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryShortTermMemory {
    entries: Arc<RwLock<Entries>>,
}

impl InMemoryShortTermMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.values.is_empty()
    }
}

#[async_trait]
impl ShortTermMemory for InMemoryShortTermMemory {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.values.get(key) {
                None => return Ok(None),
                Some((value, expires_at)) if *expires_at > now => return Ok(Some(value.clone())),
                Some(_) => {}
            }
        }
        let mut entries = self.entries.write().await;
        if entries
            .values
            .get(key)
            .is_some_and(|(_, expires_at)| *expires_at <= now)
        {
            entries.values.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries
            .last_sweep
            .map_or(true, |last| now.duration_since(last) >= SWEEP_INTERVAL)
        {
            entries.values.retain(|_, (_, expires_at)| *expires_at > now);
            entries.last_sweep = Some(now);
        }
        entries
            .values
            .insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), DomainError> {
        self.entries.write().await.values.remove(key);
        Ok(())
    }
}

/// Redis-backed short-term memory using `SET key value EX ttl`.
#[derive(Clone)]
pub struct RedisShortTermMemory {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisShortTermMemory {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            prefix: "conductor:stm:".to_string(),
        }
    }

    /// Opens a multiplexed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, DomainError> {
        let client = redis::Client::open(url).map_err(cache_error)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(cache_error)?;
        Ok(Self::new(conn))
    }

    fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl ShortTermMemory for RedisShortTermMemory {
    async fn get(&self, key: &str) -> Result<Option<String>, DomainError> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key)).await.map_err(cache_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        // Redis rejects EX 0.
        let secs = ttl.as_secs().max(1);
        redis::cmd("SET")
            .arg(self.key(key))
            .arg(value)
            .arg("EX")
            .arg(secs)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(cache_error)
    }

    async fn delete(&self, key: &str) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(key)).await.map_err(cache_error)
    }
}
