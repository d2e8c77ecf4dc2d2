use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::geokey::{Coordinate, RouteKey, TransportType};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database operation failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Route payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Corrupt cache row: {0}")]
    Corrupt(String),
}

/// A resolved route as returned by the provider, keyed by its quantized identity.
///
/// `origin` and `destination` keep the caller's unquantized input for auditing;
/// lookups only ever use `route_key` and `transport_type`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteCacheEntry {
    pub route_key: RouteKey,
    pub transport_type: TransportType,
    pub origin: Coordinate,
    pub destination: Coordinate,
    pub route_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The entry is now the live one for its key.
    Inserted,
    /// A live entry already existed and was left untouched; this is it.
    Kept(RouteCacheEntry),
}

/// Persistent route cache with append-if-absent writes and store-enforced expiry.
#[async_trait]
pub trait RouteCacheStore: Send + Sync {
    /// Returns the live entry, never an expired one.
    async fn get(
        &self,
        route_key: &RouteKey,
        transport: TransportType,
    ) -> Result<Option<RouteCacheEntry>, StoreError>;

    /// Inserts unless a live entry exists for the same key and transport.
    async fn put(&self, entry: RouteCacheEntry) -> Result<PutOutcome, StoreError>;

    /// Drops expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[derive(Debug, sqlx::FromRow)]
struct RouteCacheRow {
    route_key: String,
    transport_type: String,
    origin_x: f64,
    origin_y: f64,
    dest_x: f64,
    dest_y: f64,
    route_data: String,
    created_at: i64,
}

impl TryFrom<RouteCacheRow> for RouteCacheEntry {
    type Error = StoreError;

    fn try_from(row: RouteCacheRow) -> Result<Self, Self::Error> {
        let transport_type = row
            .transport_type
            .parse::<TransportType>()
            .map_err(StoreError::Corrupt)?;
        let created_at = DateTime::from_timestamp_millis(row.created_at).ok_or_else(|| {
            StoreError::Corrupt(format!("created_at out of range: {}", row.created_at))
        })?;

        Ok(RouteCacheEntry {
            route_key: RouteKey::from_stored(row.route_key),
            transport_type,
            origin: Coordinate {
                x: row.origin_x,
                y: row.origin_y,
            },
            destination: Coordinate {
                x: row.dest_x,
                y: row.dest_y,
            },
            route_data: serde_json::from_str(&row.route_data)?,
            created_at,
        })
    }
}

/// Durable route cache backed by a single SQLite table.
pub struct SqliteRouteCache {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteRouteCache {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    pub async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS route_cache (
                route_key TEXT NOT NULL,
                transport_type TEXT NOT NULL CHECK (transport_type IN ('WALK', 'TRANSIT')),
                origin_x REAL NOT NULL,
                origin_y REAL NOT NULL,
                dest_x REAL NOT NULL,
                dest_y REAL NOT NULL,
                route_data TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                PRIMARY KEY (route_key, transport_type)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_route_cache_created_at ON route_cache(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Rows created at or before this instant (epoch millis) are expired.
    fn cutoff_millis(&self) -> i64 {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        Utc::now().timestamp_millis().saturating_sub(ttl_ms)
    }
}

#[async_trait]
impl RouteCacheStore for SqliteRouteCache {
    async fn get(
        &self,
        route_key: &RouteKey,
        transport: TransportType,
    ) -> Result<Option<RouteCacheEntry>, StoreError> {
        let row = sqlx::query_as::<_, RouteCacheRow>(
            r#"
            SELECT route_key, transport_type, origin_x, origin_y, dest_x, dest_y,
                   route_data, created_at
            FROM route_cache
            WHERE route_key = ? AND transport_type = ? AND created_at > ?
            "#,
        )
        .bind(route_key.as_str())
        .bind(transport.as_str())
        .bind(self.cutoff_millis())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RouteCacheEntry::try_from).transpose()
    }

    async fn put(&self, entry: RouteCacheEntry) -> Result<PutOutcome, StoreError> {
        let route_data = serde_json::to_string(&entry.route_data)?;

        // An unswept expired row is replaced; a live one is never touched.
        let result = sqlx::query(
            r#"
            INSERT INTO route_cache (
                route_key, transport_type, origin_x, origin_y, dest_x, dest_y,
                route_data, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (route_key, transport_type) DO UPDATE SET
                origin_x = excluded.origin_x,
                origin_y = excluded.origin_y,
                dest_x = excluded.dest_x,
                dest_y = excluded.dest_y,
                route_data = excluded.route_data,
                created_at = excluded.created_at
            WHERE route_cache.created_at <= ?
            "#,
        )
        .bind(entry.route_key.as_str())
        .bind(entry.transport_type.as_str())
        .bind(entry.origin.x)
        .bind(entry.origin.y)
        .bind(entry.destination.x)
        .bind(entry.destination.y)
        .bind(route_data)
        .bind(entry.created_at.timestamp_millis())
        .bind(self.cutoff_millis())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(PutOutcome::Inserted);
        }

        // the conflicting row was live at the time of the upsert
        let existing = sqlx::query_as::<_, RouteCacheRow>(
            r#"
            SELECT route_key, transport_type, origin_x, origin_y, dest_x, dest_y,
                   route_data, created_at
            FROM route_cache
            WHERE route_key = ? AND transport_type = ?
            "#,
        )
        .bind(entry.route_key.as_str())
        .bind(entry.transport_type.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            StoreError::Corrupt(format!("route {} vanished during insert", entry.route_key))
        })?;

        Ok(PutOutcome::Kept(RouteCacheEntry::try_from(existing)?))
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM route_cache WHERE created_at <= ?")
            .bind(self.cutoff_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

type CacheIdentity = (RouteKey, TransportType);

/// Process-local route cache; moka enforces the TTL and the first-writer-wins insert.
pub struct MemoryRouteCache {
    entries: Cache<CacheIdentity, RouteCacheEntry>,
}

impl MemoryRouteCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl RouteCacheStore for MemoryRouteCache {
    async fn get(
        &self,
        route_key: &RouteKey,
        transport: TransportType,
    ) -> Result<Option<RouteCacheEntry>, StoreError> {
        Ok(self.entries.get(&(route_key.clone(), transport)).await)
    }

    async fn put(&self, entry: RouteCacheEntry) -> Result<PutOutcome, StoreError> {
        let identity = (entry.route_key.clone(), entry.transport_type);
        let stored = self
            .entries
            .entry(identity)
            .or_insert_with(async move { entry })
            .await;

        if stored.is_fresh() {
            Ok(PutOutcome::Inserted)
        } else {
            Ok(PutOutcome::Kept(stored.into_value()))
        }
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let before = self.entries.entry_count();
        self.entries.run_pending_tasks().await;
        Ok(before.saturating_sub(self.entries.entry_count()))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Periodically purges expired entries until the runtime shuts down.
pub fn spawn_expiry_sweep(store: Arc<dyn RouteCacheStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(Duration::from_secs(1)));
        loop {
            ticker.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "Purged expired route cache entries"),
                Err(e) => tracing::warn!("Route cache sweep failed: {}", e),
            }
        }
    })
}
