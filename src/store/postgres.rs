//! PostgreSQL store backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{debug, info};

use super::{BatchCounts, Store};
use crate::config::DatabaseConfig;
use crate::model::{Category, Cursor};

const ACQUIRE_TIMEOUT_SECS: u64 = 10;

/// Schema statements, applied one by one (prepared statements cannot batch commands).
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS malware_signatures (
        id BIGSERIAL PRIMARY KEY,
        signature TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS yara_rules (
        id BIGSERIAL PRIMARY KEY,
        rule TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS blacklisted_ip_addresses (
        id BIGSERIAL PRIMARY KEY,
        ip_address TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS database_update_log (
        id BIGSERIAL PRIMARY KEY,
        last_update TIMESTAMPTZ NOT NULL
    )",
];

/// PostgreSQL-backed store.
///
/// Table and column names only ever come from [`Category`], so the SQL built
/// with `format!` below never contains external input.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a pool using the configured credentials.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(config.password.as_str());

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database '{}' at {}:{}",
                    config.name, config.host, config.port
                )
            })?;

        info!(
            database = %config.name,
            host = %config.host,
            port = config.port,
            "Connected to PostgreSQL"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn insert_sql(category: Category) -> String {
    format!(
        "INSERT INTO {table} ({col}) SELECT v FROM UNNEST($1::text[]) AS t(v) \
         ON CONFLICT ({col}) DO NOTHING",
        table = category.table(),
        col = category.column()
    )
}

fn delete_sql(category: Category) -> String {
    format!(
        "DELETE FROM {table} WHERE {col} = ANY($1)",
        table = category.table(),
        col = category.column()
    )
}

#[async_trait]
impl Store for PgStore {
    async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to apply schema")?;
        }
        debug!("Schema up to date");
        Ok(())
    }

    async fn list(&self, category: Category) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT {col} FROM {table} ORDER BY {col} COLLATE \"C\"",
            col = category.column(),
            table = category.table()
        );
        sqlx::query_scalar::<_, String>(&sql)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to list {}", category))
    }

    async fn list_ips(&self) -> Result<Vec<String>> {
        self.list(Category::BlacklistedIps).await
    }

    async fn count(&self, category: Category) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", category.table());
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count {}", category))?;
        Ok(count.max(0) as u64)
    }

    async fn insert_many(&self, category: Category, values: &[String]) -> Result<u64> {
        // A single statement is one atomic batch
        let result = sqlx::query(&insert_sql(category))
            .bind(values)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to insert {} rows into {}", values.len(), category))?;
        Ok(result.rows_affected())
    }

    async fn delete_many(&self, category: Category, values: &[String]) -> Result<u64> {
        let result = sqlx::query(&delete_sql(category))
            .bind(values)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete {} rows from {}", values.len(), category))?;
        Ok(result.rows_affected())
    }

    async fn apply_batch(
        &self,
        category: Category,
        to_remove: &[String],
        to_insert: &[String],
    ) -> Result<BatchCounts> {
        let mut counts = BatchCounts::default();
        // Dropped without commit on any early return, which rolls back
        let mut tx = self
            .pool
            .begin()
            .await
            .with_context(|| format!("Failed to open transaction for {}", category))?;

        if !to_remove.is_empty() {
            counts.removed = sqlx::query(&delete_sql(category))
                .bind(to_remove)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!("Failed to delete {} rows from {}", to_remove.len(), category)
                })?
                .rows_affected();
        }

        if !to_insert.is_empty() {
            counts.inserted = sqlx::query(&insert_sql(category))
                .bind(to_insert)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!("Failed to insert {} rows into {}", to_insert.len(), category)
                })?
                .rows_affected();
        }

        tx.commit()
            .await
            .with_context(|| format!("Failed to commit batch for {}", category))?;
        Ok(counts)
    }

    async fn read_cursor(&self) -> Result<Option<Cursor>> {
        // MAX rather than "latest row" so an out-of-order insert can never regress it
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(last_update) FROM database_update_log")
                .fetch_one(&self.pool)
                .await
                .context("Failed to read update cursor")?;
        Ok(latest.map(Cursor::new))
    }

    async fn advance_cursor(&self, now: Cursor) -> Result<()> {
        sqlx::query("INSERT INTO database_update_log (last_update) VALUES ($1)")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .context("Failed to advance update cursor")?;
        Ok(())
    }
}
