// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Audit Store
//!
//! Timestamp-ordered audit records (sorted-set semantics): log, remove,
//! update-in-place and range retrieval. A snapshot of each inbound payload
//! is logged before its pipeline runs; sink jobs update the record with
//! the publication outcome afterwards.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::str::FromStr;

use anonymizer_domain::repositories::audit_store::{AuditStore, AuditUpdate};
use anonymizer_domain::PipelineError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audits (
    timestamp REAL NOT NULL,
    body TEXT NOT NULL
)
"#;

/// Audit store on a SQLite database.
pub struct SqliteAuditStore {
    pool: SqlitePool,
}

impl SqliteAuditStore {
    /// Opens (and creates, if missing) the database at `path`.
    pub async fn connect(path: &str) -> Result<Self, PipelineError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| PipelineError::DatabaseError(format!("Invalid SQLite path {}: {}", path, e)))?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| PipelineError::DatabaseError(format!("Failed to connect to database: {}", e)))?;
        Self::with_pool(pool).await
    }

    /// An in-memory database, useful for testing.
    ///
    /// Pinned to a single connection: every pooled connection would
    /// otherwise open its own empty `:memory:` database.
    pub async fn in_memory() -> Result<Self, PipelineError> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .map_err(|e| PipelineError::DatabaseError(format!("Failed to create in-memory database: {}", e)))?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, PipelineError> {
        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(format!("Failed to create table: {}", e)))?;
        Ok(SqliteAuditStore { pool })
    }

    fn now() -> f64 {
        let now = Utc::now();
        now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1_000_000.0
    }
}

#[async_trait]
impl AuditStore for SqliteAuditStore {
    async fn log(&self, audit: Value, timestamp: Option<f64>) -> Result<f64, PipelineError> {
        let timestamp = timestamp.unwrap_or_else(Self::now);
        let body = serde_json::to_string(&audit)?;
        sqlx::query("INSERT INTO audits (timestamp, body) VALUES (?, ?)")
            .bind(timestamp)
            .bind(&body)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(format!("Audit log failed: {}", e)))?;
        Ok(timestamp)
    }

    async fn remove(&self, timestamp: f64) -> Result<Option<Value>, PipelineError> {
        let rows = sqlx::query("SELECT rowid, body FROM audits WHERE timestamp = ?")
            .bind(timestamp)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(format!("Audit select failed: {}", e)))?;
        // Ambiguous timestamps are left untouched.
        if rows.len() != 1 {
            return Ok(None);
        }
        let rowid: i64 = rows[0]
            .try_get("rowid")
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        let body: String = rows[0]
            .try_get("body")
            .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
        sqlx::query("DELETE FROM audits WHERE rowid = ?")
            .bind(rowid)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(format!("Audit delete failed: {}", e)))?;
        let audit: Value = serde_json::from_str(&body)
            .map_err(|e| PipelineError::SerializationError(format!("Stored audit is corrupt: {}", e)))?;
        Ok(Some(audit))
    }

    async fn update(&self, timestamp: f64, update: AuditUpdate) -> Result<bool, PipelineError> {
        let Some(audit) = self.remove(timestamp).await? else {
            return Ok(false);
        };
        let updated = update(audit);
        self.log(updated, Some(timestamp)).await?;
        Ok(true)
    }

    async fn audits(
        &self,
        from: Option<DateTime<Utc>>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Value>, PipelineError> {
        let from = from.unwrap_or_else(Utc::now);
        let rows = sqlx::query(
            "SELECT body FROM audits WHERE timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC",
        )
        .bind(from.timestamp() as f64)
        .bind(until.timestamp() as f64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PipelineError::DatabaseError(format!("Audit range query failed: {}", e)))?;

        let mut audits = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row
                .try_get("body")
                .map_err(|e| PipelineError::DatabaseError(e.to_string()))?;
            audits.push(
                serde_json::from_str(&body)
                    .map_err(|e| PipelineError::SerializationError(format!("Stored audit is corrupt: {}", e)))?,
            );
        }
        Ok(audits)
    }
}

/// Audit store that keeps nothing.
///
/// Installed when no audit database is configured; updates report "not
/// found" so sink jobs proceed without audit trails.
#[derive(Debug, Default, Clone)]
pub struct NoAuditStore;

#[async_trait]
impl AuditStore for NoAuditStore {
    async fn log(&self, _audit: Value, timestamp: Option<f64>) -> Result<f64, PipelineError> {
        Ok(timestamp.unwrap_or_else(SqliteAuditStore::now))
    }

    async fn remove(&self, _timestamp: f64) -> Result<Option<Value>, PipelineError> {
        Ok(None)
    }

    async fn update(&self, _timestamp: f64, _update: AuditUpdate) -> Result<bool, PipelineError> {
        Ok(false)
    }

    async fn audits(
        &self,
        _from: Option<DateTime<Utc>>,
        _until: DateTime<Utc>,
    ) -> Result<Vec<Value>, PipelineError> {
        Ok(Vec::new())
    }
}
