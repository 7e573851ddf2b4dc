// /////////////////////////////////////////////////////////////////////////////
// Privacy-Preserving Pipeline Orchestrator
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # SQLite Context Store
//!
//! Persists requests keyed by content hash, with two flattened type-set
//! columns supporting the AND/OR lookups the k-map jobs need. Each type
//! tag is stored delimiter-wrapped (`|tag|`) so substring matching cannot
//! produce false positives between tags that contain each other.
//!
//! `record` is an upsert by hash: writing the same content twice is
//! idempotent, and the flattened columns are recomputed on every write so
//! type additions propagate to later lookups.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::str::FromStr;

use anonymizer_domain::entities::{ComponentContainer, Request};
use anonymizer_domain::repositories::ContextStore;
use anonymizer_domain::PipelineError;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS requests (
    hash TEXT PRIMARY KEY,
    json TEXT NOT NULL,
    component_types TEXT NOT NULL,
    request_types TEXT NOT NULL
)
"#;

/// Context store on a SQLite database.
pub struct SqliteContextStore {
    pool: SqlitePool,
}

impl SqliteContextStore {
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
        Ok(SqliteContextStore { pool })
    }

    /// Flattens a type set into its delimiter-wrapped column form.
    fn flatten<'a, I: IntoIterator<Item = &'a String>>(types: I) -> String {
        let mut flattened = String::new();
        for t in types {
            flattened.push('|');
            flattened.push_str(t);
            flattened.push('|');
        }
        flattened
    }

    /// Builds one `INSTR`-based filter group over a flattened column.
    fn filter_group(column: &str, types: &[String], all: bool) -> (String, Vec<String>) {
        let joiner = if all { " AND " } else { " OR " };
        let clauses: Vec<String> = types
            .iter()
            .map(|_| format!("INSTR({}, ?) > 0", column))
            .collect();
        let values: Vec<String> = types.iter().map(|t| format!("|{}|", t)).collect();
        (clauses.join(joiner), values)
    }
}

#[async_trait]
impl ContextStore for SqliteContextStore {
    async fn lookup(
        &self,
        data_types: &[String],
        data_types_all: bool,
        request_types: Option<&[String]>,
        request_types_all: bool,
    ) -> Result<Vec<Request>, PipelineError> {
        let mut groups: Vec<String> = Vec::new();
        let mut bindings: Vec<String> = Vec::new();

        if !data_types.is_empty() {
            let (clause, values) = Self::filter_group("component_types", data_types, data_types_all);
            groups.push(format!("({})", clause));
            bindings.extend(values);
        }
        if let Some(request_types) = request_types {
            if !request_types.is_empty() {
                let (clause, values) = Self::filter_group("request_types", request_types, request_types_all);
                groups.push(format!("({})", clause));
                bindings.extend(values);
            }
        }

        let query = if groups.is_empty() {
            "SELECT json FROM requests".to_string()
        } else {
            format!("SELECT json FROM requests WHERE {}", groups.join(" OR "))
        };

        let mut prepared = sqlx::query(&query);
        for value in &bindings {
            prepared = prepared.bind(value);
        }
        let rows = prepared
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PipelineError::DatabaseError(format!("Context lookup failed: {}", e)))?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let json: String = row
                .try_get("json")
                .map_err(|e| PipelineError::DatabaseError(format!("Context row lacks json: {}", e)))?;
            let request: Request = serde_json::from_str(&json)
                .map_err(|e| PipelineError::SerializationError(format!("Stored request is corrupt: {}", e)))?;
            requests.push(request);
        }
        Ok(requests)
    }

    async fn record(&self, request: &Request) -> Result<bool, PipelineError> {
        let hash = request.to_hash()?;
        let json = serde_json::to_string(&serde_json::to_value(request)?)?;
        let component_types = Self::flatten(&request.types_one());
        let request_types = Self::flatten(request.types());

        sqlx::query(
            "INSERT OR REPLACE INTO requests (hash, json, component_types, request_types) VALUES (?, ?, ?, ?)",
        )
        .bind(hash.as_str())
        .bind(&json)
        .bind(&component_types)
        .bind(&request_types)
        .execute(&self.pool)
        .await
        .map_err(|e| PipelineError::DatabaseError(format!("Context record failed: {}", e)))?;
        Ok(true)
    }
}
