//! PostgreSQL implementation of mapping repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::entities::{Mapping, NewMapping, PendingMapping};
use crate::domain::repositories::MappingRepository;
use crate::error::AppError;

#[derive(sqlx::FromRow)]
struct MappingRow {
    id: i64,
    code: String,
    long_url: String,
    created_at: DateTime<Utc>,
}

impl From<MappingRow> for Mapping {
    fn from(r: MappingRow) -> Self {
        Mapping::new(r.id, r.code, r.long_url, r.created_at)
    }
}

#[derive(sqlx::FromRow)]
struct PendingRow {
    id: i64,
    long_url: String,
    created_at: DateTime<Utc>,
}

/// PostgreSQL repository for mapping storage and retrieval.
///
/// Uniqueness is enforced by the `mappings_code_key` and `mappings_long_url_key`
/// constraints; violations surface as [`AppError::UniquenessViolation`] through
/// `From<sqlx::Error>`.
pub struct PgMappingRepository {
    pool: Arc<PgPool>,
}

impl PgMappingRepository {
    /// Creates a new repository with a database connection pool.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MappingRepository for PgMappingRepository {
    async fn find_by_long_url(&self, long_url: &str) -> Result<Option<Mapping>, AppError> {
        let row = sqlx::query_as::<_, MappingRow>(
            r#"
            SELECT id, code, long_url, created_at
            FROM mappings
            WHERE long_url = $1 AND code IS NOT NULL
            "#,
        )
        .bind(long_url)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Mapping::from))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Mapping>, AppError> {
        let row = sqlx::query_as::<_, MappingRow>(
            r#"
            SELECT id, code, long_url, created_at
            FROM mappings
            WHERE code = $1
            "#,
        )
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Mapping::from))
    }

    async fn insert(&self, new_mapping: NewMapping) -> Result<Mapping, AppError> {
        let row = sqlx::query_as::<_, MappingRow>(
            r#"
            INSERT INTO mappings (code, long_url, created_at)
            VALUES ($1, $2, $3)
            RETURNING id, code, long_url, created_at
            "#,
        )
        .bind(&new_mapping.code)
        .bind(&new_mapping.long_url)
        .bind(new_mapping.created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(row.into())
    }

    async fn insert_pending(
        &self,
        long_url: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO mappings (long_url, created_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(long_url)
        .bind(created_at)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    async fn find_pending(&self, long_url: &str) -> Result<Option<i64>, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM mappings WHERE long_url = $1 AND code IS NULL",
        )
        .bind(long_url)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    async fn set_code(&self, id: i64, code: &str) -> Result<Mapping, AppError> {
        let row = sqlx::query_as::<_, MappingRow>(
            r#"
            UPDATE mappings
            SET code = $2
            WHERE id = $1 AND (code IS NULL OR code = $2)
            RETURNING id, code, long_url, created_at
            "#,
        )
        .bind(id)
        .bind(code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(Mapping::from).ok_or_else(|| {
            AppError::not_found(
                "No pending row accepts this code",
                json!({ "id": id, "code": code }),
            )
        })
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<PendingMapping>, AppError> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r#"
            SELECT id, long_url, created_at
            FROM mappings
            WHERE code IS NULL
            ORDER BY id
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PendingMapping {
                id: r.id,
                long_url: r.long_url,
                created_at: r.created_at,
            })
            .collect())
    }

    async fn count(&self) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM mappings WHERE code IS NOT NULL")
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(count)
    }

    async fn count_pending(&self) -> Result<i64, AppError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM mappings WHERE code IS NULL")
                .fetch_one(self.pool.as_ref())
                .await?;

        Ok(count)
    }
}
