//! Repository trait for mapping storage.

use crate::domain::entities::{Mapping, NewMapping, PendingMapping};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Storage contract for mappings.
///
/// The store is the sole authority on uniqueness: implementations must reject a
/// second row with the same `code` or the same `long_url` atomically with the
/// insert, reporting [`AppError::UniquenessViolation`] with the offending key.
///
/// Rows created by [`Self::insert_pending`] have no code yet. Every lookup
/// returning a [`Mapping`] must skip them.
///
/// # Implementations
///
/// - [`crate::infrastructure::persistence::PgMappingRepository`] - PostgreSQL implementation
/// - [`crate::infrastructure::persistence::MemoryMappingRepository`] - In-process implementation
/// - Test mocks available with `cfg(test)`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MappingRepository: Send + Sync {
    /// Finds a completed mapping by exact long URL.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] on database errors.
    async fn find_by_long_url(&self, long_url: &str) -> Result<Option<Mapping>, AppError>;

    /// Finds a completed mapping by short code.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`] on database errors.
    async fn find_by_code(&self, code: &str) -> Result<Option<Mapping>, AppError>;

    /// Inserts a mapping with a pre-generated code.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UniquenessViolation`] if the code or the long URL is taken.
    /// Returns [`AppError::Storage`] on database errors.
    async fn insert(&self, new_mapping: NewMapping) -> Result<Mapping, AppError>;

    /// Inserts a row without a code and returns its sequence id.
    ///
    /// Ids are strictly increasing and never reused.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::UniquenessViolation`] with [`crate::error::UniqueKey::LongUrl`]
    /// if any row, pending or not, already holds the long URL.
    async fn insert_pending(
        &self,
        long_url: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64, AppError>;

    /// Returns the id of the pending row holding `long_url`, if any.
    async fn find_pending(&self, long_url: &str) -> Result<Option<i64>, AppError>;

    /// Sets the code of row `id`, completing it.
    ///
    /// Idempotent: setting the same code on an already completed row succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::NotFound`] if the row does not exist or holds a different code.
    /// Returns [`AppError::UniquenessViolation`] if another row holds the code.
    async fn set_code(&self, id: i64, code: &str) -> Result<Mapping, AppError>;

    /// Lists up to `limit` pending rows, oldest first.
    async fn list_pending(&self, limit: i64) -> Result<Vec<PendingMapping>, AppError>;

    /// Counts completed mappings.
    async fn count(&self) -> Result<i64, AppError>;

    /// Counts rows still waiting for their code.
    async fn count_pending(&self) -> Result<i64, AppError>;
}
