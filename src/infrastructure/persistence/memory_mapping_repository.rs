//! In-process implementation of mapping repository.
//!
//! Backs `STORAGE_BACKEND=memory` and the HTTP integration tests. All state sits
//! behind one lock so that both uniqueness checks and the write happen atomically,
//! mirroring what the PostgreSQL constraints provide.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use crate::domain::entities::{Mapping, NewMapping, PendingMapping};
use crate::domain::repositories::MappingRepository;
use crate::error::{AppError, UniqueKey};

#[derive(Debug, Clone)]
struct Row {
    code: Option<String>,
    long_url: String,
    created_at: DateTime<Utc>,
}

impl Row {
    fn to_mapping(&self, id: i64) -> Option<Mapping> {
        self.code
            .as_ref()
            .map(|code| Mapping::new(id, code.clone(), self.long_url.clone(), self.created_at))
    }
}

#[derive(Debug, Default)]
struct Inner {
    last_id: i64,
    rows: BTreeMap<i64, Row>,
    by_code: HashMap<String, i64>,
    by_long_url: HashMap<String, i64>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn check_long_url_free(&self, long_url: &str) -> Result<(), AppError> {
        if self.by_long_url.contains_key(long_url) {
            return Err(AppError::uniqueness_violation(
                UniqueKey::LongUrl,
                json!({ "long_url": long_url }),
            ));
        }
        Ok(())
    }

    fn check_code_free(&self, code: &str) -> Result<(), AppError> {
        if self.by_code.contains_key(code) {
            return Err(AppError::uniqueness_violation(
                UniqueKey::Code,
                json!({ "code": code }),
            ));
        }
        Ok(())
    }
}

/// Mapping repository holding everything in memory.
///
/// Ids start at 1 and are never reused, matching a `BIGSERIAL` column.
#[derive(Debug, Default)]
pub struct MemoryMappingRepository {
    inner: Mutex<Inner>,
}

impl MemoryMappingRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MappingRepository for MemoryMappingRepository {
    async fn find_by_long_url(&self, long_url: &str) -> Result<Option<Mapping>, AppError> {
        let inner = self.inner.lock().await;

        Ok(inner
            .by_long_url
            .get(long_url)
            .and_then(|id| inner.rows.get(id).and_then(|row| row.to_mapping(*id))))
    }

    async fn find_by_code(&self, code: &str) -> Result<Option<Mapping>, AppError> {
        let inner = self.inner.lock().await;

        Ok(inner
            .by_code
            .get(code)
            .and_then(|id| inner.rows.get(id).and_then(|row| row.to_mapping(*id))))
    }

    async fn insert(&self, new_mapping: NewMapping) -> Result<Mapping, AppError> {
        let mut inner = self.inner.lock().await;

        inner.check_code_free(&new_mapping.code)?;
        inner.check_long_url_free(&new_mapping.long_url)?;

        let id = inner.next_id();
        inner.by_code.insert(new_mapping.code.clone(), id);
        inner.by_long_url.insert(new_mapping.long_url.clone(), id);
        inner.rows.insert(
            id,
            Row {
                code: Some(new_mapping.code.clone()),
                long_url: new_mapping.long_url.clone(),
                created_at: new_mapping.created_at,
            },
        );

        Ok(Mapping::new(
            id,
            new_mapping.code,
            new_mapping.long_url,
            new_mapping.created_at,
        ))
    }

    async fn insert_pending(
        &self,
        long_url: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let mut inner = self.inner.lock().await;

        inner.check_long_url_free(long_url)?;

        let id = inner.next_id();
        inner.by_long_url.insert(long_url.to_string(), id);
        inner.rows.insert(
            id,
            Row {
                code: None,
                long_url: long_url.to_string(),
                created_at,
            },
        );

        Ok(id)
    }

    async fn find_pending(&self, long_url: &str) -> Result<Option<i64>, AppError> {
        let inner = self.inner.lock().await;

        Ok(inner
            .by_long_url
            .get(long_url)
            .copied()
            .filter(|id| inner.rows.get(id).is_some_and(|row| row.code.is_none())))
    }

    async fn set_code(&self, id: i64, code: &str) -> Result<Mapping, AppError> {
        let mut inner = self.inner.lock().await;

        let not_found = || {
            AppError::not_found(
                "No pending row accepts this code",
                json!({ "id": id, "code": code }),
            )
        };

        let current = inner.rows.get(&id).ok_or_else(not_found)?.code.clone();
        match current {
            Some(existing) if existing == code => {}
            Some(_) => return Err(not_found()),
            None => {
                inner.check_code_free(code)?;
                inner.by_code.insert(code.to_string(), id);
                if let Some(row) = inner.rows.get_mut(&id) {
                    row.code = Some(code.to_string());
                }
            }
        }

        inner
            .rows
            .get(&id)
            .and_then(|row| row.to_mapping(id))
            .ok_or_else(not_found)
    }

    async fn list_pending(&self, limit: i64) -> Result<Vec<PendingMapping>, AppError> {
        let inner = self.inner.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);

        Ok(inner
            .rows
            .iter()
            .filter(|(_, row)| row.code.is_none())
            .take(limit)
            .map(|(id, row)| PendingMapping {
                id: *id,
                long_url: row.long_url.clone(),
                created_at: row.created_at,
            })
            .collect())
    }

    async fn count(&self) -> Result<i64, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.by_code.len() as i64)
    }

    async fn count_pending(&self) -> Result<i64, AppError> {
        let inner = self.inner.lock().await;
        Ok((inner.rows.len() - inner.by_code.len()) as i64)
    }
}
