//! Mapping entity: the persisted association between a short code and a long URL.

use chrono::{DateTime, Utc};

/// A completed short code to long URL mapping.
///
/// Both `code` and `long_url` are unique across the store and never change after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub id: i64,
    pub code: String,
    pub long_url: String,
    pub created_at: DateTime<Utc>,
}

impl Mapping {
    /// Creates a new Mapping instance.
    pub fn new(id: i64, code: String, long_url: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            code,
            long_url,
            created_at,
        }
    }
}

/// Input data for inserting a mapping with a pre-generated code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMapping {
    pub code: String,
    pub long_url: String,
    pub created_at: DateTime<Utc>,
}

/// A row whose id has been allocated but whose code was never set.
///
/// Left behind when the sequential strategy's second write does not happen.
/// Invisible to lookups until completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMapping {
    pub id: i64,
    pub long_url: String,
    pub created_at: DateTime<Utc>,
}
