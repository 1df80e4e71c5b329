use crate::error::UniqueKey;

/// Constraint names created by the `mappings` migration.
const CODE_CONSTRAINT: &str = "mappings_code_key";
const LONG_URL_CONSTRAINT: &str = "mappings_long_url_key";

/// Classifies a unique violation by the constraint it hit.
///
/// Returns `None` for any other error, including unique violations on
/// constraints this crate does not own.
pub fn unique_violation_key(e: &sqlx::Error) -> Option<UniqueKey> {
    let db_err = e.as_database_error()?;

    if !db_err.is_unique_violation() {
        return None;
    }

    match db_err.constraint() {
        Some(CODE_CONSTRAINT) => Some(UniqueKey::Code),
        Some(LONG_URL_CONSTRAINT) => Some(UniqueKey::LongUrl),
        _ => None,
    }
}
