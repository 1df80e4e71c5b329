//! Short code allocation and resolution service.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::domain::entities::{Mapping, NewMapping, PendingMapping};
use crate::domain::repositories::MappingRepository;
use crate::error::{AppError, UniqueKey};
use crate::utils::code_generator::{CodeStrategy, encode_base62, generate_code};
use crate::utils::url_validator::validate_long_url;

/// Default number of random codes tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default bound on a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Tunables for [`MappingService`].
#[derive(Debug, Clone, Copy)]
pub struct AllocationOptions {
    pub strategy: CodeStrategy,
    /// Random strategy only: codes tried before failing with [`AppError::Exhausted`].
    pub max_attempts: u32,
    /// Upper bound on every individual repository call.
    pub store_timeout: Duration,
}

impl Default for AllocationOptions {
    fn default() -> Self {
        Self {
            strategy: CodeStrategy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }
}

/// Service for creating and resolving short codes.
///
/// Holds no state besides the injected repository: every existence and
/// uniqueness decision is made by the store, and its unique constraints are the
/// final arbiter when concurrent creates race.
///
/// # Race policy
///
/// When two creates for the same long URL both miss the initial lookup, the
/// store accepts exactly one insert. The loser re-reads the store and returns
/// the winner's code instead of failing.
pub struct MappingService<R: MappingRepository + ?Sized> {
    repository: Arc<R>,
    options: AllocationOptions,
}

impl<R: MappingRepository + ?Sized> MappingService<R> {
    /// Creates a new mapping service.
    pub fn new(repository: Arc<R>, options: AllocationOptions) -> Self {
        Self {
            repository,
            options,
        }
    }

    /// Returns the allocation options this service was built with.
    pub fn options(&self) -> &AllocationOptions {
        &self.options
    }

    /// Returns the short code for `long_url`, allocating one if none exists.
    ///
    /// Repeated calls with the same URL return the same code.
    ///
    /// # Errors
    ///
    /// - [`AppError::InvalidInput`] if the URL is not an absolute HTTP/HTTPS URL
    /// - [`AppError::Exhausted`] if every random candidate was taken
    /// - [`AppError::Storage`] / [`AppError::Timeout`] if the store fails or is too slow
    pub async fn create(&self, long_url: &str) -> Result<String, AppError> {
        validate_long_url(long_url).map_err(|e| {
            AppError::invalid_input(e.to_string(), json!({ "url": long_url }))
        })?;

        if let Some(existing) = self
            .bounded("find_by_long_url", self.repository.find_by_long_url(long_url))
            .await?
        {
            debug!(code = %existing.code, "Long URL already mapped");
            return Ok(existing.code);
        }

        let mapping = match self.options.strategy {
            CodeStrategy::Random { length } => self.allocate_random(long_url, length).await?,
            CodeStrategy::Sequential => self.allocate_sequential(long_url).await?,
        };

        Ok(mapping.code)
    }

    /// Returns the long URL stored for `code`, unchanged.
    ///
    /// # Errors
    ///
    /// - [`AppError::NotFound`] if no mapping has this code
    /// - [`AppError::Storage`] / [`AppError::Timeout`] if the store fails or is too slow
    pub async fn resolve(&self, code: &str) -> Result<String, AppError> {
        self.bounded("find_by_code", self.repository.find_by_code(code))
            .await?
            .map(|mapping| mapping.long_url)
            .ok_or_else(|| AppError::not_found("Short code not found", json!({ "code": code })))
    }

    /// Counts completed mappings.
    pub async fn count(&self) -> Result<i64, AppError> {
        self.bounded("count", self.repository.count()).await
    }

    /// Counts rows whose sequential code was never written.
    pub async fn count_pending(&self) -> Result<i64, AppError> {
        self.bounded("count_pending", self.repository.count_pending())
            .await
    }

    /// Lists up to `limit` rows whose sequential code was never written.
    pub async fn list_pending(&self, limit: i64) -> Result<Vec<PendingMapping>, AppError> {
        self.bounded("list_pending", self.repository.list_pending(limit))
            .await
    }

    /// Writes the code of pending row `id`.
    ///
    /// The code is a pure function of the id, so completing a row that a
    /// concurrent caller is also completing is harmless.
    pub async fn complete_pending(&self, id: i64) -> Result<Mapping, AppError> {
        let sequence = u64::try_from(id).map_err(|_| {
            AppError::storage("Store returned a negative sequence id", json!({ "id": id }))
        })?;
        let code = encode_base62(sequence);

        match self
            .bounded("set_code", self.repository.set_code(id, &code))
            .await
        {
            Ok(mapping) => Ok(mapping),
            Err(e) if e.violated_key() == Some(UniqueKey::Code) => {
                tracing::error!(
                    id,
                    code = %code,
                    "Sequential code already held by another mapping"
                );
                Err(AppError::storage(
                    "Sequential code already held by another mapping",
                    json!({ "id": id, "code": code }),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Generates random codes until one can be inserted.
    ///
    /// A candidate is discarded when the lookup finds it taken or when the insert
    /// loses a race on the code constraint.
    async fn allocate_random(&self, long_url: &str, length: usize) -> Result<Mapping, AppError> {
        for attempt in 1..=self.options.max_attempts {
            let code = generate_code(length);

            if self
                .bounded("find_by_code", self.repository.find_by_code(&code))
                .await?
                .is_some()
            {
                counter!("shorturl_code_collisions_total").increment(1);
                debug!(attempt, code = %code, "Generated code already taken");
                continue;
            }

            let new_mapping = NewMapping {
                code,
                long_url: long_url.to_string(),
                created_at: Utc::now(),
            };

            match self
                .bounded("insert", self.repository.insert(new_mapping))
                .await
            {
                Ok(mapping) => {
                    counter!("shorturl_mappings_created_total").increment(1);
                    info!(code = %mapping.code, attempt, "Created mapping");
                    return Ok(mapping);
                }
                Err(e) => match e.violated_key() {
                    Some(UniqueKey::Code) => {
                        counter!("shorturl_code_collisions_total").increment(1);
                        debug!(attempt, "Insert lost a race on the generated code");
                    }
                    Some(UniqueKey::LongUrl) => return self.adopt_winner(long_url).await,
                    None => return Err(e),
                },
            }
        }

        warn!(
            attempts = self.options.max_attempts,
            "No free short code found"
        );
        Err(AppError::Exhausted {
            attempts: self.options.max_attempts,
        })
    }

    /// Two-phase allocation: reserve a row id, then write its base-62 code.
    async fn allocate_sequential(&self, long_url: &str) -> Result<Mapping, AppError> {
        let id = match self
            .bounded(
                "insert_pending",
                self.repository.insert_pending(long_url, Utc::now()),
            )
            .await
        {
            Ok(id) => id,
            Err(e) if e.violated_key() == Some(UniqueKey::LongUrl) => {
                return self.adopt_winner(long_url).await;
            }
            Err(e) => return Err(e),
        };

        let mapping = self.complete_pending(id).await?;
        counter!("shorturl_mappings_created_total").increment(1);
        info!(code = %mapping.code, id, "Created mapping");
        Ok(mapping)
    }

    /// Returns the mapping created by the concurrent writer that beat us to `long_url`.
    async fn adopt_winner(&self, long_url: &str) -> Result<Mapping, AppError> {
        counter!("shorturl_races_recovered_total").increment(1);

        if let Some(winner) = self
            .bounded("find_by_long_url", self.repository.find_by_long_url(long_url))
            .await?
        {
            info!(code = %winner.code, "Concurrent create won the race, reusing its code");
            return Ok(winner);
        }

        // The winner is a sequential row whose code is not written yet.
        if let Some(id) = self
            .bounded("find_pending", self.repository.find_pending(long_url))
            .await?
        {
            info!(id, "Completing pending row left by a concurrent create");
            return self.complete_pending(id).await;
        }

        // Completed between the two lookups above.
        self.bounded("find_by_long_url", self.repository.find_by_long_url(long_url))
            .await?
            .ok_or_else(|| {
                AppError::storage(
                    "Long URL conflicted but no row holds it",
                    json!({ "url": long_url }),
                )
            })
    }

    /// Runs a repository call under the configured timeout.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, AppError>>,
    ) -> Result<T, AppError> {
        match tokio::time::timeout(self.options.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                counter!("shorturl_store_timeouts_total").increment(1);
                warn!(
                    operation,
                    timeout_ms = self.options.store_timeout.as_millis() as u64,
                    "Store operation timed out"
                );
                Err(AppError::timeout(operation, self.options.store_timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::MockMappingRepository;
    use crate::utils::code_generator::ALPHABET;
    use async_trait::async_trait;
    use chrono::DateTime;

    fn mapping(id: i64, code: &str, url: &str) -> Mapping {
        Mapping::new(id, code.to_string(), url.to_string(), Utc::now())
    }

    fn random_options(max_attempts: u32) -> AllocationOptions {
        AllocationOptions {
            strategy: CodeStrategy::Random { length: 7 },
            max_attempts,
            store_timeout: Duration::from_secs(1),
        }
    }

    fn sequential_options() -> AllocationOptions {
        AllocationOptions {
            strategy: CodeStrategy::Sequential,
            ..random_options(1)
        }
    }

    #[tokio::test]
    async fn test_create_returns_existing_code() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_long_url()
            .withf(|url| url == "https://example.com")
            .times(1)
            .returning(|url| Ok(Some(mapping(5, "existing", url))));
        repo.expect_find_by_code().times(0);
        repo.expect_insert().times(0);

        let service = MappingService::new(Arc::new(repo), random_options(10));

        let code = service.create("https://example.com").await.unwrap();
        assert_eq!(code, "existing");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_urls_without_touching_store() {
        let service =
            MappingService::new(Arc::new(MockMappingRepository::new()), random_options(10));

        for url in ["not-a-url", "ftp://example.com", ""] {
            let err = service.create(url).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidInput { .. }), "{url}");
        }
    }

    #[tokio::test]
    async fn test_create_random_success() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_long_url().times(1).returning(|_| Ok(None));
        repo.expect_find_by_code().times(1).returning(|_| Ok(None));
        repo.expect_insert()
            .withf(|new| {
                new.long_url == "http://example.com/path"
                    && new.code.len() == 7
                    && new.code.bytes().all(|b| ALPHABET.contains(&b))
            })
            .times(1)
            .returning(|new| Ok(Mapping::new(1, new.code, new.long_url, new.created_at)));

        let service = MappingService::new(Arc::new(repo), random_options(10));

        let code = service.create("http://example.com/path").await.unwrap();
        assert_eq!(code.len(), 7);
    }

    #[tokio::test]
    async fn test_create_regenerates_code_taken_in_store() {
        let mut repo = MockMappingRepository::new();
        let taken = std::sync::Arc::new(std::sync::Mutex::new(None::<String>));

        repo.expect_find_by_long_url().times(1).returning(|_| Ok(None));

        let recorded = taken.clone();
        let mut lookups = 0;
        repo.expect_find_by_code().times(2).returning(move |code| {
            lookups += 1;
            if lookups == 1 {
                *recorded.lock().unwrap() = Some(code.to_string());
                Ok(Some(mapping(1, code, "https://other.com")))
            } else {
                Ok(None)
            }
        });

        let rejected = taken.clone();
        repo.expect_insert()
            .withf(move |new| rejected.lock().unwrap().as_deref() != Some(new.code.as_str()))
            .times(1)
            .returning(|new| Ok(Mapping::new(2, new.code, new.long_url, new.created_at)));

        let service = MappingService::new(Arc::new(repo), random_options(10));

        let code = service.create("https://example.com").await.unwrap();
        assert_ne!(Some(code), taken.lock().unwrap().clone());
    }

    #[tokio::test]
    async fn test_create_retries_when_insert_loses_code_race() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_long_url().times(1).returning(|_| Ok(None));
        repo.expect_find_by_code().times(2).returning(|_| Ok(None));

        let mut inserts = 0;
        repo.expect_insert().times(2).returning(move |new| {
            inserts += 1;
            if inserts == 1 {
                Err(AppError::uniqueness_violation(UniqueKey::Code, json!({})))
            } else {
                Ok(Mapping::new(3, new.code, new.long_url, new.created_at))
            }
        });

        let service = MappingService::new(Arc::new(repo), random_options(10));

        assert!(service.create("https://example.com").await.is_ok());
    }

    #[tokio::test]
    async fn test_create_exhausts_attempts() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_long_url().times(1).returning(|_| Ok(None));
        repo.expect_find_by_code()
            .times(3)
            .returning(|code| Ok(Some(mapping(1, code, "https://other.com"))));
        repo.expect_insert().times(0);

        let service = MappingService::new(Arc::new(repo), random_options(3));

        let err = service.create("https://example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Exhausted { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_create_returns_winner_code_after_long_url_race() {
        let mut repo = MockMappingRepository::new();

        let mut lookups = 0;
        repo.expect_find_by_long_url()
            .times(2)
            .returning(move |url| {
                lookups += 1;
                if lookups == 1 {
                    Ok(None)
                } else {
                    Ok(Some(mapping(9, "winner1", url)))
                }
            });
        repo.expect_find_by_code().times(1).returning(|_| Ok(None));
        repo.expect_insert()
            .times(1)
            .returning(|_| Err(AppError::uniqueness_violation(UniqueKey::LongUrl, json!({}))));

        let service = MappingService::new(Arc::new(repo), random_options(10));

        let code = service.create("https://example.com").await.unwrap();
        assert_eq!(code, "winner1");
    }

    #[tokio::test]
    async fn test_create_surfaces_storage_error_without_retry() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_long_url().times(1).returning(|_| Ok(None));
        repo.expect_find_by_code().times(1).returning(|_| Ok(None));
        repo.expect_insert()
            .times(1)
            .returning(|_| Err(AppError::storage("Database error", json!({}))));

        let service = MappingService::new(Arc::new(repo), random_options(10));

        let err = service.create("https://example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_create_sequential_encodes_row_id() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_long_url().times(1).returning(|_| Ok(None));
        repo.expect_insert_pending()
            .withf(|url, _| url == "https://example.com")
            .times(1)
            .returning(|_, _| Ok(62));
        repo.expect_set_code()
            .withf(|id, code| *id == 62 && code == "10")
            .times(1)
            .returning(|id, code| Ok(mapping(id, code, "https://example.com")));
        repo.expect_find_by_code().times(0);

        let service = MappingService::new(Arc::new(repo), sequential_options());

        assert_eq!(service.create("https://example.com").await.unwrap(), "10");
    }

    #[tokio::test]
    async fn test_create_sequential_completes_pending_winner() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_long_url()
            .times(2)
            .returning(|_| Ok(None));
        repo.expect_insert_pending()
            .times(1)
            .returning(|_, _| Err(AppError::uniqueness_violation(UniqueKey::LongUrl, json!({}))));
        repo.expect_find_pending().times(1).returning(|_| Ok(Some(7)));
        repo.expect_set_code()
            .withf(|id, code| *id == 7 && code == "7")
            .times(1)
            .returning(|id, code| Ok(mapping(id, code, "https://example.com")));

        let service = MappingService::new(Arc::new(repo), sequential_options());

        assert_eq!(service.create("https://example.com").await.unwrap(), "7");
    }

    #[tokio::test]
    async fn test_create_sequential_winner_completed_between_lookups() {
        let mut repo = MockMappingRepository::new();

        let mut lookups = 0;
        repo.expect_find_by_long_url()
            .times(3)
            .returning(move |url| {
                lookups += 1;
                if lookups < 3 {
                    Ok(None)
                } else {
                    Ok(Some(mapping(4, "4", url)))
                }
            });
        repo.expect_insert_pending()
            .times(1)
            .returning(|_, _| Err(AppError::uniqueness_violation(UniqueKey::LongUrl, json!({}))));
        repo.expect_find_pending().times(1).returning(|_| Ok(None));
        repo.expect_set_code().times(0);

        let service = MappingService::new(Arc::new(repo), sequential_options());

        assert_eq!(service.create("https://example.com").await.unwrap(), "4");
    }

    #[tokio::test]
    async fn test_complete_pending_reports_foreign_code_as_storage_error() {
        let mut repo = MockMappingRepository::new();

        repo.expect_set_code()
            .times(1)
            .returning(|_, _| Err(AppError::uniqueness_violation(UniqueKey::Code, json!({}))));

        let service = MappingService::new(Arc::new(repo), sequential_options());

        let err = service.complete_pending(1).await.unwrap_err();
        assert!(matches!(err, AppError::Storage { .. }));
    }

    #[tokio::test]
    async fn test_resolve_found() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_code()
            .withf(|code| code == "abc1234")
            .times(1)
            .returning(|code| Ok(Some(mapping(1, code, "https://example.com/Path?q=1"))));

        let service = MappingService::new(Arc::new(repo), random_options(10));

        assert_eq!(
            service.resolve("abc1234").await.unwrap(),
            "https://example.com/Path?q=1"
        );
    }

    #[tokio::test]
    async fn test_resolve_not_found() {
        let mut repo = MockMappingRepository::new();

        repo.expect_find_by_code().times(1).returning(|_| Ok(None));

        let service = MappingService::new(Arc::new(repo), random_options(10));

        let err = service.resolve("zzzzzzz").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { .. }));
    }

    /// Repository whose lookups never finish in time.
    struct StalledRepository;

    #[async_trait]
    impl MappingRepository for StalledRepository {
        async fn find_by_long_url(&self, _: &str) -> Result<Option<Mapping>, AppError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
        async fn find_by_code(&self, _: &str) -> Result<Option<Mapping>, AppError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(None)
        }
        async fn insert(&self, _: NewMapping) -> Result<Mapping, AppError> {
            unreachable!("lookups stall first")
        }
        async fn insert_pending(&self, _: &str, _: DateTime<Utc>) -> Result<i64, AppError> {
            unreachable!("lookups stall first")
        }
        async fn find_pending(&self, _: &str) -> Result<Option<i64>, AppError> {
            unreachable!("lookups stall first")
        }
        async fn set_code(&self, _: i64, _: &str) -> Result<Mapping, AppError> {
            unreachable!("lookups stall first")
        }
        async fn list_pending(&self, _: i64) -> Result<Vec<PendingMapping>, AppError> {
            unreachable!("lookups stall first")
        }
        async fn count(&self) -> Result<i64, AppError> {
            unreachable!("lookups stall first")
        }
        async fn count_pending(&self) -> Result<i64, AppError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_store_calls_time_out() {
        let options = AllocationOptions {
            store_timeout: Duration::from_millis(20),
            ..random_options(10)
        };
        let service = MappingService::new(Arc::new(StalledRepository), options);

        let err = service.create("https://example.com").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Timeout {
                operation: "find_by_long_url",
                ..
            }
        ));

        let err = service.resolve("abc1234").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Timeout {
                operation: "find_by_code",
                ..
            }
        ));

        let err = service.count_pending().await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Timeout {
                operation: "count_pending",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_count_pending() {
        let mut repo = MockMappingRepository::new();

        repo.expect_count_pending().times(1).returning(|| Ok(3));
        repo.expect_list_pending().times(0);

        let service = MappingService::new(Arc::new(repo), sequential_options());

        assert_eq!(service.count_pending().await.unwrap(), 3);
    }
}
