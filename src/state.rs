//! Shared application state injected into every handler.

use std::sync::Arc;

use crate::application::services::MappingService;
use crate::domain::repositories::MappingRepository;

/// Service handles and settings shared across requests.
///
/// The repository behind the service is chosen once at startup, so handlers
/// work the same against PostgreSQL and the in-memory store.
#[derive(Clone)]
pub struct AppState {
    pub mapping_service: Arc<MappingService<dyn MappingRepository>>,
    /// Public prefix of short URLs, always ending in `/`.
    pub base_url: String,
}

impl AppState {
    pub fn new(
        mapping_service: Arc<MappingService<dyn MappingRepository>>,
        base_url: impl Into<String>,
    ) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Self {
            mapping_service,
            base_url,
        }
    }

    /// Builds the public short URL for `code`.
    pub fn short_url(&self, code: &str) -> String {
        format!("{}{}", self.base_url, code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::AllocationOptions;
    use crate::infrastructure::persistence::MemoryMappingRepository;

    fn service() -> Arc<MappingService<dyn MappingRepository>> {
        let repository: Arc<dyn MappingRepository> = Arc::new(MemoryMappingRepository::new());
        Arc::new(MappingService::new(repository, AllocationOptions::default()))
    }

    #[test]
    fn test_short_url_adds_missing_slash() {
        let state = AppState::new(service(), "https://s.example.com");

        assert_eq!(state.base_url, "https://s.example.com/");
        assert_eq!(state.short_url("aZ3k9Qx"), "https://s.example.com/aZ3k9Qx");
    }

    #[test]
    fn test_short_url_keeps_existing_slash() {
        let state = AppState::new(service(), "https://s.example.com/r/");

        assert_eq!(state.short_url("10"), "https://s.example.com/r/10");
    }
}
