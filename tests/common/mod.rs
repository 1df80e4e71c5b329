#![allow(dead_code)]

use shorturl::application::services::{AllocationOptions, MappingService};
use shorturl::domain::repositories::MappingRepository;
use shorturl::infrastructure::persistence::MemoryMappingRepository;
use shorturl::state::AppState;
use std::sync::Arc;

pub const BASE_URL: &str = "http://sho.rt/";

pub fn create_test_service(
    options: AllocationOptions,
) -> Arc<MappingService<dyn MappingRepository>> {
    let repository: Arc<dyn MappingRepository> = Arc::new(MemoryMappingRepository::new());
    Arc::new(MappingService::new(repository, options))
}

pub fn create_test_state() -> AppState {
    create_test_state_with(AllocationOptions::default())
}

pub fn create_test_state_with(options: AllocationOptions) -> AppState {
    AppState::new(create_test_service(options), BASE_URL)
}
