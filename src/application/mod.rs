//! Application layer services implementing business logic.
//!
//! Services orchestrate repository calls, validation and code generation, and
//! provide a clean API for HTTP handlers and the admin CLI.
//!
//! - [`services::mapping_service::MappingService`] - Short code allocation and resolution

pub mod services;
