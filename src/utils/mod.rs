//! Utility functions for code generation and request validation.
//!
//! - [`code_generator`] - Random and base-62 short code generation
//! - [`url_validator`] - Long URL format validation
//! - [`db_error`] - Classification of PostgreSQL unique violations

pub mod code_generator;
pub mod db_error;
pub mod url_validator;
