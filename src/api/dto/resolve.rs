//! DTOs for the resolve endpoint.

use serde::Serialize;

/// The long URL behind a short code.
#[derive(Debug, Serialize)]
pub struct ResolveResponse {
    pub code: String,
    pub long_url: String,
}
