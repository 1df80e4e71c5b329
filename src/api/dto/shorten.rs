//! DTOs for link shortening endpoints.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Request to shorten a URL, accepted as JSON or as a form body.
///
/// Only the size is checked here; the URL format is validated by the mapping
/// service so that every caller gets the same rules.
#[derive(Debug, Deserialize, Validate)]
pub struct ShortenRequest {
    #[validate(length(min = 1, max = 2048, message = "URL must be 1-2048 characters"))]
    pub url: String,
}

/// Successful shortening result.
#[derive(Debug, Serialize)]
pub struct ShortenResponse {
    pub long_url: String,
    pub code: String,
    pub short_url: String,
}
