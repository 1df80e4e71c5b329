//! Handlers for link shortening endpoints.

use axum::{Form, Json, extract::State};
use validator::Validate;

use crate::api::dto::shorten::{ShortenRequest, ShortenResponse};
use crate::error::AppError;
use crate::state::AppState;

/// Creates (or returns the existing) short URL for a long URL.
///
/// # Endpoint
///
/// `POST /api/shorten`
///
/// # Request Body
///
/// ```json
/// { "url": "https://example.com/some/long/path" }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "long_url": "https://example.com/some/long/path",
///   "code": "aZ3k9Qx",
///   "short_url": "http://localhost:8080/aZ3k9Qx"
/// }
/// ```
///
/// Submitting the same URL again returns the same code.
///
/// # Errors
///
/// Returns 400 Bad Request if the URL is missing or malformed.
pub async fn shorten_handler(
    State(state): State<AppState>,
    Json(payload): Json<ShortenRequest>,
) -> Result<Json<ShortenResponse>, AppError> {
    payload.validate()?;

    let code = state.mapping_service.create(&payload.url).await?;
    let short_url = state.short_url(&code);

    Ok(Json(ShortenResponse {
        long_url: payload.url,
        code,
        short_url,
    }))
}

/// Form variant used by the bundled web page.
///
/// # Endpoint
///
/// `POST /shorten` with `application/x-www-form-urlencoded` field `url`.
///
/// Responds with the short URL as plain text.
pub async fn shorten_form_handler(
    State(state): State<AppState>,
    Form(payload): Form<ShortenRequest>,
) -> Result<String, AppError> {
    payload.validate()?;

    let code = state.mapping_service.create(&payload.url).await?;

    Ok(state.short_url(&code))
}
