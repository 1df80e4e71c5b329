//! Long URL format validation.
//!
//! Accepts absolute HTTP/HTTPS URLs whose host contains at least one dot and
//! ends in an alphabetic suffix of two or more characters, with an optional
//! whitespace-free path. The URL is never rewritten: what passes validation is
//! exactly what gets stored and later returned by resolution.

use regex::Regex;
use std::sync::LazyLock;

static LONG_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(http|https)://[a-zA-Z0-9\-\.]+\.[a-zA-Z]{2,}(/\S*)?$")
        .expect("long URL pattern is valid")
});

/// Reasons a long URL is rejected.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UrlValidationError {
    #[error("URL must not be empty")]
    Empty,

    #[error("Only HTTP and HTTPS protocols are allowed")]
    UnsupportedProtocol,

    #[error("Invalid URL format")]
    InvalidFormat,
}

/// Checks that `input` is a well-formed absolute HTTP/HTTPS URL.
///
/// # Examples
///
/// ```ignore
/// assert!(validate_long_url("http://example.com/path").is_ok());
/// assert!(validate_long_url("ftp://example.com").is_err());
/// assert!(validate_long_url("not-a-url").is_err());
/// ```
pub fn validate_long_url(input: &str) -> Result<(), UrlValidationError> {
    if input.is_empty() {
        return Err(UrlValidationError::Empty);
    }

    if LONG_URL_REGEX.is_match(input) {
        return Ok(());
    }

    match input.split_once("://") {
        Some((scheme, _))
            if !scheme.eq_ignore_ascii_case("http") && !scheme.eq_ignore_ascii_case("https") =>
        {
            Err(UrlValidationError::UnsupportedProtocol)
        }
        _ => Err(UrlValidationError::InvalidFormat),
    }
}
