//! Short code generation.
//!
//! Two strategies share one 62-character alphabet:
//!
//! - **Random** ([`generate_code`]): uniform draw from the alphabet. Collisions are
//!   possible, so callers must check the store and retry.
//! - **Sequential** ([`encode_base62`]): positional base-62 encoding of a
//!   store-assigned sequence number. Injective, so no retry is needed.

use crate::error::AppError;
use rand::Rng;
use serde_json::json;

/// Code alphabet in digit order: `0-9`, `A-Z`, `a-z`.
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: u64 = ALPHABET.len() as u64;

/// Default length of randomly generated codes.
pub const DEFAULT_CODE_LENGTH: usize = 7;

/// How new codes are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStrategy {
    /// Random `length`-character codes checked against the store.
    Random { length: usize },
    /// Base-62 encoding of the row id assigned by the store.
    Sequential,
}

impl Default for CodeStrategy {
    fn default() -> Self {
        Self::Random {
            length: DEFAULT_CODE_LENGTH,
        }
    }
}

/// Generates a random code of `length` characters.
///
/// Uses the thread-local OS-seeded generator, so every call draws fresh entropy.
/// The result is NOT guaranteed to be unused.
///
/// ```ignore
/// let code = generate_code(7);
/// assert_eq!(code.len(), 7);
/// assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
pub fn generate_code(length: usize) -> String {
    let mut rng = rand::rng();

    (0..length)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Encodes a non-negative integer in base 62, most significant digit first.
///
/// `0` encodes to `"0"`.
pub fn encode_base62(mut n: u64) -> String {
    if n == 0 {
        return (ALPHABET[0] as char).to_string();
    }

    let mut digits = Vec::with_capacity(11);
    while n > 0 {
        digits.push(ALPHABET[(n % BASE) as usize]);
        n /= BASE;
    }
    digits.reverse();

    // Every byte comes from the ASCII alphabet.
    digits.into_iter().map(char::from).collect()
}

/// Decodes a base-62 string produced by [`encode_base62`].
///
/// # Errors
///
/// Returns [`AppError::InvalidInput`] if the input is empty, contains a character
/// outside [`ALPHABET`], or does not fit in a `u64`.
pub fn decode_base62(code: &str) -> Result<u64, AppError> {
    if code.is_empty() {
        return Err(AppError::invalid_input(
            "Code must not be empty",
            json!({ "code": code }),
        ));
    }

    code.bytes().try_fold(0u64, |acc, byte| {
        let digit = digit_value(byte).ok_or_else(|| {
            AppError::invalid_input(
                "Code contains a character outside the base-62 alphabet",
                json!({ "code": code, "character": (byte as char).to_string() }),
            )
        })?;

        acc.checked_mul(BASE)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(|| {
                AppError::invalid_input("Code is out of range", json!({ "code": code }))
            })
    })
}

fn digit_value(byte: u8) -> Option<u64> {
    let value = match byte {
        b'0'..=b'9' => byte - b'0',
        b'A'..=b'Z' => byte - b'A' + 10,
        b'a'..=b'z' => byte - b'a' + 36,
        _ => return None,
    };
    Some(u64::from(value))
}
