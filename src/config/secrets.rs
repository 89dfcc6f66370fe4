//! Secret handling utilities.
//!
//! Re-exports secrecy types and adds a bearer-header helper for the
//! downstream API token.

pub use secrecy::{ExposeSecret, SecretString};

/// Render an `Authorization` header value.
///
/// The result holds the token in plain text; pass it straight to the request.
pub fn bearer(token: &SecretString) -> String {
    format!("Bearer {}", token.expose_secret())
}
