//! Authentication Module
//!
//! Provides:
//! - Bearer header parsing
//! - API token format checks
//! - The accepted-token set used by the HTTP layer
//!
//! Tokens are kept as SHA-256 digests so raw secrets do not sit in memory
//! longer than configuration loading.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Shortest token accepted from configuration
pub const MIN_TOKEN_LEN: usize = 8;

// ============================================================================
// HEADER PARSING
// ============================================================================

/// Extract the credential from an `Authorization: Bearer <token>` value
pub fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

// ============================================================================
// TOKEN VALIDATION
// ============================================================================

/// Printable ASCII without whitespace, at least [`MIN_TOKEN_LEN`] long
pub fn is_valid_token_format(token: &str) -> bool {
    token.len() >= MIN_TOKEN_LEN && token.bytes().all(|b| b.is_ascii_graphic())
}

fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// ============================================================================
// TOKEN SET
// ============================================================================

/// Accepted API tokens
pub struct TokenAuth {
    digests: RwLock<HashSet<String>>,
}

impl TokenAuth {
    pub fn new() -> Self {
        Self {
            digests: RwLock::new(HashSet::new()),
        }
    }

    /// Build from configured tokens, skipping malformed ones
    pub fn with_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = HashSet::new();
        for token in tokens {
            let token = token.as_ref();
            if is_valid_token_format(token) {
                set.insert(token_digest(token));
            } else {
                warn!("Ignoring malformed API token (length {})", token.len());
            }
        }
        Self {
            digests: RwLock::new(set),
        }
    }

    pub async fn is_authorized(&self, token: &str) -> bool {
        let authorized = self.digests.read().await.contains(&token_digest(token));
        if !authorized {
            debug!("Rejected bearer token");
        }
        authorized
    }

    /// Check a raw `Authorization` header value
    pub async fn authorize_header(&self, header: Option<&str>) -> bool {
        match header.and_then(parse_bearer) {
            Some(token) => self.is_authorized(token).await,
            None => false,
        }
    }
}

impl Default for TokenAuth {
    fn default() -> Self {
        Self::new()
    }
}
