// Caller identity: an opaque bearer token passed through to every source.

use sha2::{Digest, Sha256};
use std::fmt;

/// Key fragment used for caller-less requests in per-source caches.
pub const ANONYMOUS_KEY: &str = "anonymous";

#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    token: String,
}

impl Identity {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Parses an `Authorization` header value. Returns None for anything but a non-empty bearer
    /// token.
    pub fn from_authorization(header: &str) -> Option<Self> {
        let (scheme, token) = header.trim().split_once(' ')?;
        let token = token.trim();
        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
            return None;
        }
        Some(Self::bearer(token))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// SHA-256 of the token, first 16 hex chars. Used as a cache key, never logged raw.
    pub fn hash(&self) -> String {
        let digest = Sha256::digest(self.token.as_bytes());
        let hex = format!("{digest:x}");
        hex[..16].to_string()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.hash())
    }
}

/// Cache key fragment for an optional identity.
pub fn identity_key(identity: Option<&Identity>) -> String {
    identity
        .map(Identity::hash)
        .unwrap_or_else(|| ANONYMOUS_KEY.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bearer_header_case_insensitively() {
        let id = Identity::from_authorization("bearer abc.def").unwrap();
        assert_eq!(id.token(), "abc.def");
        assert!(Identity::from_authorization("Basic dXNlcjpwYXNz").is_none());
        assert!(Identity::from_authorization("Bearer   ").is_none());
    }

    #[test]
    fn hash_is_stable_and_hides_token() {
        let a = Identity::bearer("secret-token");
        let b = Identity::bearer("secret-token");
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 16);
        assert!(!format!("{a:?}").contains("secret"));
        assert_ne!(a.hash(), Identity::bearer("other").hash());
    }

    #[test]
    fn anonymous_key_for_missing_identity() {
        assert_eq!(identity_key(None), ANONYMOUS_KEY);
    }
}
