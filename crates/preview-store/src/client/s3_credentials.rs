//! Authentication credentials for the S3 object client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Static credentials for an S3-compatible object store.
///
/// The secret key is never serialized and never appears in debug output.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct S3Credentials {
    /// Access key for authentication.
    pub access_key: String,

    /// Secret key for authentication.
    ///
    /// Masked in debug output and skipped during serialization.
    #[serde(skip_serializing)]
    pub secret_key: String,

    /// Optional session token for temporary credentials.
    pub session_token: Option<String>,
}

impl S3Credentials {
    /// Creates credentials from an access key and secret key.
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: None,
        }
    }

    /// Creates temporary credentials carrying a session token.
    pub fn with_session_token(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            session_token: Some(session_token.into()),
        }
    }

    /// Returns the access key.
    #[inline]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    /// Returns the secret key.
    #[inline]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }

    /// Returns the session token if available.
    #[inline]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Returns a masked access key for logging: the first 4 characters
    /// followed by asterisks.
    pub fn access_key_masked(&self) -> String {
        if self.access_key.len() <= 4 {
            "*".repeat(self.access_key.len())
        } else {
            format!("{}***", &self.access_key[..4])
        }
    }
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key", &self.access_key_masked())
            .field("secret_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_leaves_session_token_empty() {
        let credentials = S3Credentials::new("access", "secret");
        assert_eq!(credentials.access_key(), "access");
        assert_eq!(credentials.secret_key(), "secret");
        assert!(credentials.session_token().is_none());
    }

    #[test]
    fn session_token_is_carried() {
        let credentials = S3Credentials::with_session_token("access", "secret", "token");
        assert_eq!(credentials.session_token(), Some("token"));
    }

    #[test]
    fn access_key_masking_shows_prefix_only() {
        let credentials = S3Credentials::new("AKIATEST12345", "secret");
        assert_eq!(credentials.access_key_masked(), "AKIA***");

        let short = S3Credentials::new("ABC", "secret");
        assert_eq!(short.access_key_masked(), "***");
    }

    #[test]
    fn debug_output_never_contains_secrets() {
        let credentials = S3Credentials::with_session_token("AKIATEST12345", "supersecret", "tok");
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("supersecret"));
        assert!(!debug.contains("tok\""));
        assert!(debug.contains("AKIA***"));
    }

    #[test]
    fn serialization_skips_secret_key() {
        let credentials = S3Credentials::new("access", "secret");
        let json = serde_json::to_value(&credentials).unwrap();
        assert_eq!(json["access_key"], "access");
        assert!(json.get("secret_key").is_none());
    }
}
