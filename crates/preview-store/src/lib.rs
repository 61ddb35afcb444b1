#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

// Tracing target constants for consistent logging
pub const TRACING_TARGET_CLIENT: &str = "preview_store::client";
pub const TRACING_TARGET_STORE: &str = "preview_store::store";
pub const TRACING_TARGET_BOOTSTRAP: &str = "preview_store::bootstrap";

pub mod checksum;
pub mod client;
pub mod prelude;
pub mod store;
pub mod types;

// Re-export for convenience
pub use crate::checksum::{ChecksumMonitor, ChecksumStream};
pub use crate::client::{
    MemoryObjectClient, ObjectAttributes, ObjectClient, ObjectDownload, ProbeOptions, PutOutcome,
    S3Config, S3Credentials, S3ObjectClient,
};
pub use crate::store::{DepositOptions, PreviewStore};
pub use crate::types::{Content, ContentStream, Metadata, Preview, PreviewKey};

/// Error type for preview storage operations.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors should be handled appropriately"]
pub enum Error {
    /// Configuration error.
    ///
    /// This includes invalid connection parameters, malformed endpoint URLs,
    /// or other issues caught before any request is issued.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The source identifier or source checksum cannot form a storage key.
    #[error("Invalid preview key: {0}")]
    InvalidKey(String),

    /// No preview artifact exists at the requested key.
    ///
    /// Maps to a not-found outcome in the calling layer.
    #[error("Preview does not exist: {key}")]
    DoesNotExist {
        /// Storage key that was requested.
        key: String,
    },

    /// A preview artifact already exists at the target key.
    ///
    /// Raised by the deposit dedup guard when overwrite was not requested.
    /// Maps to a conflict outcome in the calling layer.
    #[error("Preview already exists: {key}")]
    AlreadyExists {
        /// Storage key that is already occupied.
        key: String,
    },

    /// An upload or post-upload verification failed.
    ///
    /// Covers missing content on deposit, upload-phase backend failures, and
    /// checksum mismatches (after the rollback delete has been attempted).
    #[error("Preview deposit failed: {reason}")]
    DepositFailed {
        /// Human-readable failure reason.
        reason: String,
    },

    /// The backing bucket does not exist.
    ///
    /// During bootstrap this is the "not yet provisioned" signal; at any other
    /// time it surfaces as an internal error in the calling layer.
    #[error("Bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// Name of the missing bucket.
        bucket: String,
    },

    /// Reading a caller-supplied content stream failed.
    #[error("Content stream error: {0}")]
    ContentRead(#[from] std::io::Error),

    /// Backend failure with no local classification.
    ///
    /// Always treated as non-retryable at this layer; retries happen only in
    /// the bootstrap path and inside the backend client's own retry budget.
    #[error("Object store {operation} failed: {message}")]
    Backend {
        /// Adapter operation that failed.
        operation: &'static str,
        /// Backend-reported failure detail.
        message: String,
    },
}

impl Error {
    /// Creates a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config(reason.into())
    }

    /// Creates an invalid-key error.
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Error::InvalidKey(reason.into())
    }

    /// Creates a not-found error for the given storage key.
    pub fn does_not_exist(key: impl Into<String>) -> Self {
        Error::DoesNotExist { key: key.into() }
    }

    /// Creates a conflict error for the given storage key.
    pub fn already_exists(key: impl Into<String>) -> Self {
        Error::AlreadyExists { key: key.into() }
    }

    /// Creates a deposit failure with the given reason.
    pub fn deposit_failed(reason: impl Into<String>) -> Self {
        Error::DepositFailed {
            reason: reason.into(),
        }
    }

    /// Creates a missing-bucket error.
    pub fn no_such_bucket(bucket: impl Into<String>) -> Self {
        Error::NoSuchBucket {
            bucket: bucket.into(),
        }
    }

    /// Creates an unclassified backend error for the given adapter operation.
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Backend {
            operation,
            message: message.into(),
        }
    }

    /// Returns whether this error indicates a missing artifact.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::DoesNotExist { .. })
    }

    /// Returns whether this error indicates a dedup-guard conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Returns whether this error indicates the backing bucket is absent.
    pub fn is_bucket_missing(&self) -> bool {
        matches!(self, Error::NoSuchBucket { .. })
    }

    /// Returns whether this error indicates a failed deposit.
    pub fn is_deposit_failure(&self) -> bool {
        matches!(self, Error::DepositFailed { .. })
    }
}

/// Specialized [`Result`] type for preview storage operations.
///
/// This is a convenience alias that uses [`Error`] as the default error type,
/// keeping operation signatures consistent across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_match_variants() {
        assert!(Error::does_not_exist("preview/1/2/1.pdf").is_not_found());
        assert!(Error::already_exists("preview/1/2/1.pdf").is_conflict());
        assert!(Error::no_such_bucket("previews").is_bucket_missing());
        assert!(Error::deposit_failed("stream ended early").is_deposit_failure());
        assert!(!Error::config("bad endpoint").is_not_found());
    }

    #[test]
    fn io_errors_convert_to_content_read() {
        let io = std::io::Error::other("pipe closed");
        let error = Error::from(io);
        assert!(matches!(error, Error::ContentRead(_)));
    }
}
