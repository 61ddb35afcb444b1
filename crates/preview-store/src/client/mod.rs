//! Object-store clients and connection configuration.
//!
//! This module defines the backend seam for the preview store: a narrow
//! client trait covering head/get/put/delete plus bucket provisioning, an
//! S3 implementation built from explicit connection parameters, and an
//! in-process memory implementation for tests and embedding.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;

use crate::Result;
use crate::types::{ContentStream, PreviewKey};

mod memory_client;
mod s3_client;
mod s3_config;
mod s3_credentials;

pub use memory_client::MemoryObjectClient;
pub use s3_client::S3ObjectClient;
pub use s3_config::S3Config;
pub use s3_credentials::S3Credentials;

/// Storage key of the sentinel object written by availability probes.
///
/// Outside the `preview/` prefix so probes never collide with artifact keys.
pub const PROBE_KEY: &str = "_availability_probe";

/// Payload of the sentinel object written by availability probes.
pub const PROBE_BODY: &[u8] = b"probe";

/// Backend operations required by the preview store.
///
/// Implementations normalize their backend's failures into the crate's
/// [`Error`](crate::Error) taxonomy: bucket absent, object absent, or an
/// unclassified backend failure the caller treats as fatal for that call.
/// Connection parameters are supplied at construction and stay immutable for
/// the client's lifetime.
#[async_trait]
pub trait ObjectClient: fmt::Debug + Send + Sync {
    /// Returns the bucket this client operates on.
    fn bucket(&self) -> &str;

    /// Fetches object attributes without transferring the body.
    async fn head_object(&self, key: &PreviewKey) -> Result<ObjectAttributes>;

    /// Fetches object attributes together with a body stream.
    async fn get_object(&self, key: &PreviewKey) -> Result<ObjectDownload>;

    /// Uploads a byte stream using chunked transfer.
    ///
    /// The transfer is bounded by the implementation's part size; the whole
    /// artifact is never held in memory.
    async fn put_object(
        &self,
        key: &PreviewKey,
        content_type: &str,
        body: ContentStream,
    ) -> Result<PutOutcome>;

    /// Deletes the object at the key. Deleting an absent object succeeds.
    async fn delete_object(&self, key: &PreviewKey) -> Result<()>;

    /// Creates the bucket. A bucket that already exists is success.
    async fn create_bucket(&self) -> Result<()>;

    /// Reports whether the bucket currently exists.
    async fn bucket_exists(&self) -> Result<bool>;

    /// Writes the sentinel object through a short-lived client configured
    /// with the probe's retry budget and timeouts.
    async fn probe(&self, options: &ProbeOptions) -> Result<()>;
}

/// Object facts reported by head and get requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectAttributes {
    /// Backend entity tag, quoted hex, as reported.
    pub etag: Option<String>,
    /// Object size in bytes.
    pub size_bytes: u64,
    /// Backend-assigned last-modified timestamp.
    pub last_modified: Option<Timestamp>,
    /// Stored content type, if the backend reports one.
    pub content_type: Option<String>,
}

/// A retrieved object: attributes plus its body stream.
///
/// The body is not read ahead; the caller streams it in bounded chunks.
pub struct ObjectDownload {
    /// Object facts from the response headers.
    pub attributes: ObjectAttributes,
    /// Body stream, consumed exactly once.
    pub stream: ContentStream,
}

impl fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// Backend entity tag of the stored object, if reported.
    pub etag: Option<String>,
    /// Number of bytes transferred.
    pub size_bytes: u64,
}

/// Retry budget and timeouts for a single availability probe.
///
/// Probes run through a short-lived client, so these values never affect the
/// steady-state client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOptions {
    /// Additional attempts after the first; zero disables retries.
    pub retries: u32,
    /// Per-attempt connection timeout.
    pub connect_timeout: Duration,
    /// Per-attempt read timeout.
    pub read_timeout: Duration,
}

impl ProbeOptions {
    /// Creates probe options with the given retry budget and timeouts.
    pub fn new(retries: u32, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            retries,
            connect_timeout,
            read_timeout,
        }
    }

    /// Sets the retry budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the per-attempt connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-attempt read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Default for ProbeOptions {
    /// Single attempt with short timeouts, matching steady-state checks.
    fn default() -> Self {
        Self {
            retries: 0,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_options_default_is_single_attempt() {
        let options = ProbeOptions::default();
        assert_eq!(options.retries, 0);
        assert_eq!(options.connect_timeout, Duration::from_secs(5));
        assert_eq!(options.read_timeout, Duration::from_secs(5));
    }

    #[test]
    fn probe_options_builders_override_fields() {
        let options = ProbeOptions::default()
            .with_retries(20)
            .with_connect_timeout(Duration::from_secs(1))
            .with_read_timeout(Duration::from_secs(2));
        assert_eq!(options.retries, 20);
        assert_eq!(options.connect_timeout, Duration::from_secs(1));
        assert_eq!(options.read_timeout, Duration::from_secs(2));
    }

    #[test]
    fn probe_key_stays_out_of_artifact_keyspace() {
        assert!(!PROBE_KEY.starts_with("preview/"));
    }
}
