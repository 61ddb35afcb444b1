//! Availability probing and startup bootstrap.
//!
//! Two failure classes are kept apart on purpose: a missing bucket is a
//! provisioning gap [`initialize`](PreviewStore::initialize) can repair, while
//! an unreachable or misbehaving backend is a fatal startup condition the
//! caller must not serve traffic over.

use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument};

use super::PreviewStore;
use crate::client::ProbeOptions;
use crate::{Error, Result, TRACING_TARGET_BOOTSTRAP};

/// Retry budget for the bootstrap probe. Startup tolerates a backend that is
/// still coming up next to it.
const BOOTSTRAP_RETRIES: u32 = 20;

/// Per-attempt connect/read timeout during bootstrap. Short, so a dead
/// endpoint fails the attempt instead of hanging it.
const BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a freshly created bucket is polled for visibility.
const BUCKET_POLL_ATTEMPTS: u32 = 5;

/// Fixed delay between bucket visibility polls.
const BUCKET_POLL_DELAY: Duration = Duration::from_secs(5);

impl PreviewStore {
    /// Checks whether the store can serve traffic right now.
    ///
    /// Single probe attempt with the default timeouts; see
    /// [`is_available_with`](Self::is_available_with).
    pub async fn is_available(&self) -> Result<bool> {
        self.is_available_with(&ProbeOptions::default()).await
    }

    /// Checks availability by writing the sentinel object.
    ///
    /// Returns `Ok(true)` when the write succeeds and `Ok(false)` when the
    /// backend is unreachable or rejects it.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchBucket`] when the bucket has not been provisioned.
    /// That is a distinct signal rather than mere unavailability: the
    /// backend answered, the bucket is missing.
    #[instrument(skip(self, options), target = TRACING_TARGET_BOOTSTRAP, fields(bucket = %self.client.bucket()))]
    pub async fn is_available_with(&self, options: &ProbeOptions) -> Result<bool> {
        match self.client.probe(options).await {
            Ok(()) => Ok(true),
            Err(err) if err.is_bucket_missing() => Err(err),
            Err(err) => {
                error!(
                    target: TRACING_TARGET_BOOTSTRAP,
                    error = %err,
                    "Object store probe failed"
                );
                Ok(false)
            }
        }
    }

    /// Brings the store to a usable state, provisioning the bucket if it
    /// does not exist yet.
    ///
    /// Probes with a generous retry budget and short per-attempt timeouts.
    /// A missing bucket is created and then polled until visible. Any other
    /// unavailability is returned as an error; the caller must treat it as
    /// fatal rather than serve requests that cannot be stored.
    ///
    /// # Errors
    ///
    /// Fails when the backend stays unavailable through the retry budget or
    /// the created bucket never becomes visible.
    #[instrument(skip(self), target = TRACING_TARGET_BOOTSTRAP, fields(bucket = %self.client.bucket()))]
    pub async fn initialize(&self) -> Result<()> {
        let start = Instant::now();
        let options = ProbeOptions::new(BOOTSTRAP_RETRIES, BOOTSTRAP_TIMEOUT, BOOTSTRAP_TIMEOUT);

        match self.is_available_with(&options).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(Error::backend(
                    "bootstrap",
                    "object store did not become available",
                ));
            }
            Err(err) if err.is_bucket_missing() => {
                info!(
                    target: TRACING_TARGET_BOOTSTRAP,
                    bucket = %self.client.bucket(),
                    "Bucket missing, creating it"
                );
                self.client.create_bucket().await?;
                self.await_bucket().await?;
            }
            Err(err) => return Err(err),
        }

        info!(
            target: TRACING_TARGET_BOOTSTRAP,
            bucket = %self.client.bucket(),
            elapsed = ?start.elapsed(),
            "Object store ready"
        );
        Ok(())
    }

    /// Polls until the freshly created bucket is visible.
    async fn await_bucket(&self) -> Result<()> {
        for attempt in 1..=BUCKET_POLL_ATTEMPTS {
            if self.client.bucket_exists().await? {
                return Ok(());
            }
            debug!(
                target: TRACING_TARGET_BOOTSTRAP,
                bucket = %self.client.bucket(),
                attempt,
                "Bucket not visible yet"
            );
            if attempt < BUCKET_POLL_ATTEMPTS {
                tokio::time::sleep(BUCKET_POLL_DELAY).await;
            }
        }

        Err(Error::backend(
            "bootstrap",
            format!(
                "bucket {} was created but never became visible",
                self.client.bucket()
            ),
        ))
    }
}
