//! Preview storage facade.
//!
//! [`PreviewStore`] is the crate's entry point: deposit and retrieval of
//! rendered preview artifacts over an [`ObjectClient`], plus the
//! availability and bootstrap sequence servers run at startup. Operations
//! are grouped by concern across this module's files.

use std::sync::Arc;

use crate::Result;
use crate::client::{ObjectClient, S3Config, S3ObjectClient};

mod bootstrap;
mod deposit;
mod retrieve;

pub use deposit::DepositOptions;

/// Storage engine for rendered submission previews.
///
/// Holds a shared handle to the backing object client; cloning is cheap and
/// clones operate on the same backend. The store keeps no mutable state of
/// its own, so one value may serve any number of concurrent tasks.
#[derive(Debug, Clone)]
pub struct PreviewStore {
    client: Arc<dyn ObjectClient>,
}

impl PreviewStore {
    /// Wraps an existing object client.
    pub fn new(client: Arc<dyn ObjectClient>) -> Self {
        Self { client }
    }

    /// Builds a store backed by an S3 client for the given parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the parameters fail validation.
    pub fn connect(config: S3Config) -> Result<Self> {
        let client = S3ObjectClient::connect(config)?;
        Ok(Self::new(Arc::new(client)))
    }

    /// Returns the backing object client.
    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    /// Bucket the store operates against.
    pub fn bucket(&self) -> &str {
        self.client.bucket()
    }
}
