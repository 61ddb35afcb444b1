//! Convenience re-exports.

pub use crate::checksum::{ChecksumMonitor, ChecksumStream};
pub use crate::client::{
    MemoryObjectClient, ObjectAttributes, ObjectClient, ObjectDownload, ProbeOptions, PutOutcome,
    S3Config, S3Credentials, S3ObjectClient,
};
pub use crate::store::{DepositOptions, PreviewStore};
pub use crate::types::{Content, ContentStream, Metadata, Preview, PreviewKey};
pub use crate::{Error, Result};
