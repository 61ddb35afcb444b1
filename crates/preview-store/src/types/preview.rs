//! Domain records for stored and to-be-stored preview artifacts.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::types::PreviewKey;
use crate::{Error, Result};

/// Single-pass, forward-only byte stream.
///
/// Not seekable and not restartable; the deposit and retrieval paths consume
/// it exactly once, in bounded-size chunks.
pub type ContentStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Immutable facts about a stored preview artifact.
///
/// Created once, either at successful deposit or from backend-reported values
/// at retrieval time; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// When the artifact was stored.
    pub added_at: Timestamp,
    /// URL-safe base64 checksum of the artifact's own content digest.
    ///
    /// Distinct from the source checksum, which identifies the input package.
    pub checksum: String,
    /// Artifact size in bytes.
    pub size_bytes: u64,
}

impl Metadata {
    /// Creates a metadata record.
    pub fn new(added_at: Timestamp, checksum: impl Into<String>, size_bytes: u64) -> Self {
        Self {
            added_at,
            checksum: checksum.into(),
            size_bytes,
        }
    }
}

/// Byte content plus its declared content type.
pub struct Content {
    content_type: String,
    stream: ContentStream,
}

impl Content {
    /// Content type of rendered preview artifacts.
    pub const PDF: &'static str = "application/pdf";

    /// Creates content from an already-chunked stream.
    pub fn new(content_type: impl Into<String>, stream: ContentStream) -> Self {
        Self {
            content_type: content_type.into(),
            stream,
        }
    }

    /// Creates content from an in-memory payload.
    ///
    /// Intended for small payloads and tests; large artifacts should stream
    /// through [`Content::from_reader`] instead.
    pub fn from_bytes(content_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self::new(content_type, Box::pin(stream::iter([Ok::<_, Error>(bytes)])))
    }

    /// Creates PDF content from an in-memory payload.
    pub fn pdf_from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self::from_bytes(Self::PDF, bytes)
    }

    /// Creates content that streams from an async reader in bounded chunks.
    pub fn from_reader<R>(content_type: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let stream = ReaderStream::new(reader).map(|chunk| chunk.map_err(Error::from));
        Self::new(content_type, Box::pin(stream))
    }

    /// Returns the declared content type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Consumes the content, returning the underlying stream.
    pub fn into_stream(self) -> ContentStream {
        self.stream
    }

    /// Consumes the content, returning the content type and stream.
    pub fn into_parts(self) -> (String, ContentStream) {
        (self.content_type, self.stream)
    }

    /// Reads the stream to completion, concatenating all chunks.
    ///
    /// Buffers the whole artifact in memory; use only where that is
    /// acceptable (tests, small payloads).
    pub async fn read_to_bytes(self) -> Result<Bytes> {
        let mut stream = self.stream;
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk?);
        }
        Ok(Bytes::from(collected))
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Content")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// One stored-or-to-be-stored preview artifact.
///
/// Constructed by the calling layer per request. The content stream, when
/// present, is owned by this value and must be fully consumed or dropped
/// before the value is discarded.
#[derive(Debug)]
pub struct Preview {
    /// Identifier of the originating source package.
    pub source_id: String,
    /// Checksum of the source package this preview was rendered from.
    pub source_checksum: String,
    /// Present once the artifact is known to exist.
    pub metadata: Option<Metadata>,
    /// Present when a byte stream is attached for deposit or was fetched.
    pub content: Option<Content>,
}

impl Preview {
    /// Creates a preview identity with no metadata or content attached.
    pub fn new(source_id: impl Into<String>, source_checksum: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            source_checksum: source_checksum.into(),
            metadata: None,
            content: None,
        }
    }

    /// Attaches content for deposit.
    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    /// Attaches a metadata record.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Computes the storage key for this preview's identity.
    pub fn key(&self) -> Result<PreviewKey> {
        PreviewKey::new(self.source_id.as_str(), self.source_checksum.as_str())
    }
}
