//! Retrieval operations.

use tracing::{debug, instrument};

use super::PreviewStore;
use crate::checksum::checksum_from_etag;
use crate::client::ObjectAttributes;
use crate::types::{Content, Metadata, Preview, PreviewKey};
use crate::{Error, Result, TRACING_TARGET_STORE};

impl PreviewStore {
    /// Fetches the stored artifact's metadata without transferring its body.
    ///
    /// # Errors
    ///
    /// [`Error::DoesNotExist`] if no artifact was deposited for the pair.
    #[instrument(skip(self), target = TRACING_TARGET_STORE)]
    pub async fn get_metadata(&self, source_id: &str, source_checksum: &str) -> Result<Metadata> {
        let key = PreviewKey::new(source_id, source_checksum)?;
        let attributes = self.client.head_object(&key).await?;
        metadata_from_attributes(&key, &attributes)
    }

    /// Fetches only the stored artifact's own checksum.
    ///
    /// The cheap path behind conditional retrieval: callers compare this
    /// against a client-supplied validator before deciding whether to
    /// transfer the body.
    ///
    /// # Errors
    ///
    /// [`Error::DoesNotExist`] if no artifact was deposited for the pair.
    #[instrument(skip(self), target = TRACING_TARGET_STORE)]
    pub async fn get_preview_checksum(
        &self,
        source_id: &str,
        source_checksum: &str,
    ) -> Result<String> {
        let metadata = self.get_metadata(source_id, source_checksum).await?;
        Ok(metadata.checksum)
    }

    /// Fetches the stored artifact with its body stream.
    ///
    /// The body is not read ahead; the caller drives the stream.
    ///
    /// # Errors
    ///
    /// [`Error::DoesNotExist`] if no artifact was deposited for the pair.
    #[instrument(skip(self), target = TRACING_TARGET_STORE)]
    pub async fn get_preview(&self, source_id: &str, source_checksum: &str) -> Result<Preview> {
        let key = PreviewKey::new(source_id, source_checksum)?;
        let download = self.client.get_object(&key).await?;

        let metadata = metadata_from_attributes(&key, &download.attributes)?;
        let content_type = download
            .attributes
            .content_type
            .clone()
            .unwrap_or_else(|| Content::PDF.to_owned());

        debug!(
            target: TRACING_TARGET_STORE,
            key = %key,
            size_bytes = metadata.size_bytes,
            "Streaming stored preview"
        );

        Ok(Preview::new(source_id, source_checksum)
            .with_metadata(metadata)
            .with_content(Content::new(content_type, download.stream)))
    }
}

/// Converts backend attributes into a metadata record. The backend always
/// reports an ETag and a modification time for a stored object; a response
/// without them is malformed.
fn metadata_from_attributes(key: &PreviewKey, attributes: &ObjectAttributes) -> Result<Metadata> {
    let etag = attributes
        .etag
        .as_deref()
        .ok_or_else(|| Error::backend("decode-metadata", format!("no etag for {key}")))?;
    let added_at = attributes
        .last_modified
        .ok_or_else(|| Error::backend("decode-metadata", format!("no last-modified for {key}")))?;

    Ok(Metadata::new(
        added_at,
        checksum_from_etag(etag)?,
        attributes.size_bytes,
    ))
}
