//! Deposit operation.

use std::time::Instant;

use jiff::Timestamp;
use tracing::{error, info, instrument};

use super::PreviewStore;
use crate::checksum::ChecksumStream;
use crate::types::{Metadata, Preview, PreviewKey};
use crate::{Error, Result, TRACING_TARGET_STORE};

/// Controls for a single deposit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositOptions {
    /// Replace an existing artifact instead of failing with
    /// [`Error::AlreadyExists`].
    pub overwrite: bool,
    /// Digest the stored bytes must match. On mismatch the uploaded object
    /// is removed again and the deposit fails.
    pub expected_checksum: Option<String>,
}

impl DepositOptions {
    /// Creates the default options: no overwrite, no declared checksum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether an existing artifact is replaced.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Declares the digest the stored bytes must match.
    pub fn with_expected_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }
}

impl PreviewStore {
    /// Stores a preview artifact under its content-addressed key.
    ///
    /// The content stream is consumed exactly once and digested while it is
    /// forwarded to the backend, so memory stays bounded by the transfer
    /// chunk size. The returned [`Preview`] carries fresh metadata and no
    /// content.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyExists`] if the key is taken and overwrite was not
    ///   requested.
    /// - [`Error::DepositFailed`] if the preview carries no content, the
    ///   upload fails, or the stored digest differs from the declared
    ///   `expected_checksum` (the object is removed again first).
    /// - [`Error::NoSuchBucket`] if the bucket has not been provisioned.
    #[instrument(
        skip(self, preview, options),
        target = TRACING_TARGET_STORE,
        fields(source_id = %preview.source_id, source_checksum = %preview.source_checksum)
    )]
    pub async fn deposit(&self, preview: Preview, options: &DepositOptions) -> Result<Preview> {
        let start = Instant::now();
        let key = preview.key()?;

        let content = preview
            .content
            .ok_or_else(|| Error::deposit_failed("preview carries no content"))?;
        let (content_type, stream) = content.into_parts();

        if !options.overwrite {
            match self.client.head_object(&key).await {
                Ok(_) => return Err(Error::already_exists(key.as_str())),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }

        let monitored = ChecksumStream::new(stream);
        let monitor = monitored.monitor();

        match self
            .client
            .put_object(&key, &content_type, Box::pin(monitored))
            .await
        {
            Ok(_) => {}
            Err(err) if err.is_bucket_missing() => return Err(err),
            Err(err) => return Err(Error::deposit_failed(err.to_string())),
        }

        let checksum = monitor.checksum();
        let size_bytes = monitor.size_bytes();

        if let Some(expected) = options.expected_checksum.as_deref() {
            if expected != checksum {
                self.remove_mismatched(&key).await;
                return Err(Error::deposit_failed(format!(
                    "declared checksum {expected} does not match stored digest {checksum}"
                )));
            }
        }

        info!(
            target: TRACING_TARGET_STORE,
            key = %key,
            size_bytes,
            checksum = %checksum,
            elapsed = ?start.elapsed(),
            "Preview stored"
        );

        let metadata = Metadata::new(Timestamp::now(), checksum, size_bytes);
        Ok(Preview {
            source_id: preview.source_id,
            source_checksum: preview.source_checksum,
            metadata: Some(metadata),
            content: None,
        })
    }

    /// Removes an object whose bytes failed verification. The deposit error
    /// is already decided; a failed delete is logged, not returned.
    async fn remove_mismatched(&self, key: &PreviewKey) {
        if let Err(err) = self.client.delete_object(key).await {
            error!(
                target: TRACING_TARGET_STORE,
                key = %key,
                error = %err,
                "Failed to remove mismatched preview"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use futures::stream;

    use super::*;
    use crate::client::{MemoryObjectClient, ObjectClient};
    use crate::types::Content;

    const FOO_CHECKSUM: &str = "ewrggAHdCT55M1uUfwKLEA==";

    async fn ready_client() -> MemoryObjectClient {
        let client = MemoryObjectClient::new("previews");
        client.create_bucket().await.unwrap();
        client
    }

    fn pdf_preview(bytes: &'static [u8]) -> Preview {
        Preview::new("1234", "foochex==").with_content(Content::pdf_from_bytes(bytes))
    }

    #[tokio::test]
    async fn deposit_stores_and_reports_fresh_metadata() {
        let client = ready_client().await;
        let store = PreviewStore::new(Arc::new(client.clone()));

        let stored = store
            .deposit(pdf_preview(b"foocontent"), &DepositOptions::new())
            .await
            .unwrap();

        assert_eq!(stored.source_id, "1234");
        assert_eq!(stored.source_checksum, "foochex==");
        assert!(stored.content.is_none());

        let metadata = stored.metadata.unwrap();
        assert_eq!(metadata.size_bytes, 10);
        assert_eq!(metadata.checksum, FOO_CHECKSUM);

        let bytes = client
            .object_bytes("preview/1234/foochex==/1234.pdf")
            .unwrap();
        assert_eq!(&bytes[..], b"foocontent");
    }

    #[tokio::test]
    async fn deposit_without_content_fails() {
        let store = PreviewStore::new(Arc::new(ready_client().await));

        let err = store
            .deposit(Preview::new("1234", "foochex=="), &DepositOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_deposit_failure());
    }

    #[tokio::test]
    async fn deposit_onto_existing_key_is_a_conflict() {
        let client = ready_client().await;
        let store = PreviewStore::new(Arc::new(client.clone()));

        store
            .deposit(pdf_preview(b"foocontent"), &DepositOptions::new())
            .await
            .unwrap();
        let err = store
            .deposit(pdf_preview(b"other bytes"), &DepositOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // The original bytes are untouched.
        let bytes = client
            .object_bytes("preview/1234/foochex==/1234.pdf")
            .unwrap();
        assert_eq!(&bytes[..], b"foocontent");
    }

    #[tokio::test]
    async fn overwrite_replaces_the_artifact() {
        let client = ready_client().await;
        let store = PreviewStore::new(Arc::new(client.clone()));

        store
            .deposit(pdf_preview(b"foocontent"), &DepositOptions::new())
            .await
            .unwrap();
        let replaced = store
            .deposit(
                pdf_preview(b"new content bytes"),
                &DepositOptions::new().with_overwrite(true),
            )
            .await
            .unwrap();

        let metadata = replaced.metadata.unwrap();
        assert_eq!(metadata.size_bytes, 17);
        assert_eq!(metadata.checksum, "zIdQQC94ByP271EH1sP_sA==");

        let bytes = client
            .object_bytes("preview/1234/foochex==/1234.pdf")
            .unwrap();
        assert_eq!(&bytes[..], b"new content bytes");
    }

    #[tokio::test]
    async fn matching_expected_checksum_passes() {
        let store = PreviewStore::new(Arc::new(ready_client().await));

        let stored = store
            .deposit(
                pdf_preview(b"foocontent"),
                &DepositOptions::new().with_expected_checksum(FOO_CHECKSUM),
            )
            .await
            .unwrap();
        assert_eq!(stored.metadata.unwrap().checksum, FOO_CHECKSUM);
    }

    #[tokio::test]
    async fn mismatched_expected_checksum_rolls_back() {
        let client = ready_client().await;
        let store = PreviewStore::new(Arc::new(client.clone()));

        let err = store
            .deposit(
                pdf_preview(b"foocontent"),
                &DepositOptions::new().with_expected_checksum("1B2M2Y8AsgTpgAmY7PhCfg=="),
            )
            .await
            .unwrap_err();
        assert!(err.is_deposit_failure());

        // Nothing is left behind under the key.
        assert!(client.object_bytes("preview/1234/foochex==/1234.pdf").is_none());
    }

    #[tokio::test]
    async fn missing_bucket_passes_through() {
        let store = PreviewStore::new(Arc::new(MemoryObjectClient::new("previews")));

        let err = store
            .deposit(pdf_preview(b"foocontent"), &DepositOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_bucket_missing());
    }

    #[tokio::test]
    async fn chunked_content_digests_across_chunks() {
        let client = ready_client().await;
        let store = PreviewStore::new(Arc::new(client.clone()));

        let chunks = stream::iter([
            Ok::<_, Error>(Bytes::from_static(b"foo")),
            Ok(Bytes::from_static(b"con")),
            Ok(Bytes::from_static(b"tent")),
        ]);
        let preview = Preview::new("1234", "foochex==")
            .with_content(Content::new(Content::PDF, Box::pin(chunks)));

        let stored = store.deposit(preview, &DepositOptions::new()).await.unwrap();
        let metadata = stored.metadata.unwrap();
        assert_eq!(metadata.size_bytes, 10);
        assert_eq!(metadata.checksum, FOO_CHECKSUM);
    }

    #[tokio::test]
    async fn failing_content_stream_fails_the_deposit() {
        let client = ready_client().await;
        let store = PreviewStore::new(Arc::new(client.clone()));

        let chunks = stream::iter([
            Ok::<_, Error>(Bytes::from_static(b"foo")),
            Err(Error::from(std::io::Error::other("render worker hung up"))),
        ]);
        let preview = Preview::new("1234", "foochex==")
            .with_content(Content::new(Content::PDF, Box::pin(chunks)));

        let err = store
            .deposit(preview, &DepositOptions::new())
            .await
            .unwrap_err();
        assert!(err.is_deposit_failure());
        assert!(client.object_bytes("preview/1234/foochex==/1234.pdf").is_none());
    }

    #[test]
    fn options_builders_compose() {
        let options = DepositOptions::new()
            .with_overwrite(true)
            .with_expected_checksum(FOO_CHECKSUM);
        assert!(options.overwrite);
        assert_eq!(options.expected_checksum.as_deref(), Some(FOO_CHECKSUM));
    }
}
