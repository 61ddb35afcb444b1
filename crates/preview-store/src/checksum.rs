//! Streaming checksum computation and digest encoding.
//!
//! [`ChecksumStream`] wraps a byte stream and feeds every chunk through a
//! running MD5 digest and byte counter while forwarding the chunk unchanged.
//! The attached [`ChecksumMonitor`] reports the digest and size observed so
//! far; both are final only once the wrapped stream has been fully consumed.
//! Streams are forward-only, so consumers cannot rewind and double-count.

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use base64::prelude::*;
use bytes::Bytes;
use futures::Stream;
use md5::{Digest, Md5};

use crate::{Error, Result};

/// Length in bytes of the content digest used for preview checksums.
pub const DIGEST_LEN: usize = 16;

/// Encodes a content digest in the store's external checksum representation:
/// URL-safe base64, padded.
pub fn encode_digest(digest: impl AsRef<[u8]>) -> String {
    BASE64_URL_SAFE.encode(digest)
}

/// Converts a backend ETag into the store's checksum representation.
///
/// Backends report content digests as quoted hex strings. The surrounding
/// quotes are stripped and the hex digest re-encoded as URL-safe base64.
/// Multipart-style ETags (`<hex>-<parts>`) decode their leading hex segment,
/// which is the backend's aggregate digest rather than the content digest;
/// deposit always reports the true digest computed while streaming.
pub fn checksum_from_etag(etag: &str) -> Result<String> {
    let trimmed = etag.trim().trim_matches('"');
    let hex_digest = match trimmed.split_once('-') {
        Some((digest, _part_count)) => digest,
        None => trimmed,
    };

    let raw = hex::decode(hex_digest)
        .map_err(|_| Error::backend("decode-etag", format!("unparsable etag `{trimmed}`")))?;
    if raw.len() != DIGEST_LEN {
        return Err(Error::backend(
            "decode-etag",
            format!("etag `{trimmed}` is not a {DIGEST_LEN}-byte digest"),
        ));
    }

    Ok(encode_digest(raw))
}

#[derive(Default)]
struct MonitorState {
    hasher: Md5,
    size_bytes: u64,
    finished: bool,
}

/// Cloneable handle onto the digest and byte count of a [`ChecksumStream`].
///
/// Values read before the wrapped stream is exhausted describe only the bytes
/// consumed so far and must not be treated as final.
#[derive(Clone, Default)]
pub struct ChecksumMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl ChecksumMonitor {
    /// Creates a monitor with an empty digest and zero byte count.
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, chunk: &[u8]) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.hasher.update(chunk);
        state.size_bytes += chunk.len() as u64;
    }

    fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.finished = true;
    }

    /// Returns the URL-safe base64 checksum of the bytes observed so far.
    pub fn checksum(&self) -> String {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        encode_digest(state.hasher.clone().finalize())
    }

    /// Returns the number of bytes observed so far.
    pub fn size_bytes(&self) -> u64 {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.size_bytes
    }

    /// Returns whether the wrapped stream has been fully consumed.
    pub fn is_finished(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.finished
    }
}

impl fmt::Debug for ChecksumMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChecksumMonitor")
            .field("size_bytes", &self.size_bytes())
            .field("finished", &self.is_finished())
            .finish()
    }
}

pin_project_lite::pin_project! {
    /// Stream adapter that digests and counts bytes as they are read.
    ///
    /// Each chunk is delivered to the consumer unchanged; no buffering or
    /// look-ahead is added, so memory cost stays bounded by the producer's
    /// chunk size.
    pub struct ChecksumStream<S> {
        #[pin]
        inner: S,
        monitor: ChecksumMonitor,
    }
}

impl<S> ChecksumStream<S>
where
    S: Stream<Item = Result<Bytes>>,
{
    /// Wraps a stream with a fresh monitor.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            monitor: ChecksumMonitor::new(),
        }
    }

    /// Returns a handle onto this stream's digest and byte count.
    pub fn monitor(&self) -> ChecksumMonitor {
        self.monitor.clone()
    }
}

impl<S> Stream for ChecksumStream<S>
where
    S: Stream<Item = Result<Bytes>>,
{
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.monitor.record(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(error))) => Poll::Ready(Some(Err(error))),
            Poll::Ready(None) => {
                this.monitor.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use futures::{StreamExt, stream};

    use super::*;

    fn chunked(chunks: &[&'static [u8]]) -> impl Stream<Item = Result<Bytes>> {
        stream::iter(
            chunks
                .iter()
                .map(|chunk| Ok(Bytes::from_static(chunk)))
                .collect::<Vec<_>>(),
        )
    }

    #[tokio::test]
    async fn digest_and_count_match_known_vector() {
        let stream = ChecksumStream::new(chunked(&[b"fooco", b"ntent"]));
        let monitor = stream.monitor();

        let collected: Vec<_> = stream.collect().await;
        let bytes: Vec<u8> = collected
            .into_iter()
            .flat_map(|chunk| chunk.unwrap().to_vec())
            .collect();

        assert_eq!(bytes, b"foocontent");
        assert_eq!(monitor.checksum(), "ewrggAHdCT55M1uUfwKLEA==");
        assert_eq!(monitor.size_bytes(), 10);
        assert!(monitor.is_finished());
    }

    #[tokio::test]
    async fn digest_before_exhaustion_is_partial() {
        let mut stream = ChecksumStream::new(chunked(&[b"fooco", b"ntent"]));
        let monitor = stream.monitor();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"fooco");
        assert_eq!(monitor.size_bytes(), 5);
        assert!(!monitor.is_finished());
        assert_ne!(monitor.checksum(), "ewrggAHdCT55M1uUfwKLEA==");

        while stream.next().await.is_some() {}
        assert!(monitor.is_finished());
        assert_eq!(monitor.checksum(), "ewrggAHdCT55M1uUfwKLEA==");
    }

    #[tokio::test]
    async fn empty_stream_yields_empty_digest() {
        let stream = ChecksumStream::new(chunked(&[]));
        let monitor = stream.monitor();

        let collected: Vec<_> = stream.collect().await;
        assert!(collected.is_empty());
        assert_eq!(monitor.checksum(), "1B2M2Y8AsgTpgAmY7PhCfg==");
        assert_eq!(monitor.size_bytes(), 0);
        assert!(monitor.is_finished());
    }

    #[tokio::test]
    async fn errors_pass_through_unchanged() {
        let inner = stream::iter(vec![
            Ok(Bytes::from_static(b"fooco")),
            Err(Error::deposit_failed("stream interrupted")),
        ]);
        let mut stream = ChecksumStream::new(inner);
        let monitor = stream.monitor();

        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
        assert_eq!(monitor.size_bytes(), 5);
        assert!(!monitor.is_finished());
    }

    #[test]
    fn encode_digest_uses_url_safe_alphabet() {
        let digest = Md5::digest(b"barcontent");
        assert_eq!(encode_digest(digest), "uW94u_u4xfDA3lcVd354ng==");
    }

    #[test]
    fn etag_conversion_strips_quotes() {
        let checksum = checksum_from_etag("\"7b0ae08001dd093e79335b947f028b10\"").unwrap();
        assert_eq!(checksum, "ewrggAHdCT55M1uUfwKLEA==");
    }

    #[test]
    fn etag_conversion_accepts_unquoted_and_multipart_forms() {
        let plain = checksum_from_etag("7b0ae08001dd093e79335b947f028b10").unwrap();
        assert_eq!(plain, "ewrggAHdCT55M1uUfwKLEA==");

        let multipart = checksum_from_etag("\"7b0ae08001dd093e79335b947f028b10-3\"").unwrap();
        assert_eq!(multipart, "ewrggAHdCT55M1uUfwKLEA==");
    }

    #[test]
    fn etag_conversion_rejects_garbage() {
        assert!(checksum_from_etag("\"not-hex\"").is_err());
        assert!(checksum_from_etag("\"7b0a\"").is_err());
    }
}
