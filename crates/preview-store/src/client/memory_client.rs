//! In-process object client for tests and embedding.
//!
//! Keeps objects in a mutex-guarded map and mimics the remote backend's
//! observable behavior: quoted-hex MD5 ETags, real timestamps, and a bucket
//! that does not exist until created.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use futures::stream;
use jiff::Timestamp;
use md5::{Digest, Md5};

use super::{
    ObjectAttributes, ObjectClient, ObjectDownload, PROBE_BODY, PROBE_KEY, ProbeOptions,
    PutOutcome,
};
use crate::types::{ContentStream, PreviewKey};
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Bytes,
    content_type: String,
    etag: String,
    last_modified: Timestamp,
}

impl StoredObject {
    fn new(bytes: Bytes, content_type: impl Into<String>) -> Self {
        let etag = format!("\"{}\"", hex::encode(Md5::digest(&bytes)));
        Self {
            bytes,
            content_type: content_type.into(),
            etag,
            last_modified: Timestamp::now(),
        }
    }

    fn attributes(&self) -> ObjectAttributes {
        ObjectAttributes {
            etag: Some(self.etag.clone()),
            size_bytes: self.bytes.len() as u64,
            last_modified: Some(self.last_modified),
            content_type: Some(self.content_type.clone()),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    bucket_exists: bool,
    objects: HashMap<String, StoredObject>,
}

/// Object client backed by process memory.
///
/// Starts without the bucket, so bootstrap sequences run against it the same
/// way they run against a freshly provisioned backend. Clones share state.
#[derive(Clone)]
pub struct MemoryObjectClient {
    bucket: String,
    state: Arc<Mutex<State>>,
}

impl MemoryObjectClient {
    /// Creates a client whose bucket has not been created yet.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Number of objects currently stored, probe sentinels included.
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Returns a stored object's bytes, if present.
    pub fn object_bytes(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).map(|object| object.bytes.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_bucket(&self) -> Result<()> {
        if self.lock().bucket_exists {
            Ok(())
        } else {
            Err(Error::no_such_bucket(&self.bucket))
        }
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head_object(&self, key: &PreviewKey) -> Result<ObjectAttributes> {
        self.ensure_bucket()?;
        self.lock()
            .objects
            .get(key.as_str())
            .map(StoredObject::attributes)
            .ok_or_else(|| Error::does_not_exist(key.as_str()))
    }

    async fn get_object(&self, key: &PreviewKey) -> Result<ObjectDownload> {
        self.ensure_bucket()?;
        let object = self
            .lock()
            .objects
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| Error::does_not_exist(key.as_str()))?;

        let attributes = object.attributes();
        let stream: ContentStream = Box::pin(stream::iter([Ok::<_, Error>(object.bytes)]));
        Ok(ObjectDownload { attributes, stream })
    }

    async fn put_object(
        &self,
        key: &PreviewKey,
        content_type: &str,
        mut body: ContentStream,
    ) -> Result<PutOutcome> {
        self.ensure_bucket()?;

        // Drain outside the lock; the guard must not live across awaits.
        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }

        let object = StoredObject::new(buffer.freeze(), content_type);
        let outcome = PutOutcome {
            etag: Some(object.etag.clone()),
            size_bytes: object.bytes.len() as u64,
        };
        self.lock().objects.insert(key.as_str().to_owned(), object);
        Ok(outcome)
    }

    async fn delete_object(&self, key: &PreviewKey) -> Result<()> {
        self.ensure_bucket()?;
        self.lock().objects.remove(key.as_str());
        Ok(())
    }

    async fn create_bucket(&self) -> Result<()> {
        self.lock().bucket_exists = true;
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(self.lock().bucket_exists)
    }

    async fn probe(&self, _options: &ProbeOptions) -> Result<()> {
        self.ensure_bucket()?;
        let sentinel = StoredObject::new(Bytes::from_static(PROBE_BODY), "text/plain");
        self.lock().objects.insert(PROBE_KEY.to_owned(), sentinel);
        Ok(())
    }
}

impl fmt::Debug for MemoryObjectClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("MemoryObjectClient")
            .field("bucket", &self.bucket)
            .field("bucket_exists", &state.bucket_exists)
            .field("objects", &state.objects.len())
            .finish()
    }
}
