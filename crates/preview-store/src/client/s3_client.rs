//! S3 implementation of the object client.
//!
//! Wraps `aws_sdk_s3::Client` built from explicit connection parameters; no
//! ambient environment lookup. All SDK failures funnel through one
//! translation boundary, so nothing outside this file inspects SDK error
//! shapes.

use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Instant;
use std::{cmp, fmt};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use base64::prelude::*;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use jiff::Timestamp;
use md5::{Digest, Md5};
use tracing::{debug, error, info, instrument};

use super::s3_config::S3Config;
use super::{
    ObjectAttributes, ObjectClient, ObjectDownload, PROBE_BODY, PROBE_KEY, ProbeOptions,
    PutOutcome,
};
use crate::types::{ContentStream, PreviewKey};
use crate::{Error, Result, TRACING_TARGET_CLIENT};

/// Uploads at or below this size go through a single PUT carrying a
/// `Content-MD5` integrity header; anything larger is uploaded in parts.
const MULTIPART_THRESHOLD: usize = 8 * 1024 * 1024;

/// Part size for multipart uploads. S3 requires at least 5 MiB per part
/// except the last.
const PART_SIZE: usize = 8 * 1024 * 1024;

/// S3-backed object client for preview artifacts.
///
/// Connection parameters are immutable for the client's lifetime. Two
/// clients built from equal configurations compare equal and hash
/// identically, so callers may cache and reuse them per configuration.
#[derive(Clone)]
pub struct S3ObjectClient {
    client: Client,
    config: Arc<S3Config>,
}

impl S3ObjectClient {
    /// Builds a client from the given connection parameters.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the parameters fail validation. No
    /// network traffic is issued here.
    pub fn connect(config: S3Config) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let client = Client::from_conf(sdk_config(&config, None));

        info!(
            target: TRACING_TARGET_CLIENT,
            endpoint = %config.endpoint_masked(),
            bucket = %config.bucket,
            region = %config.region,
            access_key = %config.credentials.access_key_masked(),
            "S3 object client configured"
        );

        Ok(Self { client, config })
    }

    /// Returns the connection parameters this client was built from.
    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// Builds a throwaway client with the probe's retry budget and timeouts.
    fn probe_client(&self, options: &ProbeOptions) -> Client {
        Client::from_conf(sdk_config(&self.config, Some(options)))
    }

    async fn put_single(
        &self,
        key: &PreviewKey,
        content_type: &str,
        payload: Bytes,
    ) -> Result<PutOutcome> {
        let size_bytes = payload.len() as u64;
        let content_md5 = BASE64_STANDARD.encode(Md5::digest(&payload));

        let response = self
            .client
            .put_object()
            .bucket(self.config.bucket.as_str())
            .key(key.as_str())
            .content_type(content_type)
            .content_md5(content_md5)
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|err| translate_error("put-object", &self.config.bucket, Some(key), err))?;

        Ok(PutOutcome {
            etag: response.e_tag().map(str::to_owned),
            size_bytes,
        })
    }

    async fn put_multipart(
        &self,
        key: &PreviewKey,
        content_type: &str,
        buffered: BytesMut,
        body: ContentStream,
    ) -> Result<PutOutcome> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(self.config.bucket.as_str())
            .key(key.as_str())
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| {
                translate_error("create-multipart", &self.config.bucket, Some(key), err)
            })?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| Error::backend("create-multipart", "response missing upload id"))?
            .to_owned();

        match self.upload_parts(key, &upload_id, buffered, body).await {
            Ok(outcome) => Ok(outcome),
            Err(upload_error) => {
                // Leave no orphaned parts behind; the original error wins.
                let abort = self
                    .client
                    .abort_multipart_upload()
                    .bucket(self.config.bucket.as_str())
                    .key(key.as_str())
                    .upload_id(&upload_id)
                    .send()
                    .await;
                if let Err(abort_error) = abort {
                    error!(
                        target: TRACING_TARGET_CLIENT,
                        key = %key,
                        error = ?abort_error,
                        "Failed to abort multipart upload"
                    );
                }
                Err(upload_error)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &PreviewKey,
        upload_id: &str,
        mut buffer: BytesMut,
        mut body: ContentStream,
    ) -> Result<PutOutcome> {
        let mut parts = Vec::new();
        let mut part_number: i32 = 1;
        let mut total_bytes: u64 = 0;
        let mut exhausted = false;

        loop {
            while buffer.len() < PART_SIZE && !exhausted {
                match body.next().await {
                    Some(chunk) => buffer.extend_from_slice(&chunk?),
                    None => exhausted = true,
                }
            }
            if buffer.is_empty() {
                break;
            }

            let take = cmp::min(PART_SIZE, buffer.len());
            let payload = buffer.split_to(take).freeze();
            total_bytes += payload.len() as u64;

            let part = self
                .client
                .upload_part()
                .bucket(self.config.bucket.as_str())
                .key(key.as_str())
                .upload_id(upload_id)
                .part_number(part_number)
                .body(ByteStream::from(payload))
                .send()
                .await
                .map_err(|err| {
                    translate_error("upload-part", &self.config.bucket, Some(key), err)
                })?;

            debug!(
                target: TRACING_TARGET_CLIENT,
                key = %key,
                part_number,
                "Uploaded part"
            );

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(part.e_tag().map(str::to_owned))
                    .part_number(part_number)
                    .build(),
            );
            part_number += 1;
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        let response = self
            .client
            .complete_multipart_upload()
            .bucket(self.config.bucket.as_str())
            .key(key.as_str())
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|err| {
                translate_error("complete-multipart", &self.config.bucket, Some(key), err)
            })?;

        Ok(PutOutcome {
            etag: response.e_tag().map(str::to_owned),
            size_bytes: total_bytes,
        })
    }
}

#[async_trait]
impl ObjectClient for S3ObjectClient {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    #[instrument(skip(self), target = TRACING_TARGET_CLIENT, fields(bucket = %self.config.bucket, key = %key))]
    async fn head_object(&self, key: &PreviewKey) -> Result<ObjectAttributes> {
        let response = self
            .client
            .head_object()
            .bucket(self.config.bucket.as_str())
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| translate_error("head-object", &self.config.bucket, Some(key), err))?;

        Ok(ObjectAttributes {
            etag: response.e_tag().map(str::to_owned),
            size_bytes: non_negative(response.content_length()),
            last_modified: response.last_modified().map(to_timestamp),
            content_type: response.content_type().map(str::to_owned),
        })
    }

    #[instrument(skip(self), target = TRACING_TARGET_CLIENT, fields(bucket = %self.config.bucket, key = %key))]
    async fn get_object(&self, key: &PreviewKey) -> Result<ObjectDownload> {
        let response = self
            .client
            .get_object()
            .bucket(self.config.bucket.as_str())
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| translate_error("get-object", &self.config.bucket, Some(key), err))?;

        let attributes = ObjectAttributes {
            etag: response.e_tag().map(str::to_owned),
            size_bytes: non_negative(response.content_length()),
            last_modified: response.last_modified().map(to_timestamp),
            content_type: response.content_type().map(str::to_owned),
        };

        debug!(
            target: TRACING_TARGET_CLIENT,
            key = %key,
            size_bytes = attributes.size_bytes,
            "Streaming object body"
        );

        let mut body = response.body;
        let stream: ContentStream = Box::pin(async_stream::try_stream! {
            while let Some(chunk) = body.next().await {
                let chunk =
                    chunk.map_err(|err| Error::backend("get-object", err.to_string()))?;
                yield chunk;
            }
        });

        Ok(ObjectDownload { attributes, stream })
    }

    #[instrument(skip(self, body), target = TRACING_TARGET_CLIENT, fields(bucket = %self.config.bucket, key = %key))]
    async fn put_object(
        &self,
        key: &PreviewKey,
        content_type: &str,
        mut body: ContentStream,
    ) -> Result<PutOutcome> {
        let start = Instant::now();

        // Gather up to the threshold before committing to a transfer mode.
        let mut buffer = BytesMut::new();
        let mut exhausted = false;
        while buffer.len() <= MULTIPART_THRESHOLD {
            match body.next().await {
                Some(chunk) => buffer.extend_from_slice(&chunk?),
                None => {
                    exhausted = true;
                    break;
                }
            }
        }

        let outcome = if exhausted {
            self.put_single(key, content_type, buffer.freeze()).await?
        } else {
            self.put_multipart(key, content_type, buffer, body).await?
        };

        info!(
            target: TRACING_TARGET_CLIENT,
            key = %key,
            size_bytes = outcome.size_bytes,
            elapsed = ?start.elapsed(),
            "Object stored"
        );

        Ok(outcome)
    }

    #[instrument(skip(self), target = TRACING_TARGET_CLIENT, fields(bucket = %self.config.bucket, key = %key))]
    async fn delete_object(&self, key: &PreviewKey) -> Result<()> {
        self.client
            .delete_object()
            .bucket(self.config.bucket.as_str())
            .key(key.as_str())
            .send()
            .await
            .map_err(|err| translate_error("delete-object", &self.config.bucket, Some(key), err))?;
        Ok(())
    }

    #[instrument(skip(self), target = TRACING_TARGET_CLIENT, fields(bucket = %self.config.bucket))]
    async fn create_bucket(&self) -> Result<()> {
        let mut request = self
            .client
            .create_bucket()
            .bucket(self.config.bucket.as_str());

        // us-east-1 must omit the location constraint entirely.
        if self.config.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.config.region.as_str());
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build(),
            );
        }

        match request.send().await {
            Ok(_) => {
                info!(
                    target: TRACING_TARGET_CLIENT,
                    bucket = %self.config.bucket,
                    "Bucket created"
                );
                Ok(())
            }
            Err(err) => {
                // Another bootstrapper may have raced us; the bucket exists
                // either way.
                let already_there = err.as_service_error().is_some_and(|e| {
                    e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                });
                if already_there {
                    return Ok(());
                }
                Err(translate_error(
                    "create-bucket",
                    &self.config.bucket,
                    None,
                    err,
                ))
            }
        }
    }

    #[instrument(skip(self), target = TRACING_TARGET_CLIENT, fields(bucket = %self.config.bucket))]
    async fn bucket_exists(&self) -> Result<bool> {
        match self
            .client
            .head_bucket()
            .bucket(self.config.bucket.as_str())
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    return Ok(false);
                }
                Err(translate_error(
                    "head-bucket",
                    &self.config.bucket,
                    None,
                    err,
                ))
            }
        }
    }

    #[instrument(skip(self, options), target = TRACING_TARGET_CLIENT, fields(bucket = %self.config.bucket))]
    async fn probe(&self, options: &ProbeOptions) -> Result<()> {
        let client = self.probe_client(options);

        client
            .put_object()
            .bucket(self.config.bucket.as_str())
            .key(PROBE_KEY)
            .body(ByteStream::from_static(PROBE_BODY))
            .send()
            .await
            .map_err(|err| translate_error("probe", &self.config.bucket, None, err))?;

        debug!(
            target: TRACING_TARGET_CLIENT,
            bucket = %self.config.bucket,
            "Sentinel write succeeded"
        );
        Ok(())
    }
}

impl fmt::Debug for S3ObjectClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3ObjectClient")
            .field("endpoint", &self.config.endpoint_masked())
            .field("bucket", &self.config.bucket)
            .field("region", &self.config.region)
            .field("access_key", &self.config.credentials.access_key_masked())
            .finish()
    }
}

impl PartialEq for S3ObjectClient {
    fn eq(&self, other: &Self) -> bool {
        self.config == other.config
    }
}

impl Eq for S3ObjectClient {}

impl Hash for S3ObjectClient {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.config.hash(state);
    }
}

/// Builds the SDK configuration for either the steady-state client or a
/// short-lived probe client.
fn sdk_config(config: &S3Config, probe: Option<&ProbeOptions>) -> aws_sdk_s3::Config {
    let credentials = Credentials::new(
        config.credentials.access_key.clone(),
        config.credentials.secret_key.clone(),
        config.credentials.session_token.clone(),
        None,
        "preview-store",
    );

    let retry = match probe {
        Some(options) if options.retries == 0 => RetryConfig::disabled(),
        Some(options) => RetryConfig::standard().with_max_attempts(options.retries + 1),
        None => RetryConfig::standard(),
    };

    let (connect_timeout, read_timeout) = match probe {
        Some(options) => (options.connect_timeout, options.read_timeout),
        None => (config.connect_timeout, config.read_timeout),
    };
    let timeouts = TimeoutConfig::builder()
        .connect_timeout(connect_timeout)
        .read_timeout(read_timeout)
        .build();

    aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .endpoint_url(config.endpoint.as_str().trim_end_matches('/'))
        .credentials_provider(credentials)
        .force_path_style(config.path_style)
        .retry_config(retry)
        .timeout_config(timeouts)
        .build()
}

/// Normalizes an SDK failure into the crate's error taxonomy.
///
/// The single translation boundary: bucket absent, object absent, or an
/// unclassified backend failure. A bodyless 404 (HEAD) carries no error
/// code, so the HTTP status decides.
fn translate_error<E>(
    operation: &'static str,
    bucket: &str,
    key: Option<&PreviewKey>,
    err: SdkError<E>,
) -> Error
where
    E: ProvideErrorMetadata + fmt::Debug,
{
    match &err {
        SdkError::ServiceError(context) => {
            let code = context.err().code();
            if code == Some("NoSuchBucket") {
                return Error::no_such_bucket(bucket);
            }

            let not_found = matches!(code, Some("NoSuchKey" | "NotFound"))
                || context.raw().status().as_u16() == 404;
            if not_found {
                return match key {
                    Some(key) => Error::does_not_exist(key.as_str()),
                    None => Error::no_such_bucket(bucket),
                };
            }

            Error::backend(operation, format!("{:?}", context.err()))
        }
        other => Error::backend(operation, other.to_string()),
    }
}

fn to_timestamp(value: &DateTime) -> Timestamp {
    Timestamp::new(value.secs(), value.subsec_nanos() as i32).unwrap_or_default()
}

fn non_negative(length: Option<i64>) -> u64 {
    length.unwrap_or_default().max(0) as u64
}
