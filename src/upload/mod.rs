//! Upload module
//!
//! Orchestrates object uploads end to end: acquire a pre-signed destination,
//! move the bytes through the configured transport (single-shot or
//! multipart), and hand back the object key the control plane will recognize.

use crate::config::{Config, ConfigError, RetryTuning, TransportMode, UploadTuning};
use crate::metrics;
use crate::remote::{RemoteClient, RemoteError, UrlPool};
use crate::retry::{with_retry, BackoffPolicy};
use crate::session::Credentials;
use crate::transport::{DirectTransport, ObjectTransport, ProxiedTransport, TransportError};
use bytes::Bytes;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod create_file;
pub mod multipart;

use multipart::MultipartUploader;

/// Upload errors
///
/// Every failure carries which phase it happened in, and the part number
/// where one applies, so the caller can decide whether to re-attempt the
/// whole upload.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client construction failed: {0}")]
    Init(#[from] reqwest::Error),

    #[error("Failed to acquire upload URLs: {0}")]
    Urls(#[from] RemoteError),

    #[error("Part {part_number} upload failed: {source}")]
    Part {
        part_number: u32,
        source: TransportError,
    },

    #[error("Part {part_number} completed without an ETag")]
    MissingPartEtag { part_number: u32 },

    #[error("Upload would need {count} parts, more than the store allows")]
    TooManyParts { count: usize },

    #[error("Object upload failed: {0}")]
    Put(TransportError),

    #[error("Completion report failed: {0}")]
    Completion(TransportError),

    #[error("Creating the file record failed: {0}")]
    CreateFile(RemoteError),

    #[error("Upload cancelled")]
    Cancelled,
}

impl UploadError {
    /// Which phase of the upload the failure happened in
    pub fn phase(&self) -> &'static str {
        match self {
            UploadError::Config(_) | UploadError::Init(_) => "setup",
            UploadError::Urls(_) => "acquisition",
            UploadError::Part { .. }
            | UploadError::MissingPartEtag { .. }
            | UploadError::TooManyParts { .. } => "part_transfer",
            UploadError::Put(_) => "object_transfer",
            UploadError::Completion(_) => "completion",
            UploadError::CreateFile(_) => "create_file",
            UploadError::Cancelled => "cancelled",
        }
    }
}

/// A successfully uploaded object.
///
/// `etag` is `None` when the store's response carried no ETag header
/// ("tag unknown"); for single-shot uploads that is tolerated, since the
/// control plane's file record, not the ETag, identifies the object.
#[derive(Debug, Clone)]
pub struct UploadedObject {
    pub object_key: String,
    pub etag: Option<String>,
}

/// Split `total_len` bytes into part-sized ranges.
///
/// Every range but the last spans exactly `part_size` bytes. Always returns
/// at least one range; a single-part plan goes through the same flow as any
/// other.
pub fn plan_parts(total_len: usize, part_size: usize) -> Vec<Range<usize>> {
    debug_assert!(part_size > 0);
    if total_len == 0 {
        return vec![0..0];
    }
    (0..total_len)
        .step_by(part_size)
        .map(|start| start..(start + part_size).min(total_len))
        .collect()
}

/// Uploads objects to the store, choosing single-shot or multipart by size.
///
/// The threshold decision lives here, not in the multipart orchestrator;
/// callers that want to force one path can use [`MultipartUploader`] or the
/// transport directly.
pub struct Uploader {
    remote: Arc<RemoteClient>,
    transport: Arc<dyn ObjectTransport>,
    pool: UrlPool,
    multipart: MultipartUploader,
    tuning: UploadTuning,
    retry: RetryTuning,
    mode: TransportMode,
}

impl Uploader {
    /// Build an uploader from configuration.
    ///
    /// One connection pool is shared by the control-plane client and the
    /// object-store transport.
    pub fn new(config: &Config) -> Result<Self, UploadError> {
        config.validate()?;

        let http = reqwest::Client::builder().build()?;
        let remote = Arc::new(RemoteClient::from_client(
            http.clone(),
            config.api_origin.clone(),
            config.retry.clone(),
        ));

        let transport: Arc<dyn ObjectTransport> = match config.transport {
            TransportMode::Direct => Arc::new(DirectTransport::from_client(http)),
            TransportMode::Proxied => {
                let origin = config.uploader_origin.clone().ok_or_else(|| {
                    ConfigError::ValidationError(
                        "uploader_origin is required when transport is 'proxied'".into(),
                    )
                })?;
                Arc::new(ProxiedTransport::from_client(http, origin))
            }
        };

        let multipart = MultipartUploader::new(
            Arc::clone(&remote),
            Arc::clone(&transport),
            &config.upload,
            config.retry.clone(),
        );

        Ok(Self {
            remote,
            transport,
            pool: UrlPool::new(),
            multipart,
            tuning: config.upload.clone(),
            retry: config.retry.clone(),
            mode: config.transport,
        })
    }

    /// The multipart orchestrator, for callers that force the multipart path
    pub fn multipart(&self) -> &MultipartUploader {
        &self.multipart
    }

    /// Upload one object's bytes, returning the object key remote will use.
    ///
    /// Objects at or above the configured multipart threshold go through the
    /// multipart flow; everything else is one PUT to a pooled pre-signed
    /// destination. Either way the attempt is cooperatively cancellable via
    /// `cancel` and never reports success unless every request succeeded.
    #[tracing::instrument(
        name = "upload.object",
        skip(self, data, credentials, cancel),
        fields(
            upload.bytes = data.len(),
            upload.transport = self.mode.as_str(),
            s3.object_key = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_object(
        &self,
        data: Bytes,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<UploadedObject, UploadError> {
        let bytes = data.len() as u64;
        let start = Instant::now();

        let multipart = data.len() >= self.tuning.multipart_threshold;
        let method = if multipart { "multipart" } else { "put_object" };

        let result = if multipart {
            self.multipart.upload(data, credentials, cancel).await
        } else {
            self.put_single(data, credentials, cancel).await
        };

        metrics::record_upload_duration(method, start.elapsed().as_secs_f64());

        match &result {
            Ok(object) => {
                metrics::record_upload_success(method, bytes);
                tracing::Span::current().record("s3.object_key", object.object_key.as_str());
                tracing::info!(
                    object_key = %object.object_key,
                    bytes = bytes,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Upload completed"
                );
            }
            Err(error) => {
                metrics::record_upload_failure(method);
                metrics::record_error(error.phase());
                tracing::error!(error = %error, phase = error.phase(), "Upload failed");
            }
        }

        result
    }

    async fn put_single(
        &self,
        data: Bytes,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<UploadedObject, UploadError> {
        let destination = self.pool.next(&self.remote, 1, credentials).await?;

        let policy =
            BackoffPolicy::from_tuning(&self.retry).with_cancellation(cancel.clone());
        let etag = tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = with_retry(&policy, || {
                self.transport.put_object(&destination.url, data.clone())
            }) => result.map_err(UploadError::Put)?,
        };

        Ok(UploadedObject {
            object_key: destination.object_key,
            etag,
        })
    }
}
