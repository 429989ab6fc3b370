//! Multipart upload orchestrator
//!
//! Drives one multipart upload attempt: plan the parts, acquire a matching
//! pre-signed URL set, PUT every part through the transport and retry
//! wrapper, then report the consolidated part list to the completion URL.
//!
//! Parts transfer concurrently and may finish in any order; the only
//! ordering requirement is that the completion manifest lists them by
//! ascending part number. There is no partial-success outcome: either every
//! part and the completion call succeeded, or the attempt failed. Parts that
//! did reach the store before a failure are left for the control plane's
//! lifecycle cleanup.

use super::{plan_parts, UploadError, UploadedObject};
use crate::config::{RetryTuning, UploadTuning};
use crate::metrics;
use crate::remote::RemoteClient;
use crate::retry::{with_retry, BackoffPolicy};
use crate::session::Credentials;
use crate::transport::ObjectTransport;
use bytes::Bytes;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Minimum part size (5MB) - S3 requirement
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum parts the store accepts per upload
pub const MAX_PARTS: usize = 10000;

/// One successfully uploaded part: its 1-indexed position in the object and
/// the entity tag the store returned for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Build the completion manifest reported to the completion URL.
///
/// The string structure is the wire contract, so it is assembled by hand
/// rather than through an XML library:
///
/// ```text
/// <CompleteMultipartUpload>
/// <Part><PartNumber>1</PartNumber><ETag>"1b3e6cdb1270c0b664076f109a7137c1"</ETag></Part>
/// <Part><PartNumber>2</PartNumber><ETag>"6049d6384a9e65694c833a3aca6584fd"</ETag></Part>
/// </CompleteMultipartUpload>
/// ```
///
/// ETag values arrive from the store already quoted and are passed through
/// verbatim, with no extra quoting or escaping. `parts` must already be in
/// ascending part-number order.
pub fn complete_multipart_request_body(parts: &[CompletedPart]) -> String {
    let elements: Vec<String> = parts
        .iter()
        .map(|part| {
            format!(
                "<Part><PartNumber>{}</PartNumber><ETag>{}</ETag></Part>",
                part.part_number, part.etag
            )
        })
        .collect();
    format!(
        "<CompleteMultipartUpload>\n{}\n</CompleteMultipartUpload>",
        elements.join("\n")
    )
}

/// Multipart upload orchestrator
pub struct MultipartUploader {
    remote: Arc<RemoteClient>,
    transport: Arc<dyn ObjectTransport>,
    part_size: usize,
    concurrent_parts: usize,
    retry: RetryTuning,
}

impl MultipartUploader {
    pub fn new(
        remote: Arc<RemoteClient>,
        transport: Arc<dyn ObjectTransport>,
        tuning: &UploadTuning,
        retry: RetryTuning,
    ) -> Self {
        Self {
            remote,
            transport,
            part_size: tuning.part_size.max(MIN_PART_SIZE),
            concurrent_parts: tuning.concurrent_parts.max(1),
            retry,
        }
    }

    /// Upload `data` as a multipart object.
    ///
    /// A single-part plan is permitted and goes through the same flow. The
    /// pre-signed URL set is acquired once per attempt; retries re-PUT to
    /// the same part URL, they never re-acquire. Cancellation via `cancel`
    /// abandons the attempt without issuing the completion call.
    #[tracing::instrument(
        name = "upload.multipart",
        skip(self, data, credentials, cancel),
        fields(
            upload.bytes = data.len(),
            upload.parts = tracing::field::Empty,
            s3.object_key = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload(
        &self,
        data: Bytes,
        credentials: &Credentials,
        cancel: &CancellationToken,
    ) -> Result<UploadedObject, UploadError> {
        let ranges = plan_parts(data.len(), self.part_size);
        if ranges.len() > MAX_PARTS {
            return Err(UploadError::TooManyParts {
                count: ranges.len(),
            });
        }

        let urls = self
            .remote
            .fetch_multipart_upload_urls(ranges.len(), credentials)
            .await?;

        let span = tracing::Span::current();
        span.record("upload.parts", ranges.len());
        span.record("s3.object_key", urls.object_key.as_str());

        let mut parts = tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = self.upload_parts(&data, &ranges, &urls.part_urls, cancel) => result?,
        };

        parts.sort_by_key(|part| part.part_number);
        debug_assert!(
            parts
                .iter()
                .enumerate()
                .all(|(index, part)| part.part_number == (index + 1) as u32),
            "completed parts must cover every part number exactly once"
        );

        let body = complete_multipart_request_body(&parts);
        let policy =
            BackoffPolicy::from_tuning(&self.retry).with_cancellation(cancel.clone());
        tokio::select! {
            _ = cancel.cancelled() => return Err(UploadError::Cancelled),
            result = with_retry(&policy, || {
                self.transport.complete_multipart(&urls.complete_url, body.clone())
            }) => result.map_err(UploadError::Completion)?,
        }

        metrics::record_multipart_parts(parts.len());
        tracing::info!(
            object_key = %urls.object_key,
            parts = parts.len(),
            "Completed multipart upload"
        );

        Ok(UploadedObject {
            object_key: urls.object_key,
            etag: None,
        })
    }

    /// PUT every part, at most `concurrent_parts` in flight, tolerating
    /// arbitrary completion order.
    async fn upload_parts(
        &self,
        data: &Bytes,
        ranges: &[Range<usize>],
        part_urls: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<CompletedPart>, UploadError> {
        let transfers = ranges
            .iter()
            .cloned()
            .zip(part_urls.iter())
            .enumerate()
            .map(|(index, (range, part_url))| {
                let part_number = (index + 1) as u32;
                let chunk = data.slice(range);
                async move {
                    let policy = BackoffPolicy::from_tuning(&self.retry)
                        .with_cancellation(cancel.clone());
                    let etag = with_retry(&policy, || {
                        self.transport.put_part(part_url, chunk.clone())
                    })
                    .await
                    .map_err(|source| UploadError::Part {
                        part_number,
                        source,
                    })?;

                    // The store's response must identify the part; a stripped
                    // ETag is tolerated by the transport but not here.
                    let etag = etag.ok_or(UploadError::MissingPartEtag { part_number })?;

                    tracing::debug!(part_number, bytes = chunk.len(), "Uploaded part");
                    Ok(CompletedPart { part_number, etag })
                }
            });

        stream::iter(transfers)
            .buffer_unordered(self.concurrent_parts)
            .try_collect()
            .await
    }
}
