//! Pre-signed URL source
//!
//! Client for the control-plane endpoints that hand out short-lived upload
//! destinations: batches of single-object URLs and per-upload multipart URL
//! sets. Both exist in an account and a public-album variant; the variant is
//! selected by the [`Credentials`] value, never by separate code paths.
//!
//! Acquisition calls wrap their single HTTP round trip in the retry wrapper;
//! a non-success status that survives the policy is a hard failure for that
//! acquisition, surfaced immediately to the caller.

use crate::retry::{is_retryable_status, with_retry, BackoffPolicy, Retryable};
use crate::session::{Credentials, SessionError};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::Mutex;

/// Largest number of single-object destinations requested in one round trip
const MAX_URL_BATCH: usize = 50;

/// Control-plane errors
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Control plane returned {status} for {endpoint}")]
    Status {
        status: StatusCode,
        endpoint: &'static str,
    },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Control plane returned no upload URLs")]
    NoUploadUrls,

    #[error("Requested {requested} part URLs but received {received}")]
    PartUrlCount { requested: usize, received: usize },
}

impl Retryable for RemoteError {
    fn is_retryable(&self) -> bool {
        match self {
            // Malformed response bodies are not transient; everything else
            // at the connection level is worth another attempt.
            RemoteError::Network(e) => !e.is_decode(),
            RemoteError::Status { status, .. } => is_retryable_status(*status),
            RemoteError::Session(_) => false,
            RemoteError::NoUploadUrls => false,
            RemoteError::PartUrlCount { .. } => false,
        }
    }
}

/// A pre-signed URL along with the object key that remote (both the control
/// plane and the S3 bucket) will use to refer to the uploaded contents.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectUploadUrl {
    #[serde(rename = "objectKey")]
    pub object_key: String,
    pub url: String,
}

/// The URL set for one multipart upload attempt: one pre-signed URL per part,
/// a completion URL, and the final object key. Created once per attempt and
/// never reused across attempts.
#[derive(Debug, Clone, Deserialize)]
pub struct MultipartUploadUrls {
    #[serde(rename = "objectKey")]
    pub object_key: String,
    #[serde(rename = "partURLs")]
    pub part_urls: Vec<String>,
    #[serde(rename = "completeURL")]
    pub complete_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadUrlsResponse {
    urls: Vec<ObjectUploadUrl>,
}

#[derive(Debug, Deserialize)]
struct MultipartUploadUrlsResponse {
    urls: MultipartUploadUrls,
}

/// Client for the control plane's upload-URL endpoints
pub struct RemoteClient {
    http: reqwest::Client,
    api_origin: String,
    retry: crate::config::RetryTuning,
}

impl RemoteClient {
    /// Create a new client for the given control-plane origin
    pub fn new(api_origin: impl Into<String>) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::from_client(
            http,
            api_origin,
            crate::config::RetryTuning::default(),
        ))
    }

    /// Create a client reusing an existing connection pool
    pub fn from_client(
        http: reqwest::Client,
        api_origin: impl Into<String>,
        retry: crate::config::RetryTuning,
    ) -> Self {
        Self {
            http,
            api_origin: api_origin.into(),
            retry,
        }
    }

    fn policy(&self) -> BackoffPolicy<RemoteError> {
        BackoffPolicy::from_tuning(&self.retry)
    }

    /// Fetch a fresh batch of single-object upload destinations.
    ///
    /// `count_hint` is advisory: twice the hint (capped at 50) is requested
    /// in one round trip so that several queued files can share one
    /// control-plane call. The response may still contain fewer URLs than
    /// requested; callers re-request when they run out.
    #[tracing::instrument(
        name = "remote.fetch_upload_urls",
        skip(self, credentials),
        fields(url_count = tracing::field::Empty),
        err
    )]
    pub async fn fetch_upload_urls(
        &self,
        count_hint: usize,
        credentials: &Credentials,
    ) -> Result<Vec<ObjectUploadUrl>, RemoteError> {
        let count = MAX_URL_BATCH.min(count_hint.saturating_mul(2));
        let endpoint = credentials.upload_urls_path();
        let url = format!("{}{}", self.api_origin, endpoint);
        let headers = credentials.request_headers()?;

        let response: UploadUrlsResponse = with_retry(&self.policy(), || {
            let request = self
                .http
                .get(&url)
                .query(&[("count", count)])
                .headers(headers.clone());
            async move {
                let response = check_status(request.send().await?, endpoint)?;
                Ok(response.json().await?)
            }
        })
        .await?;

        tracing::Span::current().record("url_count", response.urls.len());
        Ok(response.urls)
    }

    /// Fetch the URL set for a multipart upload of exactly `part_count`
    /// parts. The control plane returns one pre-signed URL per part plus a
    /// completion URL; a count mismatch is rejected here rather than
    /// surfacing later as a hole in the part bookkeeping.
    #[tracing::instrument(
        name = "remote.fetch_multipart_upload_urls",
        skip(self, credentials),
        fields(s3.object_key = tracing::field::Empty),
        err
    )]
    pub async fn fetch_multipart_upload_urls(
        &self,
        part_count: usize,
        credentials: &Credentials,
    ) -> Result<MultipartUploadUrls, RemoteError> {
        let endpoint = credentials.multipart_upload_urls_path();
        let url = format!("{}{}", self.api_origin, endpoint);
        let headers = credentials.request_headers()?;

        let response: MultipartUploadUrlsResponse = with_retry(&self.policy(), || {
            let request = self
                .http
                .get(&url)
                .query(&[("count", part_count)])
                .headers(headers.clone());
            async move {
                let response = check_status(request.send().await?, endpoint)?;
                Ok(response.json().await?)
            }
        })
        .await?;

        let urls = response.urls;
        if urls.part_urls.len() != part_count {
            return Err(RemoteError::PartUrlCount {
                requested: part_count,
                received: urls.part_urls.len(),
            });
        }

        tracing::Span::current().record("s3.object_key", urls.object_key.as_str());
        Ok(urls)
    }
}

pub(crate) fn check_status(
    response: reqwest::Response,
    endpoint: &'static str,
) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(RemoteError::Status { status, endpoint })
    }
}

/// Prefetched queue of single-object upload destinations.
///
/// Hands out one destination at a time and refills from the control plane
/// when exhausted. Each destination is removed from the queue as it is
/// handed out; pre-signed URLs are single-use.
pub struct UrlPool {
    pending: Mutex<VecDeque<ObjectUploadUrl>>,
}

impl UrlPool {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Take the next destination, refilling the pool if it is empty.
    ///
    /// `count_hint` sizes the refill request for the number of objects the
    /// caller still expects to upload.
    pub async fn next(
        &self,
        client: &RemoteClient,
        count_hint: usize,
        credentials: &Credentials,
    ) -> Result<ObjectUploadUrl, RemoteError> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            let fetched = client.fetch_upload_urls(count_hint, credentials).await?;
            pending.extend(fetched);
        }
        pending.pop_front().ok_or(RemoteError::NoUploadUrls)
    }
}

impl Default for UrlPool {
    fn default() -> Self {
        Self::new()
    }
}
