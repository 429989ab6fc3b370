//! Object-store transport
//!
//! Two interchangeable implementations of "put these bytes at this pre-signed
//! URL": [`DirectTransport`] talks straight to the S3-compatible store,
//! [`ProxiedTransport`] goes through a nearby edge worker that forwards the
//! request. Which one an upload uses is decided outside the upload flow and
//! passed in; nothing downstream branches on the choice.
//!
//! Neither implementation keeps state between calls, and neither retries on
//! its own; call sites compose them with the retry wrapper.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

mod direct;
mod proxy;

pub use direct::DirectTransport;
pub use proxy::ProxiedTransport;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Object store returned {0}")]
    Status(StatusCode),

    #[error("Proxy response missing or malformed etag: {0}")]
    BadProxyResponse(String),
}

impl crate::retry::Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        match self {
            TransportError::Network(e) => !e.is_decode(),
            TransportError::Status(status) => crate::retry::is_retryable_status(*status),
            TransportError::BadProxyResponse(_) => false,
        }
    }
}

/// Capability to move bytes to a pre-signed destination.
///
/// `put_object` and `put_part` return the ETag the store responded with,
/// or `None` when the response carried no ETag header. A missing ETag on an
/// otherwise-successful response is tolerated here (intermediaries sometimes
/// strip response headers); it is never an error at this layer and never
/// synthesized. What "tag unknown" means is up to the caller.
#[async_trait]
pub trait ObjectTransport: Send + Sync {
    /// Upload a whole object's bytes to a pre-signed URL
    async fn put_object(&self, url: &str, data: Bytes) -> Result<Option<String>, TransportError>;

    /// Upload one part of a multipart upload to its pre-signed URL
    async fn put_part(&self, url: &str, data: Bytes) -> Result<Option<String>, TransportError>;

    /// Report the completion manifest to the pre-signed completion URL
    async fn complete_multipart(&self, url: &str, body: String) -> Result<(), TransportError>;
}

pub(crate) fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, TransportError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TransportError::Status(status))
    }
}

pub(crate) fn etag_header(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::ETAG)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}
