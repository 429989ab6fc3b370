//! Proxied transport
//!
//! Issues upload requests to a fixed "uploader origin" edge worker that
//! forwards them to the object store. The real pre-signed destination rides
//! in the `UPLOAD-URL` header. Used when direct connectivity to the store is
//! disallowed or slow from the client's network.
//!
//! The worker responds to part uploads with a JSON body `{"etag": ...}`
//! rather than an ETag header, and that field is required; single-object
//! uploads keep the header convention of the store itself.

use super::{check_status, etag_header, ObjectTransport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;

/// Header carrying the real pre-signed destination through the worker
const UPLOAD_URL_HEADER: &str = "UPLOAD-URL";

#[derive(Debug, Deserialize)]
struct PartUploadResponse {
    etag: String,
}

/// Transport that routes uploads through the edge worker
pub struct ProxiedTransport {
    http: reqwest::Client,
    uploader_origin: String,
}

impl ProxiedTransport {
    pub fn new(uploader_origin: impl Into<String>) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::from_client(http, uploader_origin))
    }

    /// Reuse an existing connection pool
    pub fn from_client(http: reqwest::Client, uploader_origin: impl Into<String>) -> Self {
        Self {
            http,
            uploader_origin: uploader_origin.into(),
        }
    }
}

#[async_trait]
impl ObjectTransport for ProxiedTransport {
    #[tracing::instrument(name = "transport.proxy.put_object", skip_all, fields(upload.bytes = data.len()), err)]
    async fn put_object(&self, url: &str, data: Bytes) -> Result<Option<String>, TransportError> {
        let response = check_status(
            self.http
                .put(format!("{}/file-upload", self.uploader_origin))
                .header(UPLOAD_URL_HEADER, url)
                .body(data)
                .send()
                .await?,
        )?;
        Ok(etag_header(&response))
    }

    #[tracing::instrument(name = "transport.proxy.put_part", skip_all, fields(upload.bytes = data.len()), err)]
    async fn put_part(&self, url: &str, data: Bytes) -> Result<Option<String>, TransportError> {
        let response = check_status(
            self.http
                .put(format!("{}/multipart-upload", self.uploader_origin))
                .header(UPLOAD_URL_HEADER, url)
                .body(data)
                .send()
                .await?,
        )?;
        let body: PartUploadResponse = response
            .json()
            .await
            .map_err(|e| TransportError::BadProxyResponse(e.to_string()))?;
        Ok(Some(body.etag))
    }

    #[tracing::instrument(name = "transport.proxy.complete_multipart", skip_all, err)]
    async fn complete_multipart(&self, url: &str, body: String) -> Result<(), TransportError> {
        check_status(
            self.http
                .post(format!("{}/multipart-complete", self.uploader_origin))
                .header(UPLOAD_URL_HEADER, url)
                .header(reqwest::header::CONTENT_TYPE, "text/xml")
                .body(body)
                .send()
                .await?,
        )?;
        Ok(())
    }
}
