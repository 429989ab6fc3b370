//! Direct transport
//!
//! Issues upload requests straight to the pre-signed URL on the
//! S3-compatible store.

use super::{check_status, etag_header, ObjectTransport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;

/// Transport that talks to the object store directly
pub struct DirectTransport {
    http: reqwest::Client,
}

impl DirectTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::from_client(http))
    }

    /// Reuse an existing connection pool
    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    async fn put(&self, url: &str, data: Bytes) -> Result<Option<String>, TransportError> {
        let response = check_status(self.http.put(url).body(data).send().await?)?;
        Ok(etag_header(&response))
    }
}

#[async_trait]
impl ObjectTransport for DirectTransport {
    #[tracing::instrument(name = "transport.direct.put_object", skip_all, fields(upload.bytes = data.len()), err)]
    async fn put_object(&self, url: &str, data: Bytes) -> Result<Option<String>, TransportError> {
        self.put(url, data).await
    }

    #[tracing::instrument(name = "transport.direct.put_part", skip_all, fields(upload.bytes = data.len()), err)]
    async fn put_part(&self, url: &str, data: Bytes) -> Result<Option<String>, TransportError> {
        self.put(url, data).await
    }

    #[tracing::instrument(name = "transport.direct.complete_multipart", skip_all, err)]
    async fn complete_multipart(&self, url: &str, body: String) -> Result<(), TransportError> {
        check_status(
            self.http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "text/xml")
                .body(body)
                .send()
                .await?,
        )?;
        Ok(())
    }
}
