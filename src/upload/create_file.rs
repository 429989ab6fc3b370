//! File record creation
//!
//! After an object's bytes are in the store, the control plane learns about
//! the file through a "create file" call carrying the fully-prepared upload
//! descriptor (which references the object key, and for multipart uploads
//! whatever part metadata the collaborator packaged). This is the lowest
//! layer for that call: it retries per its policy, logs diagnostic context
//! on failure, and re-raises - it never swallows errors.

use super::UploadError;
use crate::config::RetryTuning;
use crate::remote::{check_status, RemoteError};
use crate::retry::{with_retry, BackoffPolicy};
use crate::session::Credentials;
use std::sync::Arc;

/// Client for the control plane's create-file endpoints
pub struct FileClient {
    http: reqwest::Client,
    api_origin: String,
    retry: RetryTuning,
    abort_if: Option<Arc<dyn Fn(&RemoteError) -> bool + Send + Sync>>,
}

impl FileClient {
    /// Create a new client for the given control-plane origin
    pub fn new(api_origin: impl Into<String>) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self::from_client(
            http,
            api_origin,
            RetryTuning::default(),
        ))
    }

    /// Create a client reusing an existing connection pool
    pub fn from_client(
        http: reqwest::Client,
        api_origin: impl Into<String>,
        retry: RetryTuning,
    ) -> Self {
        Self {
            http,
            api_origin: api_origin.into(),
            retry,
            abort_if: None,
        }
    }

    /// Install an upload-specific abort rule.
    ///
    /// The predicate sees every failure before the policy decides on a
    /// retry; returning `true` stops further attempts even for otherwise
    /// transient errors (e.g. once the account's storage quota is known to
    /// be exhausted, re-posting the descriptor cannot succeed).
    pub fn abort_when(
        mut self,
        predicate: impl Fn(&RemoteError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.abort_if = Some(Arc::new(predicate));
        self
    }

    /// POST the upload descriptor and return the canonical file record.
    ///
    /// The account and public-album variants differ only in the endpoint and
    /// headers the credential selects.
    #[tracing::instrument(
        name = "upload.create_file",
        skip(self, payload, credentials),
        err
    )]
    pub async fn create_file(
        &self,
        payload: &serde_json::Value,
        credentials: &Credentials,
    ) -> Result<serde_json::Value, UploadError> {
        let endpoint = credentials.create_file_path();
        let url = format!("{}{}", self.api_origin, endpoint);
        let headers = credentials
            .request_headers()
            .map_err(RemoteError::from)
            .map_err(UploadError::CreateFile)?;

        let mut policy = BackoffPolicy::from_tuning(&self.retry);
        if let Some(abort_if) = &self.abort_if {
            let abort_if = Arc::clone(abort_if);
            policy = policy.abort_if(move |error| abort_if(error));
        }

        let record = with_retry(&policy, || {
            let request = self.http.post(&url).headers(headers.clone()).json(payload);
            async move {
                let response = check_status(request.send().await?, endpoint)?;
                Ok::<serde_json::Value, RemoteError>(response.json().await?)
            }
        })
        .await
        .map_err(|error| {
            tracing::error!(endpoint = endpoint, error = %error, "Creating file record failed");
            UploadError::CreateFile(error)
        })?;

        Ok(record)
    }
}
