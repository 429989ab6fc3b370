//! Session credentials
//!
//! The upload flow runs either inside an authenticated account session or an
//! anonymous public-album session. The credential value is opaque to the rest
//! of the crate: it is consulted only to build request headers and to pick
//! which control-plane path family a call goes to. Everything else is one
//! code path parameterized by this value.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

/// Header carrying the account session token.
const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Header carrying the public-album access token.
const ACCESS_TOKEN_HEADER: &str = "x-auth-access-token";

/// Header carrying the optional password-derived token for protected albums.
const ACCESS_TOKEN_JWT_HEADER: &str = "x-auth-access-token-jwt";

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Credential token is not a valid header value")]
    InvalidToken,
}

/// Credentials for one of the two session kinds.
///
/// The tokens are produced and managed elsewhere; this crate never inspects
/// or mutates them, it only forwards them on control-plane requests.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// An authenticated account session.
    Account { token: String },
    /// An anonymous public-album session. The JWT is present only for
    /// password-protected albums.
    PublicAlbum {
        access_token: String,
        access_token_jwt: Option<String>,
    },
}

impl Credentials {
    /// Credentials for an authenticated account session
    pub fn account(token: impl Into<String>) -> Self {
        Self::Account {
            token: token.into(),
        }
    }

    /// Credentials for a public-album session
    pub fn public_album(
        access_token: impl Into<String>,
        access_token_jwt: Option<String>,
    ) -> Self {
        Self::PublicAlbum {
            access_token: access_token.into(),
            access_token_jwt,
        }
    }

    /// Build the request headers this credential kind requires
    pub fn request_headers(&self) -> Result<HeaderMap, SessionError> {
        let mut headers = HeaderMap::new();
        match self {
            Credentials::Account { token } => {
                headers.insert(
                    HeaderName::from_static(AUTH_TOKEN_HEADER),
                    header_value(token)?,
                );
            }
            Credentials::PublicAlbum {
                access_token,
                access_token_jwt,
            } => {
                headers.insert(
                    HeaderName::from_static(ACCESS_TOKEN_HEADER),
                    header_value(access_token)?,
                );
                if let Some(jwt) = access_token_jwt {
                    headers.insert(
                        HeaderName::from_static(ACCESS_TOKEN_JWT_HEADER),
                        header_value(jwt)?,
                    );
                }
            }
        }
        Ok(headers)
    }

    /// Control-plane path for fetching single-object upload URLs
    pub fn upload_urls_path(&self) -> &'static str {
        match self {
            Credentials::Account { .. } => "/files/upload-urls",
            Credentials::PublicAlbum { .. } => "/public-collection/upload-urls",
        }
    }

    /// Control-plane path for fetching multipart upload URLs
    pub fn multipart_upload_urls_path(&self) -> &'static str {
        match self {
            Credentials::Account { .. } => "/files/multipart-upload-urls",
            Credentials::PublicAlbum { .. } => "/public-collection/multipart-upload-urls",
        }
    }

    /// Control-plane path for creating the file record
    pub fn create_file_path(&self) -> &'static str {
        match self {
            Credentials::Account { .. } => "/files",
            Credentials::PublicAlbum { .. } => "/public-collection/file",
        }
    }
}

fn header_value(token: &str) -> Result<HeaderValue, SessionError> {
    HeaderValue::from_str(token).map_err(|_| SessionError::InvalidToken)
}
