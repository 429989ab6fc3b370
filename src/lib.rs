//! Kappa Upload Library
//!
//! Client-side large object upload orchestration for S3-compatible storage
//! behind a pre-signed-URL control plane.
//!
//! # Features
//!
//! - **Single-shot and multipart**: objects above a configurable threshold
//!   split into parts, uploaded concurrently, and finalized with a
//!   completion manifest
//! - **Two transports**: direct to the object store, or via a proxying edge
//!   worker, selectable per deployment
//! - **Two session kinds**: authenticated account sessions and anonymous
//!   public-album sessions share one code path
//! - **Injected retry policies**: each call site carries its own backoff and
//!   abort rules
//!
//! # Example
//!
//! ```no_run
//! use kappa_upload::{Config, Credentials, Uploader};
//! use bytes::Bytes;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let uploader = Uploader::new(&config)?;
//!
//!     let credentials = Credentials::account("session-token");
//!     let cancel = CancellationToken::new();
//!     let data = Bytes::from(std::fs::read("photo.bin")?);
//!
//!     let object = uploader.upload_object(data, &credentials, &cancel).await?;
//!     println!("uploaded as {}", object.object_key);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod remote;
pub mod retry;
pub mod session;
pub mod transport;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use session::Credentials;
pub use upload::{UploadError, UploadedObject, Uploader};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
