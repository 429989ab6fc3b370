//! Kappa Upload - upload one file to pre-signed S3-compatible storage
//!
//! Stages a file's bytes into the object store (single-shot or multipart by
//! size) and prints the object key the control plane will recognize.

use bytes::Bytes;
use clap::Parser;
use kappa_upload::{Config, Credentials, Uploader};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Kappa Upload - pre-signed upload client
#[derive(Parser, Debug)]
#[command(name = "kappa-upload")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File to upload
    file: PathBuf,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Account session token
    #[arg(long, conflicts_with = "album_token")]
    token: Option<String>,

    /// Public-album access token
    #[arg(long)]
    album_token: Option<String>,

    /// Password token for protected public albums
    #[arg(long, requires = "album_token")]
    album_token_jwt: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Kappa Upload v{}", env!("CARGO_PKG_VERSION"));

    let credentials = match (&args.token, &args.album_token) {
        (Some(token), None) => Credentials::account(token),
        (None, Some(access_token)) => {
            Credentials::public_album(access_token, args.album_token_jwt.clone())
        }
        _ => anyhow::bail!("Provide exactly one of --token or --album-token"),
    };

    // Load configuration
    let config = Config::load(&args.config)?;
    info!("Loaded configuration from {:?}", args.config);

    let uploader = Uploader::new(&config)?;

    let data = Bytes::from(tokio::fs::read(&args.file).await?);
    info!(file = ?args.file, bytes = data.len(), "Read file");

    // Ctrl-C abandons the attempt cooperatively
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let object = uploader.upload_object(data, &credentials, &cancel).await?;

    info!(
        object_key = %object.object_key,
        etag = object.etag.as_deref().unwrap_or("unknown"),
        "Upload finished"
    );
    println!("{}", object.object_key);

    Ok(())
}
