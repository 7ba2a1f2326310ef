use std::path::PathBuf;

use clap::{Args, Parser, ValueEnum, builder::BoolishValueParser};

/// Command-line arguments for the sigrelay binary.
#[derive(Debug, Parser)]
#[command(
    name = "sigrelay",
    version,
    about = "Email signature processing service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SIGRELAY_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendArg {
    S3,
    Filesystem,
    Memory,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the object store backend.
    #[arg(long = "storage-backend", value_name = "BACKEND", value_enum)]
    pub storage_backend: Option<BackendArg>,

    /// Override the object store region.
    #[arg(long = "storage-region", value_name = "REGION")]
    pub storage_region: Option<String>,

    /// Override the bucket receiving signature images.
    #[arg(long = "storage-asset-bucket", value_name = "BUCKET")]
    pub storage_asset_bucket: Option<String>,

    /// Override the bucket receiving signature documents.
    #[arg(long = "storage-document-bucket", value_name = "BUCKET")]
    pub storage_document_bucket: Option<String>,

    /// Override the public base URL used in rewritten image sources.
    #[arg(long = "storage-public-base-url", value_name = "URL")]
    pub storage_public_base_url: Option<String>,

    /// Override the S3 endpoint (for S3-compatible stores).
    #[arg(long = "storage-endpoint-url", value_name = "URL")]
    pub storage_endpoint_url: Option<String>,

    /// Override the root directory of the filesystem backend.
    #[arg(long = "storage-filesystem-root", value_name = "PATH")]
    pub storage_filesystem_root: Option<PathBuf>,

    /// Override the maximum request size for submissions in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,

    /// Override how many images are uploaded concurrently per request.
    #[arg(long = "uploads-concurrency", value_name = "COUNT")]
    pub uploads_concurrency: Option<u32>,

    /// Override the per-object store timeout.
    #[arg(long = "uploads-store-timeout-seconds", value_name = "SECONDS")]
    pub uploads_store_timeout_seconds: Option<u64>,
}
