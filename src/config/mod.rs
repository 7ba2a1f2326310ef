//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::pipeline::PipelineSettings;
use crate::domain::layout::{StorageLayout, s3_public_base};

pub use cli::{BackendArg, CliArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "sigrelay";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REGION: &str = "us-east-2";
const DEFAULT_ASSET_BUCKET: &str = "finny-cdn";
const DEFAULT_DOCUMENT_BUCKET: &str = "advisor-onboarding-documents";
const DEFAULT_FILESYSTEM_ROOT: &str = "storage";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_UPLOAD_CONCURRENCY: u64 = 4;
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    S3,
    Filesystem,
    Memory,
}

impl From<BackendArg> for StorageBackend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::S3 => StorageBackend::S3,
            BackendArg::Filesystem => StorageBackend::Filesystem,
            BackendArg::Memory => StorageBackend::Memory,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub region: String,
    pub asset_bucket: String,
    pub document_bucket: String,
    pub public_base_url: Url,
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
    pub filesystem_root: PathBuf,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_request_bytes: NonZeroU64,
    pub concurrency: NonZeroUsize,
    pub store_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

impl Settings {
    pub fn storage_layout(&self) -> Result<StorageLayout, LoadError> {
        StorageLayout::new(
            self.storage.asset_bucket.clone(),
            self.storage.document_bucket.clone(),
            self.storage.public_base_url.clone(),
        )
        .map_err(|err| LoadError::invalid("storage", err.to_string()))
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            upload_concurrency: self.uploads.concurrency,
            store_timeout: self.uploads.store_timeout,
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SIGRELAY").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_serve_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    storage: RawStorageSettings,
    uploads: RawUploadSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(backend) = overrides.storage_backend {
            self.storage.backend = Some(backend.into());
        }
        if let Some(region) = overrides.storage_region.as_ref() {
            self.storage.region = Some(region.clone());
        }
        if let Some(bucket) = overrides.storage_asset_bucket.as_ref() {
            self.storage.asset_bucket = Some(bucket.clone());
        }
        if let Some(bucket) = overrides.storage_document_bucket.as_ref() {
            self.storage.document_bucket = Some(bucket.clone());
        }
        if let Some(url) = overrides.storage_public_base_url.as_ref() {
            self.storage.public_base_url = Some(url.clone());
        }
        if let Some(url) = overrides.storage_endpoint_url.as_ref() {
            self.storage.endpoint_url = Some(url.clone());
        }
        if let Some(root) = overrides.storage_filesystem_root.as_ref() {
            self.storage.filesystem_root = Some(root.clone());
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(concurrency) = overrides.uploads_concurrency {
            self.uploads.concurrency = Some(concurrency.into());
        }
        if let Some(seconds) = overrides.uploads_store_timeout_seconds {
            self.uploads.store_timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            storage,
            uploads,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            storage: build_storage_settings(storage)?,
            uploads: build_upload_settings(uploads)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let backend = storage.backend.unwrap_or(StorageBackend::S3);
    let region = non_empty(storage.region, DEFAULT_REGION, "storage.region")?;
    let asset_bucket = non_empty(
        storage.asset_bucket,
        DEFAULT_ASSET_BUCKET,
        "storage.asset_bucket",
    )?;
    let document_bucket = non_empty(
        storage.document_bucket,
        DEFAULT_DOCUMENT_BUCKET,
        "storage.document_bucket",
    )?;

    let public_base_url = match storage.public_base_url {
        Some(value) => Url::parse(value.trim()).map_err(|err| {
            LoadError::invalid("storage.public_base_url", format!("failed to parse: {err}"))
        })?,
        None => s3_public_base(&asset_bucket, &region).map_err(|err| {
            LoadError::invalid(
                "storage.public_base_url",
                format!("bucket and region do not form a valid URL: {err}"),
            )
        })?,
    };
    if public_base_url.cannot_be_a_base()
        || !matches!(public_base_url.scheme(), "http" | "https")
    {
        return Err(LoadError::invalid(
            "storage.public_base_url",
            "must be an http(s) base URL",
        ));
    }

    let endpoint_url = storage.endpoint_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let filesystem_root = storage
        .filesystem_root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FILESYSTEM_ROOT));
    if filesystem_root.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.filesystem_root",
            "path must not be empty",
        ));
    }

    Ok(StorageSettings {
        backend,
        region,
        asset_bucket,
        document_bucket,
        public_base_url,
        endpoint_url,
        force_path_style: storage.force_path_style.unwrap_or(false),
        filesystem_root,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    let concurrency_value = uploads.concurrency.unwrap_or(DEFAULT_UPLOAD_CONCURRENCY);
    let concurrency = usize::try_from(concurrency_value)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("uploads.concurrency", "must be greater than zero"))?;

    let timeout_secs = uploads
        .store_timeout_seconds
        .unwrap_or(DEFAULT_STORE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "uploads.store_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(UploadSettings {
        max_request_bytes,
        concurrency,
        store_timeout: Duration::from_secs(timeout_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<StorageBackend>,
    region: Option<String>,
    asset_bucket: Option<String>,
    document_bucket: Option<String>,
    public_base_url: Option<String>,
    endpoint_url: Option<String>,
    force_path_style: Option<bool>,
    filesystem_root: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_request_bytes: Option<u64>,
    concurrency: Option<u64>,
    store_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_empty(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    let value = value.unwrap_or_else(|| default.to_string());
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(key, "must not be empty"));
    }
    Ok(trimmed.to_string())
}
