use clap::{Parser, Subcommand, ValueEnum};
use snip_core::OwnerId;
use snip_shortener::deletion::{DEFAULT_CHUNK_SIZE, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
use snip_shortener::service::DEFAULT_BASE_URL;
use snip_shortener::{DeletionConfig, ShortenerConfig};
use snip_storage::StorageConfig;
use snip_telemetry::LogFormat;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const BASE_URL_ENV: &str = "SNIP_BASE_URL";
pub const DATABASE_DSN_ENV: &str = "SNIP_DATABASE_DSN";
pub const FILE_STORAGE_PATH_ENV: &str = "SNIP_FILE_STORAGE_PATH";
pub const DELETE_CHUNK_SIZE_ENV: &str = "SNIP_DELETE_CHUNK_SIZE";
pub const DELETE_QUEUE_CAPACITY_ENV: &str = "SNIP_DELETE_QUEUE_CAPACITY";
pub const DELETE_WORKERS_ENV: &str = "SNIP_DELETE_WORKERS";
pub const SHUTDOWN_GRACE_SECS_ENV: &str = "SNIP_SHUTDOWN_GRACE_SECS";
pub const LOG_FORMAT_ENV: &str = "SNIP_LOG_FORMAT";

pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    #[value(name = "plain")]
    Plain,
    #[value(name = "json")]
    Json,
}

impl Display for LogFormatArg {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormatArg::Plain => write!(f, "plain"),
            LogFormatArg::Json => write!(f, "json"),
        }
    }
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Plain => LogFormat::Plain,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "snip", about = "Shorten, resolve and delete links")]
pub struct CLI {
    #[arg(long, env = BASE_URL_ENV, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// PostgreSQL DSN; takes precedence over the file storage path.
    #[arg(long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    #[arg(long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    #[arg(long, env = DELETE_CHUNK_SIZE_ENV, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub delete_chunk_size: usize,

    #[arg(long, env = DELETE_QUEUE_CAPACITY_ENV, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub delete_queue_capacity: usize,

    #[arg(long, env = DELETE_WORKERS_ENV, default_value_t = DEFAULT_WORKERS)]
    pub delete_workers: usize,

    #[arg(long, env = SHUTDOWN_GRACE_SECS_ENV, default_value_t = DEFAULT_SHUTDOWN_GRACE_SECS)]
    pub shutdown_grace_secs: u64,

    #[arg(
        long,
        env = LOG_FORMAT_ENV,
        value_enum,
        default_value_t = LogFormatArg::Plain
    )]
    pub log_format: LogFormatArg,

    /// Identity the command acts on behalf of.
    #[arg(long, global = true)]
    pub owner: Option<OwnerId>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Shorten one URL.
    Shorten { url: String },
    /// Shorten a JSON array of `{"correlation_id", "original_url"}` objects.
    ShortenBatch {
        /// Read the array from this file instead of stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Resolve a short code to its URL, or a URL to its short code.
    Decode { key: String },
    /// List the owner's links.
    List,
    /// Delete some of the owner's links.
    Delete {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Check that the storage backend is reachable.
    Ping,
    /// Count live links and their owners.
    Stats,
}

impl CLI {
    pub fn storage(&self) -> StorageConfig {
        StorageConfig::from_settings(self.database_dsn.clone(), self.file_storage_path.clone())
    }

    pub fn shortener(&self) -> ShortenerConfig {
        ShortenerConfig::builder()
            .base_url(self.base_url.clone())
            .deletion(
                DeletionConfig::builder()
                    .chunk_size(self.delete_chunk_size)
                    .queue_capacity(self.delete_queue_capacity)
                    .workers(self.delete_workers)
                    .build(),
            )
            .build()
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}
