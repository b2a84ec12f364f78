use std::path::PathBuf;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving, downloading, launching or connecting to a `mongod`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid MongoDB version: {0}")]
    InvalidVersion(String),

    #[error("port number must be between 1 and 65535, got {0}")]
    InvalidPort(u32),

    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no MongoDB {version} build is published for {platform}")]
    UnsupportedPlatform { version: String, platform: String },

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("integrity check failed for {path}: {reason}")]
    Integrity { path: PathBuf, reason: String },

    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("mongod did not become ready within {0:?}")]
    StartupTimeout(Duration),

    #[error("mongod exited unexpectedly ({status}){}", format_output(.output))]
    ProcessExitedUnexpectedly { status: String, output: Vec<String> },

    #[error("an embedded MongoDB instance is already running on {address}:{port}")]
    AlreadyRunning { address: String, port: u16 },

    #[error("MongoDB client error: {0}")]
    Client(#[from] mongodb::error::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn format_output(lines: &[String]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        format!(", last output:\n{}", lines.join("\n"))
    }
}

impl Error {
    pub(crate) fn download(url: &str, reason: impl std::fmt::Display) -> Self {
        Error::Download {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn integrity(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Integrity {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
