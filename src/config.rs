use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::EmbeddedCollection;
use crate::distribution::{DEFAULT_DOWNLOAD_URL, Platform};
use crate::error::{Error, Result};
use crate::net::NetworkOptions;
use crate::process::output::ProcessOutput;

pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Everything needed to run one embedded `mongod`.
///
/// Values are validated when they are set; `with_*` methods return a new
/// config instead of mutating shared state.
#[derive(Debug, Clone)]
pub struct MongodConfig {
    version: Option<String>,
    network: NetworkOptions,
    collections: Vec<EmbeddedCollection>,
    cache_dir: PathBuf,
    download_url: String,
    platform: Option<Platform>,
    verify_checksum: bool,
    startup_timeout: Duration,
    shutdown_grace: Duration,
    data_dir: Option<PathBuf>,
    output: ProcessOutput,
}

impl MongodConfig {
    /// Production release on loopback with an auto-assigned port.
    pub fn new() -> Self {
        Self {
            version: None,
            network: NetworkOptions::loopback(),
            collections: Vec::new(),
            cache_dir: default_cache_dir(),
            download_url: DEFAULT_DOWNLOAD_URL.to_string(),
            platform: None,
            verify_checksum: true,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            data_dir: None,
            output: ProcessOutput::default(),
        }
    }

    /// Version such as `2.1.1`, `v1.8.2`, `V2_0_4` or `PRODUCTION`. Must not be empty.
    pub fn with_version(mut self, version: &str) -> Result<Self> {
        if version.trim().is_empty() {
            return Err(Error::InvalidVersion("version must not be empty".to_string()));
        }
        self.version = Some(version.trim().to_string());
        Ok(self)
    }

    pub fn with_network(mut self, network: NetworkOptions) -> Self {
        self.network = network;
        self
    }

    pub fn with_collections(mut self, collections: Vec<EmbeddedCollection>) -> Self {
        self.collections = collections;
        self
    }

    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_download_url(mut self, url: &str) -> Result<Self> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!("download url must be http(s), got '{}'", url)));
        }
        self.download_url = url.trim_end_matches('/').to_string();
        Ok(self)
    }

    /// Override host platform detection.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::Config("startup timeout must be positive".to_string()));
        }
        self.startup_timeout = timeout;
        Ok(self)
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Keep database files in `dir` instead of a temporary directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_output(mut self, output: ProcessOutput) -> Self {
        self.output = output;
        self
    }

    /// Read `EMBEDMONGO_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new();

        if let Some(version) = env_var("EMBEDMONGO_VERSION") {
            config = config.with_version(&version)?;
        }

        let bind_ip = env_var("EMBEDMONGO_BIND_IP").unwrap_or_else(|| config.network.bind_ip().to_string());
        let port = env_var("EMBEDMONGO_PORT")
            .map(|v| {
                v.parse::<u32>()
                    .map_err(|_| Error::Config(format!("EMBEDMONGO_PORT is not a number: '{}'", v)))
            })
            .transpose()?;
        config = config.with_network(NetworkOptions::new(&bind_ip, port)?);

        if let Some(dir) = env_var("EMBEDMONGO_CACHE_DIR") {
            config = config.with_cache_dir(dir);
        }
        if let Some(url) = env_var("EMBEDMONGO_DOWNLOAD_URL") {
            config = config.with_download_url(&url)?;
        }
        if let Some(distro) = env_var("EMBEDMONGO_LINUX_DISTRO") {
            config = config.with_platform(Platform::detect()?.with_distribution(distro));
        }
        if let Some(verify) = env_var("EMBEDMONGO_VERIFY_CHECKSUM") {
            config = config.with_verify_checksum(!matches!(verify.to_lowercase().as_str(), "0" | "false" | "no"));
        }
        if let Some(secs) = env_secs("EMBEDMONGO_STARTUP_TIMEOUT_SECS")? {
            config = config.with_startup_timeout(secs)?;
        }
        if let Some(secs) = env_secs("EMBEDMONGO_SHUTDOWN_GRACE_SECS")? {
            config = config.with_shutdown_grace(secs);
        }
        if let Some(dir) = env_var("EMBEDMONGO_DATA_DIR") {
            config = config.with_data_dir(dir);
        }
        if let Some(collections) = env_var("EMBEDMONGO_COLLECTIONS") {
            config = config.with_collections(parse_collections(&collections)?);
        }

        Ok(config)
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn network(&self) -> &NetworkOptions {
        &self.network
    }

    pub fn collections(&self) -> &[EmbeddedCollection] {
        &self.collections
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn download_url(&self) -> &str {
        &self.download_url
    }

    /// Configured platform, or the detected host platform.
    pub fn platform(&self) -> Result<Platform> {
        match &self.platform {
            Some(platform) => Ok(platform.clone()),
            None => Platform::detect(),
        }
    }

    pub fn verify_checksum(&self) -> bool {
        self.verify_checksum
    }

    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn output(&self) -> &ProcessOutput {
        &self.output
    }
}

impl Default for MongodConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// `EMBEDMONGO_CACHE_DIR`, then `<user cache>/embedmongo`, then `<tmp>/embedmongo`.
pub fn default_cache_dir() -> PathBuf {
    if let Some(dir) = env_var("EMBEDMONGO_CACHE_DIR") {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("embedmongo")
}

/// Parse `db:coll1,coll2;other:coll3`.
pub fn parse_collections(value: &str) -> Result<Vec<EmbeddedCollection>> {
    value
        .split(';')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (db, collections) = entry
                .split_once(':')
                .ok_or_else(|| Error::Config(format!("expected 'db:collection,...', got '{}'", entry)))?;
            let collections: Vec<String> = collections
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect();
            if db.trim().is_empty() || collections.is_empty() {
                return Err(Error::Config(format!("expected 'db:collection,...', got '{}'", entry)));
            }
            Ok(EmbeddedCollection::new(db.trim(), collections))
        })
        .collect()
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_secs(key: &str) -> Result<Option<Duration>> {
    env_var(key)
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| Error::Config(format!("{} is not a number of seconds: '{}'", key, v)))
        })
        .transpose()
}
