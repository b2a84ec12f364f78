pub mod download;
pub mod progress;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::distribution::ReleaseDescriptor;
use crate::error::{Error, Result};
use download::{Fetched, fetch_checksum, fetch_to_temp};
use progress::{ProgressListener, TracingProgressListener};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// A server binary available on local disk.
#[derive(Debug, Clone, Serialize)]
pub struct CachedArtifact {
    pub release: ReleaseDescriptor,
    pub path: PathBuf,
    pub executable: bool,
    pub sha256: String,
}

/// Downloads server binaries once and reuses them across runs.
pub struct ArtifactStore {
    cache_dir: PathBuf,
    download_url: String,
    verify_checksum: bool,
    http: reqwest::Client,
    listener: Arc<dyn ProgressListener>,
}

impl ArtifactStore {
    pub fn new(cache_dir: impl Into<PathBuf>, download_url: &str) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            download_url: download_url.trim_end_matches('/').to_string(),
            verify_checksum: true,
            http: reqwest::Client::new(),
            listener: Arc::new(TracingProgressListener::new()),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// `{cache}/{product}/{version}/{platform}/mongod`
    pub fn artifact_path(&self, release: &ReleaseDescriptor) -> PathBuf {
        self.cache_dir
            .join(release.product)
            .join(sanitize(&release.version))
            .join(sanitize(&release.platform.to_string()))
            .join(release.platform.executable_name())
    }

    /// Return a usable binary for `release`, downloading it when the cache has none.
    pub async fn ensure(&self, release: &ReleaseDescriptor) -> Result<CachedArtifact> {
        let path = self.artifact_path(release);

        if let Some(artifact) = self.lookup(release, &path).await? {
            tracing::info!("Using cached MongoDB {} from {}", release.version, path.display());
            return Ok(artifact);
        }

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.cache_dir.clone());
        tokio::fs::create_dir_all(&dir).await?;

        let url = release.download_url(&self.download_url);
        let label = format!("Download {} {} ({})", release.product, release.version, release.platform);

        let downloaded = match fetch_to_temp(&self.http, &url, &dir, &label, self.listener.as_ref()).await? {
            Fetched::Found(downloaded) => downloaded,
            Fetched::NotFound => {
                return Err(Error::UnsupportedPlatform {
                    version: release.version.clone(),
                    platform: release.platform.to_string(),
                });
            }
        };
        tracing::debug!("Downloaded {} bytes from {}", downloaded.bytes, url);

        if self.verify_checksum {
            match fetch_checksum(&self.http, &url).await? {
                Some(expected) if expected != downloaded.sha256 => {
                    return Err(Error::integrity(
                        downloaded.file.path(),
                        format!("sha256 {} does not match published {}", downloaded.sha256, expected),
                    ));
                }
                Some(_) => self.listener.info(&label, "checksum verified"),
                None => tracing::warn!("No published checksum for {}, skipping verification", url),
            }
        }

        if is_archive(downloaded.file.path())? {
            let extract_dir = tempfile::Builder::new().prefix(".extract-").tempdir_in(&dir)?;
            extract_archive(downloaded.file.path(), extract_dir.path()).await?;
            let binary = find_executable(extract_dir.path(), release.platform.executable_name())
                .ok_or_else(|| {
                    Error::integrity(
                        downloaded.file.path(),
                        format!("archive contains no {}", release.platform.executable_name()),
                    )
                })?;
            tokio::fs::rename(&binary, &path).await?;
        } else {
            downloaded
                .file
                .persist(&path)
                .map_err(|e| Error::Io(e.error))?;
        }

        mark_executable(&path).await?;
        let sha256 = sha256_file(&path).await?;
        tokio::fs::write(checksum_path(&path), format!("{}\n", sha256)).await?;

        tracing::info!("✓ Cached MongoDB {} at {}", release.version, path.display());
        Ok(CachedArtifact {
            release: release.clone(),
            path,
            executable: true,
            sha256,
        })
    }

    /// Cache hit check. Corrupt entries are removed so they get downloaded again.
    async fn lookup(&self, release: &ReleaseDescriptor, path: &Path) -> Result<Option<CachedArtifact>> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if !metadata.is_file() || metadata.len() == 0 || !is_executable(&metadata) {
            tracing::warn!("Cached binary {} is unusable, downloading again", path.display());
            remove_entry(path).await;
            return Ok(None);
        }

        let sha256 = sha256_file(path).await?;
        match tokio::fs::read_to_string(checksum_path(path)).await {
            Ok(expected) if expected.trim() != sha256 => {
                tracing::warn!("Cached binary {} failed checksum, downloading again", path.display());
                remove_entry(path).await;
                return Ok(None);
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(checksum_path(path), format!("{}\n", sha256)).await?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Some(CachedArtifact {
            release: release.clone(),
            path: path.to_path_buf(),
            executable: true,
            sha256,
        }))
    }
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect()
}

/// Gzip or zip payloads are unpacked; anything else is the binary itself.
fn is_archive(path: &Path) -> Result<bool> {
    use std::io::Read;

    let mut header = [0u8; 4];
    let mut file = std::fs::File::open(path)?;
    let read = file.read(&mut header)?;
    let header = &header[..read];
    Ok(header.starts_with(GZIP_MAGIC) || header.starts_with(ZIP_MAGIC))
}

fn checksum_path(path: &Path) -> PathBuf {
    path.with_extension("sha256")
}

async fn remove_entry(path: &Path) {
    let _ = tokio::fs::remove_file(path).await;
    let _ = tokio::fs::remove_file(checksum_path(path)).await;
}

async fn extract_archive(archive: &Path, into: &Path) -> Result<()> {
    let output = tokio::process::Command::new("tar")
        .arg("-xf")
        .arg(archive)
        .arg("-C")
        .arg(into)
        .output()
        .await
        .map_err(|e| Error::integrity(archive, format!("could not run tar: {}", e)))?;

    if !output.status.success() {
        return Err(Error::integrity(
            archive,
            format!("tar failed: {}", String::from_utf8_lossy(&output.stderr).trim()),
        ));
    }
    Ok(())
}

/// Find `name`, preferring one inside a `bin` directory.
fn find_executable(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut fallback = None;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&current) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.file_name().is_some_and(|n| n == name) {
                if current.file_name().is_some_and(|n| n == "bin") {
                    return Some(path);
                }
                fallback.get_or_insert(path);
            }
        }
    }
    fallback
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

pub(crate) async fn sha256_file(path: &Path) -> Result<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> std::io::Result<String> {
        let mut file = std::fs::File::open(&path)?;
        let mut hasher = Sha256::new();
        std::io::copy(&mut file, &mut hasher)?;
        Ok(hex::encode(hasher.finalize()))
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))?
    .map_err(Error::from)
}
