use std::path::Path;

use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use super::progress::ProgressListener;
use crate::error::{Error, Result};

/// Result of streaming a URL to disk.
pub struct Downloaded {
    pub file: NamedTempFile,
    pub sha256: String,
    pub bytes: u64,
}

/// What a missing remote file means to the caller.
pub enum Fetched {
    Found(Downloaded),
    NotFound,
}

/// Stream `url` into a temporary file in `dir`, hashing as it goes.
pub async fn fetch_to_temp(
    client: &Client,
    url: &str,
    dir: &Path,
    label: &str,
    listener: &dyn ProgressListener,
) -> Result<Fetched> {
    let response = client.get(url).send().await.map_err(|e| Error::download(url, e))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Ok(Fetched::NotFound);
    }
    if !response.status().is_success() {
        return Err(Error::download(url, format!("server returned {}", response.status())));
    }

    let total = response.content_length();
    let file = tempfile::Builder::new().prefix(".download-").tempfile_in(dir)?;
    let mut out = tokio::fs::File::from_std(file.reopen()?);

    let mut hasher = Sha256::new();
    let mut received: u64 = 0;
    let mut last_percent: Option<u8> = None;
    let mut stream = response.bytes_stream();

    listener.start(label);
    if let Some(total) = total {
        listener.info(label, &format!("downloading {} bytes from {}", total, url));
    }

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::download(url, e))?;
        hasher.update(&chunk);
        out.write_all(&chunk).await?;
        received += chunk.len() as u64;

        if let Some(total) = total.filter(|t| *t > 0) {
            let percent = ((received.min(total) * 100) / total) as u8;
            if last_percent != Some(percent) {
                listener.progress(label, percent);
                last_percent = Some(percent);
            }
        }
    }
    out.flush().await?;
    out.sync_all().await?;

    if let Some(total) = total {
        if received != total {
            return Err(Error::download(
                url,
                format!("expected {} bytes but received {}", total, received),
            ));
        }
    }

    listener.done(label);

    Ok(Fetched::Found(Downloaded {
        file,
        sha256: hex::encode(hasher.finalize()),
        bytes: received,
    }))
}

/// Fetch the published `<url>.sha256` digest. `None` when the server has none.
pub async fn fetch_checksum(client: &Client, url: &str) -> Result<Option<String>> {
    let checksum_url = format!("{}.sha256", url);
    let response = client
        .get(&checksum_url)
        .send()
        .await
        .map_err(|e| Error::download(&checksum_url, e))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(Error::download(
            &checksum_url,
            format!("server returned {}", response.status()),
        ));
    }

    let body = response.text().await.map_err(|e| Error::download(&checksum_url, e))?;
    // Format is "<hex digest>  <file name>"
    let digest = body
        .split_whitespace()
        .next()
        .map(str::to_lowercase)
        .filter(|d| d.len() == 64 && d.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| Error::download(&checksum_url, "malformed checksum file"))?;

    Ok(Some(digest))
}
