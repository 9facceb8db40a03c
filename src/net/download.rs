//! Resolving and fetching server jars. Vanilla jars come from the
//! mcversions.net index; Paper builds come straight from the papermc
//! download API. Jars are streamed to disk rather than buffered, they
//! run to tens of megabytes.

use std::collections::HashMap;
use std::path::Path;

use futures_util::StreamExt;
use log::info;
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::models::server_record::Edition;

const VANILLA_INDEX_URL: &str = "https://mcversions.net/mcversions.json";
const PAPER_DOWNLOAD_TEMPLATE: &str = "https://papermc.io/api/v1/paper/{version}/latest/download";

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("unknown game version {0:?}")]
    UnknownVersion(String),
    #[error("download from {url} failed: {reason}")]
    Failed { url: String, reason: String },
    #[error("download io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Deserialize)]
struct VanillaIndex {
    stable: HashMap<String, VanillaRelease>,
}

#[derive(Deserialize)]
struct VanillaRelease {
    server: String,
}

/// Resolves the download URL for a given edition and version. Paper URLs
/// are templated locally; vanilla needs a round trip to the version index.
pub async fn resolve_jar_url(edition: Edition, version: &str) -> Result<String, DownloadError> {
    match edition {
        Edition::Paper => Ok(PAPER_DOWNLOAD_TEMPLATE.replace("{version}", version)),
        Edition::Vanilla => {
            let index: VanillaIndex = reqwest::get(VANILLA_INDEX_URL)
                .await
                .map_err(|e| DownloadError::Failed {
                    url: VANILLA_INDEX_URL.to_string(),
                    reason: e.to_string(),
                })?
                .json()
                .await
                .map_err(|e| DownloadError::Failed {
                    url: VANILLA_INDEX_URL.to_string(),
                    reason: e.to_string(),
                })?;
            index
                .stable
                .get(version)
                .map(|release| release.server.clone())
                .ok_or_else(|| DownloadError::UnknownVersion(version.to_string()))
        }
    }
}

/// Streams `url` into `target`, chunk by chunk.
pub async fn download_jar(url: &str, target: &Path) -> Result<(), DownloadError> {
    info!("downloading {url} -> {}", target.display());

    let response = reqwest::get(url).await.map_err(|e| DownloadError::Failed {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !response.status().is_success() {
        return Err(DownloadError::Failed {
            url: url.to_string(),
            reason: format!("status {}", response.status()),
        });
    }

    let mut file = File::create(target).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::Failed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn paper_url_is_templated_without_network() {
        let url = resolve_jar_url(Edition::Paper, "1.8.8").await.unwrap();
        assert_eq!(url, "https://papermc.io/api/v1/paper/1.8.8/latest/download");
    }

    #[test]
    fn vanilla_index_decodes() {
        let raw = r#"{
            "stable": {
                "1.8.8": { "server": "https://example.invalid/1.8.8/server.jar" }
            },
            "snapshot": {}
        }"#;
        let index: VanillaIndex = serde_json::from_str(raw).unwrap();
        assert_eq!(
            index.stable["1.8.8"].server,
            "https://example.invalid/1.8.8/server.jar"
        );
    }
}
