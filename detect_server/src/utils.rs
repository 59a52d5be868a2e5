//! Utility functions
//!
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use reqwest::Client;

/// Download a file from a URL to a given filepath.
///
/// The data is written next to `filepath` first and moved into place once complete.
pub async fn download_file(client: &Client, url: &str, filepath: impl AsRef<Path>) -> Result<()> {
    let filepath = filepath.as_ref();
    let resp = client.get(url).send().await?.error_for_status()?;
    let content = resp.bytes().await?;

    let partial = filepath.with_extension("part");
    tokio::fs::write(&partial, &content).await?;
    tokio::fs::rename(&partial, filepath).await?;
    log::debug!("Downloaded {} bytes to {}", content.len(), filepath.display());

    Ok(())
}

/// Find the model file, downloading it into the cache directory if needed.
pub async fn resolve_model(path: &Path, url: Option<&str>) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_owned());
    }

    let url = match url {
        Some(url) => url,
        None => bail!(
            "model file {} not found and no download URL given",
            path.display()
        ),
    };

    let file_name = path.file_name().context("model path has no file name")?;
    let cache_dir = dirs::cache_dir()
        .context("no cache directory available")?
        .join(env!("CARGO_PKG_NAME"));
    let cached = cache_dir.join(file_name);
    if cached.is_file() {
        log::info!("Using cached model {}", cached.display());
        return Ok(cached);
    }

    tokio::fs::create_dir_all(&cache_dir).await?;
    log::info!("Downloading model from {} to {}", url, cached.display());
    download_file(&Client::new(), url, &cached)
        .await
        .with_context(|| format!("failed to download model from {url}"))?;

    Ok(cached)
}
