use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, REFERER};
use reqwest::StatusCode;
use tracing::{info, warn};

use crate::config::Config;
use crate::extractor::AssetFetcher;
use crate::throttle::Throttle;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Downloads diagram images over plain HTTP.
pub struct HttpAssetFetcher {
    client: reqwest::Client,
    throttle: Throttle,
    max_retries: u32,
    backoff: Duration,
}

impl HttpAssetFetcher {
    pub fn new(config: &Config, throttle: Throttle, referer: Option<&str>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("image/avif,image/webp,image/apng,image/*,*/*;q=0.8"),
        );
        if let Some(referer) = referer {
            headers.insert(REFERER, HeaderValue::from_str(referer)?);
        }
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            throttle,
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
        })
    }

    async fn get_with_retry(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            self.throttle.acquire().await;
            let response = self
                .client
                .get(url)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match response {
                Ok(r) => return Ok(r),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    let backoff = self.backoff * 2u32.pow(attempt);
                    warn!(
                        "Download of {} failed (attempt {}/{}), backing off {:.1}s: {}",
                        url,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn download(&self, url: &str, prefix: &Path) -> Result<Option<PathBuf>> {
        let response = self.get_with_retry(url).await?;
        let ext = extension_for(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let bytes = response.bytes().await?;
        let path = with_extension(prefix, ext);
        if bytes.is_empty() {
            warn!("Downloaded image is empty: {}", path.display());
            return Ok(None);
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        info!("Image saved: {} ({} bytes)", path.display(), bytes.len());
        Ok(Some(path))
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch_asset(&self, locator: &str, destination_prefix: &Path) -> Option<PathBuf> {
        let url = locator.trim();
        if url.is_empty() {
            warn!("Empty image URL provided");
            return None;
        }
        match self.download(url, destination_prefix).await {
            Ok(saved) => saved,
            Err(e) => {
                warn!("Failed to download image {}: {}", url, e);
                None
            }
        }
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout()
        || e.is_connect()
        || e
            .status()
            .is_some_and(|s| s == StatusCode::TOO_MANY_REQUESTS || s.is_server_error())
}

/// File extension for a response content type; unknown types get `bin`.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/svg+xml" => "svg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}

/// `prefix` plus `.ext`, keeping any dots already in the file name.
fn with_extension(prefix: &Path, ext: &str) -> PathBuf {
    let mut name: OsString = prefix.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(ext);
    prefix.with_file_name(name)
}
