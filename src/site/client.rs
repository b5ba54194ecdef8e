use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use tracing::{debug, warn};

use crate::config::Config;
use crate::throttle::Throttle;

/// Renders pages through spider.cloud and returns their raw HTML.
pub struct RenderClient {
    spider: Spider,
    throttle: Throttle,
    max_retries: u32,
    backoff: Duration,
}

impl RenderClient {
    pub fn new(api_key: String, throttle: Throttle, config: &Config) -> Result<Self> {
        let spider = Spider::new(Some(api_key))
            .map_err(|e| anyhow!("Failed to create Spider client: {}", e))?;
        Ok(Self {
            spider,
            throttle,
            max_retries: config.max_retries,
            backoff: config.retry_backoff,
        })
    }

    /// Render `url`, retrying rate limits and upstream 5xx with exponential backoff.
    pub async fn render(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            self.throttle.acquire().await;
            match self.render_once(url).await {
                Ok(html) => return Ok(html),
                Err(e) if attempt < self.max_retries && is_transient(&e.to_string()) => {
                    let backoff = self.backoff * 2u32.pow(attempt);
                    warn!(
                        "Rate limited on {} (attempt {}/{}), backing off {:.1}s",
                        url,
                        attempt + 1,
                        self.max_retries,
                        backoff.as_secs_f64()
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn render_once(&self, url: &str) -> Result<String> {
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(ReturnFormat::Raw)),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| anyhow!("Spider scrape failed: {}", e))?;
        debug!("Rendered {} in {}ms", url, start.elapsed().as_millis());

        content_from_response(response)
    }
}

/// Pull the page body out of a spider response, surfacing upstream HTTP failures.
fn content_from_response(response: serde_json::Value) -> Result<String> {
    let parsed: serde_json::Value = match response.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or(response.clone()),
        None => response,
    };
    let first = parsed.as_array().and_then(|arr| arr.first());

    let status = first
        .and_then(|obj| obj.get("status"))
        .and_then(|s| s.as_i64());
    if let Some(status) = status.filter(|s| *s >= 400) {
        bail!("upstream returned HTTP {}", status);
    }

    first
        .and_then(|obj| obj.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No content in spider response"))
}

fn is_transient(message: &str) -> bool {
    message.contains("429")
        || message.contains("rate")
        || message.contains("500")
        || message.contains("502")
        || message.contains("503")
        || message.contains("504")
}
