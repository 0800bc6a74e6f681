//! Fetches a live page and turns it into a static snapshot.
//!
//! No JavaScript runs and there is no layout: the snapshot carries whatever
//! the served HTML declares. Rendered snapshots recorded by a browser are
//! loaded with `PageSnapshot::from_json_file` instead.

use crate::dom::PageSnapshot;
use crate::{AnalyzerConfig, Error, Result};
use log::info;
use std::time::Duration;

pub struct PageLoader {
    client: reqwest::Client,
}

impl PageLoader {
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// GET `url` and parse the body. Redirects are followed; the final URL
    /// becomes the snapshot's base for relative locators.
    pub async fn load(&self, url: &str) -> Result<PageSnapshot> {
        let res = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::LoadError(format!("HTTP GET failed: {}", e)))?;
        if !res.status().is_success() {
            return Err(Error::LoadError(format!("HTTP GET {} returned {}", url, res.status())));
        }
        let final_url = res.url().to_string();
        let body = res
            .text()
            .await
            .map_err(|e| Error::LoadError(format!("Failed to read response body: {}", e)))?;

        let snapshot = PageSnapshot::from_html(&body, &final_url);
        info!("Loaded {} ({} elements)", final_url, snapshot.elements.len());
        Ok(snapshot)
    }
}
