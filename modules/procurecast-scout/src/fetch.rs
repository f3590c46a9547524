use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use crate::error::{ScoutError, ScoutResult};
use crate::throttle::timeout_error;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/98.0.4758.102 Safari/537.36";

/// A downloaded resource: body bytes plus the declared content type.
#[derive(Debug, Clone)]
pub struct Resource {
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Resource {
    pub fn is_pdf(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("application/pdf"))
    }
}

// --- PageFetcher trait ---

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Rendered markup of an HTML page.
    async fn page(&self, url: &str) -> ScoutResult<String>;

    /// Raw bytes of a linked resource (documents, attachments).
    async fn resource(&self, url: &str) -> ScoutResult<Resource>;

    fn name(&self) -> &str;
}

/// Only http(s) targets are ever fetched.
pub fn check_scheme(url: &str) -> ScoutResult<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| ScoutError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ScoutError::InvalidUrl {
            url: url.to_string(),
            reason: format!("only http/https URLs are allowed, got {}", parsed.scheme()),
        });
    }
    Ok(parsed)
}

// --- Plain HTTP fetcher ---

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> ScoutResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client, timeout })
    }

    async fn get(&self, url: &str) -> ScoutResult<reqwest::Response> {
        check_scheme(url)?;
        let resp = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                timeout_error(url, self.timeout)
            } else {
                ScoutError::Http(e)
            }
        })?;
        if !resp.status().is_success() {
            return Err(ScoutError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn page(&self, url: &str) -> ScoutResult<String> {
        info!(url, fetcher = "http", "Fetching page");
        let html = self.get(url).await?.text().await?;
        info!(url, fetcher = "http", bytes = html.len(), "Page fetched");
        Ok(html)
    }

    async fn resource(&self, url: &str) -> ScoutResult<Resource> {
        let resp = self.get(url).await?;
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().await?.to_vec();
        Ok(Resource {
            url: url.to_string(),
            content_type,
            body,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
