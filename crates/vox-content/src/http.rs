//! HTTP content fetching with gateway fallback.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{join_url, ContentError, ContentFetcher, Identifier, Result};

/// Where the HTTP fetcher looks for content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Base URL of the static CDN that serves relative paths.
    pub cdn_base: String,
    /// Gateways for content-addressed identifiers, in priority order.
    pub gateways: Vec<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl SourceConfig {
    /// Creates a source configuration with a 15 second request timeout.
    #[must_use]
    pub fn new(cdn_base: impl Into<String>, gateways: Vec<String>) -> Self {
        Self {
            cdn_base: cdn_base.into(),
            gateways,
            timeout: Duration::from_secs(15),
        }
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Fetches content over HTTP(S).
///
/// Resolution order for an identifier:
/// 1. Full URLs are requested directly.
/// 2. Content-addressed identifiers are requested from each gateway in turn;
///    the fetch fails only once every gateway has failed.
/// 3. Anything else is a path under the CDN base.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    sources: SourceConfig,
}

impl HttpFetcher {
    /// Creates a fetcher for the given sources.
    ///
    /// # Errors
    ///
    /// Returns `ContentError::Client` if the HTTP client cannot be built.
    pub fn new(sources: SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(sources.timeout)
            .build()
            .map_err(|e| ContentError::Client(e.to_string()))?;
        Ok(Self { client, sources })
    }

    /// Returns the configured sources.
    #[must_use]
    pub const fn sources(&self) -> &SourceConfig {
        &self.sources
    }

    async fn fetch_identifier(&self, identifier: &str) -> Result<Value> {
        match Identifier::classify(identifier) {
            Identifier::Url(url) => self.get_json(url).await,
            Identifier::Path(path) => {
                let url = join_url(&self.sources.cdn_base, path);
                self.get_json(&url).await
            }
            Identifier::ContentAddressed(cid) => self.fetch_from_gateways(identifier, cid).await,
        }
    }

    async fn fetch_from_gateways(&self, identifier: &str, cid: &str) -> Result<Value> {
        let mut last = String::from("no gateways configured");

        for (attempt, gateway) in self.sources.gateways.iter().enumerate() {
            let url = join_url(gateway, cid);
            match self.get_json(&url).await {
                Ok(value) => {
                    debug!(gateway = %gateway, attempt, "Gateway served content");
                    return Ok(value);
                }
                Err(e) => {
                    warn!(gateway = %gateway, error = %e, "Gateway failed, trying next");
                    last = e.to_string();
                }
            }
        }

        Err(ContentError::Exhausted {
            identifier: identifier.to_string(),
            attempts: self.sources.gateways.len(),
            last,
        })
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!(url, "Fetching content");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ContentError::Network {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ContentError::NotFound {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(ContentError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ContentError::InvalidJson {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

impl ContentFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, identifier: &'a str) -> BoxFuture<'a, Result<Value>> {
        Box::pin(self.fetch_identifier(identifier))
    }
}
