//! Feature sources: the transport trait and its Overpass HTTP implementation.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::USER_AGENT;
use url::Url;
use zoneguard_core::BoundingBox;

use super::{FetchError, SourceBuildError, parse_response};
use crate::element::RawElement;

/// Default user agent sent to upstream endpoints.
pub const DEFAULT_USER_AGENT: &str = "zoneguard-ingest/0.1";

/// Default client-side deadline for one request.
const DEFAULT_TIMEOUT_SECS: u64 = 180;

/// Public Overpass instances rotated through when none are configured.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
    "https://overpass.private.coffee/api/interpreter",
];

/// One tile query handed to a [`FeatureSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct TileRequest {
    /// Tile being fetched.
    pub bbox: BoundingBox,
    /// Overpass QL text for the tile.
    pub query: String,
}

/// A single upstream endpoint able to answer tile queries.
#[async_trait(?Send)]
pub trait FeatureSource {
    /// Endpoint identifier used in logs.
    fn endpoint(&self) -> &str;
    /// Fetch the raw elements for `request`.
    async fn fetch(&self, request: &TileRequest) -> Result<Vec<RawElement>, FetchError>;
}

/// Configuration for [`HttpFeatureSource`].
#[derive(Debug, Clone)]
pub struct HttpFeatureSourceConfig {
    /// Absolute request deadline.
    pub timeout: Duration,
    /// User agent string.
    pub user_agent: String,
}

impl Default for HttpFeatureSourceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpFeatureSourceConfig {
    /// Set the request deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// Overpass endpoint reached over HTTP.
///
/// Queries are sent as `POST` with a form body `data=<query>`.
#[derive(Debug, Clone)]
pub struct HttpFeatureSource {
    client: Client,
    url: Url,
    config: HttpFeatureSourceConfig,
}

impl HttpFeatureSource {
    /// Build a source for `endpoint` with default configuration.
    pub fn new(endpoint: &str) -> Result<Self, SourceBuildError> {
        Self::with_config(endpoint, HttpFeatureSourceConfig::default())
    }

    /// Build a source for `endpoint` with explicit configuration.
    pub fn with_config(
        endpoint: &str,
        config: HttpFeatureSourceConfig,
    ) -> Result<Self, SourceBuildError> {
        let url = Url::parse(endpoint).map_err(|source| SourceBuildError::InvalidUrl {
            url: endpoint.to_owned(),
            source,
        })?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(SourceBuildError::HttpClient)?;
        Ok(Self {
            client,
            url,
            config,
        })
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error) -> FetchError {
        let url = self.url.as_str();
        if error.is_timeout() {
            return FetchError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }
        if let Some(status) = error.status() {
            return FetchError::from_status(url, status.as_u16(), error.to_string());
        }
        FetchError::Network {
            url: url.to_owned(),
            source: io::Error::other(error.to_string()),
        }
    }
}

#[async_trait(?Send)]
impl FeatureSource for HttpFeatureSource {
    fn endpoint(&self) -> &str {
        self.url.as_str()
    }

    async fn fetch(&self, request: &TileRequest) -> Result<Vec<RawElement>, FetchError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(USER_AGENT, self.config.user_agent.as_str())
            .form(&[("data", request.query.as_str())])
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err))?;
        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unexpected status");
            return Err(FetchError::from_status(
                self.url.as_str(),
                status.as_u16(),
                reason,
            ));
        }
        let body = response
            .text()
            .await
            .map_err(|err| self.convert_reqwest_error(&err))?;
        parse_response(self.url.as_str(), &body)
    }
}
