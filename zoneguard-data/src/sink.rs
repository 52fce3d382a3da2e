//! Destinations for assembled zone collections.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use zoneguard_core::{FeatureCollection, ZoneService};

use crate::overpass::DEFAULT_USER_AGENT;

const DEFAULT_IMPORT_TIMEOUT_SECS: u64 = 120;

/// Errors raised while handing zones to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The endpoint URL is not absolute.
    #[error("invalid import URL {url}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Parser failure.
        #[source]
        source: url::ParseError,
    },
    /// The HTTP client could not be built.
    #[error("failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
    /// The request did not complete.
    #[error("request to {url} failed")]
    Network {
        /// Endpoint URL.
        url: String,
        /// Transport failure.
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered with an error status.
    #[error("import endpoint {url} answered {status}: {message}")]
    Http {
        /// Endpoint URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body or status reason.
        message: String,
    },
    /// A test or caller-provided sink refused the request.
    #[error("zone sink rejected the request: {0}")]
    Rejected(String),
}

/// What a sink reports back after an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReceipt {
    /// Zones newly stored, when the sink reports it.
    pub imported: Option<usize>,
}

/// Receives one FeatureCollection per district.
#[async_trait(?Send)]
pub trait ZoneSink {
    /// Remove every stored zone.
    async fn clear(&self) -> Result<(), SinkError>;
    /// Import `collection`.
    async fn import(&self, collection: &FeatureCollection) -> Result<SinkReceipt, SinkError>;
}

/// Imports zones into an in-process [`ZoneService`].
#[derive(Debug, Clone)]
pub struct StoreSink {
    service: Arc<ZoneService>,
}

impl StoreSink {
    /// Sink writing into `service`.
    #[must_use]
    pub const fn new(service: Arc<ZoneService>) -> Self {
        Self { service }
    }

    /// Target service.
    #[must_use]
    pub fn service(&self) -> &ZoneService {
        &self.service
    }
}

#[async_trait(?Send)]
impl ZoneSink for StoreSink {
    async fn clear(&self) -> Result<(), SinkError> {
        self.service.clear_zones();
        Ok(())
    }

    async fn import(&self, collection: &FeatureCollection) -> Result<SinkReceipt, SinkError> {
        let report = self.service.import_features(&collection.features);
        Ok(SinkReceipt {
            imported: Some(report.imported_count),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportResponse {
    #[serde(default)]
    imported_count: Option<usize>,
}

/// Posts zones to an external import endpoint.
///
/// `import` sends the collection as a JSON body to the import URL; `clear`
/// posts an empty body to the clear URL, `{import-url}/clear` by default.
#[derive(Debug, Clone)]
pub struct HttpImportSink {
    client: Client,
    import_url: Url,
    clear_url: Url,
}

impl HttpImportSink {
    /// Sink posting to `import_url`.
    pub fn new(import_url: &str) -> Result<Self, SinkError> {
        let clear_url = format!("{}/clear", import_url.trim_end_matches('/'));
        Self::with_clear_url(import_url, &clear_url)
    }

    /// Sink posting imports to `import_url` and clears to `clear_url`.
    pub fn with_clear_url(import_url: &str, clear_url: &str) -> Result<Self, SinkError> {
        let client = Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_IMPORT_TIMEOUT_SECS))
            .build()
            .map_err(SinkError::HttpClient)?;
        Ok(Self {
            client,
            import_url: parse_url(import_url)?,
            clear_url: parse_url(clear_url)?,
        })
    }

    /// Import endpoint.
    #[must_use]
    pub const fn import_url(&self) -> &Url {
        &self.import_url
    }

    /// Clear endpoint.
    #[must_use]
    pub const fn clear_url(&self) -> &Url {
        &self.clear_url
    }

    async fn post(&self, url: &Url, body: Option<&FeatureCollection>) -> Result<String, SinkError> {
        let request = self.client.post(url.clone());
        let request = match body {
            Some(collection) => request.json(collection),
            None => request,
        };
        let network = |source: reqwest::Error| SinkError::Network {
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(network)?;
        let status = response.status();
        let text = response.text().await.map_err(network)?;
        if status.is_success() {
            Ok(text)
        } else {
            let message = if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("unexpected status").to_owned()
            } else {
                text
            };
            Err(SinkError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait(?Send)]
impl ZoneSink for HttpImportSink {
    async fn clear(&self) -> Result<(), SinkError> {
        self.post(&self.clear_url, None).await.map(drop)
    }

    async fn import(&self, collection: &FeatureCollection) -> Result<SinkReceipt, SinkError> {
        let body = self.post(&self.import_url, Some(collection)).await?;
        let imported = serde_json::from_str::<ImportResponse>(&body)
            .ok()
            .and_then(|response| response.imported_count);
        Ok(SinkReceipt { imported })
    }
}

fn parse_url(url: &str) -> Result<Url, SinkError> {
    Url::parse(url).map_err(|source| SinkError::InvalidUrl {
        url: url.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use zoneguard_core::ZoneStore;
    use zoneguard_core::test_support::kremlin_zone;

    #[rstest]
    #[case("http://localhost:3000/api/zones/import", "http://localhost:3000/api/zones/import/clear")]
    #[case("http://localhost:3000/import/", "http://localhost:3000/import/clear")]
    fn clear_url_defaults_under_the_import_url(#[case] import: &str, #[case] clear: &str) {
        let sink = HttpImportSink::new(import).expect("sink");
        assert_eq!(sink.clear_url().as_str(), clear);
    }

    #[rstest]
    fn relative_import_urls_are_rejected() {
        let err = HttpImportSink::new("zones/import").expect_err("relative url");
        assert!(matches!(err, SinkError::InvalidUrl { .. }));
    }

    #[rstest]
    #[tokio::test]
    async fn store_sink_imports_and_clears() {
        let service = Arc::new(ZoneService::new(ZoneStore::in_memory()));
        let sink = StoreSink::new(Arc::clone(&service));
        let collection = FeatureCollection::from_zones([&kremlin_zone()]);

        let receipt = sink.import(&collection).await.expect("import");
        assert_eq!(receipt.imported, Some(1));
        assert_eq!(service.stats().total, 1);

        sink.clear().await.expect("clear");
        assert_eq!(sink.service().stats().total, 0);
    }
}
