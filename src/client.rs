//! HTTP client for the fare pricing provider

use crate::{City, FareResults, ProviderError, SearchRequest, DATE_FORMAT};
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Public endpoint of the pricing provider
pub const DEFAULT_BASE_URL: &str = "https://api.travelpayouts.com";

/// Upper bound on city suggestions returned for one term
pub const MAX_CITY_SUGGESTIONS: usize = 5;

/// Page size requested from the provider; the contract caps it at 30
pub const PAGE_LIMIT: u32 = 30;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const CITIES_PATH: &str = "/data/en/cities.json";
const CHEAP_PRICES_PATH: &str = "/v1/prices/cheap";

/// Connection and credential settings for the pricing provider.
///
/// Built by the caller from configuration; the client never reads the
/// environment itself.
#[derive(Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub token: String,
    pub marker: String,
    /// Site host reported to the provider for affiliate attribution
    pub host: Option<String>,
    pub currency: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(token: impl Into<String>, marker: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            marker: marker.into(),
            host: None,
            currency: "USD".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// The token must never show up in logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .field("marker", &self.marker)
            .field("host", &self.host)
            .field("currency", &self.currency)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Operations the proxy needs from a fare provider
#[async_trait]
pub trait FareProvider: Send + Sync {
    /// Up to five cities whose name or code contains `term`.
    ///
    /// Surrounding whitespace in `term` is ignored, so `" Lon"` matches
    /// London; a term that is blank after trimming returns no cities.
    async fn lookup_cities(&self, term: &str) -> Result<Vec<City>, ProviderError>;

    /// One upstream fare search, payload returned verbatim
    async fn search_fares(&self, request: &SearchRequest) -> Result<FareResults, ProviderError>;
}

/// Keep cities whose name or code contains the trimmed `term`, ignoring case.
///
/// Provider order is preserved and at most [`MAX_CITY_SUGGESTIONS`] entries
/// are returned. A term that is blank after trimming matches nothing.
pub fn filter_cities(cities: &[City], term: &str) -> Vec<City> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    cities
        .iter()
        .filter(|city| {
            city.name.to_lowercase().contains(&needle) || city.code.to_lowercase().contains(&needle)
        })
        .take(MAX_CITY_SUGGESTIONS)
        .cloned()
        .collect()
}

/// Client for the pricing provider's city list and cheap-prices endpoint
pub struct PricingClient {
    http_client: Client,
    config: ProviderConfig,
}

impl PricingClient {
    /// Create a new pricing client
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        debug!(config = ?config, "Creating new pricing client");
        if config.base_url.trim().is_empty() {
            return Err(ProviderError::Config("base_url is empty".to_string()));
        }

        let http_client = Client::builder()
            .user_agent(concat!("rust-fares/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Config(e.to_string()))?;

        Ok(Self { http_client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Full city reference list in provider order
    #[instrument(level = "debug", skip(self))]
    pub async fn fetch_cities(&self) -> Result<Vec<City>, ProviderError> {
        let value = self.get_json(&self.url(CITIES_PATH), &[]).await?;
        let cities: Vec<City> = serde_json::from_value(value)
            .map_err(|e| ProviderError::Malformed(format!("city list: {}", e)))?;
        debug!(cities = cities.len(), "Fetched city reference list");
        Ok(cities)
    }

    /// Query parameters for the cheap-prices endpoint
    fn fare_query(&self, request: &SearchRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("origin", request.origin.clone()),
            ("destination", request.destination.clone()),
            ("depart_date", request.depart_date.format(DATE_FORMAT).to_string()),
        ];
        if let Some(return_date) = request.return_date {
            query.push(("return_date", return_date.format(DATE_FORMAT).to_string()));
        }
        query.extend([
            ("token", self.config.token.clone()),
            ("marker", self.config.marker.clone()),
            ("trip_class", "Y".to_string()),
            ("currency", self.config.currency.clone()),
            ("page", "1".to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("show_to_affiliates", "true".to_string()),
            ("sorting", "price".to_string()),
        ]);
        if let Some(host) = &self.config.host {
            query.push(("host", host.clone()));
        }
        query
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&'static str, String)],
    ) -> Result<serde_json::Value, ProviderError> {
        let start_time = Instant::now();
        let response = self.http_client.get(url).query(query).send().await?;
        let status = response.status();

        info!(
            url = %url,
            status = %status,
            duration_ms = start_time.elapsed().as_millis(),
            "Provider request completed"
        );

        if !status.is_success() {
            error!(url = %url, status = %status, "Provider request failed");
            return Err(ProviderError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl FareProvider for PricingClient {
    #[instrument(level = "info", skip(self))]
    async fn lookup_cities(&self, term: &str) -> Result<Vec<City>, ProviderError> {
        if term.trim().is_empty() {
            debug!("Empty term, skipping provider lookup");
            return Ok(Vec::new());
        }

        let cities = self.fetch_cities().await?;
        let matches = filter_cities(&cities, term);
        info!(matches = matches.len(), "City lookup completed");
        Ok(matches)
    }

    #[instrument(
        level = "info",
        skip(self, request),
        fields(origin = %request.origin, destination = %request.destination)
    )]
    async fn search_fares(&self, request: &SearchRequest) -> Result<FareResults, ProviderError> {
        // adults has no counterpart in the cheap-prices contract
        debug!(adults = request.adults, "Building fare search request");

        let value = self
            .get_json(&self.url(CHEAP_PRICES_PATH), &self.fare_query(request))
            .await?;

        if value.get("success").and_then(|s| s.as_bool()) == Some(false) {
            let reason = value
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unspecified")
                .to_string();
            error!(reason = %reason, "Provider rejected fare search");
            return Err(ProviderError::Malformed(format!("provider reported failure: {}", reason)));
        }

        info!("Fare search completed");
        Ok(FareResults::new(value))
    }
}
