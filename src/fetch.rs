use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

/// Fixed upstream endpoints (overridable for tests via `with_endpoints`).
pub const CATALOG_API: &str =
    "https://restcountries.com/v2/all?fields=name,capital,region,population,flag,currencies";
pub const RATES_API: &str = "https://open.er-api.com/v6/latest/USD";

/// Per-request timeout applied to both upstream calls.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Sentinel the rate source reports on success.
pub const RATES_SUCCESS: &str = "success";

#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure, timeout, non-2xx status, or undecodable payload.
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The rate source answered but did not report the success sentinel.
    #[error("rate source reported status {status:?}")]
    UpstreamStatus { status: String },
}

/// One entry of a country's currency list.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyEntry {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

/// Raw catalog entry as served by the country source.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    #[serde(default)]
    pub capital: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub population: Option<i64>,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub currencies: Option<Vec<CurrencyEntry>>,
}

/// Raw rate table response: `result` is a self-reported status field,
/// `rates` maps currency code to a USD-relative rate.
#[derive(Debug, Clone, Deserialize)]
pub struct RatesResponse {
    pub result: String,
    #[serde(default)]
    pub rates: HashMap<String, f64>,
}

/// Seam for the two upstream datasets, injectable so the pipeline can be
/// exercised without network access.
#[async_trait]
pub trait ExternalSources {
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, FetchError>;
    async fn fetch_rates(&self) -> Result<RatesResponse, FetchError>;
}

/// Fetch both datasets concurrently and wait for both. Either failure, or a
/// rate table whose status is not the success sentinel, fails the whole call.
pub async fn fetch_both<S: ExternalSources + Sync>(
    sources: &S,
) -> Result<(Vec<CatalogEntry>, RatesResponse), FetchError> {
    let (catalog, rates) = tokio::try_join!(sources.fetch_catalog(), sources.fetch_rates())?;

    if rates.result != RATES_SUCCESS {
        return Err(FetchError::UpstreamStatus {
            status: rates.result,
        });
    }

    Ok((catalog, rates))
}

/// Production source backed by reqwest with a bounded timeout per request.
pub struct HttpSources {
    client: reqwest::Client,
    catalog_url: String,
    rates_url: String,
}

impl HttpSources {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_endpoints(CATALOG_API, RATES_API)
    }

    pub fn with_endpoints(
        catalog_url: impl Into<String>,
        rates_url: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            client,
            catalog_url: catalog_url.into(),
            rates_url: rates_url.into(),
        })
    }
}

#[async_trait]
impl ExternalSources for HttpSources {
    async fn fetch_catalog(&self) -> Result<Vec<CatalogEntry>, FetchError> {
        let response = self
            .client
            .get(&self.catalog_url)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }

    async fn fetch_rates(&self) -> Result<RatesResponse, FetchError> {
        let response = self
            .client
            .get(&self.rates_url)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}
