//! Client for the NOAA Climate Data Online v2 `data` endpoint.
//!
//! See <https://www.ncdc.noaa.gov/cdo-web/webservices/v2#data>.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    dates::{iso, DateRange},
    fips::FipsCode,
};

use super::{FetchError, Observation, ObservationSource};

pub const DEFAULT_BASE_URL: &str = "https://www.ncdc.noaa.gov/cdo-web/api/v2/data";

/// Largest page the API will return.
pub const MAX_LIMIT: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: String,
    pub dataset: String,
    pub limit: u32,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(token: &str) -> Self {
        ApiConfig {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.to_string(),
            dataset: "GHCND".to_string(),
            limit: MAX_LIMIT,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    metadata: Option<Metadata>,
    #[serde(default)]
    results: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    resultset: ResultSet,
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    count: u64,
}

pub struct NoaaClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl NoaaClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(NoaaClient { http, config })
    }
}

impl ObservationSource for NoaaClient {
    async fn observations(
        &self,
        fips: &FipsCode,
        range: &DateRange,
    ) -> Result<Vec<Observation>, FetchError> {
        debug!(%fips, %range, "Requesting observations");

        let response = self
            .http
            .get(&self.config.base_url)
            .query(&query_params(&self.config, fips, range))
            .header("token", &self.config.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        parse_response(fips, &body)
    }
}

fn query_params(config: &ApiConfig, fips: &FipsCode, range: &DateRange) -> Vec<(&'static str, String)> {
    vec![
        ("datasetid", config.dataset.clone()),
        ("locationid", format!("FIPS:{}", fips.as_str())),
        ("startdate", iso(range.start)),
        ("enddate", iso(range.end)),
        ("limit", config.limit.to_string()),
    ]
}

/// Decodes a `data` response body. The API answers `{}` when a location has
/// nothing for the range.
fn parse_response(fips: &FipsCode, body: &str) -> Result<Vec<Observation>, FetchError> {
    let response: DataResponse = serde_json::from_str(body)?;

    if response.results.is_empty() {
        return Err(FetchError::NoObservations);
    }

    if let Some(available) = truncated(&response) {
        warn!(
            %fips,
            available,
            returned = response.results.len(),
            "Results truncated to the first page"
        );
    }

    Ok(response.results)
}

/// Total result count when the API holds more than the returned page.
fn truncated(response: &DataResponse) -> Option<u64> {
    let available = response.metadata.as_ref()?.resultset.count;
    (available > response.results.len() as u64).then_some(available)
}

// -- Tests -------------------------------------------------------------------
