//! Observations from the NOAA Climate Data Online API and their per-county
//! summaries.

pub mod collect;
pub mod noaa;
pub mod summary;

use serde::Deserialize;
use thiserror::Error;

use crate::{dates::DateRange, fips::FipsCode};

pub use collect::{collect, FetchOptions};
pub use noaa::{ApiConfig, NoaaClient};
pub use summary::{CountySummary, SummaryTable};

/// GHCND element of an observation. Elements this tool does not summarise
/// are kept as `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Element {
    /// Precipitation, tenths of mm
    Prcp,
    /// Maximum temperature, tenths of degrees C
    Tmax,
    /// Minimum temperature, tenths of degrees C
    Tmin,
    /// Snowfall, mm
    Snow,
    #[serde(other)]
    Other,
}

/// One entry of the CDO `results` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Observation {
    pub datatype: Element,
    pub value: f64,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub station: Option<String>,
}

#[cfg(test)]
impl Observation {
    pub fn new(datatype: Element, value: f64) -> Self {
        Observation {
            datatype,
            value,
            date: None,
            station: None,
        }
    }
}

/// Why a county produced no summary.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected HTTP status {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no observations in date range")]
    NoObservations,
}

impl FetchError {
    /// Short label used when tallying failures.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Status(_) => "status",
            FetchError::Parse(_) => "parse",
            FetchError::NoObservations => "no-observations",
        }
    }
}

/// Summary or failure reason for one county.
pub type CountyOutcome = Result<CountySummary, FetchError>;

/// Anything that can supply the observations for a county.
#[allow(async_fn_in_trait)]
pub trait ObservationSource {
    async fn observations(
        &self,
        fips: &FipsCode,
        range: &DateRange,
    ) -> Result<Vec<Observation>, FetchError>;
}
