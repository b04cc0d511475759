//! Bureau of Labor Statistics (BLS) public API integration.
//!
//! Used for macro context around the earnings model:
//! - CPI-U, to restate survey wages in constant dollars
//! - statewide LAUS unemployment rates, to correct employment premiums for
//!   the labor market

use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::RoiError;

const BASE_URL: &str = "https://api.bls.gov/publicAPI/v2/timeseries/data";
/// The v2 API returns at most this many years per request.
const MAX_YEARS_PER_REQUEST: i32 = 20;
const COLLABORATOR: &str = "labor statistics";

/// CPI-U, U.S. city average, all items, seasonally adjusted.
pub const CPI_U_SERIES: &str = "CUSR0000SA0";

/// Local Area Unemployment Statistics measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LausMeasure {
    UnemploymentRate,
    Unemployment,
    Employment,
    LaborForce,
}

impl LausMeasure {
    fn code(self) -> &'static str {
        match self {
            LausMeasure::UnemploymentRate => "03",
            LausMeasure::Unemployment => "04",
            LausMeasure::Employment => "05",
            LausMeasure::LaborForce => "06",
        }
    }
}

/// Statewide LAUS series id, e.g. `LAUST080000000000005` for Colorado employment.
pub fn employment_series_id(state_fips: &str, measure: LausMeasure) -> Result<String, RoiError> {
    let state = check_state_fips(state_fips)?;
    Ok(format!("LAUST{state}00000000000{}", measure.code()))
}

fn check_state_fips(raw: &str) -> Result<String, RoiError> {
    let t = raw.trim();
    let padded = if t.len() == 1 { format!("0{t}") } else { t.to_string() };
    if padded.len() != 2 || !padded.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RoiError::invalid(format!("'{raw}' is not a two-digit state FIPS code")));
    }
    Ok(padded)
}

/// One monthly observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    /// First day of the observation month.
    pub date: NaiveDate,
    pub value: f64,
}

/// An ordered (ascending) monthly series.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub series_id: String,
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone)]
pub struct BlsConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

pub struct BlsClient {
    client: Client,
    config: BlsConfig,
}

impl BlsClient {
    pub fn new(config: BlsConfig) -> Result<Self, RoiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| collaborator(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, RoiError> {
        dotenvy::dotenv().ok();
        let api_key = std::env::var("BLS_API_KEY")
            .map_err(|_| RoiError::invalid("missing BLS_API_KEY in environment (.env)"))?;
        Self::new(BlsConfig {
            api_key,
            base_url: BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        })
    }

    /// Fetch monthly observations for `start_year..=end_year`.
    ///
    /// Ranges longer than the API allows are split into several requests.
    pub fn fetch_series(
        &self,
        series_id: &str,
        start_year: i32,
        end_year: i32,
    ) -> Result<TimeSeries, RoiError> {
        if end_year < start_year {
            return Err(RoiError::invalid(format!(
                "end year {end_year} precedes start year {start_year}"
            )));
        }

        let mut points = Vec::new();
        let mut chunk_start = start_year;
        while chunk_start <= end_year {
            let chunk_end = (chunk_start + MAX_YEARS_PER_REQUEST - 1).min(end_year);
            let body = self.get_with_retry(series_id, chunk_start, chunk_end)?;
            points.extend(parse_bls_body(&body)?);
            chunk_start = chunk_end + 1;
        }

        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        if points.is_empty() {
            return Err(collaborator(format!(
                "no observations returned for series {series_id}"
            )));
        }
        debug!(series_id, n = points.len(), "fetched BLS series");

        Ok(TimeSeries {
            series_id: series_id.to_string(),
            points,
        })
    }

    fn get_with_retry(&self, series_id: &str, start: i32, end: i32) -> Result<String, RoiError> {
        let attempts = self.config.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.config.backoff_base * 2u32.pow(attempt - 1);
                thread::sleep(delay);
                debug!(attempt, "retrying BLS request");
            }
            match self.get(series_id, start, end) {
                Ok(body) => return Ok(body),
                Err(Failure::Permanent(e)) => return Err(e),
                Err(Failure::Transient(e)) => {
                    warn!(attempt, error = %e, "BLS request failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| collaborator("all retries exhausted")))
    }

    fn get(&self, series_id: &str, start: i32, end: i32) -> Result<String, Failure> {
        let url = format!("{}/{series_id}", self.config.base_url);
        let resp = self
            .client
            .get(url)
            .query(&[
                ("startyear", start.to_string()),
                ("endyear", end.to_string()),
                ("registrationkey", self.config.api_key.clone()),
            ])
            .send()
            .map_err(|e| Failure::Transient(collaborator(format!("request failed: {e}"))))?;

        let status = resp.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(Failure::Transient(collaborator(format!("status {status}"))));
        }
        if !status.is_success() {
            return Err(Failure::Permanent(collaborator(format!("status {status}"))));
        }
        resp.text()
            .map_err(|e| Failure::Transient(collaborator(format!("failed to read body: {e}"))))
    }
}

enum Failure {
    Transient(RoiError),
    Permanent(RoiError),
}

fn collaborator(reason: impl Into<String>) -> RoiError {
    RoiError::Collaborator {
        collaborator: COLLABORATOR,
        reason: reason.into(),
    }
}

#[derive(Debug, Deserialize)]
struct BlsResponse {
    status: String,
    #[serde(default)]
    message: Vec<String>,
    #[serde(rename = "Results")]
    results: Option<BlsResults>,
}

#[derive(Debug, Deserialize)]
struct BlsResults {
    series: Vec<BlsSeries>,
}

#[derive(Debug, Deserialize)]
struct BlsSeries {
    data: Vec<BlsDatum>,
}

#[derive(Debug, Deserialize)]
struct BlsDatum {
    year: String,
    period: String,
    value: String,
}

/// Parse a v2 timeseries response into monthly points.
///
/// Annual averages (`M13`) and non-monthly periods are skipped, as are
/// unavailable values (`-`). Points come back unsorted.
pub fn parse_bls_body(body: &str) -> Result<Vec<SeriesPoint>, RoiError> {
    let resp: BlsResponse = serde_json::from_str(body)
        .map_err(|e| collaborator(format!("failed to parse response: {e}")))?;
    if resp.status != "REQUEST_SUCCEEDED" {
        return Err(collaborator(format!(
            "API returned {}: {}",
            resp.status,
            resp.message.join("; ")
        )));
    }

    let series = resp
        .results
        .map(|r| r.series)
        .unwrap_or_default()
        .into_iter()
        .next()
        .ok_or_else(|| collaborator("response contains no series"))?;

    let mut out = Vec::with_capacity(series.data.len());
    for datum in series.data {
        let Some(month) = parse_month(&datum.period) else {
            continue;
        };
        let Some(value) = parse_value(&datum.value) else {
            continue;
        };
        let year: i32 = datum
            .year
            .trim()
            .parse()
            .map_err(|_| collaborator(format!("invalid year '{}'", datum.year)))?;
        let date = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| collaborator(format!("invalid date {year}-{month}")))?;
        out.push(SeriesPoint { date, value });
    }
    Ok(out)
}

fn parse_month(period: &str) -> Option<u32> {
    let m: u32 = period.strip_prefix('M')?.parse().ok()?;
    (1..=12).contains(&m).then_some(m)
}

fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "-" || trimmed.is_empty() {
        return None;
    }
    let v = trimmed.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}
