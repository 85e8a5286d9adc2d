//! # NOAA Tide Prediction Fetching
//!
//! This module handles all network operations for fetching tide predictions
//! from NOAA's CO-OPS data API.
//!
//! ## Data Source
//!
//! ### NOAA CO-OPS `datagetter`
//! - **URL**: https://api.tidesandcurrents.noaa.gov/api/prod/datagetter
//! - **Product**: `predictions`, hourly (`interval=h`), feet (`units=english`)
//! - **Format**: JSON, `{"predictions": [{"t": "2024-01-01 00:00", "v": "1.234"}, ...]}`
//! - **Window**: `now - 12h` to `now + 12h`, roughly 25 hourly rows
//!
//! ### Data Processing Pipeline
//! 1. **Window**: compute begin/end around the caller's "now"
//! 2. **Fetch**: HTTP GET with the station, datum and time zone mode
//! 3. **Parse**: every row must carry a `%Y-%m-%d %H:%M` time and a finite number
//! 4. **Return**: a [`TideSeries`] tagged with the time reference it was requested in
//!
//! ## Error Handling
//!
//! Any failure fails the whole fetch; there is no partial series:
//! - **Network errors**: connect/read failures and timeouts
//! - **Server errors**: non-2xx responses
//! - **API errors**: NOAA answers bad requests with `200 {"error": {"message": ...}}`
//! - **Parse failures**: malformed JSON, an empty list, or any bad row
//!
//! All errors propagate through the `FetchError` enum.

use crate::clock::{ReferenceTime, TimeReference};
use crate::config::{ApiConfig, StationConfig};
use crate::{TideSample, TideSeries};
use chrono::{Duration, NaiveDateTime};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Timestamp format of the `t` field in NOAA JSON responses.
pub const RESPONSE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Timestamp format of the `begin_date`/`end_date` query parameters.
pub const QUERY_TIME_FORMAT: &str = "%Y%m%d %H:%M";

/// Errors that can occur while fetching and parsing predictions.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed (network, timeout, or protocol error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),

    /// Body was not the expected JSON shape
    #[error("malformed response: {0}")]
    Json(#[from] serde_json::Error),

    /// NOAA rejected the request
    #[error("NOAA API error: {0}")]
    Api(String),

    /// Response carried no predictions
    #[error("no predictions returned")]
    Empty,

    /// A single row could not be used
    #[error("prediction {index}: {reason}")]
    Sample { index: usize, reason: String },
}

/// Something that can produce the tide series around a given instant.
#[allow(async_fn_in_trait)]
pub trait TideSource {
    async fn fetch(&self, now: &ReferenceTime) -> Result<TideSeries, FetchError>;
}

/// The begin/end bounds of one predictions query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryWindow {
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reference: TimeReference,
}

impl QueryWindow {
    /// `[now - half_width, now + half_width]` on now's wall clock.
    pub fn around(now: &ReferenceTime, half_width: Duration) -> Self {
        Self {
            begin: now.at - half_width,
            end: now.at + half_width,
            reference: now.reference,
        }
    }
}

/// Client for the NOAA CO-OPS predictions endpoint.
pub struct NoaaClient {
    http: reqwest::Client,
    base_url: String,
    application: String,
    station: String,
    datum: String,
    window: Duration,
}

impl NoaaClient {
    pub fn new(station: &StationConfig, api: &ApiConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(api.timeout_seconds))
            .build()?;
        Ok(Self {
            http,
            base_url: api.base_url.clone(),
            application: api.application.clone(),
            station: station.id.clone(),
            datum: station.datum.clone(),
            window: Duration::hours(api.window_hours),
        })
    }

    /// Query string parameters for a predictions request over `window`.
    pub fn query(&self, window: &QueryWindow) -> Vec<(&'static str, String)> {
        vec![
            ("begin_date", window.begin.format(QUERY_TIME_FORMAT).to_string()),
            ("end_date", window.end.format(QUERY_TIME_FORMAT).to_string()),
            ("station", self.station.clone()),
            ("product", "predictions".to_string()),
            ("datum", self.datum.clone()),
            ("units", "english".to_string()),
            ("time_zone", window.reference.noaa_token().to_string()),
            ("interval", "h".to_string()),
            ("format", "json".to_string()),
            ("application", self.application.clone()),
        ]
    }
}

impl TideSource for NoaaClient {
    async fn fetch(&self, now: &ReferenceTime) -> Result<TideSeries, FetchError> {
        let window = QueryWindow::around(now, self.window);
        tracing::debug!(
            station = %self.station,
            begin = %window.begin,
            end = %window.end,
            time_zone = window.reference.noaa_token(),
            "Requesting tide predictions"
        );

        let response = self
            .http
            .get(&self.base_url)
            .query(&self.query(&window))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        let series = parse_predictions(&body, window.reference)?;
        tracing::info!(
            station = %self.station,
            samples = series.samples.len(),
            "📡 Fetched tide predictions"
        );
        Ok(series)
    }
}

#[derive(Deserialize)]
struct PredictionsResponse {
    predictions: Option<Vec<RawPrediction>>,
    error: Option<ApiErrorBody>,
}

#[derive(Deserialize)]
struct RawPrediction {
    t: String,
    v: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Parse a NOAA predictions body into a series in `reference` time.
///
/// Fails on the first unusable row. Rows are kept in source order; a
/// timestamp earlier than its predecessor is an error, while a repeated one
/// is kept (local daylight time repeats an hour when clocks fall back).
///
/// ```
/// use tide_panel::clock::TimeReference;
/// use tide_panel::tide_data::parse_predictions;
///
/// let body = r#"{"predictions":[{"t":"2024-01-01 00:00","v":"1.23"}]}"#;
/// let series = parse_predictions(body, TimeReference::Utc).unwrap();
/// assert_eq!(series.samples[0].height, 1.23);
/// ```
pub fn parse_predictions(body: &str, reference: TimeReference) -> Result<TideSeries, FetchError> {
    let response: PredictionsResponse = serde_json::from_str(body)?;

    let raw = match (response.predictions, response.error) {
        (Some(predictions), _) => predictions,
        (None, Some(error)) => return Err(FetchError::Api(error.message)),
        (None, None) => return Err(FetchError::Empty),
    };
    if raw.is_empty() {
        return Err(FetchError::Empty);
    }

    let mut samples: Vec<TideSample> = Vec::with_capacity(raw.len());
    for (index, row) in raw.iter().enumerate() {
        let sample = parse_row(row).map_err(|reason| FetchError::Sample { index, reason })?;

        if let Some(prev) = samples.last() {
            if sample.timestamp < prev.timestamp {
                return Err(FetchError::Sample {
                    index,
                    reason: format!("timestamp {} is before {}", sample.timestamp, prev.timestamp),
                });
            }
        }
        samples.push(sample);
    }

    Ok(TideSeries { samples, reference })
}

fn parse_row(row: &RawPrediction) -> Result<TideSample, String> {
    let timestamp = NaiveDateTime::parse_from_str(row.t.trim(), RESPONSE_TIME_FORMAT)
        .map_err(|e| format!("bad time {:?}: {}", row.t, e))?;

    let height: f64 = row
        .v
        .trim()
        .parse()
        .map_err(|_| format!("bad height {:?}", row.v))?;
    if !height.is_finite() {
        return Err(format!("bad height {:?}", row.v));
    }

    Ok(TideSample { timestamp, height })
}
