//! # Tide Panel Core Library
//!
//! This library holds the whole fetch → render → publish pipeline that drives a
//! tide chart on a small e-paper panel. Each run of the pipeline builds fresh
//! values; nothing is cached or persisted between iterations.
//!
//! ## Data Flow
//! 1. **Fetch**: query NOAA CO-OPS for hourly predictions covering `now ± 12h`
//!    ([`tide_data`])
//! 2. **Render**: draw a line/area chart with a "now" marker and optional
//!    extrema labels into an RGB raster ([`renderer`])
//! 3. **Publish**: paste one or more charts into a frame sized for the panel
//!    and hand it to the display driver ([`publisher`], [`display`])
//!
//! [`pipeline::Pipeline`] ties the three together behind `run_once()` and
//! [`scheduler::Scheduler`] repeats it on a timer.
//!
//! ## Time Reference
//!
//! Timestamps are naive wall-clock readings. Which wall clock they belong to
//! is recorded alongside them as a [`clock::TimeReference`]: the same mode is
//! sent to NOAA, used to interpret the returned timestamps, and used to place
//! the "now" marker. A series and a "now" reading in different modes are
//! refused by the renderer.

use chrono::NaiveDateTime;

use crate::clock::TimeReference;

// Module declarations
pub mod canvas;
pub mod clock;
pub mod config;
pub mod display;
pub mod extrema;
pub mod pipeline;
pub mod publisher;
pub mod renderer;
pub mod scheduler;
pub mod tide_data;

#[cfg(test)]
mod tests;

/// A single predicted tide height at a wall-clock time.
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use tide_panel::TideSample;
///
/// let at = NaiveDate::from_ymd_opt(2024, 1, 1)
///     .and_then(|d| d.and_hms_opt(3, 0, 0))
///     .unwrap();
/// let sample = TideSample { timestamp: at, height: 4.2 };
/// assert_eq!(sample.height, 4.2);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TideSample {
    /// Wall-clock time of the prediction, in the owning series' time reference
    pub timestamp: NaiveDateTime,
    /// Predicted height in feet above the configured datum
    pub height: f64,
}

/// Hourly tide predictions covering the query window.
///
/// Samples are in non-decreasing timestamp order. A series returned by the
/// fetcher is never empty.
#[derive(Clone, Debug, PartialEq)]
pub struct TideSeries {
    /// Samples in non-decreasing timestamp order
    pub samples: Vec<TideSample>,
    /// Which wall clock the timestamps were requested in
    pub reference: TimeReference,
}

impl TideSeries {
    /// Heights in sample order.
    pub fn heights(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.height).collect()
    }

    /// Lowest and highest predicted heights, or `None` for an empty series.
    pub fn height_range(&self) -> Option<(f64, f64)> {
        if self.samples.is_empty() {
            return None;
        }
        Some(
            self.samples
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), s| {
                    (min.min(s.height), max.max(s.height))
                }),
        )
    }

    /// First and last sample timestamps.
    pub fn span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((self.samples.first()?.timestamp, self.samples.last()?.timestamp))
    }

    /// Local peaks and valleys, see [`extrema::find_extrema`].
    pub fn extrema(&self) -> Vec<extrema::Extremum> {
        extrema::find_extrema(&self.heights())
    }
}
