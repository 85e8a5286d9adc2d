//! # One Fetch → Render → Publish Iteration
//!
//! [`Pipeline::run_once`] reads the clock, fetches predictions around that
//! instant, renders every configured panel, composes them into one frame and
//! publishes it. Each stage's error is surfaced as a [`PipelineError`]; no
//! stage retries or substitutes data, so a failed iteration leaves the
//! display showing whatever it showed before.

use crate::clock::{Clock, ReferenceTime};
use crate::config::{Config, PanelConfig};
use crate::display::{DisplayDriver, DisplayError};
use crate::publisher::DisplayPublisher;
use crate::renderer::{ChartImage, ChartRenderer, RenderError};
use crate::tide_data::{FetchError, TideSource};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("fetching predictions failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("rendering chart failed: {0}")]
    Render(#[from] RenderError),

    #[error("publishing to display failed: {0}")]
    Display(#[from] DisplayError),
}

/// What one successful iteration did.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub now: ReferenceTime,
    pub samples: usize,
    pub extrema: usize,
    /// "Now" marker column of each panel, `None` when now fell outside its
    /// series.
    pub markers: Vec<Option<i32>>,
}

/// A unit of work the scheduler repeats.
#[allow(async_fn_in_trait)]
pub trait Cycle {
    async fn run_once(&mut self) -> Result<CycleReport, PipelineError>;
}

pub struct Pipeline<S, C, D> {
    source: S,
    clock: C,
    renderer: ChartRenderer,
    panels: Vec<PanelConfig>,
    publisher: DisplayPublisher<D>,
}

impl<S: TideSource, C: Clock, D: DisplayDriver> Pipeline<S, C, D> {
    pub fn new(
        source: S,
        clock: C,
        renderer: ChartRenderer,
        panels: Vec<PanelConfig>,
        publisher: DisplayPublisher<D>,
    ) -> Self {
        Self {
            source,
            clock,
            renderer,
            panels,
            publisher,
        }
    }

    /// Renderer and panel layout taken from `config`.
    pub fn from_config(source: S, clock: C, publisher: DisplayPublisher<D>, config: &Config) -> Self {
        let renderer = ChartRenderer::new(config.station.name.clone())
            .annotate_extrema(config.chart.annotate_extrema)
            .show_updated(config.chart.show_updated);
        Self::new(source, clock, renderer, config.chart.panels.clone(), publisher)
    }

    pub fn publisher(&self) -> &DisplayPublisher<D> {
        &self.publisher
    }

    pub async fn run_once(&mut self) -> Result<CycleReport, PipelineError> {
        let now = self.clock.now();
        let series = self.source.fetch(&now).await?;

        let charts = self
            .panels
            .iter()
            .map(|panel| self.renderer.render(&series, &now, &panel.spec()))
            .collect::<Result<Vec<ChartImage>, _>>()?;

        let frame = self.publisher.compose(
            charts
                .iter()
                .zip(&self.panels)
                .map(|(chart, panel)| (chart, panel.offset())),
        )?;
        self.publisher.publish(&frame)?;

        let report = CycleReport {
            now,
            samples: series.samples.len(),
            extrema: series.extrema().len(),
            markers: charts.iter().map(ChartImage::now_marker_x).collect(),
        };
        tracing::info!(
            at = %report.now.at,
            samples = report.samples,
            extrema = report.extrema,
            panels = charts.len(),
            "✅ Cycle complete"
        );
        Ok(report)
    }
}

impl<S: TideSource, C: Clock, D: DisplayDriver> Cycle for Pipeline<S, C, D> {
    async fn run_once(&mut self) -> Result<CycleReport, PipelineError> {
        Pipeline::run_once(self).await
    }
}
