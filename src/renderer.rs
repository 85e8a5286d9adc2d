//! # Tide Chart Rendering
//!
//! Draws a [`TideSeries`] into an RGB raster sized for one display panel:
//!
//! - blue line through the hourly predictions, translucent fill down to 0 ft
//! - dashed red "now" marker placed by time, not by sample index
//! - grid, y tick labels, rotated "Tide height (ft)" axis title
//! - `HH:MM` tick labels every three hours in the full layout only
//! - high/low labels in 12-hour clock time
//! - legend, title and an optional "last updated" stamp
//!
//! Rendering is a pure function of the series, the "now" reading and the
//! panel spec, so the same inputs always give the same pixels.

use crate::canvas::{Canvas, Rotated};
use crate::clock::{ReferenceTime, TimeReference};
use crate::extrema::{Extremum, ExtremumKind};
use crate::TideSeries;
use chrono::{Duration, NaiveDateTime, Timelike};
use embedded_graphics::{
    mono_font::{
        ascii::{FONT_10X20, FONT_6X10, FONT_7X13, FONT_9X15, FONT_9X15_BOLD},
        MonoFont, MonoTextStyle,
    },
    pixelcolor::Rgb888,
    prelude::*,
    primitives::{Line, Polyline, PrimitiveStyle, PrimitiveStyleBuilder, Rectangle},
    text::{Alignment, Baseline, Text, TextStyle, TextStyleBuilder},
};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

const BACKGROUND: Rgb888 = Rgb888::new(255, 255, 255);
const INK: Rgb888 = Rgb888::new(0, 0, 0);
const LINE_COLOR: Rgb888 = Rgb888::new(31, 119, 180);
const FILL_COLOR: Rgb888 = Rgb888::new(0, 0, 255);
const FILL_ALPHA: f32 = 0.2;
const NOW_COLOR: Rgb888 = Rgb888::new(255, 0, 0);
const GRID_COLOR: Rgb888 = Rgb888::new(176, 176, 176);
const LEGEND_EDGE: Rgb888 = Rgb888::new(204, 204, 204);
const ANNOTATION_COLOR: Rgb888 = Rgb888::new(0, 0, 255);

const Y_AXIS_TITLE: &str = "Tide height (ft)";
const DATA_LABEL: &str = "Predicted";
const NOW_LABEL: &str = "Now";

/// Offset of extrema labels from their point, in pixels.
const ANNOTATION_OFFSET: i32 = 8;
const DASH_ON: u32 = 6;
const DASH_OFF: u32 = 4;
const X_TICK_HOURS: i64 = 3;
const MIN_PLOT_SIZE: u32 = 20;

/// Errors from chart rendering.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A line chart needs at least two samples
    #[error("need at least 2 samples to draw a chart, got {0}")]
    InsufficientData(usize),

    /// Series and "now" were read on different wall clocks
    #[error("series is in {series} time but now is in {now} time")]
    ReferenceMismatch {
        series: TimeReference,
        now: TimeReference,
    },

    /// Margins leave no room for the plot
    #[error("canvas {width}x{height} is too small for a chart")]
    CanvasTooSmall { width: u32, height: u32 },
}

/// How much axis decoration a chart carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartLayout {
    /// No x tick labels; suits a short strip such as 800x240
    #[default]
    Compact,
    /// Rotated `HH:MM` x tick labels
    Full,
}

/// Size and style of one rendered chart.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PanelSpec {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub layout: ChartLayout,
}

impl PanelSpec {
    pub fn compact(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            dpi: 100,
            layout: ChartLayout::Compact,
        }
    }

    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            dpi: 100,
            layout: ChartLayout::Full,
        }
    }
}

/// Pixel rectangle the data is plotted into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlotArea {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl PlotArea {
    pub fn right(&self) -> i32 {
        self.left + self.width as i32 - 1
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32 - 1
    }

    fn rectangle(&self) -> Rectangle {
        Rectangle::new(
            Point::new(self.left, self.top),
            Size::new(self.width, self.height),
        )
    }
}

/// A finished chart raster.
#[derive(Clone, Debug)]
pub struct ChartImage {
    pixels: RgbImage,
    plot: PlotArea,
    now_x: Option<i32>,
    extrema: Vec<Extremum>,
}

impl ChartImage {
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_rgb_image(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn into_rgb_image(self) -> RgbImage {
        self.pixels
    }

    /// Where the data was plotted.
    pub fn plot_area(&self) -> PlotArea {
        self.plot
    }

    /// Column of the "now" marker, if now fell inside the sampled span.
    pub fn now_marker_x(&self) -> Option<i32> {
        self.now_x
    }

    /// Extrema that were found in the series (annotated or not).
    pub fn extrema(&self) -> &[Extremum] {
        &self.extrema
    }

    /// Encode as PNG.
    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut bytes = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)?;
        Ok(bytes)
    }
}

/// Font set for one DPI class.
struct Fonts {
    title: &'static MonoFont<'static>,
    label: &'static MonoFont<'static>,
    tick: &'static MonoFont<'static>,
    annotation: &'static MonoFont<'static>,
}

impl Fonts {
    fn for_dpi(dpi: u32) -> Self {
        if dpi <= 120 {
            Fonts {
                title: &FONT_9X15_BOLD,
                label: &FONT_7X13,
                tick: &FONT_6X10,
                annotation: &FONT_6X10,
            }
        } else {
            Fonts {
                title: &FONT_10X20,
                label: &FONT_9X15,
                tick: &FONT_7X13,
                annotation: &FONT_7X13,
            }
        }
    }
}

/// Linear data → pixel mapping for one chart.
struct Axes {
    plot: PlotArea,
    t0: NaiveDateTime,
    span_secs: f64,
    y_min: f64,
    y_max: f64,
}

impl Axes {
    fn new(plot: PlotArea, series: &TideSeries) -> Option<Self> {
        let (t0, t1) = series.span()?;
        let (lo, hi) = series.height_range()?;
        let (y_min, y_max) = y_limits(lo, hi);
        Some(Self {
            plot,
            t0,
            span_secs: (t1 - t0).num_seconds().max(1) as f64,
            y_min,
            y_max,
        })
    }

    fn x_for(&self, t: NaiveDateTime) -> i32 {
        let frac = (t - self.t0).num_seconds() as f64 / self.span_secs;
        self.plot.left + (frac * (self.plot.width - 1) as f64).round() as i32
    }

    fn y_for(&self, height: f64) -> i32 {
        let frac = (height - self.y_min) / (self.y_max - self.y_min);
        self.plot.bottom() - (frac * (self.plot.height - 1) as f64).round() as i32
    }

    fn contains_time(&self, t: NaiveDateTime) -> bool {
        let secs = (t - self.t0).num_seconds() as f64;
        (0.0..=self.span_secs).contains(&secs)
    }
}

/// Renders tide series into chart images.
#[derive(Clone, Debug)]
pub struct ChartRenderer {
    title: String,
    annotate_extrema: bool,
    show_updated: bool,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self::new("Tides")
    }
}

impl ChartRenderer {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            annotate_extrema: true,
            show_updated: false,
        }
    }

    pub fn annotate_extrema(mut self, enabled: bool) -> Self {
        self.annotate_extrema = enabled;
        self
    }

    /// Stamp the chart with `now` as its "last updated" time.
    pub fn show_updated(mut self, enabled: bool) -> Self {
        self.show_updated = enabled;
        self
    }

    /// Render `series` for `panel` with the "now" marker at `now`.
    pub fn render(
        &self,
        series: &TideSeries,
        now: &ReferenceTime,
        panel: &PanelSpec,
    ) -> Result<ChartImage, RenderError> {
        if series.samples.len() < 2 {
            return Err(RenderError::InsufficientData(series.samples.len()));
        }
        if series.reference != now.reference {
            return Err(RenderError::ReferenceMismatch {
                series: series.reference,
                now: now.reference,
            });
        }

        let fonts = Fonts::for_dpi(panel.dpi);
        let plot = plot_area(panel, &fonts, series)?;
        let axes = Axes::new(plot, series).ok_or(RenderError::InsufficientData(0))?;

        let mut canvas = Canvas::new(panel.width, panel.height, BACKGROUND);

        let points: Vec<Point> = series
            .samples
            .iter()
            .map(|s| Point::new(axes.x_for(s.timestamp), axes.y_for(s.height)))
            .collect();

        self.draw_grid(&mut canvas, &axes, &fonts, panel.layout);
        fill_under_curve(&mut canvas, &points, axes.y_for(0.0));

        plot.rectangle()
            .into_styled(PrimitiveStyle::with_stroke(INK, 1))
            .draw(&mut canvas)
            .ok();

        Polyline::new(&points)
            .into_styled(PrimitiveStyle::with_stroke(LINE_COLOR, 2))
            .draw(&mut canvas)
            .ok();

        let now_x = if axes.contains_time(now.at) {
            let x = axes.x_for(now.at);
            draw_dashed_vline(&mut canvas, x, plot.top, plot.bottom(), NOW_COLOR);
            Some(x)
        } else {
            tracing::warn!(now = %now.at, "Current time is outside the predictions window");
            None
        };

        let extrema = series.extrema();
        if self.annotate_extrema {
            for extremum in &extrema {
                let sample = &series.samples[extremum.index];
                annotate(
                    &mut canvas,
                    points[extremum.index],
                    extremum.kind,
                    &sample.timestamp.format("%-I:%M %p").to_string(),
                    fonts.annotation,
                );
            }
        }

        draw_legend(&mut canvas, &plot, &points, fonts.tick);
        self.draw_titles(&mut canvas, &plot, &fonts, now);

        tracing::debug!(
            width = panel.width,
            height = panel.height,
            samples = series.samples.len(),
            extrema = extrema.len(),
            now_x = ?now_x,
            "🎨 Rendered tide chart"
        );

        Ok(ChartImage {
            pixels: canvas.into_image(),
            plot,
            now_x,
            extrema,
        })
    }

    fn draw_grid(&self, canvas: &mut Canvas, axes: &Axes, fonts: &Fonts, layout: ChartLayout) {
        let plot = axes.plot;
        let grid = PrimitiveStyle::with_stroke(GRID_COLOR, 1);
        let tick_style = MonoTextStyle::new(fonts.tick, INK);

        for value in y_ticks(axes.y_min, axes.y_max) {
            let y = axes.y_for(value);
            Line::new(Point::new(plot.left, y), Point::new(plot.right(), y))
                .into_styled(grid)
                .draw(canvas)
                .ok();
            Text::with_text_style(
                &format_tick(value),
                Point::new(plot.left - 4, y),
                tick_style,
                text_style(Alignment::Right, Baseline::Middle),
            )
            .draw(canvas)
            .ok();
        }

        let end = axes.t0 + Duration::seconds(axes.span_secs as i64);
        for t in x_ticks(axes.t0, end) {
            let x = axes.x_for(t);
            Line::new(Point::new(x, plot.top), Point::new(x, plot.bottom()))
                .into_styled(grid)
                .draw(canvas)
                .ok();

            if layout == ChartLayout::Full {
                let label = t.format("%H:%M").to_string();
                let text_w = text_width(fonts.tick, &label) as i32;
                let glyph_h = fonts.tick.character_size.height as i32;
                let origin = Point::new(x - glyph_h / 2, plot.bottom() + 4 + text_w);
                let mut rotated = Rotated::new(canvas, origin);
                Text::with_text_style(
                    &label,
                    Point::zero(),
                    tick_style,
                    text_style(Alignment::Left, Baseline::Top),
                )
                .draw(&mut rotated)
                .ok();
            }
        }
    }

    fn draw_titles(&self, canvas: &mut Canvas, plot: &PlotArea, fonts: &Fonts, now: &ReferenceTime) {
        let width = canvas.width() as i32;

        Text::with_text_style(
            &self.title,
            Point::new(plot.left + plot.width as i32 / 2, 4),
            MonoTextStyle::new(fonts.title, INK),
            text_style(Alignment::Center, Baseline::Top),
        )
        .draw(canvas)
        .ok();

        let label_w = text_width(fonts.label, Y_AXIS_TITLE) as i32;
        let center_y = plot.top + plot.height as i32 / 2;
        let mut rotated = Rotated::new(canvas, Point::new(4, center_y + label_w / 2));
        Text::with_text_style(
            Y_AXIS_TITLE,
            Point::zero(),
            MonoTextStyle::new(fonts.label, INK),
            text_style(Alignment::Left, Baseline::Top),
        )
        .draw(&mut rotated)
        .ok();

        if self.show_updated {
            let stamp = now.at.format("Updated %-m/%-d %-I:%M%p").to_string();
            Text::with_text_style(
                &stamp,
                Point::new(width - 4, 4),
                MonoTextStyle::new(fonts.tick, INK),
                text_style(Alignment::Right, Baseline::Top),
            )
            .draw(canvas)
            .ok();
        }
    }
}

/// Compute the plot rectangle left over after titles, labels and margins.
fn plot_area(panel: &PanelSpec, fonts: &Fonts, series: &TideSeries) -> Result<PlotArea, RenderError> {
    let too_small = RenderError::CanvasTooSmall {
        width: panel.width,
        height: panel.height,
    };

    // Widest y tick label decides the left margin
    let (lo, hi) = series.height_range().unwrap_or((0.0, 1.0));
    let (y_min, y_max) = y_limits(lo, hi);
    let tick_chars = y_ticks(y_min, y_max)
        .into_iter()
        .map(|v| format_tick(v).len())
        .max()
        .unwrap_or(1) as u32;

    let left = 4 + fonts.label.character_size.height + 6 + tick_chars * fonts.tick.character_size.width + 6;
    let top = 4 + fonts.title.character_size.height + 6;
    let right = 12;
    let bottom = match panel.layout {
        ChartLayout::Compact => 8,
        ChartLayout::Full => 4 + text_width(fonts.tick, "00:00") + 8,
    };

    let width = panel
        .width
        .checked_sub(left + right)
        .filter(|w| *w >= MIN_PLOT_SIZE)
        .ok_or_else(|| too_small.clone())?;
    let height = panel
        .height
        .checked_sub(top + bottom)
        .filter(|h| *h >= MIN_PLOT_SIZE)
        .ok_or(too_small)?;

    Ok(PlotArea {
        left: left as i32,
        top: top as i32,
        width,
        height,
    })
}

/// Y limits covering the data and the zero baseline, padded 5% each side.
fn y_limits(lo: f64, hi: f64) -> (f64, f64) {
    let mut lo = lo.min(0.0);
    let mut hi = hi.max(0.0);
    if hi - lo < 1e-9 {
        lo -= 1.0;
        hi += 1.0;
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad, hi + pad)
}

/// Step of 1, 2 or 5 × 10ⁿ giving about five ticks over `range`.
fn nice_step(range: f64) -> f64 {
    let raw = range / 5.0;
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn y_ticks(y_min: f64, y_max: f64) -> Vec<f64> {
    let step = nice_step(y_max - y_min);
    let first = (y_min / step).ceil() as i64;
    let last = (y_max / step).floor() as i64;
    (first..=last).map(|k| k as f64 * step).collect()
}

/// Whole hours divisible by three within `[start, end]`.
fn x_ticks(start: NaiveDateTime, end: NaiveDateTime) -> Vec<NaiveDateTime> {
    let Some(mut t) = start
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
    else {
        return Vec::new();
    };
    if t < start {
        t += Duration::hours(1);
    }
    while t.hour() as i64 % X_TICK_HOURS != 0 {
        t += Duration::hours(1);
    }

    let mut ticks = Vec::new();
    while t <= end {
        ticks.push(t);
        t += Duration::hours(X_TICK_HOURS);
    }
    ticks
}

/// Tick label: whole numbers without decimals, otherwise one decimal.
fn format_tick(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded == 0.0 {
        "0".to_string()
    } else if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.1}", rounded)
    }
}

fn text_width(font: &MonoFont<'_>, text: &str) -> u32 {
    let chars = text.chars().count() as u32;
    chars * (font.character_size.width + font.character_spacing)
}

fn text_style(alignment: Alignment, baseline: Baseline) -> TextStyle {
    TextStyleBuilder::new()
        .alignment(alignment)
        .baseline(baseline)
        .build()
}

/// Blend the area between the polyline and `baseline_y`, column by column.
fn fill_under_curve(canvas: &mut Canvas, points: &[Point], baseline_y: i32) {
    let last = points.len().saturating_sub(2);
    for (i, pair) in points.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let dx = b.x - a.x;
        // The right edge belongs to the next segment, except on the last one
        let end = if i == last { b.x } else { b.x - 1 };
        for x in a.x..=end {
            let y = if dx == 0 {
                a.y
            } else {
                a.y + ((b.y - a.y) as f64 * (x - a.x) as f64 / dx as f64).round() as i32
            };
            canvas.blend_vspan(x, y, baseline_y, FILL_COLOR, FILL_ALPHA);
        }
    }
}

fn draw_dashed_vline(canvas: &mut Canvas, x: i32, top: i32, bottom: i32, color: Rgb888) {
    let style = PrimitiveStyle::with_fill(color);
    let mut y = top;
    while y <= bottom {
        let len = DASH_ON.min((bottom - y + 1) as u32);
        Rectangle::new(Point::new(x, y), Size::new(2, len))
            .into_styled(style)
            .draw(canvas)
            .ok();
        y += (DASH_ON + DASH_OFF) as i32;
    }
}

fn annotate(canvas: &mut Canvas, at: Point, kind: ExtremumKind, label: &str, font: &MonoFont<'_>) {
    let (position, baseline) = match kind {
        ExtremumKind::Peak => (at + Point::new(-ANNOTATION_OFFSET, -ANNOTATION_OFFSET), Baseline::Bottom),
        ExtremumKind::Valley => (at + Point::new(-ANNOTATION_OFFSET, ANNOTATION_OFFSET), Baseline::Top),
    };
    Text::with_text_style(
        label,
        position,
        MonoTextStyle::new(font, ANNOTATION_COLOR),
        text_style(Alignment::Left, baseline),
    )
    .draw(canvas)
    .ok();
}

/// Legend in whichever plot corner covers the fewest data points.
fn draw_legend(canvas: &mut Canvas, plot: &PlotArea, points: &[Point], font: &MonoFont<'_>) {
    const SWATCH: i32 = 20;
    const PAD: i32 = 6;

    let row_h = font.character_size.height as i32 + 4;
    let label_w = text_width(font, DATA_LABEL).max(text_width(font, NOW_LABEL)) as i32;
    let size = Size::new(
        (PAD + SWATCH + PAD + label_w + PAD) as u32,
        (PAD + 2 * row_h + PAD / 2) as u32,
    );
    let inset = 6;
    let corners = [
        Point::new(plot.right() - size.width as i32 - inset, plot.top + inset),
        Point::new(plot.left + inset, plot.top + inset),
        Point::new(plot.right() - size.width as i32 - inset, plot.bottom() - size.height as i32 - inset),
        Point::new(plot.left + inset, plot.bottom() - size.height as i32 - inset),
    ];
    let Some(top_left) = corners
        .iter()
        .copied()
        .min_by_key(|corner| {
            let area = Rectangle::new(*corner, size);
            points.iter().filter(|p| area.contains(**p)).count()
        })
    else {
        return;
    };

    let frame = Rectangle::new(top_left, size);
    frame
        .into_styled(
            PrimitiveStyleBuilder::new()
                .fill_color(BACKGROUND)
                .stroke_color(LEGEND_EDGE)
                .stroke_width(1)
                .build(),
        )
        .draw(canvas)
        .ok();

    let text = MonoTextStyle::new(font, INK);
    let swatch_x = top_left.x + PAD;
    let label_x = swatch_x + SWATCH + PAD;

    let data_y = top_left.y + PAD + row_h / 2;
    Line::new(Point::new(swatch_x, data_y), Point::new(swatch_x + SWATCH, data_y))
        .into_styled(PrimitiveStyle::with_stroke(LINE_COLOR, 2))
        .draw(canvas)
        .ok();
    Text::with_text_style(
        DATA_LABEL,
        Point::new(label_x, data_y),
        text,
        text_style(Alignment::Left, Baseline::Middle),
    )
    .draw(canvas)
    .ok();

    let now_y = data_y + row_h;
    let mut x = swatch_x;
    while x < swatch_x + SWATCH {
        let len = (DASH_ON as i32).min(swatch_x + SWATCH - x);
        Rectangle::new(Point::new(x, now_y - 1), Size::new(len as u32, 2))
            .into_styled(PrimitiveStyle::with_fill(NOW_COLOR))
            .draw(canvas)
            .ok();
        x += (DASH_ON + DASH_OFF) as i32;
    }
    Text::with_text_style(
        NOW_LABEL,
        Point::new(label_x, now_y),
        text,
        text_style(Alignment::Left, Baseline::Middle),
    )
    .draw(canvas)
    .ok();
}
