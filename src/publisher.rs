//! # Display Publishing
//!
//! Composes rendered charts into a frame at the panel's native resolution and
//! pushes it through a [`DisplayDriver`]. The publisher owns its driver; it is
//! created once at startup and handed to the pipeline, so there is no
//! process-wide display state.

use crate::display::{BorderColour, DisplayDriver, DisplayError};
use crate::renderer::ChartImage;
use image::{Rgb, RgbImage};

/// A full-screen RGB frame at the display's native resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayFrame {
    pixels: RgbImage,
}

impl DisplayFrame {
    /// Blank white frame.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbImage::from_pixel(width, height, Rgb([255, 255, 255])),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn as_rgb_image(&self) -> &RgbImage {
        &self.pixels
    }

    /// Set one pixel; coordinates outside the frame are ignored.
    pub fn put_pixel(&mut self, x: u32, y: u32, color: Rgb<u8>) {
        if let Some(px) = self.pixels.get_pixel_mut_checked(x, y) {
            *px = color;
        }
    }

    /// Copy `chart` into the frame with its top-left corner at `(x, y)`.
    pub fn paste(&mut self, chart: &ChartImage, x: u32, y: u32) -> Result<(), DisplayError> {
        let fits_x = x.checked_add(chart.width()).is_some_and(|r| r <= self.width());
        let fits_y = y.checked_add(chart.height()).is_some_and(|b| b <= self.height());
        if !fits_x || !fits_y {
            return Err(DisplayError::PanelOutOfBounds {
                x,
                y,
                width: chart.width(),
                height: chart.height(),
                frame_width: self.width(),
                frame_height: self.height(),
            });
        }
        image::imageops::replace(&mut self.pixels, chart.as_rgb_image(), i64::from(x), i64::from(y));
        Ok(())
    }
}

/// Owns the display driver and the settings used for every publish.
pub struct DisplayPublisher<D> {
    driver: D,
    border: BorderColour,
}

impl<D: DisplayDriver> DisplayPublisher<D> {
    pub fn new(driver: D, border: BorderColour) -> Self {
        Self { driver, border }
    }

    /// Native resolution of the underlying display.
    pub fn resolution(&self) -> (u32, u32) {
        self.driver.resolution()
    }

    /// Paste each chart at its offset onto a blank frame of native size.
    pub fn compose<'a, I>(&self, charts: I) -> Result<DisplayFrame, DisplayError>
    where
        I: IntoIterator<Item = (&'a ChartImage, (u32, u32))>,
    {
        let (width, height) = self.resolution();
        let mut frame = DisplayFrame::blank(width, height);
        for (chart, (x, y)) in charts {
            frame.paste(chart, x, y)?;
        }
        Ok(frame)
    }

    /// Hand `frame` to the driver, set the border and refresh the panel.
    pub fn publish(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        self.driver.set_image(frame)?;
        self.driver.set_border(self.border)?;
        self.driver.show()?;
        tracing::info!(
            width = frame.width(),
            height = frame.height(),
            border = ?self.border,
            "🖼️ Display updated"
        );
        Ok(())
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }
}
