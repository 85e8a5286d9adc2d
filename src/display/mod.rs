//! # Display Drivers
//!
//! The publisher talks to any output through [`DisplayDriver`]: accept a
//! frame, set the border colour, then commit with `show()`. Three drivers
//! ship with the crate:
//!
//! - [`epd::EpdDisplay`]: SSD16xx-family tri-colour e-paper panel over
//!   `embedded-hal` SPI/GPIO (wired up for Linux in [`hardware`] with the
//!   `hardware` feature)
//! - [`png::PngFileDisplay`]: writes each committed frame to a PNG file
//! - [`terminal::TerminalDisplay`]: ASCII preview for development
//!
//! [`auto_detect`] picks one from the configuration at startup.

use crate::config::{DisplayConfig, DriverKind};
use crate::publisher::DisplayFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod epd;
#[cfg(all(target_os = "linux", feature = "hardware"))]
pub mod hardware;
pub mod png;
pub mod terminal;

/// Errors from composing frames or driving a display.
#[derive(Error, Debug)]
pub enum DisplayError {
    /// No usable display was found
    #[error("display not found: {0}")]
    NotFound(String),

    /// Frame does not match the panel's native resolution
    #[error("frame is {frame_width}x{frame_height} but display is {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    /// A chart does not fit on the frame at its offset
    #[error("{width}x{height} chart at ({x}, {y}) does not fit a {frame_width}x{frame_height} frame")]
    PanelOutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    /// `show()` was called before any frame was set
    #[error("no frame to show")]
    NoFrame,

    /// Panel stayed busy past the timeout
    #[error("display busy for more than {0} ms")]
    Timeout(u32),

    /// Bus or pin level failure inside a driver
    #[error("display driver error: {0}")]
    Driver(String),

    /// File output failed
    #[error("display IO: {0}")]
    Io(#[from] std::io::Error),

    /// PNG encoding failed
    #[error("image encoding: {0}")]
    Encode(#[from] image::ImageError),
}

/// Colour of the panel's border area outside the active pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BorderColour {
    #[default]
    White,
    Black,
    Red,
}

/// Minimal display capability the publisher needs.
pub trait DisplayDriver {
    /// Native `(width, height)` in pixels.
    fn resolution(&self) -> (u32, u32);

    /// Stage a frame for the next `show()`.
    fn set_image(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError>;

    fn set_border(&mut self, colour: BorderColour) -> Result<(), DisplayError>;

    /// Push the staged frame to the physical display.
    fn show(&mut self) -> Result<(), DisplayError>;
}

impl<D: DisplayDriver + ?Sized> DisplayDriver for Box<D> {
    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }

    fn set_image(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        (**self).set_image(frame)
    }

    fn set_border(&mut self, colour: BorderColour) -> Result<(), DisplayError> {
        (**self).set_border(colour)
    }

    fn show(&mut self) -> Result<(), DisplayError> {
        (**self).show()
    }
}

/// Reject frames that are not exactly `width` x `height`.
pub fn check_frame_size(frame: &DisplayFrame, width: u32, height: u32) -> Result<(), DisplayError> {
    if frame.width() != width || frame.height() != height {
        return Err(DisplayError::SizeMismatch {
            width,
            height,
            frame_width: frame.width(),
            frame_height: frame.height(),
        });
    }
    Ok(())
}

/// Pick and initialise the display driver named by `config`.
///
/// `auto` prefers the e-paper panel when this build has hardware support and
/// the SPI device node exists, and otherwise writes PNG files.
pub fn auto_detect(config: &DisplayConfig) -> Result<Box<dyn DisplayDriver>, DisplayError> {
    let kind = match config.driver {
        DriverKind::Auto if hardware_present(config) => DriverKind::Epd,
        DriverKind::Auto => DriverKind::Png,
        other => other,
    };
    tracing::info!(driver = ?kind, width = config.width, height = config.height, "🔍 Display selected");

    match kind {
        DriverKind::Epd => open_epd(config),
        DriverKind::Terminal => Ok(Box::new(terminal::TerminalDisplay::stdout(
            config.width,
            config.height,
        ))),
        DriverKind::Png | DriverKind::Auto => Ok(Box::new(png::PngFileDisplay::new(
            &config.output_path,
            config.width,
            config.height,
        ))),
    }
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
fn hardware_present(config: &DisplayConfig) -> bool {
    config.hardware.spi_device.exists() && config.hardware.gpio_chip.exists()
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
fn hardware_present(_config: &DisplayConfig) -> bool {
    false
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
fn open_epd(config: &DisplayConfig) -> Result<Box<dyn DisplayDriver>, DisplayError> {
    Ok(Box::new(hardware::open(config)?))
}

#[cfg(not(all(target_os = "linux", feature = "hardware")))]
fn open_epd(_config: &DisplayConfig) -> Result<Box<dyn DisplayDriver>, DisplayError> {
    Err(DisplayError::NotFound(
        "e-paper support not enabled; rebuild with --features hardware".to_string(),
    ))
}
