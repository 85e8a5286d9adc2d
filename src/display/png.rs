//! Display driver that writes each committed frame to a PNG file.
//!
//! Used on development machines and as the fallback when no panel is
//! attached. The file is written to a sibling temp path and renamed into
//! place so a viewer never sees a half-written image.

use super::{check_frame_size, BorderColour, DisplayDriver, DisplayError};
use crate::publisher::DisplayFrame;
use image::ImageFormat;
use std::path::{Path, PathBuf};

pub struct PngFileDisplay {
    path: PathBuf,
    width: u32,
    height: u32,
    border: BorderColour,
    staged: Option<DisplayFrame>,
}

impl PngFileDisplay {
    pub fn new<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            width,
            height,
            border: BorderColour::default(),
            staged: None,
        }
    }

    pub fn border(&self) -> BorderColour {
        self.border
    }
}

impl DisplayDriver for PngFileDisplay {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_image(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        check_frame_size(frame, self.width, self.height)?;
        self.staged = Some(frame.clone());
        Ok(())
    }

    /// PNG output has no border area; the colour is only remembered.
    fn set_border(&mut self, colour: BorderColour) -> Result<(), DisplayError> {
        self.border = colour;
        Ok(())
    }

    fn show(&mut self) -> Result<(), DisplayError> {
        let frame = self.staged.as_ref().ok_or(DisplayError::NoFrame)?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("png.tmp");
        frame.as_rgb_image().save_with_format(&tmp, ImageFormat::Png)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::info!(path = %self.path.display(), "💾 Frame written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    #[test]
    fn writes_committed_frame() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/frame.png");
        let mut display = PngFileDisplay::new(&path, 40, 30);

        let mut frame = DisplayFrame::blank(40, 30);
        frame.put_pixel(3, 4, Rgb([255, 0, 0]));
        display.set_image(&frame).unwrap();
        display.set_border(BorderColour::Red).unwrap();
        display.show().unwrap();

        let written = image::open(&path).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (40, 30));
        assert_eq!(written.get_pixel(3, 4), &Rgb([255, 0, 0]));
        assert_eq!(written.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(display.border(), BorderColour::Red);
        assert!(!path.with_extension("png.tmp").exists());
    }

    #[test]
    fn show_before_set_image_fails() {
        let dir = TempDir::new().unwrap();
        let mut display = PngFileDisplay::new(dir.path().join("frame.png"), 10, 10);
        assert!(matches!(display.show(), Err(DisplayError::NoFrame)));
    }

    #[test]
    fn rejects_wrong_size() {
        let mut display = PngFileDisplay::new("unused.png", 800, 480);
        let result = display.set_image(&DisplayFrame::blank(800, 240));
        assert!(matches!(result, Err(DisplayError::SizeMismatch { .. })));
    }
}
