//! ASCII preview driver for development without a panel.
//!
//! The frame is downsampled to a character grid, each cell showing the ink
//! that dominates the pixels under it: `#` for black, `*` for red and blank
//! for white. Terminal cells are roughly twice as tall as wide, so each cell
//! covers twice as many pixel rows as columns.

use super::epd::{quantize, Ink};
use super::{check_frame_size, BorderColour, DisplayDriver, DisplayError};
use crate::publisher::DisplayFrame;
use std::io::{Stdout, Write};

const DEFAULT_COLUMNS: u32 = 100;

pub struct TerminalDisplay<W> {
    out: W,
    width: u32,
    height: u32,
    columns: u32,
    border: BorderColour,
    staged: Option<DisplayFrame>,
}

impl TerminalDisplay<Stdout> {
    pub fn stdout(width: u32, height: u32) -> Self {
        Self::new(std::io::stdout(), width, height)
    }
}

impl<W: Write> TerminalDisplay<W> {
    pub fn new(out: W, width: u32, height: u32) -> Self {
        Self {
            out,
            width,
            height,
            columns: DEFAULT_COLUMNS.min(width.max(1)),
            border: BorderColour::default(),
            staged: None,
        }
    }

    /// Preview width in characters.
    pub fn with_columns(mut self, columns: u32) -> Self {
        self.columns = columns.clamp(1, self.width.max(1));
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn border_char(&self) -> char {
        match self.border {
            BorderColour::White => '·',
            BorderColour::Black => '#',
            BorderColour::Red => '*',
        }
    }
}

/// Render `frame` as rows of characters, `columns` wide.
pub fn ascii_rows(frame: &DisplayFrame, columns: u32) -> Vec<String> {
    let image = frame.as_rgb_image();
    let cell_w = frame.width().div_ceil(columns.max(1)).max(1);
    let cell_h = cell_w * 2;
    let cols = frame.width().div_ceil(cell_w);
    let rows = frame.height().div_ceil(cell_h);

    (0..rows)
        .map(|row| {
            (0..cols)
                .map(|col| {
                    let (mut black, mut red) = (0u32, 0u32);
                    for y in row * cell_h..((row + 1) * cell_h).min(frame.height()) {
                        for x in col * cell_w..((col + 1) * cell_w).min(frame.width()) {
                            match quantize(image.get_pixel(x, y)) {
                                Ink::Black => black += 1,
                                Ink::Red => red += 1,
                                Ink::White => {}
                            }
                        }
                    }
                    if red > 0 && red >= black {
                        '*'
                    } else if black > 0 {
                        '#'
                    } else {
                        ' '
                    }
                })
                .collect()
        })
        .collect()
}

impl<W: Write> DisplayDriver for TerminalDisplay<W> {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_image(&mut self, frame: &DisplayFrame) -> Result<(), DisplayError> {
        check_frame_size(frame, self.width, self.height)?;
        self.staged = Some(frame.clone());
        Ok(())
    }

    fn set_border(&mut self, colour: BorderColour) -> Result<(), DisplayError> {
        self.border = colour;
        Ok(())
    }

    fn show(&mut self) -> Result<(), DisplayError> {
        let frame = self.staged.as_ref().ok_or(DisplayError::NoFrame)?;
        let rows = ascii_rows(frame, self.columns);
        let edge = self.border_char();
        let width = rows.first().map_or(0, |r| r.chars().count());
        let rule: String = std::iter::repeat(edge).take(width + 2).collect();

        writeln!(self.out, "{rule}")?;
        for row in &rows {
            writeln!(self.out, "{edge}{row}{edge}")?;
        }
        writeln!(self.out, "{rule}")?;
        self.out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn blank_frame_is_blank_inside_border() {
        let mut display = TerminalDisplay::new(Vec::new(), 40, 20).with_columns(20);
        display.set_image(&DisplayFrame::blank(40, 20)).unwrap();
        display.set_border(BorderColour::Black).unwrap();
        display.show().unwrap();

        let text = String::from_utf8(display.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        // 40x20 at 2px cells: 20 columns, 5 rows, plus top and bottom rule
        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "#".repeat(22));
        assert_eq!(lines[1], format!("#{}#", " ".repeat(20)));
    }

    #[test]
    fn inks_map_to_characters() {
        let mut frame = DisplayFrame::blank(4, 4);
        frame.put_pixel(0, 0, Rgb([0, 0, 0]));
        frame.put_pixel(3, 3, Rgb([255, 0, 0]));
        let rows = ascii_rows(&frame, 4);
        assert_eq!(rows, vec!["#   ".to_string(), "   *".to_string()]);
    }

    #[test]
    fn show_before_set_image_fails() {
        let mut display = TerminalDisplay::new(Vec::new(), 10, 10);
        assert!(matches!(display.show(), Err(DisplayError::NoFrame)));
    }
}
