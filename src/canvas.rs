//! RGB raster drawing surface for the chart renderer.
//!
//! [`Canvas`] owns an [`image::RgbImage`] and implements embedded-graphics'
//! `DrawTarget`, so lines, rectangles and mono-font text draw straight into a
//! buffer that can later be pasted into a display frame or encoded as PNG.
//! Two things embedded-graphics does not provide are added here: alpha
//! blending for the translucent area fill, and [`Rotated`] for vertical text.

use core::convert::Infallible;
use embedded_graphics::{
    pixelcolor::{Rgb888, RgbColor},
    prelude::*,
    primitives::Rectangle,
};
use image::{Rgb, RgbImage};

/// Mutable drawing surface backed by an RGB image.
pub struct Canvas {
    pixels: RgbImage,
}

impl Canvas {
    /// A `width` x `height` canvas filled with `background`.
    pub fn new(width: u32, height: u32, background: Rgb888) -> Self {
        Self {
            pixels: RgbImage::from_pixel(width, height, to_rgb(background)),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Mix `color` over the existing pixel with opacity `alpha` (0.0..=1.0).
    pub fn blend_pixel(&mut self, x: i32, y: i32, color: Rgb888, alpha: f32) {
        if x < 0 || y < 0 {
            return;
        }
        let Some(px) = self.pixels.get_pixel_mut_checked(x as u32, y as u32) else {
            return;
        };
        let src = [color.r(), color.g(), color.b()];
        for (dst, src) in px.0.iter_mut().zip(src) {
            let mixed = f32::from(src) * alpha + f32::from(*dst) * (1.0 - alpha);
            *dst = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }

    /// Blend a vertical run of pixels from `y0` to `y1` inclusive.
    pub fn blend_vspan(&mut self, x: i32, y0: i32, y1: i32, color: Rgb888, alpha: f32) {
        let (top, bottom) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        for y in top..=bottom {
            self.blend_pixel(x, y, color, alpha);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgb888> {
        self.pixels
            .get_pixel_checked(x, y)
            .map(|p| Rgb888::new(p[0], p[1], p[2]))
    }

    pub fn into_image(self) -> RgbImage {
        self.pixels
    }
}

impl OriginDimensions for Canvas {
    fn size(&self) -> Size {
        Size::new(self.pixels.width(), self.pixels.height())
    }
}

impl DrawTarget for Canvas {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            if let Some(px) = self
                .pixels
                .get_pixel_mut_checked(point.x as u32, point.y as u32)
            {
                *px = to_rgb(color);
            }
        }
        Ok(())
    }
}

/// Draws into a parent target rotated 90° counter-clockwise about `origin`.
///
/// Text drawn at `(0, 0)` with a left alignment runs upward from `origin` in
/// the parent, which is how axis titles and tick labels are set vertically.
pub struct Rotated<'a, D> {
    parent: &'a mut D,
    origin: Point,
}

impl<'a, D> Rotated<'a, D> {
    pub fn new(parent: &'a mut D, origin: Point) -> Self {
        Self { parent, origin }
    }

    fn to_parent(&self, p: Point) -> Point {
        Point::new(self.origin.x + p.y, self.origin.y - p.x)
    }
}

impl<D: DrawTarget> Dimensions for Rotated<'_, D> {
    fn bounding_box(&self) -> Rectangle {
        let parent = self.parent.bounding_box();
        let w = parent.size.width as i32;
        let h = parent.size.height as i32;
        let top_left = Point::new(
            self.origin.y - (parent.top_left.y + h - 1),
            parent.top_left.x - self.origin.x,
        );
        Rectangle::new(top_left, Size::new(h as u32, w as u32))
    }
}

impl<D: DrawTarget> DrawTarget for Rotated<'_, D> {
    type Color = D::Color;
    type Error = D::Error;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        let mapped: Vec<Pixel<D::Color>> = pixels
            .into_iter()
            .map(|Pixel(p, c)| Pixel(self.to_parent(p), c))
            .collect();
        self.parent.draw_iter(mapped)
    }
}

fn to_rgb(color: Rgb888) -> Rgb<u8> {
    Rgb([color.r(), color.g(), color.b()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::primitives::{Line, PrimitiveStyle};

    #[test]
    fn draws_and_clips() {
        let mut canvas = Canvas::new(10, 10, Rgb888::WHITE);
        Line::new(Point::new(-5, 5), Point::new(20, 5))
            .into_styled(PrimitiveStyle::with_stroke(Rgb888::BLACK, 1))
            .draw(&mut canvas)
            .unwrap();
        assert_eq!(canvas.pixel(0, 5), Some(Rgb888::BLACK));
        assert_eq!(canvas.pixel(9, 5), Some(Rgb888::BLACK));
        assert_eq!(canvas.pixel(0, 4), Some(Rgb888::WHITE));
    }

    #[test]
    fn blending_mixes_toward_color() {
        let mut canvas = Canvas::new(2, 2, Rgb888::WHITE);
        canvas.blend_pixel(0, 0, Rgb888::new(0, 0, 255), 0.2);
        assert_eq!(canvas.pixel(0, 0), Some(Rgb888::new(204, 204, 255)));
        canvas.blend_pixel(-1, 0, Rgb888::BLACK, 1.0);
        canvas.blend_pixel(5, 5, Rgb888::BLACK, 1.0);
        assert_eq!(canvas.pixel(1, 1), Some(Rgb888::WHITE));
    }

    #[test]
    fn rotated_target_runs_upward() {
        let mut canvas = Canvas::new(20, 20, Rgb888::WHITE);
        {
            let mut rotated = Rotated::new(&mut canvas, Point::new(5, 15));
            Line::new(Point::new(0, 0), Point::new(4, 0))
                .into_styled(PrimitiveStyle::with_stroke(Rgb888::RED, 1))
                .draw(&mut rotated)
                .unwrap();
        }
        // A horizontal line in rotated space is vertical in the parent, going up
        for y in 11..=15 {
            assert_eq!(canvas.pixel(5, y), Some(Rgb888::RED));
        }
        assert_eq!(canvas.pixel(5, 10), Some(Rgb888::WHITE));
        assert_eq!(canvas.pixel(6, 15), Some(Rgb888::WHITE));
    }

    #[test]
    fn rotated_bounding_box_maps_back_to_parent() {
        let mut canvas = Canvas::new(30, 20, Rgb888::WHITE);
        let rotated = Rotated::new(&mut canvas, Point::new(5, 15));
        let bbox = rotated.bounding_box();
        assert_eq!(bbox.size, Size::new(20, 30));
        let corner = rotated.to_parent(bbox.top_left);
        assert_eq!(corner, Point::new(0, 19));
    }
}
