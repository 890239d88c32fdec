// pixmark/src/processors/watermark.rs
//! Text watermark compositing.
//!
//! The source image is copied onto an RGBA working surface of the same size,
//! the text is rasterized once into a coverage mask, and the mask is blended
//! at one anchor (single mode) or at every cell of a grid (tile mode). Each
//! placement is rotated about its own anchor, so rotations never compose.
//! Pixels the glyphs do not cover are left untouched.

use super::analyzer::analyze_color;
use super::compressor::Compressor;
use super::font::{text_width, FontLibrary, TextMask};
use crate::core::{
    Color, Result, WatermarkMode, WatermarkPosition, WatermarkSettings, FONT_REFERENCE_WIDTH,
};
use ab_glyph::FontVec;
use image::{DynamicImage, Rgba, RgbaImage};

/// Font size for an image `image_width` pixels wide.
pub fn effective_font_size(font_size_base: f32, image_width: u32) -> f32 {
    font_size_base * image_width as f32 / FONT_REFERENCE_WIDTH
}

pub fn single_anchor(
    position: WatermarkPosition,
    width: u32,
    height: u32,
    font_size: f32,
) -> (f32, f32) {
    let (w, h) = (width as f32, height as f32);
    match position {
        WatermarkPosition::Center => (w / 2.0, h / 2.0),
        WatermarkPosition::TopLeft => (2.0 * font_size, font_size),
        WatermarkPosition::TopRight => (w - 2.0 * font_size, font_size),
        WatermarkPosition::BottomLeft => (2.0 * font_size, h - font_size),
        WatermarkPosition::BottomRight => (w - 2.0 * font_size, h - font_size),
    }
}

/// Grid of anchors, `text_width + font_size` apart, starting at `(2·size, size)`.
pub fn tile_anchors(width: u32, height: u32, font_size: f32, text_width: f32) -> Vec<(f32, f32)> {
    let gap = text_width + font_size;
    if !(font_size > 0.0) || !(gap > 0.0) {
        return Vec::new();
    }

    let (w, h) = (width as f32, height as f32);
    let mut anchors = Vec::new();

    let mut y = font_size;
    while y < h {
        let mut x = 2.0 * font_size;
        while x < w {
            anchors.push((x, y));
            x += gap;
        }
        y += gap;
    }

    anchors
}

/// Explicit color unless smart mode is on or none was given; then the analyzer decides.
pub fn resolve_color(settings: &WatermarkSettings, image: &DynamicImage) -> Result<Color> {
    match settings.explicit_color()? {
        Some(color) => Ok(color),
        None => Ok(analyze_color(image)),
    }
}

/// Porter-Duff "over" of a solid color with coverage alpha `alpha`.
fn blend_pixel(background: Rgba<u8>, color: Color, alpha: f32) -> Rgba<u8> {
    let fg_alpha = alpha.clamp(0.0, 1.0);
    let bg_alpha = background[3] as f32 / 255.0;
    let out_alpha = fg_alpha + bg_alpha * (1.0 - fg_alpha);

    if out_alpha < 0.001 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |fg: u8, bg: u8| -> u8 {
        let fg = fg as f32 / 255.0;
        let bg = bg as f32 / 255.0;
        let result = (fg * fg_alpha + bg * bg_alpha * (1.0 - fg_alpha)) / out_alpha;
        (result * 255.0).round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        channel(color.r, background[0]),
        channel(color.g, background[1]),
        channel(color.b, background[2]),
        (out_alpha * 255.0).round() as u8,
    ])
}

/// Blends `mask` centred on `anchor`, rotated by `radians` about that anchor.
fn draw_mask(
    target: &mut RgbaImage,
    mask: &TextMask,
    anchor: (f32, f32),
    radians: f32,
    color: Color,
    alpha: f32,
) {
    let (sin, cos) = radians.sin_cos();
    let (ox, oy) = mask.origin();
    let (mw, mh) = (mask.width() as f32, mask.height() as f32);

    let corners = [(-ox, -oy), (mw - ox, -oy), (-ox, mh - oy), (mw - ox, mh - oy)];
    let mut min = (f32::INFINITY, f32::INFINITY);
    let mut max = (f32::NEG_INFINITY, f32::NEG_INFINITY);
    for (x, y) in corners {
        let rx = x * cos - y * sin + anchor.0;
        let ry = x * sin + y * cos + anchor.1;
        min = (min.0.min(rx), min.1.min(ry));
        max = (max.0.max(rx), max.1.max(ry));
    }

    let x_start = min.0.floor().max(0.0) as u32;
    let y_start = min.1.floor().max(0.0) as u32;
    let x_end = (max.0.ceil().max(0.0) as u32).min(target.width());
    let y_end = (max.1.ceil().max(0.0) as u32).min(target.height());

    for py in y_start..y_end {
        for px in x_start..x_end {
            let dx = px as f32 + 0.5 - anchor.0;
            let dy = py as f32 + 0.5 - anchor.1;
            let lx = dx * cos + dy * sin;
            let ly = -dx * sin + dy * cos;

            let coverage = mask.sample(lx + ox, ly + oy);
            if coverage <= 0.0 {
                continue;
            }

            let pixel = target.get_pixel_mut(px, py);
            *pixel = blend_pixel(*pixel, color, coverage * alpha);
        }
    }
}

pub struct Watermarker {
    settings: WatermarkSettings,
    font: FontVec,
}

impl Watermarker {
    pub fn new(settings: WatermarkSettings, font: FontVec) -> Result<Self> {
        settings.validate()?;
        Ok(Self { settings, font })
    }

    pub fn from_library(settings: WatermarkSettings, library: &FontLibrary) -> Result<Self> {
        settings.validate()?;
        let font = library.load(&settings.font_family)?;
        Ok(Self { settings, font })
    }

    pub fn text_width(&self, font_size: f32) -> f32 {
        text_width(&self.font, &self.settings.text, font_size)
    }

    /// Anchor points for an image of the given size.
    pub fn anchors(&self, width: u32, height: u32) -> Vec<(f32, f32)> {
        let font_size = effective_font_size(self.settings.font_size_base, width);
        match self.settings.mode {
            WatermarkMode::Single => vec![single_anchor(
                self.settings.position,
                width,
                height,
                font_size,
            )],
            WatermarkMode::Tile => tile_anchors(width, height, font_size, self.text_width(font_size)),
        }
    }

    /// Composites the watermark onto a same-sized copy of `image`.
    pub fn apply(&self, image: &DynamicImage, color: Color) -> RgbaImage {
        let mut canvas = image.to_rgba8();
        let (width, height) = canvas.dimensions();
        let font_size = effective_font_size(self.settings.font_size_base, width);

        if width == 0 || height == 0 || !(font_size > 0.0) || !self.settings.has_text() {
            return canvas;
        }

        let mask = TextMask::rasterize(&self.font, &self.settings.text, font_size);
        if mask.is_blank() {
            return canvas;
        }
        let radians = self.settings.rotation_degrees.to_radians();
        let alpha = self.settings.alpha();
        let anchors = self.anchors(width, height);

        log::debug!(
            "Drawing {} watermark cell(s) on {}x{} image, font size {:.1}px, color {}",
            anchors.len(),
            width,
            height,
            font_size,
            color
        );

        for anchor in anchors {
            draw_mask(&mut canvas, &mask, anchor, radians, color, alpha);
        }

        canvas
    }

    /// Resolves the color, composites and encodes as high quality JPEG.
    pub fn render(&self, image: &DynamicImage, compressor: &Compressor) -> Result<Vec<u8>> {
        let color = resolve_color(&self.settings, image)?;
        let canvas = self.apply(image, color);
        compressor.encode_jpeg(&DynamicImage::ImageRgba8(canvas))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::font::embedded_font;
    use image::{Rgb, RgbImage};

    fn font() -> FontVec {
        embedded_font().unwrap()
    }

    fn gray(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
    }

    #[test]
    fn font_size_scales_with_width() {
        assert_eq!(effective_font_size(20.0, 300), 20.0);
        assert_eq!(effective_font_size(20.0, 600), 40.0);
        assert_eq!(effective_font_size(30.0, 150), 15.0);
    }

    #[test]
    fn single_mode_anchors() {
        let size = effective_font_size(20.0, 300);
        assert_eq!(single_anchor(WatermarkPosition::TopLeft, 300, 300, size), (40.0, 20.0));
        assert_eq!(
            single_anchor(WatermarkPosition::BottomRight, 300, 300, size),
            (260.0, 280.0)
        );
        assert_eq!(single_anchor(WatermarkPosition::TopRight, 300, 300, size), (260.0, 20.0));
        assert_eq!(
            single_anchor(WatermarkPosition::BottomLeft, 300, 300, size),
            (40.0, 280.0)
        );
        assert_eq!(single_anchor(WatermarkPosition::Center, 300, 200, size), (150.0, 100.0));
    }

    #[test]
    fn tile_rows_step_by_gap() {
        // gap = 40 + 20 = 60
        let anchors = tile_anchors(100, 100, 20.0, 40.0);
        let rows: Vec<f32> = anchors.iter().map(|(_, y)| *y).collect();
        assert_eq!(rows, vec![20.0, 80.0]);
        assert!(anchors.iter().all(|(x, _)| *x == 40.0));
    }

    #[test]
    fn tile_grid_covers_width() {
        let anchors = tile_anchors(300, 50, 10.0, 50.0);
        let xs: Vec<f32> = anchors.iter().map(|(x, _)| *x).collect();
        assert_eq!(xs, vec![20.0, 80.0, 140.0, 200.0, 260.0]);
        assert!(anchors.iter().all(|(_, y)| *y == 10.0));
    }

    #[test]
    fn tile_with_degenerate_size_is_empty() {
        assert!(tile_anchors(100, 100, 0.0, 40.0).is_empty());
    }

    #[test]
    fn smart_mode_on_black_image_resolves_white() {
        let mut settings = WatermarkSettings::new("MARK");
        settings.color = Some("#000000".to_string());
        settings.is_smart_mode = true;
        assert_eq!(resolve_color(&settings, &gray(8, 8, 0)).unwrap(), Color::white());
    }

    #[test]
    fn explicit_color_wins_outside_smart_mode() {
        let mut settings = WatermarkSettings::new("MARK");
        settings.color = Some("#ff0000".to_string());
        assert_eq!(
            resolve_color(&settings, &gray(8, 8, 0)).unwrap(),
            Color::new(255, 0, 0)
        );

        settings.color = None;
        assert_eq!(resolve_color(&settings, &gray(8, 8, 250)).unwrap(), Color::black());
    }

    #[test]
    fn blend_respects_alpha() {
        let bg = Rgba([0, 0, 0, 255]);
        assert_eq!(blend_pixel(bg, Color::white(), 1.0), Rgba([255, 255, 255, 255]));
        assert_eq!(blend_pixel(bg, Color::white(), 0.0), bg);
        let half = blend_pixel(bg, Color::white(), 0.5);
        assert!((127..=128).contains(&half[0]));
        assert_eq!(half[3], 255);
    }

    #[test]
    fn output_dimensions_match_input_in_both_modes() {
        let image = gray(320, 200, 40);

        for mode in [WatermarkMode::Single, WatermarkMode::Tile] {
            let font = font();
            let mut settings = WatermarkSettings::new("SAMPLE");
            settings.mode = mode;
            settings.rotation_degrees = -30.0;
            settings.opacity_percent = 60;
            let marker = Watermarker::new(settings, font).unwrap();
            let out = marker.apply(&image, Color::white());
            assert_eq!(out.dimensions(), (320, 200));
        }
    }

    #[test]
    fn single_mode_leaves_far_pixels_untouched() {
        let font = font();
        let image = gray(300, 300, 40);

        let mut settings = WatermarkSettings::new("SAMPLE");
        settings.position = WatermarkPosition::TopLeft;
        settings.opacity_percent = 100;
        let marker = Watermarker::new(settings, font).unwrap();
        let out = marker.apply(&image, Color::white());

        let original = image.to_rgba8();
        assert_eq!(out.get_pixel(299, 299), original.get_pixel(299, 299));
        assert_eq!(out.get_pixel(150, 200), original.get_pixel(150, 200));
        let changed = out
            .pixels()
            .zip(original.pixels())
            .filter(|(a, b)| a != b)
            .count();
        assert!(changed > 0);
        // every touched pixel is brighter, never darker, with a white watermark
        assert!(out.pixels().zip(original.pixels()).all(|(a, b)| a[0] >= b[0]));
    }

    #[test]
    fn tile_mode_marks_more_than_single() {
        let image = gray(600, 400, 200);
        let original = image.to_rgba8();

        let changed = |mode| {
            let font = font();
            let mut settings = WatermarkSettings::new("AB");
            settings.mode = mode;
            settings.opacity_percent = 80;
            let marker = Watermarker::new(settings, font).unwrap();
            let out = marker.apply(&image, Color::black());
            out.pixels().zip(original.pixels()).filter(|(a, b)| a != b).count()
        };

        assert!(changed(WatermarkMode::Tile) > changed(WatermarkMode::Single));
    }

    #[test]
    fn render_produces_jpeg_of_same_size() {
        let font = font();
        let image = gray(120, 80, 220);
        let marker = Watermarker::new(WatermarkSettings::new("MARK"), font).unwrap();

        let bytes = marker.render(&image, &Compressor::default()).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (120, 80));
    }
}
