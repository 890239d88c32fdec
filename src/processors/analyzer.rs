// pixmark/src/processors/analyzer.rs
use crate::core::Color;
use image::DynamicImage;

/// Mid-gray (128) in thousandths; an average strictly above it is "light".
const THRESHOLD_MILLIS: u64 = 128_000;

/// Luminance weights scaled by 1000 so the threshold decision is exact.
const WEIGHTS: [u64; 3] = [299, 587, 114];

/// Sum of `1000 * luminance` over all pixels, plus the pixel count.
fn luminance_sum(image: &DynamicImage) -> (u64, u64) {
    let rgb = image.to_rgb8();
    let pixel_count = u64::from(rgb.width()) * u64::from(rgb.height());
    let total: u64 = rgb
        .pixels()
        .map(|p| {
            WEIGHTS[0] * u64::from(p[0]) + WEIGHTS[1] * u64::from(p[1]) + WEIGHTS[2] * u64::from(p[2])
        })
        .sum();
    (total, pixel_count)
}

/// Mean perceptual luminance (`0.299R + 0.587G + 0.114B`) over every pixel.
pub fn average_luminance(image: &DynamicImage) -> f64 {
    let (total, pixel_count) = luminance_sum(image);
    if pixel_count == 0 {
        return 0.0;
    }
    total as f64 / 1000.0 / pixel_count as f64
}

/// Black on light images, white otherwise.
pub fn analyze_color(image: &DynamicImage) -> Color {
    let (total, pixel_count) = luminance_sum(image);
    if pixel_count > 0 && total > THRESHOLD_MILLIS * pixel_count {
        Color::black()
    } else {
        Color::white()
    }
}
