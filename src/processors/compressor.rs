// pixmark/src/processors/compressor.rs
use crate::core::{ExportError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

/// Encodes composited surfaces back to bytes.
pub struct Compressor {
    quality: u8,
}

impl Compressor {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// JPEG has no alpha channel; the surface is flattened to RGB first.
    pub fn encode_jpeg(&self, image: &DynamicImage) -> Result<Vec<u8>> {
        log::debug!(
            "Encoding {}x{} image as JPEG, quality: {}",
            image.width(),
            image.height(),
            self.quality
        );

        let rgb = image.to_rgb8();
        let mut buffer = Vec::new();
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| ExportError::Encode(format!("JPEG encoding failed: {}", e)))?;
        }
        Ok(buffer)
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(95)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, ImageFormat, Rgba, RgbaImage};

    #[test]
    fn jpeg_keeps_dimensions() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(37, 21, Rgba([10, 20, 30, 255])));
        let bytes = Compressor::default().encode_jpeg(&image).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (37, 21));
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(Compressor::new(0).quality(), 1);
        assert_eq!(Compressor::new(200).quality(), 100);
    }
}
