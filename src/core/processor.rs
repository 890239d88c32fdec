// pixmark/src/core/processor.rs
use super::{ExportConfig, ImageRef, Result, WatermarkSettings};
use crate::processors::{Compressor, FontLibrary, ImageResolver, Loader, SourceResolver, Watermarker};

/// Fetch, optionally watermark, encode: the work done for one image.
///
/// The pipeline owns the font library but not the watermark style; each job
/// builds its own [`Watermarker`] through [`ImagePipeline::watermarker`].
pub struct ImagePipeline {
    loader: Loader,
    compressor: Compressor,
    fonts: FontLibrary,
}

impl ImagePipeline {
    pub fn new(loader: Loader, compressor: Compressor, fonts: FontLibrary) -> Self {
        Self {
            loader,
            compressor,
            fonts,
        }
    }

    /// Pipeline with the default resolver and system fonts.
    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        let resolver = SourceResolver::new(config.fetch_timeout)?;
        Self::with_resolver(config, Box::new(resolver), FontLibrary::system())
    }

    pub fn with_resolver(
        config: &ExportConfig,
        resolver: Box<dyn ImageResolver>,
        fonts: FontLibrary,
    ) -> Result<Self> {
        config.validate()?;

        let loader = Loader::new(resolver).with_max_dimensions(config.max_dimensions);
        Ok(Self::new(loader, Compressor::new(config.jpeg_quality), fonts))
    }

    /// Watermarker for `settings`, or `None` when there is no text to draw.
    pub fn watermarker(&self, settings: Option<&WatermarkSettings>) -> Result<Option<Watermarker>> {
        match settings.filter(|s| s.has_text()) {
            Some(settings) => Ok(Some(Watermarker::from_library(settings.clone(), &self.fonts)?)),
            None => Ok(None),
        }
    }

    /// Bytes to store for `image`. Without a watermark these are the source bytes verbatim.
    pub fn render(&self, image: &ImageRef, watermarker: Option<&Watermarker>) -> Result<Vec<u8>> {
        let data = self.loader.fetch(image)?;

        match watermarker {
            Some(watermarker) => {
                let decoded = self.loader.decode(&data)?;
                watermarker.render(&decoded, &self.compressor)
            }
            None => Ok(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExportError;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;
    use std::time::Duration;

    fn pipeline() -> ImagePipeline {
        let resolver = SourceResolver::new(Duration::from_secs(1)).unwrap();
        ImagePipeline::with_resolver(
            &ExportConfig::default(),
            Box::new(resolver),
            FontLibrary::with_dirs(Vec::new()),
        )
        .unwrap()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 120, 120]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn passes_bytes_through_without_watermark() {
        let pipeline = pipeline();
        let data = b"not even an image".to_vec();
        assert!(pipeline.watermarker(None).unwrap().is_none());
        assert_eq!(pipeline.render(&ImageRef::Bytes(data.clone()), None).unwrap(), data);
    }

    #[test]
    fn empty_text_builds_no_watermarker() {
        let settings = WatermarkSettings::new("");
        assert!(pipeline().watermarker(Some(&settings)).unwrap().is_none());
    }

    #[test]
    fn watermarked_render_reencodes_as_jpeg() {
        let pipeline = pipeline();
        let marker = pipeline
            .watermarker(Some(&WatermarkSettings::new("MARK")))
            .unwrap();
        let source = png(40, 30);

        let out = pipeline
            .render(&ImageRef::Bytes(source.clone()), marker.as_ref())
            .unwrap();
        assert_ne!(out, source);
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Jpeg);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ExportConfig {
            threads: 0,
            ..Default::default()
        };
        let resolver = SourceResolver::new(Duration::from_secs(1)).unwrap();
        let result =
            ImagePipeline::with_resolver(&config, Box::new(resolver), FontLibrary::system());
        assert!(matches!(result, Err(ExportError::InvalidParameter(_))));
    }
}
