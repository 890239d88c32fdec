// pixmark/src/processors/loader.rs
use crate::core::{ExportError, ImageRef, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, GenericImageView, ImageReader};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Turns an image reference into encoded bytes.
pub trait ImageResolver: Send + Sync {
    fn resolve(&self, image: &ImageRef) -> Result<Vec<u8>>;
}

/// Resolves URLs over HTTP(S), `data:` URIs, local paths and resident bytes.
pub struct SourceResolver {
    http: reqwest::blocking::Client,
    base_dir: Option<PathBuf>,
}

impl SourceResolver {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ExportError::InvalidParameter(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_dir: None,
        })
    }

    /// Relative paths are resolved against `dir` instead of the working directory.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        log::debug!("Fetching {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(|e| {
                if e.is_timeout() {
                    ExportError::Fetch(format!("Timed out fetching {}", url))
                } else {
                    ExportError::Fetch(format!("Failed to fetch {}: {}", url, e))
                }
            })?;

        let bytes = response
            .bytes()
            .map_err(|e| ExportError::Fetch(format!("Failed to read body of {}: {}", url, e)))?;

        Ok(bytes.to_vec())
    }

    fn read_path(&self, path: &Path) -> Result<Vec<u8>> {
        let path = match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        };

        let data = std::fs::read(&path)
            .map_err(|e| ExportError::Fetch(format!("Failed to read {}: {}", path.display(), e)))?;

        if data.is_empty() {
            return Err(ExportError::Fetch(format!("File is empty: {}", path.display())));
        }

        Ok(data)
    }
}

impl ImageResolver for SourceResolver {
    fn resolve(&self, image: &ImageRef) -> Result<Vec<u8>> {
        match image {
            ImageRef::Url(url) => self.fetch_url(url),
            ImageRef::DataUri(uri) => decode_data_uri(uri),
            ImageRef::Path(path) => self.read_path(path),
            ImageRef::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Payload of a `data:[<mediatype>][;base64],<data>` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>> {
    let rest = uri
        .get(..5)
        .filter(|scheme| scheme.eq_ignore_ascii_case("data:"))
        .map(|_| &uri[5..])
        .ok_or_else(|| ExportError::Fetch("Not a data URI".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| ExportError::Fetch("Malformed data URI: missing ','".to_string()))?;

    if header.to_ascii_lowercase().ends_with(";base64") {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact)
            .map_err(|e| ExportError::Fetch(format!("Invalid base64 in data URI: {}", e)))
    } else {
        Ok(payload.as_bytes().to_vec())
    }
}

pub struct Loader {
    resolver: Box<dyn ImageResolver>,
    max_dimensions: Option<(u32, u32)>,
}

impl Loader {
    pub fn new(resolver: Box<dyn ImageResolver>) -> Self {
        Self {
            resolver,
            max_dimensions: Some((100_000, 100_000)),
        }
    }

    pub fn with_max_dimensions(mut self, limit: Option<(u32, u32)>) -> Self {
        self.max_dimensions = limit;
        self
    }

    pub fn fetch(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let data = self.resolver.resolve(image)?;
        log::debug!("Fetched {} ({} bytes)", image.describe(), data.len());
        Ok(data)
    }

    pub fn decode(&self, data: &[u8]) -> Result<DynamicImage> {
        let image = ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| ExportError::Decode(format!("Failed to read image header: {}", e)))?
            .decode()
            .map_err(|e| ExportError::Decode(format!("Failed to decode image: {}", e)))?;

        let (width, height) = image.dimensions();
        if let Some((max_w, max_h)) = self.max_dimensions {
            if width > max_w || height > max_h {
                return Err(ExportError::Decode(format!(
                    "Image dimensions {}x{} exceed maximum {}x{}",
                    width, height, max_w, max_h
                )));
            }
        }

        log::debug!(
            "Decoded image: {}x{} pixels, format: {:?}",
            width,
            height,
            image.color()
        );

        Ok(image)
    }

    pub fn load(&self, image: &ImageRef) -> Result<DynamicImage> {
        let data = self.fetch(image)?;
        self.decode(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([9, 9, 9])));
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    fn loader() -> Loader {
        Loader::new(Box::new(SourceResolver::new(Duration::from_secs(5)).unwrap()))
    }

    #[test]
    fn decodes_base64_data_uri() {
        assert_eq!(decode_data_uri("data:text/plain;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_data_uri("DATA:,plain").unwrap(), b"plain");
        assert!(decode_data_uri("data:image/png;base64").is_err());
        assert!(decode_data_uri("data:;base64,@@@").is_err());
        assert!(decode_data_uri("http://x").is_err());
    }

    #[test]
    fn loads_resident_bytes_without_network() {
        let image = loader().load(&ImageRef::Bytes(png_bytes())).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
    }

    #[test]
    fn loads_data_uri_image() {
        let uri = format!("data:image/png;base64,{}", STANDARD.encode(png_bytes()));
        let image = loader().load(&ImageRef::DataUri(uri)).unwrap();
        assert_eq!(image.dimensions(), (4, 3));
    }

    #[test]
    fn reads_relative_paths_from_base_dir() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("a.png"), png_bytes()).unwrap();
        let resolver = SourceResolver::new(Duration::from_secs(5))
            .unwrap()
            .with_base_dir(temp.path());
        let loader = Loader::new(Box::new(resolver));

        assert!(loader.load(&ImageRef::Path("a.png".into())).is_ok());
        assert!(matches!(
            loader.fetch(&ImageRef::Path("missing.png".into())),
            Err(ExportError::Fetch(_))
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(
            loader().load(&ImageRef::Bytes(b"not an image".to_vec())),
            Err(ExportError::Decode(_))
        ));
    }

    #[test]
    fn enforces_max_dimensions() {
        let loader = loader().with_max_dimensions(Some((2, 2)));
        assert!(matches!(
            loader.decode(&png_bytes()),
            Err(ExportError::Decode(_))
        ));
    }

    #[test]
    fn unreachable_url_is_a_fetch_error() {
        let resolver = SourceResolver::new(Duration::from_millis(500)).unwrap();
        let result = resolver.resolve(&ImageRef::Url("http://127.0.0.1:9/none.jpg".into()));
        assert!(matches!(result, Err(ExportError::Fetch(_))));
    }
}
