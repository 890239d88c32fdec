// pixmark/src/processors/font.rs
//! Font lookup and text rasterization.
//!
//! `fontFamily` is resolved the way a browser resolves a CSS font list: each
//! comma separated entry is tried in order, generic families map to common
//! system fonts, and anything unknown falls back to `sans-serif`.

use crate::core::{ExportError, Result};
use ab_glyph::{point, Font, FontVec, GlyphId, PxScale, ScaleFont};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const SANS_SERIF: &[&str] = &[
    "dejavusans",
    "liberationsans",
    "arial",
    "helvetica",
    "notosans",
    "freesans",
    "roboto",
    "segoeui",
    "verdana",
];

const SERIF: &[&str] = &[
    "dejavuserif",
    "liberationserif",
    "timesnewroman",
    "times",
    "notoserif",
    "freeserif",
    "georgia",
];

const MONOSPACE: &[&str] = &[
    "dejavusansmono",
    "liberationmono",
    "couriernew",
    "notosansmono",
    "freemono",
    "consolas",
    "menlo",
];

const STYLE_SUFFIXES: &[&str] = &["", "regular", "book", "roman", "normal"];

const FONT_EXTENSIONS: &[&str] = &["ttf", "otf", "ttc"];

/// Face used when no system font is found.
const EMBEDDED_FONT_DATA: &[u8] = include_bytes!("fonts/DejaVuSansMono.ttf");

#[derive(Debug, Clone)]
pub struct FontLibrary {
    search_dirs: Vec<PathBuf>,
}

impl FontLibrary {
    /// Library searching the usual per-OS font directories.
    pub fn system() -> Self {
        let mut dirs = vec![
            PathBuf::from("/usr/share/fonts"),
            PathBuf::from("/usr/local/share/fonts"),
            PathBuf::from("/Library/Fonts"),
            PathBuf::from("/System/Library/Fonts"),
        ];

        if let Some(home) = std::env::var_os("HOME") {
            let home = PathBuf::from(home);
            dirs.push(home.join(".fonts"));
            dirs.push(home.join(".local/share/fonts"));
            dirs.push(home.join("Library/Fonts"));
        }

        if let Some(windir) = std::env::var_os("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }

        Self { search_dirs: dirs }
    }

    pub fn with_dirs(dirs: Vec<PathBuf>) -> Self {
        Self { search_dirs: dirs }
    }

    /// Loads the first available font of a CSS-style family list.
    pub fn load(&self, families: &str) -> Result<FontVec> {
        let files = self.font_files();

        for family in families.split(',').map(|f| f.trim().trim_matches(|c| c == '"' || c == '\'')) {
            if family.is_empty() {
                continue;
            }

            let path = Path::new(family);
            if path.is_file() {
                return load_font_file(path);
            }

            if let Some(found) = find_family(&files, family) {
                log::debug!("Resolved font family '{}' to {}", family, found.display());
                return load_font_file(&found);
            }

            log::debug!("Font family '{}' not found", family);
        }

        if let Some(found) = find_family(&files, "sans-serif") {
            log::warn!(
                "No font matched '{}', falling back to {}",
                families,
                found.display()
            );
            return load_font_file(&found);
        }

        log::warn!(
            "No font for '{}' in {} search directories, using the embedded face",
            families,
            self.search_dirs.len()
        );
        embedded_font()
    }

    fn font_files(&self) -> Vec<PathBuf> {
        self.search_dirs
            .iter()
            .filter(|dir| dir.is_dir())
            .flat_map(|dir| {
                WalkDir::new(dir)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .filter(|entry| {
                        entry
                            .path()
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .map(|ext| FONT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
                            .unwrap_or(false)
                    })
                    .map(|entry| entry.into_path())
            })
            .collect()
    }
}

impl Default for FontLibrary {
    fn default() -> Self {
        Self::system()
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

fn candidates(family: &str) -> Vec<String> {
    match family.to_lowercase().as_str() {
        "sans-serif" | "system-ui" => SANS_SERIF.iter().map(|s| s.to_string()).collect(),
        "serif" => SERIF.iter().map(|s| s.to_string()).collect(),
        "monospace" => MONOSPACE.iter().map(|s| s.to_string()).collect(),
        _ => vec![normalize(family)],
    }
}

fn find_family(files: &[PathBuf], family: &str) -> Option<PathBuf> {
    for candidate in candidates(family) {
        let found = files.iter().find(|path| {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(normalize)
                .unwrap_or_default();
            STYLE_SUFFIXES
                .iter()
                .any(|suffix| stem == format!("{}{}", candidate, suffix))
        });

        if let Some(path) = found {
            return Some(path.clone());
        }
    }
    None
}

pub fn embedded_font() -> Result<FontVec> {
    FontVec::try_from_vec(EMBEDDED_FONT_DATA.to_vec())
        .map_err(|e| ExportError::Font(format!("invalid embedded font: {}", e)))
}

pub fn load_font_file(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path)?;
    FontVec::try_from_vec_and_index(data, 0)
        .map_err(|e| ExportError::Font(format!("invalid font {}: {}", path.display(), e)))
}

/// Scale for a CSS pixel size, i.e. the em square is `font_size` pixels tall.
pub fn px_scale<F: Font>(font: &F, font_size: f32) -> PxScale {
    match font.units_per_em() {
        Some(units) if units > 0.0 => PxScale::from(font_size * font.height_unscaled() / units),
        _ => PxScale::from(font_size),
    }
}

/// Advance width of `text`, kerning included.
pub fn text_width<F: Font>(font: &F, text: &str, font_size: f32) -> f32 {
    let scaled = font.as_scaled(px_scale(font, font_size));
    let mut width = 0.0f32;
    let mut prev: Option<GlyphId> = None;

    for c in text.chars() {
        let id = scaled.glyph_id(c);
        if let Some(prev) = prev {
            width += scaled.kern(prev, id);
        }
        width += scaled.h_advance(id);
        prev = Some(id);
    }

    width
}

/// Anti-aliased coverage of a line of text, with a known centre point.
#[derive(Debug, Clone)]
pub struct TextMask {
    width: u32,
    height: u32,
    coverage: Vec<f32>,
    origin: (f32, f32),
}

impl TextMask {
    const PADDING: f32 = 2.0;

    /// Rasterizes `text` with its horizontal centre and vertical middle at `origin`.
    pub fn rasterize<F: Font>(font: &F, text: &str, font_size: f32) -> Self {
        let scale = px_scale(font, font_size);
        let scaled = font.as_scaled(scale);
        let text_w = text_width(font, text, font_size);
        let ascent = scaled.ascent();
        let descent = scaled.descent();

        let width = (text_w.ceil() + 2.0 * Self::PADDING).max(1.0) as u32;
        let height = ((ascent - descent).ceil() + 2.0 * Self::PADDING).max(1.0) as u32;
        let mut coverage = vec![0.0f32; (width * height) as usize];

        let baseline = Self::PADDING + ascent;
        let mut cursor = Self::PADDING;
        let mut prev: Option<GlyphId> = None;

        for c in text.chars() {
            let id = scaled.glyph_id(c);
            if let Some(prev) = prev {
                cursor += scaled.kern(prev, id);
            }

            let glyph = id.with_scale_and_position(scale, point(cursor, baseline));
            if let Some(outlined) = font.outline_glyph(glyph) {
                let bounds = outlined.px_bounds();
                outlined.draw(|px, py, cov| {
                    let x = px as i64 + bounds.min.x as i64;
                    let y = py as i64 + bounds.min.y as i64;
                    if x >= 0 && y >= 0 && x < i64::from(width) && y < i64::from(height) {
                        let idx = (y as u32 * width + x as u32) as usize;
                        coverage[idx] = (coverage[idx] + cov).min(1.0);
                    }
                });
            }

            cursor += scaled.h_advance(id);
            prev = Some(id);
        }

        Self {
            width,
            height,
            coverage,
            origin: (
                Self::PADDING + text_w / 2.0,
                Self::PADDING + (ascent - descent) / 2.0,
            ),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn origin(&self) -> (f32, f32) {
        self.origin
    }

    pub fn is_blank(&self) -> bool {
        self.coverage.iter().all(|c| *c <= 0.0)
    }

    fn at(&self, x: i64, y: i64) -> f32 {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return 0.0;
        }
        self.coverage[(y as u32 * self.width + x as u32) as usize]
    }

    /// Bilinear coverage at a continuous position; pixel centres sit at `i + 0.5`.
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let fx = x - 0.5;
        let fy = y - 0.5;
        let x0 = fx.floor();
        let y0 = fy.floor();
        let tx = fx - x0;
        let ty = fy - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self.at(x0, y0) * (1.0 - tx) + self.at(x0 + 1, y0) * tx;
        let bottom = self.at(x0, y0 + 1) * (1.0 - tx) + self.at(x0 + 1, y0 + 1) * tx;
        top * (1.0 - ty) + bottom * ty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_family_names() {
        assert_eq!(normalize("DejaVu Sans"), "dejavusans");
        assert_eq!(normalize("Liberation-Sans_Regular"), "liberationsansregular");
    }

    #[test]
    fn generic_families_expand() {
        assert_eq!(candidates("sans-serif")[0], "dejavusans");
        assert_eq!(candidates("monospace")[0], "dejavusansmono");
        assert_eq!(candidates("Open Sans"), vec!["opensans".to_string()]);
    }

    #[test]
    fn matches_font_files_by_stem() {
        let files = vec![
            PathBuf::from("/fonts/DejaVuSansMono.ttf"),
            PathBuf::from("/fonts/LiberationSans-Regular.ttf"),
            PathBuf::from("/fonts/DejaVuSans.ttf"),
        ];
        assert_eq!(
            find_family(&files, "sans-serif"),
            Some(PathBuf::from("/fonts/DejaVuSans.ttf"))
        );
        assert_eq!(
            find_family(&files, "Liberation Sans"),
            Some(PathBuf::from("/fonts/LiberationSans-Regular.ttf"))
        );
        assert_eq!(find_family(&files, "Comic Sans"), None);
    }

    #[test]
    fn empty_library_falls_back_to_embedded_font() {
        let temp = tempfile::tempdir().unwrap();
        let library = FontLibrary::with_dirs(vec![temp.path().to_path_buf()]);
        let font = library.load("sans-serif").unwrap();
        assert!(text_width(&font, "A", 16.0) > 0.0);
    }

    #[test]
    fn unreadable_font_file_is_font_error() {
        let temp = tempfile::tempdir().unwrap();
        let bogus = temp.path().join("Broken.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();
        let library = FontLibrary::with_dirs(Vec::new());
        assert!(matches!(
            library.load(bogus.to_str().unwrap()),
            Err(ExportError::Font(_))
        ));
    }

    #[test]
    fn rasterized_text_has_coverage_around_origin() {
        let font = embedded_font().unwrap();

        let mask = TextMask::rasterize(&font, "Hello", 20.0);
        assert!(!mask.is_blank());
        let width = text_width(&font, "Hello", 20.0);
        assert!(width > 0.0);
        assert!((mask.origin().0 - (2.0 + width / 2.0)).abs() < 1e-3);
        assert!(mask.sample(-10.0, -10.0) == 0.0);
        assert!(text_width(&font, "Hello", 40.0) > width);
    }
}
