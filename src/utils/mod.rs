// pixmark/src/utils/mod.rs
use crate::core::Locale;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const IMAGES_DIR: &str = "images";

pub fn generate_output_path(input_path: &Path, output: Option<&Path>, suffix: &str) -> PathBuf {
    match output {
        Some(path) => path.to_path_buf(),
        None => {
            let stem = input_path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("image");

            let timestamp = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);

            let mut candidate = input_path.with_file_name(format!("{}_{}_{}.jpg", stem, suffix, timestamp));
            let mut counter = 1;

            // Ensure we don't overwrite existing files
            while candidate.exists() {
                candidate = input_path
                    .with_file_name(format!("{}_{}_{}_{}.jpg", stem, suffix, timestamp, counter));
                counter += 1;
            }

            candidate
        }
    }
}

pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let base = 1024_f64;
    let bytes_f64 = bytes as f64;
    let exponent = ((bytes_f64.log10() / base.log10()).floor() as usize).min(UNITS.len() - 1);
    let size = bytes_f64 / base.powi(exponent as i32);

    format!("{:.2} {}", size, UNITS[exponent])
}

pub fn sanitize_filename(filename: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    let cleaned: String = filename
        .trim()
        .chars()
        .map(|c| {
            if invalid_chars.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// `{productName}【{storeName}】`, both parts sanitized.
pub fn folder_name(product_name: &str, store_name: &str) -> String {
    format!(
        "{}【{}】",
        sanitize_filename(product_name),
        sanitize_filename(store_name)
    )
}

pub fn cover_image_name(locale: Locale) -> &'static str {
    match locale {
        Locale::Zh => "封面图片.jpg",
        Locale::En => "cover.jpg",
    }
}

/// 1-indexed gallery file name.
pub fn gallery_image_name(locale: Locale, index: usize) -> String {
    match locale {
        Locale::Zh => format!("公共图片_{}.jpg", index + 1),
        Locale::En => format!("image_{}.jpg", index + 1),
    }
}

pub fn image_format_to_string(format: image::ImageFormat) -> String {
    match format {
        image::ImageFormat::Jpeg => "JPEG",
        image::ImageFormat::Png => "PNG",
        image::ImageFormat::Gif => "GIF",
        image::ImageFormat::WebP => "WebP",
        image::ImageFormat::Tiff => "TIFF",
        image::ImageFormat::Bmp => "BMP",
        _ => "Unknown",
    }
    .to_string()
}
