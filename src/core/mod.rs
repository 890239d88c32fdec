// pixmark/src/core/mod.rs
pub mod model;
pub mod processor;

use crate::sink::SinkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use model::{
    ExportItemResult, ExportJob, ExportOutcome, ExportSummary, ImageRef, Product, ProductStatus,
    StatusUpdateFailure, StoreInfo,
};

/// Default opacity, also the low fixed value smart mode starts from.
pub const DEFAULT_OPACITY_PERCENT: u8 = 15;

/// Reference image width the base font size is expressed against.
pub const FONT_REFERENCE_WIDTH: f32 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkMode {
    #[default]
    Single,
    Tile,
}

/// Language used for folder sentinels, metadata file names and image names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    Zh,
    En,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn black() -> Self {
        Self::new(0, 0, 0)
    }

    pub const fn white() -> Self {
        Self::new(255, 255, 255)
    }

    /// Parses `#RGB`, `#RRGGBB`, `black` or `white`.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        match value.to_ascii_lowercase().as_str() {
            "black" => return Ok(Self::black()),
            "white" => return Ok(Self::white()),
            _ => {}
        }

        let hex = value.strip_prefix('#').ok_or_else(|| {
            ExportError::InvalidParameter(format!("Color must start with '#': {}", value))
        })?;

        let digit = |s: &str| {
            u8::from_str_radix(s, 16).map_err(|_| {
                ExportError::InvalidParameter(format!("Invalid hex digit in color: {}", value))
            })
        };

        if !hex.is_ascii() {
            return Err(ExportError::InvalidParameter(format!(
                "Invalid color: {}",
                value
            )));
        }

        match hex.len() {
            3 => Ok(Self::new(
                digit(&hex[0..1])? * 17,
                digit(&hex[1..2])? * 17,
                digit(&hex[2..3])? * 17,
            )),
            6 => Ok(Self::new(
                digit(&hex[0..2])?,
                digit(&hex[2..4])?,
                digit(&hex[4..6])?,
            )),
            n => Err(ExportError::InvalidParameter(format!(
                "Color must be #RGB or #RRGGBB, got {} hex digits",
                n
            ))),
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Text watermark options for one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WatermarkSettings {
    pub text: String,
    /// Font size at an image width of 300px; scales linearly with width.
    pub font_size_base: f32,
    pub opacity_percent: u8,
    /// Ignored in tile mode.
    pub position: WatermarkPosition,
    pub rotation_degrees: f32,
    pub mode: WatermarkMode,
    pub color: Option<String>,
    pub font_family: String,
    pub is_smart_mode: bool,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size_base: 20.0,
            opacity_percent: DEFAULT_OPACITY_PERCENT,
            position: WatermarkPosition::Center,
            rotation_degrees: 0.0,
            mode: WatermarkMode::Single,
            color: None,
            font_family: "sans-serif".to_string(),
            is_smart_mode: false,
        }
    }
}

impl WatermarkSettings {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }

    /// Explicit color, unless smart mode asks for it to be derived.
    pub fn explicit_color(&self) -> Result<Option<Color>> {
        if self.is_smart_mode {
            return Ok(None);
        }
        self.color.as_deref().map(Color::parse).transpose()
    }

    pub fn alpha(&self) -> f32 {
        f32::from(self.opacity_percent) / 100.0
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.opacity_percent) {
            return Err(ExportError::InvalidParameter(
                "Opacity must be between 1 and 100".to_string(),
            ));
        }

        if !(-180.0..=180.0).contains(&self.rotation_degrees) {
            return Err(ExportError::InvalidParameter(
                "Rotation must be between -180 and 180 degrees".to_string(),
            ));
        }

        if !self.font_size_base.is_finite() || self.font_size_base <= 0.0 {
            return Err(ExportError::InvalidParameter(
                "Font size must be a positive number".to_string(),
            ));
        }

        if self.font_family.trim().is_empty() {
            return Err(ExportError::InvalidParameter(
                "Font family must not be empty".to_string(),
            ));
        }

        if let Some(color) = &self.color {
            Color::parse(color)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub locale: Locale,
    /// Gallery worker pool size; 1 keeps every image write sequential.
    pub threads: usize,
    pub fetch_timeout: Duration,
    pub jpeg_quality: u8,
    pub max_dimensions: Option<(u32, u32)>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            locale: Locale::Zh,
            threads: 1,
            fetch_timeout: Duration::from_secs(30),
            jpeg_quality: 95,
            max_dimensions: Some((100_000, 100_000)),
        }
    }
}

impl ExportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 || self.threads > 8 {
            return Err(ExportError::InvalidParameter(
                "Threads must be between 1 and 8".to_string(),
            ));
        }

        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(ExportError::InvalidParameter(
                "Quality must be between 1 and 100".to_string(),
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err(ExportError::InvalidParameter(
                "Fetch timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Cooperative stop flag, checked by the exporter between products.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Shared flag, for wiring into signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Structural error in {folder}: {reason}")]
    Structural { folder: String, reason: String },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Export cancelled after {processed} products")]
    Cancelled {
        processed: usize,
        summary: Box<ExportSummary>,
    },

    #[error("Storage destination unavailable: {0}")]
    SinkUnavailable(String),
}

impl ExportError {
    /// True when the destination itself is gone and the run cannot go on.
    pub fn is_fatal(&self) -> bool {
        match self {
            ExportError::Sink(e) => e.is_fatal(),
            ExportError::SinkUnavailable(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;
