// pixmark/src/cli.rs
use crate::core::{
    ExportError, Locale, Result, WatermarkMode, WatermarkPosition, WatermarkSettings,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pixmark")]
#[command(about = "Watermark product images and export them as per-product folders")]
#[command(version)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Export products from a JSON manifest into a folder tree
    Export {
        #[arg(short, long, help = "JSON file holding an array of products")]
        manifest: PathBuf,

        #[arg(short, long, help = "Destination root directory")]
        output: PathBuf,

        #[arg(long, help = "Composite the text watermark onto every image")]
        watermark: bool,

        #[command(flatten)]
        style: WatermarkArgs,

        #[arg(long, help = "Mark exported products as pending in the manifest")]
        advance_status: bool,

        #[arg(long, value_enum, default_value_t = LocaleArg::Zh)]
        locale: LocaleArg,

        #[arg(short = 'j', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=8))]
        threads: u8,

        #[arg(long, default_value_t = 30, help = "Per-image fetch timeout in seconds")]
        timeout: u64,

        #[arg(short, long, default_value_t = 95, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,

        #[arg(long, help = "Write the export summary as JSON")]
        report: Option<PathBuf>,
    },

    /// Watermark a single image file
    Watermark {
        #[arg(help = "Input image file")]
        input: PathBuf,

        #[arg(short, long, help = "Output file (default: <input>_watermarked_<ts>.jpg)")]
        output: Option<PathBuf>,

        #[command(flatten)]
        style: WatermarkArgs,

        #[arg(short, long, default_value_t = 95, value_parser = clap::value_parser!(u8).range(1..=100))]
        quality: u8,
    },

    /// Show the luminance and the watermark color picked for an image
    Analyze {
        #[arg(help = "Input image file")]
        input: PathBuf,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct WatermarkArgs {
    #[arg(long, help = "Watermark text")]
    pub text: Option<String>,

    #[arg(long = "watermark-config", help = "JSON file with watermark settings")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Font size at a 300px wide image")]
    pub font_size: Option<f32>,

    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub opacity: Option<u8>,

    #[arg(long, value_enum)]
    pub position: Option<PositionArg>,

    #[arg(long, allow_hyphen_values = true, help = "Rotation in degrees, -180 to 180")]
    pub rotation: Option<f32>,

    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    #[arg(long, help = "#RGB, #RRGGBB, black or white")]
    pub color: Option<String>,

    #[arg(long, help = "CSS-style font family list or a font file path")]
    pub font: Option<String>,

    #[arg(long, help = "Pick black or white from the image's luminance")]
    pub smart: bool,
}

impl WatermarkArgs {
    /// Settings from `--watermark-config`, overridden by individual flags.
    pub fn settings(&self) -> Result<WatermarkSettings> {
        let mut settings = match &self.config {
            Some(path) => {
                let data = std::fs::read_to_string(path)?;
                serde_json::from_str(&data).map_err(|e| {
                    ExportError::InvalidParameter(format!(
                        "Invalid watermark config {}: {}",
                        path.display(),
                        e
                    ))
                })?
            }
            None => WatermarkSettings::default(),
        };

        if let Some(text) = &self.text {
            settings.text = text.clone();
        }
        if let Some(size) = self.font_size {
            settings.font_size_base = size;
        }
        if let Some(opacity) = self.opacity {
            settings.opacity_percent = opacity;
        }
        if let Some(position) = self.position {
            settings.position = position.into();
        }
        if let Some(rotation) = self.rotation {
            settings.rotation_degrees = rotation;
        }
        if let Some(mode) = self.mode {
            settings.mode = mode.into();
        }
        if let Some(color) = &self.color {
            settings.color = Some(color.clone());
        }
        if let Some(font) = &self.font {
            settings.font_family = font.clone();
        }
        if self.smart {
            settings.is_smart_mode = true;
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PositionArg {
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl From<PositionArg> for WatermarkPosition {
    fn from(arg: PositionArg) -> Self {
        match arg {
            PositionArg::Center => WatermarkPosition::Center,
            PositionArg::TopLeft => WatermarkPosition::TopLeft,
            PositionArg::TopRight => WatermarkPosition::TopRight,
            PositionArg::BottomLeft => WatermarkPosition::BottomLeft,
            PositionArg::BottomRight => WatermarkPosition::BottomRight,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    Single,
    Tile,
}

impl From<ModeArg> for WatermarkMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Single => WatermarkMode::Single,
            ModeArg::Tile => WatermarkMode::Tile,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LocaleArg {
    Zh,
    En,
}

impl From<LocaleArg> for Locale {
    fn from(arg: LocaleArg) -> Self {
        match arg {
            LocaleArg::Zh => Locale::Zh,
            LocaleArg::En => Locale::En,
        }
    }
}
