// pixmark/src/processors/mod.rs
mod analyzer;
mod batch;
mod compressor;
mod font;
mod loader;
mod metadata;
mod watermark;

pub use analyzer::{analyze_color, average_luminance};
pub use batch::{BatchExporter, ExportProgress, StatusUpdater};
pub use compressor::Compressor;
pub use font::{text_width, FontLibrary, TextMask};
pub use loader::{decode_data_uri, ImageResolver, Loader, SourceResolver};
pub use metadata::{store_name, unknown_store, MetadataEntry, MetadataReport, MetadataWriter};
pub use watermark::{effective_font_size, resolve_color, single_anchor, tile_anchors, Watermarker};

pub mod prelude {
    pub use super::{
        BatchExporter, Compressor, FontLibrary, ImageResolver, Loader, MetadataWriter,
        SourceResolver, StatusUpdater, Watermarker,
    };
}
