// pixmark/src/lib.rs
pub mod cli;
pub mod core;
pub mod processors;
pub mod sink;
mod utils;

pub use crate::core::processor::ImagePipeline;
pub use crate::core::{
    CancellationToken, Color, ExportConfig, ExportError, ExportItemResult,
    ExportJob, ExportOutcome, ExportSummary, ImageRef, Locale, Product, ProductStatus, Result,
    StatusUpdateFailure, StoreInfo, WatermarkMode, WatermarkPosition, WatermarkSettings,
};
pub use processors::{
    analyze_color, BatchExporter, Compressor, ExportProgress, FontLibrary, ImageResolver, Loader,
    SourceResolver, StatusUpdater, Watermarker,
};
pub use sink::{DirHandle, FileWriteHandle, FsSink, MemorySink, SinkError, StorageSink};
pub use utils::{format_file_size, generate_output_path, image_format_to_string};

pub mod prelude {
    pub use crate::{
        BatchExporter, CancellationToken, ExportConfig, ExportJob, ExportSummary, ImageRef,
        Product, StorageSink, WatermarkSettings,
    };
}

// Re-export commonly used types
pub use image::DynamicImage;
