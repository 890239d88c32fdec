// pixmark/src/processors/batch.rs
use super::metadata::{store_name, MetadataWriter};
use super::watermark::Watermarker;
use crate::core::processor::ImagePipeline;
use crate::core::{
    CancellationToken, ExportConfig, ExportError, ExportItemResult, ExportJob, ExportSummary,
    ImageRef, Product, Result, StatusUpdateFailure,
};
use crate::sink::{write_file, DirHandle, SinkError, StorageSink};
use crate::utils::{cover_image_name, folder_name, gallery_image_name, IMAGES_DIR};
use rayon::prelude::*;

/// Moves exported products to the "pending" state in whatever system owns them.
pub trait StatusUpdater: Send + Sync {
    fn mark_pending(&self, product_id: &str) -> Result<()>;
}

/// Reported once per product, after its result is final.
#[derive(Debug)]
pub struct ExportProgress<'a> {
    pub index: usize,
    pub total: usize,
    pub item: &'a ExportItemResult,
}

pub struct BatchExporter {
    config: ExportConfig,
    pipeline: ImagePipeline,
    metadata: MetadataWriter,
    thread_pool: Option<rayon::ThreadPool>,
    cancel: CancellationToken,
    status_updater: Option<Box<dyn StatusUpdater>>,
}

impl BatchExporter {
    pub fn new(config: ExportConfig, pipeline: ImagePipeline) -> Result<Self> {
        config.validate()?;

        // Gallery images of one product share this pool; products never do
        let thread_pool = if config.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .build()
                .map_err(|e| {
                    ExportError::InvalidParameter(format!("Failed to create thread pool: {}", e))
                })?;
            Some(pool)
        } else {
            None
        };

        Ok(Self {
            metadata: MetadataWriter::new(config.locale),
            config,
            pipeline,
            thread_pool,
            cancel: CancellationToken::new(),
            status_updater: None,
        })
    }

    /// Exporter with the default resolver and system fonts.
    pub fn from_config(config: ExportConfig) -> Result<Self> {
        let pipeline = ImagePipeline::from_config(&config)?;
        Self::new(config, pipeline)
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_status_updater(mut self, updater: Box<dyn StatusUpdater>) -> Self {
        self.status_updater = Some(updater);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn run(&self, job: &ExportJob, sink: &dyn StorageSink) -> Result<ExportSummary> {
        self.run_with_progress(job, sink, &mut |_: &ExportProgress<'_>| {})
    }

    pub fn run_with_progress(
        &self,
        job: &ExportJob,
        sink: &dyn StorageSink,
        progress: &mut dyn FnMut(&ExportProgress<'_>),
    ) -> Result<ExportSummary> {
        if job.advance_status_on_success && self.status_updater.is_none() {
            return Err(ExportError::InvalidParameter(
                "Status advancement requested without a status updater".to_string(),
            ));
        }

        // Font problems surface here, before anything is written
        let watermarker = self.pipeline.watermarker(job.effective_watermark())?;

        let total = job.products.len();
        log::info!(
            "Exporting {} products (watermark: {}, threads: {})",
            total,
            watermarker.is_some(),
            self.config.threads
        );

        let root = sink.root();
        let mut summary = ExportSummary::default();

        for (index, product) in job.products.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!("Export cancelled after {} of {} products", index, total);
                return Err(ExportError::Cancelled {
                    processed: index,
                    summary: Box::new(summary),
                });
            }

            let item = self.export_product(product, sink, &root, watermarker.as_ref())?;
            progress(&ExportProgress {
                index,
                total,
                item: &item,
            });
            summary.push(item);
        }

        if job.advance_status_on_success {
            if let Some(updater) = &self.status_updater {
                summary.status_update_failures = advance_statuses(&summary, updater.as_ref());
            }
        }

        log::info!(
            "Export finished: {} succeeded, {} failed, {} images written, {} images failed",
            summary.succeeded,
            summary.failed,
            summary.images_written(),
            summary.images_failed()
        );

        Ok(summary)
    }

    /// `Err` only when the sink itself became unusable.
    fn export_product(
        &self,
        product: &Product,
        sink: &dyn StorageSink,
        root: &DirHandle,
        watermarker: Option<&Watermarker>,
    ) -> Result<ExportItemResult> {
        let folder = folder_name(&product.name, store_name(product, self.config.locale));
        log::debug!("Exporting product {} into {}", product.id, folder);

        let dir = match sink.create_directory(root, &folder) {
            Ok(dir) => dir,
            Err(e) => return structural(product, folder, "Failed to create folder", e),
        };

        let report = self.metadata.write_all(sink, &dir, product);
        if let Some(e) = report.fatal_error() {
            return Err(sink_unavailable(e));
        }
        if !report.is_complete() {
            let reason = format!("Failed to write metadata: {}", report.describe_failures());
            log::error!("Product {} failed: {}", product.id, reason);
            return Ok(ExportItemResult::structural_failure(&product.id, folder, reason));
        }

        let images_dir = match sink.create_directory(&dir, IMAGES_DIR) {
            Ok(dir) => dir,
            Err(e) => return structural(product, folder, "Failed to create images folder", e),
        };

        let mut outcomes = Vec::with_capacity(product.image_count());
        if let Some(cover) = &product.cover_image {
            let name = cover_image_name(self.config.locale);
            outcomes.push(self.export_image(cover, sink, &images_dir, name, watermarker));
        }
        outcomes.extend(self.export_gallery(
            &product.gallery_images,
            sink,
            &images_dir,
            watermarker,
        ));

        let mut item = ExportItemResult::new(&product.id, folder);
        for outcome in outcomes {
            match outcome {
                Ok(()) => item.images_written += 1,
                Err(e) if e.is_fatal() => return Err(sink_unavailable(&e)),
                Err(_) => item.images_failed += 1,
            }
        }

        Ok(item)
    }

    /// Results come back in stored order whether or not the pool is used.
    fn export_gallery(
        &self,
        images: &[ImageRef],
        sink: &dyn StorageSink,
        dir: &DirHandle,
        watermarker: Option<&Watermarker>,
    ) -> Vec<Result<()>> {
        let locale = self.config.locale;
        let export = |(index, image): (usize, &ImageRef)| {
            self.export_image(image, sink, dir, &gallery_image_name(locale, index), watermarker)
        };

        match &self.thread_pool {
            Some(pool) if images.len() > 1 => {
                pool.install(|| images.par_iter().enumerate().map(export).collect())
            }
            _ => images.iter().enumerate().map(export).collect(),
        }
    }

    fn export_image(
        &self,
        image: &ImageRef,
        sink: &dyn StorageSink,
        dir: &DirHandle,
        name: &str,
        watermarker: Option<&Watermarker>,
    ) -> Result<()> {
        let result = self
            .pipeline
            .render(image, watermarker)
            .and_then(|bytes| write_file(sink, dir, name, &bytes).map_err(ExportError::from));

        if let Err(e) = &result {
            log::warn!("Failed to export {} as {}: {}", image.describe(), dir.join(name), e);
        }
        result
    }
}

fn structural(
    product: &Product,
    folder: String,
    what: &str,
    error: SinkError,
) -> Result<ExportItemResult> {
    if error.is_fatal() {
        return Err(sink_unavailable(&error));
    }

    let reason = ExportError::Structural {
        folder: folder.clone(),
        reason: format!("{}: {}", what, error),
    };
    log::error!("Product {} failed: {}", product.id, reason);
    Ok(ExportItemResult::structural_failure(
        &product.id,
        folder,
        reason.to_string(),
    ))
}

fn sink_unavailable(error: &dyn std::fmt::Display) -> ExportError {
    log::error!("Storage destination became unusable: {}", error);
    ExportError::SinkUnavailable(error.to_string())
}

fn advance_statuses(summary: &ExportSummary, updater: &dyn StatusUpdater) -> Vec<StatusUpdateFailure> {
    summary
        .per_item
        .iter()
        .filter(|item| item.is_success())
        .filter_map(|item| match updater.mark_pending(&item.product_id) {
            Ok(()) => None,
            Err(e) => {
                log::warn!("Failed to mark {} as pending: {}", item.product_id, e);
                Some(StatusUpdateFailure {
                    product_id: item.product_id.clone(),
                    error: e.to_string(),
                })
            }
        })
        .collect()
}
