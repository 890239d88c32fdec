// pixmark/src/main.rs
use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use pixmark::cli::{Cli, Commands, WatermarkArgs};
use pixmark::processors::{analyze_color, average_luminance, Loader, SourceResolver};
use pixmark::{
    format_file_size, generate_output_path, image_format_to_string, BatchExporter,
    CancellationToken, Compressor, ExportConfig, ExportError, ExportJob, ExportProgress,
    ExportSummary, FontLibrary, FsSink, ImagePipeline, ImageRef, Product, ProductStatus, StatusUpdater,
    Watermarker,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    env_logger::Builder::new()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Export {
            manifest,
            output,
            watermark,
            style,
            advance_status,
            locale,
            threads,
            timeout,
            quality,
            report,
        } => {
            let config = ExportConfig {
                locale: locale.into(),
                threads: usize::from(threads),
                fetch_timeout: Duration::from_secs(timeout),
                jpeg_quality: quality,
                ..Default::default()
            };
            process_export(
                &manifest,
                &output,
                watermark.then_some(style),
                advance_status,
                config,
                report.as_deref(),
            )?;
        }
        Commands::Watermark {
            input,
            output,
            style,
            quality,
        } => {
            process_watermark(&input, output.as_deref(), &style, quality)?;
        }
        Commands::Analyze { input } => {
            process_analyze(&input)?;
        }
    }

    Ok(())
}

/// Rewrites the manifest each time a product moves to pending.
struct ManifestStatusUpdater {
    path: PathBuf,
    products: Mutex<Vec<Product>>,
}

impl StatusUpdater for ManifestStatusUpdater {
    fn mark_pending(&self, product_id: &str) -> pixmark::Result<()> {
        let mut products = self
            .products
            .lock()
            .map_err(|_| ExportError::InvalidParameter("manifest lock poisoned".to_string()))?;

        let product = products
            .iter_mut()
            .find(|p| p.id == product_id)
            .ok_or_else(|| {
                ExportError::InvalidParameter(format!("Unknown product {}", product_id))
            })?;
        product.status = ProductStatus::Pending;

        let data = serde_json::to_vec_pretty(&*products).map_err(std::io::Error::from)?;
        std::fs::write(&self.path, data)?;
        Ok(())
    }
}

fn read_manifest(path: &Path) -> Result<Vec<Product>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("Failed to parse manifest {}", path.display()))
}

fn process_export(
    manifest: &Path,
    output: &Path,
    watermark: Option<WatermarkArgs>,
    advance_status: bool,
    config: ExportConfig,
    report: Option<&Path>,
) -> Result<()> {
    let products = read_manifest(manifest)?;
    if products.is_empty() {
        log::warn!("No products found in {}", manifest.display());
        return Ok(());
    }

    let mut job = ExportJob::new(products.clone()).advance_status(advance_status);
    if let Some(args) = watermark {
        let settings = args.settings()?;
        if !settings.has_text() {
            bail!("--watermark requires --text or a watermark config with text");
        }
        job = job.with_watermark(settings);
    }

    // Relative image paths in the manifest are relative to the manifest itself
    let base_dir = manifest
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let resolver = SourceResolver::new(config.fetch_timeout)?.with_base_dir(base_dir);
    let pipeline = ImagePipeline::with_resolver(&config, Box::new(resolver), FontLibrary::system())?;

    let token = CancellationToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, token.flag())
        .context("Failed to install Ctrl-C handler")?;

    let mut exporter = BatchExporter::new(config, pipeline)?.with_cancellation(token);
    if advance_status {
        exporter = exporter.with_status_updater(Box::new(ManifestStatusUpdater {
            path: manifest.to_path_buf(),
            products: Mutex::new(products),
        }));
    }

    let sink = FsSink::new(output)?;
    let pb = create_progress_bar(job.products.len())?;

    let result = exporter.run_with_progress(&job, &sink, &mut |progress: &ExportProgress<'_>| {
        pb.inc(1);
        pb.set_message(progress.item.folder_name.clone());
    });

    let summary = match result {
        Ok(summary) => summary,
        Err(ExportError::Cancelled { processed, summary }) => {
            pb.abandon_with_message("cancelled");
            if let Some(path) = report {
                write_report(path, &summary)?;
            }
            bail!("Export cancelled after {} products", processed);
        }
        Err(e) => {
            pb.abandon();
            return Err(e).context("Export aborted");
        }
    };

    pb.finish_with_message(format!("{} images written", summary.images_written()));

    if let Some(path) = report {
        write_report(path, &summary)?;
    }

    for failure in &summary.status_update_failures {
        eprintln!(
            "Status update failed for {}: {}",
            failure.product_id, failure.error
        );
    }

    println!("{}", summary.outcome());
    println!(
        "Images: {} written, {} failed. Output: {}",
        summary.images_written(),
        summary.images_failed(),
        output.display()
    );

    if summary.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn write_report(path: &Path, summary: &ExportSummary) -> Result<()> {
    let data = serde_json::to_vec_pretty(summary)?;
    std::fs::write(path, data)
        .with_context(|| format!("Failed to write report {}", path.display()))?;
    log::info!("Report written to {}", path.display());
    Ok(())
}

fn create_progress_bar(total: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn process_watermark(
    input: &Path,
    output: Option<&Path>,
    style: &WatermarkArgs,
    quality: u8,
) -> Result<()> {
    let settings = style.settings()?;
    if !settings.has_text() {
        bail!("Watermark text is empty; pass --text or --watermark-config");
    }

    let watermarker = Watermarker::from_library(settings, &FontLibrary::system())?;
    let loader = Loader::new(Box::new(SourceResolver::new(Duration::from_secs(30))?));
    let image = loader
        .load(&ImageRef::Path(input.to_path_buf()))
        .with_context(|| format!("Failed to load {}", input.display()))?;

    let bytes = watermarker.render(&image, &Compressor::new(quality))?;
    let output_path = generate_output_path(input, output, "watermarked");
    std::fs::write(&output_path, &bytes)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    println!(
        "Watermarked image saved to: {} ({})",
        output_path.display(),
        format_file_size(bytes.len() as u64)
    );

    Ok(())
}

fn process_analyze(input: &Path) -> Result<()> {
    if !input.exists() {
        bail!("File does not exist: {}", input.display());
    }

    let data = std::fs::read(input)?;
    let format = image::guess_format(&data)
        .map(image_format_to_string)
        .unwrap_or_else(|_| "Unknown".to_string());

    let loader = Loader::new(Box::new(SourceResolver::new(Duration::from_secs(30))?));
    let image = loader.decode(&data)?;

    println!("=== Image Information ===");
    println!("File: {}", input.display());
    println!("Size: {}", format_file_size(data.len() as u64));
    println!("Dimensions: {} x {} pixels", image.width(), image.height());
    println!("Format: {}", format);
    println!("Average luminance: {:.2}", average_luminance(&image));
    println!("Watermark color: {}", analyze_color(&image));

    Ok(())
}
