// pixmark/src/core/model.rs
use super::WatermarkSettings;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a product image comes from.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageRef {
    Url(String),
    DataUri(String),
    Path(PathBuf),
    /// Already-resident encoded image.
    Bytes(Vec<u8>),
}

impl ImageRef {
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        let lower = value.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Some(ImageRef::Url(value.to_string()))
        } else if lower.starts_with("data:") {
            Some(ImageRef::DataUri(value.to_string()))
        } else {
            Some(ImageRef::Path(PathBuf::from(value)))
        }
    }

    /// Short label for log lines.
    pub fn describe(&self) -> String {
        match self {
            ImageRef::Url(url) => url.clone(),
            ImageRef::DataUri(uri) => format!("data URI ({} chars)", uri.len()),
            ImageRef::Path(path) => path.display().to_string(),
            ImageRef::Bytes(bytes) => format!("{} resident bytes", bytes.len()),
        }
    }
}

impl fmt::Debug for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ImageRef({})", self.describe())
    }
}

impl TryFrom<String> for ImageRef {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        ImageRef::parse(&value).ok_or_else(|| "image reference must not be empty".to_string())
    }
}

impl From<ImageRef> for String {
    fn from(image: ImageRef) -> Self {
        match image {
            ImageRef::Url(url) => url,
            ImageRef::DataUri(uri) => uri,
            ImageRef::Path(path) => path.to_string_lossy().into_owned(),
            ImageRef::Bytes(bytes) => {
                format!("data:application/octet-stream;base64,{}", STANDARD.encode(bytes))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Draft,
    Pending,
    Published,
    Offline,
}

impl ProductStatus {
    pub fn label(&self, locale: super::Locale) -> &'static str {
        use super::Locale;
        match (self, locale) {
            (ProductStatus::Draft, Locale::Zh) => "草稿",
            (ProductStatus::Pending, Locale::Zh) => "待发布",
            (ProductStatus::Published, Locale::Zh) => "已发布",
            (ProductStatus::Offline, Locale::Zh) => "已下架",
            (ProductStatus::Draft, Locale::En) => "Draft",
            (ProductStatus::Pending, Locale::En) => "Pending",
            (ProductStatus::Published, Locale::En) => "Published",
            (ProductStatus::Offline, Locale::En) => "Offline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub name: String,
    #[serde(default)]
    pub platform: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default)]
    pub distributed_title: String,
    #[serde(default)]
    pub distributed_content: String,
    /// `None` when the store could not be resolved.
    #[serde(default)]
    pub store: Option<StoreInfo>,
    #[serde(default)]
    pub delivery_method: Option<String>,
    #[serde(default)]
    pub delivery_content: Option<String>,
    #[serde(default)]
    pub cover_image: Option<ImageRef>,
    #[serde(default)]
    pub gallery_images: Vec<ImageRef>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: String::new(),
            price: 0.0,
            stock: 0,
            status: ProductStatus::Draft,
            distributed_title: String::new(),
            distributed_content: String::new(),
            store: None,
            delivery_method: None,
            delivery_content: None,
            cover_image: None,
            gallery_images: Vec::new(),
        }
    }

    pub fn with_store(mut self, name: impl Into<String>, platform: impl Into<String>) -> Self {
        self.store = Some(StoreInfo {
            name: name.into(),
            platform: platform.into(),
        });
        self
    }

    pub fn with_cover(mut self, image: ImageRef) -> Self {
        self.cover_image = Some(image);
        self
    }

    pub fn with_gallery(mut self, images: Vec<ImageRef>) -> Self {
        self.gallery_images = images;
        self
    }

    pub fn image_count(&self) -> usize {
        self.cover_image.iter().count() + self.gallery_images.len()
    }
}

/// One export request. Consumed by a single run and never persisted.
#[derive(Debug, Clone, Default)]
pub struct ExportJob {
    pub products: Vec<Product>,
    pub apply_watermark: bool,
    pub advance_status_on_success: bool,
    pub watermark: Option<WatermarkSettings>,
}

impl ExportJob {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products,
            ..Default::default()
        }
    }

    pub fn with_watermark(mut self, settings: WatermarkSettings) -> Self {
        self.apply_watermark = true;
        self.watermark = Some(settings);
        self
    }

    pub fn advance_status(mut self, advance: bool) -> Self {
        self.advance_status_on_success = advance;
        self
    }

    /// Settings to composite with, if this run watermarks at all.
    pub fn effective_watermark(&self) -> Option<&WatermarkSettings> {
        if !self.apply_watermark {
            return None;
        }
        self.watermark.as_ref().filter(|settings| settings.has_text())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportItemResult {
    pub product_id: String,
    pub folder_name: String,
    pub images_written: usize,
    pub images_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExportItemResult {
    pub fn new(product_id: impl Into<String>, folder_name: impl Into<String>) -> Self {
        Self {
            product_id: product_id.into(),
            folder_name: folder_name.into(),
            images_written: 0,
            images_failed: 0,
            error: None,
        }
    }

    pub fn structural_failure(
        product_id: impl Into<String>,
        folder_name: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(product_id, folder_name)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateFailure {
    pub product_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub per_item: Vec<ExportItemResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_update_failures: Vec<StatusUpdateFailure>,
}

impl ExportSummary {
    pub fn from_items(items: Vec<ExportItemResult>) -> Self {
        let mut summary = Self::default();
        for item in items {
            summary.push(item);
        }
        summary
    }

    pub fn push(&mut self, item: ExportItemResult) {
        self.total += 1;
        if item.is_success() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.per_item.push(item);
    }

    pub fn images_written(&self) -> usize {
        self.per_item.iter().map(|item| item.images_written).sum()
    }

    pub fn images_failed(&self) -> usize {
        self.per_item.iter().map(|item| item.images_failed).sum()
    }

    pub fn failed_items(&self) -> impl Iterator<Item = &ExportItemResult> {
        self.per_item.iter().filter(|item| !item.is_success())
    }

    pub fn outcome(&self) -> ExportOutcome {
        if self.failed == 0 {
            ExportOutcome::Success { total: self.total }
        } else if self.succeeded == 0 {
            ExportOutcome::Failure { total: self.total }
        } else {
            ExportOutcome::Partial {
                succeeded: self.succeeded,
                failed: self
                    .failed_items()
                    .map(|item| item.folder_name.clone())
                    .collect(),
            }
        }
    }
}

/// End-of-run message class shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Success { total: usize },
    Failure { total: usize },
    Partial { succeeded: usize, failed: Vec<String> },
}

impl fmt::Display for ExportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportOutcome::Success { total } => write!(f, "Exported all {} products", total),
            ExportOutcome::Failure { total } => {
                write!(f, "Export failed for all {} products", total)
            }
            ExportOutcome::Partial { succeeded, failed } => write!(
                f,
                "Exported {} products, {} failed: {}",
                succeeded,
                failed.len(),
                failed.join(", ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_ref_parsing() {
        assert_eq!(
            ImageRef::parse("https://cdn.example.com/a.jpg"),
            Some(ImageRef::Url("https://cdn.example.com/a.jpg".to_string()))
        );
        assert!(matches!(
            ImageRef::parse("data:image/png;base64,AAAA"),
            Some(ImageRef::DataUri(_))
        ));
        assert_eq!(
            ImageRef::parse("images/a.png"),
            Some(ImageRef::Path(PathBuf::from("images/a.png")))
        );
        assert_eq!(ImageRef::parse("   "), None);
    }

    #[test]
    fn resident_bytes_serialize_as_data_uri() {
        let json = serde_json::to_string(&ImageRef::Bytes(vec![1, 2, 3])).unwrap();
        assert_eq!(json, "\"data:application/octet-stream;base64,AQID\"");
        let back: ImageRef = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ImageRef::DataUri(_)));
    }

    #[test]
    fn product_deserializes_with_defaults() {
        let product: Product = serde_json::from_str(
            r#"{"id":"p1","name":"Gift card","coverImage":"https://x/y.jpg","galleryImages":["a.png"]}"#,
        )
        .unwrap();
        assert_eq!(product.status, ProductStatus::Draft);
        assert!(product.store.is_none());
        assert_eq!(product.image_count(), 2);
    }

    #[test]
    fn job_without_text_does_not_watermark() {
        let job = ExportJob::new(vec![]).with_watermark(WatermarkSettings::new("  "));
        assert!(job.effective_watermark().is_none());

        let mut job = ExportJob::new(vec![]).with_watermark(WatermarkSettings::new("MARK"));
        assert!(job.effective_watermark().is_some());
        job.apply_watermark = false;
        assert!(job.effective_watermark().is_none());
    }

    #[test]
    fn summary_counts_add_up() {
        let summary = ExportSummary::from_items(vec![
            ExportItemResult::new("1", "a"),
            ExportItemResult::structural_failure("2", "b", "boom"),
            ExportItemResult::new("3", "c"),
        ]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded + summary.failed, summary.total);
        assert_eq!(
            summary.outcome(),
            ExportOutcome::Partial {
                succeeded: 2,
                failed: vec!["b".to_string()]
            }
        );
    }

    #[test]
    fn outcome_messages() {
        let all_ok = ExportSummary::from_items(vec![ExportItemResult::new("1", "a")]);
        assert_eq!(all_ok.outcome().to_string(), "Exported all 1 products");

        let all_bad =
            ExportSummary::from_items(vec![ExportItemResult::structural_failure("1", "a", "x")]);
        assert_eq!(all_bad.outcome(), ExportOutcome::Failure { total: 1 });
    }
}
