// pixmark/src/processors/metadata.rs
use crate::core::{Locale, Product};
use crate::sink::{write_file, DirHandle, SinkError, StorageSink};
use crate::utils::sanitize_filename;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub file_name: String,
    pub contents: String,
}

impl MetadataEntry {
    fn new(file_name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            contents: contents.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MetadataReport {
    pub written: usize,
    pub failures: Vec<(String, SinkError)>,
}

impl MetadataReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn fatal_error(&self) -> Option<&SinkError> {
        self.failures
            .iter()
            .map(|(_, error)| error)
            .find(|error| error.is_fatal())
    }

    pub fn describe_failures(&self) -> String {
        self.failures
            .iter()
            .map(|(name, error)| format!("{}: {}", name, error))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn unknown_store(locale: Locale) -> &'static str {
    match locale {
        Locale::Zh => "未知店铺",
        Locale::En => "unknown store",
    }
}

/// Store name, or the locale's "unknown store" sentinel.
pub fn store_name(product: &Product, locale: Locale) -> &str {
    product
        .store
        .as_ref()
        .map(|store| store.name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| unknown_store(locale))
}

/// Text files written next to a product's images.
pub struct MetadataWriter {
    locale: Locale,
}

impl MetadataWriter {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    pub fn entries(&self, product: &Product) -> Vec<MetadataEntry> {
        let names = match self.locale {
            Locale::Zh => [
                "商品名称.txt",
                "商品分类.txt",
                "价格.txt",
                "库存.txt",
                "状态.txt",
                "分发标题.txt",
                "分发内容.txt",
                "店铺信息.txt",
            ],
            Locale::En => [
                "name.txt",
                "category.txt",
                "price.txt",
                "stock.txt",
                "status.txt",
                "distributed_title.txt",
                "distributed_content.txt",
                "store.txt",
            ],
        };

        let store = self.store_line(product);
        let values = [
            product.name.clone(),
            product.category.clone(),
            format!("{:.2}", product.price),
            product.stock.to_string(),
            product.status.label(self.locale).to_string(),
            product.distributed_title.clone(),
            product.distributed_content.clone(),
            store,
        ];

        let mut entries: Vec<MetadataEntry> = names
            .iter()
            .zip(values)
            .map(|(name, value)| MetadataEntry::new(*name, value))
            .collect();

        if let Some(method) = product
            .delivery_method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
        {
            let mut file_name = format!("{}.txt", sanitize_filename(method));
            // `Price.txt` and `price.txt` are one file on case-insensitive filesystems
            if names.iter().any(|name| name.to_lowercase() == file_name.to_lowercase()) {
                let prefix = match self.locale {
                    Locale::Zh => "发货方式_",
                    Locale::En => "delivery_",
                };
                file_name.insert_str(0, prefix);
            }

            entries.push(MetadataEntry::new(
                file_name,
                product.delivery_content.clone().unwrap_or_default(),
            ));
        }

        entries
    }

    fn store_line(&self, product: &Product) -> String {
        let name = store_name(product, self.locale);
        let platform = product
            .store
            .as_ref()
            .map(|store| store.platform.trim())
            .unwrap_or("");

        match (platform.is_empty(), self.locale) {
            (true, _) => name.to_string(),
            (false, Locale::Zh) => format!("{}（{}）", name, platform),
            (false, Locale::En) => format!("{} ({})", name, platform),
        }
    }

    /// Attempts every file; one failure never stops the rest.
    pub fn write_all(
        &self,
        sink: &dyn StorageSink,
        dir: &DirHandle,
        product: &Product,
    ) -> MetadataReport {
        let mut report = MetadataReport::default();

        for entry in self.entries(product) {
            match write_file(sink, dir, &entry.file_name, entry.contents.as_bytes()) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    log::warn!(
                        "Failed to write {} for product {}: {}",
                        dir.join(&entry.file_name),
                        product.id,
                        e
                    );
                    report.failures.push((entry.file_name, e));
                }
            }
        }

        report
    }
}
