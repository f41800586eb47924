//! Bulk import
//!
//! Two importers share this module's plumbing: the streaming JSON importer
//! ([`json::JsonImporter`]) and the two-phase CSV importer
//! ([`csv::CsvImporter`]). Both isolate per-record failures into a report
//! instead of aborting, remap source ids to backend ids, and create tags on
//! demand through a per-invocation cache.

pub mod csv;
pub mod json;

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use log::debug;
use rand::seq::IndexedRandom;
use serde::Serialize;
use serde_json::{Value, json};

use crate::api::{DataProvider, Id, ListParams};
use crate::models::Tag;

/// Records per batch for the JSON importer
pub const JSON_BATCH_SIZE: usize = 50;
/// Records per batch for the CSV importer
pub const CSV_BATCH_SIZE: usize = 10;

/// The five record kinds a JSON import file may carry, in their required
/// processing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Sales,
    Companies,
    Contacts,
    Notes,
    Tasks,
}

impl RecordKind {
    /// Map a top-level JSON key to its kind
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "sales" => Some(Self::Sales),
            "companies" => Some(Self::Companies),
            "contacts" => Some(Self::Contacts),
            "notes" => Some(Self::Notes),
            "tasks" => Some(Self::Tasks),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Companies => "companies",
            Self::Contacts => "contacts",
            Self::Notes => "notes",
            Self::Tasks => "tasks",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that violated the required shape for its kind; aborts the import
#[derive(Debug, Clone)]
pub struct ShapeError {
    pub kind: RecordKind,
    pub message: String,
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} record: {}", self.kind, self.message)
    }
}

impl std::error::Error for ShapeError {}

/// Per-kind import tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindCounts {
    pub imported: usize,
    pub failed: usize,
}

/// Aggregated result of one import run
#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    /// Tallies keyed by kind name
    pub counts: BTreeMap<String, KindCounts>,
    /// Raw records that failed, keyed by kind name, for the error-report file
    pub failed_records: BTreeMap<String, Vec<Value>>,
}

impl ImportReport {
    pub fn record_imported(&mut self, kind: RecordKind) {
        self.counts.entry(kind.as_str().to_string()).or_default().imported += 1;
    }

    pub fn record_failed(&mut self, kind: RecordKind, record: Value) {
        self.counts.entry(kind.as_str().to_string()).or_default().failed += 1;
        self.failed_records
            .entry(kind.as_str().to_string())
            .or_default()
            .push(record);
    }

    pub fn counts_for(&self, kind: RecordKind) -> KindCounts {
        self.counts.get(kind.as_str()).copied().unwrap_or_default()
    }

    pub fn total_failed(&self) -> usize {
        self.counts.values().map(|c| c.failed).sum()
    }

    pub fn total_imported(&self) -> usize {
        self.counts.values().map(|c| c.imported).sum()
    }

    /// Write the failed raw records as a JSON error-report file
    pub fn write_failed_report(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create error report: {}", path.display()))?;
        serde_json::to_writer_pretty(file, &self.failed_records)
            .context("Failed to serialize error report")?;
        log::info!("Error report written to {}", path.display());
        Ok(())
    }
}

/// Source-id to backend-id table, scoped to one import invocation
#[derive(Debug, Default)]
pub struct IdRemapper {
    maps: HashMap<RecordKind, HashMap<i64, Id>>,
}

impl IdRemapper {
    pub fn insert(&mut self, kind: RecordKind, source_id: i64, backend_id: Id) {
        self.maps.entry(kind).or_default().insert(source_id, backend_id);
    }

    /// Resolve a referenced parent id; `None` means the parent was not seen
    /// earlier in the stream (a per-record failure, not a retry)
    pub fn resolve(&self, kind: RecordKind, source_id: i64) -> Option<Id> {
        self.maps.get(&kind)?.get(&source_id).copied()
    }
}

/// Tag name -> id cache with create-on-miss, scoped to one import invocation
#[derive(Debug, Default)]
pub struct TagCache {
    by_name: HashMap<String, Id>,
}

impl TagCache {
    fn normalize(name: &str) -> String {
        name.trim().to_lowercase()
    }

    /// Seed the cache with every tag already on the backend
    pub async fn seed<P: DataProvider>(provider: &P) -> Result<Self> {
        let existing = provider
            .get_list::<Tag>(ListParams::new().paginate(1, 500))
            .await
            .context("Failed to fetch existing tags")?;
        let by_name = existing
            .data
            .into_iter()
            .map(|tag| (Self::normalize(&tag.name), tag.id))
            .collect();
        Ok(Self { by_name })
    }

    /// Resolve a tag name, creating the tag with a random palette color on
    /// first occurrence
    pub async fn resolve_or_create<P: DataProvider>(
        &mut self,
        provider: &P,
        name: &str,
        palette: &[String],
    ) -> Result<Id> {
        let key = Self::normalize(name);
        if let Some(id) = self.by_name.get(&key) {
            return Ok(*id);
        }

        let color = palette
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_else(|| "#eddcd2".to_string());
        let tag: Tag = provider
            .create(json!({"name": name.trim(), "color": color}))
            .await
            .with_context(|| format!("Failed to create tag '{}'", name))?;
        debug!("Created tag '{}' ({})", tag.name, tag.id);
        self.by_name.insert(key, tag.id);
        Ok(tag.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MemoryProvider;

    #[test]
    fn test_record_kind_from_key() {
        assert_eq!(RecordKind::from_key("sales"), Some(RecordKind::Sales));
        assert_eq!(RecordKind::from_key("tasks"), Some(RecordKind::Tasks));
        assert_eq!(RecordKind::from_key("widgets"), None);
    }

    #[test]
    fn test_remapper_scopes_by_kind() {
        let mut remap = IdRemapper::default();
        remap.insert(RecordKind::Sales, 1, 100);
        remap.insert(RecordKind::Companies, 1, 200);
        assert_eq!(remap.resolve(RecordKind::Sales, 1), Some(100));
        assert_eq!(remap.resolve(RecordKind::Companies, 1), Some(200));
        assert_eq!(remap.resolve(RecordKind::Contacts, 1), None);
    }

    #[test]
    fn test_report_tallies_and_buckets() {
        let mut report = ImportReport::default();
        report.record_imported(RecordKind::Contacts);
        report.record_failed(RecordKind::Contacts, json!({"id": 9}));
        report.record_imported(RecordKind::Sales);

        assert_eq!(
            report.counts_for(RecordKind::Contacts),
            KindCounts { imported: 1, failed: 1 }
        );
        assert_eq!(report.total_imported(), 2);
        assert_eq!(report.total_failed(), 1);
        assert_eq!(report.failed_records["contacts"], vec![json!({"id": 9})]);
    }

    #[tokio::test]
    async fn test_tag_cache_creates_once_per_name() {
        let provider = MemoryProvider::new();
        let palette = vec!["#abc".to_string()];
        let mut cache = TagCache::seed(&provider).await.unwrap();

        let a = cache
            .resolve_or_create(&provider, "VIP", &palette)
            .await
            .unwrap();
        let b = cache
            .resolve_or_create(&provider, "  vip ", &palette)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(provider.count::<Tag>(), 1);
    }

    #[tokio::test]
    async fn test_tag_cache_seeds_existing_tags() {
        let provider = MemoryProvider::new();
        let existing: Tag = provider
            .create(json!({"name": "Partner", "color": "#fff"}))
            .await
            .unwrap();

        let mut cache = TagCache::seed(&provider).await.unwrap();
        let id = cache
            .resolve_or_create(&provider, "partner", &[])
            .await
            .unwrap();
        assert_eq!(id, existing.id);
        assert_eq!(provider.count::<Tag>(), 1);
    }
}
