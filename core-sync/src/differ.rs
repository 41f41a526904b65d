//! # Collection Differ
//!
//! Partitions two item sets by id into missing-on-target, extra-on-target,
//! metadata-changed and identical.
//!
//! Every id in `source ∪ target` lands in exactly one bucket. Output order
//! follows input order, so the same inputs always produce the same result.

use bridge_traits::MediaItem;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// One tracked field whose value differs between source and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDifference {
    pub field: String,
    pub source_value: Option<String>,
    pub target_value: Option<String>,
}

/// An item present on both sides whose tracked metadata differs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataChange {
    pub source: MediaItem,
    pub target: MediaItem,
    pub differences: Vec<FieldDifference>,
}

impl MetadataChange {
    pub fn id(&self) -> &str {
        &self.source.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Labels of the compared collections; empty for bare listings.
    #[serde(default)]
    pub source_account: String,
    #[serde(default)]
    pub target_account: String,
    pub source_count: usize,
    pub target_count: usize,
    pub identical_count: usize,
    pub missing_on_target: Vec<MediaItem>,
    pub extra_on_target: Vec<MediaItem>,
    pub metadata_changed: Vec<MetadataChange>,
    pub compared_at: DateTime<Utc>,
}

impl ComparisonResult {
    /// True when applying this comparison would change nothing.
    pub fn is_in_sync(&self) -> bool {
        self.missing_on_target.is_empty()
            && self.extra_on_target.is_empty()
            && self.metadata_changed.is_empty()
    }

    pub fn with_accounts(
        mut self,
        source_account: impl Into<String>,
        target_account: impl Into<String>,
    ) -> Self {
        self.source_account = source_account.into();
        self.target_account = target_account.into();
        self
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Keep the first occurrence of every id.
fn dedupe<'a>(items: &'a [MediaItem], side: &str) -> Vec<&'a MediaItem> {
    let mut seen = HashSet::with_capacity(items.len());
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.id.as_str()) {
            unique.push(item);
        } else {
            warn!(side, item_id = %item.id, "Duplicate item id in listing; keeping first");
        }
    }
    unique
}

fn field_differences(source: &MediaItem, target: &MediaItem) -> Vec<FieldDifference> {
    source
        .tracked_fields()
        .into_iter()
        .zip(target.tracked_fields())
        .filter(|((_, s), (_, t))| s != t)
        .map(|((field, s), (_, t))| FieldDifference {
            field: field.to_string(),
            source_value: s,
            target_value: t,
        })
        .collect()
}

/// Compare two listings.
///
/// Pure and side-effect free; empty inputs are valid.
pub fn compare_items(source: &[MediaItem], target: &[MediaItem]) -> ComparisonResult {
    compare_items_at(source, target, Utc::now())
}

pub(crate) fn compare_items_at(
    source: &[MediaItem],
    target: &[MediaItem],
    compared_at: DateTime<Utc>,
) -> ComparisonResult {
    let source = dedupe(source, "source");
    let target = dedupe(target, "target");

    let target_by_id: HashMap<&str, &MediaItem> =
        target.iter().map(|item| (item.id.as_str(), *item)).collect();
    let source_ids: HashSet<&str> = source.iter().map(|item| item.id.as_str()).collect();

    let mut missing_on_target = Vec::new();
    let mut metadata_changed = Vec::new();
    let mut identical_count = 0;

    for item in &source {
        match target_by_id.get(item.id.as_str()) {
            None => missing_on_target.push((*item).clone()),
            Some(existing) if existing.fingerprint() != item.fingerprint() => {
                metadata_changed.push(MetadataChange {
                    source: (*item).clone(),
                    target: (*existing).clone(),
                    differences: field_differences(item, existing),
                });
            }
            Some(_) => identical_count += 1,
        }
    }

    let extra_on_target: Vec<MediaItem> = target
        .iter()
        .filter(|item| !source_ids.contains(item.id.as_str()))
        .map(|item| (*item).clone())
        .collect();

    debug!(
        source = source.len(),
        target = target.len(),
        missing = missing_on_target.len(),
        extra = extra_on_target.len(),
        changed = metadata_changed.len(),
        identical = identical_count,
        "Comparison complete"
    );

    ComparisonResult {
        source_account: String::new(),
        target_account: String::new(),
        source_count: source.len(),
        target_count: target.len(),
        identical_count,
        missing_on_target,
        extra_on_target,
        metadata_changed,
        compared_at,
    }
}
