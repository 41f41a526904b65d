//! Remote Media Collection Abstraction
//!
//! The contract every photo/video account backend implements so the sync
//! engine can list, stream and mutate its items without knowing the service.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Lazily produced payload of one media item.
///
/// Producers yield pieces in order; consumers pull at their own pace, so a
/// stream never holds more than the piece currently in flight.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// Descriptive metadata kept in sync between collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub description: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub iso: Option<u32>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub location_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// One item in a remote collection.
///
/// `id` is assigned by the remote service and is the only identity used when
/// matching items across collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: String,
    pub filename: String,
    pub created_time: Option<DateTime<Utc>>,
    pub mime_type: String,
    /// Payload size when the service reports it. Not part of the fingerprint.
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub metadata: MediaMetadata,
}

/// Stable digest over the tracked fields of a [`MediaItem`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataFingerprint(String);

impl MetadataFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MetadataFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl MediaItem {
    pub fn new(id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            created_time: None,
            mime_type: "application/octet-stream".to_string(),
            size_bytes: None,
            metadata: MediaMetadata::default(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_created_time(mut self, created_time: DateTime<Utc>) -> Self {
        self.created_time = Some(created_time);
        self
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    pub fn with_metadata(mut self, metadata: MediaMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.metadata.description = Some(description.into());
        self
    }

    /// Ordered `(field, value)` pairs for every field that participates in
    /// the fingerprint. `None` means the field is unset.
    pub fn tracked_fields(&self) -> Vec<(&'static str, Option<String>)> {
        let m = &self.metadata;
        vec![
            ("filename", Some(self.filename.clone())),
            (
                "created_time",
                self.created_time
                    .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true)),
            ),
            ("mime_type", Some(self.mime_type.clone())),
            ("description", m.description.clone()),
            ("is_favorite", Some(m.is_favorite.to_string())),
            ("camera_make", m.camera_make.clone()),
            ("camera_model", m.camera_model.clone()),
            ("focal_length", m.focal_length.map(|v| v.to_string())),
            ("aperture", m.aperture.map(|v| v.to_string())),
            ("iso", m.iso.map(|v| v.to_string())),
            ("latitude", m.latitude.map(|v| v.to_string())),
            ("longitude", m.longitude.map(|v| v.to_string())),
            ("location_name", m.location_name.clone()),
            ("width", m.width.map(|v| v.to_string())),
            ("height", m.height.map(|v| v.to_string())),
        ]
    }

    /// Digest of [`tracked_fields`](Self::tracked_fields). Two items with the
    /// same fingerprint need no metadata correction.
    pub fn fingerprint(&self) -> MetadataFingerprint {
        let mut hasher = Sha256::new();
        for (field, value) in self.tracked_fields() {
            hasher.update(field.as_bytes());
            match value {
                Some(value) => {
                    hasher.update([1u8]);
                    hasher.update((value.len() as u64).to_le_bytes());
                    hasher.update(value.as_bytes());
                }
                None => hasher.update([0u8]),
            }
        }
        let digest = hasher.finalize();
        MetadataFingerprint(digest.iter().map(|b| format!("{:02x}", b)).collect())
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ItemPage {
    pub items: Vec<MediaItem>,
    /// `None` once the listing is exhausted.
    pub next_page_token: Option<String>,
}

/// Where an upload lands on the target collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadTarget {
    /// Create a new item.
    New,
    /// Overwrite payload and metadata of an existing item in place.
    Replace { id: String },
}

/// Remote media collection trait
///
/// Implemented once per backing service (Google Photos, test doubles, ...).
/// Errors must be reported as [`BridgeError`](crate::error::BridgeError)
/// variants whose [`kind`](crate::error::BridgeError::kind) reflects whether
/// retrying can help.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::collection::RemoteCollectionClient;
///
/// async fn count(client: &dyn RemoteCollectionClient) -> Result<usize> {
///     let page = client.list_page(None).await?;
///     Ok(page.items.len())
/// }
/// ```
#[async_trait]
pub trait RemoteCollectionClient: Send + Sync {
    /// Short human-readable name used in logs.
    fn label(&self) -> &str {
        "remote"
    }

    /// Fetch one page of items. `None` requests the first page.
    async fn list_page(&self, page_token: Option<String>) -> Result<ItemPage>;

    /// Open the payload of an item as an ordered byte stream.
    async fn download_stream(&self, item_id: &str) -> Result<ChunkStream>;

    /// Consume `chunks` as the payload of `item` and write it to `target`,
    /// carrying `item`'s metadata. Returns the item as stored remotely.
    async fn upload_stream(
        &self,
        target: UploadTarget,
        chunks: ChunkStream,
        item: &MediaItem,
    ) -> Result<MediaItem>;

    /// Remove an item.
    async fn delete_item(&self, item_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> MediaItem {
        MediaItem::new("p1", "beach.jpg")
            .with_mime_type("image/jpeg")
            .with_created_time(Utc.with_ymd_and_hms(2023, 7, 1, 12, 0, 0).unwrap())
            .with_description("sunset")
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(sample().fingerprint(), sample().fingerprint());
        assert_eq!(sample().fingerprint().as_str().len(), 64);
    }

    #[test]
    fn test_fingerprint_tracks_metadata() {
        let changed = sample().with_description("sunrise");
        assert_ne!(sample().fingerprint(), changed.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_id_and_size() {
        let mut other = sample().with_size(4096);
        other.id = "p2".to_string();
        assert_eq!(sample().fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_unset_differs_from_empty() {
        let unset = MediaItem::new("p1", "a.jpg");
        let empty = MediaItem::new("p1", "a.jpg").with_description("");
        assert_ne!(unset.fingerprint(), empty.fingerprint());
    }

    #[test]
    fn test_tracked_fields_order() {
        let fields: Vec<_> = sample().tracked_fields().into_iter().map(|(f, _)| f).collect();
        assert_eq!(fields[0], "filename");
        assert!(fields.contains(&"description"));
        assert!(!fields.contains(&"size_bytes"));
    }
}
