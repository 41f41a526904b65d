//! Google Photos API request and response types
//!
//! Data structures for the Photos Library API v1 `mediaItems` resource.

use serde::{Deserialize, Serialize};

/// Google Photos API media item resource
///
/// See: https://developers.google.com/photos/library/reference/rest/v1/mediaItems#MediaItem
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotosMediaItem {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,

    /// Short-lived URL for the item's bytes; valid for about an hour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default)]
    pub mime_type: String,

    #[serde(default)]
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_metadata: Option<PhotosMediaMetadata>,
}

/// Creation time, dimensions and the photo or video specific block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotosMediaMetadata {
    /// RFC 3339 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,

    /// Pixels, encoded as an int64 string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoExif>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoExif {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aperture_f_number: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso_equivalent: Option<u32>,
}

/// Google Photos API mediaItems.list response
///
/// See: https://developers.google.com/photos/library/reference/rest/v1/mediaItems/list
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItemsListResponse {
    /// Absent on an empty library
    #[serde(default)]
    pub media_items: Vec<PhotosMediaItem>,

    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Google Photos API mediaItems.batchCreate request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateRequest {
    pub new_media_items: Vec<NewMediaItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub simple_media_item: SimpleMediaItem,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleMediaItem {
    pub upload_token: String,
    pub file_name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCreateResponse {
    #[serde(default)]
    pub new_media_item_results: Vec<NewMediaItemResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMediaItemResult {
    #[serde(default)]
    pub upload_token: Option<String>,
    #[serde(default)]
    pub status: Option<ApiStatus>,
    #[serde(default)]
    pub media_item: Option<PhotosMediaItem>,
}

/// `google.rpc.Status`; a zero or missing code means success
#[derive(Debug, Default, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: Option<String>,
}
