//! Google Photos API connector implementation
//!
//! Implements the `RemoteCollectionClient` trait for the Photos Library API v1.

use async_trait::async_trait;
use bridge_traits::collection::{
    ChunkStream, ItemPage, MediaItem, MediaMetadata, RemoteCollectionClient, UploadTarget,
};
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, instrument, warn};

use crate::error::GooglePhotosError;
use crate::types::{
    BatchCreateRequest, BatchCreateResponse, MediaItemsListResponse, NewMediaItem,
    PhotosMediaItem, SimpleMediaItem,
};

/// Google Photos Library API base URL
const PHOTOS_API_BASE: &str = "https://photoslibrary.googleapis.com/v1";

/// Upload endpoint for raw and resumable byte uploads
const UPLOAD_URL: &str = "https://photoslibrary.googleapis.com/v1/uploads";

/// Maximum results per page (Library API limit)
const PAGE_SIZE: u32 = 100;

const API_TIMEOUT: Duration = Duration::from_secs(30);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(60);

/// Read buffer for download streams
const DOWNLOAD_BUFFER: usize = 64 * 1024;

/// Chunk granularity assumed when the session does not announce one.
/// Every non-final upload must be a multiple of it.
const DEFAULT_UPLOAD_GRANULARITY: usize = 256 * 1024;

/// An open resumable upload session.
#[derive(Debug)]
struct UploadSession {
    url: String,
    granularity: usize,
}

/// Google Photos API connector
///
/// Implements `RemoteCollectionClient` for one Google Photos account.
///
/// # Features
///
/// - Paginated listing of every media item in the library
/// - EXIF metadata (camera, focal length, aperture, ISO) and dimensions
/// - Streaming downloads of original bytes via `baseUrl`
/// - Resumable uploads sent one chunk per request
///
/// # Limitations
///
/// The Library API cannot replace an item's bytes or delete items. A
/// replacement is uploaded as a new item and deletion fails permanently.
///
/// # Example
///
/// ```ignore
/// use provider_google_photos::GooglePhotosConnector;
/// use bridge_traits::RemoteCollectionClient;
///
/// let connector = GooglePhotosConnector::new(http_client, access_token);
/// let page = connector.list_page(None).await?;
/// ```
pub struct GooglePhotosConnector {
    http_client: Arc<dyn HttpClient>,

    /// OAuth 2.0 access token
    access_token: String,

    /// Account name shown in logs and results
    label: String,
}

impl GooglePhotosConnector {
    /// Create a new Google Photos connector
    ///
    /// # Arguments
    ///
    /// * `http_client` - HTTP client implementation
    /// * `access_token` - OAuth 2.0 access token with the
    ///   `photoslibrary.readonly` scope for a source or `photoslibrary.appendonly`
    ///   for a target
    pub fn new(http_client: Arc<dyn HttpClient>, access_token: String) -> Self {
        Self {
            http_client,
            access_token,
            label: "google-photos".to_string(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    fn api_request(&self, method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest::new(method, url)
            .bearer_token(self.access_token.as_str())
            .header("Accept", "application/json")
            .timeout(API_TIMEOUT)
    }

    /// Execute one request, turning non-2xx responses into classified errors.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self.http_client.execute(request).await?;
        Self::check(response)
    }

    fn check(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            debug!(status = response.status, "API request succeeded");
            Ok(response)
        } else {
            warn!(status = response.status, "API request failed");
            Err(GooglePhotosError::from_response(&response).into())
        }
    }

    fn parse_json<T: serde::de::DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| {
            GooglePhotosError::ParseError(format!("Failed to parse {}: {}", what, e)).into()
        })
    }

    fn parse_timestamp(rfc3339: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(rfc3339)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Convert PhotosMediaItem to MediaItem
    fn convert_item(item: PhotosMediaItem) -> MediaItem {
        let media = item.media_metadata.unwrap_or_default();
        let exif = media.photo.unwrap_or_default();

        let metadata = MediaMetadata {
            description: item.description,
            camera_make: exif.camera_make,
            camera_model: exif.camera_model,
            focal_length: exif.focal_length,
            aperture: exif.aperture_f_number,
            iso: exif.iso_equivalent,
            width: media.width.and_then(|w| w.parse().ok()),
            height: media.height.and_then(|h| h.parse().ok()),
            ..MediaMetadata::default()
        };

        MediaItem {
            id: item.id,
            filename: item.filename,
            created_time: media.creation_time.as_deref().and_then(Self::parse_timestamp),
            mime_type: item.mime_type,
            size_bytes: None,
            metadata,
        }
    }

    async fn get_item(&self, item_id: &str) -> Result<PhotosMediaItem> {
        let url = format!(
            "{}/mediaItems/{}",
            PHOTOS_API_BASE,
            urlencoding::encode(item_id)
        );
        let response = self
            .http_client
            .execute(self.api_request(HttpMethod::Get, url))
            .await?;
        if response.status == 404 {
            return Err(GooglePhotosError::ItemNotFound {
                item_id: item_id.to_string(),
            }
            .into());
        }
        Self::parse_json(&Self::check(response)?, "media item")
    }

    /// Open a resumable upload session.
    async fn start_upload(&self, item: &MediaItem) -> Result<UploadSession> {
        let request = HttpRequest::new(HttpMethod::Post, UPLOAD_URL)
            .bearer_token(self.access_token.as_str())
            .header("Content-Length", "0")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Content-Type", item.mime_type.as_str())
            .header("X-Goog-Upload-File-Name", item.filename.as_str())
            .header("X-Goog-Upload-Protocol", "resumable")
            .timeout(API_TIMEOUT);
        let request = match item.size_bytes {
            Some(size) => request.header("X-Goog-Upload-Raw-Size", size.to_string()),
            None => request,
        };

        let response = self.send(request).await?;
        let url = response
            .header("X-Goog-Upload-URL")
            .map(str::to_string)
            .ok_or_else(|| {
                GooglePhotosError::UploadFailed("missing X-Goog-Upload-URL".to_string())
            })?;
        let granularity = response
            .header("X-Goog-Upload-Chunk-Granularity")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_UPLOAD_GRANULARITY);

        Ok(UploadSession { url, granularity })
    }

    /// Stream chunks into the session and return the upload token.
    ///
    /// Incoming chunks are re-aligned to the session granularity: each
    /// `upload` carries the largest aligned prefix of what has arrived, and
    /// the unaligned tail (always shorter than one granule) rides with the
    /// final `upload, finalize`.
    async fn upload_chunks(
        &self,
        session: &UploadSession,
        mut chunks: ChunkStream,
    ) -> Result<String> {
        let mut offset = 0u64;
        let mut pending = BytesMut::new();

        while let Some(chunk) = chunks.try_next().await? {
            pending.extend_from_slice(&chunk);
            let aligned = pending.len() - pending.len() % session.granularity;
            if aligned == 0 {
                continue;
            }
            let body = pending.split_to(aligned).freeze();
            self.upload_command(session, "upload", offset, body).await?;
            offset += aligned as u64;
        }

        let tail = pending.freeze();
        let command = if tail.is_empty() {
            "finalize"
        } else {
            "upload, finalize"
        };
        let len = tail.len() as u64;
        let response = self.upload_command(session, command, offset, tail).await?;
        offset += len;

        let token = response.text()?.trim().to_string();
        if token.is_empty() {
            return Err(GooglePhotosError::UploadFailed("empty upload token".to_string()).into());
        }
        debug!(bytes = offset, "Upload finalized");
        Ok(token)
    }

    async fn upload_command(
        &self,
        session: &UploadSession,
        command: &str,
        offset: u64,
        body: Bytes,
    ) -> Result<HttpResponse> {
        let request = HttpRequest::new(HttpMethod::Post, session.url.as_str())
            .bearer_token(self.access_token.as_str())
            .header("X-Goog-Upload-Command", command)
            .header("X-Goog-Upload-Offset", offset.to_string())
            .body(body)
            .timeout(TRANSFER_TIMEOUT);
        self.send(request).await
    }

    async fn create_media_item(&self, upload_token: String, item: &MediaItem) -> Result<MediaItem> {
        let body = BatchCreateRequest {
            new_media_items: vec![NewMediaItem {
                description: item.metadata.description.clone(),
                simple_media_item: SimpleMediaItem {
                    upload_token,
                    file_name: item.filename.clone(),
                },
            }],
        };
        let url = format!("{}/mediaItems:batchCreate", PHOTOS_API_BASE);
        let request = self.api_request(HttpMethod::Post, url).json(&body)?;

        let response = self.send(request).await?;
        let created: BatchCreateResponse = Self::parse_json(&response, "batchCreate response")?;
        let result = created
            .new_media_item_results
            .into_iter()
            .next()
            .ok_or_else(|| GooglePhotosError::UploadFailed("no media items created".to_string()))?;

        if let Some(status) = result.status.filter(|s| s.code != 0) {
            return Err(GooglePhotosError::UploadFailed(format!(
                "media item creation failed (code {}): {}",
                status.code,
                status.message.unwrap_or_default()
            ))
            .into());
        }
        let media_item = result
            .media_item
            .ok_or_else(|| GooglePhotosError::UploadFailed("result has no media item".to_string()))?;
        Ok(Self::convert_item(media_item))
    }
}

#[async_trait]
impl RemoteCollectionClient for GooglePhotosConnector {
    fn label(&self) -> &str {
        &self.label
    }

    #[instrument(skip(self), fields(account = %self.label))]
    async fn list_page(&self, page_token: Option<String>) -> Result<ItemPage> {
        let mut url = format!("{}/mediaItems?pageSize={}", PHOTOS_API_BASE, PAGE_SIZE);
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(&token)));
        }

        let response = self.send(self.api_request(HttpMethod::Get, url)).await?;
        let list: MediaItemsListResponse = Self::parse_json(&response, "media items list")?;

        let items: Vec<MediaItem> = list.media_items.into_iter().map(Self::convert_item).collect();
        debug!("Listed {} media items", items.len());

        Ok(ItemPage {
            items,
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    #[instrument(skip(self), fields(account = %self.label))]
    async fn download_stream(&self, item_id: &str) -> Result<ChunkStream> {
        // baseUrl expires, so fetch a fresh one for every download.
        let item = self.get_item(item_id).await?;
        let base_url = item.base_url.ok_or_else(|| {
            GooglePhotosError::ApiError {
                status_code: 200,
                message: format!("media item {} has no baseUrl", item_id),
            }
        })?;
        let suffix = if item.mime_type.starts_with("video/") {
            "=dv"
        } else {
            "=d"
        };

        let request = HttpRequest::new(HttpMethod::Get, format!("{}{}", base_url, suffix))
            .timeout(TRANSFER_TIMEOUT);
        let reader = self.http_client.download_stream(request).await?;
        info!(mime_type = %item.mime_type, "Streaming original bytes");

        Ok(ReaderStream::with_capacity(reader, DOWNLOAD_BUFFER)
            .map_err(BridgeError::from)
            .boxed())
    }

    #[instrument(skip(self, chunks, item), fields(account = %self.label, item_id = %item.id))]
    async fn upload_stream(
        &self,
        target: UploadTarget,
        chunks: ChunkStream,
        item: &MediaItem,
    ) -> Result<MediaItem> {
        let session = self.start_upload(item).await?;
        let token = self.upload_chunks(&session, chunks).await?;
        let created = self.create_media_item(token, item).await?;

        if let UploadTarget::Replace { id } = target {
            warn!(
                replaced = %id,
                new_id = %created.id,
                "Library API cannot replace media; uploaded as a new item"
            );
        } else {
            info!(new_id = %created.id, "Created media item");
        }
        Ok(created)
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        warn!(account = %self.label, item_id, "Delete requested on Google Photos");
        Err(GooglePhotosError::Unsupported("Deleting media items").into())
    }
}
