//! # Google Photos Provider
//!
//! Implements `RemoteCollectionClient` for the Google Photos Library API v1.
//!
//! ## Overview
//!
//! This module provides:
//! - Paginated listing of the library's media items
//! - EXIF and dimension metadata parsing
//! - Streaming downloads through each item's `baseUrl`
//! - Resumable chunked uploads followed by `mediaItems:batchCreate`
//! - Classification of HTTP failures into retryable and fatal errors
//!
//! Requests go through the injected `HttpClient`, one attempt per call.
//! Retrying is left to the sync engine.

pub mod connector;
pub mod error;
pub mod types;

pub use connector::GooglePhotosConnector;
pub use error::{GooglePhotosError, Result};
