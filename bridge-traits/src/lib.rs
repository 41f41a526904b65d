//! # Host Bridge Traits
//!
//! Contracts between the sync engine and the outside world.
//!
//! ## Overview
//!
//! The engine never talks to a photo service, an HTTP stack or a log file
//! directly. Each of those is a trait defined here and implemented elsewhere:
//! a provider crate for each service, `bridge-desktop` for HTTP, and the host
//! application for log forwarding.
//!
//! ## Traits
//!
//! - [`RemoteCollectionClient`](collection::RemoteCollectionClient) - List, stream, upload and delete media items
//! - [`HttpClient`](http::HttpClient) - Single-attempt async HTTP with streaming downloads
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! must pick the variant that matches the failure, because the engine's retry
//! decisions are driven entirely by [`BridgeError::kind`]:
//!
//! | Kind | Retried | Typical cause |
//! |------|---------|---------------|
//! | `Auth` | no | expired or revoked credentials |
//! | `RateLimit` | yes | HTTP 429, quota exhausted |
//! | `Transient` | yes | HTTP 5xx, timeouts, connection resets |
//! | `Permanent` | no | malformed request, missing item, unsupported operation |
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across worker tasks behind an `Arc`.

pub mod collection;
pub mod error;
pub mod http;
pub mod time;

pub use error::{BridgeError, ErrorKind};

// Re-export commonly used types
pub use collection::{
    ChunkStream, ItemPage, MediaItem, MediaMetadata, MetadataFingerprint, RemoteCollectionClient,
    UploadTarget,
};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
