//! # Transfer Engine
//!
//! Applies single plan actions against the target collection.
//!
//! Payloads are streamed: the source's byte stream is re-cut into chunks of
//! exactly `chunk_size` bytes (the last may be shorter) and handed lazily to
//! the target's upload. The upload pulls a chunk only when it is ready for
//! it, so at any moment the engine holds at most one outgoing chunk plus the
//! source piece that completed it. A retried transfer starts a fresh
//! download; a half-consumed stream cannot be rewound.

use crate::plan::{ActionKind, SyncAction};
use crate::progress::ProgressSink;
use crate::retry::RetryPolicy;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{BridgeError, ChunkStream, MediaItem, RemoteCollectionClient, UploadTarget};
use bytes::BytesMut;
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

pub struct TransferEngine {
    source: Arc<dyn RemoteCollectionClient>,
    target: Arc<dyn RemoteCollectionClient>,
    chunk_size: usize,
    retry: RetryPolicy,
    progress: Arc<dyn ProgressSink>,
}

impl TransferEngine {
    pub fn new(
        source: Arc<dyn RemoteCollectionClient>,
        target: Arc<dyn RemoteCollectionClient>,
        chunk_size: usize,
        retry: RetryPolicy,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            source,
            target,
            chunk_size: chunk_size.max(1),
            retry,
            progress,
        }
    }

    /// Run one action to resolution and return it with its final status.
    ///
    /// Failures are recorded on the action, never raised. An action cut short
    /// by cancellation is returned still `Pending`.
    #[instrument(skip(self, action, cancel), fields(kind = %action.kind, item_id = %action.item.id))]
    pub async fn apply(&self, mut action: SyncAction, cancel: &CancellationToken) -> SyncAction {
        self.progress.on_item_start(&action);

        let bytes = AtomicU64::new(0);
        let outcome = match action.kind {
            ActionKind::Add => {
                self.transfer(UploadTarget::New, &action.item, &bytes, cancel)
                    .await
            }
            ActionKind::Update => {
                let target = UploadTarget::Replace {
                    id: action.item.id.clone(),
                };
                self.transfer(target, &action.item, &bytes, cancel).await
            }
            ActionKind::Delete => {
                let target = &self.target;
                let item_id = action.item.id.as_str();
                self.retry
                    .run("delete_item", cancel, move || target.delete_item(item_id))
                    .await
            }
        };
        let bytes = bytes.load(Ordering::Relaxed);

        match outcome.result {
            Ok(()) => {
                debug!(attempts = outcome.attempts, bytes, "Action succeeded");
                action.succeed(outcome.attempts, bytes);
            }
            Err(BridgeError::Cancelled) if cancel.is_cancelled() => {
                debug!("Action interrupted by cancellation");
                action.attempts = outcome.attempts;
            }
            Err(err) => {
                warn!(attempts = outcome.attempts, kind = %err.kind(), error = %err, "Action failed");
                action.fail(&err, outcome.attempts, bytes);
                if let Some(error) = &action.error {
                    self.progress.on_action_failed(&action, error);
                }
            }
        }

        self.progress.on_item_done(&action);
        action
    }

    async fn transfer(
        &self,
        target: UploadTarget,
        item: &MediaItem,
        bytes: &AtomicU64,
        cancel: &CancellationToken,
    ) -> crate::retry::Attempted<()> {
        self.retry
            .run("transfer", cancel, move || {
                self.transfer_once(target.clone(), item, bytes, cancel)
            })
            .await
    }

    async fn transfer_once(
        &self,
        target: UploadTarget,
        item: &MediaItem,
        bytes: &AtomicU64,
        cancel: &CancellationToken,
    ) -> BridgeResult<()> {
        let download = self.source.download_stream(&item.id).await?;
        let sent = Arc::new(AtomicU64::new(0));
        let chunks = rechunk(
            download,
            self.chunk_size,
            ChunkReporter {
                item_id: item.id.clone(),
                total_bytes: item.size_bytes,
                sent: Arc::clone(&sent),
                progress: Arc::clone(&self.progress),
            },
            cancel.clone(),
        );

        let result = self.target.upload_stream(target, chunks, item).await;
        bytes.store(sent.load(Ordering::Relaxed), Ordering::Relaxed);
        result.map(|stored| {
            if stored.fingerprint() != item.fingerprint() {
                debug!(stored_id = %stored.id, "Target reports metadata that differs from source");
            }
        })
    }
}

/// Per-attempt chunk accounting handed to the rechunker.
struct ChunkReporter {
    item_id: String,
    total_bytes: Option<u64>,
    sent: Arc<AtomicU64>,
    progress: Arc<dyn ProgressSink>,
}

impl ChunkReporter {
    fn record(&self, len: usize) {
        let so_far = self.sent.fetch_add(len as u64, Ordering::Relaxed) + len as u64;
        self.progress.on_chunk(&self.item_id, so_far, self.total_bytes);
    }
}

struct RechunkState {
    input: ChunkStream,
    buffer: BytesMut,
    chunk_size: usize,
    input_done: bool,
    finished: bool,
    reporter: ChunkReporter,
    cancel: CancellationToken,
}

/// Re-cut `input` into `chunk_size` pieces, pulling from `input` only when
/// the consumer asks for the next chunk. Cancellation is observed at chunk
/// boundaries and surfaces as `BridgeError::Cancelled`.
fn rechunk(
    input: ChunkStream,
    chunk_size: usize,
    reporter: ChunkReporter,
    cancel: CancellationToken,
) -> ChunkStream {
    let state = RechunkState {
        input,
        buffer: BytesMut::new(),
        chunk_size,
        input_done: false,
        finished: false,
        reporter,
        cancel,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }
        if state.cancel.is_cancelled() {
            state.finished = true;
            return Some((Err(BridgeError::Cancelled), state));
        }

        while state.buffer.len() < state.chunk_size && !state.input_done {
            match state.input.next().await {
                Some(Ok(piece)) => state.buffer.extend_from_slice(&piece),
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                None => state.input_done = true,
            }
        }

        if state.buffer.is_empty() {
            return None;
        }

        let take = state.chunk_size.min(state.buffer.len());
        let chunk = state.buffer.split_to(take).freeze();
        state.reporter.record(chunk.len());
        Some((Ok(chunk), state))
    })
    .boxed()
}
