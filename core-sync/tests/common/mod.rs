//! In-memory collection used by the sync workflow tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_traits::error::Result;
use bridge_traits::{
    BridgeError, ChunkStream, ItemPage, MediaItem, RemoteCollectionClient, UploadTarget,
};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Orders calls across every collection in the process.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Download,
    Upload,
    Delete,
}

/// An injected failure, turned into a fresh `BridgeError` on each use.
#[derive(Debug, Clone)]
pub enum Fault {
    Auth,
    RateLimited(Option<Duration>),
    Transient,
    Permanent(&'static str),
}

impl Fault {
    fn to_error(&self) -> BridgeError {
        match self {
            Fault::Auth => BridgeError::Auth("token expired".to_string()),
            Fault::RateLimited(retry_after) => BridgeError::RateLimited {
                message: "quota exceeded".to_string(),
                retry_after: *retry_after,
            },
            Fault::Transient => BridgeError::Transient("connection reset".to_string()),
            Fault::Permanent(message) => BridgeError::Permanent(message.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub id: Option<String>,
    pub at: Instant,
    pub seq: u64,
}

/// Bytes pulled from downloads versus bytes handed to uploads.
#[derive(Debug, Default)]
pub struct FlowGauge {
    produced: AtomicU64,
    consumed: AtomicU64,
    peak_outstanding: AtomicU64,
    largest_chunk: AtomicUsize,
}

impl FlowGauge {
    fn produce(&self, n: usize) {
        let produced = self.produced.fetch_add(n as u64, Ordering::SeqCst) + n as u64;
        let outstanding = produced.saturating_sub(self.consumed.load(Ordering::SeqCst));
        self.peak_outstanding.fetch_max(outstanding, Ordering::SeqCst);
    }

    fn consume(&self, n: usize) {
        self.consumed.fetch_add(n as u64, Ordering::SeqCst);
        self.largest_chunk.fetch_max(n, Ordering::SeqCst);
    }

    pub fn peak_outstanding(&self) -> u64 {
        self.peak_outstanding.load(Ordering::SeqCst)
    }

    pub fn largest_chunk(&self) -> usize {
        self.largest_chunk.load(Ordering::SeqCst)
    }

    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct State {
    items: BTreeMap<String, MediaItem>,
    received: HashMap<String, u64>,
    faults: HashMap<(Op, Option<String>), VecDeque<Fault>>,
    calls: Vec<Call>,
    upload_completions: Vec<(String, u64)>,
}

/// A collection held in memory. Payloads are synthesized from each item's
/// `size_bytes` and streamed in `piece_size` pieces.
pub struct MemoryCollection {
    label: String,
    page_size: usize,
    piece_size: usize,
    latency: Duration,
    state: Mutex<State>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    gauge: Arc<FlowGauge>,
}

impl MemoryCollection {
    pub fn new(label: &str, items: Vec<MediaItem>) -> Self {
        let mut state = State::default();
        for item in items {
            state.items.insert(item.id.clone(), item);
        }
        Self {
            label: label.to_string(),
            page_size: 2,
            piece_size: 1024,
            latency: Duration::ZERO,
            state: Mutex::new(state),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            gauge: Arc::new(FlowGauge::default()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_piece_size(mut self, piece_size: usize) -> Self {
        self.piece_size = piece_size;
        self
    }

    /// Delay applied inside every upload and delete.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<FlowGauge>) -> Self {
        self.gauge = gauge;
        self
    }

    /// Fail the next `times` calls of `op` on `id` (or on any id when `None`).
    pub fn inject(&self, op: Op, id: Option<&str>, fault: Fault, times: usize) {
        let mut state = self.state.lock().unwrap();
        let queue = state
            .faults
            .entry((op, id.map(str::to_string)))
            .or_default();
        for _ in 0..times {
            queue.push_back(fault.clone());
        }
    }

    pub fn ids(&self) -> Vec<String> {
        self.state.lock().unwrap().items.keys().cloned().collect()
    }

    pub fn item(&self, id: &str) -> Option<MediaItem> {
        self.state.lock().unwrap().items.get(id).cloned()
    }

    pub fn received_bytes(&self, id: &str) -> Option<u64> {
        self.state.lock().unwrap().received.get(id).copied()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_of(&self, op: Op) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    /// Sequence numbers at which uploads finished.
    pub fn upload_completions(&self) -> Vec<(String, u64)> {
        self.state.lock().unwrap().upload_completions.clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, op: Op, id: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            op,
            id: id.map(str::to_string),
            at: Instant::now(),
            seq: next_seq(),
        });

        for key in [(op, id.map(str::to_string)), (op, None)] {
            if let Some(queue) = state.faults.get_mut(&key) {
                if let Some(fault) = queue.pop_front() {
                    return Err(fault.to_error());
                }
            }
        }
        Ok(())
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(&self.in_flight)
    }

    fn payload(&self, size: u64) -> ChunkStream {
        let piece_size = self.piece_size as u64;
        let gauge = Arc::clone(&self.gauge);
        stream::unfold(0u64, move |offset| {
            let gauge = Arc::clone(&gauge);
            async move {
                if offset >= size {
                    return None;
                }
                let len = piece_size.min(size - offset) as usize;
                gauge.produce(len);
                Some((Ok(Bytes::from(vec![(offset % 251) as u8; len])), offset + len as u64))
            }
        })
        .boxed()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl RemoteCollectionClient for MemoryCollection {
    fn label(&self) -> &str {
        &self.label
    }

    async fn list_page(&self, page_token: Option<String>) -> Result<ItemPage> {
        self.record(Op::List, None)?;
        let offset: usize = match page_token {
            Some(token) => token
                .parse()
                .map_err(|_| BridgeError::Permanent(format!("bad page token {token}")))?,
            None => 0,
        };
        let state = self.state.lock().unwrap();
        let items: Vec<MediaItem> = state
            .items
            .values()
            .skip(offset)
            .take(self.page_size)
            .cloned()
            .collect();
        let next = offset + items.len();
        Ok(ItemPage {
            items,
            next_page_token: (next < state.items.len()).then(|| next.to_string()),
        })
    }

    async fn download_stream(&self, item_id: &str) -> Result<ChunkStream> {
        self.record(Op::Download, Some(item_id))?;
        let size = self
            .item(item_id)
            .ok_or_else(|| BridgeError::NotFound(item_id.to_string()))?
            .size_bytes
            .unwrap_or(0);
        Ok(self.payload(size))
    }

    async fn upload_stream(
        &self,
        target: UploadTarget,
        mut chunks: ChunkStream,
        item: &MediaItem,
    ) -> Result<MediaItem> {
        let _guard = self.enter();
        self.record(Op::Upload, Some(&item.id))?;
        if let UploadTarget::Replace { id } = &target {
            if self.item(id).is_none() {
                return Err(BridgeError::NotFound(id.clone()));
            }
        }

        let mut received = 0u64;
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            self.gauge.consume(chunk.len());
            received += chunk.len() as u64;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let stored = item.clone().with_size(received);
        let mut state = self.state.lock().unwrap();
        state.items.insert(stored.id.clone(), stored.clone());
        state.received.insert(stored.id.clone(), received);
        state.upload_completions.push((stored.id.clone(), next_seq()));
        Ok(stored)
    }

    async fn delete_item(&self, item_id: &str) -> Result<()> {
        let _guard = self.enter();
        self.record(Op::Delete, Some(item_id))?;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.state
            .lock()
            .unwrap()
            .items
            .remove(item_id)
            .map(|_| ())
            .ok_or_else(|| BridgeError::NotFound(item_id.to_string()))
    }
}

pub fn photo(id: &str) -> MediaItem {
    MediaItem::new(id, format!("{id}.jpg"))
        .with_mime_type("image/jpeg")
        .with_size(4096)
}
