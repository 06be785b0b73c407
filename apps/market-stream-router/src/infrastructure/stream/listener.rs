//! Stream Listener
//!
//! Receives decoded batches from the provider's read path, keeps the live
//! market cache of one stream up to date, and hands every batch to the
//! stream's internal queue. It never performs I/O; the only await is on the
//! bounded queue, so a slow relay throttles the provider read loop.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::application::ports::{BatchListener, ListenerError};
use crate::domain::cache::MarketCache;
use crate::domain::streaming::{RawBatch, Record, ResumeTokens, StreamId, StreamKind};
use crate::infrastructure::metrics;

#[derive(Debug, Default)]
struct ListenerState {
    cache: MarketCache,
    tokens: ResumeTokens,
}

/// Per-stream listener.
#[derive(Debug)]
pub struct StreamListener {
    stream_id: StreamId,
    kind: StreamKind,
    output: mpsc::Sender<RawBatch>,
    state: Mutex<ListenerState>,
    batches_received: AtomicU64,
    updates_processed: AtomicU64,
}

impl StreamListener {
    /// Create a listener for a stream of the given kind.
    #[must_use]
    pub fn new(
        stream_id: impl Into<StreamId>,
        kind: StreamKind,
        output: mpsc::Sender<RawBatch>,
    ) -> Self {
        Self {
            stream_id: stream_id.into(),
            kind,
            output,
            state: Mutex::new(ListenerState::default()),
            batches_received: AtomicU64::new(0),
            updates_processed: AtomicU64::new(0),
        }
    }

    /// Create a listener from a provider subscription name.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::UnsupportedStream`] for order subscriptions
    /// and unknown subscription names.
    pub fn for_subscription(
        stream_id: impl Into<StreamId>,
        subscription_name: &str,
        output: mpsc::Sender<RawBatch>,
    ) -> Result<Self, ListenerError> {
        let kind = StreamKind::from_subscription(subscription_name)?;
        Ok(Self::new(stream_id, kind, output))
    }

    /// Stream identifier.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Subscription kind.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Last acknowledged initial clock.
    #[must_use]
    pub fn initial_clk(&self) -> Option<String> {
        self.state.lock().tokens.initial_clk.clone()
    }

    /// Last acknowledged clock.
    #[must_use]
    pub fn clk(&self) -> Option<String> {
        self.state.lock().tokens.clk.clone()
    }

    /// Snapshot of both resume tokens.
    #[must_use]
    pub fn resume_tokens(&self) -> ResumeTokens {
        self.state.lock().tokens.clone()
    }

    /// Number of live markets.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.state.lock().cache.len()
    }

    /// Whether the market is currently live.
    #[must_use]
    pub fn is_live(&self, market_id: &str) -> bool {
        self.state.lock().cache.contains(market_id)
    }

    /// Batches handed downstream, empty heartbeats included.
    #[must_use]
    pub fn batches_received(&self) -> u64 {
        self.batches_received.load(Ordering::Relaxed)
    }

    /// Total records seen. Grows by the batch length on every delivery.
    #[must_use]
    pub fn updates_processed(&self) -> u64 {
        self.updates_processed.load(Ordering::Relaxed)
    }

    fn update_cache(&self, records: &[Record]) {
        let mut state = self.state.lock();
        for record in records {
            let Some(market_id) = self.kind.market_id(record) else {
                continue;
            };

            if self.kind.is_closed(record) {
                if state.cache.remove(market_id) {
                    tracing::info!(
                        stream_id = %self.stream_id,
                        market_id,
                        cache_size = state.cache.len(),
                        "Market closed, removed from cache"
                    );
                }
            } else if state.cache.add(market_id) {
                tracing::info!(
                    stream_id = %self.stream_id,
                    market_id,
                    cache_size = state.cache.len(),
                    "New market added to cache"
                );
            }
        }
        metrics::set_live_markets(&self.stream_id, state.cache.len());
    }
}

#[async_trait]
impl BatchListener for StreamListener {
    async fn on_batch(&self, records: Vec<Record>, publish_time: i64) -> Result<(), ListenerError> {
        self.update_cache(&records);

        let count = records.len();
        let batch = RawBatch::new(self.stream_id.clone(), publish_time, records);
        self.output
            .send(batch)
            .await
            .map_err(|_| ListenerError::OutputClosed(self.stream_id.clone()))?;

        self.batches_received.fetch_add(1, Ordering::Relaxed);
        self.updates_processed
            .fetch_add(count as u64, Ordering::Relaxed);
        metrics::record_batch_received(&self.stream_id, count);
        Ok(())
    }

    fn on_clock(&self, initial_clk: Option<String>, clk: Option<String>) {
        let mut state = self.state.lock();
        if initial_clk.is_some() {
            state.tokens.initial_clk = initial_clk;
        }
        if clk.is_some() {
            state.tokens.clk = clk;
        }
    }
}
