//! Stream Subscription Catalog
//!
//! Domain types for tracking which provider subscriptions exist and which
//! strategies share them.
//!
//! # Design
//!
//! Strategies describe the stream they want with a [`StreamRequest`]. The
//! catalog turns requests into shared [`StreamHandle`]s:
//! - a request naming a known stream id gets that stream back
//! - a request equal to an existing stream's shape reuses it
//! - anything else creates a new stream with the next generated id
//!
//! This allows many strategies to watch the same markets while only one
//! upstream subscription is held open.

use std::sync::Arc;

use super::streaming::{MarketDataFilter, MarketFilter, OutputMode, StreamId, StreamKind};

/// Step between generated stream identifiers.
const STREAM_ID_STEP: u64 = 1_000;

// =============================================================================
// Stream Request
// =============================================================================

/// Description of a provider subscription a strategy wants to attach to.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    /// Explicit stream identifier; generated when `None`.
    pub stream_id: Option<StreamId>,
    /// Subscription kind.
    pub kind: StreamKind,
    /// How batches are published downstream.
    pub output_mode: OutputMode,
    /// Markets to subscribe to.
    pub market_filter: MarketFilter,
    /// Fields to request.
    pub market_data_filter: MarketDataFilter,
    /// Provider-side conflation interval in milliseconds.
    pub conflate_ms: Option<u64>,
}

impl StreamRequest {
    /// Structured market-data stream with the default data filter.
    #[must_use]
    pub fn market(market_filter: MarketFilter) -> Self {
        Self {
            stream_id: None,
            kind: StreamKind::MarketData,
            output_mode: OutputMode::Structured,
            market_filter,
            market_data_filter: MarketDataFilter::default(),
            conflate_ms: None,
        }
    }

    /// Race-data stream.
    #[must_use]
    pub fn race(market_filter: MarketFilter) -> Self {
        Self {
            kind: StreamKind::RaceData,
            ..Self::market(market_filter)
        }
    }

    /// Pin the stream identifier.
    #[must_use]
    pub fn with_stream_id(mut self, stream_id: impl Into<StreamId>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    /// Publish batches in the given mode.
    #[must_use]
    pub const fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Use a custom market-data filter.
    #[must_use]
    pub fn with_market_data_filter(mut self, filter: MarketDataFilter) -> Self {
        self.market_data_filter = filter;
        self
    }

    #[must_use]
    pub const fn with_conflate_ms(mut self, conflate_ms: u64) -> Self {
        self.conflate_ms = Some(conflate_ms);
        self
    }
}

// =============================================================================
// Stream Handle
// =============================================================================

/// One provider subscription, shared by every strategy attached to it.
///
/// The identifier stays the same across reconnects.
#[derive(Debug, PartialEq)]
pub struct StreamHandle {
    id: StreamId,
    kind: StreamKind,
    output_mode: OutputMode,
    market_filter: MarketFilter,
    market_data_filter: MarketDataFilter,
    conflate_ms: Option<u64>,
}

impl StreamHandle {
    fn from_request(id: StreamId, request: StreamRequest) -> Self {
        Self {
            id,
            kind: request.kind,
            output_mode: request.output_mode,
            market_filter: request.market_filter,
            market_data_filter: request.market_data_filter,
            conflate_ms: request.conflate_ms,
        }
    }

    /// Stream identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Subscription kind.
    #[must_use]
    pub const fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Output mode of the stream's relay.
    #[must_use]
    pub const fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Market filter sent on subscribe.
    #[must_use]
    pub const fn market_filter(&self) -> &MarketFilter {
        &self.market_filter
    }

    /// Market-data filter sent on subscribe.
    #[must_use]
    pub const fn market_data_filter(&self) -> &MarketDataFilter {
        &self.market_data_filter
    }

    /// Conflation interval in milliseconds.
    #[must_use]
    pub const fn conflate_ms(&self) -> Option<u64> {
        self.conflate_ms
    }

    /// Whether a request describes the same subscription as this handle.
    fn matches(&self, request: &StreamRequest) -> bool {
        self.kind == request.kind
            && self.output_mode == request.output_mode
            && self.market_filter == request.market_filter
            && self.market_data_filter == request.market_data_filter
            && self.conflate_ms == request.conflate_ms
    }
}

// =============================================================================
// Stream Catalog
// =============================================================================

/// Catalog of every stream requested during registration.
///
/// # Example
///
/// ```rust
/// use market_stream_router::domain::streaming::MarketFilter;
/// use market_stream_router::domain::subscription::{StreamCatalog, StreamRequest};
///
/// let mut catalog = StreamCatalog::new();
///
/// // First request creates stream "1000"
/// let a = catalog.attach(StreamRequest::market(MarketFilter::market_ids(["1.1"])));
/// assert_eq!(a.id(), "1000");
///
/// // Same shape reuses it
/// let b = catalog.attach(StreamRequest::market(MarketFilter::market_ids(["1.1"])));
/// assert_eq!(b.id(), "1000");
///
/// // Different markets get their own stream
/// let c = catalog.attach(StreamRequest::market(MarketFilter::market_ids(["1.2"])));
/// assert_eq!(c.id(), "2000");
/// assert_eq!(catalog.len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct StreamCatalog {
    handles: Vec<Arc<StreamHandle>>,
    last_generated: u64,
}

impl StreamCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stream matching the request, creating it if needed.
    pub fn attach(&mut self, request: StreamRequest) -> Arc<StreamHandle> {
        if let Some(id) = request.stream_id.as_deref()
            && let Some(existing) = self.get(id)
        {
            return existing;
        }

        if request.stream_id.is_none()
            && let Some(existing) = self.handles.iter().find(|h| h.matches(&request))
        {
            return Arc::clone(existing);
        }

        let id = match request.stream_id.clone() {
            Some(id) => id,
            None => self.next_stream_id(),
        };
        let handle = Arc::new(StreamHandle::from_request(id, request));
        tracing::debug!(
            stream_id = handle.id(),
            kind = handle.kind().as_str(),
            "Stream added to catalog"
        );
        self.handles.push(Arc::clone(&handle));
        handle
    }

    /// Look up a stream by identifier.
    #[must_use]
    pub fn get(&self, stream_id: &str) -> Option<Arc<StreamHandle>> {
        self.handles.iter().find(|h| h.id() == stream_id).cloned()
    }

    /// All streams, in creation order.
    #[must_use]
    pub fn handles(&self) -> &[Arc<StreamHandle>] {
        &self.handles
    }

    /// Number of streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no stream has been requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn next_stream_id(&mut self) -> StreamId {
        loop {
            self.last_generated += STREAM_ID_STEP;
            let candidate = self.last_generated.to_string();
            if self.get(&candidate).is_none() {
                return candidate;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
