//! Strategy Contract
//!
//! The unit of decision logic fed by the dispatcher. A strategy declares
//! the stream it wants through its [`StrategyConfig`], may attach further
//! streams from its `start` hook, and receives only updates from the
//! streams it is attached to.
//!
//! # Lifecycle
//!
//! ```text
//! Constructed ──start()──► Started ──(check_market_book, process_*)*──► finish() ──► Finished
//! ```
//!
//! `start` runs once at registration, `finish` once at orderly shutdown.

use std::any::Any;
use std::sync::Arc;

use super::streaming::{
    MarketBook, MarketDataFilter, MarketFilter, OrderSnapshot, OutputMode, RaceCard, Record,
    StreamId, StreamKind,
};
use super::subscription::{StreamCatalog, StreamHandle, StreamRequest};

// =============================================================================
// Errors
// =============================================================================

/// Result type for strategy hooks.
pub type StrategyResult<T> = Result<T, StrategyError>;

/// Error raised by a strategy hook.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    /// A hook rejected its input.
    #[error("{hook} failed: {message}")]
    Hook {
        /// Hook that failed.
        hook: &'static str,
        /// Failure description.
        message: String,
    },

    /// A hook panicked. The panic was caught at the dispatch boundary.
    #[error("{hook} panicked: {message}")]
    Panicked {
        /// Hook that panicked.
        hook: &'static str,
        /// Panic message, when the payload carried one.
        message: String,
    },

    /// Any other failure.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StrategyError {
    /// Create a hook failure.
    #[must_use]
    pub fn hook(hook: &'static str, message: impl Into<String>) -> Self {
        Self::Hook {
            hook,
            message: message.into(),
        }
    }

    /// Create a failure from a caught panic payload.
    #[must_use]
    pub fn panicked(hook: &'static str, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panicked { hook, message }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Static settings a strategy is registered with.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    name: String,
    /// Pinned identifier of the default stream; generated when `None`.
    pub stream_id: Option<StreamId>,
    /// Markets the default stream subscribes to.
    pub market_filter: MarketFilter,
    /// Fields the default stream requests.
    pub market_data_filter: MarketDataFilter,
    /// Kind of the default stream.
    pub stream_kind: StreamKind,
    /// How the default stream's batches are published.
    pub output_mode: OutputMode,
    /// Provider-side conflation interval in milliseconds.
    pub conflate_ms: Option<u64>,
}

impl StrategyConfig {
    /// Create settings with the default data filter on a market-data stream.
    #[must_use]
    pub fn new(name: impl Into<String>, market_filter: MarketFilter) -> Self {
        Self {
            name: name.into(),
            stream_id: None,
            market_filter,
            market_data_filter: MarketDataFilter::default(),
            stream_kind: StreamKind::MarketData,
            output_mode: OutputMode::Structured,
            conflate_ms: None,
        }
    }

    /// Strategy display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pin the default stream's identifier.
    #[must_use]
    pub fn with_stream_id(mut self, stream_id: impl Into<StreamId>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    /// Use a custom market-data filter.
    #[must_use]
    pub fn with_market_data_filter(mut self, filter: MarketDataFilter) -> Self {
        self.market_data_filter = filter;
        self
    }

    /// Consume a different stream kind.
    #[must_use]
    pub const fn with_stream_kind(mut self, kind: StreamKind) -> Self {
        self.stream_kind = kind;
        self
    }

    /// Receive batches in the given output mode.
    #[must_use]
    pub const fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Request provider-side conflation.
    #[must_use]
    pub const fn with_conflate_ms(mut self, conflate_ms: u64) -> Self {
        self.conflate_ms = Some(conflate_ms);
        self
    }

    /// Stream request describing the strategy's default stream.
    #[must_use]
    pub fn stream_request(&self) -> StreamRequest {
        StreamRequest {
            stream_id: self.stream_id.clone(),
            kind: self.stream_kind,
            output_mode: self.output_mode,
            market_filter: self.market_filter.clone(),
            market_data_filter: self.market_data_filter.clone(),
            conflate_ms: self.conflate_ms,
        }
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Lifecycle state of a registered strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Built but not yet started.
    Constructed,
    /// Start hook has run; receiving updates.
    Started,
    /// Finish hook has run.
    Finished,
}

/// Handed to [`Strategy::start`]; the only way to attach extra streams.
pub struct StartContext<'a> {
    catalog: &'a mut StreamCatalog,
    attached: &'a mut Vec<Arc<StreamHandle>>,
}

impl<'a> StartContext<'a> {
    pub(crate) const fn new(
        catalog: &'a mut StreamCatalog,
        attached: &'a mut Vec<Arc<StreamHandle>>,
    ) -> Self {
        Self { catalog, attached }
    }

    /// Attach the strategy to another stream, creating it if needed.
    ///
    /// Attaching the same stream twice is a no-op.
    pub fn subscribe(&mut self, request: StreamRequest) -> Arc<StreamHandle> {
        let handle = self.catalog.attach(request);
        if !self.attached.iter().any(|h| h.id() == handle.id()) {
            self.attached.push(Arc::clone(&handle));
        }
        handle
    }

    /// Identifiers of the streams attached so far.
    #[must_use]
    pub fn stream_ids(&self) -> Vec<&str> {
        self.attached.iter().map(|h| h.id()).collect()
    }
}

// =============================================================================
// Strategy Trait
// =============================================================================

/// Contract every strategy implements.
///
/// All hooks except [`Strategy::config`] have no-op defaults. Hooks are
/// invoked synchronously on the dispatcher task, so they should return
/// quickly.
pub trait Strategy: Send {
    /// Registration settings.
    fn config(&self) -> &StrategyConfig;

    /// Display name, taken from the config.
    fn name(&self) -> &str {
        self.config().name()
    }

    /// Called once at registration. May attach additional streams.
    fn start(&mut self, _ctx: &mut StartContext<'_>) -> StrategyResult<()> {
        Ok(())
    }

    /// Gating predicate; `process_market_book` only runs if this is `true`.
    fn check_market_book(&mut self, _market_book: &MarketBook<'_>) -> StrategyResult<bool> {
        Ok(false)
    }

    /// Process a market book that passed the gate.
    fn process_market_book(&mut self, _market_book: &MarketBook<'_>) -> StrategyResult<()> {
        Ok(())
    }

    /// Process a race card update.
    fn process_race_card(&mut self, _race_card: &RaceCard<'_>) -> StrategyResult<()> {
        Ok(())
    }

    /// Process a current orders snapshot.
    fn process_orders(&mut self, _orders: &OrderSnapshot) -> StrategyResult<()> {
        Ok(())
    }

    /// Process one undecoded datum from a raw-mode stream.
    fn process_raw_data(&mut self, _publish_time: i64, _datum: &Record) -> StrategyResult<()> {
        Ok(())
    }

    /// Called once at orderly shutdown.
    fn finish(&mut self) -> StrategyResult<()> {
        Ok(())
    }
}
