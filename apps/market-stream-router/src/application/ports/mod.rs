//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `StreamingProvider`: creates provider streams (handshake, auth, framing)
//! - `ProviderStream`: one subscription on the provider connection
//!
//! ## Driver Ports (Inbound)
//!
//! - `BatchListener`: callback the provider invokes for each decoded batch

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::streaming::{
    MarketDataFilter, MarketFilter, Record, ResumeTokens, StreamId, SubscriptionKindError,
};

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by the provider client.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Connecting or authenticating failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The provider rejected or dropped the subscription.
    #[error("subscription failed: {0}")]
    Subscription(String),

    /// The stream was interrupted after it started.
    #[error("stream interrupted: {0}")]
    Interrupted(String),

    /// Anything that is not a recoverable streaming fault.
    #[error("unexpected failure: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl ProviderError {
    /// Whether the failure is a recoverable streaming fault worth retrying.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        !matches!(self, Self::Unexpected(_))
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Subscription(_) => "subscription",
            Self::Interrupted(_) => "interrupted",
            Self::Unexpected(_) => "unexpected",
        }
    }
}

/// Errors raised while building or driving a listener.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// The subscription kind cannot be consumed by a listener.
    #[error(transparent)]
    UnsupportedStream(#[from] SubscriptionKindError),

    /// The downstream queue has been closed.
    #[error("output queue closed for stream {0}")]
    OutputClosed(StreamId),
}

// =============================================================================
// Ports
// =============================================================================

/// Receives decoded batches from a provider stream.
///
/// Called on the provider's read path, so implementations must not perform
/// I/O. Awaiting is reserved for backpressure.
#[async_trait]
pub trait BatchListener: Send + Sync {
    /// Handle one decoded batch.
    async fn on_batch(&self, records: Vec<Record>, publish_time: i64) -> Result<(), ListenerError>;

    /// Record the server-acknowledged stream position.
    fn on_clock(&self, initial_clk: Option<String>, clk: Option<String>);
}

/// Factory for provider streams.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamingProvider: Send + Sync {
    /// Create a stream that delivers its batches to `listener`.
    async fn create_stream(
        &self,
        stream_id: &str,
        listener: Arc<dyn BatchListener>,
    ) -> Result<Box<dyn ProviderStream>, ProviderError>;
}

/// One subscription on the provider connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderStream: Send {
    /// Subscribe to market data, resuming from `resume` when possible.
    ///
    /// Returns the stream identifier acknowledged by the provider.
    async fn subscribe_to_markets(
        &mut self,
        market_filter: &MarketFilter,
        market_data_filter: &MarketDataFilter,
        resume: &ResumeTokens,
        conflate_ms: Option<u64>,
    ) -> Result<StreamId, ProviderError>;

    /// Subscribe to race data.
    async fn subscribe_to_races(&mut self) -> Result<StreamId, ProviderError>;

    /// Run the stream until it disconnects or is dropped.
    async fn start(&mut self) -> Result<(), ProviderError>;
}
