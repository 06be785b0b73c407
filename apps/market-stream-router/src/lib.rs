#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Stream Router - Resilient Market Data Ingestion
//!
//! Keeps provider market-data subscriptions alive across transient
//! failures, tracks which markets are live in each stream, and fans updates
//! out to registered strategies that only see the streams they attached to.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `streaming`: Batches, payload views and inbound events
//!   - `cache`: Live-market presence cache
//!   - `subscription`: Stream catalog shared by strategies
//!   - `strategy`: Strategy contract and lifecycle
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Provider stream and listener interfaces
//!   - `services`: Strategy registry, dispatcher, shared event queue
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `stream`: Listener, output relay, backoff, stream runner
//!   - `router`: Process orchestration and shutdown ordering
//!   - `config`: Environment configuration
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//! Provider ──► Listener ──► internal queue ──► Output Relay ──┐
//!   (per stream)  │                                          ├──► Event Queue ──► Dispatcher ──► Strategies
//!               Cache            order snapshots ────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::cache::MarketCache;
pub use domain::strategy::{
    LifecycleState, StartContext, Strategy, StrategyConfig, StrategyError, StrategyResult,
};
pub use domain::streaming::{
    InboundEvent, MarketBook, MarketDataFilter, MarketFilter, MarketId, OrderSnapshot, OutputMode,
    RaceCard, RawBatch, Record, ResumeTokens, StreamId, StreamKind, SubscriptionKindError,
};
pub use domain::subscription::{StreamCatalog, StreamHandle, StreamRequest};

// Ports
pub use application::ports::{
    BatchListener, ListenerError, ProviderError, ProviderStream, StreamingProvider,
};

// Services
pub use application::services::{
    DispatchOutcome, Dispatcher, EventQueue, EventReceiver, QueueError, RegistryError,
    StrategyRegistration, StrategyRegistry, event_queue,
};

// Streams
pub use infrastructure::stream::{
    OutputRelay, ReconnectConfig, ReconnectPolicy, RunnerState, StreamListener, StreamRunner,
    StreamRunnerError,
};

// Router
pub use infrastructure::router::{RouterError, RunSummary, StreamRouter};

// Config
pub use infrastructure::config::{
    ConfigError, DispatchSettings, RouterConfig, StreamSettings, load_dotenv,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    TelemetryConfig, TelemetryError, TelemetryGuard, init as init_telemetry,
};
