//! Strategy Registry
//!
//! Holds registered strategies in registration order together with the
//! streams each one is attached to.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::domain::strategy::{LifecycleState, StartContext, Strategy, StrategyError, StrategyResult};
use crate::domain::streaming::MarketBook;
use crate::domain::subscription::{StreamCatalog, StreamHandle};

/// Errors raised while registering strategies.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The strategy's start hook failed. The strategy stays registered.
    #[error("strategy {name} failed to start: {source}")]
    StartFailed {
        /// Strategy name.
        name: String,
        /// Hook failure.
        #[source]
        source: StrategyError,
    },
}

/// Run a strategy hook, turning a panic into [`StrategyError::Panicked`].
///
/// A panicking strategy stays registered and keeps receiving events.
pub(crate) fn guarded<T>(
    hook: &'static str,
    call: impl FnOnce() -> StrategyResult<T>,
) -> StrategyResult<T> {
    panic::catch_unwind(AssertUnwindSafe(call))
        .unwrap_or_else(|payload| Err(StrategyError::panicked(hook, payload.as_ref())))
}

// =============================================================================
// Registration
// =============================================================================

/// One registered strategy and its stream memberships.
pub struct StrategyRegistration {
    strategy: Box<dyn Strategy>,
    streams: Vec<Arc<StreamHandle>>,
    state: LifecycleState,
}

impl std::fmt::Debug for StrategyRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistration")
            .field("name", &self.name())
            .field("streams", &self.stream_ids())
            .field("state", &self.state)
            .finish()
    }
}

impl StrategyRegistration {
    /// Strategy display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.strategy.name()
    }

    /// Identifiers of every stream the strategy is attached to.
    #[must_use]
    pub fn stream_ids(&self) -> Vec<&str> {
        self.streams.iter().map(|h| h.id()).collect()
    }

    /// Whether the strategy is attached to the stream.
    #[must_use]
    pub fn is_attached(&self, stream_id: &str) -> bool {
        self.streams.iter().any(|h| h.id() == stream_id)
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Stream membership first, then the strategy's gating predicate.
    ///
    /// The predicate is never consulted for books from foreign streams.
    ///
    /// # Errors
    ///
    /// Propagates a failing or panicking gating predicate.
    pub fn check_market(&mut self, market_book: &MarketBook<'_>) -> Result<bool, StrategyError> {
        if !self.is_attached(market_book.streaming_unique_id()) {
            return Ok(false);
        }
        guarded("check_market_book", || self.strategy.check_market_book(market_book))
    }

    pub(crate) fn strategy_mut(&mut self) -> &mut dyn Strategy {
        self.strategy.as_mut()
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Registered strategies and the stream catalog they populated.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    catalog: StreamCatalog,
    registrations: Vec<StrategyRegistration>,
}

impl StrategyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy, attach its default stream and run its start hook.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StartFailed`] if `start` fails. The strategy
    /// remains registered and attached to the streams it requested.
    pub fn register(&mut self, mut strategy: Box<dyn Strategy>) -> Result<(), RegistryError> {
        let default_stream = self.catalog.attach(strategy.config().stream_request());
        let mut streams = vec![default_stream];

        let started = {
            let mut ctx = StartContext::new(&mut self.catalog, &mut streams);
            guarded("start", || strategy.start(&mut ctx))
        };

        let name = strategy.name().to_string();
        let state = if started.is_ok() {
            LifecycleState::Started
        } else {
            LifecycleState::Constructed
        };
        self.registrations.push(StrategyRegistration {
            strategy,
            streams,
            state,
        });

        match started {
            Ok(()) => {
                tracing::info!(
                    strategy = %name,
                    streams = ?self.registrations.last().map(StrategyRegistration::stream_ids),
                    "Strategy registered"
                );
                Ok(())
            }
            Err(source) => {
                tracing::error!(strategy = %name, error = %source, "Strategy failed to start");
                Err(RegistryError::StartFailed { name, source })
            }
        }
    }

    /// Call `finish` once on every started strategy, in registration order.
    ///
    /// Returns the number of hooks that failed.
    pub fn finish_all(&mut self) -> usize {
        let mut failures = 0;
        for registration in &mut self.registrations {
            if registration.state != LifecycleState::Started {
                continue;
            }
            registration.state = LifecycleState::Finished;
            if let Err(e) = guarded("finish", || registration.strategy.finish()) {
                failures += 1;
                tracing::error!(strategy = registration.name(), error = %e, "Strategy finish failed");
            }
        }
        failures
    }

    /// Streams requested by every registered strategy.
    #[must_use]
    pub const fn catalog(&self) -> &StreamCatalog {
        &self.catalog
    }

    /// Registrations in registration order.
    #[must_use]
    pub fn registrations(&self) -> &[StrategyRegistration] {
        &self.registrations
    }

    pub(crate) fn registrations_mut(&mut self) -> &mut [StrategyRegistration] {
        &mut self.registrations
    }

    /// Number of registered strategies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether no strategy is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
