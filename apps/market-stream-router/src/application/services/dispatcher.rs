//! Strategy Dispatcher
//!
//! Single consumer of the shared inbound-event queue. Every event is routed
//! to the strategies attached to its stream, in registration order. A
//! failing strategy hook is logged and counted; dispatch always continues.
//!
//! # Routing
//!
//! | Event            | Recipients                 | Hooks                                   |
//! |------------------|----------------------------|-----------------------------------------|
//! | `MarketBook`     | attached, gate passed      | `check_market_book`, `process_market_book` |
//! | `RaceCard`       | attached                   | `process_race_card`                     |
//! | `RawData`        | attached                   | `process_raw_data`                      |
//! | `CurrentOrders`  | every started strategy     | `process_orders`                        |
//!
//! A hook that panics counts as a failed hook; the strategy stays registered.

use tokio_util::sync::CancellationToken;

use super::queue::EventReceiver;
use super::registry::{StrategyRegistration, StrategyRegistry, guarded};
use crate::domain::strategy::{LifecycleState, StrategyError};
use crate::domain::streaming::{InboundEvent, OrderSnapshot, RawBatch};
use crate::infrastructure::metrics;

/// Result of dispatching one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Processing hooks invoked (gates excluded).
    pub invocations: usize,
    /// Hooks that returned an error.
    pub failures: usize,
}

impl DispatchOutcome {
    fn absorb(&mut self, result: Result<(), StrategyError>, failed: impl FnOnce(&StrategyError)) {
        self.invocations += 1;
        if let Err(e) = result {
            self.failures += 1;
            failed(&e);
        }
    }
}

/// Routes inbound events to registered strategies.
#[derive(Debug)]
pub struct Dispatcher {
    registry: StrategyRegistry,
    events_dispatched: u64,
    failures: u64,
}

impl Dispatcher {
    /// Create a dispatcher over a populated registry.
    #[must_use]
    pub const fn new(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            events_dispatched: 0,
            failures: 0,
        }
    }

    /// Registry being dispatched to.
    #[must_use]
    pub const fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Events dispatched so far.
    #[must_use]
    pub const fn events_dispatched(&self) -> u64 {
        self.events_dispatched
    }

    /// Hook failures so far.
    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.failures
    }

    /// Route one event.
    pub fn dispatch(&mut self, event: &InboundEvent) -> DispatchOutcome {
        let outcome = match event {
            InboundEvent::MarketBook(batch) => self.dispatch_market_books(batch),
            InboundEvent::RaceCard(batch) => self.dispatch_race_cards(batch),
            InboundEvent::RawData(batch) => self.dispatch_raw_data(batch),
            InboundEvent::CurrentOrders(snapshot) => self.dispatch_orders(snapshot),
        };

        self.events_dispatched += 1;
        self.failures += outcome.failures as u64;
        metrics::record_event_dispatched(event.kind());
        outcome
    }

    /// Consume the queue until it closes or `stop` fires, then drain what is
    /// still queued.
    ///
    /// Returns the dispatcher so the caller can finish strategies.
    pub async fn run(mut self, mut receiver: EventReceiver, stop: CancellationToken) -> Self {
        tracing::info!(strategies = self.registry.len(), "Dispatcher started");

        loop {
            tokio::select! {
                biased;
                event = receiver.get() => match event {
                    Some(event) => {
                        self.dispatch(&event);
                    }
                    None => break,
                },
                () = stop.cancelled() => {
                    while let Some(event) = receiver.try_get() {
                        self.dispatch(&event);
                    }
                    break;
                }
            }
        }

        tracing::info!(
            events = self.events_dispatched,
            failures = self.failures,
            "Dispatcher stopped"
        );
        self
    }

    /// Hand back the registry once dispatching has ended.
    #[must_use]
    pub fn into_registry(self) -> StrategyRegistry {
        self.registry
    }

    fn dispatch_market_books(&mut self, batch: &RawBatch) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for book in batch.market_books() {
            for registration in self.live() {
                let passed = match registration.check_market(&book) {
                    Ok(passed) => passed,
                    Err(e) => {
                        outcome.failures += 1;
                        hook_failed(registration, "check_market_book", batch, book.market_id(), &e);
                        continue;
                    }
                };
                if !passed {
                    continue;
                }
                let result = guarded("process_market_book", || {
                    registration.strategy_mut().process_market_book(&book)
                });
                outcome.absorb(result, |e| {
                    hook_failed(registration, "process_market_book", batch, book.market_id(), e);
                });
            }
        }
        outcome
    }

    fn dispatch_race_cards(&mut self, batch: &RawBatch) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for card in batch.race_cards() {
            for registration in self.live() {
                if !registration.is_attached(batch.stream_id()) {
                    continue;
                }
                let result = guarded("process_race_card", || {
                    registration.strategy_mut().process_race_card(&card)
                });
                outcome.absorb(result, |e| {
                    hook_failed(registration, "process_race_card", batch, card.market_id(), e);
                });
            }
        }
        outcome
    }

    fn dispatch_raw_data(&mut self, batch: &RawBatch) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for datum in batch.records() {
            for registration in self.live() {
                if !registration.is_attached(batch.stream_id()) {
                    continue;
                }
                let result = guarded("process_raw_data", || {
                    registration
                        .strategy_mut()
                        .process_raw_data(batch.publish_time(), datum)
                });
                outcome.absorb(result, |e| {
                    hook_failed(registration, "process_raw_data", batch, None, e);
                });
            }
        }
        outcome
    }

    fn dispatch_orders(&mut self, snapshot: &OrderSnapshot) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        for registration in self.live() {
            let result = guarded("process_orders", || {
                registration.strategy_mut().process_orders(snapshot)
            });
            outcome.absorb(result, |e| {
                metrics::record_strategy_error(registration.name(), "process_orders");
                tracing::error!(
                    strategy = registration.name(),
                    orders = snapshot.orders.len(),
                    error = %e,
                    "Strategy hook failed"
                );
            });
        }
        outcome
    }

    /// Registrations whose start hook succeeded and that have not finished.
    fn live(&mut self) -> impl Iterator<Item = &mut StrategyRegistration> {
        self.registry
            .registrations_mut()
            .iter_mut()
            .filter(|r| r.state() == LifecycleState::Started)
    }
}

fn hook_failed(
    registration: &StrategyRegistration,
    hook: &'static str,
    batch: &RawBatch,
    market_id: Option<&str>,
    error: &StrategyError,
) {
    metrics::record_strategy_error(registration.name(), hook);
    tracing::error!(
        strategy = registration.name(),
        hook,
        stream_id = batch.stream_id(),
        market_id = market_id.unwrap_or_default(),
        error = %error,
        "Strategy hook failed"
    );
}

// =============================================================================
// Tests
// =============================================================================
