//! Stream Router
//!
//! Wires registered strategies, one runner per catalog stream, and the
//! dispatcher into a running process, and tears them down in order.
//!
//! # Shutdown Order
//!
//! 1. Stop every runner and wait for it; each runner drains its relay.
//! 2. Stop the dispatcher, which drains the shared queue.
//! 3. Call `finish` on every started strategy.

use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::application::ports::StreamingProvider;
use crate::application::services::{
    Dispatcher, EventQueue, EventReceiver, RegistryError, StrategyRegistry, event_queue,
};
use crate::domain::strategy::Strategy;
use crate::infrastructure::config::{ConfigError, RouterConfig};
use crate::infrastructure::stream::{StreamRunner, StreamRunnerError};

/// Errors that end a router run.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// Configuration is invalid.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// A stream runner failed fatally.
    #[error(transparent)]
    Stream(#[from] StreamRunnerError),

    /// A runner or dispatcher task panicked.
    #[error("task failed: {0}")]
    Task(#[from] JoinError),
}

/// Totals reported after an orderly shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Streams that were run.
    pub streams: usize,
    /// Events consumed by the dispatcher.
    pub events_dispatched: u64,
    /// Strategy hook failures during dispatch.
    pub strategy_failures: u64,
    /// Strategy `finish` hooks that failed.
    pub finish_failures: usize,
}

/// Owns the strategy registry and the shared event queue until `run`.
pub struct StreamRouter {
    config: RouterConfig,
    provider: Arc<dyn StreamingProvider>,
    registry: StrategyRegistry,
    events: EventQueue,
    receiver: EventReceiver,
}

impl std::fmt::Debug for StreamRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRouter")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl StreamRouter {
    /// Create a router.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::Config`] if the configuration is invalid.
    pub fn new(
        config: RouterConfig,
        provider: Arc<dyn StreamingProvider>,
    ) -> Result<Self, RouterError> {
        config.validate()?;
        let (events, receiver) = event_queue(config.dispatch.event_queue_capacity);
        Ok(Self {
            config,
            provider,
            registry: StrategyRegistry::new(),
            events,
            receiver,
        })
    }

    /// Register a strategy and run its start hook.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::StartFailed`] if `start` fails; the strategy
    /// stays registered.
    pub fn register(&mut self, strategy: Box<dyn Strategy>) -> Result<(), RegistryError> {
        self.registry.register(strategy)
    }

    /// Registered strategies and their streams.
    #[must_use]
    pub const fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Producer handle for publishing events such as order snapshots.
    #[must_use]
    pub fn event_queue(&self) -> EventQueue {
        self.events.clone()
    }

    /// Run every stream and the dispatcher until `shutdown` fires, a runner
    /// fails fatally, or the dispatcher task dies.
    ///
    /// # Errors
    ///
    /// Returns the first fatal runner error, after the orderly teardown has
    /// completed. A dead dispatcher returns [`RouterError::Task`] without
    /// finishing strategies, since the registry was lost with the task.
    pub async fn run(self, shutdown: CancellationToken) -> Result<RunSummary, RouterError> {
        let Self {
            config,
            provider,
            registry,
            events,
            receiver,
        } = self;

        let runners = registry
            .catalog()
            .handles()
            .iter()
            .map(|handle| {
                StreamRunner::new(
                    Arc::clone(handle),
                    Arc::clone(&provider),
                    events.clone(),
                    &config.stream,
                    shutdown.child_token(),
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>, _>>()?;
        drop(events);

        tracing::info!(
            streams = runners.len(),
            strategies = registry.len(),
            "Stream router starting"
        );

        let dispatch_stop = CancellationToken::new();
        let mut dispatcher_task =
            tokio::spawn(Dispatcher::new(registry).run(receiver, dispatch_stop.clone()));

        let mut tasks = JoinSet::new();
        for runner in &runners {
            tasks.spawn(Arc::clone(runner).run());
        }

        let mut fatal: Option<RouterError> = None;
        let mut dispatched: Option<Result<Dispatcher, JoinError>> = None;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Some(error) = runner_failure(joined) {
                        fatal = Some(error);
                        break;
                    }
                }
                joined = &mut dispatcher_task, if dispatched.is_none() => {
                    let failed = joined.is_err();
                    dispatched = Some(joined);
                    if failed {
                        break;
                    }
                    tracing::debug!("Event queue closed, dispatcher finished early");
                }
            }
        }

        for runner in &runners {
            runner.stop();
        }
        while let Some(joined) = tasks.join_next().await {
            if let Some(error) = runner_failure(joined) {
                fatal.get_or_insert(error);
            }
        }

        dispatch_stop.cancel();
        let dispatched = match dispatched {
            Some(joined) => joined,
            None => dispatcher_task.await,
        };
        let dispatcher = match dispatched {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                tracing::error!(error = %e, "Dispatcher task failed, strategies not finished");
                return Err(fatal.unwrap_or(RouterError::Task(e)));
            }
        };
        let events_dispatched = dispatcher.events_dispatched();
        let strategy_failures = dispatcher.failures();

        let mut registry = dispatcher.into_registry();
        let finish_failures = registry.finish_all();

        if let Some(error) = fatal {
            tracing::error!(error = %error, "Stream router stopped on fatal error");
            return Err(error);
        }

        let summary = RunSummary {
            streams: runners.len(),
            events_dispatched,
            strategy_failures,
            finish_failures,
        };
        tracing::info!(?summary, "Stream router stopped");
        Ok(summary)
    }
}

fn runner_failure(
    joined: Result<Result<(), StreamRunnerError>, JoinError>,
) -> Option<RouterError> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            tracing::error!(error = %e, "Stream runner failed");
            Some(RouterError::Stream(e))
        }
        Err(e) => {
            tracing::error!(error = %e, "Stream runner task failed");
            Some(RouterError::Task(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockStreamingProvider;
    use crate::domain::strategy::StrategyConfig;
    use crate::domain::streaming::{InboundEvent, MarketFilter, OrderSnapshot};
    use crate::infrastructure::config::DispatchSettings;

    struct Quiet(StrategyConfig);

    impl Strategy for Quiet {
        fn config(&self) -> &StrategyConfig {
            &self.0
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = RouterConfig {
            dispatch: DispatchSettings {
                event_queue_capacity: 0,
            },
            ..RouterConfig::default()
        };
        let result = StreamRouter::new(config, Arc::new(MockStreamingProvider::new()));
        assert!(matches!(result, Err(RouterError::Config(_))));
    }

    #[tokio::test]
    async fn without_strategies_waits_for_shutdown() {
        let router =
            StreamRouter::new(RouterConfig::default(), Arc::new(MockStreamingProvider::new()))
                .unwrap();
        let queue = router.event_queue();
        queue
            .put(InboundEvent::CurrentOrders(OrderSnapshot::default()))
            .await
            .unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let summary = router.run(shutdown).await.unwrap();

        assert_eq!(summary.streams, 0);
        assert_eq!(summary.events_dispatched, 1);
    }

    #[test]
    fn register_populates_catalog() {
        let mut router =
            StreamRouter::new(RouterConfig::default(), Arc::new(MockStreamingProvider::new()))
                .unwrap();
        router
            .register(Box::new(Quiet(StrategyConfig::new(
                "quiet",
                MarketFilter::market_ids(["1.1"]),
            ))))
            .unwrap();

        assert_eq!(router.registry().catalog().len(), 1);
    }
}
