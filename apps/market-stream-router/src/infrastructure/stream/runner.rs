//! Stream Runner
//!
//! Owns one provider subscription for its whole life: connects, subscribes
//! with the listener's resume tokens, streams until the connection drops,
//! and reconnects with backoff. The whole connect-and-subscribe sequence is
//! retried, so tokens are re-read on every attempt.
//!
//! # State Machine
//!
//! ```text
//! Idle ──► Connecting ──► Streaming ──(transient failure)──► Connecting ──► … ──► Stopped
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::listener::StreamListener;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use super::relay::OutputRelay;
use crate::application::ports::{BatchListener, ListenerError, ProviderError, StreamingProvider};
use crate::application::services::queue::EventQueue;
use crate::domain::streaming::{StreamId, StreamKind};
use crate::domain::subscription::StreamHandle;
use crate::infrastructure::config::StreamSettings;
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that terminate a stream runner.
#[derive(Debug, thiserror::Error)]
pub enum StreamRunnerError {
    /// The listener could not be built for the stream's subscription kind.
    #[error("listener construction failed: {0}")]
    Listener(#[from] ListenerError),

    /// A non-streaming fault; never retried.
    #[error("unexpected failure on stream {stream_id}: {source}")]
    Unexpected {
        /// Stream identifier.
        stream_id: StreamId,
        /// Underlying provider failure.
        #[source]
        source: ProviderError,
    },

    /// The configured attempt limit was reached.
    #[error("stream {stream_id} gave up after {attempts} reconnection attempts")]
    RetriesExhausted {
        /// Stream identifier.
        stream_id: StreamId,
        /// Consecutive attempts made.
        attempts: u32,
    },
}

// =============================================================================
// Runner State
// =============================================================================

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Built, not yet run.
    Idle,
    /// Creating the provider stream and subscribing.
    Connecting,
    /// Provider stream started and delivering batches.
    Streaming,
    /// Shut down or failed; will not reconnect.
    Stopped,
}

impl RunnerState {
    /// Label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        }
    }
}

// =============================================================================
// Stream Runner
// =============================================================================

/// Supervisor of one provider subscription and its output relay.
pub struct StreamRunner {
    handle: Arc<StreamHandle>,
    provider: Arc<dyn StreamingProvider>,
    listener: Arc<StreamListener>,
    reconnect: ReconnectConfig,
    state: Mutex<RunnerState>,
    cancel: CancellationToken,
    relay_stop: CancellationToken,
    relay: Mutex<Option<OutputRelay>>,
    relay_task: Mutex<Option<JoinHandle<u64>>>,
    relay_started: AtomicBool,
}

impl std::fmt::Debug for StreamRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRunner")
            .field("stream_id", &self.handle.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl StreamRunner {
    /// Build a runner for a catalog stream.
    ///
    /// `cancel` stops the runner; pass a child of the process shutdown token.
    ///
    /// # Errors
    ///
    /// Returns [`StreamRunnerError::Listener`] if no listener exists for the
    /// stream's subscription kind.
    ///
    /// # Panics
    ///
    /// Panics if `settings.output_queue_capacity` is zero.
    pub fn new(
        handle: Arc<StreamHandle>,
        provider: Arc<dyn StreamingProvider>,
        events: EventQueue,
        settings: &StreamSettings,
        cancel: CancellationToken,
    ) -> Result<Self, StreamRunnerError> {
        let (tx, rx) = mpsc::channel(settings.output_queue_capacity);
        let listener =
            StreamListener::for_subscription(handle.id(), handle.kind().subscription_name(), tx)?;

        let relay_stop = CancellationToken::new();
        let relay = OutputRelay::new(
            handle.id(),
            handle.kind(),
            handle.output_mode(),
            rx,
            events,
            relay_stop.clone(),
        );

        Ok(Self {
            handle,
            provider,
            listener: Arc::new(listener),
            reconnect: ReconnectConfig::from_settings(settings),
            state: Mutex::new(RunnerState::Idle),
            cancel,
            relay_stop,
            relay: Mutex::new(Some(relay)),
            relay_task: Mutex::new(None),
            relay_started: AtomicBool::new(false),
        })
    }

    /// Stream identifier.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        self.handle.id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        *self.state.lock()
    }

    /// Listener feeding this stream, for observability.
    #[must_use]
    pub const fn listener(&self) -> &Arc<StreamListener> {
        &self.listener
    }

    /// Request shutdown. `run` returns after the relay has drained.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run the connection loop until stopped or a fatal error occurs.
    ///
    /// Transient provider failures are retried with backoff. The relay is
    /// stopped and drained before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`StreamRunnerError::Unexpected`] on a non-streaming fault and
    /// [`StreamRunnerError::RetriesExhausted`] if an attempt limit is set and
    /// reached.
    pub async fn run(self: Arc<Self>) -> Result<(), StreamRunnerError> {
        self.ensure_relay();

        let result = self.connection_loop().await;

        self.set_state(RunnerState::Stopped);
        self.relay_stop.cancel();
        self.join_relay().await;

        tracing::info!(
            stream_id = self.stream_id(),
            cache_size = self.listener.cache_size(),
            updates = self.listener.updates_processed(),
            "Stream runner stopped"
        );
        result
    }

    async fn connection_loop(&self) -> Result<(), StreamRunnerError> {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                return Ok(());
            }

            self.set_state(RunnerState::Connecting);
            let batches_before = self.listener.batches_received();

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(()),
                outcome = self.connect_and_stream() => outcome,
            };

            let error = match outcome {
                Ok(()) => {
                    tracing::info!(stream_id = self.stream_id(), "Stream ended");
                    return Ok(());
                }
                Err(e) if e.is_transient() => e,
                Err(e) => {
                    metrics::record_stream_error(self.stream_id(), e.kind());
                    tracing::error!(
                        severity = "critical",
                        stream_id = self.stream_id(),
                        error = %e,
                        "Unexpected stream failure"
                    );
                    return Err(StreamRunnerError::Unexpected {
                        stream_id: self.stream_id().to_string(),
                        source: e,
                    });
                }
            };

            if self.listener.batches_received() > batches_before {
                policy.reset();
            }
            metrics::record_stream_error(self.stream_id(), error.kind());
            tracing::error!(
                stream_id = self.stream_id(),
                error = %error,
                "Stream failed"
            );

            let Some(delay) = policy.next_delay() else {
                return Err(StreamRunnerError::RetriesExhausted {
                    stream_id: self.stream_id().to_string(),
                    attempts: policy.attempt_count(),
                });
            };

            metrics::record_reconnect(self.stream_id());
            tracing::info!(
                stream_id = self.stream_id(),
                attempt = policy.attempt_count(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting stream"
            );

            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::info!(stream_id = self.stream_id(), "Stream cancelled during reconnect delay");
                    return Ok(());
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One attempt: create, subscribe, start. Returns when the stream ends.
    async fn connect_and_stream(&self) -> Result<(), ProviderError> {
        let listener: Arc<dyn BatchListener> = Arc::clone(&self.listener) as Arc<dyn BatchListener>;
        let mut stream = self.provider.create_stream(self.stream_id(), listener).await?;

        let acknowledged = match self.handle.kind() {
            StreamKind::MarketData => {
                let tokens = self.listener.resume_tokens();
                tracing::debug!(
                    stream_id = self.stream_id(),
                    resuming = tokens.can_resume(),
                    "Subscribing to markets"
                );
                stream
                    .subscribe_to_markets(
                        self.handle.market_filter(),
                        self.handle.market_data_filter(),
                        &tokens,
                        self.handle.conflate_ms(),
                    )
                    .await?
            }
            StreamKind::RaceData => stream.subscribe_to_races().await?,
        };

        if acknowledged != self.stream_id() {
            tracing::warn!(
                stream_id = self.stream_id(),
                acknowledged = %acknowledged,
                "Provider acknowledged a different stream id, keeping local id"
            );
        }

        self.set_state(RunnerState::Streaming);
        tracing::info!(
            stream_id = self.stream_id(),
            kind = self.handle.kind().as_str(),
            "Stream started"
        );
        stream.start().await
    }

    fn ensure_relay(&self) {
        if self.relay_started.swap(true, Ordering::AcqRel) {
            return;
        }
        let relay = self.relay.lock().take();
        if let Some(relay) = relay {
            *self.relay_task.lock() = Some(tokio::spawn(relay.run()));
        }
    }

    async fn join_relay(&self) {
        let task = self.relay_task.lock().take();
        let Some(task) = task else {
            return;
        };
        match task.await {
            Ok(relayed) => {
                tracing::debug!(stream_id = self.stream_id(), relayed, "Relay joined");
            }
            Err(e) => {
                tracing::error!(stream_id = self.stream_id(), error = %e, "Relay task failed");
            }
        }
    }

    fn set_state(&self, state: RunnerState) {
        let previous = std::mem::replace(&mut *self.state.lock(), state);
        if previous != state {
            tracing::debug!(
                stream_id = self.stream_id(),
                from = previous.as_str(),
                to = state.as_str(),
                "Runner state changed"
            );
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
