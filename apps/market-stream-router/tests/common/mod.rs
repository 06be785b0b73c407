//! Shared test doubles: a scripted provider and a recording strategy.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use market_stream_router::{
    BatchListener, MarketBook, MarketDataFilter, MarketFilter, OrderSnapshot, ProviderError,
    ProviderStream, RaceCard, Record, ResumeTokens, RouterConfig, StreamId, StreamSettings,
    Strategy, StrategyConfig, StrategyError, StrategyResult, StreamingProvider,
};
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::Notify;

// =============================================================================
// Records
// =============================================================================

pub fn open_market(id: &str) -> Record {
    json!({"id": id, "marketDefinition": {"status": "OPEN"}})
}

pub fn closed_market(id: &str) -> Record {
    json!({"id": id, "marketDefinition": {"status": "CLOSED"}})
}

/// Stream settings with millisecond backoff so reconnects are quick.
pub fn fast_settings() -> StreamSettings {
    StreamSettings {
        output_queue_capacity: 8,
        reconnect_delay_initial: Duration::from_millis(1),
        reconnect_delay_max: Duration::from_millis(5),
        ..StreamSettings::default()
    }
}

pub fn fast_config() -> RouterConfig {
    RouterConfig {
        stream: fast_settings(),
        ..RouterConfig::default()
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not met within 5s");
}

// =============================================================================
// Scripted Provider
// =============================================================================

/// One action a scripted stream performs once started.
#[derive(Debug, Clone)]
pub enum Step {
    /// Acknowledge a stream position.
    Clock(Option<&'static str>, Option<&'static str>),
    /// Deliver a batch to the listener.
    Batch(i64, Vec<Record>),
    /// Park until the test notifies.
    Wait(Arc<Notify>),
    /// Drop the connection with a recoverable fault.
    Disconnect(&'static str),
    /// Fail with a non-streaming fault.
    Crash(&'static str),
}

/// Subscription request observed by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub stream_id: StreamId,
    pub races: bool,
    pub resume: ResumeTokens,
}

/// In-memory provider replaying one script per connection attempt.
///
/// Once a stream's scripts run out, further sessions stay connected and idle
/// until the runner drops them.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    sessions: Mutex<HashMap<StreamId, VecDeque<Vec<Step>>>>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
    connects: Mutex<HashMap<StreamId, usize>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the steps of the next session for `stream_id`.
    pub fn script(&self, stream_id: &str, steps: Vec<Step>) {
        self.sessions
            .lock()
            .entry(stream_id.to_string())
            .or_default()
            .push_back(steps);
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.lock().clone()
    }

    pub fn connects(&self, stream_id: &str) -> usize {
        self.connects.lock().get(stream_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StreamingProvider for ScriptedProvider {
    async fn create_stream(
        &self,
        stream_id: &str,
        listener: Arc<dyn BatchListener>,
    ) -> Result<Box<dyn ProviderStream>, ProviderError> {
        *self.connects.lock().entry(stream_id.to_string()).or_default() += 1;
        let steps = self
            .sessions
            .lock()
            .get_mut(stream_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default();

        Ok(Box::new(ScriptedStream {
            stream_id: stream_id.to_string(),
            listener,
            steps,
            subscriptions: Arc::clone(&self.subscriptions),
        }))
    }
}

struct ScriptedStream {
    stream_id: StreamId,
    listener: Arc<dyn BatchListener>,
    steps: Vec<Step>,
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

#[async_trait]
impl ProviderStream for ScriptedStream {
    async fn subscribe_to_markets(
        &mut self,
        _market_filter: &MarketFilter,
        _market_data_filter: &MarketDataFilter,
        resume: &ResumeTokens,
        _conflate_ms: Option<u64>,
    ) -> Result<StreamId, ProviderError> {
        self.subscriptions.lock().push(Subscription {
            stream_id: self.stream_id.clone(),
            races: false,
            resume: resume.clone(),
        });
        Ok(self.stream_id.clone())
    }

    async fn subscribe_to_races(&mut self) -> Result<StreamId, ProviderError> {
        self.subscriptions.lock().push(Subscription {
            stream_id: self.stream_id.clone(),
            races: true,
            resume: ResumeTokens::default(),
        });
        Ok(self.stream_id.clone())
    }

    async fn start(&mut self) -> Result<(), ProviderError> {
        for step in std::mem::take(&mut self.steps) {
            match step {
                Step::Clock(initial_clk, clk) => {
                    self.listener
                        .on_clock(initial_clk.map(Into::into), clk.map(Into::into));
                }
                Step::Batch(publish_time, records) => self
                    .listener
                    .on_batch(records, publish_time)
                    .await
                    .map_err(|e| ProviderError::Interrupted(e.to_string()))?,
                Step::Wait(notify) => notify.notified().await,
                Step::Disconnect(reason) => return Err(ProviderError::Interrupted(reason.into())),
                Step::Crash(reason) => return Err(ProviderError::Unexpected(anyhow::anyhow!(reason))),
            }
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}

// =============================================================================
// Recording Strategy
// =============================================================================

/// Shared, ordered log of strategy hook calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: String) {
        self.0.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.0
            .lock()
            .iter()
            .filter(|entry| entry.starts_with(prefix))
            .count()
    }

    /// Publish times of market books processed by `strategy`, in call order.
    pub fn book_times(&self, strategy: &str) -> Vec<i64> {
        let prefix = format!("{strategy}:book:");
        self.0
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix(&prefix))
            .filter_map(|rest| rest.rsplit_once('@'))
            .filter_map(|(_, time)| time.parse().ok())
            .collect()
    }
}

/// How the recording strategy answers `check_market_book`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Open,
    Closed,
    Fails,
}

/// Strategy that logs every hook as `name:hook[:detail]`.
pub struct RecordingStrategy {
    config: StrategyConfig,
    log: CallLog,
    gate: Gate,
    fail_start: bool,
    fail_process: bool,
    panic_process: bool,
}

impl RecordingStrategy {
    pub fn new(config: StrategyConfig, log: CallLog) -> Self {
        Self {
            config,
            log,
            gate: Gate::Open,
            fail_start: false,
            fail_process: false,
            panic_process: false,
        }
    }

    pub fn boxed(name: &str, markets: &[&str], log: &CallLog) -> Box<dyn Strategy> {
        Box::new(Self::new(
            StrategyConfig::new(name, MarketFilter::market_ids(markets.iter().copied())),
            log.clone(),
        ))
    }

    #[must_use]
    pub const fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub const fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    #[must_use]
    pub const fn failing_process(mut self) -> Self {
        self.fail_process = true;
        self
    }

    #[must_use]
    pub const fn panicking_process(mut self) -> Self {
        self.panic_process = true;
        self
    }

    fn record(&self, entry: impl std::fmt::Display) {
        self.log.push(format!("{}:{entry}", self.config.name()));
    }
}

impl Strategy for RecordingStrategy {
    fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn start(&mut self, _ctx: &mut market_stream_router::StartContext<'_>) -> StrategyResult<()> {
        self.record("start");
        if self.fail_start {
            return Err(StrategyError::hook("start", "refused"));
        }
        Ok(())
    }

    fn check_market_book(&mut self, market_book: &MarketBook<'_>) -> StrategyResult<bool> {
        self.record(format_args!("check:{}", market_book.market_id().unwrap_or("?")));
        match self.gate {
            Gate::Open => Ok(true),
            Gate::Closed => Ok(false),
            Gate::Fails => Err(StrategyError::hook("check_market_book", "gate exploded")),
        }
    }

    fn process_market_book(&mut self, market_book: &MarketBook<'_>) -> StrategyResult<()> {
        self.record(format_args!(
            "book:{}@{}",
            market_book.market_id().unwrap_or("?"),
            market_book.publish_time()
        ));
        assert!(!self.panic_process, "strategy bug");
        if self.fail_process {
            return Err(StrategyError::hook("process_market_book", "bad book"));
        }
        Ok(())
    }

    fn process_race_card(&mut self, race_card: &RaceCard<'_>) -> StrategyResult<()> {
        self.record(format_args!("race:{}", race_card.market_id().unwrap_or("?")));
        Ok(())
    }

    fn process_orders(&mut self, orders: &OrderSnapshot) -> StrategyResult<()> {
        self.record(format_args!("orders:{}", orders.orders.len()));
        Ok(())
    }

    fn process_raw_data(&mut self, publish_time: i64, _datum: &Record) -> StrategyResult<()> {
        self.record(format_args!("raw@{publish_time}"));
        Ok(())
    }

    fn finish(&mut self) -> StrategyResult<()> {
        self.record("finish");
        Ok(())
    }
}
