//! Dispatch routing: stream membership, gate ordering, error isolation and
//! the strategy lifecycle.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{CallLog, Gate, RecordingStrategy, open_market};
use market_stream_router::{
    Dispatcher, InboundEvent, MarketFilter, OrderSnapshot, OutputMode, RawBatch, RegistryError,
    StrategyConfig, StrategyRegistry, event_queue,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn on_stream(name: &str, stream_id: &str, log: &CallLog) -> RecordingStrategy {
    RecordingStrategy::new(
        StrategyConfig::new(name, MarketFilter::market_ids(["1.1", "1.2"])).with_stream_id(stream_id),
        log.clone(),
    )
}

fn books(stream_id: &str, publish_time: i64, markets: &[&str]) -> InboundEvent {
    InboundEvent::MarketBook(RawBatch::new(
        stream_id,
        publish_time,
        markets.iter().map(|id| open_market(id)).collect(),
    ))
}

#[test]
fn strategies_see_only_their_streams() {
    let log = CallLog::default();
    let mut registry = StrategyRegistry::new();
    registry.register(Box::new(on_stream("a", "1000", &log))).unwrap();
    registry.register(Box::new(on_stream("b", "2000", &log))).unwrap();
    let mut dispatcher = Dispatcher::new(registry);

    dispatcher.dispatch(&books("2000", 1, &["1.1"]));

    assert_eq!(log.count("a:check"), 0);
    assert_eq!(log.count("b:check:1.1"), 1);
    assert_eq!(log.book_times("b"), [1]);
}

#[test]
fn failing_gate_does_not_block_later_strategy() {
    let log = CallLog::default();
    let mut registry = StrategyRegistry::new();
    registry
        .register(Box::new(on_stream("a", "1.23", &log).with_gate(Gate::Fails)))
        .unwrap();
    registry.register(Box::new(on_stream("b", "1.23", &log))).unwrap();
    assert_eq!(registry.catalog().len(), 1);
    let mut dispatcher = Dispatcher::new(registry);

    let outcome = dispatcher.dispatch(&books("1.23", 3, &["1.1"]));

    assert_eq!(outcome.failures, 1);
    assert_eq!(log.count("a:book"), 0);
    assert_eq!(log.book_times("b"), [3]);
    assert_eq!(dispatcher.failures(), 1);
}

#[test]
fn process_failure_is_isolated_per_book() {
    let log = CallLog::default();
    let mut registry = StrategyRegistry::new();
    registry
        .register(Box::new(on_stream("a", "1000", &log).failing_process()))
        .unwrap();
    registry.register(Box::new(on_stream("b", "1000", &log))).unwrap();
    let mut dispatcher = Dispatcher::new(registry);

    let outcome = dispatcher.dispatch(&books("1000", 1, &["1.1", "1.2"]));

    assert_eq!(outcome.failures, 2);
    assert_eq!(
        log.entries(),
        [
            "a:start",
            "b:start",
            "a:check:1.1",
            "a:book:1.1@1",
            "b:check:1.1",
            "b:book:1.1@1",
            "a:check:1.2",
            "a:book:1.2@1",
            "b:check:1.2",
            "b:book:1.2@1",
        ]
    );
}

#[test]
fn closed_gate_skips_processing() {
    let log = CallLog::default();
    let mut registry = StrategyRegistry::new();
    registry
        .register(Box::new(on_stream("a", "1000", &log).with_gate(Gate::Closed)))
        .unwrap();
    let mut dispatcher = Dispatcher::new(registry);

    let outcome = dispatcher.dispatch(&books("1000", 1, &["1.1"]));

    assert_eq!(outcome.failures, 0);
    assert_eq!(log.count("a:check"), 1);
    assert_eq!(log.count("a:book"), 0);
}

#[test]
fn strategy_failing_to_start_receives_nothing() {
    let log = CallLog::default();
    let mut registry = StrategyRegistry::new();
    let refused = registry.register(Box::new(on_stream("a", "1000", &log).failing_start()));
    assert!(matches!(refused, Err(RegistryError::StartFailed { ref name, .. }) if name == "a"));
    registry.register(Box::new(on_stream("b", "1000", &log))).unwrap();
    let mut dispatcher = Dispatcher::new(registry);

    dispatcher.dispatch(&books("1000", 1, &["1.1"]));
    dispatcher.dispatch(&InboundEvent::CurrentOrders(OrderSnapshot::default()));
    let mut registry = dispatcher.into_registry();
    registry.finish_all();

    assert_eq!(log.count("a:"), 1);
    assert_eq!(log.count("b:book"), 1);
    assert_eq!(log.count("b:orders"), 1);
    assert_eq!(log.count("b:finish"), 1);
}

#[test]
fn finish_runs_once() {
    let log = CallLog::default();
    let mut registry = StrategyRegistry::new();
    registry.register(Box::new(on_stream("a", "1000", &log))).unwrap();

    assert_eq!(registry.finish_all(), 0);
    assert_eq!(registry.finish_all(), 0);

    assert_eq!(log.entries(), ["a:start", "a:finish"]);
}

#[test]
fn raw_and_race_events_reach_attached_strategies_only() {
    let log = CallLog::default();
    let mut registry = StrategyRegistry::new();
    registry
        .register(Box::new(RecordingStrategy::new(
            StrategyConfig::new("raw", MarketFilter::market_ids(["1.1"]))
                .with_stream_id("1000")
                .with_output_mode(OutputMode::Raw),
            log.clone(),
        )))
        .unwrap();
    registry.register(Box::new(on_stream("other", "2000", &log))).unwrap();
    let mut dispatcher = Dispatcher::new(registry);

    dispatcher.dispatch(&InboundEvent::RawData(RawBatch::new(
        "1000",
        9,
        vec![json!({"id": "1.1"}), json!({"id": "1.2"})],
    )));
    dispatcher.dispatch(&InboundEvent::RaceCard(RawBatch::new(
        "2000",
        10,
        vec![json!({"mid": "1.1"})],
    )));

    assert_eq!(log.count("raw:raw@9"), 2);
    assert_eq!(log.count("raw:race"), 0);
    assert_eq!(log.count("other:raw"), 0);
    assert_eq!(log.count("other:race:1.1"), 1);
}

#[tokio::test]
async fn queued_events_are_dispatched_before_stop_completes() {
    let log = CallLog::default();
    let mut registry = StrategyRegistry::new();
    registry.register(Box::new(on_stream("a", "1000", &log))).unwrap();

    let (events, receiver) = event_queue(8);
    for publish_time in 0..5 {
        events.put(books("1000", publish_time, &["1.1"])).await.unwrap();
    }
    let stop = CancellationToken::new();
    stop.cancel();

    let dispatcher = Dispatcher::new(registry).run(receiver, stop).await;

    assert_eq!(dispatcher.events_dispatched(), 5);
    assert_eq!(log.book_times("a"), [0, 1, 2, 3, 4]);
}
