//! Market Data Streaming Types
//!
//! Core domain types for provider stream updates: identifiers, immutable
//! batches, borrowed payload views handed to strategies, and the inbound
//! event union consumed by the dispatcher.
//!
//! Update records are opaque decoded structures (`serde_json::Value`). Only
//! the handful of fields needed for cache bookkeeping are ever inspected.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of one market for the lifetime of its existence in a stream.
pub type MarketId = String;

/// Identifier of one provider subscription.
pub type StreamId = String;

/// A single decoded update record supplied by the provider.
pub type Record = Value;

/// Market status value that marks a market as finished.
const CLOSED_STATUS: &str = "CLOSED";

// =============================================================================
// Stream Kind
// =============================================================================

/// Kind of provider subscription a listener consumes.
///
/// Each kind decides how the cache key is extracted from a record and
/// whether a record can signal that its market has closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamKind {
    /// Market-data subscription (prices, volumes, market definitions).
    #[default]
    MarketData,
    /// Informational race-data subscription.
    RaceData,
}

impl StreamKind {
    /// Map a provider subscription name onto a stream kind.
    ///
    /// # Errors
    ///
    /// Returns [`SubscriptionKindError::UnexpectedOrderStream`] for order
    /// subscriptions and [`SubscriptionKindError::Unsupported`] for any
    /// other unknown name.
    pub fn from_subscription(name: &str) -> Result<Self, SubscriptionKindError> {
        match name {
            "marketSubscription" => Ok(Self::MarketData),
            "raceSubscription" => Ok(Self::RaceData),
            "orderSubscription" => Err(SubscriptionKindError::UnexpectedOrderStream),
            other => Err(SubscriptionKindError::Unsupported(other.to_string())),
        }
    }

    /// Provider subscription name for this kind.
    #[must_use]
    pub const fn subscription_name(self) -> &'static str {
        match self {
            Self::MarketData => "marketSubscription",
            Self::RaceData => "raceSubscription",
        }
    }

    /// Short label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarketData => "market",
            Self::RaceData => "race",
        }
    }

    /// Field holding the market identifier for records of this kind.
    #[must_use]
    pub const fn key_field(self) -> &'static str {
        match self {
            Self::MarketData => "id",
            Self::RaceData => "mid",
        }
    }

    /// Extract the market identifier from a record.
    #[must_use]
    pub fn market_id(self, record: &Record) -> Option<&str> {
        record.get(self.key_field()).and_then(Value::as_str)
    }

    /// Whether the record carries a terminal "closed" status.
    ///
    /// Race data never closes through this channel.
    #[must_use]
    pub fn is_closed(self, record: &Record) -> bool {
        match self {
            Self::MarketData => market_status(record) == Some(CLOSED_STATUS),
            Self::RaceData => false,
        }
    }
}

/// Errors mapping a provider subscription name onto a [`StreamKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriptionKindError {
    /// Order streams are never consumed by a market listener.
    #[error("not expecting an order stream")]
    UnexpectedOrderStream,
    /// Subscription name is not recognised.
    #[error("unsupported subscription type: {0}")]
    Unsupported(String),
}

fn market_status(record: &Record) -> Option<&str> {
    record
        .get("marketDefinition")
        .and_then(|definition| definition.get("status"))
        .and_then(Value::as_str)
}

// =============================================================================
// Output Mode
// =============================================================================

/// How the output relay wraps batches before publishing them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputMode {
    /// Market data becomes `MarketBook` events, race data `RaceCard` events.
    #[default]
    Structured,
    /// Every batch is published untouched as a `RawData` event.
    Raw,
}

impl OutputMode {
    /// Wrap a batch from a stream of the given kind as an inbound event.
    #[must_use]
    pub fn wrap(self, kind: StreamKind, batch: RawBatch) -> InboundEvent {
        match (self, kind) {
            (Self::Raw, _) => InboundEvent::RawData(batch),
            (Self::Structured, StreamKind::MarketData) => InboundEvent::MarketBook(batch),
            (Self::Structured, StreamKind::RaceData) => InboundEvent::RaceCard(batch),
        }
    }
}

// =============================================================================
// Filters and Resume Tokens
// =============================================================================

/// Provider market filter (which markets a subscription covers).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketFilter(pub Value);

impl MarketFilter {
    /// Filter restricted to an explicit set of market identifiers.
    #[must_use]
    pub fn market_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        Self(json!({ "marketIds": ids }))
    }
}

/// Provider market-data field filter (which fields are streamed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketDataFilter(pub Value);

impl MarketDataFilter {
    /// Fields requested when a strategy does not supply its own filter.
    pub const DEFAULT_FIELDS: [&'static str; 7] = [
        "EX_ALL_OFFERS",
        "EX_TRADED",
        "EX_TRADED_VOL",
        "EX_LTP",
        "EX_MARKET_DEF",
        "SP_TRADED",
        "SP_PROJECTED",
    ];

    /// Filter requesting the given fields.
    #[must_use]
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        Self(json!({ "fields": fields }))
    }
}

impl Default for MarketDataFilter {
    fn default() -> Self {
        Self::fields(Self::DEFAULT_FIELDS)
    }
}

/// Server-issued stream position markers used to resume after a reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResumeTokens {
    /// Token identifying the start of the current synchronisation.
    pub initial_clk: Option<String>,
    /// Token of the last acknowledged change.
    pub clk: Option<String>,
}

impl ResumeTokens {
    /// Whether the tokens allow resuming instead of a full resync.
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        self.initial_clk.is_some() && self.clk.is_some()
    }
}

// =============================================================================
// Raw Batch
// =============================================================================

/// One provider delivery: ordered records sharing a publish timestamp.
///
/// Immutable once created. Cloning shares the record storage.
#[derive(Debug, Clone)]
pub struct RawBatch {
    stream_id: StreamId,
    publish_time: i64,
    records: Arc<[Record]>,
}

impl RawBatch {
    /// Create a batch.
    #[must_use]
    pub fn new(stream_id: impl Into<StreamId>, publish_time: i64, records: Vec<Record>) -> Self {
        Self {
            stream_id: stream_id.into(),
            publish_time,
            records: records.into(),
        }
    }

    /// Stream the batch was received on.
    #[must_use]
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Provider publish time in epoch milliseconds.
    #[must_use]
    pub const fn publish_time(&self) -> i64 {
        self.publish_time
    }

    /// Provider publish time as a UTC timestamp.
    #[must_use]
    pub fn publish_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.publish_time)
    }

    /// Records in provider order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch is an empty heartbeat.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// View each record as a market book.
    pub fn market_books(&self) -> impl Iterator<Item = MarketBook<'_>> {
        self.records.iter().map(|data| MarketBook {
            stream_id: &self.stream_id,
            publish_time: self.publish_time,
            data,
        })
    }

    /// View each record as a race card.
    pub fn race_cards(&self) -> impl Iterator<Item = RaceCard<'_>> {
        self.records.iter().map(|data| RaceCard {
            stream_id: &self.stream_id,
            publish_time: self.publish_time,
            data,
        })
    }
}

// =============================================================================
// Payload Views
// =============================================================================

/// Borrowed view of one market-data record.
#[derive(Debug, Clone, Copy)]
pub struct MarketBook<'a> {
    stream_id: &'a str,
    publish_time: i64,
    data: &'a Record,
}

impl<'a> MarketBook<'a> {
    /// Create a view over a record.
    #[must_use]
    pub const fn new(stream_id: &'a str, publish_time: i64, data: &'a Record) -> Self {
        Self {
            stream_id,
            publish_time,
            data,
        }
    }

    /// Stream the update arrived on.
    #[must_use]
    pub const fn streaming_unique_id(&self) -> &'a str {
        self.stream_id
    }

    /// Provider publish time in epoch milliseconds.
    #[must_use]
    pub const fn publish_time(&self) -> i64 {
        self.publish_time
    }

    /// Market identifier, if present.
    #[must_use]
    pub fn market_id(&self) -> Option<&'a str> {
        StreamKind::MarketData.market_id(self.data)
    }

    /// Market status from the market definition, if present.
    #[must_use]
    pub fn status(&self) -> Option<&'a str> {
        market_status(self.data)
    }

    /// Whether this update closes the market.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        StreamKind::MarketData.is_closed(self.data)
    }

    /// Underlying record.
    #[must_use]
    pub const fn data(&self) -> &'a Record {
        self.data
    }
}

/// Borrowed view of one race-data record.
#[derive(Debug, Clone, Copy)]
pub struct RaceCard<'a> {
    stream_id: &'a str,
    publish_time: i64,
    data: &'a Record,
}

impl<'a> RaceCard<'a> {
    /// Stream the update arrived on.
    #[must_use]
    pub const fn streaming_unique_id(&self) -> &'a str {
        self.stream_id
    }

    /// Provider publish time in epoch milliseconds.
    #[must_use]
    pub const fn publish_time(&self) -> i64 {
        self.publish_time
    }

    /// Market the race update belongs to.
    #[must_use]
    pub fn market_id(&self) -> Option<&'a str> {
        StreamKind::RaceData.market_id(self.data)
    }

    /// Underlying record.
    #[must_use]
    pub const fn data(&self) -> &'a Record {
        self.data
    }
}

/// Snapshot of current orders published by the surrounding system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Publish time in epoch milliseconds.
    pub publish_time: i64,
    /// Decoded order records.
    pub orders: Vec<Record>,
}

// =============================================================================
// Inbound Event
// =============================================================================

/// Event consumed exactly once by the dispatcher.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Market-data batch.
    MarketBook(RawBatch),
    /// Race-data batch.
    RaceCard(RawBatch),
    /// Undecoded batch for raw-data consumers.
    RawData(RawBatch),
    /// Current orders snapshot.
    CurrentOrders(OrderSnapshot),
}

impl InboundEvent {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MarketBook(_) => "market_book",
            Self::RaceCard(_) => "race_card",
            Self::RawData(_) => "raw_data",
            Self::CurrentOrders(_) => "current_orders",
        }
    }

    /// Stream the event originated from, if it came from a stream.
    #[must_use]
    pub fn stream_id(&self) -> Option<&str> {
        match self {
            Self::MarketBook(batch) | Self::RaceCard(batch) | Self::RawData(batch) => {
                Some(batch.stream_id())
            }
            Self::CurrentOrders(_) => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
