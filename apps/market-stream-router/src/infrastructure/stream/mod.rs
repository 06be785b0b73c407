//! Stream Ingestion
//!
//! Adapters that turn a provider subscription into inbound events:
//!
//! ```text
//! provider read loop ──► StreamListener ──► internal queue ──► OutputRelay ──► EventQueue
//!                              │
//!                         MarketCache
//! ```
//!
//! A [`StreamRunner`] owns one listener and one relay and keeps the
//! subscription alive across transient provider failures.

pub mod listener;
pub mod reconnect;
pub mod relay;
pub mod runner;

pub use listener::StreamListener;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use relay::OutputRelay;
pub use runner::{RunnerState, StreamRunner, StreamRunnerError};
