//! Domain Layer - Core streaming types and business logic.
//!
//! This layer contains the core domain types for market stream dispatch
//! with no I/O. All types here are pure Rust with serialization support.

/// Live market presence cache.
pub mod cache;

/// Strategy contract and lifecycle.
pub mod strategy;

/// Market data streaming types (identifiers, batches, events).
pub mod streaming;

/// Stream subscription catalog.
pub mod subscription;
