//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the streaming provider and its listeners.
pub mod ports;

/// Strategy registration, event dispatch and the shared event queue.
pub mod services;
