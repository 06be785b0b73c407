//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `StrategyRegistry`: registers strategies and the streams they attach to
//! - `Dispatcher`: routes inbound events to attached strategies
//! - `EventQueue`: bounded queue shared by every stream and the dispatcher

pub mod dispatcher;
pub mod queue;
pub mod registry;

pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use queue::{EventQueue, EventReceiver, QueueError, event_queue};
pub use registry::{RegistryError, StrategyRegistration, StrategyRegistry};
