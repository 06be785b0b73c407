//! Configuration Module
//!
//! Configuration loading for the stream router.

mod settings;

pub use settings::{ConfigError, DispatchSettings, RouterConfig, StreamSettings, load_dotenv};
