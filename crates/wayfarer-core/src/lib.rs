//! Shared domain types, configuration, errors, and events for Wayfarer.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::WayfarerConfig;
pub use error::{Result, WayfarerError};
pub use events::{ChatEvent, EventBus, Subscription};
pub use types::*;
