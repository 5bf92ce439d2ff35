//! RepairLink in-process event bus.
//!
//! - [`EventBus`] -- publish/subscribe hub backed by `tokio::sync::broadcast`.
//! - [`MarketEvent`] -- typed lifecycle events published by the negotiation
//!   engine after each commit and consumed by the notification dispatcher.

pub mod bus;
pub mod market;

pub use bus::EventBus;
pub use market::{Audience, MarketEvent};
