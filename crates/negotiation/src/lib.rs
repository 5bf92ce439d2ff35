//! The RepairLink request lifecycle engine.
//!
//! - [`lifecycle::LifecycleEngine`] -- guarded transitions over the
//!   service-request aggregate, its offer ledger and its alternative-date
//!   ledger. Publishes a [`repairlink_events::MarketEvent`] after each commit.
//! - [`store::MarketStore`] -- persistence port with a PostgreSQL adapter
//!   ([`postgres::PgMarketStore`]) and an in-memory adapter
//!   ([`memory::InMemoryStore`]).
//! - [`clock::Clock`] -- time source, swappable in tests.

pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{NegotiationError, NegotiationResult};
pub use lifecycle::LifecycleEngine;
