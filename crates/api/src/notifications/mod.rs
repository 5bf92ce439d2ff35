//! Real-time notification delivery.
//!
//! The [`EventDispatcher`] subscribes to the market event bus and pushes
//! each lifecycle event to the rooms of the identities it concerns.

pub mod dispatcher;

pub use dispatcher::EventDispatcher;
