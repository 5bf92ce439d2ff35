//! Domain primitives shared by every RepairLink crate.
//!
//! This crate has zero internal dependencies so it can be used by the
//! repository layer, the negotiation engine and the API server alike.

pub mod directory;
pub mod error;
pub mod negotiation;
pub mod realtime;
pub mod roles;
pub mod types;
