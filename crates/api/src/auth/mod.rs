//! Authentication primitives.
//!
//! Identity and credentials live outside this service; callers present an
//! HS256 access token whose `sub` is the user id and whose `role` is one of
//! the constants in [`repairlink_core::roles`].

pub mod jwt;
