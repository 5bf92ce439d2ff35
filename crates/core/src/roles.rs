//! Well-known role name constants.
//!
//! These must match the `role` column values seeded in the `users` table
//! migration and the `role` claim of access tokens.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CLIENT: &str = "client";
pub const ROLE_TECHNICIAN: &str = "technician";
