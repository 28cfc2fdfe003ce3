//! Shared utilities.
//!
//! Common utilities used across the crate including hashing and path handling.

pub mod hash;
pub mod paths;
