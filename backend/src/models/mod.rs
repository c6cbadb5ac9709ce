//! Database models for the Farm Advisory Platform
//!
//! Re-exports models from the shared crate

pub use shared::models::*;
