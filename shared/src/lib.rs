//! Shared types and models for the Farm Advisory Platform
//!
//! This crate contains domain types shared between the backend service
//! and any future companion components of the system.

pub mod models;
pub mod types;

pub use models::*;
pub use types::*;
