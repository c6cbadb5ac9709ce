//! HTTP request handlers for the Farm Advisory Platform

pub mod crop_ai;
pub mod disease_detection;
pub mod health;

pub use crop_ai::*;
pub use disease_detection::*;
pub use health::*;
