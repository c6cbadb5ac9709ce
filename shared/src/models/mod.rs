//! Domain models for the Farm Advisory Platform

pub mod activity;
pub mod conversation;
pub mod crop;
pub mod disease;
pub mod weather;

pub use activity::*;
pub use conversation::*;
pub use crop::*;
pub use disease::*;
pub use weather::*;
