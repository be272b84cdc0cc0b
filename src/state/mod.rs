//! Liveness state for monitored targets.
//!
//! Everything here is owned by the server task; nothing is shared.

mod models;
mod store;

pub use models::*;
pub use store::*;
