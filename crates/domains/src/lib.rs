//! # domains
//!
//! Models, the error taxonomy, and the port traits of the social graph
//! service. No I/O lives here.

pub mod errors;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;
