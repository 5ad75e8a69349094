//! Atrium Core - Shared data structures and trait definitions
//!
//! This crate defines the types, errors, and seams used by the rest of
//! the Atrium session stack

pub mod config;
pub mod error;
pub mod logging;
pub mod traits;
pub mod types;

// The config types live in types.rs; config.rs adds only impls.
pub use error::*;
pub use logging::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tokio;
pub use tracing;
