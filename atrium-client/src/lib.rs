//! Atrium Client - Authenticated backend access
//!
//! Cookie-based HTTP client, single-flight session refresh, and the
//! periodic session check worker

pub mod http;
pub mod refresh;
pub mod worker;

pub use http::*;
pub use refresh::*;
pub use worker::*;
