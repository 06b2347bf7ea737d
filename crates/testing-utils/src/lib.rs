//! # Traza Testing Utils
//!
//! Shared test doubles and helpers for the workspace crates.
//!
//! - **Recording APM backend**: captures every transaction, span, label and error
//! - **Failing APM backend**: active backend whose every call errors
//! - **Config builders**: `TrazaConfig` with test-friendly defaults
//! - **Helpers**: in-memory loggers, polling, elapsed-time format checks
//!
//! ```toml
//! [dev-dependencies]
//! traza-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
