//! Reference service wiring the instrumentation crates into a small payments API.

pub mod app;
pub mod cli;
pub mod payments;
pub mod shutdown;

pub use app::{Application, Instrumentation};
pub use shutdown::ShutdownManager;
