//! # Traza API
//!
//! Inbound collaborators of the instrumentation layer. Each entry point opens
//! the transaction context for the work it starts:
//!
//! - **HTTP**: [`middleware::transaction_context`] seeds the scope from
//!   `x-transaction-id` (or a fresh id) and echoes it back;
//!   [`middleware::request_timeout`] answers late requests with a 504 envelope;
//!   [`ApiError`] turns envelopes into responses.
//! - **Messages**: [`MessageConsumer`] seeds the scope per message and decides
//!   ack, retry or dead letter from the envelope it gets back.
//! - **Jobs**: [`JobRunner`] gives every run a fresh id and logs failures.

pub mod consumer;
pub mod error;
pub mod health;
pub mod jobs;
pub mod middleware;
pub mod response;

pub use consumer::{Disposition, MessageConsumer, MessageEnvelope, MessageHandler};
pub use error::{envelope_response, ApiError, ApiResult};
pub use jobs::{run_job, JobRunner};
pub use middleware::{TransactionSeed, TRANSACTION_ID_HEADER};
pub use response::{ApiResponse, ListResponse};
