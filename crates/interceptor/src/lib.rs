//! Execution wrapper for controller, service and repository methods.
//!
//! ```ignore
//! let instrumented = Instrumented::new("PaymentsService");
//! let payment = instrumented
//!     .execute("find", &[CallArg::text(id)], async { repository.find(id).await })
//!     .await?;
//! ```

pub mod component;
mod failure;
pub mod instrumented;
pub mod request;

pub use component::ComponentType;
pub use instrumented::{Instrumented, TRANSACTION_KIND};
pub use request::{extract_request_snapshot, CallArg, RequestParts};
