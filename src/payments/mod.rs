//! Reference payments module: controller -> service -> repository port, every
//! method routed through the execution wrapper.

pub mod controller;
pub mod events;
pub mod model;
pub mod repository;
pub mod service;

pub use controller::{routes, PaymentsController};
pub use events::PaymentEventsHandler;
pub use model::{CreatePaymentRequest, Payment, PaymentEvent, PaymentQuery, PaymentStatus};
pub use repository::{InMemoryPaymentRepository, PaymentRepository};
pub use service::{PaymentsService, PAYMENT_EVENTS_TOPIC};
