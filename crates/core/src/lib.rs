pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::order::{Order, OrderId, OrderStatus};
pub use errors::{DomainError, InterfaceError};
