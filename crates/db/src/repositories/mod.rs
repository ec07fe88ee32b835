use async_trait::async_trait;
use thiserror::Error;

use ordesk_core::domain::order::{Order, OrderId, OrderStatus};

pub mod memory;
pub mod order;

pub use memory::InMemoryOrderRepository;
pub use order::SqlOrderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    /// Optimistic-locking failure: the stored row no longer carries the
    /// version the writer read. The caller re-reads and re-applies.
    #[error("version conflict on order `{id}`: stored row does not match version {version}")]
    VersionConflict { id: String, version: i64 },
}

impl RepositoryError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Durable order persistence. No caller bypasses this for order state, and
/// nothing here ever physically deletes a row.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn exists(&self, id: &OrderId) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders for one customer, newest-created first.
    async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<Order>, RepositoryError>;

    /// Orders in one status, newest-created first.
    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError>;

    async fn count(&self) -> Result<i64, RepositoryError>;

    /// Insert (version 0 in memory, stored as 1) or compare-and-swap update
    /// (stored version must equal the carried version; bumped on success).
    /// Stale writers get `RepositoryError::VersionConflict`.
    async fn save(&self, order: Order) -> Result<(), RepositoryError>;
}
