use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Backordered,
    Deleted,
}

impl OrderStatus {
    /// Parses a wire-format status string. Input is trimmed and matched
    /// case-insensitively; anything outside the closed set is an error,
    /// never a default.
    pub fn parse(value: &str) -> Result<Self, DomainError> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEW" => Ok(Self::New),
            "PROCESSING" => Ok(Self::Processing),
            "SHIPPED" => Ok(Self::Shipped),
            "DELIVERED" => Ok(Self::Delivered),
            "CANCELLED" => Ok(Self::Cancelled),
            "BACKORDERED" => Ok(Self::Backordered),
            "DELETED" => Ok(Self::Deleted),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "NEW",
            Self::Processing => "PROCESSING",
            Self::Shipped => "SHIPPED",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
            Self::Backordered => "BACKORDERED",
            Self::Deleted => "DELETED",
        }
    }

    /// Soft deletion is only reachable from statuses where nothing has left
    /// the warehouse. SHIPPED and DELIVERED orders go through the
    /// cancel/return workflow instead.
    pub fn deletable(&self) -> bool {
        matches!(self, Self::New | Self::Processing | Self::Cancelled | Self::Backordered)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by: Option<String>,
    pub delete_reason: Option<String>,
    /// Optimistic-concurrency stamp: 0 before the first persist, bumped by
    /// the store on every committed write. Writers must carry the version
    /// they read.
    pub version: i64,
}

impl Order {
    pub fn new(id: OrderId, customer_id: impl Into<String>, status: OrderStatus) -> Self {
        Self {
            id,
            customer_id: customer_id.into(),
            status,
            created_at: Utc::now(),
            deleted_at: None,
            deleted_by: None,
            delete_reason: None,
            version: 0,
        }
    }

    /// Applies the soft-delete transition. Idempotent for already-deleted
    /// orders; blocked unconditionally for SHIPPED and DELIVERED.
    pub fn soft_delete(
        &mut self,
        actor: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if self.status == OrderStatus::Deleted {
            return Ok(());
        }
        if reason.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "deletion reason must not be blank".to_string(),
            ));
        }
        if !self.status.deletable() {
            return Err(DomainError::DeletionBlocked { status: self.status });
        }

        let actor = actor.trim();
        self.status = OrderStatus::Deleted;
        self.deleted_at = Some(now);
        self.deleted_by = Some(if actor.is_empty() { "unknown".to_string() } else { actor.to_string() });
        self.delete_reason = Some(reason.trim().to_string());
        Ok(())
    }
}
