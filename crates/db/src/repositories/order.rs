use chrono::{DateTime, Utc};
use sqlx::Row;

use ordesk_core::domain::order::{Order, OrderId, OrderStatus};

use super::{OrderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_order(row: &sqlx::sqlite::SqliteRow) -> Result<Order, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_id: String =
        row.try_get("customer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deleted_at_str: Option<String> =
        row.try_get("deleted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deleted_by: Option<String> =
        row.try_get("deleted_by").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let delete_reason: Option<String> =
        row.try_get("delete_reason").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let version: i64 =
        row.try_get("version").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let status = OrderStatus::parse(&status_str)
        .map_err(|e| RepositoryError::Decode(format!("order `{id}`: {e}")))?;
    let created_at = parse_timestamp(&id, "created_at", &created_at_str)?;
    let deleted_at = match deleted_at_str {
        Some(raw) => Some(parse_timestamp(&id, "deleted_at", &raw)?),
        None => None,
    };

    Ok(Order {
        id: OrderId(id),
        customer_id,
        status,
        created_at,
        deleted_at,
        deleted_by,
        delete_reason,
        version,
    })
}

fn parse_timestamp(id: &str, column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("order `{id}` {column}: {e}")))
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(db) if db.kind() == sqlx::error::ErrorKind::UniqueViolation
    )
}

const SELECT_COLUMNS: &str = "id, customer_id, status, created_at, deleted_at, deleted_by, \
                              delete_reason, version";

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn exists(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE id = ?")
            .bind(&id.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM orders WHERE id = ?"))
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_order(r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders WHERE customer_id = ? ORDER BY created_at DESC"
        ))
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect::<Result<Vec<_>, _>>()
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders WHERE status = ? ORDER BY created_at DESC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect::<Result<Vec<_>, _>>()
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM orders").fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn save(&self, order: Order) -> Result<(), RepositoryError> {
        let deleted_at_str = order.deleted_at.map(|dt| dt.to_rfc3339());

        if order.version == 0 {
            let inserted = sqlx::query(
                "INSERT INTO orders (id, customer_id, status, created_at, deleted_at, deleted_by,
                                     delete_reason, version)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 1)",
            )
            .bind(&order.id.0)
            .bind(&order.customer_id)
            .bind(order.status.as_str())
            .bind(order.created_at.to_rfc3339())
            .bind(&deleted_at_str)
            .bind(&order.deleted_by)
            .bind(&order.delete_reason)
            .execute(&self.pool)
            .await;

            return match inserted {
                Ok(_) => Ok(()),
                Err(ref error) if is_unique_violation(error) => {
                    Err(RepositoryError::VersionConflict { id: order.id.0.clone(), version: 0 })
                }
                Err(error) => Err(RepositoryError::Database(error)),
            };
        }

        // created_at is immutable; it is deliberately absent from the SET list.
        let updated = sqlx::query(
            "UPDATE orders
             SET customer_id = ?, status = ?, deleted_at = ?, deleted_by = ?,
                 delete_reason = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&order.customer_id)
        .bind(order.status.as_str())
        .bind(&deleted_at_str)
        .bind(&order.deleted_by)
        .bind(&order.delete_reason)
        .bind(&order.id.0)
        .bind(order.version)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(RepositoryError::VersionConflict {
                id: order.id.0.clone(),
                version: order.version,
            });
        }

        Ok(())
    }
}
