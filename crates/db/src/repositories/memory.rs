use std::collections::HashMap;

use tokio::sync::RwLock;

use ordesk_core::domain::order::{Order, OrderId, OrderStatus};

use super::{OrderRepository, RepositoryError};

/// In-memory order store with the same optimistic-locking contract as the
/// SQL repository. Backs unit tests and local experiments.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    orders
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn exists(&self, id: &OrderId) -> Result<bool, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.contains_key(&id.0))
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(newest_first(
            orders.values().filter(|order| order.customer_id == customer_id).cloned().collect(),
        ))
    }

    async fn find_by_status(&self, status: OrderStatus) -> Result<Vec<Order>, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(newest_first(orders.values().filter(|order| order.status == status).cloned().collect()))
    }

    async fn count(&self) -> Result<i64, RepositoryError> {
        let orders = self.orders.read().await;
        Ok(orders.len() as i64)
    }

    async fn save(&self, mut order: Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored_version = orders.get(&order.id.0).map(|stored| stored.version);

        match (order.version, stored_version) {
            (0, None) => {
                order.version = 1;
                orders.insert(order.id.0.clone(), order);
                Ok(())
            }
            (0, Some(_)) => {
                Err(RepositoryError::VersionConflict { id: order.id.0.clone(), version: 0 })
            }
            (carried, Some(stored)) if carried == stored => {
                // created_at is immutable; keep the stored stamp.
                if let Some(existing) = orders.get(&order.id.0) {
                    order.created_at = existing.created_at;
                }
                order.version = carried + 1;
                orders.insert(order.id.0.clone(), order);
                Ok(())
            }
            (carried, _) => {
                Err(RepositoryError::VersionConflict { id: order.id.0.clone(), version: carried })
            }
        }
    }
}
