use ordesk_core::domain::order::{Order, OrderId, OrderStatus};

use crate::connection::DbPool;
use crate::repositories::{OrderRepository, RepositoryError, SqlOrderRepository};

/// Deterministic demo records: one order that is safely deletable and one
/// SHIPPED order the deletion guardrail must refuse.
const SEED_ORDERS: &[SeedOrderContract] = &[
    SeedOrderContract { order_id: "12345", customer_id: "globex", status: OrderStatus::Shipped },
    SeedOrderContract { order_id: "A-001", customer_id: "acme", status: OrderStatus::Processing },
];

#[derive(Clone, Copy, Debug)]
struct SeedOrderContract {
    order_id: &'static str,
    customer_id: &'static str,
    status: OrderStatus,
}

#[derive(Clone, Debug)]
pub struct SeedResult {
    pub orders_seeded: Vec<String>,
    pub orders_skipped: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct SeedVerification {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

pub struct SeedOrders;

impl SeedOrders {
    /// Loads the demo orders. Idempotent: an id that already exists is left
    /// untouched (never overwritten), mirroring first-boot seeding.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let repo = SqlOrderRepository::new(pool.clone());
        let mut seeded = Vec::new();
        let mut skipped = Vec::new();

        for contract in SEED_ORDERS {
            let id = OrderId(contract.order_id.to_string());
            if repo.exists(&id).await? {
                skipped.push(contract.order_id.to_string());
                continue;
            }
            repo.save(Order::new(id, contract.customer_id, contract.status)).await?;
            seeded.push(contract.order_id.to_string());
        }

        Ok(SeedResult { orders_seeded: seeded, orders_skipped: skipped })
    }

    pub async fn verify(pool: &DbPool) -> Result<SeedVerification, RepositoryError> {
        let repo = SqlOrderRepository::new(pool.clone());
        let mut checks = Vec::new();

        for contract in SEED_ORDERS {
            let found = repo.find_by_id(&OrderId(contract.order_id.to_string())).await?;
            let present = found
                .map(|order| {
                    order.customer_id == contract.customer_id && order.status == contract.status
                })
                .unwrap_or(false);
            checks.push((contract.order_id, present));
        }

        let all_present = checks.iter().all(|(_, present)| *present);
        Ok(SeedVerification { all_present, checks })
    }
}
