use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use ordesk_core::audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink};
use ordesk_core::domain::order::{Order, OrderId, OrderStatus};
use ordesk_db::repositories::{OrderRepository, RepositoryError};

use crate::guardrails::{DeleteDecision, DeleteGuardrail};
use crate::llm::ToolSpec;

pub const CREATE_ORDER: &str = "create_order";
pub const GET_ORDER_STATUS: &str = "get_order_status";
pub const ORDERS_FOR_CUSTOMER: &str = "orders_for_customer";
pub const COUNT_ORDERS: &str = "count_orders";
pub const ORDERS_BY_STATUS: &str = "orders_by_status";
pub const DELETE_ORDER: &str = "delete_order";

#[derive(Debug, Error)]
pub enum ToolError {
    /// Malformed or missing arguments; handed back to the model as data so
    /// it can retry with corrected input.
    #[error("invalid tool arguments: {0}")]
    Validation(String),
    /// Optimistic-locking loser; handed back to the model as data so it can
    /// re-read and retry.
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    /// Store infrastructure failure; fatal for the current turn.
    #[error("order store failure: {0}")]
    Store(RepositoryError),
}

impl From<RepositoryError> for ToolError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::VersionConflict { .. } => Self::Conflict(error.to_string()),
            other => Self::Store(other),
        }
    }
}

impl ToolError {
    /// True for outcomes the model can reason about and correct; false for
    /// infrastructure failures that terminate the turn.
    pub fn is_model_recoverable(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Conflict(_) | Self::UnknownTool(_))
    }
}

// ----- wire-contract request/response records (camelCase field names) -----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub customer_id: String,
    pub status: String,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusRequest {
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub order_id: String,
    pub customer_id: Option<String>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrdersRequest {
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: String,
    pub customer_id: String,
    pub status: String,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerOrdersResponse {
    pub customer_id: String,
    pub count: usize,
    pub orders: Vec<OrderSummary>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub total: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersByStatusResponse {
    pub status: String,
    pub count: usize,
    pub orders: Vec<OrderSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOrderRequest {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOrderResult {
    pub order_id: Option<String>,
    pub deleted: bool,
    pub message: String,
    pub status: String,
}

fn summary(order: &Order) -> OrderSummary {
    OrderSummary {
        order_id: order.id.0.clone(),
        customer_id: order.customer_id.clone(),
        status: order.status.as_str().to_string(),
    }
}

fn parse_status(raw: Option<&str>) -> Result<OrderStatus, ToolError> {
    let raw = raw.map(str::trim).unwrap_or("");
    if raw.is_empty() {
        return Err(ToolError::Validation("status is required".to_string()));
    }
    OrderStatus::parse(raw).map_err(|e| ToolError::Validation(e.to_string()))
}

/// The fixed catalogue of model-callable operations. Stateless per call:
/// every invocation is validated and executed from scratch against the
/// order store.
pub struct OrderToolbox {
    repo: Arc<dyn OrderRepository>,
    audit: Arc<dyn AuditSink>,
}

impl OrderToolbox {
    pub fn new(repo: Arc<dyn OrderRepository>, audit: Arc<dyn AuditSink>) -> Self {
        Self { repo, audit }
    }

    /// Static catalogue handed to the model. Names and argument field names
    /// are the wire contract; descriptions only aid tool selection.
    pub fn specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: CREATE_ORDER.to_string(),
                description: "Create (or upsert) an order. Required: customerId, status \
                              (NEW|PROCESSING|SHIPPED|DELIVERED|CANCELLED|BACKORDERED). \
                              orderId is optional: if missing, one is generated."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "customerId": {"type": "string", "description": "Owning customer id"},
                        "status": {
                            "type": "string",
                            "enum": ["NEW", "PROCESSING", "SHIPPED", "DELIVERED", "CANCELLED", "BACKORDERED"]
                        },
                        "orderId": {"type": "string", "description": "Existing id to overwrite, or omit to generate"}
                    },
                    "required": ["customerId", "status"]
                }),
            },
            ToolSpec {
                name: GET_ORDER_STATUS.to_string(),
                description: "Return order status and owner by orderId".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"orderId": {"type": "string"}},
                    "required": ["orderId"]
                }),
            },
            ToolSpec {
                name: ORDERS_FOR_CUSTOMER.to_string(),
                description: "List orders for a given customerId".to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {"customerId": {"type": "string"}},
                    "required": ["customerId"]
                }),
            },
            ToolSpec {
                name: COUNT_ORDERS.to_string(),
                description: "Return total number of orders in the system".to_string(),
                parameters: json!({"type": "object", "properties": {}, "required": []}),
            },
            ToolSpec {
                name: ORDERS_BY_STATUS.to_string(),
                description: "List orders by status \
                              (NEW|PROCESSING|SHIPPED|DELIVERED|CANCELLED|BACKORDERED|DELETED)"
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "status": {
                            "type": "string",
                            "enum": ["NEW", "PROCESSING", "SHIPPED", "DELIVERED", "CANCELLED", "BACKORDERED", "DELETED"]
                        }
                    },
                    "required": ["status"]
                }),
            },
            ToolSpec {
                name: DELETE_ORDER.to_string(),
                description: "Soft-delete an order. Requires explicit confirmation and a short \
                              reason. Allowed current statuses: NEW, PROCESSING, CANCELLED, \
                              BACKORDERED. Blocks SHIPPED and DELIVERED. Idempotent if already \
                              DELETED."
                    .to_string(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "orderId": {"type": "string"},
                        "confirm": {"type": "boolean", "description": "Must be true to perform the deletion"},
                        "reason": {"type": "string", "description": "Required when confirm is true"},
                        "actor": {"type": "string", "description": "Who requested the deletion"}
                    },
                    "required": ["orderId", "confirm"]
                }),
            },
        ]
    }

    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Value,
        correlation_id: &str,
    ) -> Result<Value, ToolError> {
        match name {
            CREATE_ORDER => to_value(self.create_order(decode(name, arguments)?).await?),
            GET_ORDER_STATUS => to_value(self.get_order_status(decode(name, arguments)?).await?),
            ORDERS_FOR_CUSTOMER => {
                to_value(self.orders_for_customer(decode(name, arguments)?).await?)
            }
            COUNT_ORDERS => to_value(self.count_orders().await?),
            ORDERS_BY_STATUS => to_value(self.orders_by_status(decode(name, arguments)?).await?),
            DELETE_ORDER => {
                to_value(self.delete_order(decode(name, arguments)?, correlation_id).await?)
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }

    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreateOrderResponse, ToolError> {
        let customer_id = request.customer_id.as_deref().map(str::trim).unwrap_or("");
        if customer_id.is_empty() {
            return Err(ToolError::Validation("customerId is required".to_string()));
        }

        let status = parse_status(request.status.as_deref())?;
        if status == OrderStatus::Deleted {
            return Err(ToolError::Validation(
                "status DELETED cannot be assigned via create_order; use delete_order".to_string(),
            ));
        }

        let order_id = match request.order_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("O-{}", Uuid::new_v4()),
        };

        let existing = self.repo.find_by_id(&OrderId(order_id.clone())).await?;
        let created = existing.is_none();

        // Upsert is an authoritative overwrite: it bypasses lifecycle
        // transition checks and may pull an order out of DELETED, in which
        // case the soft-delete triple is cleared to keep the invariant
        // `deleted_at set <=> status DELETED`.
        let order = match existing {
            Some(existing) => Order {
                id: OrderId(order_id.clone()),
                customer_id: customer_id.to_string(),
                status,
                created_at: existing.created_at,
                deleted_at: None,
                deleted_by: None,
                delete_reason: None,
                version: existing.version,
            },
            None => Order::new(OrderId(order_id.clone()), customer_id, status),
        };

        self.repo.save(order).await?;

        Ok(CreateOrderResponse {
            order_id,
            customer_id: customer_id.to_string(),
            status: status.as_str().to_string(),
            created,
        })
    }

    async fn get_order_status(
        &self,
        request: OrderStatusRequest,
    ) -> Result<OrderStatusResponse, ToolError> {
        let order_id = request.order_id.as_deref().map(str::trim).unwrap_or("").to_string();
        let found = if order_id.is_empty() {
            None
        } else {
            self.repo.find_by_id(&OrderId(order_id.clone())).await?
        };

        Ok(match found {
            Some(order) => OrderStatusResponse {
                order_id: order.id.0.clone(),
                customer_id: Some(order.customer_id.clone()),
                status: order.status.as_str().to_string(),
            },
            // Absent ids are absorbed into a sentinel rather than an error.
            None => OrderStatusResponse {
                order_id,
                customer_id: None,
                status: "UNKNOWN".to_string(),
            },
        })
    }

    async fn orders_for_customer(
        &self,
        request: CustomerOrdersRequest,
    ) -> Result<CustomerOrdersResponse, ToolError> {
        let customer_id = request.customer_id.as_deref().map(str::trim).unwrap_or("");
        if customer_id.is_empty() {
            return Err(ToolError::Validation("customerId is required".to_string()));
        }

        let orders = self.repo.find_by_customer(customer_id).await?;
        let summaries: Vec<OrderSummary> = orders.iter().map(summary).collect();

        Ok(CustomerOrdersResponse {
            customer_id: customer_id.to_string(),
            count: summaries.len(),
            orders: summaries,
        })
    }

    async fn count_orders(&self) -> Result<CountResponse, ToolError> {
        Ok(CountResponse { total: self.repo.count().await? })
    }

    async fn orders_by_status(
        &self,
        request: StatusQuery,
    ) -> Result<OrdersByStatusResponse, ToolError> {
        let status = parse_status(request.status.as_deref())?;
        let orders = self.repo.find_by_status(status).await?;
        let summaries: Vec<OrderSummary> = orders.iter().map(summary).collect();

        Ok(OrdersByStatusResponse {
            status: status.as_str().to_string(),
            count: summaries.len(),
            orders: summaries,
        })
    }

    async fn delete_order(
        &self,
        request: DeleteOrderRequest,
        correlation_id: &str,
    ) -> Result<DeleteOrderResult, ToolError> {
        let order_id = request.order_id.as_deref().map(str::trim).unwrap_or("").to_string();
        let found = if order_id.is_empty() {
            None
        } else {
            self.repo.find_by_id(&OrderId(order_id.clone())).await?
        };

        let decision = DeleteGuardrail::evaluate(
            &order_id,
            request.confirm,
            request.reason.as_deref(),
            found.as_ref(),
        );

        let result = match decision {
            DeleteDecision::MissingOrderId => DeleteOrderResult {
                order_id: None,
                deleted: false,
                message: "orderId is required".to_string(),
                status: "UNKNOWN".to_string(),
            },
            DeleteDecision::PendingConfirmation => DeleteOrderResult {
                order_id: Some(order_id.clone()),
                deleted: false,
                message: format!(
                    "Confirmation required. Re-issue with confirm:true and a reason, e.g., \
                     delete order {order_id} confirm:true reason:'duplicate entry'"
                ),
                status: "PENDING_CONFIRMATION".to_string(),
            },
            DeleteDecision::MissingReason => DeleteOrderResult {
                order_id: Some(order_id.clone()),
                deleted: false,
                message: "Deletion reason is required.".to_string(),
                status: "REJECTED".to_string(),
            },
            DeleteDecision::NotFound => DeleteOrderResult {
                order_id: Some(order_id.clone()),
                deleted: false,
                message: "Order not found.".to_string(),
                status: "UNKNOWN".to_string(),
            },
            DeleteDecision::AlreadyDeleted => DeleteOrderResult {
                order_id: Some(order_id.clone()),
                deleted: true,
                message: "Order already deleted (idempotent).".to_string(),
                status: OrderStatus::Deleted.as_str().to_string(),
            },
            DeleteDecision::Blocked { status } => DeleteOrderResult {
                order_id: Some(order_id.clone()),
                deleted: false,
                message: format!("Deletion blocked for {status}. Use cancel/return workflow."),
                status: status.as_str().to_string(),
            },
            DeleteDecision::NotDeletable { status } => DeleteOrderResult {
                order_id: Some(order_id.clone()),
                deleted: false,
                message: format!("Deletion not allowed from status {status}"),
                status: status.as_str().to_string(),
            },
            DeleteDecision::Allow => {
                let mut order = found.ok_or_else(|| {
                    ToolError::Validation("order vanished between lookup and delete".to_string())
                })?;

                let actor = request.actor.as_deref().unwrap_or("");
                let reason = request.reason.as_deref().unwrap_or("");
                order
                    .soft_delete(actor, reason, Utc::now())
                    .map_err(|e| ToolError::Validation(e.to_string()))?;
                let recorded_actor = order.deleted_by.clone().unwrap_or_default();
                let recorded_reason = order.delete_reason.clone().unwrap_or_default();

                self.repo.save(order).await?;

                self.audit.emit(
                    AuditEvent::new(
                        Some(OrderId(order_id.clone())),
                        None,
                        correlation_id,
                        "order.soft_deleted",
                        AuditCategory::Lifecycle,
                        recorded_actor,
                        AuditOutcome::Success,
                    )
                    .with_metadata("reason", recorded_reason),
                );

                DeleteOrderResult {
                    order_id: Some(order_id.clone()),
                    deleted: true,
                    message: "Order deleted successfully.".to_string(),
                    status: OrderStatus::Deleted.as_str().to_string(),
                }
            }
        };

        Ok(result)
    }
}

fn decode<T: serde::de::DeserializeOwned>(name: &str, arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::Validation(format!("{name}: {e}")))
}

fn to_value<T: Serialize>(response: T) -> Result<Value, ToolError> {
    serde_json::to_value(response)
        .map_err(|e| ToolError::Validation(format!("response serialization failed: {e}")))
}
