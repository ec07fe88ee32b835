//! Conversational HTTP surface.
//!
//! - `POST /api/agent/chat` accepts `{sessionId, message}`, returns `{reply}`
//! - `GET  /dev/orders` returns the raw order listing for local inspection

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ordesk_agent::runtime::AgentRuntime;
use ordesk_core::errors::InterfaceError;
use ordesk_db::DbPool;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::error;

#[derive(Clone)]
pub struct ChatState {
    agent_runtime: Arc<AgentRuntime>,
    db_pool: DbPool,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
}

#[derive(Debug, Serialize)]
pub struct ChatError {
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DevOrder {
    id: String,
    customer_id: String,
    status: String,
    created_at: String,
    deleted_at: Option<String>,
    deleted_by: Option<String>,
    delete_reason: Option<String>,
    version: i64,
}

pub fn router(agent_runtime: Arc<AgentRuntime>, db_pool: DbPool) -> Router {
    Router::new()
        .route("/api/agent/chat", post(chat))
        .route("/dev/orders", get(dev_orders))
        .with_state(ChatState { agent_runtime, db_pool })
}

async fn chat(State(state): State<ChatState>, Json(request): Json<ChatRequest>) -> Response {
    let session_id = request.session_id.trim();
    if session_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ChatError { error: "sessionId is required".to_string() }),
        )
            .into_response();
    }

    match state.agent_runtime.chat(session_id, &request.message).await {
        Ok(reply) => (StatusCode::OK, Json(ChatResponse { reply })).into_response(),
        Err(agent_error) => {
            let interface =
                InterfaceError::service_unavailable(agent_error.to_string(), session_id);
            error!(
                event_name = "chat.turn_failed",
                session_id,
                correlation_id = interface.correlation_id(),
                error = %agent_error,
                "chat turn terminated by upstream failure"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ChatResponse { reply: interface.user_message().to_string() }),
            )
                .into_response()
        }
    }
}

async fn dev_orders(State(state): State<ChatState>) -> Response {
    let rows = sqlx::query(
        "SELECT id, customer_id, status, created_at, deleted_at, deleted_by, delete_reason, version
         FROM orders ORDER BY created_at DESC",
    )
    .fetch_all(&state.db_pool)
    .await;

    match rows {
        Ok(rows) => {
            let orders: Vec<DevOrder> = rows
                .iter()
                .map(|row| DevOrder {
                    id: row.get("id"),
                    customer_id: row.get("customer_id"),
                    status: row.get("status"),
                    created_at: row.get("created_at"),
                    deleted_at: row.get("deleted_at"),
                    deleted_by: row.get("deleted_by"),
                    delete_reason: row.get("delete_reason"),
                    version: row.get("version"),
                })
                .collect();
            (StatusCode::OK, Json(orders)).into_response()
        }
        Err(db_error) => {
            error!(
                event_name = "chat.dev_orders_failed",
                error = %db_error,
                "order listing query failed"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ChatError { error: "order store unavailable".to_string() }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use ordesk_agent::llm::{ModelTurn, ScriptedLlmClient, ToolInvocation};
    use ordesk_agent::runtime::AgentRuntime;
    use ordesk_agent::tools::OrderToolbox;
    use ordesk_core::audit::InMemoryAuditSink;
    use ordesk_core::config::AppConfig;
    use ordesk_db::repositories::SqlOrderRepository;
    use ordesk_db::{connect_with_settings, migrations, DbPool, SeedOrders};

    async fn test_pool() -> DbPool {
        // Single connection on a private in-memory database: no cross-test
        // state, and every query reuses the one live connection.
        let pool =
            connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrate");
        pool
    }

    fn test_router(pool: DbPool, turns: Vec<ModelTurn>) -> axum::Router {
        let toolbox = OrderToolbox::new(
            Arc::new(SqlOrderRepository::new(pool.clone())),
            Arc::new(InMemoryAuditSink::default()),
        );
        let runtime = AgentRuntime::new(
            Arc::new(ScriptedLlmClient::new(turns)),
            Arc::new(toolbox),
            &AppConfig::default().agent,
        );
        super::router(Arc::new(runtime), pool)
    }

    async fn post_chat(router: axum::Router, payload: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/agent/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value: Value = serde_json::from_slice(&bytes).expect("json body");
        (status, value)
    }

    #[tokio::test]
    async fn greeting_messages_get_the_deterministic_reply() {
        let pool = test_pool().await;
        let router = test_router(pool.clone(), vec![]);

        let (status, body) =
            post_chat(router, json!({"sessionId": "s1", "message": "good evening"})).await;

        assert_eq!(status, StatusCode::OK);
        assert!(body["reply"].as_str().expect("reply").starts_with("Hello!"));

        pool.close().await;
    }

    #[tokio::test]
    async fn tool_backed_turns_return_the_model_synthesis() {
        let pool = test_pool().await;
        SeedOrders::load(&pool).await.expect("seed");

        let router = test_router(
            pool.clone(),
            vec![
                ModelTurn::ToolCall(ToolInvocation {
                    id: "call-1".to_string(),
                    name: "get_order_status".to_string(),
                    arguments: json!({"orderId": "A-001"}),
                }),
                ModelTurn::Reply("Order A-001 is PROCESSING for acme.".to_string()),
            ],
        );

        let (status, body) =
            post_chat(router, json!({"sessionId": "s1", "message": "where is A-001?"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "Order A-001 is PROCESSING for acme.");

        pool.close().await;
    }

    #[tokio::test]
    async fn upstream_failures_produce_a_generic_reply() {
        let pool = test_pool().await;
        let router = test_router(pool.clone(), vec![]);

        let (status, body) =
            post_chat(router, json!({"sessionId": "s1", "message": "count my orders"})).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            body["reply"],
            "The assistant is temporarily unavailable. Please retry shortly."
        );

        pool.close().await;
    }

    #[tokio::test]
    async fn blank_session_ids_are_rejected() {
        let pool = test_pool().await;
        let router = test_router(pool.clone(), vec![]);

        let (status, body) =
            post_chat(router, json!({"sessionId": "  ", "message": "hello"})).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "sessionId is required");

        pool.close().await;
    }

    #[tokio::test]
    async fn dev_listing_returns_persisted_orders() {
        let pool = test_pool().await;
        SeedOrders::load(&pool).await.expect("seed");
        let router = test_router(pool.clone(), vec![]);

        let response = router
            .oneshot(Request::builder().uri("/dev/orders").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let orders: Value = serde_json::from_slice(&bytes).expect("json body");
        let orders = orders.as_array().expect("array");
        assert_eq!(orders.len(), 2);
        assert!(orders.iter().any(|o| o["id"] == "A-001" && o["status"] == "PROCESSING"));
        assert!(orders.iter().any(|o| o["id"] == "12345" && o["status"] == "SHIPPED"));

        pool.close().await;
    }
}
