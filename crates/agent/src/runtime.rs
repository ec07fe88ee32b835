use std::sync::Arc;

use serde_json::json;
use thiserror::Error;

use ordesk_core::config::AgentConfig;

use crate::conversation::{ConversationMemory, ConversationTurn, GreetingDetector, TurnRole};
use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError, ModelTurn};
use crate::tools::{OrderToolbox, ToolError};

const GREETING_REPLY: &str = "Hello! Who do I have the pleasure of speaking with today? \
                              How can I assist you today?";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("tool execution failed: {0}")]
    Tool(#[from] ToolError),
    #[error("model exceeded {0} tool rounds without producing a reply")]
    ToolRoundsExhausted(u32),
}

/// Drives one chat turn: deterministic shortcut where possible, otherwise a
/// bounded model/tool loop over the session's memory window.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    toolbox: Arc<OrderToolbox>,
    memory: ConversationMemory,
    greetings: GreetingDetector,
    system_policy: String,
    max_tool_rounds: u32,
}

impl AgentRuntime {
    pub fn new(llm: Arc<dyn LlmClient>, toolbox: Arc<OrderToolbox>, config: &AgentConfig) -> Self {
        Self {
            llm,
            toolbox,
            memory: ConversationMemory::new(config.memory_window),
            greetings: GreetingDetector::new(),
            system_policy: system_policy(&config.default_actor),
            max_tool_rounds: config.max_tool_rounds,
        }
    }

    /// Turns a raw user message into a reply. Tool results are never
    /// interpreted here; presentation is delegated to the model under the
    /// system policy.
    pub async fn chat(&self, session_id: &str, message: &str) -> Result<String, AgentError> {
        let message = message.trim();
        if self.greetings.is_greeting(message) {
            tracing::debug!(
                event_name = "agent.greeting_shortcut",
                session_id,
                "replied deterministically without model or memory"
            );
            return Ok(GREETING_REPLY.to_string());
        }

        self.memory.append(session_id, ConversationTurn::user(message)).await;

        let mut messages = vec![ChatMessage::System { content: self.system_policy.clone() }];
        for turn in self.memory.history(session_id).await {
            messages.push(match turn.role {
                TurnRole::User => ChatMessage::User { content: turn.content },
                TurnRole::Assistant => ChatMessage::Assistant { content: turn.content },
            });
        }

        let tools = OrderToolbox::specs();
        let mut rounds = 0u32;

        loop {
            let request = CompletionRequest { messages: messages.clone(), tools: tools.clone() };
            match self.llm.chat(&request).await? {
                ModelTurn::Reply(reply) => {
                    self.memory.append(session_id, ConversationTurn::assistant(reply.clone())).await;
                    tracing::info!(
                        event_name = "agent.turn_completed",
                        session_id,
                        tool_rounds = rounds,
                        "chat turn completed"
                    );
                    return Ok(reply);
                }
                ModelTurn::ToolCall(call) => {
                    rounds += 1;
                    if rounds > self.max_tool_rounds {
                        return Err(AgentError::ToolRoundsExhausted(self.max_tool_rounds));
                    }

                    let outcome =
                        self.toolbox.dispatch(&call.name, call.arguments.clone(), session_id).await;
                    let (ok, payload) = match outcome {
                        Ok(value) => (true, value),
                        Err(error) if error.is_model_recoverable() => {
                            (false, json!({"error": error.to_string()}))
                        }
                        Err(error) => return Err(AgentError::Tool(error)),
                    };

                    tracing::info!(
                        event_name = "agent.tool_dispatched",
                        session_id,
                        tool = %call.name,
                        ok,
                        round = rounds,
                        "tool call dispatched"
                    );

                    messages.push(ChatMessage::AssistantToolCall { call: call.clone() });
                    messages.push(ChatMessage::ToolResult {
                        call_id: call.id,
                        name: call.name,
                        content: payload.to_string(),
                    });
                }
            }
        }
    }
}

fn system_policy(default_actor: &str) -> String {
    format!(
        "You are the Ordesk order assistant.\n\
         - Understand the user's intent.\n\
         - If a tool will give a more accurate answer, call it with precise args.\n\
         - When a tool returns data, include returned IDs in your final answer.\n\
         \n\
         DELETION POLICY:\n\
         - For delete operations you MUST require explicit confirmation (confirm:true) \
         and a short reason.\n\
         - Include an `actor` field; if not available, use \"{default_actor}\".\n\
         - Never attempt to delete SHIPPED or DELIVERED orders; suggest cancel/return instead."
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use ordesk_core::audit::InMemoryAuditSink;
    use ordesk_core::config::AgentConfig;
    use ordesk_core::domain::order::{Order, OrderId, OrderStatus};
    use ordesk_db::repositories::{InMemoryOrderRepository, OrderRepository};

    use super::{AgentError, AgentRuntime};
    use crate::llm::{ChatMessage, ModelTurn, ScriptedLlmClient, ToolInvocation};
    use crate::tools::OrderToolbox;

    fn agent_config() -> AgentConfig {
        AgentConfig {
            memory_window: 20,
            max_tool_rounds: 4,
            default_actor: "system".to_string(),
        }
    }

    fn runtime_with(
        turns: Vec<ModelTurn>,
    ) -> (AgentRuntime, Arc<ScriptedLlmClient>, Arc<InMemoryOrderRepository>) {
        let repo = Arc::new(InMemoryOrderRepository::default());
        let toolbox =
            Arc::new(OrderToolbox::new(repo.clone(), Arc::new(InMemoryAuditSink::default())));
        let llm = Arc::new(ScriptedLlmClient::new(turns));
        let runtime = AgentRuntime::new(llm.clone(), toolbox, &agent_config());
        (runtime, llm, repo)
    }

    fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ModelTurn {
        ModelTurn::ToolCall(ToolInvocation {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        })
    }

    #[tokio::test]
    async fn greetings_short_circuit_without_model_or_memory() {
        let (runtime, llm, _repo) = runtime_with(vec![]);

        let reply = runtime.chat("s1", "  good morning team  ").await.expect("greeting");
        assert!(reply.starts_with("Hello!"));
        assert!(llm.requests().is_empty());

        // A later real message sees no greeting turn in its context.
        let (runtime, llm, _repo) =
            runtime_with(vec![ModelTurn::Reply("Sure.".to_string())]);
        runtime.chat("s1", "HI").await.expect("greeting");
        runtime.chat("s1", "how many orders do we have?").await.expect("reply");

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let user_turns = requests[0]
            .messages
            .iter()
            .filter(|m| matches!(m, ChatMessage::User { .. }))
            .count();
        assert_eq!(user_turns, 1);
    }

    #[tokio::test]
    async fn near_greetings_still_reach_the_model() {
        let (runtime, llm, _repo) =
            runtime_with(vec![ModelTurn::Reply("Looking into it.".to_string())]);

        let reply = runtime.chat("s1", "hidden fee on my order").await.expect("reply");
        assert_eq!(reply, "Looking into it.");
        assert_eq!(llm.requests().len(), 1);
    }

    #[tokio::test]
    async fn tool_calls_are_dispatched_and_fed_back() {
        let (runtime, llm, repo) = runtime_with(vec![
            tool_call("call-1", "get_order_status", json!({"orderId": "A-001"})),
            ModelTurn::Reply("Order A-001 is PROCESSING.".to_string()),
        ]);
        repo.save(Order::new(OrderId("A-001".to_string()), "acme", OrderStatus::Processing))
            .await
            .expect("seed");

        let reply = runtime.chat("s1", "what's the status of A-001?").await.expect("reply");
        assert_eq!(reply, "Order A-001 is PROCESSING.");

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        let fed_back = requests[1]
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::ToolResult { call_id, content, .. } if call_id == "call-1" => {
                    Some(content.clone())
                }
                _ => None,
            })
            .expect("tool result fed back to the model");
        assert!(fed_back.contains("PROCESSING"));

        // System policy and catalogue travel with every round.
        assert!(matches!(requests[0].messages[0], ChatMessage::System { .. }));
        assert_eq!(requests[0].tools.len(), 6);
    }

    #[tokio::test]
    async fn validation_failures_are_fed_back_as_structured_data() {
        let (runtime, llm, _repo) = runtime_with(vec![
            tool_call("call-1", "create_order", json!({"customerId": "acme", "status": "BROKEN"})),
            ModelTurn::Reply("That status is not valid.".to_string()),
        ]);

        let reply = runtime.chat("s1", "create a BROKEN order for acme").await.expect("reply");
        assert_eq!(reply, "That status is not valid.");

        let requests = llm.requests();
        let fed_back = requests[1]
            .messages
            .iter()
            .find_map(|m| match m {
                ChatMessage::ToolResult { content, .. } => Some(content.clone()),
                _ => None,
            })
            .expect("error payload fed back");
        assert!(fed_back.contains("error"));
        assert!(fed_back.contains("BROKEN"));
    }

    #[tokio::test]
    async fn runaway_tool_loops_are_bounded() {
        let calls: Vec<ModelTurn> =
            (0..6).map(|i| tool_call(&format!("call-{i}"), "count_orders", json!({}))).collect();
        let (runtime, _llm, _repo) = runtime_with(calls);

        let error = runtime.chat("s1", "count orders forever").await.expect_err("bounded");
        assert!(matches!(error, AgentError::ToolRoundsExhausted(4)));
    }

    #[tokio::test]
    async fn both_sides_of_the_exchange_land_in_memory() {
        let (runtime, llm, _repo) = runtime_with(vec![
            ModelTurn::Reply("First answer.".to_string()),
            ModelTurn::Reply("Second answer.".to_string()),
        ]);

        runtime.chat("s1", "first question").await.expect("reply");
        runtime.chat("s1", "second question").await.expect("reply");

        let requests = llm.requests();
        // Second turn's context: prior user + assistant turns, then the new user turn.
        let contents: Vec<String> = requests[1]
            .messages
            .iter()
            .filter_map(|m| match m {
                ChatMessage::User { content } | ChatMessage::Assistant { content } => {
                    Some(content.clone())
                }
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["first question", "First answer.", "second question"]);
    }

    #[tokio::test]
    async fn model_failure_surfaces_as_upstream_error() {
        let (runtime, _llm, _repo) = runtime_with(vec![]);
        let error = runtime.chat("s1", "anything at all").await.expect_err("script exhausted");
        assert!(matches!(error, AgentError::Llm(_)));
    }
}
