use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use ordesk_core::config::{LlmConfig, LlmProvider};

/// One message in the model context window.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatMessage {
    System { content: String },
    User { content: String },
    Assistant { content: String },
    AssistantToolCall { call: ToolInvocation },
    ToolResult { call_id: String, name: String, content: String },
}

/// A tool call requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Catalogue entry handed to the model: name and argument schema are the
/// wire contract, the description only aids tool selection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

/// What the model produced for one round: a final text reply, or a request
/// to invoke one catalogue tool.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelTurn {
    Reply(String),
    ToolCall(ToolInvocation),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model endpoint returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("could not decode model response: {0}")]
    Decode(String),
}

/// The inference backend as an opaque function: context + tool catalogue in,
/// reply or tool call out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, request: &CompletionRequest) -> Result<ModelTurn, LlmError>;
}

/// OpenAI-compatible chat-completions client. Works against OpenAI,
/// Anthropic's compatibility endpoint, or a local Ollama server; the
/// provider only drives the default base URL and auth header.
pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_string());

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn send(&self, request: &CompletionRequest) -> Result<ModelTurn, LlmError> {
        let body = WireRequest {
            model: &self.model,
            messages: request.messages.iter().map(to_wire_message).collect(),
            tools: request.tools.iter().map(to_wire_tool).collect(),
        };

        let mut http_request =
            self.http.post(format!("{}/chat/completions", self.base_url)).json(&body);
        if let Some(api_key) = &self.api_key {
            http_request = http_request.bearer_auth(api_key.expose_secret());
        }

        let response = http_request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let payload: WireResponse =
            response.json().await.map_err(|e| LlmError::Decode(e.to_string()))?;
        decode_turn(payload)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(&self, request: &CompletionRequest) -> Result<ModelTurn, LlmError> {
        let mut attempt = 0u32;
        loop {
            match self.send(request).await {
                Ok(turn) => return Ok(turn),
                Err(error) if attempt < self.max_retries && is_retryable(&error) => {
                    attempt += 1;
                    tracing::warn!(
                        event_name = "llm.retry",
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "model invocation failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Anthropic => "https://api.anthropic.com/v1",
        LlmProvider::Ollama => "http://localhost:11434/v1",
    }
}

fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::Transport(_) => true,
        LlmError::Api { status, .. } => *status == 429 || *status >= 500,
        LlmError::Decode(_) => false,
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    r#type: &'static str,
    function: &'a ToolSpec,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    r#type: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    /// JSON-encoded argument object, per the chat-completions wire format.
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
}

#[derive(Deserialize)]
struct WireResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

fn to_wire_message(message: &ChatMessage) -> WireMessage {
    match message {
        ChatMessage::System { content } => WireMessage {
            role: "system",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::User { content } => WireMessage {
            role: "user",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::Assistant { content } => WireMessage {
            role: "assistant",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: None,
        },
        ChatMessage::AssistantToolCall { call } => WireMessage {
            role: "assistant",
            content: None,
            tool_calls: Some(vec![WireToolCall {
                id: call.id.clone(),
                r#type: "function".to_string(),
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                },
            }]),
            tool_call_id: None,
        },
        ChatMessage::ToolResult { call_id, name: _, content } => WireMessage {
            role: "tool",
            content: Some(content.clone()),
            tool_calls: None,
            tool_call_id: Some(call_id.clone()),
        },
    }
}

fn to_wire_tool(spec: &ToolSpec) -> WireTool<'_> {
    WireTool { r#type: "function", function: spec }
}

fn decode_turn(payload: WireResponse) -> Result<ModelTurn, LlmError> {
    let choice = payload
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Decode("response carried no choices".to_string()))?;

    if let Some(tool_calls) = choice.message.tool_calls {
        if let Some(call) = tool_calls.into_iter().next() {
            let arguments: Value = if call.function.arguments.trim().is_empty() {
                Value::Object(serde_json::Map::new())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    LlmError::Decode(format!(
                        "tool call `{}` carried malformed arguments: {e}",
                        call.function.name
                    ))
                })?
            };
            return Ok(ModelTurn::ToolCall(ToolInvocation {
                id: call.id,
                name: call.function.name,
                arguments,
            }));
        }
    }

    match choice.message.content {
        Some(content) => Ok(ModelTurn::Reply(content)),
        None => Err(LlmError::Decode("response carried neither content nor tool calls".to_string())),
    }
}

/// Deterministic stand-in for the model: replays a fixed script of turns
/// and records every request it saw. Test-only by convention.
#[derive(Default)]
pub struct ScriptedLlmClient {
    script: Mutex<std::collections::VecDeque<ModelTurn>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new(turns: impl IntoIterator<Item = ModelTurn>) -> Self {
        Self {
            script: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn chat(&self, request: &CompletionRequest) -> Result<ModelTurn, LlmError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }

        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };

        next.ok_or_else(|| LlmError::Decode("scripted client exhausted".to_string()))
    }
}
