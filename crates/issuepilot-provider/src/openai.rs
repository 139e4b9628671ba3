use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::{
    ChatRequest, ChatResponse, Choice, Content, ContentPart, Message, Provider, ProviderError,
    Role, ToolUse, Usage,
};

// ---------------------------------------------------------------------------
// Lenient response types for OpenAI-compatible /chat/completions responses.
//
// Every field is optional: compatible endpoints disagree on which fields they
// populate, and `content` is null when the model only requested tool calls.
// These are separate from the internal `Message`/`ChatResponse` types because
// the wire format differs (`tool_calls` with `function.{name,arguments}`
// instead of our internal `ContentPart` representation).
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawChatResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<RawChoice>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Deserialize)]
struct RawChoice {
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    message: Option<RawMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<RawToolCall>>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<RawFunction>,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
}

impl RawChatResponse {
    /// Convert the lenient wire format into our internal `ChatResponse`.
    fn into_chat_response(self) -> ChatResponse {
        let choices = self
            .choices
            .into_iter()
            .map(|c| {
                let raw_msg = c.message.unwrap_or_default();

                let mut parts: Vec<ContentPart> = Vec::new();

                if let Some(text) = &raw_msg.content {
                    if !text.is_empty() {
                        parts.push(ContentPart {
                            content_type: "text".to_string(),
                            text: Some(text.clone()),
                            ..Default::default()
                        });
                    }
                }

                if let Some(tool_calls) = &raw_msg.tool_calls {
                    for tc in tool_calls {
                        let func = tc.function.as_ref();
                        let name = func.and_then(|f| f.name.as_deref()).unwrap_or("");
                        let args_str = func.and_then(|f| f.arguments.as_deref()).unwrap_or("{}");
                        let input: Value =
                            serde_json::from_str(args_str).unwrap_or(serde_json::json!({}));
                        let id = tc
                            .id
                            .clone()
                            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                        parts.push(ContentPart {
                            content_type: "tool_use".to_string(),
                            tool_use: Some(ToolUse {
                                id,
                                name: name.to_string(),
                                input,
                            }),
                            ..Default::default()
                        });
                    }
                }

                let content = if parts.is_empty() {
                    Content::Text(raw_msg.content.unwrap_or_default())
                } else if parts.len() == 1 && parts[0].content_type == "text" {
                    Content::Text(parts.remove(0).text.unwrap_or_default())
                } else {
                    Content::Parts(parts)
                };

                Choice {
                    index: c.index.unwrap_or(0),
                    message: Message {
                        role: match raw_msg.role.as_deref() {
                            Some("system") => Role::System,
                            Some("user") => Role::User,
                            Some("tool") => Role::Tool,
                            _ => Role::Assistant,
                        },
                        content,
                    },
                    finish_reason: c.finish_reason,
                }
            })
            .collect();

        let usage = self.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens.unwrap_or(0),
            completion_tokens: u.completion_tokens.unwrap_or(0),
            total_tokens: u.total_tokens.unwrap_or(0),
        });

        ChatResponse {
            id: self.id.unwrap_or_default(),
            model: self.model.unwrap_or_default(),
            choices,
            usage,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn chat_completions_url(base_url: Option<&str>) -> String {
        match base_url {
            None => OPENAI_API_URL.to_string(),
            Some(base) => {
                if base.ends_with("/chat/completions") {
                    return base.to_string();
                }
                if base.ends_with('/') {
                    format!("{base}chat/completions")
                } else {
                    format!("{base}/chat/completions")
                }
            }
        }
    }

    fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
        let mut converted = Vec::new();

        for message in messages {
            match message.role {
                Role::System => {
                    converted.push(json!({
                        "role": "system",
                        "content": message.content.text(),
                    }));
                }
                Role::User => {
                    converted.push(json!({
                        "role": "user",
                        "content": message.content.text(),
                    }));
                }
                Role::Assistant => {
                    converted.push(Self::assistant_to_wire(&message.content));
                }
                Role::Tool => {
                    converted.extend(Self::tool_results_to_wire(&message.content));
                }
            }
        }

        converted
    }

    fn assistant_to_wire(content: &Content) -> Value {
        match content {
            Content::Text(text) => json!({
                "role": "assistant",
                "content": text,
            }),
            Content::Parts(parts) => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();

                for part in parts {
                    match part.content_type.as_str() {
                        "tool_use" => {
                            if let Some(tool_use) = &part.tool_use {
                                let args = serde_json::to_string(&tool_use.input)
                                    .unwrap_or_else(|_| "{}".to_string());
                                tool_calls.push(json!({
                                    "id": tool_use.id,
                                    "type": "function",
                                    "function": {
                                        "name": tool_use.name,
                                        "arguments": args,
                                    }
                                }));
                            }
                        }
                        _ => {
                            if let Some(part_text) = &part.text {
                                text.push_str(part_text);
                            }
                        }
                    }
                }

                let mut message = Map::new();
                message.insert("role".to_string(), Value::String("assistant".to_string()));
                if tool_calls.is_empty() {
                    message.insert("content".to_string(), Value::String(text));
                } else {
                    message.insert(
                        "content".to_string(),
                        if text.is_empty() {
                            Value::Null
                        } else {
                            Value::String(text)
                        },
                    );
                    message.insert("tool_calls".to_string(), Value::Array(tool_calls));
                }
                Value::Object(message)
            }
        }
    }

    fn tool_results_to_wire(content: &Content) -> Vec<Value> {
        match content {
            Content::Text(text) => {
                if text.is_empty() {
                    Vec::new()
                } else {
                    vec![json!({ "role": "user", "content": text })]
                }
            }
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|part| {
                    part.tool_result.as_ref().map(|tool_result| {
                        json!({
                            "role": "tool",
                            "tool_call_id": tool_result.tool_use_id,
                            "content": tool_result.content,
                        })
                    })
                })
                .collect(),
        }
    }

    fn build_request_body(request: &ChatRequest) -> Value {
        let mut body = Map::new();
        body.insert("model".to_string(), Value::String(request.model.clone()));
        body.insert(
            "messages".to_string(),
            Value::Array(Self::to_wire_messages(&request.messages)),
        );
        if let Some(temperature) = request.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                let wire_tools: Vec<Value> = tools
                    .iter()
                    .map(|tool| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool.parameters,
                            }
                        })
                    })
                    .collect();
                body.insert("tools".to_string(), Value::Array(wire_tools));
            }
        }
        Value::Object(body)
    }

    fn map_error_status(status: u16, body: String) -> ProviderError {
        match status {
            401 | 403 => ProviderError::AuthError(body),
            429 => ProviderError::RateLimit,
            _ => ProviderError::api_error_with_status(body, status),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        if self.config.api_key.trim().is_empty() {
            return Err(ProviderError::ConfigError(
                "OpenAI API key is not configured".to_string(),
            ));
        }

        let url = Self::chat_completions_url(self.config.base_url.as_deref());
        let request_body = Self::build_request_body(&request);

        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Self::map_error_status(status, body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::ApiError(e.to_string()))?;

        let raw: RawChatResponse = serde_json::from_str(&body).map_err(|e| {
            let preview = if body.len() > 500 {
                format!("{}...", &body[..500])
            } else {
                body.clone()
            };
            ProviderError::ApiError(format!("failed to decode response: {}\nBody: {}", e, preview))
        })?;

        Ok(raw.into_chat_response())
    }
}
