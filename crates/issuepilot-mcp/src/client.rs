use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use issuepilot_config::McpServerConfig;

use crate::launch::LaunchPlan;
use crate::protocol::*;
use crate::transport::{McpTransport, StdioTransport};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Connection status of the tool-provider subprocess.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum McpStatus {
    Connected,
    Disabled,
    Failed { error: String },
}

impl McpStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, McpStatus::Connected)
    }
}

impl std::fmt::Display for McpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            McpStatus::Connected => write!(f, "connected"),
            McpStatus::Disabled => write!(f, "disabled"),
            McpStatus::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum McpClientError {
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Not initialized")]
    NotInitialized,

    #[error("Tool provider unavailable: {0}")]
    Unavailable(String),

    #[error("Timeout")]
    Timeout,
}

// ---------------------------------------------------------------------------
// McpClient
// ---------------------------------------------------------------------------

/// Client for the GitHub tool-provider subprocess.
///
/// One instance is shared by every in-flight request. A full JSON-RPC
/// exchange (send + receive) holds the transport lock, so concurrent callers
/// are serialized against the single subprocess rather than interleaving
/// frames on its stdio.
pub struct McpClient {
    transport: Mutex<Option<Box<dyn McpTransport>>>,
    request_id: AtomicU64,
    initialized: RwLock<bool>,
    capabilities: RwLock<Option<ServerCapabilities>>,
    /// Tool catalog, retrieved exactly once during `initialize`.
    tools: RwLock<Vec<ToolDefinition>>,
    timeout_ms: u64,
    status: RwLock<McpStatus>,
}

impl McpClient {
    pub fn new() -> Self {
        Self {
            transport: Mutex::new(None),
            request_id: AtomicU64::new(0),
            initialized: RwLock::new(false),
            capabilities: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            timeout_ms: 30_000,
            status: RwLock::new(McpStatus::Disabled),
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub async fn status(&self) -> McpStatus {
        self.status.read().await.clone()
    }

    async fn set_status(&self, status: McpStatus) {
        let mut guard = self.status.write().await;
        *guard = status;
    }

    /// Launch the subprocess, run the handshake, and fetch the tool catalog.
    ///
    /// Any failure is reported as `Unavailable`; the caller is expected to
    /// log it and keep running with zero tools.
    pub async fn initialize(
        &self,
        config: &McpServerConfig,
        token: Option<&str>,
    ) -> Result<Vec<ToolDefinition>, McpClientError> {
        let plan = LaunchPlan::build(config, token);
        tracing::info!(
            command = %plan.command,
            args = ?redact_args(&plan.args),
            "launching tool provider"
        );

        let result = self.initialize_inner(&plan).await;
        match &result {
            Ok(tools) => {
                self.set_status(McpStatus::Connected).await;
                tracing::info!(count = tools.len(), "tool catalog retrieved");
                for tool in tools {
                    tracing::debug!(
                        tool = %tool.name,
                        description = tool.description.as_deref().unwrap_or(""),
                        "registered remote tool"
                    );
                }
            }
            Err(e) => {
                self.set_status(McpStatus::Failed {
                    error: e.to_string(),
                })
                .await;
            }
        }
        result.map_err(|e| McpClientError::Unavailable(e.to_string()))
    }

    async fn initialize_inner(
        &self,
        plan: &LaunchPlan,
    ) -> Result<Vec<ToolDefinition>, McpClientError> {
        let transport = StdioTransport::spawn(plan).await?;
        {
            let mut t = self.transport.lock().await;
            *t = Some(Box::new(transport));
        }

        let result = async {
            self.handshake().await?;
            self.load_tools().await
        }
        .await;

        // A failed handshake leaves a dead subprocess behind the handle;
        // tear it down so degraded mode holds no transport at all.
        if result.is_err() {
            let mut t = self.transport.lock().await;
            if let Some(transport) = t.take() {
                transport.close().await.ok();
            }
        }

        result
    }

    async fn handshake(&self) -> Result<(), McpClientError> {
        let params = serde_json::to_value(InitializeParams::default())
            .map_err(|e| McpClientError::ProtocolError(e.to_string()))?;

        let response = self.send_request("initialize", Some(params)).await?;

        let result: InitializeResult = response
            .result
            .ok_or_else(|| McpClientError::ProtocolError("No result in initialize response".into()))
            .and_then(|r| {
                serde_json::from_value(r).map_err(|e| {
                    McpClientError::ProtocolError(format!("Failed to parse initialize result: {e}"))
                })
            })?;

        {
            let mut caps = self.capabilities.write().await;
            *caps = Some(result.capabilities);
        }

        {
            let guard = self.transport.lock().await;
            if let Some(transport) = guard.as_ref() {
                let notif = JsonRpcNotification {
                    jsonrpc: "2.0".to_string(),
                    method: "notifications/initialized".to_string(),
                    params: None,
                };
                transport.send_notification(&notif).await.ok();
            }
        }

        {
            let mut init = self.initialized.write().await;
            *init = true;
        }

        Ok(())
    }

    /// Fetch and cache the advertised tools. Called exactly once from
    /// `initialize`; re-initialization mid-run is not supported.
    async fn load_tools(&self) -> Result<Vec<ToolDefinition>, McpClientError> {
        let response = self.send_request("tools/list", None).await?;

        let result: ListToolsResult = response
            .result
            .ok_or_else(|| McpClientError::ProtocolError("No result in tools/list response".into()))
            .and_then(|r| {
                serde_json::from_value(r).map_err(|e| {
                    McpClientError::ProtocolError(format!("Failed to parse tools/list result: {e}"))
                })
            })?;

        {
            let mut tools = self.tools.write().await;
            *tools = result.tools.clone();
        }

        Ok(result.tools)
    }

    /// The cached catalog; empty when initialization failed or never ran.
    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.read().await.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.read().await
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<CallToolResult, McpClientError> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let params_value = serde_json::to_value(params)
            .map_err(|e| McpClientError::ProtocolError(e.to_string()))?;

        let response = self.send_request("tools/call", Some(params_value)).await?;

        let result: CallToolResult = response
            .result
            .ok_or_else(|| McpClientError::ProtocolError("No result in tools/call response".into()))
            .and_then(|r| {
                serde_json::from_value(r).map_err(|e| {
                    McpClientError::ProtocolError(format!("Failed to parse tools/call result: {e}"))
                })
            })?;

        Ok(result)
    }

    /// Terminate the subprocess. Idempotent; safe when never initialized.
    pub async fn close(&self) -> Result<(), McpClientError> {
        let mut transport = self.transport.lock().await;
        if let Some(t) = transport.as_ref() {
            t.close().await?;
        }
        *transport = None;

        {
            let mut tools = self.tools.write().await;
            tools.clear();
        }
        {
            let mut init = self.initialized.write().await;
            *init = false;
        }
        self.set_status(McpStatus::Disabled).await;

        Ok(())
    }

    // -- Internal helpers ----------------------------------------------------

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// One full request/response exchange under the transport lock, bounded
    /// by the configured timeout. Progress notifications reset the deadline.
    async fn send_request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpClientError> {
        let id = self.next_id();
        let request = JsonRpcRequest::new(id, method);
        let request = if let Some(p) = params {
            request.with_params(p)
        } else {
            request
        };

        let guard = self.transport.lock().await;
        let transport = guard.as_ref().ok_or(McpClientError::NotInitialized)?;
        transport.send(&request).await?;

        let timeout_duration = Duration::from_millis(self.timeout_ms);
        let mut deadline = tokio::time::Instant::now() + timeout_duration;

        let response = loop {
            let message = match tokio::time::timeout_at(deadline, transport.receive()).await {
                Ok(result) => result?,
                Err(_) => return Err(McpClientError::Timeout),
            };

            match message {
                Some(JsonRpcMessage::Response(resp)) if resp.id == id => break resp,
                Some(JsonRpcMessage::Notification(notif)) => {
                    if is_progress_notification(&notif) {
                        deadline = tokio::time::Instant::now() + timeout_duration;
                    } else {
                        tracing::debug!(method = %notif.method, "unhandled provider notification");
                    }
                    continue;
                }
                Some(_) => continue,
                None => {
                    return Err(McpClientError::TransportError(
                        "Connection closed".to_string(),
                    ));
                }
            }
        };

        if let Some(error) = response.error {
            return Err(McpClientError::ServerError(error.message));
        }

        Ok(response)
    }
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn is_progress_notification(notif: &JsonRpcNotification) -> bool {
    notif.method == "notifications/progress" || notif.method == "$/progress"
}

/// Hide injected `-e NAME=token` values in launch logging.
fn redact_args(args: &[String]) -> Vec<String> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((name, _)) if name.ends_with("TOKEN") => format!("{}=***", name),
            _ => arg.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use tokio::time::{sleep, Duration};

    struct MockTransport {
        messages: Mutex<VecDeque<(Duration, Option<JsonRpcMessage>)>>,
        sent: std::sync::Arc<Mutex<Vec<JsonRpcRequest>>>,
    }

    impl MockTransport {
        fn new(messages: Vec<(Duration, Option<JsonRpcMessage>)>) -> Self {
            Self {
                messages: Mutex::new(VecDeque::from(messages)),
                sent: std::sync::Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn sent_log(&self) -> std::sync::Arc<Mutex<Vec<JsonRpcRequest>>> {
            self.sent.clone()
        }
    }

    #[async_trait]
    impl McpTransport for MockTransport {
        async fn send(&self, request: &JsonRpcRequest) -> Result<(), McpClientError> {
            self.sent.lock().await.push(request.clone());
            Ok(())
        }

        async fn send_notification(
            &self,
            _notification: &JsonRpcNotification,
        ) -> Result<(), McpClientError> {
            Ok(())
        }

        async fn receive(&self) -> Result<Option<JsonRpcMessage>, McpClientError> {
            let next = self.messages.lock().await.pop_front();
            match next {
                Some((delay, message)) => {
                    sleep(delay).await;
                    Ok(message)
                }
                None => Ok(None),
            }
        }

        async fn close(&self) -> Result<(), McpClientError> {
            Ok(())
        }
    }

    fn response(id: u64, result: serde_json::Value) -> JsonRpcMessage {
        JsonRpcMessage::Response(JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        })
    }

    async fn install_transport(client: &McpClient, transport: MockTransport) {
        let mut guard = client.transport.lock().await;
        *guard = Some(Box::new(transport));
    }

    #[tokio::test]
    async fn call_tool_resets_timeout_on_progress_notification() {
        let client = McpClient::new().with_timeout(30);

        let progress = JsonRpcNotification {
            jsonrpc: "2.0".to_string(),
            method: "notifications/progress".to_string(),
            params: Some(serde_json::json!({ "progress": 0.5 })),
        };
        let transport = MockTransport::new(vec![
            (
                Duration::from_millis(15),
                Some(JsonRpcMessage::Notification(progress)),
            ),
            (
                Duration::from_millis(20),
                Some(response(
                    1,
                    serde_json::json!({ "content": [{ "type": "text", "text": "ok" }] }),
                )),
            ),
        ]);
        install_transport(&client, transport).await;

        let result = client
            .call_tool("search_issues", Some(serde_json::json!({ "q": "bug" })))
            .await
            .expect("tool call should complete before timeout when progress resets deadline");

        assert_eq!(result.text(), "ok");
    }

    #[tokio::test]
    async fn call_tool_times_out_without_response() {
        let client = McpClient::new().with_timeout(10);
        let transport = MockTransport::new(vec![(Duration::from_millis(100), None)]);
        install_transport(&client, transport).await;

        let err = client.call_tool("slow", None).await.unwrap_err();
        assert!(matches!(err, McpClientError::Timeout));
    }

    #[tokio::test]
    async fn server_error_surfaces_as_server_error() {
        let client = McpClient::new();
        let transport = MockTransport::new(vec![(
            Duration::from_millis(0),
            Some(JsonRpcMessage::Response(JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id: 1,
                result: None,
                error: Some(JsonRpcError {
                    code: -32602,
                    message: "per_page must be an integer".to_string(),
                    data: None,
                }),
            })),
        )]);
        install_transport(&client, transport).await;

        let err = client.call_tool("search_issues", None).await.unwrap_err();
        match err {
            McpClientError::ServerError(msg) => assert!(msg.contains("per_page")),
            other => panic!("expected server error, got: {other}"),
        }
    }

    #[tokio::test]
    async fn load_tools_caches_catalog() {
        let client = McpClient::new();
        let transport = MockTransport::new(vec![(
            Duration::from_millis(0),
            Some(response(
                1,
                serde_json::json!({
                    "tools": [
                        { "name": "search_issues", "description": "Search issues", "inputSchema": { "type": "object" } },
                        { "name": "add_issue_comment", "inputSchema": { "type": "object" } }
                    ]
                }),
            )),
        )]);
        let sent = transport.sent_log();
        install_transport(&client, transport).await;

        let tools = client.load_tools().await.expect("tools/list should parse");
        assert_eq!(tools.len(), 2);

        let cached = client.list_tools().await;
        assert_eq!(cached.len(), 2);
        assert_eq!(cached[0].name, "search_issues");

        let requests = sent.lock().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "tools/list");
    }

    #[tokio::test]
    async fn close_is_idempotent_and_safe_without_init() {
        let client = McpClient::new();
        client.close().await.expect("close on fresh client");
        client.close().await.expect("second close");
        assert_eq!(client.status().await, McpStatus::Disabled);
        assert!(client.list_tools().await.is_empty());
    }

    #[tokio::test]
    async fn failed_initialize_tears_down_the_transport() {
        let client = McpClient::new().with_timeout(500);
        // `true` exits immediately, so the handshake never gets a response.
        let config = McpServerConfig {
            command: "true".to_string(),
            args: Vec::new(),
            timeout_ms: 500,
        };

        let err = client.initialize(&config, None).await.unwrap_err();
        assert!(matches!(err, McpClientError::Unavailable(_)));
        assert!(matches!(client.status().await, McpStatus::Failed { .. }));

        // The dead subprocess is gone, not left behind a live-looking handle.
        let err = client.call_tool("anything", None).await.unwrap_err();
        assert!(matches!(err, McpClientError::NotInitialized));
    }

    #[tokio::test]
    async fn call_without_transport_is_not_initialized() {
        let client = McpClient::new();
        let err = client.call_tool("anything", None).await.unwrap_err();
        assert!(matches!(err, McpClientError::NotInitialized));
    }

    #[test]
    fn redaction_hides_token_pairs() {
        let args = vec![
            "run".to_string(),
            "GITHUB_PERSONAL_ACCESS_TOKEN=ghp_secret".to_string(),
            "image".to_string(),
        ];
        let redacted = redact_args(&args);
        assert_eq!(redacted[1], "GITHUB_PERSONAL_ACCESS_TOKEN=***");
        assert_eq!(redacted[2], "image");
    }
}
