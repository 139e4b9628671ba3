use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::client::McpClientError;
use crate::launch::LaunchPlan;
use crate::protocol::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest};

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn send(&self, request: &JsonRpcRequest) -> Result<(), McpClientError>;
    /// Fire-and-forget; notifications carry no id and get no response.
    async fn send_notification(
        &self,
        notification: &JsonRpcNotification,
    ) -> Result<(), McpClientError>;
    async fn receive(&self) -> Result<Option<JsonRpcMessage>, McpClientError>;
    async fn close(&self) -> Result<(), McpClientError>;
}

// ---------------------------------------------------------------------------
// StdioTransport
// ---------------------------------------------------------------------------

pub struct StdioTransport {
    process: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    /// Persistent reader; bytes buffered past one message must survive
    /// across `receive` calls.
    stdout: Mutex<Option<BufReader<ChildStdout>>>,
}

impl StdioTransport {
    /// Spawn the tool-provider subprocess described by `plan`.
    pub async fn spawn(plan: &LaunchPlan) -> Result<Self, McpClientError> {
        let mut cmd = Command::new(&plan.command);
        cmd.args(&plan.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (key, value) in &plan.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpClientError::TransportError(format!("Failed to spawn process: {}", e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpClientError::TransportError("Failed to get stdin".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpClientError::TransportError("Failed to get stdout".to_string()))?;

        Ok(Self {
            process: Mutex::new(Some(child)),
            stdin: Mutex::new(Some(stdin)),
            stdout: Mutex::new(Some(BufReader::new(stdout))),
        })
    }
}

impl StdioTransport {
    async fn write_framed(&self, content: String) -> Result<(), McpClientError> {
        let mut stdin_guard = self.stdin.lock().await;
        let stdin = stdin_guard
            .as_mut()
            .ok_or_else(|| McpClientError::TransportError("Process not running".to_string()))?;

        let message = format!("Content-Length: {}\r\n\r\n{}", content.len(), content);

        stdin
            .write_all(message.as_bytes())
            .await
            .map_err(|e| McpClientError::TransportError(format!("Failed to write: {}", e)))?;

        stdin
            .flush()
            .await
            .map_err(|e| McpClientError::TransportError(format!("Failed to flush: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send(&self, request: &JsonRpcRequest) -> Result<(), McpClientError> {
        let content = serde_json::to_string(request).map_err(|e| {
            McpClientError::ProtocolError(format!("Failed to serialize request: {}", e))
        })?;
        self.write_framed(content).await
    }

    async fn send_notification(
        &self,
        notification: &JsonRpcNotification,
    ) -> Result<(), McpClientError> {
        let content = serde_json::to_string(notification).map_err(|e| {
            McpClientError::ProtocolError(format!("Failed to serialize notification: {}", e))
        })?;
        self.write_framed(content).await
    }

    async fn receive(&self) -> Result<Option<JsonRpcMessage>, McpClientError> {
        let mut stdout_guard = self.stdout.lock().await;
        let reader = stdout_guard
            .as_mut()
            .ok_or_else(|| McpClientError::TransportError("Process not running".to_string()))?;

        // Header section ends at a blank line; the body must not be read
        // before that separator is consumed.
        let mut content_length: Option<usize> = None;
        let mut header_line = String::new();
        loop {
            header_line.clear();
            let bytes_read = reader.read_line(&mut header_line).await.map_err(|e| {
                McpClientError::TransportError(format!("Failed to read header: {}", e))
            })?;

            if bytes_read == 0 {
                return Ok(None);
            }

            let trimmed = header_line.trim();

            if trimmed.is_empty() {
                if content_length.is_some() {
                    break;
                }
                continue;
            }

            if let Some(value) = trimmed.strip_prefix("Content-Length:") {
                let length: usize = value.trim().parse().map_err(|e| {
                    McpClientError::ProtocolError(format!("Invalid content length: {}", e))
                })?;
                content_length = Some(length);
                continue;
            }

            // Servers that speak newline-delimited JSON send the message
            // directly, with no header section at all.
            if trimmed.starts_with('{') {
                let message = JsonRpcMessage::from_str(trimmed).map_err(|e| {
                    McpClientError::ProtocolError(format!("Failed to parse message: {}", e))
                })?;
                return Ok(Some(message));
            }
        }

        let content_length = content_length
            .ok_or_else(|| McpClientError::ProtocolError("Missing Content-Length".to_string()))?;

        let mut content_buf = vec![0u8; content_length];
        reader.read_exact(&mut content_buf).await.map_err(|e| {
            McpClientError::TransportError(format!("Failed to read content: {}", e))
        })?;

        let content = String::from_utf8_lossy(&content_buf);
        let message = JsonRpcMessage::from_str(&content).map_err(|e| {
            McpClientError::ProtocolError(format!("Failed to parse message: {}", e))
        })?;

        Ok(Some(message))
    }

    async fn close(&self) -> Result<(), McpClientError> {
        let mut process_guard = self.process.lock().await;
        if let Some(mut child) = process_guard.take() {
            child.kill().await.map_err(|e| {
                McpClientError::TransportError(format!("Failed to kill process: {}", e))
            })?;
        }
        let mut stdin_guard = self.stdin.lock().await;
        *stdin_guard = None;
        let mut stdout_guard = self.stdout.lock().await;
        *stdout_guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(command: &str, args: &[&str]) -> LaunchPlan {
        LaunchPlan {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            env: Vec::new(),
        }
    }

    // `cat` echoes stdin back, so receive() parses exactly the bytes that
    // send() framed, including the blank line between headers and body.
    #[tokio::test]
    async fn framed_messages_round_trip_through_a_real_process() {
        let transport = StdioTransport::spawn(&plan("cat", &[]))
            .await
            .expect("spawn cat");

        let request =
            JsonRpcRequest::new(7, "tools/call").with_params(json!({ "name": "search_issues" }));
        transport.send(&request).await.expect("send framed request");

        let message = transport
            .receive()
            .await
            .expect("frame parses")
            .expect("stream still open");
        match message {
            JsonRpcMessage::Response(resp) => assert_eq!(resp.id, 7),
            JsonRpcMessage::Notification(_) => panic!("id-bearing message must be a response"),
        }

        transport.close().await.expect("close");
    }

    #[tokio::test]
    async fn consecutive_frames_stay_aligned() {
        let transport = StdioTransport::spawn(&plan("cat", &[]))
            .await
            .expect("spawn cat");

        transport
            .send(&JsonRpcRequest::new(1, "initialize"))
            .await
            .expect("first send");
        transport
            .send(&JsonRpcRequest::new(2, "tools/list"))
            .await
            .expect("second send");

        for expected_id in [1, 2] {
            let message = transport
                .receive()
                .await
                .expect("frame parses")
                .expect("stream still open");
            let JsonRpcMessage::Response(resp) = message else {
                panic!("expected response");
            };
            assert_eq!(resp.id, expected_id);
        }

        transport.close().await.expect("close");
    }

    #[tokio::test]
    async fn newline_delimited_messages_are_accepted() {
        let line = r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#;
        let transport = StdioTransport::spawn(&plan("echo", &[line]))
            .await
            .expect("spawn echo");

        let message = transport
            .receive()
            .await
            .expect("line parses")
            .expect("stream still open");
        let JsonRpcMessage::Response(resp) = message else {
            panic!("expected response");
        };
        assert_eq!(resp.id, 3);

        // echo exits after one line; the next read reports a closed stream.
        assert!(transport.receive().await.expect("clean EOF").is_none());

        transport.close().await.expect("close");
    }
}
