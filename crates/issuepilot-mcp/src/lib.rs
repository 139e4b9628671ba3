//! Stdio client for the GitHub tool-provider subprocess.
//!
//! The provider speaks JSON-RPC 2.0 over its stdin/stdout with
//! Content-Length framing. This crate spawns it (injecting the access token
//! where the process can see it), runs the initialize handshake, retrieves
//! the tool catalog once, and forwards tool invocations with a per-call
//! timeout.

pub mod client;
pub mod launch;
pub mod protocol;
pub mod transport;

pub use client::{McpClient, McpClientError, McpStatus};
pub use launch::{LaunchPlan, CONTAINER_TOKEN_VAR, DIRECT_TOKEN_VAR};
pub use protocol::{CallToolResult, ToolContent, ToolDefinition};
pub use transport::{McpTransport, StdioTransport};
