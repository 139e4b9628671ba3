use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use issuepilot_mcp::{McpClient, ToolDefinition as RemoteTool};

/// All remote tools are exposed to the model under one namespaced group,
/// mirroring how the catalog appears as a single plugin of functions.
pub const GITHUB_TOOL_GROUP: &str = "GitHubTools";

fn exposed_name(tool: &str) -> String {
    format!("{}_{}", GITHUB_TOOL_GROUP, tool)
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RegisteredTool {
    /// Name offered to the model (`GitHubTools_<tool>`).
    pub exposed_name: String,
    /// The descriptor as advertised by the provider subprocess.
    pub descriptor: RemoteTool,
}

/// The set of remote tools granted to a pipeline run. Built once from the
/// bridge's cached catalog; an empty catalog is a degraded mode, not an error.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<RegisteredTool>,
}

impl ToolCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register(tools: Vec<RemoteTool>) -> Self {
        if tools.is_empty() {
            tracing::warn!("no remote tools available; registering empty catalog");
            return Self::default();
        }
        let tools = tools
            .into_iter()
            .map(|descriptor| RegisteredTool {
                exposed_name: exposed_name(&descriptor.name),
                descriptor,
            })
            .collect::<Vec<_>>();
        tracing::info!(count = tools.len(), group = GITHUB_TOOL_GROUP, "registered tool catalog");
        Self { tools }
    }

    /// Definitions in the shape the completion API expects.
    pub fn definitions(&self) -> Vec<issuepilot_provider::ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| issuepilot_provider::ToolDefinition {
                name: tool.exposed_name.clone(),
                description: tool.descriptor.description.clone(),
                parameters: tool.descriptor.input_schema.clone(),
            })
            .collect()
    }

    /// Look up a tool by the name the model used.
    pub fn resolve(&self, exposed: &str) -> Option<&RegisteredTool> {
        self.tools.iter().find(|t| t.exposed_name == exposed)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Argument coercion
// ---------------------------------------------------------------------------

/// Re-parse string-typed arguments whose schema declares `integer` or
/// `number`. Models occasionally stringify numeric parameters ("per_page":
/// "5"), which strict providers reject.
pub fn coerce_arguments(schema: &Value, mut args: Value) -> Value {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return args;
    };

    if let Some(obj) = args.as_object_mut() {
        for (key, prop_schema) in properties {
            let declared = prop_schema.get("type").and_then(Value::as_str);
            if !matches!(declared, Some("integer") | Some("number")) {
                continue;
            }
            if let Some(Value::String(raw)) = obj.get(key) {
                let parsed = if declared == Some("integer") {
                    raw.trim().parse::<i64>().ok().map(Value::from)
                } else {
                    raw.trim()
                        .parse::<f64>()
                        .ok()
                        .and_then(|f| serde_json::Number::from_f64(f).map(Value::Number))
                };
                if let Some(num) = parsed {
                    tracing::debug!(param = %key, "coerced stringified numeric argument");
                    obj.insert(key.clone(), num);
                }
            }
        }
    }

    args
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool call failed: {0}")]
    CallFailed(String),
}

/// Forwards a resolved tool invocation to its backing implementation.
/// The production router talks to the provider subprocess; tests substitute
/// stubs to scope which capabilities a step actually receives.
#[async_trait]
pub trait ToolRouter: Send + Sync {
    async fn call(&self, tool: &str, args: Value) -> Result<String, ToolCallError>;
}

pub struct McpToolRouter {
    client: Arc<McpClient>,
}

impl McpToolRouter {
    pub fn new(client: Arc<McpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ToolRouter for McpToolRouter {
    async fn call(&self, tool: &str, args: Value) -> Result<String, ToolCallError> {
        let result = self
            .client
            .call_tool(tool, Some(args))
            .await
            .map_err(|e| ToolCallError::CallFailed(e.to_string()))?;

        let text = result.text();
        if result.is_error.unwrap_or(false) {
            return Err(ToolCallError::CallFailed(text));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remote_tool(name: &str, schema: Value) -> RemoteTool {
        RemoteTool {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: schema,
        }
    }

    #[test]
    fn register_namespaces_tool_names() {
        let catalog = ToolCatalog::register(vec![remote_tool(
            "search_issues",
            json!({ "type": "object" }),
        )]);
        let defs = catalog.definitions();
        assert_eq!(defs[0].name, "GitHubTools_search_issues");
        assert!(catalog.resolve("GitHubTools_search_issues").is_some());
        assert!(catalog.resolve("search_issues").is_none());
    }

    #[test]
    fn empty_registration_is_not_an_error() {
        let catalog = ToolCatalog::register(Vec::new());
        assert!(catalog.is_empty());
        assert!(catalog.definitions().is_empty());
    }

    #[test]
    fn coerce_rewrites_stringified_integers() {
        let schema = json!({
            "type": "object",
            "properties": {
                "per_page": { "type": "integer" },
                "q": { "type": "string" }
            }
        });
        let args = json!({ "per_page": "5", "q": "login bug" });
        let coerced = coerce_arguments(&schema, args);
        assert_eq!(coerced["per_page"], 5);
        assert_eq!(coerced["q"], "login bug");
    }

    #[test]
    fn coerce_rewrites_stringified_numbers() {
        let schema = json!({
            "type": "object",
            "properties": { "threshold": { "type": "number" } }
        });
        let coerced = coerce_arguments(&schema, json!({ "threshold": "0.75" }));
        assert_eq!(coerced["threshold"], 0.75);
    }

    #[test]
    fn coerce_leaves_unparseable_strings_alone() {
        let schema = json!({
            "type": "object",
            "properties": { "per_page": { "type": "integer" } }
        });
        let coerced = coerce_arguments(&schema, json!({ "per_page": "lots" }));
        assert_eq!(coerced["per_page"], "lots");
    }

    #[test]
    fn coerce_leaves_already_numeric_values_alone() {
        let schema = json!({
            "type": "object",
            "properties": { "per_page": { "type": "integer" } }
        });
        let coerced = coerce_arguments(&schema, json!({ "per_page": 10 }));
        assert_eq!(coerced["per_page"], 10);
    }
}
