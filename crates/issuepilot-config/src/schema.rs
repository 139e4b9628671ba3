use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub github: GithubConfig,

    #[serde(default)]
    pub mcp: McpServerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(rename = "api_key", alias = "apiKey", default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(rename = "base_url", alias = "baseURL", default)]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GithubConfig {
    /// Personal access token handed to the tool-provider subprocess.
    #[serde(default)]
    pub token: Option<String>,
}

/// Launch configuration for the GitHub MCP server subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default = "default_mcp_command")]
    pub command: String,

    #[serde(default = "default_mcp_args")]
    pub args: Vec<String>,

    #[serde(rename = "timeout_ms", default = "default_mcp_timeout")]
    pub timeout_ms: u64,
}

fn default_mcp_command() -> String {
    "npx".to_string()
}

fn default_mcp_args() -> Vec<String> {
    vec![
        "-y".to_string(),
        "@modelcontextprotocol/server-github".to_string(),
    ]
}

fn default_mcp_timeout() -> u64 {
    30_000
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            command: default_mcp_command(),
            args: default_mcp_args(),
            timeout_ms: default_mcp_timeout(),
        }
    }
}

/// Per-step model invocation budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_research_temperature")]
    pub research_temperature: f32,

    #[serde(default = "default_research_max_tokens")]
    pub research_max_tokens: u64,

    #[serde(default = "default_synthesis_temperature")]
    pub synthesis_temperature: f32,

    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u64,

    /// Hard bound on a single pipeline step, model call plus tool rounds.
    #[serde(default = "default_step_timeout")]
    pub step_timeout_secs: u64,

    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
}

fn default_research_temperature() -> f32 {
    0.2
}

fn default_research_max_tokens() -> u64 {
    1500
}

fn default_synthesis_temperature() -> f32 {
    0.5
}

fn default_synthesis_max_tokens() -> u64 {
    1000
}

fn default_step_timeout() -> u64 {
    120
}

fn default_max_tool_rounds() -> u32 {
    8
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            research_temperature: default_research_temperature(),
            research_max_tokens: default_research_max_tokens(),
            synthesis_temperature: default_synthesis_temperature(),
            synthesis_max_tokens: default_synthesis_max_tokens(),
            step_timeout_secs: default_step_timeout(),
            max_tool_rounds: default_max_tool_rounds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl Config {
    /// Overlay `other` onto `self`. Scalar fields from `other` win when set.
    pub fn merge(&mut self, other: Config) {
        if other.openai.api_key.is_some() {
            self.openai.api_key = other.openai.api_key;
        }
        if other.openai.model != default_model() {
            self.openai.model = other.openai.model;
        }
        if other.openai.base_url.is_some() {
            self.openai.base_url = other.openai.base_url;
        }
        if other.github.token.is_some() {
            self.github.token = other.github.token;
        }
        if other.mcp.command != default_mcp_command() || other.mcp.args != default_mcp_args() {
            self.mcp.command = other.mcp.command;
            self.mcp.args = other.mcp.args;
        }
        if other.mcp.timeout_ms != default_mcp_timeout() {
            self.mcp.timeout_ms = other.mcp.timeout_ms;
        }
        if other.pipeline.research_temperature != default_research_temperature() {
            self.pipeline.research_temperature = other.pipeline.research_temperature;
        }
        if other.pipeline.research_max_tokens != default_research_max_tokens() {
            self.pipeline.research_max_tokens = other.pipeline.research_max_tokens;
        }
        if other.pipeline.synthesis_temperature != default_synthesis_temperature() {
            self.pipeline.synthesis_temperature = other.pipeline.synthesis_temperature;
        }
        if other.pipeline.synthesis_max_tokens != default_synthesis_max_tokens() {
            self.pipeline.synthesis_max_tokens = other.pipeline.synthesis_max_tokens;
        }
        if other.pipeline.step_timeout_secs != default_step_timeout() {
            self.pipeline.step_timeout_secs = other.pipeline.step_timeout_secs;
        }
        if other.pipeline.max_tool_rounds != default_max_tool_rounds() {
            self.pipeline.max_tool_rounds = other.pipeline.max_tool_rounds;
        }
        if other.server.is_some() {
            self.server = other.server;
        }
    }
}
