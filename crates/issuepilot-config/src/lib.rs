pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigLoader};
pub use schema::{
    Config, GithubConfig, McpServerConfig, OpenAiConfig, PipelineConfig, ServerConfig,
};
