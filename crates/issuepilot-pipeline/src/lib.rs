//! The research-and-respond pipeline.
//!
//! An incoming issue request is normalized into a [`request::PipelineRequest`],
//! then driven through a fixed sequence of model invocations: search answered
//! issues, search open issues, search the codebase, optionally create a
//! tracking issue, and synthesize the final response. Remote GitHub tools are
//! exposed to the model through the [`tools::ToolCatalog`] and routed back
//! through a [`tools::ToolRouter`].

pub mod context;
pub mod pipeline;
pub mod prompts;
pub mod request;
pub mod settings;
pub mod tools;

pub use context::{ResearchContext, StepName};
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome};
pub use request::{PipelineRequest, RepoTarget, RequestError, RequestShape};
pub use settings::StepSettings;
pub use tools::{
    coerce_arguments, McpToolRouter, ToolCallError, ToolCatalog, ToolRouter, GITHUB_TOOL_GROUP,
};
