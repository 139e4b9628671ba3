use issuepilot_config::PipelineConfig;

/// Invocation settings for one pipeline step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSettings {
    pub temperature: f32,
    pub max_tokens: u64,
    /// Whether the granted tool catalog is attached to the model request.
    pub use_tools: bool,
}

impl StepSettings {
    /// Research and issue-creation steps: low temperature, tools on.
    pub fn research(config: &PipelineConfig) -> Self {
        Self {
            temperature: config.research_temperature,
            max_tokens: config.research_max_tokens,
            use_tools: true,
        }
    }

    /// Final synthesis: moderate temperature, tools off by default. The
    /// webhook flow re-enables tools so the model can post the comment.
    pub fn synthesis(config: &PipelineConfig) -> Self {
        Self {
            temperature: config.synthesis_temperature,
            max_tokens: config.synthesis_max_tokens,
            use_tools: false,
        }
    }

    pub fn with_tools(mut self, use_tools: bool) -> Self {
        self.use_tools = use_tools;
        self
    }
}
