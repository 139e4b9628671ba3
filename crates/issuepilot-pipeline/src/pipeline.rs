use std::sync::Arc;
use std::time::Duration;

use issuepilot_config::PipelineConfig;
use issuepilot_provider::{
    with_retry, ChatRequest, Message, Provider, ProviderError, RetryConfig, ToolResult, ToolUse,
};

use crate::context::{ResearchContext, StepName};
use crate::prompts;
use crate::request::{PipelineRequest, RepoTarget};
use crate::settings::StepSettings;
use crate::tools::{coerce_arguments, ToolCatalog, ToolRouter};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("model call failed during step {step}: {source}")]
    Model {
        step: StepName,
        #[source]
        source: ProviderError,
    },

    #[error("step {step} timed out after {secs}s")]
    Timeout { step: StepName, secs: u64 },
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The synthesized human-facing response.
    pub response: String,
    pub context: ResearchContext,
}

/// The fixed research-and-act pipeline.
///
/// Steps run strictly in sequence with no per-step retry; a model failure
/// aborts the whole run with no partial result. Empty step output is a
/// soft result and becomes the step's placeholder instead.
pub struct Pipeline {
    provider: Arc<dyn Provider>,
    router: Arc<dyn ToolRouter>,
    catalog: ToolCatalog,
    config: PipelineConfig,
    retry: RetryConfig,
}

impl Pipeline {
    pub fn new(
        provider: Arc<dyn Provider>,
        router: Arc<dyn ToolRouter>,
        catalog: ToolCatalog,
        config: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            router,
            catalog,
            config,
            retry: RetryConfig::default(),
        }
    }

    pub async fn run(&self, request: &PipelineRequest) -> Result<PipelineOutcome, PipelineError> {
        let mut ctx = ResearchContext::new();
        let research = StepSettings::research(&self.config);

        let text = self
            .run_step(
                StepName::AnsweredIssues,
                prompts::answered_issues(request),
                research,
            )
            .await?;
        ctx.record(StepName::AnsweredIssues, text);

        let text = self
            .run_step(StepName::OpenIssues, prompts::open_issues(request), research)
            .await?;
        ctx.record(StepName::OpenIssues, text);

        let text = self
            .run_step(StepName::CodeSearch, prompts::code_search(request), research)
            .await?;
        ctx.record(StepName::CodeSearch, text);

        if request.create_tracking_issue {
            let text = self
                .run_step(
                    StepName::IssueCreation,
                    prompts::create_issue(request, &ctx),
                    research,
                )
                .await?;
            ctx.record(StepName::IssueCreation, text);
        }

        // The webhook flow keeps tools on so the model can post the comment.
        let synthesis = StepSettings::synthesis(&self.config)
            .with_tools(request.target == RepoTarget::InferFromPayload);
        let text = self
            .run_step(
                StepName::Synthesis,
                prompts::synthesis(request, &ctx),
                synthesis,
            )
            .await?;
        let response = ctx.record(StepName::Synthesis, text).to_string();

        Ok(PipelineOutcome { response, context: ctx })
    }

    /// One pipeline step, bounded by the configured timeout. The bound covers
    /// the model call and every tool round inside it.
    async fn run_step(
        &self,
        step: StepName,
        prompt: String,
        settings: StepSettings,
    ) -> Result<String, PipelineError> {
        tracing::info!(step = %step, use_tools = settings.use_tools, "running pipeline step");

        let secs = self.config.step_timeout_secs;
        let result = tokio::time::timeout(
            Duration::from_secs(secs),
            self.invoke_prompt(step, prompt, settings),
        )
        .await
        .map_err(|_| PipelineError::Timeout { step, secs })??;

        tracing::info!(step = %step, chars = result.len(), "pipeline step finished");
        Ok(result)
    }

    /// One prompt invocation with a bounded tool loop: while the model keeps
    /// requesting tool calls, route them and feed the results back. Plain
    /// text ends the loop.
    async fn invoke_prompt(
        &self,
        step: StepName,
        prompt: String,
        settings: StepSettings,
    ) -> Result<String, PipelineError> {
        let mut messages = vec![Message::user(prompt)];
        let tools = if settings.use_tools {
            self.catalog.definitions()
        } else {
            Vec::new()
        };

        let mut last_text = String::new();

        for round in 0..=self.config.max_tool_rounds {
            let request = ChatRequest::new(self.provider.model(), messages.clone())
                .with_temperature(f64::from(settings.temperature))
                .with_max_tokens(settings.max_tokens)
                .with_tools(tools.clone());

            let response = with_retry(&self.retry, || self.provider.chat(request.clone()))
                .await
                .map_err(|source| PipelineError::Model { step, source })?;

            last_text = response.text();
            let tool_uses: Vec<ToolUse> =
                response.tool_uses().into_iter().cloned().collect();

            if tool_uses.is_empty() {
                return Ok(last_text);
            }

            if let Some(choice) = response.choices.first() {
                messages.push(choice.message.clone());
            }

            let mut results = Vec::with_capacity(tool_uses.len());
            for tool_use in &tool_uses {
                results.push(self.dispatch_tool(step, tool_use).await);
            }
            messages.push(Message::tool_results(results));

            tracing::debug!(
                step = %step,
                round,
                calls = tool_uses.len(),
                "completed tool round"
            );
        }

        tracing::warn!(
            step = %step,
            max_rounds = self.config.max_tool_rounds,
            "tool round budget exhausted, using last model text"
        );
        Ok(last_text)
    }

    /// Route one tool call. Failures come back as error-flagged tool results
    /// so the model can report them; they never abort the step.
    async fn dispatch_tool(&self, step: StepName, tool_use: &ToolUse) -> ToolResult {
        let Some(registered) = self.catalog.resolve(&tool_use.name) else {
            tracing::warn!(step = %step, tool = %tool_use.name, "model requested unknown tool");
            return ToolResult {
                tool_use_id: tool_use.id.clone(),
                content: format!("Unknown tool: {}", tool_use.name),
                is_error: Some(true),
            };
        };

        let args = coerce_arguments(&registered.descriptor.input_schema, tool_use.input.clone());

        tracing::debug!(
            step = %step,
            tool = %registered.descriptor.name,
            "invoking remote tool"
        );

        match self.router.call(&registered.descriptor.name, args).await {
            Ok(text) => ToolResult {
                tool_use_id: tool_use.id.clone(),
                content: text,
                is_error: Some(false),
            },
            Err(e) => {
                tracing::warn!(
                    step = %step,
                    tool = %registered.descriptor.name,
                    error = %e,
                    "tool call failed, reporting to model"
                );
                ToolResult {
                    tool_use_id: tool_use.id.clone(),
                    content: e.to_string(),
                    is_error: Some(true),
                }
            }
        }
    }
}
