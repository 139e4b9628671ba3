use serde::{Deserialize, Serialize};

/// The fixed research steps, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    AnsweredIssues,
    OpenIssues,
    CodeSearch,
    IssueCreation,
    Synthesis,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::AnsweredIssues => "answered_issues",
            StepName::OpenIssues => "open_issues",
            StepName::CodeSearch => "code_search",
            StepName::IssueCreation => "issue_creation",
            StepName::Synthesis => "synthesis",
        }
    }

    /// Substituted when the model produces no usable text for this step.
    pub fn placeholder(&self) -> &'static str {
        match self {
            StepName::AnsweredIssues => "No information on answered issues found by the LLM.",
            StepName::OpenIssues => "No information on outstanding issues found by the LLM.",
            StepName::CodeSearch => "No relevant code snippets found by the LLM.",
            StepName::IssueCreation => "Could not create a new issue or no confirmation received.",
            StepName::Synthesis => "Could not generate a final response at this time.",
        }
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulated step results, in append order. Entries are write-once: the
/// first record for a step wins, and blank text is replaced by the step's
/// placeholder at write time, so every stored entry is non-empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchContext {
    entries: Vec<(StepName, String)>,
}

impl ResearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a step result. Returns the stored text (placeholder-substituted
    /// when `text` is blank). A second record for the same step is ignored.
    pub fn record(&mut self, step: StepName, text: impl Into<String>) -> &str {
        if self.get(step).is_none() {
            let text = text.into();
            let stored = if text.trim().is_empty() {
                tracing::info!(step = %step, "empty step result, substituting placeholder");
                step.placeholder().to_string()
            } else {
                text
            };
            self.entries.push((step, stored));
        } else {
            tracing::warn!(step = %step, "step result already recorded, ignoring overwrite");
        }
        self.get(step).unwrap_or_default()
    }

    pub fn get(&self, step: StepName) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, text)| text.as_str())
    }

    /// The stored text, or the step's placeholder when the step never ran.
    pub fn get_or_placeholder(&self, step: StepName) -> &str {
        self.get(step).unwrap_or_else(|| step.placeholder())
    }

    pub fn entries(&self) -> &[(StepName, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
