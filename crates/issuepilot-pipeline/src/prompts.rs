//! Prompt builders for the research pipeline.
//!
//! Each builder embeds the issue context, the running research context, and
//! the behavioral guardrails: cap findings at 3, keep `per_page` an integer,
//! state clearly when nothing is found, never invent information.

use crate::context::{ResearchContext, StepName};
use crate::request::{PipelineRequest, RepoTarget};

fn repo_clause(request: &PipelineRequest) -> String {
    match &request.target {
        RepoTarget::Explicit(repo) => format!("the repository '{repo}'"),
        RepoTarget::InferFromPayload => {
            "the repository identified in the webhook payload below (infer owner and repo from \
             the payload fields)"
                .to_string()
        }
    }
}

pub fn answered_issues(request: &PipelineRequest) -> String {
    format!(
        "Background: You are an AI assistant helping to research a GitHub issue.\n\
         Task: Search for GitHub issues in {repo} that are similar to the following issue \
         context: '{issue}'.\n\
         Focus on issues that are already CLOSED or RESOLVED.\n\
         Instructions: Provide a summary of up to 3 most relevant issues found. For each, \
         include its title, number, and a brief of its resolution.\n\
         When using tools that accept a 'per_page' parameter, ensure it is an integer.\n\
         If no relevant closed/resolved issues are found, clearly state that.\n\
         Your response will be used as context for another AI to draft a final response to the \
         original issue.",
        repo = repo_clause(request),
        issue = request.issue_context,
    )
}

pub fn open_issues(request: &PipelineRequest) -> String {
    format!(
        "Background: You are an AI assistant helping to research a GitHub issue.\n\
         Task: Search for OPEN GitHub issues in {repo} that might be related to the following \
         issue context: '{issue}'.\n\
         Instructions: Provide a summary of up to 3 most relevant open issues. For each, \
         include its title and number.\n\
         When using tools that accept a 'per_page' parameter, ensure it is an integer.\n\
         If no relevant open issues are found, clearly state that.\n\
         Your response will be used as context for another AI to draft a final response to the \
         original issue.",
        repo = repo_clause(request),
        issue = request.issue_context,
    )
}

pub fn code_search(request: &PipelineRequest) -> String {
    format!(
        "Background: You are an AI assistant helping to research a GitHub issue.\n\
         Task: Search the codebase of {repo} for code snippets, comments, or documentation \
         relevant to the following issue context: '{issue}'.\n\
         Instructions: Summarize any key findings. If specific file paths or code blocks are \
         identified as highly relevant, mention them. Limit to 3 most relevant findings.\n\
         When using tools that accept a 'per_page' parameter, ensure it is an integer.\n\
         If no relevant code is found, clearly state that.\n\
         Your response will be used as context for another AI to draft a final response to the \
         original issue.",
        repo = repo_clause(request),
        issue = request.issue_context,
    )
}

pub fn create_issue(request: &PipelineRequest, ctx: &ResearchContext) -> String {
    format!(
        "Background: You are an AI assistant helping to manage GitHub issues. Based on the \
         research conducted for an incoming issue, you need to create a new, well-summarized \
         issue in {repo}.\n\
         \n\
         Original Issue Context Provided:\n\
         '''{issue}'''\n\
         \n\
         Research Summary:\n\
         1. Similar Answered/Closed Issues: {answered}\n\
         2. Related Outstanding/Open Issues: {open}\n\
         3. Relevant Code Search Results: {code}\n\
         \n\
         Task:\n\
         1. Synthesize the information above to create a new GitHub issue.\n\
         2. The issue title should be concise and reflect the core problem derived from the \
         original context and research.\n\
         3. The issue body should provide a clear summary of the problem, referencing the key \
         findings from the research (answered issues, open issues, code findings).\n\
         4. Structure the body for clarity. Use markdown.\n\
         5. Your primary goal is to create an issue that a developer can understand and act \
         upon.\n\
         Instructions:\n\
         - Use the available tools to create this issue in {repo}.\n\
         - After creating the issue, output the URL or identifier of the newly created issue. \
         If creation fails or is not possible, state that clearly.",
        repo = repo_clause(request),
        issue = request.issue_context,
        answered = ctx.get_or_placeholder(StepName::AnsweredIssues),
        open = ctx.get_or_placeholder(StepName::OpenIssues),
        code = ctx.get_or_placeholder(StepName::CodeSearch),
    )
}

pub fn synthesis(request: &PipelineRequest, ctx: &ResearchContext) -> String {
    let mut prompt = format!(
        "You are an AI assistant tasked with drafting a helpful and context-aware response to \
         a new GitHub issue.\n\
         \n\
         Original Issue Context Provided:\n\
         '''{issue}'''\n\
         \n\
         Repository: {repo}\n\
         \n\
         Here is the background research conducted to help you formulate the response:\n\
         \n\
         1. Similar Answered/Closed Issues Found:\n\
         '''\n\
         {answered}\n\
         '''\n\
         \n\
         2. Related Outstanding/Open Issues Found:\n\
         '''\n\
         {open}\n\
         '''\n\
         \n\
         3. Relevant Code Search Results from the Repository:\n\
         '''\n\
         {code}\n\
         '''\n",
        issue = request.issue_context,
        repo = match &request.target {
            RepoTarget::Explicit(repo) => repo.clone(),
            RepoTarget::InferFromPayload =>
                "(infer from the webhook payload in the issue context)".to_string(),
        },
        answered = ctx.get_or_placeholder(StepName::AnsweredIssues),
        open = ctx.get_or_placeholder(StepName::OpenIssues),
        code = ctx.get_or_placeholder(StepName::CodeSearch),
    );

    if let Some(creation) = ctx.get(StepName::IssueCreation) {
        prompt.push_str(&format!(
            "\n4. Action Taken: A new GitHub issue has been created based on this research.\n   \
             Details: {creation}\n"
        ));
    }

    prompt.push_str(
        "\nTask:\n\
         Based *only* on the Original Issue Context and the Background Research provided above, \
         please draft a comprehensive and helpful response.\n\
         Your response should be suitable for posting as a comment on the GitHub issue that \
         *triggered this process*.\n\
         Address the user who might have reported the issue. Be empathetic and constructive.\n",
    );

    if ctx.get(StepName::IssueCreation).is_some() {
        prompt.push_str(
            "Inform the user that a new issue has been created to track this (if successful, \
             refer to the creation details above).\n",
        );
    }

    prompt.push_str(
        "If the research yielded no specific results for some steps, acknowledge that \
         tactfully if relevant, and formulate the best possible response with the available \
         information.\n\
         Do not invent information not present in the context provided.\n\
         Structure your response clearly. You can use markdown for formatting.",
    );

    if request.target == RepoTarget::InferFromPayload {
        prompt.push_str(
            "\n\nFinally, post your drafted response verbatim as a comment on the triggering \
             issue using the available tools (infer owner, repo and issue number from the \
             payload). After posting, state in your output whether the comment posting \
             succeeded or failed, and if it failed, include the reason.",
        );
    }

    prompt
}
