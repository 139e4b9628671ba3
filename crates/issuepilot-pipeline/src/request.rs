use serde::{Deserialize, Serialize};

const REPO_MARKER: &str = "repo: ";

/// Where the pipeline learns which repository to operate on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepoTarget {
    /// `owner/repo`, validated server-side.
    Explicit(String),
    /// Webhook flow: the model infers owner/repo/issue number from the
    /// embedded payload; the server does no payload parsing.
    InferFromPayload,
}

/// Normalized pipeline input, shared by every request shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub issue_context: String,
    pub target: RepoTarget,
    /// Whether the pipeline runs the tracking-issue creation step.
    pub create_tracking_issue: bool,
}

/// The three accepted request bodies, collapsed into one adapter.
#[derive(Debug, Clone)]
pub enum RequestShape {
    /// Form field `issue`: free text carrying a `Repo: owner/repo` line.
    FormWithMarker { issue: String },
    /// Form field `payload`: opaque webhook JSON, forwarded to the model.
    RawPayload { payload: String },
    /// JSON body with explicit fields.
    StructuredBody {
        issue_context: String,
        repo_name: String,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("Issue context must be provided in the form data.")]
    MissingIssueContext,

    #[error("Payload must be provided in the form data.")]
    MissingPayload,

    #[error(
        "repoName could not be extracted from issueContext or is not in 'owner/repo' format. \
         Ensure the issue context contains a line like 'Repo: owner/repo'."
    )]
    MissingRepoMarker,

    #[error("repoName must be in 'owner/repo' format, got '{0}'")]
    InvalidRepoName(String),
}

impl RequestShape {
    pub fn normalize(self) -> Result<PipelineRequest, RequestError> {
        match self {
            RequestShape::FormWithMarker { issue } => {
                if issue.trim().is_empty() {
                    return Err(RequestError::MissingIssueContext);
                }
                let repo_name = extract_repo_marker(&issue)?;
                Ok(PipelineRequest {
                    issue_context: issue,
                    target: RepoTarget::Explicit(repo_name),
                    create_tracking_issue: true,
                })
            }
            RequestShape::RawPayload { payload } => {
                if payload.trim().is_empty() {
                    return Err(RequestError::MissingPayload);
                }
                Ok(PipelineRequest {
                    issue_context: payload,
                    target: RepoTarget::InferFromPayload,
                    create_tracking_issue: false,
                })
            }
            RequestShape::StructuredBody {
                issue_context,
                repo_name,
            } => {
                if issue_context.trim().is_empty() {
                    return Err(RequestError::MissingIssueContext);
                }
                let repo_name = repo_name.trim().to_string();
                if repo_name.is_empty() || !repo_name.contains('/') {
                    return Err(RequestError::InvalidRepoName(repo_name));
                }
                Ok(PipelineRequest {
                    issue_context,
                    target: RepoTarget::Explicit(repo_name),
                    create_tracking_issue: false,
                })
            }
        }
    }
}

/// Scan the issue text for a case-insensitive `Repo: owner/repo` line.
fn extract_repo_marker(issue: &str) -> Result<String, RequestError> {
    for line in issue.lines() {
        let line = line.trim_start();
        let matches_marker = line
            .get(..REPO_MARKER.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(REPO_MARKER));
        if matches_marker {
            let repo = line[REPO_MARKER.len()..].trim();
            if repo.is_empty() || !repo.contains('/') {
                return Err(RequestError::MissingRepoMarker);
            }
            return Ok(repo.to_string());
        }
    }
    Err(RequestError::MissingRepoMarker)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_with_marker_extracts_repo() {
        let request = RequestShape::FormWithMarker {
            issue: "Login fails on mobile\nRepo: acme/widgets\nSteps: ...".to_string(),
        }
        .normalize()
        .expect("valid form request");
        assert_eq!(request.target, RepoTarget::Explicit("acme/widgets".into()));
        assert!(request.create_tracking_issue);
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        let request = RequestShape::FormWithMarker {
            issue: "Something broke\nREPO: acme/widgets".to_string(),
        }
        .normalize()
        .expect("uppercase marker accepted");
        assert_eq!(request.target, RepoTarget::Explicit("acme/widgets".into()));
    }

    #[test]
    fn form_without_marker_is_rejected() {
        let err = RequestShape::FormWithMarker {
            issue: "Login fails on mobile".to_string(),
        }
        .normalize()
        .unwrap_err();
        assert_eq!(err, RequestError::MissingRepoMarker);
    }

    #[test]
    fn marker_without_slash_is_rejected() {
        let err = RequestShape::FormWithMarker {
            issue: "Broken\nRepo: just-a-name".to_string(),
        }
        .normalize()
        .unwrap_err();
        assert_eq!(err, RequestError::MissingRepoMarker);
    }

    #[test]
    fn blank_form_issue_is_rejected() {
        let err = RequestShape::FormWithMarker {
            issue: "   ".to_string(),
        }
        .normalize()
        .unwrap_err();
        assert_eq!(err, RequestError::MissingIssueContext);
    }

    #[test]
    fn raw_payload_is_passed_through_opaque() {
        let request = RequestShape::RawPayload {
            payload: r#"{"action":"opened","issue":{"number":7}}"#.to_string(),
        }
        .normalize()
        .expect("non-blank payload accepted");
        assert_eq!(request.target, RepoTarget::InferFromPayload);
        assert!(request.issue_context.contains("opened"));
        assert!(!request.create_tracking_issue);
    }

    #[test]
    fn structured_body_validates_repo_format() {
        let err = RequestShape::StructuredBody {
            issue_context: "crash on save".to_string(),
            repo_name: "no-slash-here".to_string(),
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, RequestError::InvalidRepoName(_)));

        let ok = RequestShape::StructuredBody {
            issue_context: "crash on save".to_string(),
            repo_name: "acme/widgets".to_string(),
        }
        .normalize()
        .expect("valid structured request");
        assert_eq!(ok.target, RepoTarget::Explicit("acme/widgets".into()));
        assert!(!ok.create_tracking_issue);
    }
}
