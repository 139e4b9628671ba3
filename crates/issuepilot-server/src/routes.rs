use std::sync::Arc;

use axum::{
    extract::{FromRequest, Request, State},
    http::header::CONTENT_TYPE,
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use issuepilot_pipeline::RequestShape;

use crate::error::ApiError;
use crate::state::ServerState;

pub fn router() -> Router<Arc<ServerState>> {
    Router::new()
        .route("/githubAssistant/respondToIssue", post(respond_to_issue))
        .route("/health", get(health))
}

// ---------------------------------------------------------------------------
// Request body dispatch
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct FormParams {
    #[serde(default)]
    pub issue: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StructuredParams {
    #[serde(alias = "issueContext")]
    pub issue_context: String,
    #[serde(alias = "repoName")]
    pub repo_name: String,
}

/// The endpoint accepts three body shapes on one route: a form with a marker
/// line, a form carrying an opaque webhook payload, or an explicit JSON body.
/// Dispatch is by content type and which form field is present.
#[derive(Debug)]
pub enum RespondBody {
    Form(FormParams),
    Structured(StructuredParams),
}

impl<S> FromRequest<S> for RespondBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if content_type.starts_with("application/json") {
            let Json(body) = Json::<StructuredParams>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            Ok(RespondBody::Structured(body))
        } else {
            let Form(body) = Form::<FormParams>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            Ok(RespondBody::Form(body))
        }
    }
}

impl RespondBody {
    fn into_shape(self) -> Result<RequestShape, ApiError> {
        match self {
            RespondBody::Form(params) => match (params.issue, params.payload) {
                (Some(issue), _) => Ok(RequestShape::FormWithMarker { issue }),
                (None, Some(payload)) => Ok(RequestShape::RawPayload { payload }),
                (None, None) => Err(ApiError::BadRequest(
                    "Form data must contain an 'issue' or 'payload' field.".to_string(),
                )),
            },
            RespondBody::Structured(params) => Ok(RequestShape::StructuredBody {
                issue_context: params.issue_context,
                repo_name: params.repo_name,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn respond_to_issue(
    State(state): State<Arc<ServerState>>,
    body: RespondBody,
) -> Result<Json<Value>, ApiError> {
    let shape = body.into_shape()?;
    let request = shape
        .normalize()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        target_repo = ?request.target,
        context_chars = request.issue_context.len(),
        "processing respondToIssue request"
    );

    let outcome = state.pipeline().run(&request).await.map_err(|e| {
        tracing::error!(error = %e, "pipeline run failed");
        ApiError::InternalError(e.to_string())
    })?;

    Ok(Json(json!({ "response": outcome.response })))
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tools": state.catalog.len(),
        "bridge": state.bridge_status().await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use issuepilot_config::Config;
    use issuepilot_mcp::McpClient;
    use issuepilot_pipeline::ToolCatalog;
    use issuepilot_provider::{
        ChatRequest, ChatResponse, Choice, Message, Provider, ProviderError,
    };
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct StubProvider {
        responses: Mutex<VecDeque<String>>,
        calls: Mutex<usize>,
    }

    impl StubProvider {
        fn new(responses: Vec<&str>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into_iter().map(String::from).collect()),
                calls: Mutex::new(0),
            })
        }

        fn call_count(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn id(&self) -> &str {
            "stub"
        }

        fn model(&self) -> &str {
            "stub-model"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            let text = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default();
            Ok(ChatResponse {
                id: "r".to_string(),
                model: "stub-model".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(text),
                    finish_reason: Some("stop".to_string()),
                }],
                usage: None,
            })
        }
    }

    fn state_with_provider(provider: Arc<StubProvider>) -> Arc<ServerState> {
        ServerState::with_parts(
            provider,
            Arc::new(McpClient::new()),
            ToolCatalog::empty(),
            Config::default(),
        )
    }

    #[tokio::test]
    async fn form_without_marker_is_rejected_before_model_call() {
        let provider = StubProvider::new(vec![]);
        let state = state_with_provider(provider.clone());

        let result = respond_to_issue(
            State(state),
            RespondBody::Form(FormParams {
                issue: Some("Login fails, no repo line here".to_string()),
                payload: None,
            }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn structured_with_invalid_repo_is_rejected() {
        let provider = StubProvider::new(vec![]);
        let state = state_with_provider(provider.clone());

        let result = respond_to_issue(
            State(state),
            RespondBody::Structured(StructuredParams {
                issue_context: "crash on save".to_string(),
                repo_name: "no-slash".to_string(),
            }),
        )
        .await;

        assert!(matches!(result, Err(ApiError::BadRequest(_))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn form_without_recognized_fields_is_rejected() {
        let state = state_with_provider(StubProvider::new(vec![]));
        let result = respond_to_issue(
            State(state),
            RespondBody::Form(FormParams {
                issue: None,
                payload: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn valid_structured_request_returns_response_json() {
        // 3 research steps + synthesis on the structured path.
        let provider = StubProvider::new(vec![
            "closed #12",
            "open #34",
            "src/auth.rs",
            "Thanks for the report! This looks related to #12.",
        ]);
        let state = state_with_provider(provider.clone());

        let Json(body) = respond_to_issue(
            State(state),
            RespondBody::Structured(StructuredParams {
                issue_context: "Login fails on mobile".to_string(),
                repo_name: "acme/widgets".to_string(),
            }),
        )
        .await
        .expect("pipeline succeeds with stubbed provider");

        assert_eq!(
            body["response"],
            "Thanks for the report! This looks related to #12."
        );
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn zero_tools_still_returns_200_with_nonempty_response() {
        let provider = StubProvider::new(vec!["", "", "", ""]);
        let state = state_with_provider(provider);

        let Json(body) = respond_to_issue(
            State(state),
            RespondBody::Structured(StructuredParams {
                issue_context: "Login fails on mobile".to_string(),
                repo_name: "acme/widgets".to_string(),
            }),
        )
        .await
        .expect("degraded pipeline still completes");

        let response = body["response"].as_str().unwrap();
        assert!(!response.is_empty());
    }

    #[tokio::test]
    async fn body_dispatch_selects_json_for_json_content_type() {
        let req = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(
                r#"{"issue_context":"crash","repo_name":"acme/widgets"}"#,
            ))
            .unwrap();

        let body = RespondBody::from_request(req, &()).await.expect("json body");
        assert!(matches!(body, RespondBody::Structured(_)));
    }

    #[tokio::test]
    async fn body_dispatch_selects_form_for_urlencoded_content_type() {
        let req = Request::builder()
            .method("POST")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("issue=Broken%0ARepo%3A%20acme%2Fwidgets"))
            .unwrap();

        let body = RespondBody::from_request(req, &()).await.expect("form body");
        let RespondBody::Form(params) = body else {
            panic!("expected form variant");
        };
        assert!(params.issue.unwrap().contains("Repo: acme/widgets"));
    }

    #[tokio::test]
    async fn health_reports_tool_count() {
        let state = state_with_provider(StubProvider::new(vec![]));
        let Json(body) = health(State(state)).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tools"], 0);
    }
}
