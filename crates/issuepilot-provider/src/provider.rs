use async_trait::async_trait;

use crate::{ChatRequest, ChatResponse};

#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;
    fn model(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error (status {status_code}): {message}")]
    ApiErrorWithStatus { message: String, status_code: u16 },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Timeout")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProviderError {
    pub fn api_error_with_status(message: impl Into<String>, status_code: u16) -> Self {
        ProviderError::ApiErrorWithStatus {
            message: message.into(),
            status_code,
        }
    }
}

impl crate::retry::IsRetryable for ProviderError {
    fn is_retryable(&self) -> Option<String> {
        match self {
            ProviderError::RateLimit => Some("Rate limited".to_string()),
            ProviderError::Timeout => Some("Request timed out".to_string()),
            ProviderError::NetworkError(msg) => Some(format!("Network error: {msg}")),
            ProviderError::ApiErrorWithStatus {
                status_code,
                message,
            } => {
                if matches!(status_code, 429 | 500 | 502 | 503 | 504) {
                    Some(format!("API error {status_code}: {message}"))
                } else {
                    None
                }
            }
            ProviderError::ApiError(_)
            | ProviderError::AuthError(_)
            | ProviderError::InvalidRequest(_)
            | ProviderError::ConfigError(_) => None,
        }
    }
}
