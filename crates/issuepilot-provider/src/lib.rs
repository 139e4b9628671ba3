//! OpenAI-compatible chat completion client.
//!
//! Only the non-streaming `/chat/completions` route is used; the research
//! pipeline consumes whole responses, including any tool calls the model
//! requested.

pub mod message;
pub mod openai;
pub mod provider;
pub mod retry;

pub use message::*;
pub use openai::{OpenAiConfig, OpenAiProvider};
pub use provider::{Provider, ProviderError};
pub use retry::{with_retry, IsRetryable, RetryConfig};
