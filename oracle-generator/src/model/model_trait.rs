/// Core content-model trait and error types
///
/// Every backend supports both invocation modes:
///
/// ```text
/// generate(instruction)         -> full text
/// generate_stream(instruction)  -> fragment, fragment, ..., end
/// ```
///
/// Stream fragments arrive in backend order and concatenate to the full
/// text. A stream item that is an `Err` ends the generation; nothing is
/// retried.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Transport failure talking to the backend
    #[error("Model request failed: {0}")]
    Request(String),

    /// Non-success HTTP status
    #[error("Model backend returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Response body could not be decoded
    #[error("Malformed model response: {0}")]
    Decode(String),

    /// The backend refused the prompt
    #[error("Prompt blocked by model backend: {0}")]
    Blocked(String),

    /// The backend call did not finish in time
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    /// Backend unusable (misconfigured or scripted to fail)
    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Ordered text fragments from a streaming call
pub type FragmentStream = BoxStream<'static, ModelResult<String>>;

#[async_trait]
pub trait ContentModel: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Buffered mode: one call, complete text
    async fn generate(&self, instruction: &str) -> ModelResult<String>;

    /// Streaming mode: fragments in arrival order
    ///
    /// Errors that happen before the first fragment (bad status, connection
    /// refused) are returned directly; later ones arrive as stream items.
    async fn generate_stream(&self, instruction: &str) -> ModelResult<FragmentStream>;
}
