/// Output sinks for the generation pipeline
///
/// The pipeline is written once and told where its output goes:
///
/// - [`BufferedSink`]: buffered invocation; only the final outcome matters
/// - [`ChannelSink`]: streaming invocation; every fragment is forwarded as a
///   [`StreamRecord`] as soon as it arrives, followed by one terminal record
///
/// # Wire format
///
/// Stream records serialize to one JSON object per line (NDJSON):
///
/// ```text
/// {"type":"chunk","content":"He"}
/// {"type":"chunk","content":"llo"}
/// {"type":"done","slug":"a1b2c3d4e5f6"}
/// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Message sent to clients when a streamed generation fails
pub const GENERATION_FAILED_MESSAGE: &str = "Generation failed.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRecord {
    Chunk { content: String },
    Done { slug: String },
    Error { message: String },
}

impl StreamRecord {
    pub fn chunk(content: impl Into<String>) -> Self {
        StreamRecord::Chunk {
            content: content.into(),
        }
    }

    pub fn done(slug: impl Into<String>) -> Self {
        StreamRecord::Done { slug: slug.into() }
    }

    pub fn failed() -> Self {
        StreamRecord::Error {
            message: GENERATION_FAILED_MESSAGE.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamRecord::Chunk { .. })
    }

    /// One NDJSON line, newline included
    pub fn to_ndjson_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"type":"error","message":"{}"}}"#, GENERATION_FAILED_MESSAGE)
        });
        line.push('\n');
        line
    }
}

/// How the model is invoked for a given sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    Buffered,
    Streaming,
}

#[async_trait]
pub trait OutputSink: Send {
    fn mode(&self) -> InvocationMode;

    /// Called for each model fragment, in arrival order (streaming only)
    async fn fragment(&mut self, text: &str);

    /// Called once after the artifact is persisted
    async fn finished(&mut self, slug: &str);

    /// Called once when the generation fails at any stage
    async fn failed(&mut self);
}

/// Sink for buffered generations
#[derive(Debug, Default)]
pub struct BufferedSink {
    outcome: Option<Result<String, ()>>,
}

impl BufferedSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slug of the finished artifact, if the generation succeeded
    pub fn slug(&self) -> Option<&str> {
        match &self.outcome {
            Some(Ok(slug)) => Some(slug),
            _ => None,
        }
    }

    pub fn has_failed(&self) -> bool {
        matches!(self.outcome, Some(Err(())))
    }
}

#[async_trait]
impl OutputSink for BufferedSink {
    fn mode(&self) -> InvocationMode {
        InvocationMode::Buffered
    }

    async fn fragment(&mut self, _text: &str) {}

    async fn finished(&mut self, slug: &str) {
        self.outcome = Some(Ok(slug.to_string()));
    }

    async fn failed(&mut self) {
        self.outcome = Some(Err(()));
    }
}

/// Sink that forwards records over a channel
///
/// If the receiver goes away (the client disconnected), the generation keeps
/// running to completion and later records are dropped.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<StreamRecord>,
    receiver_gone: bool,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<StreamRecord>) -> Self {
        Self {
            tx,
            receiver_gone: false,
        }
    }

    async fn send(&mut self, record: StreamRecord) {
        if self.receiver_gone {
            return;
        }
        if self.tx.send(record).await.is_err() {
            tracing::debug!("Stream receiver dropped, discarding further records");
            self.receiver_gone = true;
        }
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    fn mode(&self) -> InvocationMode {
        InvocationMode::Streaming
    }

    async fn fragment(&mut self, text: &str) {
        self.send(StreamRecord::chunk(text)).await;
    }

    async fn finished(&mut self, slug: &str) {
        self.send(StreamRecord::done(slug)).await;
    }

    async fn failed(&mut self) {
        self.send(StreamRecord::failed()).await;
    }
}
