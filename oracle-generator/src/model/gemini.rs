/// Gemini backend
///
/// Talks to the Generative Language REST API:
///
/// - buffered: `POST {base}/v1beta/models/{model}:generateContent`
/// - streaming: `POST {base}/v1beta/models/{model}:streamGenerateContent?alt=sse`
///
/// The response text is the concatenation of every
/// `candidates[0].content.parts[*].text`. In streaming mode each SSE `data:`
/// event carries one such response, and its text is one fragment.

use super::{ContentModel, FragmentStream, ModelError, ModelResult};
use async_trait::async_trait;
use futures::{future, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default API root
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub connect_timeout: Duration,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: GEMINI_DEFAULT_MODEL.to_string(),
            base_url: GEMINI_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

pub struct GeminiModel {
    client: Client,
    config: GeminiConfig,
}

impl std::fmt::Debug for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiModel")
            .field("model", &self.config.model)
            .field("base_url", &self.config.base_url)
            .finish()
    }
}

impl GeminiModel {
    pub fn new(config: GeminiConfig) -> ModelResult<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ModelError::Unavailable("GEMINI_API_KEY is empty".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ModelError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    async fn post(&self, url: String, instruction: &str) -> ModelResult<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&GenerateRequest::from_instruction(instruction))
            .send()
            .await
            .map_err(|e| ModelError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ContentModel for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, instruction: &str) -> ModelResult<String> {
        let response = self.post(self.endpoint("generateContent"), instruction).await?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Decode(e.to_string()))?;

        body.into_text()
    }

    async fn generate_stream(&self, instruction: &str) -> ModelResult<FragmentStream> {
        let url = format!("{}?alt=sse", self.endpoint("streamGenerateContent"));
        let response = self.post(url, instruction).await?;

        let fragments = response
            .bytes_stream()
            .map(Some)
            .chain(futures::stream::once(future::ready(None)))
            .scan(SseDecoder::default(), |decoder, chunk| {
                let events = match chunk {
                    Some(Ok(bytes)) => decoder.push(&bytes),
                    Some(Err(e)) => {
                        return future::ready(Some(vec![Err(ModelError::Request(e.to_string()))]))
                    }
                    None => decoder.finish(),
                };
                let items: Vec<ModelResult<String>> = events
                    .into_iter()
                    .filter_map(|data| parse_stream_event(&data).transpose())
                    .collect();
                future::ready(Some(items))
            })
            .flat_map(futures::stream::iter)
            .boxed();

        Ok(fragments)
    }
}

/// Text of one SSE event, or None for events without a candidate
///
/// A candidate with no text yields an empty fragment.
fn parse_stream_event(data: &str) -> ModelResult<Option<String>> {
    let body: GenerateResponse =
        serde_json::from_str(data).map_err(|e| ModelError::Decode(e.to_string()))?;

    if let Some(reason) = body.block_reason() {
        return Err(ModelError::Blocked(reason));
    }

    if body.candidates.is_empty() {
        return Ok(None);
    }
    Ok(Some(body.text()))
}

/// Incremental `text/event-stream` decoder
///
/// Collects bytes until a full line is available and yields the payload of
/// every `data:` line. Lines may be split across chunks at any byte,
/// including inside a multi-byte character.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            events.extend(data_payload(&line));
        }
        events
    }

    /// Flushes a last line that arrived without a trailing newline
    fn finish(&mut self) -> Vec<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line).into_iter().collect()
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

    let data = line.strip_prefix("data:")?.trim_start();
    (!data.is_empty()).then(|| data.to_string())
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn from_instruction(instruction: &'a str) -> Self {
        Self {
            contents: vec![RequestContent {
                role: "user",
                parts: vec![RequestPart { text: instruction }],
            }],
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateResponse {
    fn block_reason(&self) -> Option<String> {
        self.prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
    }

    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }

    fn into_text(self) -> ModelResult<String> {
        if let Some(reason) = self.block_reason() {
            return Err(ModelError::Blocked(reason));
        }
        if self.candidates.is_empty() {
            return Err(ModelError::Decode("response has no candidates".to_string()));
        }
        Ok(self.text())
    }
}
