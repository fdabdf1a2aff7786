//! Gemini provider implementation.
//!
//! Implements text generation using Google's Gemini API.
//! Supports both streaming and non-streaming responses.

use super::{
    FinishReason, GenerationParams, ProviderError, ProviderResponse, ProviderStream, StreamChunk,
    TextProvider,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
        }
    }
}

/// Gemini text provider.
pub struct GeminiTextProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiTextProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        // Per-attempt deadlines are enforced by the response generator.
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the given model and method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    fn build_request(&self, prompt: &str, params: &GenerationParams) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![ContentPart {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: Some(GenerationConfig {
                temperature: params.temperature,
                top_p: params.top_p,
                top_k: params.top_k,
                max_output_tokens: params.max_tokens,
                stop_sequences: if params.stop_sequences.is_empty() {
                    None
                } else {
                    Some(params.stop_sequences.clone())
                },
            }),
        }
    }

    async fn post(
        &self,
        method: &str,
        query: &[(&str, &str)],
        request: &GenerateContentRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.api_url(method))
            .query(&[("key", self.config.api_key.as_str())])
            .query(query)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl TextProvider for GeminiTextProvider {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.build_request(prompt, params);

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Sending request to Gemini API"
        );

        let response = self.post("generateContent", &[], &request).await?;

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let text = api_response.candidates.first().map(Candidate::text);

        // Get token usage
        let usage = api_response.usage_metadata.unwrap_or_default();

        let finish_reason = api_response
            .candidates
            .first()
            .and_then(|c| c.finish_reason.as_deref())
            .map(FinishReason::from_gemini)
            .unwrap_or(FinishReason::Complete);

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError> {
        let request = self.build_request(prompt, params);

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Starting streaming request to Gemini API"
        );

        let response = self
            .post("streamGenerateContent", &[("alt", "sse")], &request)
            .await?;

        // Create channel for streaming
        let (tx, rx) = mpsc::channel(1);

        // Spawn task to process SSE stream
        tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut parser = SseParser::default();

            while let Some(chunk_result) = stream.next().await {
                match chunk_result {
                    Ok(bytes) => {
                        for item in parser.push(&bytes) {
                            if tx.send(item).await.is_err() {
                                // Receiver dropped: the caller went away.
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::NetworkError(e.to_string())))
                            .await;
                        return;
                    }
                }
            }

            for item in parser.finish() {
                if tx.send(item).await.is_err() {
                    return;
                }
            }
        });

        let stream = ReceiverStream::new(rx);
        Ok(Box::pin(stream) as ProviderStream)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        let url = format!(
            "{}/models/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        );

        let response = self
            .client
            .get(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

/// Incremental parser for Gemini's `alt=sse` response body.
#[derive(Default)]
struct SseParser {
    /// Raw body bytes not yet closed by a blank line. May end mid-character.
    buffer: Vec<u8>,
    input_tokens: i32,
    output_tokens: i32,
    finish_reason: Option<FinishReason>,
}

impl SseParser {
    /// Feed raw body bytes, returning the chunks completed by them.
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, ProviderError>> {
        // CR only occurs in line endings; JSON escapes it inside strings.
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut out = Vec::new();
        while let Some(event_end) = find_event_end(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..event_end + 2).collect();
            if let Some(chunk) = self.parse_raw_event(&event) {
                out.push(chunk);
            }
        }
        out
    }

    /// Flush any trailing event and emit the completion marker.
    fn finish(&mut self) -> Vec<Result<StreamChunk, ProviderError>> {
        let rest = std::mem::take(&mut self.buffer);
        let mut out: Vec<_> = self.parse_raw_event(&rest).into_iter().collect();

        let finish_reason = self.finish_reason.unwrap_or(FinishReason::Complete);
        if finish_reason == FinishReason::ContentFilter {
            out.push(Err(ProviderError::ContentFiltered));
        } else {
            out.push(Ok(StreamChunk::Complete {
                input_tokens: self.input_tokens,
                output_tokens: self.output_tokens,
                finish_reason,
            }));
        }
        out
    }

    fn parse_raw_event(&mut self, event: &[u8]) -> Option<Result<StreamChunk, ProviderError>> {
        match std::str::from_utf8(event) {
            Ok(text) => self.parse_event(text),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping Gemini stream event with invalid UTF-8");
                None
            }
        }
    }

    fn parse_event(&mut self, event: &str) -> Option<Result<StreamChunk, ProviderError>> {
        let data: String = event
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim_start)
            .collect();

        if data.is_empty() {
            return None;
        }

        let response: GenerateContentResponse = match serde_json::from_str(&data) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unparseable Gemini stream event");
                return None;
            }
        };

        if let Some(usage) = &response.usage_metadata {
            self.input_tokens = usage.prompt_token_count.unwrap_or(self.input_tokens);
            self.output_tokens = usage.candidates_token_count.unwrap_or(self.output_tokens);
        }

        let candidate = response.candidates.first()?;
        if let Some(reason) = candidate.finish_reason.as_deref() {
            self.finish_reason = Some(FinishReason::from_gemini(reason));
        }

        let text = candidate.text();
        if text.is_empty() {
            None
        } else {
            Some(Ok(StreamChunk::Text(text)))
        }
    }
}

/// Index of the blank line closing the first complete event.
fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ContentPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl Candidate {
    /// Concatenated text of every part.
    fn text(&self) -> String {
        self.content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}
