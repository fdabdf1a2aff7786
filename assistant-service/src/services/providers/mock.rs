//! Mock provider implementations for testing and local runs.

use super::{
    FinishReason, GenerationParams, ProviderError, ProviderResponse, ProviderStream, StreamChunk,
    TextProvider,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::time::Instant;

/// Mock text provider that answers with a canned reply.
pub struct MockTextProvider {
    enabled: bool,
}

impl MockTextProvider {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn check_enabled(&self) -> Result<(), ProviderError> {
        if self.enabled {
            Ok(())
        } else {
            Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            ))
        }
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.check_enabled()?;

        // Simulate some processing
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Ok(ProviderResponse {
            text: Some(format!(
                "Mock response ({} prompt characters)",
                prompt.chars().count()
            )),
            input_tokens: prompt.len() as i32 / 4,
            output_tokens: 10,
            finish_reason: FinishReason::Complete,
        })
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError> {
        self.check_enabled()?;

        let input_tokens = prompt.len() as i32 / 4;
        let chunks: Vec<Result<StreamChunk, ProviderError>> = vec![
            Ok(StreamChunk::Text("Mock".to_string())),
            Ok(StreamChunk::Text(" streaming".to_string())),
            Ok(StreamChunk::Text(" response".to_string())),
            Ok(StreamChunk::Complete {
                input_tokens,
                output_tokens: 3,
                finish_reason: FinishReason::Complete,
            }),
        ];

        Ok(Box::pin(tokio_stream::iter(chunks)))
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        self.check_enabled()
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// What one call to a [`ScriptedTextProvider`] does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Reply with these chunks (joined for non-streaming calls).
    Reply(Vec<String>),
    /// Fail before producing anything.
    Fail(ProviderError),
    /// Never answer.
    Hang,
    /// Stream these chunks, then fail.
    FailAfter(Vec<String>),
}

/// Provider that plays back one [`Script`] per call and records every call.
///
/// Once the scripts run out, every further call replies with `fallback`.
pub struct ScriptedTextProvider {
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub params: GenerationParams,
    pub stream: bool,
    pub at: Instant,
}

impl ScriptedTextProvider {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback: Script::Fail(ProviderError::ApiError("script exhausted".to_string())),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always reply with `chunks`.
    pub fn replying(chunks: &[&str]) -> Self {
        let mut provider = Self::new(Vec::new());
        provider.fallback = Script::Reply(chunks.iter().map(|c| c.to_string()).collect());
        provider
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    fn next_script(&self, prompt: &str, params: &GenerationParams, stream: bool) -> Script {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                params: params.clone(),
                stream,
                at: Instant::now(),
            });
        }
        self.scripts
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl TextProvider for ScriptedTextProvider {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        match self.next_script(prompt, params, false) {
            Script::Reply(chunks) => Ok(ProviderResponse {
                text: Some(chunks.concat()),
                input_tokens: 0,
                output_tokens: chunks.len() as i32,
                finish_reason: FinishReason::Complete,
            }),
            Script::Fail(e) => Err(e),
            Script::FailAfter(_) => Err(ProviderError::NetworkError(
                "connection reset".to_string(),
            )),
            Script::Hang => std::future::pending().await,
        }
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ProviderStream, ProviderError> {
        match self.next_script(prompt, params, true) {
            Script::Reply(chunks) => {
                let output_tokens = chunks.len() as i32;
                let mut items: Vec<Result<StreamChunk, ProviderError>> =
                    chunks.into_iter().map(|c| Ok(StreamChunk::Text(c))).collect();
                items.push(Ok(StreamChunk::Complete {
                    input_tokens: 0,
                    output_tokens,
                    finish_reason: FinishReason::Complete,
                }));
                Ok(Box::pin(tokio_stream::iter(items)))
            }
            Script::Fail(e) => Err(e),
            Script::FailAfter(chunks) => {
                let mut items: Vec<Result<StreamChunk, ProviderError>> =
                    chunks.into_iter().map(|c| Ok(StreamChunk::Text(c))).collect();
                items.push(Err(ProviderError::NetworkError(
                    "connection reset".to_string(),
                )));
                Ok(Box::pin(tokio_stream::iter(items)))
            }
            Script::Hang => Ok(Box::pin(futures::stream::pending::<
                Result<StreamChunk, ProviderError>,
            >())),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
