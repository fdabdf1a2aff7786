//! Retrying wrapper around a [`TextProvider`].
//!
//! Output is always a stream of text chunks. Provider failures and timeouts
//! are retried with a linear backoff; when every attempt fails the stream
//! carries a single apology chunk instead of an error.

use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;

use super::metrics;
use super::providers::{GenerationParams, ProviderError, StreamChunk, TextProvider};

pub const TIMEOUT_APOLOGY: &str =
    "I'm sorry, but I'm experiencing a delay in my response. Please try again.";
pub const FAILURE_APOLOGY: &str =
    "I'm sorry, but I'm having trouble generating a response right now. Please try again later.";

/// Stream of generated text chunks.
pub type TextStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Text chunks followed by an error if the generation task failed.
pub type CheckedTextStream = Pin<Box<dyn Stream<Item = Result<String, GenerationFault>> + Send>>;

/// The generation task ended abnormally (panicked or was aborted).
#[derive(Debug, Error)]
#[error("generation task failed: {0}")]
pub struct GenerationFault(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before attempt `n + 1` is `base_delay * n`.
    pub base_delay: Duration,
    /// Deadline for each attempt to produce its first chunk, and the longest
    /// gap allowed between later chunks.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

#[derive(Debug)]
enum AttemptError {
    Timeout,
    Provider(ProviderError),
}

enum AttemptOutcome {
    Finished,
    /// Failed before any chunk reached the caller; safe to retry.
    Failed(AttemptError),
    /// Failed after output was delivered; retrying would repeat it.
    Interrupted(AttemptError),
    ReceiverGone,
}

#[derive(Clone)]
pub struct ResponseGenerator {
    provider: Arc<dyn TextProvider>,
    policy: RetryPolicy,
}

impl ResponseGenerator {
    pub fn new(provider: Arc<dyn TextProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// Generate a reply for `prompt`.
    ///
    /// With `stream == false` the result holds exactly one chunk with the
    /// whole reply. Generation runs in its own task and stops once the
    /// returned stream is dropped; at most one chunk is buffered ahead.
    pub fn generate(&self, prompt: String, params: GenerationParams, stream: bool) -> TextStream {
        let (rx, _task) = self.spawn(prompt, params, stream);
        Box::pin(ReceiverStream::new(rx))
    }

    /// Like [`generate`](Self::generate), but ends with an error item if the
    /// generation task dies instead of finishing.
    pub fn generate_checked(
        &self,
        prompt: String,
        params: GenerationParams,
        stream: bool,
    ) -> CheckedTextStream {
        let (rx, task) = self.spawn(prompt, params, stream);
        let fault = futures::stream::once(task).filter_map(|joined| async move {
            match joined {
                Ok(()) => None,
                Err(e) => Some(Err(GenerationFault(e.to_string()))),
            }
        });
        Box::pin(
            ReceiverStream::new(rx)
                .map(Ok::<String, GenerationFault>)
                .chain(fault),
        )
    }

    fn spawn(
        &self,
        prompt: String,
        params: GenerationParams,
        stream: bool,
    ) -> (mpsc::Receiver<String>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(1);
        let provider = self.provider.clone();
        let policy = self.policy;

        let task = tokio::spawn(async move {
            tokio::select! {
                _ = tx.closed() => {
                    tracing::debug!("Response receiver dropped, generation cancelled");
                }
                _ = drive(provider, policy, &prompt, &params, stream, &tx) => {}
            }
        });

        (rx, task)
    }

    /// Generate and collect the full reply.
    pub async fn generate_text(&self, prompt: String, params: GenerationParams) -> String {
        self.generate(prompt, params, false)
            .collect::<Vec<_>>()
            .await
            .concat()
    }
}

async fn drive(
    provider: Arc<dyn TextProvider>,
    policy: RetryPolicy,
    prompt: &str,
    params: &GenerationParams,
    stream: bool,
    tx: &mpsc::Sender<String>,
) {
    let started = Instant::now();
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = AttemptError::Provider(ProviderError::NotConfigured(
        "no attempts made".to_string(),
    ));

    for attempt in 1..=max_attempts {
        let outcome = if stream {
            attempt_stream(provider.as_ref(), policy, prompt, params, tx).await
        } else {
            attempt_single(provider.as_ref(), policy, prompt, params, tx).await
        };

        match outcome {
            AttemptOutcome::Finished => {
                metrics::record_generation_attempt("success");
                metrics::observe_generation_duration(stream, started.elapsed().as_secs_f64());
                tracing::debug!(attempt, model = provider.model_name(), "Generation finished");
                return;
            }
            AttemptOutcome::ReceiverGone => return,
            AttemptOutcome::Interrupted(error) => {
                log_failure(&error, attempt, max_attempts);
                metrics::record_generation_attempt(outcome_label(&error));
                let _ = tx.send(apology_for(&error).to_string()).await;
                return;
            }
            AttemptOutcome::Failed(error) => {
                log_failure(&error, attempt, max_attempts);
                metrics::record_generation_attempt(outcome_label(&error));
                last_error = error;
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    tracing::error!(
        attempts = max_attempts,
        "All generation attempts failed, sending apology"
    );
    metrics::record_generation_attempt("exhausted");
    let _ = tx.send(apology_for(&last_error).to_string()).await;
}

async fn attempt_single(
    provider: &dyn TextProvider,
    policy: RetryPolicy,
    prompt: &str,
    params: &GenerationParams,
    tx: &mpsc::Sender<String>,
) -> AttemptOutcome {
    match tokio::time::timeout(policy.attempt_timeout, provider.generate(prompt, params)).await {
        Ok(Ok(response)) => match tx.send(response.text.unwrap_or_default()).await {
            Ok(()) => AttemptOutcome::Finished,
            Err(_) => AttemptOutcome::ReceiverGone,
        },
        Ok(Err(e)) => AttemptOutcome::Failed(AttemptError::Provider(e)),
        Err(_) => AttemptOutcome::Failed(AttemptError::Timeout),
    }
}

async fn attempt_stream(
    provider: &dyn TextProvider,
    policy: RetryPolicy,
    prompt: &str,
    params: &GenerationParams,
    tx: &mpsc::Sender<String>,
) -> AttemptOutcome {
    let first_chunk_deadline = Instant::now() + policy.attempt_timeout;

    let mut chunks = match tokio::time::timeout_at(
        first_chunk_deadline,
        provider.generate_stream(prompt, params),
    )
    .await
    {
        Ok(Ok(chunks)) => chunks,
        Ok(Err(e)) => return AttemptOutcome::Failed(AttemptError::Provider(e)),
        Err(_) => return AttemptOutcome::Failed(AttemptError::Timeout),
    };

    let mut delivered = false;
    loop {
        let next = if delivered {
            tokio::time::timeout(policy.attempt_timeout, chunks.next()).await
        } else {
            tokio::time::timeout_at(first_chunk_deadline, chunks.next()).await
        };

        let error = match next {
            Ok(Some(Ok(StreamChunk::Text(text)))) => {
                if text.is_empty() {
                    continue;
                }
                if tx.send(text).await.is_err() {
                    return AttemptOutcome::ReceiverGone;
                }
                delivered = true;
                continue;
            }
            Ok(Some(Ok(StreamChunk::Complete { .. }))) | Ok(None) => {
                return AttemptOutcome::Finished;
            }
            Ok(Some(Err(e))) => AttemptError::Provider(e),
            Err(_) => AttemptError::Timeout,
        };

        return if delivered {
            AttemptOutcome::Interrupted(error)
        } else {
            AttemptOutcome::Failed(error)
        };
    }
}

fn log_failure(error: &AttemptError, attempt: u32, max_attempts: u32) {
    match error {
        AttemptError::Timeout => {
            tracing::warn!(attempt, max_attempts, "Generation attempt timed out");
        }
        AttemptError::Provider(e) => {
            tracing::warn!(attempt, max_attempts, error = %e, "Generation attempt failed");
        }
    }
}

fn outcome_label(error: &AttemptError) -> &'static str {
    match error {
        AttemptError::Timeout => "timeout",
        AttemptError::Provider(_) => "error",
    }
}

fn apology_for(error: &AttemptError) -> &'static str {
    match error {
        AttemptError::Timeout => TIMEOUT_APOLOGY,
        AttemptError::Provider(_) => FAILURE_APOLOGY,
    }
}
