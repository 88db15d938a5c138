//! Echo provider.
//!
//! Streams the most recent user message back word by word. Used by the CLI
//! to drive a full run without a model backend.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::provider::{
    Provider, ProviderError, ProviderEvent, ProviderEventStream, ProviderRequest, ProviderResult,
    StopReason, TokenUsage,
};

/// Provider that echoes the latest user text.
#[derive(Clone, Debug, Default)]
pub struct EchoProvider {
    chunk_delay: Duration,
}

impl EchoProvider {
    /// Create an echo provider with no delay between chunks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause between streamed chunks.
    #[must_use]
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }
}

/// Split `text` into word chunks that keep their trailing whitespace.
fn chunks(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if ch.is_whitespace() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

#[async_trait]
impl Provider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn stream(
        &self,
        cancel: &CancellationToken,
        request: &ProviderRequest,
    ) -> ProviderResult<ProviderEventStream> {
        let text = request.last_user_text().unwrap_or_default().to_owned();
        debug!(chars = text.len(), "echo round-trip");
        let parts = chunks(&text);
        let input_tokens = request.messages.len() as u64;
        let output_tokens = parts.len() as u64;
        let delay = self.chunk_delay;
        let cancel = cancel.clone();

        Ok(Box::pin(async_stream::stream! {
            yield Ok(ProviderEvent::Start);
            for delta in parts {
                if !delay.is_zero() {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            yield Err(ProviderError::Cancelled);
                            return;
                        }
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                if cancel.is_cancelled() {
                    yield Err(ProviderError::Cancelled);
                    return;
                }
                yield Ok(ProviderEvent::TextDelta { delta });
            }
            yield Ok(ProviderEvent::Done {
                stop_reason: StopReason::EndTurn,
                usage: Some(TokenUsage { input_tokens, output_tokens }),
            });
        }))
    }
}
