//! OpenAI-compatible gateway client
//!
//! Non-streaming calls carry a per-request timeout and a fixed retry budget
//! with a one-second pause between attempts; exhausting the budget surfaces
//! a gateway error. Streaming calls retry only while establishing the
//! stream and enforce a timeout on each chunk arrival; a chunk timeout or
//! transport failure mid-stream becomes an explicit stream-abort error.

use super::{AnswerStream, ChatMessage, ModelGateway, StreamEvent};
use async_stream::try_stream;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use scribe_common::config::GatewayConfig;
use scribe_common::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

pub struct OpenAiGateway {
    http_client: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiGateway {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Gateway(e.to_string()))?;

        Ok(Self { http_client, config })
    }

    /// POST a JSON body, retrying transient failures up to the configured
    /// budget. Client errors other than rate limiting are not retried.
    async fn post_with_retry(
        &self,
        path: &str,
        body: &serde_json::Value,
        per_request_timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.config.base_url, path);
        let pause = Duration::from_millis(self.config.retry_pause_ms);
        let mut attempt = 0u32;

        loop {
            let mut request = self
                .http_client
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(body);
            if let Some(t) = per_request_timeout {
                request = request.timeout(t);
            }

            let detail = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    let detail = format!("{} returned {}", path, status);
                    if !retryable {
                        let text = response.text().await.unwrap_or_default();
                        return Err(Error::Gateway(format!("{}: {}", detail, text)));
                    }
                    detail
                }
                Err(e) => e.to_string(),
            };

            attempt += 1;
            if attempt > self.config.max_retries {
                warn!("Gateway request failed after {} retries: {}", self.config.max_retries, detail);
                return Err(Error::Gateway(detail));
            }
            debug!("Gateway request failed (retry {}): {}", attempt, detail);
            tokio::time::sleep(pause).await;
        }
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    async fn query(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
        });

        let response = self.post_with_retry("/chat/completions", &body, None).await?;
        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Gateway(format!("malformed completion response: {}", e)))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Gateway("completion response had no choices".to_string()))
    }

    async fn query_streaming(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<AnswerStream> {
        let body = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": temperature,
            "stream": true,
        });

        // The request timeout must cover the whole stream lifetime, not the
        // default single-response budget; chunk arrival is policed below.
        let response = self
            .post_with_retry("/chat/completions", &body, Some(Duration::from_secs(600)))
            .await?;

        let chunk_timeout = Duration::from_secs(self.config.chunk_timeout_secs);
        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(|e| e.to_string()));
        Ok(sse_answer_stream(Box::pin(bytes), chunk_timeout))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.config.embedding_model,
            "input": texts,
        });

        let response = self.post_with_retry("/embeddings", &body, None).await?;
        let embeddings: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Gateway(format!("malformed embedding response: {}", e)))?;

        if embeddings.data.len() != texts.len() {
            return Err(Error::Gateway(format!(
                "embedding count mismatch: asked {}, got {}",
                texts.len(),
                embeddings.data.len()
            )));
        }

        Ok(embeddings.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Parse an SSE byte stream into answer events.
///
/// Lines are split at the byte level before any text decoding, so a network
/// chunk boundary falling inside a multi-byte character cannot corrupt token
/// text. Each chunk arrival is bounded by `chunk_timeout`.
fn sse_answer_stream<S>(mut bytes: S, chunk_timeout: Duration) -> AnswerStream
where
    S: Stream<Item = std::result::Result<Vec<u8>, String>> + Send + Unpin + 'static,
{
    let stream = try_stream! {
        let mut buffer: Vec<u8> = Vec::new();

        loop {
            let chunk = match timeout(chunk_timeout, bytes.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => Err(Error::StreamAborted(e))?,
                Ok(None) => {
                    Err(Error::StreamAborted(
                        "stream closed before completion marker".to_string(),
                    ))?
                }
                Err(_) => {
                    Err(Error::StreamAborted(
                        "timed out waiting for next chunk".to_string(),
                    ))?
                }
            };

            buffer.extend_from_slice(&chunk);
            while let Some(newline) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    debug!("Streaming completion finished");
                    yield StreamEvent::Done;
                    return;
                }
                if let Ok(parsed) = serde_json::from_str::<StreamChunk>(data) {
                    if let Some(token) = parsed
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content)
                    {
                        if !token.is_empty() {
                            yield StreamEvent::Token(token);
                        }
                    }
                }
            }
        }
    };
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn sse_line(data: &str) -> Vec<u8> {
        format!("data: {}\n\n", data).into_bytes()
    }

    fn token_json(text: &str) -> String {
        format!(r#"{{"choices":[{{"delta":{{"content":"{}"}}}}]}}"#, text)
    }

    async fn collect(
        chunks: Vec<std::result::Result<Vec<u8>, String>>,
        chunk_timeout: Duration,
    ) -> Vec<Result<StreamEvent>> {
        sse_answer_stream(Box::pin(stream::iter(chunks)), chunk_timeout)
            .collect()
            .await
    }

    #[tokio::test]
    async fn parses_tokens_and_done_marker() {
        let mut payload = sse_line(&token_json("Hel"));
        payload.extend(sse_line(&token_json("lo")));
        payload.extend(sse_line("[DONE]"));

        let events = collect(vec![Ok(payload)], Duration::from_secs(1)).await;
        assert_eq!(events.len(), 3);
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Token("Hel".to_string()));
        assert_eq!(*events[1].as_ref().unwrap(), StreamEvent::Token("lo".to_string()));
        assert_eq!(*events[2].as_ref().unwrap(), StreamEvent::Done);
    }

    #[tokio::test]
    async fn chunk_boundary_inside_multibyte_char_keeps_token_intact() {
        let payload = sse_line(&token_json("café"));
        // Split between the two bytes of the 'é'
        let cut = payload
            .windows(2)
            .position(|w| w == [0xC3, 0xA9])
            .unwrap()
            + 1;
        let (head, tail) = payload.split_at(cut);

        let events = collect(
            vec![Ok(head.to_vec()), Ok(tail.to_vec()), Ok(sse_line("[DONE]"))],
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Token("café".to_string()));
        assert_eq!(*events[1].as_ref().unwrap(), StreamEvent::Done);
    }

    #[tokio::test]
    async fn close_without_done_marker_is_an_abort() {
        let events = collect(vec![Ok(sse_line(&token_json("hi")))], Duration::from_secs(1)).await;
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Token("hi".to_string()));
        assert!(matches!(events[1], Err(Error::StreamAborted(_))));
    }

    #[tokio::test]
    async fn stalled_chunk_arrival_times_out() {
        let chunks = stream::iter(vec![Ok(sse_line(&token_json("hi")))])
            .chain(stream::pending::<std::result::Result<Vec<u8>, String>>());

        let events: Vec<Result<StreamEvent>> =
            sse_answer_stream(Box::pin(chunks), Duration::from_millis(50))
                .collect()
                .await;
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Token("hi".to_string()));
        assert!(matches!(events[1], Err(Error::StreamAborted(_))));
    }

    #[tokio::test]
    async fn transport_error_mid_stream_is_an_abort() {
        let events = collect(
            vec![
                Ok(sse_line(&token_json("partial"))),
                Err("connection reset".to_string()),
            ],
            Duration::from_secs(1),
        )
        .await;
        assert_eq!(*events[0].as_ref().unwrap(), StreamEvent::Token("partial".to_string()));
        assert!(matches!(events[1], Err(Error::StreamAborted(_))));
    }
}
