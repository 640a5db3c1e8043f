//! Model query gateway
//!
//! Thin seam in front of the language model. Everything above this module
//! talks in `ChatMessage` slices and gets back either a complete string or
//! a token stream with an explicit end-of-stream marker.

mod openai;

pub use openai::OpenAiGateway;

use async_trait::async_trait;
use futures::Stream;
use scribe_common::Result;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// One message of a model conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant", content: content.into() }
    }
}

/// Event on a streaming completion.
///
/// `Done` is an explicit marker from the gateway, not a token; persistence
/// decisions key off it rather than off stream exhaustion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    Done,
}

/// Boxed token stream returned by [`ModelGateway::query_streaming`].
pub type AnswerStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Language-model access used by the trackers and the query pipeline.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Run one completion and return the full response text.
    async fn query(&self, messages: &[ChatMessage], temperature: f32) -> Result<String>;

    /// Run one completion, yielding tokens as they arrive and terminating
    /// with [`StreamEvent::Done`] on normal completion.
    async fn query_streaming(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
    ) -> Result<AnswerStream>;

    /// Embed a batch of texts for the vector index.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Parsed boolean classification output.
///
/// The classification prompts demand the literal `True` or `False`; any
/// other response is `Unrecognized` and the caller picks the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgement {
    True,
    False,
    Unrecognized,
}

impl Judgement {
    pub fn parse(raw: &str) -> Judgement {
        match raw.trim() {
            "True" => Judgement::True,
            "False" => Judgement::False,
            _ => Judgement::Unrecognized,
        }
    }

    /// Collapse to a bool, substituting `default` for `Unrecognized`.
    pub fn to_bool_or(self, default: bool) -> bool {
        match self {
            Judgement::True => true,
            Judgement::False => false,
            Judgement::Unrecognized => default,
        }
    }
}
