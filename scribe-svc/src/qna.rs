//! Retrieval-augmented query pipeline
//!
//! A document question is rewritten into a standalone question against
//! recent chat history, grounded in transcript segments retrieved from the
//! vector index, answered as a token stream, and persisted as one exchange
//! only after the gateway's explicit end-of-stream marker. A web question
//! runs the same path minus retrieval, with the prior web exchanges as
//! conversational context.

use crate::diff::sentence_ordinal;
use crate::gateway::{AnswerStream, ChatMessage, ModelGateway, StreamEvent};
use crate::store::ChatHistoryStore;
use crate::vector::VectorIndex;
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use scribe_common::db::models::{ChatChannel, ChatExchange};
use scribe_common::{Error, Result};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info};

const REWRITE_PROMPT: &str = "You are given a conversation. Given a new question, your task \
    is to rephrase the last user query to be a standalone question in its own original \
    language. If the last user query is unrelated to the conversation, return the query. \
    Your response should just be the question and nothing else.";

const GROUNDED_PROMPT: &str = "You are given the following context in the format of Topic \
    Title: Topic Content. Given a user query, respond with the details from the context. Do \
    not fabricate any information. Be short and concise. If the context does not contain \
    any information, respond that you do not have the knowledge and apologise.";

const WEB_PROMPT: &str = "You are a Simple question and answer Model. You do not have \
    individuality, opinion or a personality. You will receive a question. Answer the \
    question in the most straightforward way possible. Minimising words where possible. \
    Try and keep responses below 50 words.";

/// Number of recent exchange pairs used as rewrite context.
const REWRITE_HISTORY_PAIRS: usize = 3;

/// Streamed answer text, chunk by chunk.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Explicit persistence capability for a completed exchange. The caller
/// decides whether an answer is recorded, not the stream plumbing.
pub struct ExchangeSink {
    history: ChatHistoryStore,
    chat_id: String,
    channel: ChatChannel,
    user_text: String,
    source_topic_ids: Option<Vec<String>>,
}

impl ExchangeSink {
    async fn record(&self, assistant_text: String) -> Result<()> {
        let exchange = ChatExchange {
            user: self.user_text.clone(),
            assistant: assistant_text,
            source_topic_ids: self.source_topic_ids.clone(),
        };
        self.history.append(&self.chat_id, self.channel, &exchange).await?;
        debug!(chat_id = %self.chat_id, channel = self.channel.column(), "Recorded exchange");
        Ok(())
    }
}

pub struct QueryPipeline {
    gateway: Arc<dyn ModelGateway>,
    vector: Option<Arc<dyn VectorIndex>>,
    history: ChatHistoryStore,
    temperature: f32,
    default_k: usize,
}

impl QueryPipeline {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        vector: Option<Arc<dyn VectorIndex>>,
        history: ChatHistoryStore,
        temperature: f32,
        default_k: usize,
    ) -> Self {
        Self { gateway, vector, history, temperature, default_k }
    }

    /// Answer a question about the transcript.
    ///
    /// Returns the grounding source topic ids (known before the first
    /// byte streams) and the answer stream. The exchange is persisted to
    /// the `document` channel only on clean stream completion.
    pub async fn answer_document(
        &self,
        minutes_id: &str,
        chat_history_id: &str,
        question: &str,
        k: Option<usize>,
    ) -> Result<(Vec<String>, TextStream)> {
        let vector = self
            .vector
            .as_ref()
            .ok_or_else(|| Error::Vector("no vector index configured".to_string()))?;

        // A follow-up question only needs rewriting when there is history
        // to follow up on.
        let log = self.history.read(chat_history_id, ChatChannel::Document).await?;
        let question = if log.is_empty() {
            question.to_string()
        } else {
            self.standalone_question(&log, question).await?
        };

        let k = k.unwrap_or(self.default_k);
        let matches = vector.query(minutes_id, &question, k).await?;

        // Distinct parent topics in first-seen order
        let mut topic_ids: Vec<String> = Vec::new();
        for hit in &matches {
            if !topic_ids.contains(&hit.meta.topic_id) {
                topic_ids.push(hit.meta.topic_id.clone());
            }
        }
        info!(k, topics = topic_ids.len(), "Retrieved grounding topics");

        let mut context = String::new();
        for topic_id in &topic_ids {
            let mut sentences = vector.fetch_topic(minutes_id, topic_id).await?;
            // Positional order; identities are not lexicographically sortable
            sentences.sort_by_key(|s| {
                sentence_ordinal(&s.sentence_id, topic_id).unwrap_or(u64::MAX)
            });
            let title = sentences
                .first()
                .map(|s| s.meta.topic_title.clone())
                .unwrap_or_else(|| "No Title".to_string());

            context.push_str(&format!("Topic Title: {}\n", title));
            for sentence in &sentences {
                context.push_str(&sentence.text);
                context.push('\n');
            }
            context.push('\n');
        }

        let messages = [ChatMessage::system(format!(
            "{}\nContext:\n{}\nUser Query:\n{}",
            GROUNDED_PROMPT, context, question
        ))];
        let stream = self.gateway.query_streaming(&messages, self.temperature).await?;

        let sink = ExchangeSink {
            history: self.history.clone(),
            chat_id: chat_history_id.to_string(),
            channel: ChatChannel::Document,
            user_text: question,
            source_topic_ids: Some(topic_ids.clone()),
        };
        Ok((topic_ids, stream_answer(stream, Some(sink))))
    }

    /// Answer a general question using the prior web conversation as
    /// context. Same persistence contract as [`answer_document`].
    ///
    /// [`answer_document`]: QueryPipeline::answer_document
    pub async fn answer_web(&self, chat_history_id: &str, question: &str) -> Result<TextStream> {
        let log = self.history.read(chat_history_id, ChatChannel::Web).await?;

        let mut messages = vec![ChatMessage::system(WEB_PROMPT)];
        for exchange in &log {
            messages.push(ChatMessage::user(exchange.user.clone()));
            messages.push(ChatMessage::assistant(exchange.assistant.clone()));
        }
        messages.push(ChatMessage::user(question.to_string()));

        let stream = self.gateway.query_streaming(&messages, self.temperature).await?;
        let sink = ExchangeSink {
            history: self.history.clone(),
            chat_id: chat_history_id.to_string(),
            channel: ChatChannel::Web,
            user_text: question.to_string(),
            source_topic_ids: None,
        };
        Ok(stream_answer(stream, Some(sink)))
    }

    /// Drain a web answer to completion and return the full text.
    pub async fn answer_web_full(&self, chat_history_id: &str, question: &str) -> Result<String> {
        let mut stream = self.answer_web(chat_history_id, question).await?;
        let mut answer = String::new();
        while let Some(chunk) = stream.next().await {
            answer.push_str(&chunk?);
        }
        Ok(answer)
    }

    /// Rewrite a follow-up question into a standalone question using the
    /// most recent exchange pairs as context.
    async fn standalone_question(&self, log: &[ChatExchange], question: &str) -> Result<String> {
        let recent = &log[log.len().saturating_sub(REWRITE_HISTORY_PAIRS)..];
        let mut chat_context = String::new();
        for exchange in recent {
            chat_context.push_str(&format!("user: {}\n", exchange.user));
            chat_context.push_str(&format!("assistant: {}\n", exchange.assistant));
        }

        let messages = [ChatMessage::system(format!(
            "{}\n\nChathistory:\n{}\nLast user query: {}",
            REWRITE_PROMPT, chat_context, question
        ))];
        let rewritten = self.gateway.query(&messages, self.temperature).await?;
        debug!(original = question, rewritten = %rewritten.trim(), "Rewrote follow-up question");
        Ok(rewritten.trim().to_string())
    }
}

/// Relay a token stream while accumulating the full answer; on the
/// explicit end-of-stream marker, record the exchange through the sink.
/// An abnormal termination records nothing.
fn stream_answer(mut stream: AnswerStream, sink: Option<ExchangeSink>) -> TextStream {
    let body = try_stream! {
        let mut answer = String::new();
        while let Some(event) = stream.next().await {
            match event? {
                StreamEvent::Token(token) => {
                    answer.push_str(&token);
                    yield token;
                }
                StreamEvent::Done => {
                    if let Some(sink) = &sink {
                        sink.record(answer.clone()).await?;
                    }
                    return;
                }
            }
        }
        // Exhaustion without the marker counts as abnormal termination
        Err::<(), Error>(Error::StreamAborted(
            "stream ended without completion marker".to_string(),
        ))?;
    };
    Box::pin(body)
}
