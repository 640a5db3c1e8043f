//! Scripted test doubles for the model gateway and vector index
//!
//! Compiled into the crate so both unit tests and the integration tests
//! under `tests/` can share them. Responses are routed by a substring of
//! the prompt, which keeps concurrent fan-out calls deterministic.

use crate::gateway::{AnswerStream, ChatMessage, ModelGateway, StreamEvent};
use crate::vector::{IndexedSentence, TopicMeta, VectorIndex, VectorMatch};
use async_trait::async_trait;
use scribe_common::{Error, Result};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A `ModelGateway` that answers from scripted routes.
///
/// Each route matches a substring of the rendered prompt and holds a FIFO
/// of responses; the first matching route with responses left wins.
#[derive(Default)]
pub struct ScriptedGateway {
    query_routes: Mutex<Vec<(String, VecDeque<Result<String>>)>>,
    stream_script: Mutex<VecDeque<Vec<Result<StreamEvent>>>>,
    queries: Mutex<Vec<Vec<ChatMessage>>>,
    stream_queries: Mutex<Vec<Vec<ChatMessage>>>,
    embeds: Mutex<Vec<Vec<String>>>,
    query_delay: Mutex<Option<std::time::Duration>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a non-streaming response for prompts containing `route`.
    pub fn script(&self, route: &str, response: Result<String>) {
        let mut routes = self.query_routes.lock().unwrap();
        if let Some((_, queue)) = routes.iter_mut().find(|(r, _)| r == route) {
            queue.push_back(response);
        } else {
            routes.push((route.to_string(), VecDeque::from([response])));
        }
    }

    /// Script the next streaming response (FIFO across all prompts).
    pub fn script_stream(&self, events: Vec<Result<StreamEvent>>) {
        self.stream_script.lock().unwrap().push_back(events);
    }

    /// Every non-streaming query observed, in call order.
    pub fn recorded_queries(&self) -> Vec<Vec<ChatMessage>> {
        self.queries.lock().unwrap().clone()
    }

    /// Every streaming query observed, in call order.
    pub fn recorded_stream_queries(&self) -> Vec<Vec<ChatMessage>> {
        self.stream_queries.lock().unwrap().clone()
    }

    pub fn recorded_embeds(&self) -> Vec<Vec<String>> {
        self.embeds.lock().unwrap().clone()
    }

    /// Make every non-streaming query take this long.
    pub fn set_query_delay(&self, delay: std::time::Duration) {
        *self.query_delay.lock().unwrap() = Some(delay);
    }
}

fn rendered(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn query(&self, messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        let delay = *self.query_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.queries.lock().unwrap().push(messages.to_vec());
        let prompt = rendered(messages);
        let mut routes = self.query_routes.lock().unwrap();
        for (route, queue) in routes.iter_mut() {
            if prompt.contains(route.as_str()) {
                if let Some(response) = queue.pop_front() {
                    return response;
                }
            }
        }
        Err(Error::Gateway(format!("no scripted response for: {:.60}", prompt)))
    }

    async fn query_streaming(
        &self,
        messages: &[ChatMessage],
        _temperature: f32,
    ) -> Result<AnswerStream> {
        self.stream_queries.lock().unwrap().push(messages.to_vec());
        let events = self
            .stream_script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Gateway("no scripted stream".to_string()))?;
        Ok(Box::pin(futures::stream::iter(events)))
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embeds.lock().unwrap().push(texts.to_vec());
        Ok(texts.iter().map(|_| vec![0.0, 0.0, 0.0]).collect())
    }
}

/// Convenience: a stream script for a clean answer.
pub fn ok_stream(tokens: &[&str]) -> Vec<Result<StreamEvent>> {
    let mut events: Vec<Result<StreamEvent>> = tokens
        .iter()
        .map(|t| Ok(StreamEvent::Token(t.to_string())))
        .collect();
    events.push(Ok(StreamEvent::Done));
    events
}

/// Convenience: a stream that fails after some tokens, with no Done marker.
pub fn aborted_stream(tokens: &[&str]) -> Vec<Result<StreamEvent>> {
    let mut events: Vec<Result<StreamEvent>> = tokens
        .iter()
        .map(|t| Ok(StreamEvent::Token(t.to_string())))
        .collect();
    events.push(Err(Error::StreamAborted("connection reset".to_string())));
    events
}

/// An in-memory `VectorIndex` with scripted similarity results.
#[derive(Default)]
pub struct ScriptedVector {
    /// (collection, sentence_id, text, meta) in upsert order
    entries: Mutex<Vec<(String, String, String, TopicMeta)>>,
    deletes: Mutex<Vec<String>>,
    matches: Mutex<VecDeque<Vec<VectorMatch>>>,
    fail_upsert: Mutex<bool>,
}

impl ScriptedVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the result of the next similarity query.
    pub fn script_matches(&self, matches: Vec<VectorMatch>) {
        self.matches.lock().unwrap().push_back(matches);
    }

    pub fn fail_next_upsert(&self) {
        *self.fail_upsert.lock().unwrap() = true;
    }

    pub fn deleted_ids(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl VectorIndex for ScriptedVector {
    async fn upsert(
        &self,
        collection: &str,
        ids: &[String],
        texts: &[String],
        meta: &TopicMeta,
    ) -> Result<()> {
        if std::mem::take(&mut *self.fail_upsert.lock().unwrap()) {
            return Err(Error::Vector("scripted upsert failure".to_string()));
        }
        let mut entries = self.entries.lock().unwrap();
        for (id, text) in ids.iter().zip(texts) {
            entries.retain(|(c, i, _, _)| !(c == collection && i == id));
            entries.push((collection.to_string(), id.clone(), text.clone(), meta.clone()));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|(c, i, _, _)| !(c == collection && ids.contains(i)));
        self.deletes.lock().unwrap().extend(ids.iter().cloned());
        Ok(())
    }

    async fn query(&self, _collection: &str, _text: &str, _k: usize) -> Result<Vec<VectorMatch>> {
        self.matches
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Vector("no scripted matches".to_string()))
    }

    async fn fetch_topic(&self, collection: &str, topic_id: &str) -> Result<Vec<IndexedSentence>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _, _, meta)| c == collection && meta.topic_id == topic_id)
            .map(|(_, id, text, meta)| IndexedSentence {
                sentence_id: id.clone(),
                text: text.clone(),
                meta: meta.clone(),
            })
            .collect())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.entries.lock().unwrap().retain(|(c, _, _, _)| c != collection);
        Ok(())
    }
}
