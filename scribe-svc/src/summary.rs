//! One-sentence topic summarisation

use crate::gateway::{ChatMessage, ModelGateway};
use crate::store::TranscriptStore;
use scribe_common::{Error, Result};
use std::sync::Arc;
use tracing::info;

const SUMMARY_PROMPT: &str = "Please read through the following paragraph. Please SUMMARISE \
    the content of THE MOST IMPORTANT sentences into ONE single COHESIVE and EXTREMELY SHORT \
    sentence topic description. The RESPONSE should be as CONCISE and COMPREHENSIVE as \
    possible so as to cover as much content in AS FEW WORDS as possible. Your generated \
    response must NEVER be LONGER than the given paragraph, and in at most 60 words. It must \
    only be ONE sentence please. Please take A THIRD PERSON POINT OF VIEW. ALWAYS return \
    only the one sentence description. NEVER preface the RESPONSE and just PURELY GIVE me \
    the response directly.";

pub const EMPTY_SUMMARY: &str = "Nothing to summarise.";

pub struct Summarizer {
    gateway: Arc<dyn ModelGateway>,
    transcript: TranscriptStore,
    temperature: f32,
}

impl Summarizer {
    pub fn new(gateway: Arc<dyn ModelGateway>, transcript: TranscriptStore, temperature: f32) -> Self {
        Self { gateway, transcript, temperature }
    }

    /// Condense one topic into a single-sentence description. An empty or
    /// unknown topic yields a fixed placeholder rather than a model call.
    pub async fn summarise(&self, minutes_id: &str, topic_id: &str) -> Result<String> {
        let topic = self
            .transcript
            .read_topic(minutes_id, topic_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("topic {} not found", topic_id)))?;

        let paragraph = topic
            .sentences
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        if paragraph.trim().is_empty() {
            return Ok(EMPTY_SUMMARY.to_string());
        }

        let messages = [
            ChatMessage::system(SUMMARY_PROMPT),
            ChatMessage::user(paragraph),
        ];
        let summary = self.gateway.query(&messages, self.temperature).await?;
        info!(minutes_id, topic_id, "Summarised topic");
        Ok(summary.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff;
    use crate::testing::ScriptedGateway;
    use scribe_common::db::connect_memory;

    async fn store_with_topic(minutes: &str) -> (TranscriptStore, String) {
        let pool = connect_memory().await.unwrap();
        let store = TranscriptStore::new(pool);
        let minutes_id = store.create().await.unwrap();
        let instructions = diff::diff(minutes, "t1", &[]);
        store
            .apply_instructions(&minutes_id, "t1", None, &instructions)
            .await
            .unwrap();
        (store, minutes_id)
    }

    #[tokio::test]
    async fn summarises_topic_content() {
        let gateway = Arc::new(ScriptedGateway::new());
        gateway.script("SUMMARISE", Ok("  The team agreed on a budget.  ".to_string()));
        let (store, minutes_id) = store_with_topic("We discussed money\nA budget was agreed").await;

        let summarizer = Summarizer::new(gateway.clone(), store, 0.2);
        let summary = summarizer.summarise(&minutes_id, "t1").await.unwrap();
        assert_eq!(summary, "The team agreed on a budget.");

        let prompt = &gateway.recorded_queries()[0][1].content;
        assert!(prompt.contains("We discussed money\nA budget was agreed"));
    }

    #[tokio::test]
    async fn empty_topic_skips_the_model() {
        let gateway = Arc::new(ScriptedGateway::new());
        let pool = connect_memory().await.unwrap();
        let store = TranscriptStore::new(pool);
        let minutes_id = store.create().await.unwrap();
        // A topic row with no sentences: seed one sentence then shrink to
        // a single blank line, tombstoning it
        let create = diff::diff("x", "t1", &[]);
        store.apply_instructions(&minutes_id, "t1", None, &create).await.unwrap();
        let stored = store.read_topic(&minutes_id, "t1").await.unwrap().unwrap();
        let mut clear = diff::InstructionSet::new();
        for sentence in &stored.sentences {
            clear.insert(sentence.sentence_id.clone(), None);
        }
        store.apply_instructions(&minutes_id, "t1", None, &clear).await.unwrap();

        let summarizer = Summarizer::new(gateway.clone(), store, 0.2);
        let summary = summarizer.summarise(&minutes_id, "t1").await.unwrap();
        assert_eq!(summary, EMPTY_SUMMARY);
        assert!(gateway.recorded_queries().is_empty());
    }

    #[tokio::test]
    async fn unknown_topic_is_not_found() {
        let gateway = Arc::new(ScriptedGateway::new());
        let pool = connect_memory().await.unwrap();
        let store = TranscriptStore::new(pool);
        let minutes_id = store.create().await.unwrap();

        let summarizer = Summarizer::new(gateway, store, 0.2);
        let err = summarizer.summarise(&minutes_id, "missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
