//! Vector-similarity index
//!
//! One collection per minutes document, one entry per sentence identity.
//! Metadata carries the parent topic so retrieval can regroup matches into
//! whole topic blocks.

mod chroma;

pub use chroma::ChromaIndex;

use async_trait::async_trait;
use scribe_common::Result;
use serde::{Deserialize, Serialize};

/// Parent-topic metadata stored with every indexed sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMeta {
    #[serde(rename = "topicID")]
    pub topic_id: String,
    /// "No Title" when the topic has none
    #[serde(rename = "topicTitle")]
    pub topic_title: String,
}

impl TopicMeta {
    pub fn new(topic_id: &str, topic_title: Option<&str>) -> Self {
        Self {
            topic_id: topic_id.to_string(),
            topic_title: topic_title.unwrap_or("No Title").to_string(),
        }
    }
}

/// One similarity-search hit.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub sentence_id: String,
    pub meta: TopicMeta,
}

/// One indexed sentence fetched back out of a collection.
#[derive(Debug, Clone)]
pub struct IndexedSentence {
    pub sentence_id: String,
    pub text: String,
    pub meta: TopicMeta,
}

/// Vector store operations used by the tracker and the query pipeline.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace sentence embeddings, all under one topic.
    async fn upsert(
        &self,
        collection: &str,
        ids: &[String],
        texts: &[String],
        meta: &TopicMeta,
    ) -> Result<()>;

    /// Remove sentence embeddings by identity.
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()>;

    /// K-nearest-neighbour search for a question.
    async fn query(&self, collection: &str, text: &str, k: usize) -> Result<Vec<VectorMatch>>;

    /// Fetch every indexed sentence of one topic (unordered).
    async fn fetch_topic(&self, collection: &str, topic_id: &str) -> Result<Vec<IndexedSentence>>;

    /// Drop a whole collection (document deletion).
    async fn drop_collection(&self, collection: &str) -> Result<()>;
}
