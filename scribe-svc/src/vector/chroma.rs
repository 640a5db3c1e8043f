//! Chroma HTTP API client
//!
//! Collections are created on demand and their server-side ids cached.
//! Embeddings are computed through the model gateway, so the server needs
//! no embedding function of its own.

use super::{IndexedSentence, TopicMeta, VectorIndex, VectorMatch};
use crate::gateway::ModelGateway;
use async_trait::async_trait;
use scribe_common::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

pub struct ChromaIndex {
    http_client: reqwest::Client,
    base_url: String,
    gateway: Arc<dyn ModelGateway>,
    /// collection name -> server-side collection id
    collection_ids: Mutex<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    metadatas: Vec<Vec<TopicMeta>>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<TopicMeta>,
}

impl ChromaIndex {
    pub fn new(base_url: &str, gateway: Arc<dyn ModelGateway>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Vector(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            gateway,
            collection_ids: Mutex::new(HashMap::new()),
        })
    }

    /// Resolve (and cache) the server-side id of a named collection.
    async fn collection_id(&self, name: &str) -> Result<String> {
        {
            let cache = self.collection_ids.lock().await;
            if let Some(id) = cache.get(name) {
                return Ok(id.clone());
            }
        }

        let url = format!("{}/api/v1/collections", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&json!({ "name": name, "get_or_create": true }))
            .send()
            .await
            .map_err(|e| Error::Vector(e.to_string()))?;
        let collection: CollectionResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Vector(format!("malformed collection response: {}", e)))?;

        debug!(name, id = %collection.id, "Resolved vector collection");
        let mut cache = self.collection_ids.lock().await;
        cache.insert(name.to_string(), collection.id.clone());
        Ok(collection.id)
    }

    async fn post(&self, path: &str, body: serde_json::Value) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Vector(e.to_string()))?;
        check(response).await
    }
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(Error::Vector(format!("vector store returned {}: {}", status, text)))
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn upsert(
        &self,
        collection: &str,
        ids: &[String],
        texts: &[String],
        meta: &TopicMeta,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let embeddings = self.gateway.embed(texts).await?;
        let collection_id = self.collection_id(collection).await?;
        let metadatas: Vec<&TopicMeta> = ids.iter().map(|_| meta).collect();

        self.post(
            &format!("/api/v1/collections/{}/upsert", collection_id),
            json!({
                "ids": ids,
                "documents": texts,
                "embeddings": embeddings,
                "metadatas": metadatas,
            }),
        )
        .await?;
        debug!(collection, count = ids.len(), "Upserted sentence embeddings");
        Ok(())
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let collection_id = self.collection_id(collection).await?;
        self.post(
            &format!("/api/v1/collections/{}/delete", collection_id),
            json!({ "ids": ids }),
        )
        .await?;
        debug!(collection, count = ids.len(), "Deleted sentence embeddings");
        Ok(())
    }

    async fn query(&self, collection: &str, text: &str, k: usize) -> Result<Vec<VectorMatch>> {
        let embeddings = self.gateway.embed(&[text.to_string()]).await?;
        let collection_id = self.collection_id(collection).await?;

        let response = self
            .post(
                &format!("/api/v1/collections/{}/query", collection_id),
                json!({
                    "query_embeddings": embeddings,
                    "n_results": k,
                    "include": ["metadatas"],
                }),
            )
            .await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::Vector(format!("malformed query response: {}", e)))?;

        let ids = parsed.ids.into_iter().next().unwrap_or_default();
        let metas = parsed.metadatas.into_iter().next().unwrap_or_default();
        Ok(ids
            .into_iter()
            .zip(metas)
            .map(|(sentence_id, meta)| VectorMatch { sentence_id, meta })
            .collect())
    }

    async fn fetch_topic(&self, collection: &str, topic_id: &str) -> Result<Vec<IndexedSentence>> {
        let collection_id = self.collection_id(collection).await?;
        let response = self
            .post(
                &format!("/api/v1/collections/{}/get", collection_id),
                json!({
                    "where": { "topicID": topic_id },
                    "include": ["documents", "metadatas"],
                }),
            )
            .await?;
        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| Error::Vector(format!("malformed get response: {}", e)))?;

        Ok(parsed
            .ids
            .into_iter()
            .zip(parsed.documents)
            .zip(parsed.metadatas)
            .map(|((sentence_id, text), meta)| IndexedSentence { sentence_id, text, meta })
            .collect())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let url = format!("{}/api/v1/collections/{}", self.base_url, collection);
        let response = self
            .http_client
            .delete(&url)
            .send()
            .await
            .map_err(|e| Error::Vector(e.to_string()))?;
        check(response).await?;
        let mut cache = self.collection_ids.lock().await;
        cache.remove(collection);
        Ok(())
    }
}
