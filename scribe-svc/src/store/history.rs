//! Chat-history store
//!
//! One row per chat session with two append-only channels: `document` for
//! transcript questions and `web` for general questions. Exchanges are
//! appended whole once an answer completes and are only ever bulk-cleared.

use scribe_common::db::models::{ChatChannel, ChatExchange};
use scribe_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct ChatHistoryStore {
    pool: SqlitePool,
}

impl ChatHistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an empty chat-history document and return its id.
    pub async fn create(&self) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO chat_history (id) VALUES (?)")
            .bind(&id)
            .execute(&self.pool)
            .await?;
        info!("Created chat-history document {}", id);
        Ok(id)
    }

    pub async fn read(&self, chat_id: &str, channel: ChatChannel) -> Result<Vec<ChatExchange>> {
        let sql = format!("SELECT {} FROM chat_history WHERE id = ?", channel.column());
        let row = sqlx::query_as::<_, (String,)>(&sql)
            .bind(chat_id)
            .fetch_optional(&self.pool)
            .await?;
        let (json,) = row.ok_or_else(|| Error::NotFound(format!("chat history {}", chat_id)))?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Internal(format!("corrupt chat history: {}", e)))
    }

    /// Append one completed exchange to a channel.
    ///
    /// A single atomic UPDATE: appends can race against each other (the
    /// streaming answer path persists outside the scheduler) and must
    /// never lose an entry to a read-modify-write interleaving.
    pub async fn append(
        &self,
        chat_id: &str,
        channel: ChatChannel,
        exchange: &ChatExchange,
    ) -> Result<()> {
        let json = serde_json::to_string(exchange)
            .map_err(|e| Error::Internal(format!("serialize failed: {}", e)))?;
        let column = channel.column();
        let sql = format!(
            "UPDATE chat_history SET {col} = json_insert({col}, '$[#]', json(?)) WHERE id = ?",
            col = column
        );
        let updated = sqlx::query(&sql)
            .bind(json)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("chat history {}", chat_id)));
        }
        Ok(())
    }

    /// Bulk-clear one channel.
    pub async fn clear(&self, chat_id: &str, channel: ChatChannel) -> Result<()> {
        self.write(chat_id, channel, &[]).await?;
        info!(chat_id, channel = channel.column(), "Cleared chat history");
        Ok(())
    }

    pub async fn delete_document(&self, chat_id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM chat_history WHERE id = ?")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("chat history {}", chat_id)));
        }
        Ok(())
    }

    async fn write(
        &self,
        chat_id: &str,
        channel: ChatChannel,
        log: &[ChatExchange],
    ) -> Result<()> {
        let json = serde_json::to_string(log)
            .map_err(|e| Error::Internal(format!("serialize failed: {}", e)))?;
        let sql = format!("UPDATE chat_history SET {} = ? WHERE id = ?", channel.column());
        let updated = sqlx::query(&sql)
            .bind(json)
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("chat history {}", chat_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_common::db::connect_memory;

    async fn setup() -> (ChatHistoryStore, String) {
        let pool = connect_memory().await.unwrap();
        let store = ChatHistoryStore::new(pool);
        let id = store.create().await.unwrap();
        (store, id)
    }

    fn exchange(user: &str, assistant: &str) -> ChatExchange {
        ChatExchange {
            user: user.to_string(),
            assistant: assistant.to_string(),
            source_topic_ids: None,
        }
    }

    #[tokio::test]
    async fn append_preserves_order_per_channel() {
        let (store, id) = setup().await;
        store.append(&id, ChatChannel::Document, &exchange("q1", "a1")).await.unwrap();
        store.append(&id, ChatChannel::Document, &exchange("q2", "a2")).await.unwrap();
        store.append(&id, ChatChannel::Web, &exchange("w1", "wa1")).await.unwrap();

        let doc = store.read(&id, ChatChannel::Document).await.unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(doc[0].user, "q1");
        assert_eq!(doc[1].user, "q2");
        assert_eq!(store.read(&id, ChatChannel::Web).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn clear_is_per_channel() {
        let (store, id) = setup().await;
        store.append(&id, ChatChannel::Document, &exchange("q", "a")).await.unwrap();
        store.append(&id, ChatChannel::Web, &exchange("w", "wa")).await.unwrap();

        store.clear(&id, ChatChannel::Document).await.unwrap();
        assert!(store.read(&id, ChatChannel::Document).await.unwrap().is_empty());
        assert_eq!(store.read(&id, ChatChannel::Web).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing() {
        let (store, id) = setup().await;

        // Two answers finishing at the same time must both land
        for i in 0..10 {
            let first_exchange = exchange(&format!("a{}", i), "x");
            let second_exchange = exchange(&format!("b{}", i), "y");
            let first = store.append(&id, ChatChannel::Document, &first_exchange);
            let second = store.append(&id, ChatChannel::Document, &second_exchange);
            let (first, second) = tokio::join!(first, second);
            first.unwrap();
            second.unwrap();
        }

        let log = store.read(&id, ChatChannel::Document).await.unwrap();
        assert_eq!(log.len(), 20);
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let (store, _) = setup().await;
        assert!(matches!(
            store.read("missing", ChatChannel::Web).await,
            Err(Error::NotFound(_))
        ));
    }
}
