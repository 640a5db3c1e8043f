//! Transcript (minutes) store
//!
//! One `minutes` row per meeting holding agenda, meeting details, and
//! glossary as JSON columns; one `topics` row per topic block with its
//! sentences as a JSON array. Instruction sets are applied by patching the
//! topic row in memory in positional order and writing it back in a single
//! UPDATE, so an edit cycle is never half-written within one topic.

use crate::diff::{ordered_ids, InstructionSet};
use scribe_common::api::types::GlossaryAction;
use scribe_common::db::models::{GlossaryEntry, MeetingDetails, Sentence, TopicBlock};
use scribe_common::{Error, Result};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("serialize failed: {}", e)))
}

#[derive(Clone)]
pub struct TranscriptStore {
    pool: SqlitePool,
}

impl TranscriptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an empty minutes document and return its id.
    pub async fn create(&self) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query("INSERT INTO minutes (id) VALUES (?)")
            .bind(&id)
            .execute(&self.pool)
            .await?;
        info!("Created minutes document {}", id);
        Ok(id)
    }

    pub async fn read_agenda(&self, minutes_id: &str) -> Result<Vec<String>> {
        let json = self.read_column(minutes_id, "agenda").await?;
        serde_json::from_str(&json).map_err(|e| Error::Internal(format!("corrupt agenda: {}", e)))
    }

    pub async fn set_agenda(&self, minutes_id: &str, agenda: &[String]) -> Result<()> {
        self.write_column(minutes_id, "agenda", &to_json(agenda)?).await
    }

    pub async fn read_meeting_details(&self, minutes_id: &str) -> Result<MeetingDetails> {
        let json = self.read_column(minutes_id, "meeting_details").await?;
        serde_json::from_str(&json)
            .map_err(|e| Error::Internal(format!("corrupt meeting details: {}", e)))
    }

    pub async fn set_meeting_details(
        &self,
        minutes_id: &str,
        details: &MeetingDetails,
    ) -> Result<()> {
        self.write_column(minutes_id, "meeting_details", &to_json(details)?).await
    }

    /// Point read of one topic block, or None when the topic is unseen.
    pub async fn read_topic(&self, minutes_id: &str, topic_id: &str) -> Result<Option<TopicBlock>> {
        let row = sqlx::query_as::<_, (Option<String>, String)>(
            "SELECT topic_title, sentences FROM topics WHERE minutes_id = ? AND topic_id = ?",
        )
        .bind(minutes_id)
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((topic_title, sentences_json)) => {
                let sentences: Vec<Sentence> = serde_json::from_str(&sentences_json)
                    .map_err(|e| Error::Internal(format!("corrupt topic sentences: {}", e)))?;
                Ok(Some(TopicBlock {
                    topic_id: topic_id.to_string(),
                    topic_title,
                    sentences,
                }))
            }
            None => Ok(None),
        }
    }

    /// Apply one edit cycle's instruction set to a topic block.
    ///
    /// Tombstones remove, known identities are replaced in place, unknown
    /// identities append; a previously-unseen topic is created with all of
    /// its sentences in one write. Instructions are applied in positional
    /// order regardless of map iteration order.
    pub async fn apply_instructions(
        &self,
        minutes_id: &str,
        topic_id: &str,
        topic_title: Option<&str>,
        instructions: &InstructionSet,
    ) -> Result<()> {
        if instructions.is_empty() {
            return Ok(());
        }

        // Ensure the parent document exists before touching topics
        self.read_column(minutes_id, "id").await?;

        let existing = self.read_topic(minutes_id, topic_id).await?;
        let ids = ordered_ids(instructions.keys(), topic_id);

        match existing {
            None => {
                let sentences: Vec<Sentence> = ids
                    .iter()
                    .filter_map(|id| {
                        instructions.get(id).and_then(|op| op.as_ref()).map(|text| Sentence {
                            sentence_id: id.clone(),
                            text: text.clone(),
                        })
                    })
                    .collect();

                sqlx::query(
                    "INSERT INTO topics (minutes_id, topic_id, topic_title, sentences) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(minutes_id)
                .bind(topic_id)
                .bind(topic_title)
                .bind(to_json(&sentences)?)
                .execute(&self.pool)
                .await?;
                info!(topic_id, count = sentences.len(), "Created topic block");
            }
            Some(block) => {
                let mut sentences = block.sentences;
                for id in &ids {
                    match instructions.get(id).and_then(|op| op.clone()) {
                        None => sentences.retain(|s| &s.sentence_id != id),
                        Some(text) => {
                            match sentences.iter_mut().find(|s| &s.sentence_id == id) {
                                Some(sentence) => sentence.text = text,
                                None => sentences.push(Sentence {
                                    sentence_id: id.clone(),
                                    text,
                                }),
                            }
                        }
                    }
                }

                let updated = sqlx::query(
                    "UPDATE topics SET sentences = ? WHERE minutes_id = ? AND topic_id = ?",
                )
                .bind(to_json(&sentences)?)
                .bind(minutes_id)
                .bind(topic_id)
                .execute(&self.pool)
                .await?;
                if updated.rows_affected() == 0 {
                    return Err(Error::Internal(format!(
                        "topic {} vanished during instruction apply",
                        topic_id
                    )));
                }
                debug!(topic_id, applied = ids.len(), "Applied instruction set");
            }
        }

        Ok(())
    }

    /// Explicit topic delete; topics are never implicitly deleted.
    pub async fn delete_topic(&self, minutes_id: &str, topic_id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM topics WHERE minutes_id = ? AND topic_id = ?")
            .bind(minutes_id)
            .bind(topic_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("topic {}", topic_id)));
        }
        info!(topic_id, "Deleted topic block");
        Ok(())
    }

    pub async fn read_glossary(&self, minutes_id: &str) -> Result<Vec<GlossaryEntry>> {
        let json = self.read_column(minutes_id, "glossary").await?;
        serde_json::from_str(&json).map_err(|e| Error::Internal(format!("corrupt glossary: {}", e)))
    }

    pub async fn update_glossary(
        &self,
        minutes_id: &str,
        abbreviation: &str,
        meaning: &str,
        action: GlossaryAction,
    ) -> Result<()> {
        let mut glossary = self.read_glossary(minutes_id).await?;
        match action {
            GlossaryAction::New => glossary.push(GlossaryEntry {
                abbreviation: abbreviation.to_string(),
                meaning: meaning.to_string(),
            }),
            GlossaryAction::Update => {
                let entry = glossary
                    .iter_mut()
                    .find(|e| e.abbreviation == abbreviation)
                    .ok_or_else(|| Error::NotFound(format!("glossary entry {}", abbreviation)))?;
                entry.meaning = meaning.to_string();
            }
            GlossaryAction::Delete => {
                glossary.retain(|e| !(e.abbreviation == abbreviation && e.meaning == meaning));
            }
        }
        self.write_column(minutes_id, "glossary", &to_json(&glossary)?).await
    }

    /// Whole-document delete; cascades to the document's topic rows.
    pub async fn delete_document(&self, minutes_id: &str) -> Result<()> {
        let deleted = sqlx::query("DELETE FROM minutes WHERE id = ?")
            .bind(minutes_id)
            .execute(&self.pool)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(Error::NotFound(format!("minutes document {}", minutes_id)));
        }
        info!("Deleted minutes document {}", minutes_id);
        Ok(())
    }

    async fn read_column(&self, minutes_id: &str, column: &str) -> Result<String> {
        // `column` is always a compile-time literal from this module
        let sql = format!("SELECT {} FROM minutes WHERE id = ?", column);
        let row = sqlx::query_as::<_, (String,)>(&sql)
            .bind(minutes_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(value,)| value)
            .ok_or_else(|| Error::NotFound(format!("minutes document {}", minutes_id)))
    }

    async fn write_column(&self, minutes_id: &str, column: &str, value: &str) -> Result<()> {
        let sql = format!("UPDATE minutes SET {} = ? WHERE id = ?", column);
        let updated = sqlx::query(&sql)
            .bind(value)
            .bind(minutes_id)
            .execute(&self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("minutes document {}", minutes_id)));
        }
        Ok(())
    }
}
