//! Document models
//!
//! Field names serialize in camelCase to match the wire contract the
//! frontend already speaks (`sentenceID`, `topicTitle`, ...).

use serde::{Deserialize, Serialize};

/// One bullet point of a topic block.
///
/// Identity is positional: `sentence_id` is the topic id followed by the
/// decimal line index. Editing text keeps identity; inserting or removing a
/// line shifts the identity of every following sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sentence {
    #[serde(rename = "sentenceID")]
    pub sentence_id: String,
    #[serde(rename = "sentenceText")]
    pub text: String,
}

/// A titled section of meeting minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicBlock {
    #[serde(rename = "topicID")]
    pub topic_id: String,
    #[serde(rename = "topicTitle")]
    pub topic_title: Option<String>,
    pub sentences: Vec<Sentence>,
}

/// Meeting header data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingDetails {
    #[serde(default)]
    pub date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub attendees: Vec<String>,
}

/// One glossary entry: an abbreviation and its expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryEntry {
    pub abbreviation: String,
    pub meaning: String,
}

/// One completed question/answer exchange. Append-only; never mutated
/// after creation, only bulk-cleared with the rest of its channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatExchange {
    pub user: String,
    pub assistant: String,
    #[serde(rename = "sourceTopicIDs", skip_serializing_if = "Option::is_none", default)]
    pub source_topic_ids: Option<Vec<String>>,
}

/// Chat-history channel. A closed enum: an unknown channel name cannot be
/// expressed past request deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatChannel {
    Document,
    Web,
}

impl ChatChannel {
    /// SQL column holding this channel's log.
    pub fn column(self) -> &'static str {
        match self {
            ChatChannel::Document => "document",
            ChatChannel::Web => "web",
        }
    }
}
