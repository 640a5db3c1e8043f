//! Request/response payload types
//!
//! Every payload is JSON with camelCase keys, matching the contract the
//! meeting frontend already uses.

use crate::db::models::{ChatChannel, GlossaryEntry, MeetingDetails};
use serde::{Deserialize, Serialize};

/// Response to `POST /create`: the freshly created document pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResponse {
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
    #[serde(rename = "chatHistoryID")]
    pub chat_history_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgendaUpdateRequest {
    pub agenda: Vec<String>,
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingUpdateRequest {
    pub data: MeetingDetails,
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
}

/// Submit an edited topic block for synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMinutesRequest {
    #[serde(rename = "topicID")]
    pub topic_id: String,
    #[serde(rename = "topicTitle", default)]
    pub topic_title: Option<String>,
    /// Edited topic body, one bullet point per line
    pub minutes: String,
    /// Abbreviation token awaiting expansion, if the editor flagged one
    #[serde(default)]
    pub abbreviation: Option<String>,
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
    #[serde(rename = "chatHistoryID")]
    pub chat_history_id: String,
}

/// Combined verdict for one synchronization cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackMinutesResponse {
    /// Last sentence coherent with the rest of the topic
    pub topic: bool,
    /// Topic body relevant to the meeting agenda
    pub agenda: bool,
    /// Suggested expansion for the flagged abbreviation
    pub abbreviation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDeleteRequest {
    #[serde(rename = "topicID")]
    pub topic_id: String,
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
}

/// Glossary maintenance action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlossaryAction {
    New,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryUpdateRequest {
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
    pub abbreviation: String,
    pub meaning: String,
    pub action: GlossaryAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlossaryResponse {
    pub glossary: Vec<GlossaryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatClearRequest {
    #[serde(rename = "chatHistoryID")]
    pub chat_history_id: String,
    pub channel: ChatChannel,
}

/// Chat history read response: each channel as ordered role/text pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub document: Vec<[String; 2]>,
    pub web: Vec<[String; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentQueryRequest {
    pub question: String,
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
    #[serde(rename = "chatHistoryID")]
    pub chat_history_id: String,
    /// Nearest-neighbour count; service default when absent
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebQueryRequest {
    pub question: String,
    #[serde(rename = "chatHistoryID")]
    pub chat_history_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebQueryResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummariseRequest {
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
    #[serde(rename = "topicID")]
    pub topic_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummariseResponse {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDeleteRequest {
    #[serde(rename = "minutesID")]
    pub minutes_id: String,
    #[serde(rename = "chatHistoryID")]
    pub chat_history_id: String,
}

/// Generic status payload for simple acknowledgements and errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self { status: "ok".to_string() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { status: message.into() }
    }
}

/// Response header carrying the grounding source topic ids of a streamed
/// document answer (comma-separated).
pub const SOURCE_TOPICS_HEADER: &str = "x-source-topics";
