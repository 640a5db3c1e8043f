//! Shared application context passed to all handlers

use crate::qna::QueryPipeline;
use crate::queue::Scheduler;
use crate::store::{ChatHistoryStore, TranscriptStore};
use crate::vector::VectorIndex;
use std::sync::Arc;

/// Cloning is cheap; everything inside is a handle.
#[derive(Clone)]
pub struct AppContext {
    pub scheduler: Arc<Scheduler>,
    pub transcript: TranscriptStore,
    pub history: ChatHistoryStore,
    pub qna: Arc<QueryPipeline>,
    pub vector: Option<Arc<dyn VectorIndex>>,
}
