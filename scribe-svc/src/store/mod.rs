//! Document stores
//!
//! Two stores over the shared SQLite pool: the transcript (minutes)
//! document and the append-only chat-history document. When the queue
//! scheduler is active it is the sole mutation path for the transcript,
//! so the stores themselves take no additional locking.

mod history;
mod transcript;

pub use history::ChatHistoryStore;
pub use transcript::TranscriptStore;
