//! # scribe-svc
//!
//! Meeting-minutes synchronization and retrieval service.
//!
//! An inbound topic edit is diffed into per-sentence instructions, queued
//! through the single-worker scheduler, and fanned out to concurrent
//! classification calls plus a structural store mutation. Questions about
//! the transcript run through the retrieval pipeline: rewrite, similarity
//! search, grounded prompt, streamed answer, transactional persistence.

pub mod api;
pub mod diff;
pub mod gateway;
pub mod qna;
pub mod queue;
pub mod state;
pub mod store;
pub mod summary;
pub mod testing;
pub mod tracker;
pub mod vector;
