//! # Scribe Common Library
//!
//! Shared code for the scribe minutes service:
//! - Error type used across the workspace
//! - Configuration loading
//! - SQLite document-store initialization and schema
//! - API request/response types shared with clients

pub mod api;
pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
