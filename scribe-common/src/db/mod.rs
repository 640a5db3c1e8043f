//! SQLite document store
//!
//! The minutes and chat-history documents live in three tables with JSON
//! columns, keeping the document shape of the upstream stores while using
//! SQLite for durability.

mod init;
pub mod models;

pub use init::{connect_memory, init_database};
