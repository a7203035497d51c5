//! askdb — natural-language-to-SQL assistant.
//!
//! Shared library for the HTTP service and the CLI. A user turn flows
//! through [`agent::Agent`]: intent detection, then either the query
//! pipeline (correct → generate SQL → execute → format → summarize) or a
//! memory-backed chat reply.

pub mod agent;
pub mod chat;
pub mod config;
pub mod corrector;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod formatter;
pub mod intent;
pub mod llm;
pub mod memory;
pub mod schema;
pub mod server;
pub mod sql;
pub mod tabular;

use std::path::PathBuf;

/// Name of the chat memory collection directory.
pub const MEMORY_COLLECTION: &str = "chat_memory";

/// Default location of the chat memory when `ASKDB_MEMORY_DIR` is unset.
pub fn default_memory_dir() -> PathBuf {
    let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("askdb").join(MEMORY_COLLECTION)
}
