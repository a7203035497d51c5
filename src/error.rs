//! Error types for the long-term chat memory.

use std::fmt;

/// Errors returned by memory store operations.
#[derive(Debug)]
pub enum MemoryError {
    /// The embedding service failed or returned something unusable.
    Embedding(String),
    /// Reading or writing the persisted store failed.
    Storage(String),
    /// Internal error during operation.
    Internal(String),
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Embedding(msg) => write!(f, "Embedding error: {msg}"),
            Self::Storage(msg) => write!(f, "Storage error: {msg}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for MemoryError {}
