//! Conversational replies backed by long-term memory.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::error::MemoryError;
use crate::llm::{LlmClient, LlmError};
use crate::memory::MemoryStore;

/// Reply returned when the user clears the memory.
pub const MEMORY_CLEARED: &str = "Chat memory cleared.";

/// How many remembered fragments are pulled into each prompt.
pub const MEMORY_CONTEXT_SIZE: usize = 5;

const RESET_COMMANDS: [&str; 2] = ["reset", "clear memory"];

const CHAT_SYSTEM_PROMPT: &str = "You are a friendly assistant with memory.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}

/// Whether `input` asks to wipe the memory. Case-insensitive, exact match.
pub fn is_reset_command(input: &str) -> bool {
    let input = input.to_lowercase();
    RESET_COMMANDS.contains(&input.as_str())
}

/// Memory-augmented chat.
#[derive(Clone)]
pub struct ChatResponder {
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn MemoryStore>,
}

impl ChatResponder {
    pub fn new(llm: Arc<dyn LlmClient>, memory: Arc<dyn MemoryStore>) -> Self {
        Self { llm, memory }
    }

    /// Reply to `input`, remembering both sides of the exchange.
    ///
    /// `reset` / `clear memory` wipe the memory instead and make no model call.
    pub async fn respond(&self, input: &str) -> Result<String, ChatError> {
        if is_reset_command(input) {
            self.reset_memory().await;
            return Ok(MEMORY_CLEARED.to_string());
        }

        let fragments = self
            .memory
            .similarity_search(input, MEMORY_CONTEXT_SIZE)
            .await?;
        let context = fragments
            .iter()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let prompt = build_prompt(&context, input);
        let reply = self.llm.complete(CHAT_SYSTEM_PROMPT, &prompt).await?.text;

        self.memory
            .add_texts(&[input.to_string(), reply.clone()])
            .await?;

        Ok(reply)
    }

    /// Clear the memory store. Failures are logged; the store ends up empty
    /// either way.
    pub async fn reset_memory(&self) {
        if let Err(e) = self.memory.clear().await {
            warn!("Error resetting memory: {e}");
        }
        info!("Chat memory reset.");
    }
}

fn build_prompt(context: &str, input: &str) -> String {
    format!(
        "Memory context:\n{context}\n\nUser said: {input}\nRespond naturally and conversationally.\n"
    )
}
