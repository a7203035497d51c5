//! Grammar and clarity correction for user questions.

use std::sync::Arc;

use crate::llm::{LlmClient, LlmError};
use crate::schema::SchemaDescription;

const CORRECTOR_SYSTEM_PROMPT: &str = "You are a question corrector for a database system.";

/// Rewrites a question for a SQL agent without changing what it asks.
#[derive(Clone)]
pub struct QuestionCorrector {
    llm: Arc<dyn LlmClient>,
    schema: SchemaDescription,
}

impl QuestionCorrector {
    pub fn new(llm: Arc<dyn LlmClient>, schema: SchemaDescription) -> Self {
        Self { llm, schema }
    }

    /// Return the model's corrected question verbatim. Model errors propagate.
    pub async fn correct(&self, question: &str) -> Result<String, LlmError> {
        let prompt = build_prompt(question, &self.schema);
        let completion = self.llm.complete(CORRECTOR_SYSTEM_PROMPT, &prompt).await?;
        Ok(completion.text)
    }
}

fn build_prompt(question: &str, schema: &SchemaDescription) -> String {
    format!(
        "User Question: {question}\n\n\
         Database Schema: {schema}\n\n\
         Instructions:\n\
         - Correct any grammar, spelling, and clarity issues.\n\
         - Keep the meaning exactly the same. Do not add or remove intent.\n\
         - Make the question ready for understanding by a SQL agent.\n\n\
         Corrected Question:\n"
    )
}
