//! The orchestrator: routes each user turn by intent and logs the exchange.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::chat::{ChatError, ChatResponder};
use crate::config::{Config, ConfigError};
use crate::corrector::QuestionCorrector;
use crate::executor::QueryExecutor;
use crate::formatter::{FormatError, FormatInput, ResultFormatter};
use crate::intent::{Intent, IntentClassifier};
use crate::llm::{LlmClient, LlmError, OpenAiClient};
use crate::memory::{MemoryStore, OpenAiEmbedder, VectorMemory};
use crate::schema::SchemaDescription;
use crate::sql::SqlGenerator;
use crate::tabular::TabularResult;

/// Reply for chart requests, which have no rendering path yet.
pub const CHARTS_UNSUPPORTED: &str =
    "Charts and visualizations are not supported yet. Ask for the underlying data and I can summarize it.";

const CHAT_TEMPERATURE: f32 = 0.7;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

// ============================================================================
// Exchange Log
// ============================================================================

/// One handled user turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exchange {
    pub user_input: String,
    pub intent: Intent,
    pub response: String,
}

// ============================================================================
// Agent
// ============================================================================

/// Sequences the components for each turn and keeps the exchange log.
pub struct Agent {
    classifier: IntentClassifier,
    corrector: QuestionCorrector,
    generator: SqlGenerator,
    executor: QueryExecutor,
    formatter: ResultFormatter,
    chat: ChatResponder,
    history: Vec<Exchange>,
}

impl Agent {
    pub fn new(
        classifier: IntentClassifier,
        corrector: QuestionCorrector,
        generator: SqlGenerator,
        executor: QueryExecutor,
        formatter: ResultFormatter,
        chat: ChatResponder,
    ) -> Self {
        Self {
            classifier,
            corrector,
            generator,
            executor,
            formatter,
            chat,
            history: Vec::new(),
        }
    }

    /// Wire every component from `config`. Needs the API key, a supported
    /// database URL and the schema description.
    pub fn from_config(config: &Config) -> Result<Self, BoxError> {
        let query_llm = query_llm(config)?;
        let schema = SchemaDescription::load(&config.schema_path)?;
        let executor = executor_from_config(config)?;

        Ok(Self::new(
            IntentClassifier::new(query_llm.clone()),
            QuestionCorrector::new(query_llm.clone(), schema.clone()),
            SqlGenerator::new(query_llm, schema, config.dialect()?),
            executor,
            formatter_from_config(config)?,
            chat_responder_from_config(config)?,
        ))
    }

    /// Handle one user turn and return the reply.
    ///
    /// The exchange is logged only when a reply was produced.
    pub async fn handle(&mut self, input: &str) -> Result<String, AgentError> {
        let intent = self.classifier.detect_intent(input).await;
        info!(%intent, "routing input");

        let response = match intent {
            Intent::Query => self.answer_query(input).await?,
            Intent::QueryVisual => {
                let summary = self.answer_query(input).await?;
                format!("{summary}\n\n{CHARTS_UNSUPPORTED}")
            }
            Intent::Visual => CHARTS_UNSUPPORTED.to_string(),
            Intent::Chat => self.chat.respond(input).await?,
        };

        self.history.push(Exchange {
            user_input: input.to_string(),
            intent,
            response: response.clone(),
        });

        Ok(response)
    }

    /// Correct → generate SQL → execute → format → summarize.
    async fn answer_query(&self, input: &str) -> Result<String, AgentError> {
        let corrected = self.corrector.correct(input).await?;
        let sql = self.generator.generate_sql(&corrected).await?;

        let outcome = self.executor.run(&sql).await;
        let failed = outcome.is_failed();

        let (path, table) = self
            .formatter
            .format(FormatInput::Table(outcome.into_table()))
            .await?;
        info!(path = %path.display(), rows = table.num_rows(), "formatted query result");

        let prompt = summary_prompt(input, &corrected, &table, failed);
        Ok(self.chat.respond(&prompt).await?)
    }

    /// Every exchange handled so far, oldest first.
    pub fn history(&self) -> &[Exchange] {
        &self.history
    }

    pub fn generator(&self) -> &SqlGenerator {
        &self.generator
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub fn formatter(&self) -> &ResultFormatter {
        &self.formatter
    }

    pub fn chat(&self) -> &ChatResponder {
        &self.chat
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn query_llm(config: &Config) -> Result<Arc<dyn LlmClient>, ConfigError> {
    Ok(Arc::new(
        OpenAiClient::new(config.require_api_key()?.to_string()).with_model(&config.query_model),
    ))
}

/// Chat responder over the persisted memory. Needs only the API key.
pub fn chat_responder_from_config(config: &Config) -> Result<ChatResponder, BoxError> {
    let api_key = config.require_api_key()?;
    let chat_llm: Arc<dyn LlmClient> = Arc::new(
        OpenAiClient::new(api_key.to_string())
            .with_model(&config.chat_model)
            .with_temperature(CHAT_TEMPERATURE),
    );

    let embedder = Arc::new(OpenAiEmbedder::new(api_key.to_string()));
    let memory: Arc<dyn MemoryStore> = Arc::new(VectorMemory::open(&config.memory_dir, embedder)?);

    Ok(ChatResponder::new(chat_llm, memory))
}

/// SQL generator for the configured dialect. Needs the API key, the schema
/// description and either a database URL or `ASKDB_SQL_DIALECT`.
pub fn sql_generator_from_config(config: &Config) -> Result<SqlGenerator, BoxError> {
    let dialect = config.dialect()?;
    let schema = SchemaDescription::load(&config.schema_path)?;
    Ok(SqlGenerator::new(query_llm(config)?, schema, dialect))
}

/// Executor for the configured database URL.
pub fn executor_from_config(config: &Config) -> Result<QueryExecutor, ConfigError> {
    config.dialect()?;
    Ok(QueryExecutor::new(config.require_database_url()?))
}

/// Formatter writing to the configured output path. Needs only the API key.
pub fn formatter_from_config(config: &Config) -> Result<ResultFormatter, ConfigError> {
    Ok(ResultFormatter::new(query_llm(config)?, config.output_path.clone()))
}

fn summary_prompt(input: &str, corrected: &str, table: &TabularResult, failed: bool) -> String {
    let result = if failed {
        "The query could not be run against the database, so there is no result. \
         Tell the user plainly that the data could not be retrieved."
            .to_string()
    } else {
        format!("Here is the formatted query result:\n{}", table.render())
    };

    format!(
        "User asked: {input}\n\
         Corrected question: {corrected}\n\
         {result}\n\
         Summarize and explain the results clearly. \
         Assume you already know the data. Do not say things like 'based on the data provided.' \
         Speak as if you are fully aware of the data and explain it directly to the user."
    )
}

// ============================================================================
// Tests
// ============================================================================
