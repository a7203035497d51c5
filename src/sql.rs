//! Natural-language question to SQL generation.
//!
//! The generator embeds the schema description and a fixed rule set in the
//! prompt, then strips markdown fences from the model's answer. The SQL is
//! returned as text; it is neither parsed nor validated here.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::dialect::Dialect;
use crate::llm::{LlmClient, LlmError};
use crate::schema::SchemaDescription;

/// Question answered by the worked example in the prompt.
pub const EXAMPLE_QUESTION: &str = "How many meters processed for Asda last year?";

/// Words that suggest the user wants a chart rather than (or as well as) rows.
const VISUALIZATION_KEYWORDS: [&str; 8] = [
    "chart",
    "plot",
    "graph",
    "visual",
    "visualize",
    "bar",
    "pie",
    "line",
];

/// A question and the SQL generated for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedQuery {
    pub question: String,
    pub sql: String,
}

/// Schema-aware SQL generator for one dialect.
#[derive(Clone)]
pub struct SqlGenerator {
    llm: Arc<dyn LlmClient>,
    schema: SchemaDescription,
    dialect: Dialect,
    history: Arc<Mutex<Vec<GeneratedQuery>>>,
}

impl SqlGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, schema: SchemaDescription, dialect: Dialect) -> Self {
        Self {
            llm,
            schema,
            dialect,
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Generate a cleaned SQL string for `question`. Model errors propagate.
    pub async fn generate_sql(&self, question: &str) -> Result<String, LlmError> {
        let system = format!(
            "You are an expert {} query generator.",
            self.dialect.display_name()
        );
        let prompt = build_prompt(&self.schema, self.dialect, question);
        let completion = self.llm.complete(&system, &prompt).await?;
        let sql = clean_sql(&completion.text);
        debug!(%sql, "generated SQL");

        self.remember(question, &sql);
        Ok(sql)
    }

    /// Every question/SQL pair generated so far, oldest first.
    pub fn history(&self) -> Vec<GeneratedQuery> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn remember(&self, question: &str, sql: &str) {
        if let Ok(mut history) = self.history.lock() {
            history.push(GeneratedQuery {
                question: question.to_string(),
                sql: sql.to_string(),
            });
        }
    }
}

/// SQL answering [`EXAMPLE_QUESTION`] against a `PROCESSING` table.
pub fn worked_example_sql(dialect: Dialect) -> String {
    format!(
        "SELECT SUM(METER) AS TotalMetersProcessed\n\
         FROM PROCESSING\n\
         WHERE UPPER(CUSTOMER) LIKE UPPER('%ASDA%')\n\
         AND PROCESSINGDATE >= {};",
        dialect.one_year_ago()
    )
}

fn build_prompt(schema: &SchemaDescription, dialect: Dialect, question: &str) -> String {
    let name = dialect.display_name();
    let row_limit = dialect.row_limit();
    let foreign = dialect.foreign_row_limits();
    let one_year_ago = dialect.one_year_ago();
    let example = worked_example_sql(dialect);

    format!(
        r#"Database schema:
{schema}

Instructions:
1. Generate a correct {name} query based on the user's question.
2. Use only existing tables and columns.
3. NEVER use destructive commands (DELETE, DROP, ALTER, TRUNCATE).
4. Do NOT use {foreign} or any other syntax {name} does not support.
5. Only include {row_limit} if the user explicitly asks for a number of rows (e.g., 'top 5').
6. Return ONLY the SQL query, fully executable on {name}.
7. Do NOT include any markdown formatting like ```sql or ```.
8. If user says "last year" or "in the past 12 months", treat them as the same time range:
PROCESSINGDATE >= {one_year_ago}

Example 1:
User Question: {EXAMPLE_QUESTION}
SQL: {example}


User Question: {question}
SQL Query:
"#
    )
}

/// Strip a leading and trailing code fence from model output, then trim.
///
/// The opening fence may carry a language tag (```` ```sql ````). Clean SQL
/// passes through unchanged apart from trimming.
pub fn clean_sql(raw: &str) -> String {
    let mut sql = raw.trim();

    if let Some(rest) = sql.strip_prefix("```") {
        sql = strip_fence_tag(rest);
    }
    if let Some(rest) = sql.strip_suffix("```") {
        sql = rest;
    }

    sql.trim().to_string()
}

/// Drop a language tag right after an opening fence.
///
/// A tag is one alphanumeric word ending the fence line, or `sql` in any case.
fn strip_fence_tag(rest: &str) -> &str {
    let word_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .unwrap_or(rest.len());
    let (word, after) = rest.split_at(word_end);

    if word.is_empty() {
        return rest;
    }

    let ends_line = after.is_empty() || after.starts_with('\n') || after.starts_with("\r\n");
    let sql_tag = word.eq_ignore_ascii_case("sql") && after.starts_with(char::is_whitespace);

    if ends_line || sql_tag { after } else { rest }
}

/// Whether a question asks for a chart, plot or similar.
pub fn wants_visualization(question: &str) -> bool {
    let question = question.to_lowercase();
    VISUALIZATION_KEYWORDS.iter().any(|k| question.contains(k))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{QueryExecutor, QueryOutcome};
    use crate::llm::MockLlmClient;
    use crate::tabular::Cell;

    // --- clean_sql ---

    #[test]
    fn test_clean_sql_tagged_fence() {
        assert_eq!(clean_sql("```sql\nSELECT 1;\n```"), "SELECT 1;");
    }

    #[test]
    fn test_clean_sql_bare_fence() {
        assert_eq!(clean_sql("```\nSELECT 1;\n```"), "SELECT 1;");
    }

    #[test]
    fn test_clean_sql_other_tag() {
        assert_eq!(clean_sql("```tsql\nSELECT 1\n```"), "SELECT 1");
    }

    #[test]
    fn test_clean_sql_sql_tag_same_line() {
        assert_eq!(clean_sql("```sql SELECT 1```"), "SELECT 1");
    }

    #[test]
    fn test_clean_sql_fence_without_tag_keeps_statement() {
        assert_eq!(clean_sql("```SELECT a FROM t```"), "SELECT a FROM t");
    }

    #[test]
    fn test_clean_sql_trims_whitespace() {
        assert_eq!(clean_sql("  \n SELECT * FROM t \n"), "SELECT * FROM t");
    }

    #[test]
    fn test_clean_sql_idempotent() {
        let inputs = [
            "SELECT 1",
            "```sql\nSELECT SUM(METER) FROM PROCESSING\n```",
            "```\nSELECT 'a```b'\n```",
            "SELECT name FROM items WHERE note = 'sql'",
        ];
        for input in inputs {
            let once = clean_sql(input);
            assert_eq!(clean_sql(&once), once, "input: {input:?}");
        }
    }

    // --- wants_visualization ---

    #[test]
    fn test_wants_visualization() {
        assert!(wants_visualization("Plot sales by month"));
        assert!(wants_visualization("show me a PIE of customers"));
        assert!(!wants_visualization("How many meters for Asda?"));
    }

    // --- generate_sql ---

    #[tokio::test]
    async fn test_generate_sql_cleans_and_remembers() {
        let mock = Arc::new(MockLlmClient::new(vec![
            "```sql\nSELECT SUM(UNITS) FROM SALES\n```".into(),
        ]));
        let generator = SqlGenerator::new(
            mock.clone(),
            SchemaDescription::from_text("Table: SALES"),
            Dialect::Sqlite,
        );

        let sql = generator
            .generate_sql("How many units were sold?")
            .await
            .unwrap();

        assert_eq!(sql, "SELECT SUM(UNITS) FROM SALES");
        assert_eq!(
            generator.history(),
            vec![GeneratedQuery {
                question: "How many units were sold?".into(),
                sql: "SELECT SUM(UNITS) FROM SALES".into(),
            }]
        );

        let prompt = mock.user_prompt(0);
        assert!(prompt.contains("Table: SALES"));
        assert!(prompt.contains("NEVER use destructive commands"));
        assert!(prompt.contains("PROCESSINGDATE >= DATE('now', '-1 year')"));
        assert!(prompt.contains("Only include LIMIT N if the user explicitly asks"));
        assert!(!prompt.contains("GETDATE"));
        assert!(mock.calls.lock().unwrap()[0].0.contains("SQLite"));
        assert!(prompt.ends_with("User Question: How many units were sold?\nSQL Query:\n"));
    }

    #[tokio::test]
    async fn test_prompt_follows_dialect() {
        for (dialect, date_expr) in [
            (Dialect::Postgres, "CURRENT_DATE - INTERVAL '1 year'"),
            (Dialect::MySql, "DATE_SUB(CURDATE(), INTERVAL 1 YEAR)"),
        ] {
            let mock = Arc::new(MockLlmClient::new(vec!["SELECT 1".into()]));
            let generator =
                SqlGenerator::new(mock.clone(), SchemaDescription::from_text("T"), dialect);
            generator.generate_sql("q").await.unwrap();

            let prompt = mock.user_prompt(0);
            assert!(prompt.contains(&format!("PROCESSINGDATE >= {date_expr};")));
            assert!(prompt.contains(dialect.display_name()));
            assert!(prompt.contains("Do NOT use TOP N"));
        }
    }

    // --- worked example against a real database ---

    async fn seed_processing(executor: &QueryExecutor, date_type: &str) {
        executor.run("DROP TABLE IF EXISTS PROCESSING").await;
        let created = executor
            .run(&format!(
                "CREATE TABLE PROCESSING (METER BIGINT, CUSTOMER VARCHAR(64), PROCESSINGDATE {date_type})"
            ))
            .await;
        assert!(!created.is_failed(), "{created:?}");
    }

    async fn assert_example_sums(executor: &QueryExecutor, dialect: Dialect) {
        let outcome = executor.run(&worked_example_sql(dialect)).await;
        let QueryOutcome::Rows(table) = outcome else {
            panic!("worked example failed on {dialect}: {outcome:?}");
        };
        // Postgres folds the unquoted alias to lower case.
        assert!(table.column_names()[0].eq_ignore_ascii_case("TotalMetersProcessed"));
        assert_eq!(table.columns[0].cells, vec![Cell::Int(5)]);

        let limited = executor.run("SELECT METER FROM PROCESSING LIMIT 5").await;
        assert!(matches!(limited, QueryOutcome::Rows(_)), "{limited:?}");
    }

    #[tokio::test]
    async fn test_worked_example_runs_on_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("p.db").display());
        let executor = QueryExecutor::new(url);

        seed_processing(&executor, "TEXT").await;
        executor
            .run(
                "INSERT INTO PROCESSING VALUES \
                 (5, 'Asda Stores', DATE('now')), \
                 (9, 'Asda Stores', DATE('now', '-2 years')), \
                 (7, 'Tesco', DATE('now'))",
            )
            .await;

        assert_example_sums(&executor, Dialect::Sqlite).await;
    }

    /// Runs when `ASKDB_TEST_POSTGRES_URL` points at a scratch database.
    #[tokio::test]
    async fn test_worked_example_runs_on_postgres() {
        let Ok(url) = std::env::var("ASKDB_TEST_POSTGRES_URL") else {
            return;
        };
        let executor = QueryExecutor::new(url);

        seed_processing(&executor, "DATE").await;
        executor
            .run(
                "INSERT INTO PROCESSING VALUES \
                 (5, 'Asda Stores', CURRENT_DATE), \
                 (9, 'Asda Stores', CURRENT_DATE - INTERVAL '2 years'), \
                 (7, 'Tesco', CURRENT_DATE)",
            )
            .await;

        assert_example_sums(&executor, Dialect::Postgres).await;
    }

    /// Runs when `ASKDB_TEST_MYSQL_URL` points at a scratch database.
    #[tokio::test]
    async fn test_worked_example_runs_on_mysql() {
        let Ok(url) = std::env::var("ASKDB_TEST_MYSQL_URL") else {
            return;
        };
        let executor = QueryExecutor::new(url);

        seed_processing(&executor, "DATE").await;
        executor
            .run(
                "INSERT INTO PROCESSING VALUES \
                 (5, 'Asda Stores', CURDATE()), \
                 (9, 'Asda Stores', DATE_SUB(CURDATE(), INTERVAL 2 YEAR)), \
                 (7, 'Tesco', CURDATE())",
            )
            .await;

        assert_example_sums(&executor, Dialect::MySql).await;
    }
}
