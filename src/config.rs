//! Process configuration, read once from the environment at start-up.
//!
//! Credentials and the database URL are only demanded by the components that
//! use them, so CLI commands that never touch the database run without one.

use std::path::PathBuf;

use thiserror::Error;

use crate::dialect::Dialect;
use crate::formatter::DEFAULT_OUTPUT_PATH;
use crate::llm::DEFAULT_MODEL;

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default schema description file, relative to the working directory.
pub const DEFAULT_SCHEMA_PATH: &str = "schema.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),

    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Everything the assistant needs to wire its components.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai_api_key: Option<String>,
    pub database_url: Option<String>,
    pub sql_dialect: Option<Dialect>,
    pub schema_path: PathBuf,
    pub output_path: PathBuf,
    pub memory_dir: PathBuf,
    pub chat_model: String,
    pub query_model: String,
    pub port: u16,
}

impl Config {
    /// Build from process environment variables.
    ///
    /// | variable | default |
    /// |---|---|
    /// | `OPENAI_API_KEY` | required by model-backed components |
    /// | `ASKDB_DATABASE_URL`, then `DATABASE_URL` | required by the executor |
    /// | `ASKDB_SQL_DIALECT` | inferred from the database URL |
    /// | `ASKDB_SCHEMA_PATH` | `schema.csv` |
    /// | `ASKDB_OUTPUT_PATH` | `formatted_output.csv` |
    /// | `ASKDB_MEMORY_DIR` | `<data_local_dir>/askdb/chat_memory` |
    /// | `ASKDB_CHAT_MODEL`, `ASKDB_QUERY_MODEL` | `gpt-4o-mini` |
    /// | `PORT` | `8000` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    ///
    /// Only malformed values fail here; missing required values surface from
    /// the `require_*` accessors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name: "PORT", value })?,
            None => DEFAULT_PORT,
        };

        let sql_dialect = match var("ASKDB_SQL_DIALECT") {
            Some(value) => Some(value.parse().map_err(|_| ConfigError::InvalidValue {
                name: "ASKDB_SQL_DIALECT",
                value,
            })?),
            None => None,
        };

        Ok(Self {
            openai_api_key: var("OPENAI_API_KEY"),
            database_url: var("ASKDB_DATABASE_URL").or_else(|| var("DATABASE_URL")),
            sql_dialect,
            schema_path: var("ASKDB_SCHEMA_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH)),
            output_path: var("ASKDB_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_PATH)),
            memory_dir: var("ASKDB_MEMORY_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(crate::default_memory_dir),
            chat_model: var("ASKDB_CHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            query_model: var("ASKDB_QUERY_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            port,
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.openai_api_key
            .as_deref()
            .ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::MissingVar("ASKDB_DATABASE_URL"))
    }

    /// The dialect SQL is generated for.
    ///
    /// With a database URL the dialect follows its scheme, and an explicit
    /// `ASKDB_SQL_DIALECT` must agree with it. Without one, the explicit
    /// setting is used.
    pub fn dialect(&self) -> Result<Dialect, ConfigError> {
        let Some(url) = self.database_url.as_deref() else {
            return self
                .sql_dialect
                .ok_or(ConfigError::MissingVar("ASKDB_DATABASE_URL"));
        };

        let from_url = Dialect::from_url(url).ok_or_else(|| ConfigError::InvalidValue {
            name: "ASKDB_DATABASE_URL",
            value: url.split_once(':').map_or(url, |(scheme, _)| scheme).to_string(),
        })?;

        match self.sql_dialect {
            Some(explicit) if explicit != from_url => Err(ConfigError::InvalidValue {
                name: "ASKDB_SQL_DIALECT",
                value: format!("{explicit} (database URL is {from_url})"),
            }),
            _ => Ok(from_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("DATABASE_URL", "sqlite://db.sqlite"),
        ]))
        .unwrap();

        assert_eq!(config.require_database_url().unwrap(), "sqlite://db.sqlite");
        assert_eq!(config.dialect().unwrap(), Dialect::Sqlite);
        assert_eq!(config.schema_path, PathBuf::from("schema.csv"));
        assert_eq!(config.output_path, PathBuf::from("formatted_output.csv"));
        assert!(config.memory_dir.ends_with("askdb/chat_memory"));
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ASKDB_DATABASE_URL", "postgres://localhost/sales"),
            ("DATABASE_URL", "sqlite://ignored"),
            ("ASKDB_MEMORY_DIR", "/tmp/mem"),
            ("ASKDB_QUERY_MODEL", "gpt-4"),
            ("PORT", "9090"),
        ]))
        .unwrap();

        assert_eq!(config.require_database_url().unwrap(), "postgres://localhost/sales");
        assert_eq!(config.dialect().unwrap(), Dialect::Postgres);
        assert_eq!(config.memory_dir, PathBuf::from("/tmp/mem"));
        assert_eq!(config.query_model, "gpt-4");
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_missing_values_only_fail_when_required() {
        let config = Config::from_lookup(lookup(&[])).unwrap();

        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::MissingVar("OPENAI_API_KEY"))
        ));
        assert!(matches!(
            config.require_database_url(),
            Err(ConfigError::MissingVar("ASKDB_DATABASE_URL"))
        ));
        assert!(matches!(
            config.dialect(),
            Err(ConfigError::MissingVar("ASKDB_DATABASE_URL"))
        ));
    }

    #[test]
    fn test_dialect_without_database_url() {
        let config = Config::from_lookup(lookup(&[("ASKDB_SQL_DIALECT", "MySQL")])).unwrap();
        assert_eq!(config.dialect().unwrap(), Dialect::MySql);
    }

    #[test]
    fn test_dialect_must_match_database_url() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("ASKDB_SQL_DIALECT", "postgres"),
        ]))
        .unwrap();
        assert!(config.dialect().unwrap_err().to_string().contains("ASKDB_SQL_DIALECT"));
    }

    #[test]
    fn test_unsupported_database_scheme() {
        let config =
            Config::from_lookup(lookup(&[("DATABASE_URL", "mssql://sa:pw@host/db")])).unwrap();
        let err = config.dialect().unwrap_err().to_string();
        assert!(err.contains("mssql"));
        assert!(!err.contains("pw"));
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));

        let err = Config::from_lookup(lookup(&[("ASKDB_SQL_DIALECT", "oracle")])).unwrap_err();
        assert!(err.to_string().contains("ASKDB_SQL_DIALECT"));
    }
}
