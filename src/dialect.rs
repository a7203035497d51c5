//! SQL dialects the executor can reach, and the dialect-specific pieces of
//! the generation prompt.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Sqlite,
    Postgres,
    MySql,
}

impl Dialect {
    /// Infer the dialect from a database URL scheme.
    ///
    /// `sqlite:`, `postgres:` / `postgresql:` and `mysql:` / `mariadb:` are
    /// recognized. Anything else is `None`.
    pub fn from_url(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once(':')?;
        match scheme.to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            _ => None,
        }
    }

    /// Lowercase identifier, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
        }
    }

    /// Product name used in prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::Postgres => "PostgreSQL",
            Self::MySql => "MySQL",
        }
    }

    /// Row-limiting clause, with `N` as the placeholder.
    pub fn row_limit(&self) -> &'static str {
        "LIMIT N"
    }

    /// Row-limiting syntax from other dialects that this one rejects.
    pub fn foreign_row_limits(&self) -> &'static str {
        "TOP N, FETCH FIRST or ROWNUM"
    }

    /// Expression for "current date minus one year".
    pub fn one_year_ago(&self) -> &'static str {
        match self {
            Self::Sqlite => "DATE('now', '-1 year')",
            Self::Postgres => "CURRENT_DATE - INTERVAL '1 year'",
            Self::MySql => "DATE_SUB(CURDATE(), INTERVAL 1 YEAR)",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            other => Err(format!(
                "unknown SQL dialect '{other}' (expected sqlite, postgres or mysql)"
            )),
        }
    }
}
