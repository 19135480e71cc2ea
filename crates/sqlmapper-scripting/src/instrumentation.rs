//! Tracing conventions for statement building and compilation.
//!
//! Compilation runs inside a `debug` span named [`span_names::COMPILE`]
//! carrying the statement id and command type. Statement text in log fields
//! is bounded with [`truncate_statement`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Span names.
pub mod span_names {
    /// Span for compiling a statement against a parameter object.
    pub const COMPILE: &str = "sqlmapper.compile";
    /// Span for building a statement from its descriptor.
    pub const BUILD: &str = "sqlmapper.build";
    /// Span for resolving bound parameter values.
    pub const BIND: &str = "sqlmapper.bind";
}

/// Field names used in spans and events.
pub mod attributes {
    /// Statement identifier.
    pub const STATEMENT: &str = "statement";
    /// Statement command type.
    pub const COMMAND: &str = "command";
    /// Number of bound parameters.
    pub const PARAMETER_COUNT: &str = "parameter_count";
    /// Compiled statement text, truncated.
    pub const SQL: &str = "sql";
}

/// Default bound for statement text in log fields.
pub const MAX_LOGGED_STATEMENT: usize = 2048;

/// Kind of statement, detected from its leading keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SqlCommandType {
    /// Kind could not be determined.
    #[default]
    Unknown,
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
    /// `SELECT`.
    Select,
    /// Batch flush marker.
    Flush,
}

impl SqlCommandType {
    /// Detect the kind from statement text, skipping leading whitespace,
    /// comments and opening parentheses.
    #[must_use]
    pub fn from_sql(sql: &str) -> Self {
        let keyword: String = skip_preamble(sql)
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();
        match keyword.as_str() {
            "SELECT" => Self::Select,
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            "FLUSH" => Self::Flush,
            _ => Self::Unknown,
        }
    }

    /// Upper-case name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Select => "SELECT",
            Self::Flush => "FLUSH",
        }
    }

    /// Parse an upper- or lower-case name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "UNKNOWN" => Some(Self::Unknown),
            "INSERT" => Some(Self::Insert),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "SELECT" => Some(Self::Select),
            "FLUSH" => Some(Self::Flush),
            _ => None,
        }
    }
}

impl fmt::Display for SqlCommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn skip_preamble(mut sql: &str) -> &str {
    loop {
        sql = sql.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(rest) = sql.strip_prefix("--") {
            sql = rest.split_once('\n').map_or("", |(_, rest)| rest);
        } else if let Some(rest) = sql.strip_prefix("/*") {
            sql = rest.split_once("*/").map_or("", |(_, rest)| rest);
        } else {
            return sql;
        }
    }
}

/// Bound statement text to at most `max_len` bytes, cutting on a character
/// boundary and marking the cut with `...`.
#[must_use]
pub fn truncate_statement(sql: &str, max_len: usize) -> String {
    if sql.len() <= max_len {
        return sql.to_string();
    }
    let mut end = max_len.saturating_sub(3);
    while !sql.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &sql[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_type_detection() {
        assert_eq!(SqlCommandType::from_sql("SELECT 1"), SqlCommandType::Select);
        assert_eq!(
            SqlCommandType::from_sql("  insert into t values (1)"),
            SqlCommandType::Insert
        );
        assert_eq!(
            SqlCommandType::from_sql("-- audit\n/* x */ (SELECT 1) UNION (SELECT 2)"),
            SqlCommandType::Select
        );
        assert_eq!(SqlCommandType::from_sql("DELETE FROM t"), SqlCommandType::Delete);
        assert_eq!(SqlCommandType::from_sql("MERGE INTO t"), SqlCommandType::Unknown);
        assert_eq!(SqlCommandType::from_sql(""), SqlCommandType::Unknown);
    }

    #[test]
    fn test_command_type_names() {
        assert_eq!(SqlCommandType::from_name("update"), Some(SqlCommandType::Update));
        assert_eq!(SqlCommandType::Flush.to_string(), "FLUSH");
        assert_eq!(SqlCommandType::from_name("upsert"), None);
    }

    #[test]
    fn test_truncate_statement() {
        assert_eq!(truncate_statement("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_statement("SELECT * FROM users", 10), "SELECT ...");
        // Never splits a multi-byte character.
        assert_eq!(truncate_statement("ééééé", 6), "é...");
    }
}
