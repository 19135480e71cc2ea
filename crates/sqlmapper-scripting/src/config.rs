//! Statement compilation configuration.

use std::fmt;

use regex::Regex;

use crate::error::Error;
use crate::jdbc_type::JdbcType;

/// Marker written in place of each bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` (JDBC, ODBC, SQLite, MySQL).
    #[default]
    Question,
    /// `@p1`, `@p2`, ... (SQL Server).
    AtP,
    /// `$1`, `$2`, ... (PostgreSQL).
    Dollar,
    /// `:1`, `:2`, ... (Oracle).
    Colon,
}

impl PlaceholderStyle {
    /// Marker for the parameter at 1-based `ordinal`.
    #[must_use]
    pub fn marker(self, ordinal: usize) -> String {
        match self {
            Self::Question => "?".to_string(),
            Self::AtP => format!("@p{ordinal}"),
            Self::Dollar => format!("${ordinal}"),
            Self::Colon => format!(":{ordinal}"),
        }
    }

    /// Parse a style by name (`question`, `atp`, `dollar`, `colon`) or by
    /// example marker (`?`, `@p1`, `$1`, `:1`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "question" | "?" => Some(Self::Question),
            "atp" | "@p" | "@p1" => Some(Self::AtP),
            "dollar" | "$" | "$1" => Some(Self::Dollar),
            "colon" | ":" | ":1" => Some(Self::Colon),
            _ => None,
        }
    }
}

impl fmt::Display for PlaceholderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Question => "?",
            Self::AtP => "@p",
            Self::Dollar => "$",
            Self::Colon => ":",
        })
    }
}

/// Configuration shared by every statement of a registry.
#[derive(Debug, Clone)]
pub struct Config {
    /// Positional marker style for bound parameters.
    pub placeholder: PlaceholderStyle,

    /// Collapse whitespace runs outside quoted literals in compiled text.
    pub shrink_whitespace: bool,

    /// Wire type for null values bound without an explicit `jdbcType`.
    pub jdbc_type_for_null: JdbcType,

    /// Database vendor id, visible to templates as `_databaseId`.
    pub database_id: Option<String>,

    /// Instantiate null intermediates when writing through a path.
    pub auto_instantiate: bool,

    /// Pattern every raw substitution value must fully match.
    pub substitution_filter: Option<Regex>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            placeholder: PlaceholderStyle::Question,
            shrink_whitespace: true,
            jdbc_type_for_null: JdbcType::Other,
            database_id: None,
            auto_instantiate: true,
            substitution_filter: None,
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, Error> {
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") || value == "1" {
        Ok(true)
    } else if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") || value == "0"
    {
        Ok(false)
    } else {
        Err(Error::Config(format!("invalid value for {key}: {value}")))
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a settings string into configuration.
    ///
    /// Keys are case-insensitive and unknown keys are ignored:
    /// ```text
    /// Placeholder=$1;ShrinkWhitespace=false;JdbcTypeForNull=NULL;DatabaseId=postgres
    /// ```
    pub fn from_settings_string(settings: &str) -> Result<Self, Error> {
        let mut config = Self::default();

        for part in settings.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "placeholder" | "placeholder style" | "placeholderstyle" => {
                    config.placeholder = PlaceholderStyle::from_name(value).ok_or_else(|| {
                        Error::Config(format!("invalid placeholder style: {value}"))
                    })?;
                }
                "shrinkwhitespace" | "shrink whitespace" | "shrink_whitespace" => {
                    config.shrink_whitespace = parse_flag(&key, value)?;
                }
                "jdbctypefornull" | "jdbc type for null" | "jdbc_type_for_null" => {
                    config.jdbc_type_for_null = JdbcType::from_name(value).ok_or_else(|| {
                        Error::Config(format!("invalid jdbc type for null: {value}"))
                    })?;
                }
                "databaseid" | "database id" | "database_id" => {
                    config.database_id = (!value.is_empty()).then(|| value.to_string());
                }
                "autoinstantiate" | "auto instantiate" | "auto_instantiate" => {
                    config.auto_instantiate = parse_flag(&key, value)?;
                }
                "substitutionfilter" | "substitution filter" | "substitution_filter" => {
                    let pattern = Regex::new(&format!("^(?:{value})$")).map_err(|e| {
                        Error::Config(format!("invalid substitution filter: {e}"))
                    })?;
                    config.substitution_filter = Some(pattern);
                }
                _ => {
                    tracing::debug!(key = key, value = value, "ignoring unknown setting");
                }
            }
        }

        Ok(config)
    }

    /// Set the placeholder style.
    #[must_use]
    pub fn placeholder(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder = style;
        self
    }

    /// Enable or disable whitespace shrinking.
    #[must_use]
    pub fn shrink_whitespace(mut self, enabled: bool) -> Self {
        self.shrink_whitespace = enabled;
        self
    }

    /// Set the wire type used for untyped nulls.
    #[must_use]
    pub fn jdbc_type_for_null(mut self, jdbc_type: JdbcType) -> Self {
        self.jdbc_type_for_null = jdbc_type;
        self
    }

    /// Set the database vendor id.
    #[must_use]
    pub fn database_id(mut self, id: impl Into<String>) -> Self {
        self.database_id = Some(id.into());
        self
    }

    /// Enable or disable auto-instantiation of null intermediates.
    #[must_use]
    pub fn auto_instantiate(mut self, enabled: bool) -> Self {
        self.auto_instantiate = enabled;
        self
    }

    /// Require raw substitution values to fully match `filter`.
    ///
    /// The pattern is anchored as given; use `^...$` for a full match.
    #[must_use]
    pub fn substitution_filter(mut self, filter: Regex) -> Self {
        self.substitution_filter = Some(filter);
        self
    }

    /// Check a raw substitution value against the filter.
    #[must_use]
    pub fn allows_substitution(&self, value: &str) -> bool {
        self.substitution_filter
            .as_ref()
            .is_none_or(|filter| filter.is_match(value))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(config.placeholder, PlaceholderStyle::Question);
        assert!(config.shrink_whitespace);
        assert_eq!(config.jdbc_type_for_null, JdbcType::Other);
        assert!(config.allows_substitution("anything; at all"));
    }

    #[test]
    fn test_settings_string_parsing() {
        let config = Config::from_settings_string(
            "Placeholder=$1; ShrinkWhitespace=no; JdbcTypeForNull=null; DatabaseId=postgres;",
        )
        .unwrap();

        assert_eq!(config.placeholder, PlaceholderStyle::Dollar);
        assert!(!config.shrink_whitespace);
        assert_eq!(config.jdbc_type_for_null, JdbcType::Null);
        assert_eq!(config.database_id.as_deref(), Some("postgres"));
    }

    #[test]
    fn test_settings_string_substitution_filter() {
        let config = Config::from_settings_string(r"SubstitutionFilter=[A-Za-z_][\w.]*").unwrap();
        assert!(config.allows_substitution("users.name"));
        assert!(!config.allows_substitution("name; DROP TABLE users"));
    }

    #[test]
    fn test_settings_string_errors() {
        assert!(matches!(
            Config::from_settings_string("Placeholder"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_settings_string("Placeholder=%s"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_settings_string("ShrinkWhitespace=maybe"),
            Err(Error::Config(_))
        ));
        assert!(Config::from_settings_string("Unknown=1;").is_ok());
    }

    #[test]
    fn test_markers() {
        assert_eq!(PlaceholderStyle::Question.marker(3), "?");
        assert_eq!(PlaceholderStyle::AtP.marker(1), "@p1");
        assert_eq!(PlaceholderStyle::Dollar.marker(2), "$2");
        assert_eq!(PlaceholderStyle::Colon.marker(10), ":10");
    }
}
