//! Bound parameter descriptors and the placeholder attribute grammar.
//!
//! A bound placeholder body has the form
//! `property[:declaredType][, key=value]*`, for example
//! `#{salary:decimal, jdbcType=NUMERIC, numericScale=2}`. The recognized keys
//! are `javaType`, `jdbcType`, `mode`, `numericScale`, `resultMap`,
//! `typeHandler` and `jdbcTypeName`; anything else is rejected.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::GrammarError;
use crate::jdbc_type::{JdbcType, ParameterMode};

/// Property paths: identifiers separated by dots, each optionally followed
/// by bracketed indexes or quoted keys.
#[allow(clippy::expect_used)]
static PROPERTY_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^[\p{L}_$][\w$]*(?:\[(?:\d+|'[^']*'|"[^"]*"|[\p{L}_$][\w$.]*)\])*(?:\.[\p{L}_$][\w$]*(?:\[(?:\d+|'[^']*'|"[^"]*"|[\p{L}_$][\w$.]*)\])*)*$"#)
        .expect("property path regex is valid")
});

/// Description of one bound parameter, in the order it appears in the
/// compiled statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterMapping {
    /// Property path into the parameter object or the evaluation scope.
    pub property: String,
    /// Parameter direction.
    pub mode: ParameterMode,
    /// Declared host type, overriding inference.
    pub java_type: Option<String>,
    /// Wire type hint.
    pub jdbc_type: Option<JdbcType>,
    /// Database-specific type name, for user-defined types.
    pub jdbc_type_name: Option<String>,
    /// Decimal scale applied when binding numeric values.
    pub numeric_scale: Option<u32>,
    /// Result mapping used for cursor-style output parameters.
    pub result_map_id: Option<String>,
    /// Value conversion strategy override.
    pub type_handler: Option<String>,
}

impl ParameterMapping {
    /// Create an input parameter for a property with no hints.
    #[must_use]
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            mode: ParameterMode::In,
            java_type: None,
            jdbc_type: None,
            jdbc_type_name: None,
            numeric_scale: None,
            result_map_id: None,
            type_handler: None,
        }
    }

    /// Set the direction.
    #[must_use]
    pub fn with_mode(mut self, mode: ParameterMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the declared host type.
    #[must_use]
    pub fn with_java_type(mut self, java_type: impl Into<String>) -> Self {
        self.java_type = Some(java_type.into());
        self
    }

    /// Set the wire type hint.
    #[must_use]
    pub fn with_jdbc_type(mut self, jdbc_type: JdbcType) -> Self {
        self.jdbc_type = Some(jdbc_type);
        self
    }

    /// Set the decimal scale.
    #[must_use]
    pub fn with_numeric_scale(mut self, scale: u32) -> Self {
        self.numeric_scale = Some(scale);
        self
    }

    /// Replace the property path, keeping every hint.
    #[must_use]
    pub fn with_property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    /// Parse a bound placeholder body.
    ///
    /// Error positions are byte offsets into `body`.
    pub fn parse(body: &str) -> Result<Self, GrammarError> {
        let invalid = |position: usize, reason: &str| GrammarError::InvalidParameter {
            fragment: body.to_string(),
            position,
            reason: reason.to_string(),
        };

        let lead = body.len() - body.trim_start().len();
        if body[lead..].starts_with('(') {
            return Err(invalid(
                lead,
                "expression based parameters are not supported",
            ));
        }

        let mut parts = split_top_level(body, b',').into_iter();
        let Some((head_start, head)) = parts.next() else {
            return Err(invalid(0, "missing property"));
        };

        let (property_part, declared) = match split_once_top_level(head, b':') {
            Some((property, declared)) => (property, Some((head_start + property.len() + 1, declared))),
            None => (head, None),
        };

        let property = property_part.trim();
        if property.is_empty() {
            return Err(invalid(head_start, "missing property"));
        }
        if !PROPERTY_PATH.is_match(property) {
            return Err(invalid(
                head_start + leading_ws(property_part),
                "property is not a valid property path",
            ));
        }

        let mut mapping = Self::new(property);

        if let Some((declared_start, declared)) = declared {
            let declared = declared.trim();
            if declared.is_empty() {
                return Err(invalid(declared_start, "empty declared type after ':'"));
            }
            mapping.java_type = Some(declared.to_string());
        }

        for (start, part) in parts {
            let Some((key, value)) = split_once_top_level(part, b'=') else {
                return Err(invalid(
                    start + leading_ws(part),
                    "expected attribute of the form key=value",
                ));
            };
            let key_position = start + leading_ws(key);
            let value_position = start + key.len() + 1 + leading_ws(value);
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() {
                return Err(invalid(key_position, "missing attribute name"));
            }
            mapping.apply_attribute(body, key, value, key_position, value_position)?;
        }

        if mapping.jdbc_type == Some(JdbcType::Cursor) && mapping.result_map_id.is_none() {
            return Err(invalid(
                0,
                "cursor parameters require a resultMap attribute",
            ));
        }

        Ok(mapping)
    }

    fn apply_attribute(
        &mut self,
        body: &str,
        key: &str,
        value: &str,
        key_position: usize,
        value_position: usize,
    ) -> Result<(), GrammarError> {
        let bad_value = || GrammarError::InvalidAttribute {
            key: key.to_string(),
            value: value.to_string(),
            fragment: body.to_string(),
            position: value_position,
        };

        if value.is_empty() {
            return Err(bad_value());
        }

        match key {
            "javaType" => self.java_type = Some(value.to_string()),
            "jdbcType" => self.jdbc_type = Some(JdbcType::from_name(value).ok_or_else(bad_value)?),
            "mode" => self.mode = ParameterMode::from_name(value).ok_or_else(bad_value)?,
            "numericScale" => {
                self.numeric_scale = Some(value.parse::<u32>().map_err(|_| bad_value())?);
            }
            "resultMap" => self.result_map_id = Some(value.to_string()),
            "typeHandler" => self.type_handler = Some(value.to_string()),
            "jdbcTypeName" => self.jdbc_type_name = Some(value.to_string()),
            _ => {
                return Err(GrammarError::UnknownAttribute {
                    key: key.to_string(),
                    fragment: body.to_string(),
                    position: key_position,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ParameterMapping {
    /// Renders the mapping in placeholder body syntax.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.property)?;
        if let Some(java_type) = &self.java_type {
            write!(f, ", javaType={java_type}")?;
        }
        if let Some(jdbc_type) = self.jdbc_type {
            write!(f, ", jdbcType={jdbc_type}")?;
        }
        if self.mode != ParameterMode::In {
            write!(f, ", mode={}", self.mode)?;
        }
        if let Some(scale) = self.numeric_scale {
            write!(f, ", numericScale={scale}")?;
        }
        if let Some(result_map) = &self.result_map_id {
            write!(f, ", resultMap={result_map}")?;
        }
        if let Some(handler) = &self.type_handler {
            write!(f, ", typeHandler={handler}")?;
        }
        if let Some(name) = &self.jdbc_type_name {
            write!(f, ", jdbcTypeName={name}")?;
        }
        Ok(())
    }
}

fn leading_ws(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

// Split on `delim` where it is not nested inside brackets, braces,
// parentheses or quotes. Each part carries its byte offset in `text`.
fn split_top_level(text: &str, delim: u8) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut scanner = NestingScanner::default();
    for (i, b) in text.bytes().enumerate() {
        if scanner.at_top_level(b) && b == delim {
            parts.push((start, &text[start..i]));
            start = i + 1;
        }
    }
    parts.push((start, &text[start..]));
    parts
}

fn split_once_top_level(text: &str, delim: u8) -> Option<(&str, &str)> {
    let mut scanner = NestingScanner::default();
    text.bytes()
        .enumerate()
        .find(|&(_, b)| scanner.at_top_level(b) && b == delim)
        .map(|(i, _)| (&text[..i], &text[i + 1..]))
}

#[derive(Default)]
struct NestingScanner {
    depth: usize,
    quote: Option<u8>,
}

impl NestingScanner {
    // Feed one byte; returns whether it sits outside any nesting.
    fn at_top_level(&mut self, b: u8) -> bool {
        if let Some(q) = self.quote {
            if b == q {
                self.quote = None;
            }
            return false;
        }
        match b {
            b'\'' | b'"' => {
                self.quote = Some(b);
                false
            }
            b'(' | b'[' | b'{' => {
                self.depth += 1;
                false
            }
            b')' | b']' | b'}' => {
                self.depth = self.depth.saturating_sub(1);
                false
            }
            _ => self.depth == 0,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_property() {
        let mapping = ParameterMapping::parse("id").unwrap();
        assert_eq!(mapping, ParameterMapping::new("id"));

        let mapping = ParameterMapping::parse("  user.address.city  ").unwrap();
        assert_eq!(mapping.property, "user.address.city");
    }

    #[test]
    fn test_full_attribute_set() {
        let mapping = ParameterMapping::parse(
            "name:VARCHAR, mode=IN, jdbcType=VARCHAR, jdbcTypeName=MY_TYPE, resultMap=departmentResultMap",
        )
        .unwrap();
        assert_eq!(mapping.property, "name");
        assert_eq!(mapping.mode, ParameterMode::In);
        assert_eq!(mapping.java_type.as_deref(), Some("VARCHAR"));
        assert_eq!(mapping.jdbc_type, Some(JdbcType::VarChar));
        assert_eq!(mapping.jdbc_type_name.as_deref(), Some("MY_TYPE"));
        assert_eq!(mapping.result_map_id.as_deref(), Some("departmentResultMap"));
        assert_eq!(mapping.numeric_scale, None);
        assert_eq!(mapping.type_handler, None);
    }

    #[test]
    fn test_numeric_and_handler() {
        let mapping = ParameterMapping::parse(
            "salary, javaType=decimal, numericScale=2, typeHandler=MoneyHandler, mode=inout",
        )
        .unwrap();
        assert_eq!(mapping.numeric_scale, Some(2));
        assert_eq!(mapping.type_handler.as_deref(), Some("MoneyHandler"));
        assert_eq!(mapping.mode, ParameterMode::InOut);
    }

    #[test]
    fn test_unknown_attribute() {
        let err = ParameterMapping::parse("id, jdbcTyp=INTEGER").unwrap_err();
        assert_eq!(
            err,
            GrammarError::UnknownAttribute {
                key: "jdbcTyp".into(),
                fragment: "id, jdbcTyp=INTEGER".into(),
                position: 4,
            }
        );
    }

    #[test]
    fn test_invalid_values() {
        for body in [
            "id, jdbcType=BOGUS",
            "id, mode=SIDEWAYS",
            "id, numericScale=-1",
            "id, javaType=",
        ] {
            let err = ParameterMapping::parse(body).unwrap_err();
            assert!(
                matches!(err, GrammarError::InvalidAttribute { .. }),
                "{body}: {err}"
            );
        }
    }

    #[test]
    fn test_malformed_bodies() {
        for body in ["", "  ", ":VARCHAR", "id:", "id, mode", "1abc", "a..b", "a b"] {
            let err = ParameterMapping::parse(body).unwrap_err();
            assert!(
                matches!(err, GrammarError::InvalidParameter { .. }),
                "{body}: {err}"
            );
        }
    }

    #[test]
    fn test_expression_parameter_rejected() {
        let err = ParameterMapping::parse(" (id + 1)").unwrap_err();
        assert_eq!(err.position(), 1);
        assert!(err.to_string().contains("expression based parameters"));
    }

    #[test]
    fn test_nested_delimiters_do_not_split() {
        let mapping = ParameterMapping::parse("attrs['a,b:c'], jdbcType=VARCHAR").unwrap();
        assert_eq!(mapping.property, "attrs['a,b:c']");
        assert_eq!(mapping.jdbc_type, Some(JdbcType::VarChar));

        let mapping = ParameterMapping::parse("ids[0]").unwrap();
        assert_eq!(mapping.property, "ids[0]");
    }

    #[test]
    fn test_cursor_requires_result_map() {
        assert!(ParameterMapping::parse("rows, mode=OUT, jdbcType=CURSOR").is_err());
        let mapping =
            ParameterMapping::parse("rows, mode=OUT, jdbcType=CURSOR, resultMap=rowMap").unwrap();
        assert!(mapping.mode.is_output());
    }

    #[test]
    fn test_display_is_parseable() {
        let mapping = ParameterMapping::parse("price:decimal, jdbcType=NUMERIC, numericScale=2").unwrap();
        let rendered = mapping.to_string();
        assert_eq!(rendered, "price, javaType=decimal, jdbcType=NUMERIC, numericScale=2");
        assert_eq!(ParameterMapping::parse(&rendered).unwrap(), mapping);
    }
}
