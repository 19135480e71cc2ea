//! Statement sources and compiled statements.

use std::collections::BTreeMap;

use sqlmapper_reflection::{MetaObject, Node, Property, PropertyPath, ReflectionError, Value};

use crate::config::Config;
use crate::context::{DynamicContext, PARAMETER_OBJECT_KEY, Resolved, lookup_root};
use crate::error::{BindingError, EvalError};
use crate::jdbc_type::JdbcType;
use crate::node::SqlNode;
use crate::parameter::ParameterMapping;

/// Where the text of a statement comes from.
#[derive(Debug, Clone)]
pub enum SqlSource {
    /// Text fixed at build time.
    Raw(RawSqlSource),
    /// A node tree evaluated for every execution.
    Dynamic(DynamicSqlSource),
}

impl SqlSource {
    /// Build a source from a node tree, resolving it at build time when its
    /// output does not depend on the parameter object.
    pub fn new(root: SqlNode, config: &Config) -> Result<Self, EvalError> {
        if root.is_dynamic() {
            Ok(Self::Dynamic(DynamicSqlSource { root }))
        } else {
            RawSqlSource::new(&root, config).map(Self::Raw)
        }
    }

    /// Check whether the source is evaluated per execution.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }

    /// Compile the statement for one parameter object.
    pub fn bound_sql<'a>(
        &self,
        config: &'a Config,
        parameter: &'a dyn Property,
    ) -> Result<BoundSql<'a>, EvalError> {
        match self {
            Self::Raw(raw) => Ok(BoundSql {
                sql: raw.sql.clone(),
                mappings: raw.mappings.clone(),
                additional: raw
                    .additional
                    .iter()
                    .map(|(name, value)| (name.clone(), Resolved::Owned(value.clone())))
                    .collect(),
                parameter,
                parameter_type: None,
                jdbc_type_for_null: config.jdbc_type_for_null,
            }),
            Self::Dynamic(dynamic) => {
                let mut ctx = DynamicContext::new(config, parameter);
                dynamic.root.apply(&mut ctx)?;
                let (sql, mappings, additional) = ctx.into_parts();
                Ok(BoundSql {
                    sql: finish(&sql, config),
                    mappings,
                    additional,
                    parameter,
                    parameter_type: None,
                    jdbc_type_for_null: config.jdbc_type_for_null,
                })
            }
        }
    }
}

/// Statement text and parameters resolved once at build time.
#[derive(Debug, Clone)]
pub struct RawSqlSource {
    sql: String,
    mappings: Vec<ParameterMapping>,
    // Context values such as `_databaseId` captured at build time.
    additional: BTreeMap<String, Value>,
}

impl RawSqlSource {
    /// Resolve a node tree without dynamic content.
    pub fn new(root: &SqlNode, config: &Config) -> Result<Self, EvalError> {
        let nothing = Value::Null;
        let mut ctx = DynamicContext::new(config, &nothing);
        root.apply(&mut ctx)?;
        let (sql, mappings, additional) = ctx.into_parts();
        // The build-time parameter object is a stand-in; `_parameter` must
        // resolve to the object given at execution.
        let additional = additional
            .into_iter()
            .filter(|(name, _)| name != PARAMETER_OBJECT_KEY)
            .map(|(name, value)| (name, value.to_value()))
            .collect();
        Ok(Self {
            sql: finish(&sql, config),
            mappings,
            additional,
        })
    }

    /// The final text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }
}

/// A node tree evaluated for every execution.
#[derive(Debug, Clone)]
pub struct DynamicSqlSource {
    root: SqlNode,
}

impl DynamicSqlSource {
    /// The node tree.
    #[must_use]
    pub fn root(&self) -> &SqlNode {
        &self.root
    }
}

fn finish(sql: &str, config: &Config) -> String {
    if config.shrink_whitespace {
        shrink_whitespace(sql)
    } else {
        sql.trim().to_string()
    }
}

/// Collapse whitespace runs to one space and trim the ends.
///
/// Quoted literals and comments are copied unchanged. A line comment keeps
/// its terminating newline. A quote without a matching close quote, such as
/// the apostrophe in a substituted `O'Brien`, is ordinary text.
#[must_use]
pub fn shrink_whitespace(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut pending_space = false;
    let mut rest = sql;

    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            pending_space = true;
            rest = &rest[c.len_utf8()..];
            continue;
        }
        if pending_space && !out.is_empty() && !out.ends_with('\n') {
            out.push(' ');
        }
        pending_space = false;
        let len = verbatim_len(rest, c);
        out.push_str(&rest[..len]);
        rest = &rest[len..];
    }
    out.truncate(out.trim_end().len());
    out
}

// Byte length of the unit at the start of `s` that is copied as is.
fn verbatim_len(s: &str, first: char) -> usize {
    if s.starts_with("--") {
        return s.find('\n').map_or(s.len(), |end| end + 1);
    }
    if let Some(body) = s.strip_prefix("/*") {
        return body.find("*/").map_or(s.len(), |end| end + 4);
    }
    if first == '\'' || first == '"' {
        if let Some(end) = s[1..].find(first) {
            return end + 2;
        }
    }
    first.len_utf8()
}

/// One bound parameter with its value.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    /// The parameter description.
    pub mapping: ParameterMapping,
    /// Value to bind. Output parameters are null.
    pub value: Value,
    /// Wire type: the declared `jdbcType`, or the configured null type for
    /// untyped nulls.
    pub jdbc_type: Option<JdbcType>,
    /// Host type: the declared type, or the type of the resolved property.
    pub java_type: Option<String>,
}

/// A statement compiled for one parameter object.
pub struct BoundSql<'a> {
    sql: String,
    mappings: Vec<ParameterMapping>,
    additional: BTreeMap<String, Resolved<'a>>,
    parameter: &'a dyn Property,
    parameter_type: Option<&'a str>,
    jdbc_type_for_null: JdbcType,
}

impl<'a> BoundSql<'a> {
    /// Name the host type of a scalar parameter object. Placeholders that
    /// resolve to the parameter object itself report it as their host type.
    #[must_use]
    pub fn with_parameter_type(mut self, type_name: Option<&'a str>) -> Self {
        self.parameter_type = type_name;
        self
    }

    /// Final statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters in the order of their markers.
    #[must_use]
    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }

    /// The parameter object the statement was compiled for.
    #[must_use]
    pub fn parameter_object(&self) -> &'a dyn Property {
        self.parameter
    }

    /// Check whether the root name of `property` is an additional
    /// parameter, such as a loop variable.
    #[must_use]
    pub fn has_additional_parameter(&self, property: &str) -> bool {
        PropertyPath::parse(property)
            .ok()
            .and_then(|path| path.split_root())
            .is_some_and(|(root, _)| self.additional.contains_key(root))
    }

    /// An additional parameter by name.
    #[must_use]
    pub fn additional_parameter(&self, name: &str) -> Option<&dyn Property> {
        self.additional.get(name).map(Resolved::as_property)
    }

    /// Names of the additional parameters, sorted.
    pub fn additional_parameter_names(&self) -> impl Iterator<Item = &str> {
        self.additional.keys().map(String::as_str)
    }

    /// Resolve the value of every bound parameter, in marker order.
    pub fn parameter_values(&self) -> Result<Vec<BoundParameter>, BindingError> {
        self.mappings
            .iter()
            .map(|mapping| self.bind(mapping))
            .collect()
    }

    fn bind(&self, mapping: &ParameterMapping) -> Result<BoundParameter, BindingError> {
        let binding_error = |source| BindingError {
            property: mapping.property.clone(),
            type_name: self.parameter.type_name(),
            source,
        };

        let (value, inferred) = if mapping.mode.is_input() {
            let property = self.resolve(&mapping.property).map_err(binding_error)?;
            let value = property.to_value();
            let inferred = (!value.is_null()).then(|| self.host_type(&mapping.property, property));
            (value, inferred)
        } else {
            (Value::Null, None)
        };

        if let Some(declared) = &mapping.java_type {
            check_declared_type(declared, &value).map_err(binding_error)?;
        }
        let value = match mapping.numeric_scale {
            Some(scale) => rescale(value, scale),
            None => value,
        };
        let jdbc_type = mapping
            .jdbc_type
            .or_else(|| value.is_null().then_some(self.jdbc_type_for_null));

        Ok(BoundParameter {
            mapping: mapping.clone(),
            value,
            jdbc_type,
            java_type: mapping.java_type.clone().or(inferred),
        })
    }

    fn host_type(&self, path: &str, property: &dyn Property) -> String {
        match self.parameter_type {
            Some(hint)
                if matches!(self.parameter.node(), Node::Scalar(_))
                    && !self.has_additional_parameter(path) =>
            {
                hint.to_string()
            }
            _ => property.type_name().to_string(),
        }
    }

    // Additional parameters first, then a scalar or null parameter object
    // as the value itself, then a path into the parameter object. A list
    // parameter object answers to `list`, `collection` and `array`.
    fn resolve(&self, property: &str) -> Result<&dyn Property, ReflectionError> {
        let path = PropertyPath::parse(property)?;
        if let Some((root, rest)) = path.split_root() {
            let base = match self.additional.get(root) {
                Some(resolved) => Some(resolved.as_property()),
                None if root == PARAMETER_OBJECT_KEY => Some(self.parameter),
                None if matches!(self.parameter.node(), Node::List(_)) => {
                    Some(lookup_root(self.parameter, root)?)
                }
                None => None,
            };
            if let Some(base) = base {
                return match rest.strip_prefix('.').unwrap_or(rest) {
                    "" => Ok(base),
                    rest => MetaObject::new(base).get_value(rest),
                };
            }
        }
        match self.parameter.node() {
            Node::Null | Node::Scalar(_) => Ok(self.parameter),
            _ => MetaObject::new(self.parameter).get_value(property),
        }
    }
}

impl std::fmt::Debug for BoundSql<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundSql")
            .field("sql", &self.sql)
            .field("mappings", &self.mappings)
            .field("additional", &self.additional)
            .finish_non_exhaustive()
    }
}

// Value kinds accepted for well-known declared type names. Names that are
// not listed are not checked.
fn accepted_kinds(declared: &str) -> Option<&'static [&'static str]> {
    let name = declared
        .rsplit(['.', ':'])
        .next()
        .unwrap_or(declared)
        .trim()
        .to_ascii_lowercase();
    let kinds: &'static [&'static str] = match name.as_str() {
        "int" | "integer" | "long" | "short" | "byte" | "biginteger" | "i8" | "i16" | "i32"
        | "i64" | "u8" | "u16" | "u32" | "u64" | "isize" | "usize" => &["int"],
        "double" | "float" | "f32" | "f64" => &["int", "float", "decimal"],
        "bigdecimal" | "decimal" => &["int", "float", "decimal"],
        "string" | "str" | "&str" => &["text"],
        "boolean" | "bool" => &["bool"],
        "localdate" | "naivedate" => &["date"],
        "localtime" | "naivetime" => &["time"],
        "localdatetime" | "naivedatetime" => &["datetime"],
        "uuid" => &["uuid"],
        _ => return None,
    };
    Some(kinds)
}

fn check_declared_type(declared: &str, value: &Value) -> Result<(), ReflectionError> {
    if value.is_null() {
        return Ok(());
    }
    match accepted_kinds(declared) {
        Some(kinds) if !kinds.contains(&value.type_name()) => Err(ReflectionError::TypeMismatch {
            expected: kinds[0],
            actual: format!("{} value for declared type {declared}", value.type_name()),
        }),
        _ => Ok(()),
    }
}

fn rescale(value: Value, scale: u32) -> Value {
    match value {
        #[cfg(feature = "decimal")]
        Value::Decimal(mut d) => {
            d.rescale(scale);
            Value::Decimal(d)
        }
        Value::Float(f) => {
            let factor = 10f64.powi(i32::try_from(scale).unwrap_or(i32::MAX));
            if factor.is_finite() {
                Value::Float((f * factor).round() / factor)
            } else {
                Value::Float(f)
            }
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::context::ITEM_PREFIX;
    use crate::expression::Expression;
    use crate::node::{ForEachNode, IfNode, TrimNode};

    fn text(s: &str) -> SqlNode {
        SqlNode::text(s).unwrap()
    }

    #[test]
    fn test_raw_source_is_resolved_once() {
        let config = Config::default();
        let source = SqlSource::new(
            SqlNode::Mixed(vec![
                text("SELECT *\n   FROM users"),
                text("WHERE id = #{id}"),
            ]),
            &config,
        )
        .unwrap();
        assert!(!source.is_dynamic());

        let params = Value::map([("id", 7)]);
        let bound = source.bound_sql(&config, &params).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM users WHERE id = ?");
        let values = bound.parameter_values().unwrap();
        assert_eq!(values[0].value, Value::Int(7));
    }

    #[test]
    fn test_text_only_output_is_normalized() {
        let config = Config::default();
        let source = SqlSource::new(text("  SELECT  a,\tb\n FROM t  "), &config).unwrap();
        let nothing = Value::Null;
        let bound = source.bound_sql(&config, &nothing).unwrap();
        assert_eq!(bound.sql(), "SELECT a, b FROM t");
        assert!(bound.parameter_mappings().is_empty());
    }

    #[test]
    fn test_shrink_whitespace_keeps_literals() {
        assert_eq!(
            shrink_whitespace("  a =  'x   y'  AND\n b = \"p  q\" "),
            "a = 'x   y' AND b = \"p  q\""
        );
        assert_eq!(shrink_whitespace("'it''s  ok'  x"), "'it''s  ok' x");
    }

    #[test]
    fn test_foreach_values_in_order() {
        let config = Config::default();
        let node = SqlNode::Mixed(vec![
            text("SELECT * FROM t WHERE id IN"),
            SqlNode::Foreach(
                ForEachNode::new(Expression::parse("ids").unwrap(), text("#{id}"))
                    .item("id")
                    .open("(")
                    .close(")")
                    .separator(","),
            ),
        ]);
        let source = SqlSource::new(node, &config).unwrap();
        let params = Value::map([("ids", Value::list([1, 2, 3]))]);
        let bound = source.bound_sql(&config, &params).unwrap();

        assert_eq!(bound.sql(), "SELECT * FROM t WHERE id IN (?,?,?)");
        let values: Vec<_> = bound
            .parameter_values()
            .unwrap()
            .into_iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, [Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert!(bound.has_additional_parameter(&format!("{ITEM_PREFIX}id_0")));
    }

    #[test]
    fn test_scalar_parameter_answers_any_name() {
        let config = Config::default();
        let source = SqlSource::new(text("SELECT * FROM t WHERE id = #{anything}"), &config).unwrap();
        let id = 5i32;
        let bound = source.bound_sql(&config, &id).unwrap();
        let values = bound.parameter_values().unwrap();
        assert_eq!(values[0].value, Value::Int(5));
        assert_eq!(values[0].java_type.as_deref(), Some("i32"));
    }

    #[test]
    fn test_null_gets_configured_jdbc_type() {
        let config = Config::default().jdbc_type_for_null(JdbcType::Null);
        let source = SqlSource::new(
            text("UPDATE t SET a = #{a}, b = #{b, jdbcType=VARCHAR}"),
            &config,
        )
        .unwrap();
        let params = Value::map([("a", Value::Null), ("b", Value::Null)]);
        let bound = source.bound_sql(&config, &params).unwrap();
        let values = bound.parameter_values().unwrap();
        assert_eq!(values[0].jdbc_type, Some(JdbcType::Null));
        assert_eq!(values[1].jdbc_type, Some(JdbcType::VarChar));
    }

    #[test]
    fn test_out_parameters_are_null() {
        let config = Config::default();
        let source = SqlSource::new(
            text("CALL count_users(#{total, mode=OUT, jdbcType=INTEGER})"),
            &config,
        )
        .unwrap();
        let params = Value::map([("other", 1)]);
        let bound = source.bound_sql(&config, &params).unwrap();
        let values = bound.parameter_values().unwrap();
        assert_eq!(values[0].value, Value::Null);
        assert_eq!(values[0].jdbc_type, Some(JdbcType::Integer));
    }

    #[test]
    fn test_declared_type_mismatch() {
        let config = Config::default();
        let source = SqlSource::new(text("WHERE id = #{id:Integer}"), &config).unwrap();
        let params = Value::map([("id", "abc")]);
        let bound = source.bound_sql(&config, &params).unwrap();
        let err = bound.parameter_values().unwrap_err();
        assert_eq!(err.property, "id");
        assert!(matches!(err.source, ReflectionError::TypeMismatch { .. }));

        let params = Value::map([("id", 3)]);
        let bound = source.bound_sql(&config, &params).unwrap();
        assert_eq!(
            bound.parameter_values().unwrap()[0].java_type.as_deref(),
            Some("Integer")
        );
    }

    #[test]
    fn test_numeric_scale() {
        let config = Config::default();
        let source = SqlSource::new(text("#{price, numericScale=2}"), &config).unwrap();
        let params = Value::map([("price", 2.346_f64)]);
        let bound = source.bound_sql(&config, &params).unwrap();
        assert_eq!(bound.parameter_values().unwrap()[0].value, Value::Float(2.35));
    }

    #[test]
    fn test_unresolvable_property_is_binding_error() {
        let config = Config::default();
        let source = SqlSource::new(text("#{user.name}"), &config).unwrap();
        let params = Value::map([("user", Value::Null)]);
        let bound = source.bound_sql(&config, &params).unwrap();
        let err = bound.parameter_values().unwrap_err();
        assert!(matches!(err.source, ReflectionError::NullIntermediate { .. }));
        assert_eq!(err.type_name, "map");
    }

    #[test]
    fn test_numbered_placeholders_follow_order() {
        let config = Config::default().placeholder(crate::config::PlaceholderStyle::Dollar);
        let node = SqlNode::Mixed(vec![
            text("SELECT * FROM t"),
            SqlNode::Trim(TrimNode::where_clause(SqlNode::Mixed(vec![
                SqlNode::If(IfNode::new(Expression::parse("a != null").unwrap(), text("AND a = #{a}"))),
                SqlNode::If(IfNode::new(Expression::parse("b != null").unwrap(), text("AND b = #{b}"))),
            ]))),
        ]);
        let source = SqlSource::new(node, &config).unwrap();
        let params = Value::map([("a", 1), ("b", 2)]);
        let bound = source.bound_sql(&config, &params).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM t WHERE a = $1 AND b = $2");
    }

    #[test]
    fn test_list_parameter_binds_by_collection_names() {
        let config = Config::default();
        let ids = vec![10i64, 20];

        let source = SqlSource::new(
            text("SELECT #{list[0]}, #{array[1]}, #{collection[0]}"),
            &config,
        )
        .unwrap();
        let bound = source.bound_sql(&config, &ids).unwrap();
        assert_eq!(bound.sql(), "SELECT ?, ?, ?");
        let values: Vec<_> = bound
            .parameter_values()
            .unwrap()
            .into_iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, [Value::Int(10), Value::Int(20), Value::Int(10)]);

        let guarded = SqlSource::new(
            SqlNode::Mixed(vec![
                text("SELECT * FROM t"),
                SqlNode::Trim(TrimNode::where_clause(SqlNode::If(IfNode::new(
                    Expression::parse("list.size() > 0").unwrap(),
                    text("AND x = #{list[0]}"),
                )))),
            ]),
            &config,
        )
        .unwrap();
        let bound = guarded.bound_sql(&config, &ids).unwrap();
        assert_eq!(bound.sql(), "SELECT * FROM t WHERE x = ?");
        assert_eq!(bound.parameter_values().unwrap()[0].value, Value::Int(10));

        let stray = SqlSource::new(text("#{other[0]}"), &config).unwrap();
        let stray = stray.bound_sql(&config, &ids).unwrap();
        assert!(matches!(
            stray.parameter_values().unwrap_err().source,
            ReflectionError::NoGetter { .. }
        ));
    }

    #[test]
    fn test_shrink_whitespace_past_comments() {
        assert_eq!(
            shrink_whitespace("SELECT  a   -- don't\n  FROM   t  WHERE   x = ?"),
            "SELECT a -- don't\nFROM t WHERE x = ?"
        );
        assert_eq!(
            shrink_whitespace("SELECT  /* it's   here */  a ,\n  b"),
            "SELECT /* it's   here */ a , b"
        );
        assert_eq!(shrink_whitespace("SELECT 1  -- trailing\n  "), "SELECT 1 -- trailing");
    }

    #[test]
    fn test_shrink_whitespace_after_unmatched_quote() {
        assert_eq!(
            shrink_whitespace("SELECT  *  FROM  t  ORDER BY  O'Brien   ,  id"),
            "SELECT * FROM t ORDER BY O'Brien , id"
        );
    }

    #[test]
    fn test_static_statement_binds_database_id() {
        let config = Config::default().database_id("pg");
        let source =
            SqlSource::new(text("SELECT #{_databaseId}, #{_parameter.id}"), &config).unwrap();
        assert!(!source.is_dynamic());

        let params = Value::map([("id", 3)]);
        let bound = source.bound_sql(&config, &params).unwrap();
        let values: Vec<_> = bound
            .parameter_values()
            .unwrap()
            .into_iter()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, [Value::from("pg"), Value::Int(3)]);
    }

    #[test]
    fn test_parameter_type_names_scalar_root() {
        let config = Config::default();
        let source = SqlSource::new(text("WHERE id = #{id}"), &config).unwrap();
        let id = 5i64;
        let bound = source
            .bound_sql(&config, &id)
            .unwrap()
            .with_parameter_type(Some("Long"));
        assert_eq!(bound.parameter_values().unwrap()[0].java_type.as_deref(), Some("Long"));

        let params = Value::map([("id", 5)]);
        let bound = source
            .bound_sql(&config, &params)
            .unwrap()
            .with_parameter_type(Some("Long"));
        assert_ne!(bound.parameter_values().unwrap()[0].java_type.as_deref(), Some("Long"));
    }
}
