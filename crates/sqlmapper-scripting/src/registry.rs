//! Registered statements.
//!
//! A [`StatementRegistry`] is filled once with fragments and statements and
//! then shared. Compiling a statement only reads the registry, so any number
//! of threads can compile statements concurrently.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlmapper_reflection::{MetaObjectMut, Property, Value};

use crate::builder::{Fragments, NodeDescriptor, ScriptBuilder};
use crate::config::Config;
use crate::error::{BindingError, Error, Result};
use crate::instrumentation::{
    MAX_LOGGED_STATEMENT, SqlCommandType, attributes, span_names, truncate_statement,
};
use crate::parameter::ParameterMapping;
use crate::source::{BoundParameter, BoundSql, SqlSource};

/// Description of a statement before it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementDefinition {
    /// Unique statement id.
    pub id: String,
    /// Name of the expected parameter type. Reported as the host type of
    /// placeholders bound to a scalar parameter object.
    #[serde(default)]
    pub parameter_type: Option<String>,
    /// Command type. Detected from the leading keyword when absent.
    #[serde(default)]
    pub command_type: Option<SqlCommandType>,
    /// Statement body.
    pub body: Vec<NodeDescriptor>,
}

impl StatementDefinition {
    /// Create a definition.
    #[must_use]
    pub fn new(id: impl Into<String>, body: Vec<NodeDescriptor>) -> Self {
        Self {
            id: id.into(),
            parameter_type: None,
            command_type: None,
            body,
        }
    }

    /// Set the parameter type hint.
    #[must_use]
    pub fn parameter_type(mut self, type_name: impl Into<String>) -> Self {
        self.parameter_type = Some(type_name.into());
        self
    }

    /// Set the command type.
    #[must_use]
    pub fn command_type(mut self, command_type: SqlCommandType) -> Self {
        self.command_type = Some(command_type);
        self
    }
}

/// A reusable fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentDefinition {
    /// Fragment id, referenced by `include` nodes.
    pub id: String,
    /// Fragment body.
    pub body: Vec<NodeDescriptor>,
}

/// A set of fragments and statements, usually decoded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperDocument {
    /// Fragments, registered before the statements.
    #[serde(default)]
    pub fragments: Vec<FragmentDefinition>,
    /// Statements.
    #[serde(default)]
    pub statements: Vec<StatementDefinition>,
}

/// A built statement.
#[derive(Debug, Clone)]
pub struct MappedStatement {
    id: String,
    parameter_type: Option<String>,
    command_type: SqlCommandType,
    source: SqlSource,
    config: Arc<Config>,
}

impl MappedStatement {
    /// Statement id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Parameter type hint.
    #[must_use]
    pub fn parameter_type(&self) -> Option<&str> {
        self.parameter_type.as_deref()
    }

    /// Command type.
    #[must_use]
    pub fn command_type(&self) -> SqlCommandType {
        self.command_type
    }

    /// The statement source.
    #[must_use]
    pub fn source(&self) -> &SqlSource {
        &self.source
    }

    /// Compile the statement for `parameter`.
    pub fn compile<'a>(&'a self, parameter: &'a dyn Property) -> Result<BoundSql<'a>> {
        let span = tracing::debug_span!(
            span_names::COMPILE,
            statement = %self.id,
            command = %self.command_type,
            parameter_count = tracing::field::Empty,
            sql = tracing::field::Empty
        );
        let _enter = span.enter();

        let bound = self
            .source
            .bound_sql(&self.config, parameter)
            .map_err(|source| Error::Evaluation {
                statement: self.id.clone(),
                source,
            })?
            .with_parameter_type(self.parameter_type.as_deref());

        span.record(attributes::PARAMETER_COUNT, bound.parameter_mappings().len());
        span.record(
            attributes::SQL,
            tracing::field::display(truncate_statement(bound.sql(), MAX_LOGGED_STATEMENT)),
        );
        tracing::debug!("compiled statement");
        Ok(bound)
    }

    /// Resolve the values of a compiled statement's parameters.
    pub fn parameter_values(&self, bound: &BoundSql<'_>) -> Result<Vec<BoundParameter>> {
        let span = tracing::trace_span!(span_names::BIND, statement = %self.id);
        let _enter = span.enter();

        bound.parameter_values().map_err(|source| Error::Binding {
            statement: self.id.clone(),
            source,
        })
    }

    /// Write the values produced by the statement back into `target`.
    ///
    /// `outputs` holds one value per `OUT` or `INOUT` parameter of
    /// `mappings`, in marker order. Null intermediates on the way are
    /// instantiated when the configuration allows it.
    pub fn write_output_parameters(
        &self,
        mappings: &[ParameterMapping],
        target: &mut dyn Property,
        outputs: impl IntoIterator<Item = Value>,
    ) -> Result<()> {
        let span = tracing::trace_span!(span_names::BIND, statement = %self.id);
        let _enter = span.enter();

        let type_name = target.type_name();
        let mut meta = MetaObjectMut::new(target).auto_instantiate(self.config.auto_instantiate);
        let outputs = mappings.iter().filter(|m| m.mode.is_output()).zip(outputs);
        for (mapping, value) in outputs {
            meta.set_value(&mapping.property, value)
                .map_err(|source| Error::Binding {
                    statement: self.id.clone(),
                    source: BindingError {
                        property: mapping.property.clone(),
                        type_name,
                        source,
                    },
                })?;
        }
        Ok(())
    }
}

/// Fragments and statements sharing one configuration.
#[derive(Debug, Clone, Default)]
pub struct StatementRegistry {
    config: Arc<Config>,
    fragments: Fragments,
    statements: BTreeMap<String, MappedStatement>,
}

impl StatementRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            fragments: Fragments::new(),
            statements: BTreeMap::new(),
        }
    }

    /// The shared configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Register a fragment for `include` nodes of statements added later.
    pub fn add_fragment(&mut self, id: impl Into<String>, body: Vec<NodeDescriptor>) -> Result<()> {
        let id = id.into();
        if self.fragments.contains_key(&id) {
            return Err(Error::DuplicateStatement(id));
        }
        tracing::trace!(fragment = %id, "registered fragment");
        self.fragments.insert(id, body);
        Ok(())
    }

    /// Build and register a statement.
    pub fn add_statement(&mut self, definition: StatementDefinition) -> Result<&MappedStatement> {
        let StatementDefinition {
            id,
            parameter_type,
            command_type,
            body,
        } = definition;
        if self.statements.contains_key(&id) {
            return Err(Error::DuplicateStatement(id));
        }

        let span = tracing::debug_span!(span_names::BUILD, statement = %id);
        let _enter = span.enter();

        let source = ScriptBuilder::new(&id, &self.config)
            .fragments(&self.fragments)
            .build_source(&body)?;
        let command_type = command_type.unwrap_or_else(|| {
            leading_text(&body, &self.fragments)
                .map_or(SqlCommandType::Unknown, SqlCommandType::from_sql)
        });

        tracing::debug!(
            command = %command_type,
            dynamic = source.is_dynamic(),
            "registered statement"
        );

        let statement = MappedStatement {
            id: id.clone(),
            parameter_type,
            command_type,
            source,
            config: Arc::clone(&self.config),
        };
        Ok(self.statements.entry(id).or_insert(statement))
    }

    /// Register every fragment and statement of a document.
    pub fn add_document(&mut self, document: MapperDocument) -> Result<()> {
        for fragment in document.fragments {
            self.add_fragment(fragment.id, fragment.body)?;
        }
        for statement in document.statements {
            self.add_statement(statement)?;
        }
        Ok(())
    }

    /// Decode a JSON [`MapperDocument`] and register its contents.
    pub fn load_json(&mut self, json: &str) -> Result<()> {
        let document: MapperDocument = serde_json::from_str(json)?;
        self.add_document(document)
    }

    /// A statement by id.
    pub fn statement(&self, id: &str) -> Result<&MappedStatement> {
        self.statements
            .get(id)
            .ok_or_else(|| Error::UnknownStatement(id.to_string()))
    }

    /// Registered statement ids, sorted.
    pub fn statement_ids(&self) -> impl Iterator<Item = &str> {
        self.statements.keys().map(String::as_str)
    }

    /// Number of registered statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Check if no statement is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Compile the statement `id` for `parameter`.
    pub fn compile<'a>(&'a self, id: &str, parameter: &'a dyn Property) -> Result<BoundSql<'a>> {
        self.statement(id)?.compile(parameter)
    }
}

// First template text of a body, looking through includes.
fn leading_text<'b>(body: &'b [NodeDescriptor], fragments: &'b Fragments) -> Option<&'b str> {
    fn walk<'b>(
        body: &'b [NodeDescriptor],
        fragments: &'b Fragments,
        depth: usize,
    ) -> Option<&'b str> {
        match body.first()? {
            NodeDescriptor::Text { text } => Some(text),
            NodeDescriptor::Include { refid } if depth < fragments.len() => {
                walk(fragments.get(refid)?, fragments, depth + 1)
            }
            _ => None,
        }
    }
    walk(body, fragments, 0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use sqlmapper_reflection::Value;

    use super::*;

    fn registry() -> StatementRegistry {
        let mut registry = StatementRegistry::new(Config::default());
        registry
            .add_fragment("columns", vec![NodeDescriptor::text("SELECT id, name")])
            .unwrap();
        registry
            .add_statement(StatementDefinition::new(
                "findUser",
                vec![
                    NodeDescriptor::Include {
                        refid: "columns".into(),
                    },
                    NodeDescriptor::text("FROM users WHERE id = #{id}"),
                ],
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_registry_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StatementRegistry>();
        assert_send_sync::<MappedStatement>();
    }

    #[test]
    fn test_compile_by_id() {
        let registry = registry();
        let params = Value::map([("id", 3)]);
        let bound = registry.compile("findUser", &params).unwrap();
        assert_eq!(bound.sql(), "SELECT id, name FROM users WHERE id = ?");

        let statement = registry.statement("findUser").unwrap();
        assert_eq!(statement.command_type(), SqlCommandType::Select);
        let values = statement.parameter_values(&bound).unwrap();
        assert_eq!(values[0].value, Value::Int(3));
    }

    #[test]
    fn test_duplicates_are_rejected() {
        let mut registry = registry();
        let err = registry
            .add_statement(StatementDefinition::new("findUser", Vec::new()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateStatement(ref id) if id == "findUser"));

        let err = registry.add_fragment("columns", Vec::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateStatement(_)));
    }

    #[test]
    fn test_unknown_statement() {
        let registry = registry();
        let err = registry.compile("missing", &Value::Null).unwrap_err();
        assert!(matches!(err, Error::UnknownStatement(ref id) if id == "missing"));
    }

    #[test]
    fn test_explicit_command_type_wins() {
        let mut registry = StatementRegistry::new(Config::default());
        let statement = registry
            .add_statement(
                StatementDefinition::new("purge", vec![NodeDescriptor::text("CALL purge()")])
                    .command_type(SqlCommandType::Delete)
                    .parameter_type("Unit"),
            )
            .unwrap();
        assert_eq!(statement.command_type(), SqlCommandType::Delete);
        assert_eq!(statement.parameter_type(), Some("Unit"));
    }

    #[test]
    fn test_binding_error_carries_statement() {
        let params = Value::map([("user", Value::Null)]);
        let mut registry = StatementRegistry::new(Config::default());
        registry
            .add_statement(StatementDefinition::new(
                "byName",
                vec![NodeDescriptor::text("WHERE name = #{user.name}")],
            ))
            .unwrap();
        let statement = registry.statement("byName").unwrap();
        let bound = statement.compile(&params).unwrap();
        let err = statement.parameter_values(&bound).unwrap_err();
        assert!(matches!(err, Error::Binding { ref statement, .. } if statement == "byName"));
        assert!(!err.is_build_time());
    }

    #[test]
    fn test_evaluation_error_carries_statement() {
        let mut registry = StatementRegistry::new(Config::default());
        registry
            .add_statement(StatementDefinition::new(
                "byIds",
                vec![NodeDescriptor::Foreach {
                    collection: "ids".into(),
                    item: Some("id".into()),
                    index: None,
                    open: "(".into(),
                    close: ")".into(),
                    separator: ",".into(),
                    nullable: false,
                    contents: vec![NodeDescriptor::text("#{id}")],
                }],
            ))
            .unwrap();
        let err = registry
            .compile("byIds", &Value::map([("ids", Value::Null)]))
            .unwrap_err();
        assert!(matches!(err, Error::Evaluation { ref statement, .. } if statement == "byIds"));
    }

    #[test]
    fn test_load_json_document() {
        let mut registry = StatementRegistry::new(Config::default());
        registry
            .load_json(
                r#"{
                    "fragments": [{"id": "base", "body": [{"type": "text", "text": "UPDATE users"}]}],
                    "statements": [{
                        "id": "rename",
                        "parameterType": "User",
                        "body": [
                            {"type": "include", "refid": "base"},
                            {"type": "set", "contents": [{"type": "text", "text": "name = #{name},"}]},
                            {"type": "text", "text": "WHERE id = #{id}"}
                        ]
                    }]
                }"#,
            )
            .unwrap();

        let statement = registry.statement("rename").unwrap();
        assert_eq!(statement.command_type(), SqlCommandType::Update);
        assert!(statement.source().is_dynamic());

        let params = Value::map([("name", Value::from("x")), ("id", Value::from(1))]);
        let bound = statement.compile(&params).unwrap();
        assert_eq!(bound.sql(), "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(registry.statement_ids().collect::<Vec<_>>(), ["rename"]);
    }

    fn procedure(config: Config) -> StatementRegistry {
        let mut registry = StatementRegistry::new(config);
        registry
            .add_statement(StatementDefinition::new(
                "countUsers",
                vec![NodeDescriptor::text(
                    "CALL count_users(#{tenant}, #{total, mode=OUT, jdbcType=INTEGER}, \
                     #{stats.rows, mode=INOUT, jdbcType=INTEGER})",
                )],
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_write_output_parameters() {
        let registry = procedure(Config::default());
        let statement = registry.statement("countUsers").unwrap();
        let mut params = Value::map([("tenant", Value::from("a")), ("stats", Value::Null)]);

        let mappings = statement.compile(&params).unwrap().parameter_mappings().to_vec();
        statement
            .write_output_parameters(&mappings, &mut params, [Value::from(12), Value::from(3)])
            .unwrap();
        assert_eq!(params.to_string(), "{stats={rows=3}, tenant=a, total=12}");
    }

    #[test]
    fn test_write_output_parameters_without_auto_instantiate() {
        let registry = procedure(Config::default().auto_instantiate(false));
        let statement = registry.statement("countUsers").unwrap();
        let mut params = Value::map([("tenant", Value::from("a")), ("stats", Value::Null)]);

        let mappings = statement.compile(&params).unwrap().parameter_mappings().to_vec();
        let err = statement
            .write_output_parameters(&mappings, &mut params, [Value::from(12), Value::from(3)])
            .unwrap_err();
        match err {
            Error::Binding { statement, source } => {
                assert_eq!(statement, "countUsers");
                assert_eq!(source.property, "stats.rows");
                assert!(matches!(
                    source.source,
                    sqlmapper_reflection::ReflectionError::NullIntermediate { .. }
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parameter_type_hint_for_scalar_root() {
        let mut registry = StatementRegistry::new(Config::default());
        registry
            .add_statement(
                StatementDefinition::new("byId", vec![NodeDescriptor::text("WHERE id = #{id}")])
                    .parameter_type("Long"),
            )
            .unwrap();
        let statement = registry.statement("byId").unwrap();
        let id = 9i64;
        let bound = statement.compile(&id).unwrap();
        let values = statement.parameter_values(&bound).unwrap();
        assert_eq!(values[0].java_type.as_deref(), Some("Long"));
    }

    #[test]
    fn test_compile_records_span_attributes() {
        use std::sync::{Arc, Mutex};

        use tracing::field::{Field, Visit};
        use tracing::span::{Id, Record};
        use tracing_subscriber::layer::{Context, SubscriberExt};
        use tracing_subscriber::{Layer, Registry};

        #[derive(Clone, Default)]
        struct RecordedFields(Arc<Mutex<Vec<String>>>);

        struct Names<'v>(&'v mut Vec<String>);

        impl Visit for Names<'_> {
            fn record_debug(&mut self, field: &Field, _: &dyn std::fmt::Debug) {
                self.0.push(field.name().to_string());
            }
        }

        impl<S: tracing::Subscriber> Layer<S> for RecordedFields {
            fn on_record(&self, _: &Id, values: &Record<'_>, _: Context<'_, S>) {
                values.record(&mut Names(&mut self.0.lock().unwrap()));
            }
        }

        let recorded = RecordedFields::default();
        let subscriber = Registry::default().with(recorded.clone());
        tracing::subscriber::with_default(subscriber, || {
            let params = Value::map([("id", 1)]);
            registry().compile("findUser", &params).unwrap();
        });

        let names = recorded.0.lock().unwrap().clone();
        assert_eq!(names, [attributes::PARAMETER_COUNT, attributes::SQL]);
    }
}
