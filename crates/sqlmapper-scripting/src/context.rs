//! Per-execution evaluation state.

use std::collections::BTreeMap;
use std::fmt;

use sqlmapper_reflection::{Node, Property, ReflectionError, Segment, Value, child};

use crate::config::Config;
use crate::expression::{Lookup, Scope};
use crate::parameter::ParameterMapping;

/// Name bound to the whole parameter object.
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";

/// Name bound to the configured database id.
pub const DATABASE_ID_KEY: &str = "_databaseId";

/// Prefix of synthetic names for loop variables.
pub const ITEM_PREFIX: &str = "__frch_";

/// Prefix of synthetic names for `bind` variables.
pub const BIND_PREFIX: &str = "__bind_";

static NULL: Value = Value::Null;

/// A value either borrowed from the parameter object or owned.
#[derive(Clone)]
pub enum Resolved<'a> {
    /// Borrowed from the parameter object.
    Borrowed(&'a dyn Property),
    /// Computed during evaluation.
    Owned(Value),
}

impl Resolved<'_> {
    /// The value as a property.
    #[must_use]
    pub fn as_property(&self) -> &dyn Property {
        match self {
            Self::Borrowed(p) => *p,
            Self::Owned(value) => value,
        }
    }

    /// Snapshot as an owned value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Borrowed(p) => p.to_value(),
            Self::Owned(value) => value.clone(),
        }
    }
}

impl fmt::Debug for Resolved<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Borrowed(p) => f.debug_tuple("Borrowed").field(&p.to_value()).finish(),
            Self::Owned(value) => f.debug_tuple("Owned").field(value).finish(),
        }
    }
}

/// Resolve a root name against the parameter object.
///
/// A scalar parameter answers for any name, a null parameter yields null
/// and a list parameter is reachable as `list`, `collection` or `array`.
pub fn lookup_root<'a>(root: &'a dyn Property, name: &str) -> Result<&'a dyn Property, ReflectionError> {
    match root.node() {
        Node::Null => Ok(&NULL),
        Node::Scalar(_) => Ok(root),
        Node::Object(_) | Node::Map(_) => child(root, Segment::Property(name)),
        Node::List(_) => match name {
            "list" | "collection" | "array" => Ok(root),
            _ => Err(ReflectionError::NoGetter {
                property: name.to_string(),
                type_name: root.type_name(),
            }),
        },
    }
}

#[derive(Debug)]
struct Binding<'a> {
    value: Resolved<'a>,
    // Name recorded in the additional parameters when a placeholder uses
    // this binding.
    alias: String,
}

type Frame<'a> = BTreeMap<String, Binding<'a>>;

/// Accumulator for one evaluation of a node tree.
///
/// Holds the statement text, the bound parameters in order of appearance
/// and a stack of scope frames over the parameter object.
pub struct DynamicContext<'a> {
    config: &'a Config,
    root: &'a dyn Property,
    sql: String,
    mappings: Vec<ParameterMapping>,
    additional: BTreeMap<String, Resolved<'a>>,
    frames: Vec<Frame<'a>>,
    unique: usize,
}

impl<'a> DynamicContext<'a> {
    /// Create a context for one evaluation against `root`.
    #[must_use]
    pub fn new(config: &'a Config, root: &'a dyn Property) -> Self {
        let mut base = Frame::new();
        base.insert(
            PARAMETER_OBJECT_KEY.to_string(),
            Binding {
                value: Resolved::Borrowed(root),
                alias: PARAMETER_OBJECT_KEY.to_string(),
            },
        );
        base.insert(
            DATABASE_ID_KEY.to_string(),
            Binding {
                value: Resolved::Owned(config.database_id.clone().map_or(Value::Null, Value::Text)),
                alias: DATABASE_ID_KEY.to_string(),
            },
        );
        Self {
            config,
            root,
            sql: String::new(),
            mappings: Vec::new(),
            additional: BTreeMap::new(),
            frames: vec![base],
            unique: 0,
        }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// The parameter object.
    #[must_use]
    pub fn root(&self) -> &'a dyn Property {
        self.root
    }

    /// Text accumulated so far.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bound parameters collected so far, in order of appearance.
    #[must_use]
    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }

    /// Append a piece of statement text, separated from the previous piece
    /// by a single space.
    pub fn append_sql(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(text);
    }

    /// Run `f` with an empty text buffer and return what it appended.
    ///
    /// Parameters bound inside `f` stay in the context.
    pub fn capture<E>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), E>,
    ) -> Result<String, E> {
        let outer = std::mem::take(&mut self.sql);
        let result = f(self);
        let captured = std::mem::replace(&mut self.sql, outer);
        result.map(|()| captured)
    }

    /// Record a bound parameter and return the marker that replaces it.
    ///
    /// A property rooted at a scoped variable is renamed to the variable's
    /// synthetic name, and the variable's value is kept as an additional
    /// parameter so the value can still be resolved after the scope ends.
    pub fn bind_parameter(&mut self, mapping: &ParameterMapping) -> String {
        let mut mapping = mapping.clone();
        if let Some(property) = self.alias_property(&mapping.property) {
            mapping.property = property;
        }
        self.mappings.push(mapping);
        self.config.placeholder.marker(self.mappings.len())
    }

    fn alias_property(&mut self, property: &str) -> Option<String> {
        let root_len = property.find(['.', '[']).unwrap_or(property.len());
        let (root, rest) = property.split_at(root_len);
        let binding = self.frames.iter().rev().find_map(|frame| frame.get(root))?;
        self.additional
            .entry(binding.alias.clone())
            .or_insert_with(|| binding.value.clone());
        Some(format!("{}{rest}", binding.alias))
    }

    /// Open a scope frame.
    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Close the innermost scope frame. The base frame is never removed.
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Run `f` inside a new scope frame.
    pub fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.push_frame();
        let result = f(self);
        self.pop_frame();
        result
    }

    /// Bind a loop variable in the innermost frame.
    pub fn bind_item(&mut self, name: &str, value: Resolved<'a>) {
        self.bind_with_prefix(ITEM_PREFIX, name, value);
    }

    /// Bind a `bind` variable in the innermost frame.
    pub fn bind_variable(&mut self, name: &str, value: Resolved<'a>) {
        self.bind_with_prefix(BIND_PREFIX, name, value);
    }

    fn bind_with_prefix(&mut self, prefix: &str, name: &str, value: Resolved<'a>) {
        let alias = format!("{prefix}{name}_{}", self.next_unique());
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), Binding { value, alias });
        }
    }

    /// Next value of the per-evaluation counter.
    pub fn next_unique(&mut self) -> usize {
        let n = self.unique;
        self.unique += 1;
        n
    }

    /// Consume the context, returning the text, the bound parameters and
    /// the additional parameters.
    #[must_use]
    pub fn into_parts(
        self,
    ) -> (
        String,
        Vec<ParameterMapping>,
        BTreeMap<String, Resolved<'a>>,
    ) {
        (self.sql, self.mappings, self.additional)
    }
}

impl<'a> Scope<'a> for DynamicContext<'a> {
    fn lookup<'s>(&'s self, name: &str) -> Result<Lookup<'s, 'a>, ReflectionError> {
        for frame in self.frames.iter().rev() {
            if let Some(binding) = frame.get(name) {
                return Ok(match &binding.value {
                    Resolved::Borrowed(p) => Lookup::Shared(*p),
                    Resolved::Owned(value) => Lookup::Local(value),
                });
            }
        }
        lookup_root(self.root, name).map(Lookup::Shared)
    }
}

impl fmt::Debug for DynamicContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicContext")
            .field("sql", &self.sql)
            .field("mappings", &self.mappings.len())
            .field("frames", &self.frames.len())
            .finish_non_exhaustive()
    }
}
