//! # sqlmapper-scripting
//!
//! Dynamic statement compiler and parameter binding engine.
//!
//! Statement templates mix SQL text with `#{...}` bound placeholders,
//! `${...}` raw substitutions and conditional nodes (`if`, `choose`,
//! `foreach`, `trim`, `where`, `set`, `bind`). Templates are parsed once when a
//! statement is registered; compiling a statement evaluates its node tree
//! against a parameter object and yields the final text together with the
//! bound parameters in marker order.
//!
//! ## Features
//!
//! - **Strict placeholder grammar**: unknown attributes, empty or unterminated
//!   placeholders and malformed expressions fail at registration, with the
//!   statement id and a byte position.
//! - **Ordered parameters**: every marker in the output has exactly one
//!   [`ParameterMapping`], including those produced by loops.
//! - **Shareable statements**: a [`StatementRegistry`] is immutable after it
//!   is built and can be used from many threads at once.
//! - **Cached property access**: parameter objects are read through
//!   `sqlmapper-reflection`, which builds accessors once per type.
//!
//! ## Example
//!
//! ```rust
//! use sqlmapper_reflection::Value;
//! use sqlmapper_scripting::{Config, StatementRegistry};
//!
//! let mut registry = StatementRegistry::new(Config::from_settings_string("Placeholder=$1")?);
//! registry.load_json(
//!     r##"{"statements": [{
//!         "id": "findUsers",
//!         "body": [
//!             {"type": "text", "text": "SELECT * FROM users"},
//!             {"type": "where", "contents": [
//!                 {"type": "if", "test": "name != null", "contents": [
//!                     {"type": "text", "text": "AND name = #{name}"}
//!                 ]},
//!                 {"type": "foreach", "collection": "ids", "item": "id",
//!                  "open": "AND id IN (", "close": ")", "separator": ", ",
//!                  "nullable": true,
//!                  "contents": [{"type": "text", "text": "#{id}"}]}
//!             ]}
//!         ]
//!     }]}"##,
//! )?;
//!
//! let params = Value::map([("ids", Value::list([4, 5]))]);
//! let bound = registry.compile("findUsers", &params)?;
//! assert_eq!(bound.sql(), "SELECT * FROM users WHERE id IN ($1, $2)");
//!
//! let values: Vec<Value> = bound.parameter_values()?.into_iter().map(|p| p.value).collect();
//! assert_eq!(values, [Value::Int(4), Value::Int(5)]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod builder;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod instrumentation;
pub mod jdbc_type;
pub mod node;
pub mod parameter;
pub mod registry;
pub mod source;
pub mod tokenizer;

// Re-export commonly used types
pub use builder::{Fragments, NodeDescriptor, ScriptBuilder, WhenDescriptor};
pub use config::{Config, PlaceholderStyle};
pub use context::DynamicContext;
pub use error::{BindingError, Error, EvalError, GrammarError, Result};
pub use expression::Expression;
pub use instrumentation::SqlCommandType;
pub use jdbc_type::{JdbcType, ParameterMode};
pub use node::SqlNode;
pub use parameter::ParameterMapping;
pub use registry::{
    FragmentDefinition, MappedStatement, MapperDocument, StatementDefinition, StatementRegistry,
};
pub use source::{BoundParameter, BoundSql, SqlSource};
