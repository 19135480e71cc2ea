//! Building node trees from serializable descriptors.
//!
//! Statements are described as a list of [`NodeDescriptor`]s, usually decoded
//! from JSON:
//!
//! ```json
//! [
//!   { "type": "text", "text": "SELECT * FROM users" },
//!   { "type": "where", "contents": [
//!     { "type": "if", "test": "name != null", "contents": [
//!       { "type": "text", "text": "AND name = #{name}" }
//!     ] }
//!   ] }
//! ]
//! ```
//!
//! Every template is tokenized and every expression parsed while building, so
//! grammar errors surface before the first execution.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{Error, GrammarError, Result};
use crate::expression::Expression;
use crate::node::{
    BindNode, ChooseNode, ForEachNode, IfNode, SqlNode, TrimNode, parse_overrides,
};
use crate::source::SqlSource;

/// Reusable fragments by id.
pub type Fragments = BTreeMap<String, Vec<NodeDescriptor>>;

static NO_FRAGMENTS: Fragments = BTreeMap::new();

/// One node of a statement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum NodeDescriptor {
    /// Template text with `#{}` and `${}` placeholders.
    Text {
        /// The template.
        text: String,
    },
    /// Conditional contents.
    If {
        /// Test expression.
        test: String,
        /// Nodes applied when the test holds.
        #[serde(default)]
        contents: Vec<NodeDescriptor>,
    },
    /// First matching branch.
    Choose {
        /// Branches in order.
        #[serde(default)]
        when: Vec<WhenDescriptor>,
        /// Nodes applied when no branch matches.
        #[serde(default)]
        otherwise: Option<Vec<NodeDescriptor>>,
    },
    /// Loop over a collection.
    Foreach {
        /// Collection expression.
        collection: String,
        /// Name bound to each element.
        #[serde(default)]
        item: Option<String>,
        /// Name bound to each position or key.
        #[serde(default)]
        index: Option<String>,
        /// Text before the first element.
        #[serde(default)]
        open: String,
        /// Text after the last element.
        #[serde(default)]
        close: String,
        /// Text between elements.
        #[serde(default)]
        separator: String,
        /// Treat a null collection as empty.
        #[serde(default)]
        nullable: bool,
        /// Loop body.
        #[serde(default)]
        contents: Vec<NodeDescriptor>,
    },
    /// Prefix, suffix and override normalization.
    Trim {
        /// Text written before non-empty contents.
        #[serde(default)]
        prefix: Option<String>,
        /// Text written after non-empty contents.
        #[serde(default)]
        suffix: Option<String>,
        /// `|`-separated tokens removed from the start.
        #[serde(default)]
        prefix_overrides: Option<String>,
        /// `|`-separated tokens removed from the end.
        #[serde(default)]
        suffix_overrides: Option<String>,
        /// Wrapped nodes.
        #[serde(default)]
        contents: Vec<NodeDescriptor>,
    },
    /// `WHERE` clause.
    Where {
        /// Wrapped nodes.
        #[serde(default)]
        contents: Vec<NodeDescriptor>,
    },
    /// `SET` clause.
    Set {
        /// Wrapped nodes.
        #[serde(default)]
        contents: Vec<NodeDescriptor>,
    },
    /// Scoped variable.
    Bind {
        /// Variable name.
        name: String,
        /// Value expression.
        value: String,
    },
    /// Reference to a registered fragment, spliced in at build time.
    Include {
        /// Fragment id.
        refid: String,
    },
}

/// A `when` branch of a choose node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhenDescriptor {
    /// Test expression.
    pub test: String,
    /// Nodes applied when the test holds.
    #[serde(default)]
    pub contents: Vec<NodeDescriptor>,
}

impl NodeDescriptor {
    /// A text node.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Decode a statement body from JSON.
    pub fn parse_body(json: &str) -> Result<Vec<Self>> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Builds node trees and sources for one statement.
#[derive(Debug, Clone, Copy)]
pub struct ScriptBuilder<'r> {
    statement: &'r str,
    config: &'r Config,
    fragments: &'r Fragments,
}

impl<'r> ScriptBuilder<'r> {
    /// Create a builder for the statement `statement`. Errors carry this id.
    #[must_use]
    pub fn new(statement: &'r str, config: &'r Config) -> Self {
        Self {
            statement,
            config,
            fragments: &NO_FRAGMENTS,
        }
    }

    /// Resolve includes against `fragments`.
    #[must_use]
    pub fn fragments(mut self, fragments: &'r Fragments) -> Self {
        self.fragments = fragments;
        self
    }

    /// Build the node tree of `body`.
    pub fn build_node(&self, body: &[NodeDescriptor]) -> Result<SqlNode> {
        self.build_all(body, &mut Vec::new()).map(SqlNode::Mixed)
    }

    /// Build the source of `body`, resolving it once when nothing in it
    /// depends on the parameter object.
    pub fn build_source(&self, body: &[NodeDescriptor]) -> Result<SqlSource> {
        let root = self.build_node(body)?;
        SqlSource::new(root, self.config).map_err(|source| Error::Evaluation {
            statement: self.statement.to_string(),
            source,
        })
    }

    fn build_all(&self, body: &[NodeDescriptor], includes: &mut Vec<String>) -> Result<Vec<SqlNode>> {
        let mut nodes = Vec::with_capacity(body.len());
        for descriptor in body {
            self.build(descriptor, includes, &mut nodes)?;
        }
        Ok(nodes)
    }

    fn contents(&self, body: &[NodeDescriptor], includes: &mut Vec<String>) -> Result<SqlNode> {
        self.build_all(body, includes).map(SqlNode::Mixed)
    }

    fn build(
        &self,
        descriptor: &NodeDescriptor,
        includes: &mut Vec<String>,
        out: &mut Vec<SqlNode>,
    ) -> Result<()> {
        let node = match descriptor {
            NodeDescriptor::Text { text } => SqlNode::text(text).map_err(|e| self.grammar(e))?,
            NodeDescriptor::If { test, contents } => SqlNode::If(IfNode::new(
                self.expression(test)?,
                self.contents(contents, includes)?,
            )),
            NodeDescriptor::Choose { when, otherwise } => {
                let branches = when
                    .iter()
                    .map(|branch| {
                        Ok(IfNode::new(
                            self.expression(&branch.test)?,
                            self.contents(&branch.contents, includes)?,
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let otherwise = otherwise
                    .as_deref()
                    .map(|body| self.contents(body, includes))
                    .transpose()?;
                SqlNode::Choose(ChooseNode::new(branches, otherwise))
            }
            NodeDescriptor::Foreach {
                collection,
                item,
                index,
                open,
                close,
                separator,
                nullable,
                contents,
            } => {
                let mut node =
                    ForEachNode::new(self.expression(collection)?, self.contents(contents, includes)?)
                        .open(open.as_str())
                        .close(close.as_str())
                        .separator(separator.as_str())
                        .nullable(*nullable);
                if let Some(item) = item {
                    node = node.item(item.as_str());
                }
                if let Some(index) = index {
                    node = node.index(index.as_str());
                }
                SqlNode::Foreach(node)
            }
            NodeDescriptor::Trim {
                prefix,
                suffix,
                prefix_overrides,
                suffix_overrides,
                contents,
            } => {
                let mut node = TrimNode::new(self.contents(contents, includes)?);
                if let Some(prefix) = prefix {
                    node = node.prefix(prefix.as_str());
                }
                if let Some(suffix) = suffix {
                    node = node.suffix(suffix.as_str());
                }
                if let Some(list) = prefix_overrides {
                    node = node.prefix_overrides(parse_overrides(list));
                }
                if let Some(list) = suffix_overrides {
                    node = node.suffix_overrides(parse_overrides(list));
                }
                SqlNode::Trim(node)
            }
            NodeDescriptor::Where { contents } => {
                SqlNode::Trim(TrimNode::where_clause(self.contents(contents, includes)?))
            }
            NodeDescriptor::Set { contents } => {
                SqlNode::Trim(TrimNode::set_clause(self.contents(contents, includes)?))
            }
            NodeDescriptor::Bind { name, value } => {
                SqlNode::Bind(BindNode::new(name.as_str(), self.expression(value)?))
            }
            NodeDescriptor::Include { refid } => {
                if includes.iter().any(|id| id == refid) {
                    return Err(Error::CircularInclude {
                        statement: self.statement.to_string(),
                        refid: refid.clone(),
                    });
                }
                let fragment = self.fragments.get(refid).ok_or_else(|| Error::UnknownFragment {
                    statement: self.statement.to_string(),
                    refid: refid.clone(),
                })?;
                includes.push(refid.clone());
                let spliced = self.build_all(fragment, includes);
                includes.pop();
                out.extend(spliced?);
                return Ok(());
            }
        };
        out.push(node);
        Ok(())
    }

    fn expression(&self, source: &str) -> Result<Expression> {
        Expression::parse(source).map_err(|e| self.grammar(e))
    }

    fn grammar(&self, source: GrammarError) -> Error {
        Error::Grammar {
            statement: self.statement.to_string(),
            source,
        }
    }
}
