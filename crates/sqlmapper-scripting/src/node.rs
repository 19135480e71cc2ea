//! The statement node tree.
//!
//! A tree is built once per statement and evaluated against a fresh
//! [`DynamicContext`] for every execution. Nodes never change after they are
//! built, so one tree can be shared by any number of threads.

use crate::context::{DynamicContext, Resolved};
use crate::error::{EvalError, GrammarError};
use crate::expression::Expression;
use crate::parameter::ParameterMapping;
use crate::tokenizer::{Fragment, tokenize};

/// A node of a statement tree.
#[derive(Debug, Clone)]
pub enum SqlNode {
    /// Text with placeholders.
    Text(TextNode),
    /// Conditional subtree.
    If(IfNode),
    /// First matching branch.
    Choose(ChooseNode),
    /// Loop over a collection.
    Foreach(ForEachNode),
    /// Prefix, suffix and connector normalization. Also covers `where` and
    /// `set` through [`TrimNode::where_clause`] and [`TrimNode::set_clause`].
    Trim(TrimNode),
    /// Scoped variable declaration.
    Bind(BindNode),
    /// Ordered children sharing one scope frame.
    Mixed(Vec<SqlNode>),
}

impl SqlNode {
    /// Parse text into a text node.
    pub fn text(text: &str) -> Result<Self, GrammarError> {
        TextNode::parse(text).map(Self::Text)
    }

    /// Evaluate the node, appending to the context.
    pub fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<(), EvalError> {
        match self {
            Self::Text(node) => node.apply(ctx),
            Self::If(node) => node.apply(ctx).map(|_| ()),
            Self::Choose(node) => node.apply(ctx),
            Self::Foreach(node) => node.apply(ctx),
            Self::Trim(node) => node.apply(ctx),
            Self::Bind(node) => node.apply(ctx),
            Self::Mixed(children) => ctx.scoped(|ctx| {
                children.iter().try_for_each(|child| child.apply(ctx))
            }),
        }
    }

    /// Check whether the output depends on the parameter object beyond the
    /// values of bound placeholders.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            Self::Text(node) => node.is_dynamic(),
            Self::Mixed(children) => children.iter().any(Self::is_dynamic),
            _ => true,
        }
    }
}

#[derive(Debug, Clone)]
enum TextSegment {
    Literal(String),
    Bound(ParameterMapping),
    Raw(Expression),
}

/// Text with bound placeholders and raw substitutions, tokenized when the
/// node is built.
#[derive(Debug, Clone)]
pub struct TextNode {
    text: String,
    segments: Vec<TextSegment>,
}

impl TextNode {
    /// Tokenize `text`. Error positions are byte offsets into `text`.
    pub fn parse(text: &str) -> Result<Self, GrammarError> {
        let segments = tokenize(text)?
            .into_iter()
            .map(|fragment| match fragment {
                Fragment::Text(literal) => Ok(TextSegment::Literal(literal)),
                Fragment::Bound(token) => ParameterMapping::parse(&token.body)
                    .map(TextSegment::Bound)
                    .map_err(|e| e.offset_by(token.body_position())),
                Fragment::Raw(token) => {
                    let leading = token.body.len() - token.body.trim_start().len();
                    Expression::parse(token.body.trim())
                        .map(TextSegment::Raw)
                        .map_err(|e| e.offset_by(token.body_position() + leading))
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// The text as written.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Check for raw substitutions.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, TextSegment::Raw(_)))
    }

    /// Bound parameters in order of appearance.
    pub fn parameter_mappings(&self) -> impl Iterator<Item = &ParameterMapping> {
        self.segments.iter().filter_map(|segment| match segment {
            TextSegment::Bound(mapping) => Some(mapping),
            _ => None,
        })
    }

    fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<(), EvalError> {
        let mut out = String::with_capacity(self.text.len());
        for segment in &self.segments {
            match segment {
                TextSegment::Literal(literal) => out.push_str(literal),
                TextSegment::Bound(mapping) => out.push_str(&ctx.bind_parameter(mapping)),
                TextSegment::Raw(expression) => {
                    let value = expression.evaluate(ctx)?.to_string();
                    if !ctx.config().allows_substitution(&value) {
                        return Err(EvalError::RejectedSubstitution {
                            expression: expression.source().to_string(),
                            value,
                        });
                    }
                    out.push_str(&value);
                }
            }
        }
        ctx.append_sql(&out);
        Ok(())
    }
}

/// Applies its contents when the test holds.
#[derive(Debug, Clone)]
pub struct IfNode {
    test: Expression,
    contents: Box<SqlNode>,
}

impl IfNode {
    /// Create a conditional node.
    #[must_use]
    pub fn new(test: Expression, contents: SqlNode) -> Self {
        Self {
            test,
            contents: Box::new(contents),
        }
    }

    /// The test expression.
    #[must_use]
    pub fn test(&self) -> &Expression {
        &self.test
    }

    // Returns whether the test held.
    fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<bool, EvalError> {
        if self.test.evaluate_bool(ctx)? {
            self.contents.apply(ctx)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Applies the first `when` branch whose test holds, or `otherwise`.
#[derive(Debug, Clone)]
pub struct ChooseNode {
    when: Vec<IfNode>,
    otherwise: Option<Box<SqlNode>>,
}

impl ChooseNode {
    /// Create a choose node.
    #[must_use]
    pub fn new(when: Vec<IfNode>, otherwise: Option<SqlNode>) -> Self {
        Self {
            when,
            otherwise: otherwise.map(Box::new),
        }
    }

    fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<(), EvalError> {
        for branch in &self.when {
            if branch.apply(ctx)? {
                return Ok(());
            }
        }
        match &self.otherwise {
            Some(otherwise) => otherwise.apply(ctx),
            None => Ok(()),
        }
    }
}

/// Repeats its contents for every element of a collection.
#[derive(Debug, Clone)]
pub struct ForEachNode {
    collection: Expression,
    item: Option<String>,
    index: Option<String>,
    open: String,
    close: String,
    separator: String,
    nullable: bool,
    contents: Box<SqlNode>,
}

impl ForEachNode {
    /// Create a loop over `collection`.
    #[must_use]
    pub fn new(collection: Expression, contents: SqlNode) -> Self {
        Self {
            collection,
            item: None,
            index: None,
            open: String::new(),
            close: String::new(),
            separator: String::new(),
            nullable: false,
            contents: Box::new(contents),
        }
    }

    /// Name bound to each element. For maps this is the entry value.
    #[must_use]
    pub fn item(mut self, name: impl Into<String>) -> Self {
        self.item = Some(name.into());
        self
    }

    /// Name bound to each position. For maps this is the entry key.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Text written before the first element.
    #[must_use]
    pub fn open(mut self, open: impl Into<String>) -> Self {
        self.open = open.into();
        self
    }

    /// Text written after the last element.
    #[must_use]
    pub fn close(mut self, close: impl Into<String>) -> Self {
        self.close = close.into();
        self
    }

    /// Text written between elements.
    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Treat a null collection as empty.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<(), EvalError> {
        let entries = self.collection.evaluate_iterable(ctx, self.nullable)?;
        if entries.is_empty() {
            return Ok(());
        }

        let mut out = self.open.clone();
        let mut first = true;
        for (index, item) in entries {
            let body = ctx.scoped(|ctx| {
                if let Some(name) = &self.index {
                    ctx.bind_item(name, Resolved::Owned(index));
                }
                if let Some(name) = &self.item {
                    ctx.bind_item(name, item);
                }
                ctx.capture(|ctx| self.contents.apply(ctx))
            })?;
            let body = body.trim();
            if body.is_empty() {
                continue;
            }
            if !first {
                out.push_str(&self.separator);
            }
            out.push_str(body);
            first = false;
        }
        out.push_str(&self.close);
        ctx.append_sql(&out);
        Ok(())
    }
}

/// Wraps its contents in a prefix and suffix after stripping dangling
/// connectors.
#[derive(Debug, Clone)]
pub struct TrimNode {
    prefix: Option<String>,
    suffix: Option<String>,
    prefix_overrides: Vec<String>,
    suffix_overrides: Vec<String>,
    contents: Box<SqlNode>,
}

impl TrimNode {
    /// Create a trim node with no prefix, suffix or overrides.
    #[must_use]
    pub fn new(contents: SqlNode) -> Self {
        Self {
            prefix: None,
            suffix: None,
            prefix_overrides: Vec::new(),
            suffix_overrides: Vec::new(),
            contents: Box::new(contents),
        }
    }

    /// `WHERE` followed by the contents, without a leading `AND` or `OR`.
    /// Nothing at all is written when the contents are empty.
    #[must_use]
    pub fn where_clause(contents: SqlNode) -> Self {
        Self::new(contents)
            .prefix("WHERE")
            .prefix_overrides(["AND", "OR"])
    }

    /// `SET` followed by the contents, without a leading or trailing comma.
    /// Nothing at all is written when the contents are empty.
    #[must_use]
    pub fn set_clause(contents: SqlNode) -> Self {
        Self::new(contents)
            .prefix("SET")
            .prefix_overrides([","])
            .suffix_overrides([","])
    }

    /// Text written before non-empty contents.
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into()).filter(|p: &String| !p.trim().is_empty());
        self
    }

    /// Text written after non-empty contents.
    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into()).filter(|s: &String| !s.trim().is_empty());
        self
    }

    /// Tokens removed from the start of the contents.
    #[must_use]
    pub fn prefix_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_overrides = normalize_overrides(overrides);
        self
    }

    /// Tokens removed from the end of the contents.
    #[must_use]
    pub fn suffix_overrides<I, S>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suffix_overrides = normalize_overrides(overrides);
        self
    }

    fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<(), EvalError> {
        let captured = ctx.capture(|ctx| self.contents.apply(ctx))?;
        if let Some(out) = self.wrap(&captured) {
            ctx.append_sql(&out);
        }
        Ok(())
    }

    fn wrap(&self, body: &str) -> Option<String> {
        let mut body = body.trim();
        if let Some(stripped) = self
            .prefix_overrides
            .iter()
            .find_map(|token| strip_leading(body, token))
        {
            body = stripped.trim_start();
        }
        if let Some(stripped) = self
            .suffix_overrides
            .iter()
            .find_map(|token| strip_trailing(body, token))
        {
            body = stripped.trim_end();
        }
        if body.is_empty() {
            return None;
        }

        let mut out = String::with_capacity(body.len() + 16);
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix.trim());
            out.push(' ');
        }
        out.push_str(body);
        if let Some(suffix) = &self.suffix {
            out.push(' ');
            out.push_str(suffix.trim());
        }
        Some(out)
    }
}

/// Split a `|`-separated override list such as `AND |OR`.
#[must_use]
pub fn parse_overrides(list: &str) -> Vec<String> {
    normalize_overrides(list.split('|'))
}

fn normalize_overrides<I, S>(overrides: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    overrides
        .into_iter()
        .map(|token| token.into().trim().to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// Strip `token` from the start of `body`, ignoring ASCII case. A token
// ending in a word character only matches a whole word.
fn strip_leading<'b>(body: &'b str, token: &str) -> Option<&'b str> {
    let head = body.get(..token.len())?;
    if !head.eq_ignore_ascii_case(token) {
        return None;
    }
    let rest = &body[token.len()..];
    let needs_boundary = token.chars().next_back().is_some_and(is_word_char);
    if needs_boundary && rest.chars().next().is_some_and(is_word_char) {
        return None;
    }
    Some(rest)
}

// Strip `token` from the end of `body`, ignoring ASCII case. A token
// starting with a word character only matches a whole word.
fn strip_trailing<'b>(body: &'b str, token: &str) -> Option<&'b str> {
    let split = body.len().checked_sub(token.len())?;
    let tail = body.get(split..)?;
    if !tail.eq_ignore_ascii_case(token) {
        return None;
    }
    let rest = &body[..split];
    let needs_boundary = token.chars().next().is_some_and(is_word_char);
    if needs_boundary && rest.chars().next_back().is_some_and(is_word_char) {
        return None;
    }
    Some(rest)
}

/// Declares a variable for the rest of the enclosing scope.
#[derive(Debug, Clone)]
pub struct BindNode {
    name: String,
    value: Expression,
}

impl BindNode {
    /// Bind `name` to the value of `value`.
    #[must_use]
    pub fn new(name: impl Into<String>, value: Expression) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<(), EvalError> {
        let value = self.value.evaluate_resolved(ctx)?;
        ctx.bind_variable(&self.name, value);
        Ok(())
    }
}
