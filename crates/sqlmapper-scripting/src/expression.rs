//! Test, collection and bind expressions.
//!
//! The language is deliberately small. From lowest to highest precedence:
//!
//! | Level      | Forms                                                       |
//! |------------|-------------------------------------------------------------|
//! | or         | `a or b`, `a \|\| b`                                         |
//! | and        | `a and b`, `a && b`                                         |
//! | not        | `not a`, `!a`                                               |
//! | comparison | `==` `!=` `<` `<=` `>` `>=`, `eq` `neq` `lt` `lte` `gt` `gte` |
//! | additive   | `a + b` (numeric addition or text concatenation)            |
//! | unary      | `-a`                                                        |
//! | primary    | literals, `( ... )`, paths like `a.b[0]['k'][i].size()`     |
//!
//! Expressions are parsed once when a statement is built and evaluated
//! against a [`Scope`] for every execution.

use std::cmp::Ordering;
use std::fmt;

use sqlmapper_reflection::{Node, Property, ReflectionError, Segment, Value, child};

use crate::context::Resolved;
use crate::error::{EvalError, GrammarError};

/// Names visible to an expression.
///
/// `'a` is the lifetime of the parameter object. Values borrowed from it
/// are returned as [`Lookup::Shared`] so they can outlive the scope.
pub trait Scope<'a> {
    /// Resolve a root name.
    fn lookup<'s>(&'s self, name: &str) -> Result<Lookup<'s, 'a>, ReflectionError>;
}

/// A property reached while resolving a path.
#[derive(Clone, Copy)]
pub enum Lookup<'s, 'a> {
    /// Borrowed from the parameter object.
    Shared(&'a dyn Property),
    /// Borrowed from a value owned by the scope.
    Local(&'s dyn Property),
}

impl<'s, 'a> Lookup<'s, 'a> {
    /// The property itself.
    #[must_use]
    pub fn property(&self) -> &dyn Property {
        match self {
            Self::Shared(p) => *p,
            Self::Local(p) => *p,
        }
    }

    fn step(self, segment: Segment<'_>) -> Result<Self, ReflectionError> {
        Ok(match self {
            Self::Shared(p) => Self::Shared(child(p, segment)?),
            Self::Local(p) => Self::Local(child(p, segment)?),
        })
    }

    /// Detach from the scope, copying local values.
    #[must_use]
    pub fn into_resolved(self) -> Resolved<'a> {
        match self {
            Self::Shared(p) => Resolved::Borrowed(p),
            Self::Local(p) => Resolved::Owned(p.to_value()),
        }
    }
}

/// Zero-argument methods callable at the end of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Size,
    Length,
    IsEmpty,
    Trim,
}

impl Method {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "size" => Some(Self::Size),
            "length" => Some(Self::Length),
            "isEmpty" => Some(Self::IsEmpty),
            "trim" => Some(Self::Trim),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Length => "length",
            Self::IsEmpty => "isEmpty",
            Self::Trim => "trim",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone)]
enum Step {
    Property(String),
    Index(Expr),
}

#[derive(Debug, Clone)]
struct PathExpr {
    root: String,
    steps: Vec<Step>,
    methods: Vec<Method>,
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(Value),
    Path(PathExpr),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
}

/// A parsed expression.
///
/// ```
/// use sqlmapper_scripting::Expression;
///
/// let test = Expression::parse("name != null and name.trim().length() > 0")?;
/// assert_eq!(test.source(), "name != null and name.trim().length() > 0");
/// # Ok::<(), sqlmapper_scripting::GrammarError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parse an expression.
    pub fn parse(source: &str) -> Result<Self, GrammarError> {
        let tokens = lex(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
        };
        let root = parser.or()?;
        match parser.peek() {
            Tok::End => Ok(Self {
                source: source.to_string(),
                root,
            }),
            _ => Err(parser.error_here("unexpected trailing input")),
        }
    }

    /// The expression text as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check whether the expression is a bare property path, such as
    /// `user.name` or `items[0]`.
    #[must_use]
    pub fn is_path(&self) -> bool {
        matches!(&self.root, Expr::Path(path) if path.methods.is_empty())
    }

    /// Evaluate to a value.
    pub fn evaluate<'a>(&self, scope: &dyn Scope<'a>) -> Result<Value, EvalError> {
        self.eval(&self.root, scope)
    }

    /// Evaluate and apply truthiness: booleans as-is, numbers when
    /// non-zero, null is false and anything else is true.
    pub fn evaluate_bool<'a>(&self, scope: &dyn Scope<'a>) -> Result<bool, EvalError> {
        Ok(truthy(&self.evaluate(scope)?))
    }

    /// Evaluate without copying values borrowed from the parameter object.
    pub fn evaluate_resolved<'a>(&self, scope: &dyn Scope<'a>) -> Result<Resolved<'a>, EvalError> {
        match &self.root {
            Expr::Path(path) if path.methods.is_empty() => {
                Ok(self.resolve(path, scope)?.into_resolved())
            }
            other => self.eval(other, scope).map(Resolved::Owned),
        }
    }

    /// Evaluate a loop collection into `(index, item)` pairs.
    ///
    /// Lists yield their positions as indexes; maps yield their keys in
    /// sorted order. A null collection is empty when `nullable` is set and
    /// an error otherwise.
    pub fn evaluate_iterable<'a>(
        &self,
        scope: &dyn Scope<'a>,
        nullable: bool,
    ) -> Result<Vec<(Value, Resolved<'a>)>, EvalError> {
        match self.evaluate_resolved(scope)? {
            Resolved::Borrowed(collection) => Ok(self
                .entries(collection, nullable)?
                .into_iter()
                .map(|(index, item)| (index, Resolved::Borrowed(item)))
                .collect()),
            Resolved::Owned(collection) => Ok(self
                .entries(&collection, nullable)?
                .into_iter()
                .map(|(index, item)| (index, Resolved::Owned(item.to_value())))
                .collect()),
        }
    }

    fn entries<'p>(
        &self,
        collection: &'p dyn Property,
        nullable: bool,
    ) -> Result<Vec<(Value, &'p dyn Property)>, EvalError> {
        match collection.node() {
            Node::Null if nullable => Ok(Vec::new()),
            Node::Null => Err(EvalError::NullCollection {
                expression: self.source.clone(),
            }),
            Node::List(list) => Ok((0..list.len())
                .filter_map(|i| {
                    let index = i64::try_from(i).ok()?;
                    Some((Value::Int(index), list.item(i)?))
                })
                .collect()),
            Node::Map(map) => Ok(map
                .sorted_keys()
                .into_iter()
                .filter_map(|key| {
                    let item = map.lookup(&key)?;
                    Some((Value::Text(key), item))
                })
                .collect()),
            Node::Scalar(_) | Node::Object(_) => Err(EvalError::NotIterable {
                expression: self.source.clone(),
                actual: collection.type_name(),
            }),
        }
    }

    fn eval<'a>(&self, expr: &Expr, scope: &dyn Scope<'a>) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Path(path) => {
                let found = self.resolve(path, scope)?;
                let Some((first, rest)) = path.methods.split_first() else {
                    return Ok(found.property().to_value());
                };
                let mut value = self.call(*first, found.property())?;
                for method in rest {
                    value = self.call(*method, &value)?;
                }
                Ok(value)
            }
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&self.eval(inner, scope)?))),
            Expr::Neg(inner) => {
                let value = self.eval(inner, scope)?;
                negate(&value).ok_or_else(|| EvalError::InvalidOperands {
                    expression: self.source.clone(),
                    operator: "-",
                    left: "nothing",
                    right: value.type_name(),
                })
            }
            Expr::And(left, right) => Ok(Value::Bool(
                truthy(&self.eval(left, scope)?) && truthy(&self.eval(right, scope)?),
            )),
            Expr::Or(left, right) => Ok(Value::Bool(
                truthy(&self.eval(left, scope)?) || truthy(&self.eval(right, scope)?),
            )),
            Expr::Compare(op, left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.compare(*op, &left, &right).map(Value::Bool)
            }
            Expr::Add(left, right) => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                add(&left, &right).ok_or_else(|| EvalError::InvalidOperands {
                    expression: self.source.clone(),
                    operator: "+",
                    left: left.type_name(),
                    right: right.type_name(),
                })
            }
        }
    }

    fn resolve<'s, 'a>(
        &self,
        path: &PathExpr,
        scope: &'s dyn Scope<'a>,
    ) -> Result<Lookup<'s, 'a>, EvalError> {
        let property_error = |source| EvalError::Property {
            expression: self.source.clone(),
            source,
        };

        let mut current = scope.lookup(&path.root).map_err(property_error)?;
        for step in &path.steps {
            current = match step {
                Step::Property(name) => current.step(Segment::Property(name)),
                Step::Index(index) => {
                    let key = match self.eval(index, scope)? {
                        Value::Int(i) => i.to_string(),
                        Value::Text(s) => s,
                        other => {
                            return Err(EvalError::InvalidIndex {
                                expression: self.source.clone(),
                                actual: other.type_name(),
                            });
                        }
                    };
                    current.step(Segment::Index(&key))
                }
            }
            .map_err(property_error)?;
        }
        Ok(current)
    }

    fn call(&self, method: Method, receiver: &dyn Property) -> Result<Value, EvalError> {
        let count = |n: usize| Value::Int(i64::try_from(n).unwrap_or(i64::MAX));
        let result = match (method, receiver.node()) {
            (Method::Size | Method::Length, Node::List(list)) => Some(count(list.len())),
            (Method::Size, Node::Map(map)) => Some(count(map.len())),
            (Method::IsEmpty, Node::List(list)) => Some(Value::Bool(list.is_empty())),
            (Method::IsEmpty, Node::Map(map)) => Some(Value::Bool(map.is_empty())),
            (method, Node::Scalar(Value::Text(text))) => Some(match method {
                Method::Size | Method::Length => count(text.chars().count()),
                Method::IsEmpty => Value::Bool(text.is_empty()),
                Method::Trim => Value::Text(text.trim().to_string()),
            }),
            _ => None,
        };
        result.ok_or_else(|| EvalError::UnsupportedMethod {
            expression: self.source.clone(),
            method: method.name().to_string(),
            receiver: receiver.type_name(),
        })
    }

    fn compare(&self, op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
        match op {
            CompareOp::Eq => return Ok(loose_eq(left, right)),
            CompareOp::Ne => return Ok(!loose_eq(left, right)),
            _ => {}
        }
        let ordering = order(left, right).ok_or_else(|| EvalError::InvalidOperands {
            expression: self.source.clone(),
            operator: op.symbol(),
            left: left.type_name(),
            right: right.type_name(),
        })?;
        Ok(match op {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
            CompareOp::Eq | CompareOp::Ne => false,
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Truthiness used by `if` and `when` tests.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        #[cfg(feature = "decimal")]
        Value::Decimal(d) => !d.is_zero(),
        _ => true,
    }
}

// Numeric view of a value; numeric text counts when the other side of a
// comparison is a number.
fn numeric(value: &Value) -> Option<Value> {
    if value.is_numeric() {
        return Some(value.clone());
    }
    let text = value.as_str()?.trim();
    if let Ok(i) = text.parse::<i64>() {
        return Some(Value::Int(i));
    }
    parse_decimal(text).or_else(|| text.parse::<f64>().ok().map(Value::Float))
}

#[cfg(feature = "decimal")]
fn parse_decimal(text: &str) -> Option<Value> {
    text.parse::<rust_decimal::Decimal>().ok().map(Value::Decimal)
}

#[cfg(not(feature = "decimal"))]
fn parse_decimal(_text: &str) -> Option<Value> {
    None
}

fn compare_numbers(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        #[cfg(feature = "decimal")]
        (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
        #[cfg(feature = "decimal")]
        (Value::Decimal(a), Value::Int(b)) => Some(a.cmp(&rust_decimal::Decimal::from(*b))),
        #[cfg(feature = "decimal")]
        (Value::Int(a), Value::Decimal(b)) => Some(rust_decimal::Decimal::from(*a).cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    if left.is_numeric() || right.is_numeric() {
        return match (numeric(left), numeric(right)) {
            (Some(l), Some(r)) => compare_numbers(&l, &r) == Some(Ordering::Equal),
            _ => false,
        };
    }
    left == right
}

fn order(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_numeric() || right.is_numeric() {
        return compare_numbers(&numeric(left)?, &numeric(right)?);
    }
    match (left, right) {
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        #[cfg(feature = "chrono")]
        (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
        #[cfg(feature = "chrono")]
        (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
        #[cfg(feature = "chrono")]
        (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn add(left: &Value, right: &Value) -> Option<Value> {
    match (left, right) {
        (Value::Text(_), _) | (_, Value::Text(_)) => Some(Value::Text(format!("{left}{right}"))),
        (Value::Int(a), Value::Int(b)) => Some(
            a.checked_add(*b)
                .map_or_else(|| Value::Float(*a as f64 + *b as f64), Value::Int),
        ),
        #[cfg(feature = "decimal")]
        (Value::Decimal(a), Value::Decimal(b)) => a.checked_add(*b).map(Value::Decimal),
        #[cfg(feature = "decimal")]
        (Value::Decimal(a), Value::Int(b)) | (Value::Int(b), Value::Decimal(a)) => {
            a.checked_add(rust_decimal::Decimal::from(*b)).map(Value::Decimal)
        }
        _ if left.is_numeric() && right.is_numeric() => {
            Some(Value::Float(left.as_f64()? + right.as_f64()?))
        }
        _ => None,
    }
}

fn negate(value: &Value) -> Option<Value> {
    match value {
        Value::Int(i) => Some(
            i.checked_neg()
                .map_or_else(|| Value::Float(-(*i as f64)), Value::Int),
        ),
        Value::Float(f) => Some(Value::Float(-f)),
        #[cfg(feature = "decimal")]
        Value::Decimal(d) => Some(Value::Decimal(-*d)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Sym(&'static str),
    End,
}

const SYMBOLS: &[&str] = &[
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "(", ")", "[", "]", ".",
];

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "eq", "neq", "lt", "lte", "gt", "gte",
];

fn lex(source: &str) -> Result<Vec<(Tok, usize)>, GrammarError> {
    let error = |position, reason: &str| GrammarError::InvalidExpression {
        fragment: source.to_string(),
        position,
        reason: reason.to_string(),
    };

    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let mut end = start;
            while let Some(&(i, c)) = chars.peek() {
                if !(c.is_alphanumeric() || c == '_' || c == '$') {
                    break;
                }
                end = i + c.len_utf8();
                chars.next();
            }
            tokens.push((Tok::Ident(source[start..end].to_string()), start));
            continue;
        }

        if c.is_ascii_digit() {
            let rest = &source[start..];
            let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            let frac_len = match rest.as_bytes().get(int_len) {
                Some(b'.') if rest.as_bytes().get(int_len + 1).is_some_and(u8::is_ascii_digit) => {
                    1 + rest[int_len + 1..]
                        .bytes()
                        .take_while(u8::is_ascii_digit)
                        .count()
                }
                _ => 0,
            };
            let text = &rest[..int_len + frac_len];
            let token = if frac_len > 0 {
                text.parse()
                    .map(Tok::Float)
                    .map_err(|_| error(start, "invalid number"))?
            } else {
                text.parse()
                    .map(Tok::Int)
                    .map_err(|_| error(start, "integer literal out of range"))?
            };
            tokens.push((token, start));
            for _ in 0..text.len() {
                chars.next();
            }
            continue;
        }

        if c == '\'' || c == '"' {
            let quote = c;
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    c if c == quote => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, 't')) => text.push('\t'),
                        Some((_, 'r')) => text.push('\r'),
                        Some((_, other)) => text.push(other),
                        None => break,
                    },
                    c => text.push(c),
                }
            }
            if !closed {
                return Err(error(start, "unterminated string literal"));
            }
            tokens.push((Tok::Str(text), start));
            continue;
        }

        let rest = &source[start..];
        let Some(symbol) = SYMBOLS.iter().find(|s| rest.starts_with(**s)) else {
            let reason = match c {
                '=' => "use '==' for comparison",
                '&' | '|' => "use '&&' and '||' for logical operators",
                _ => "unexpected character",
            };
            return Err(error(start, reason));
        };
        tokens.push((Tok::Sym(symbol), start));
        for _ in 0..symbol.len() {
            chars.next();
        }
    }

    tokens.push((Tok::End, source.len()));
    Ok(tokens)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> &Tok {
        self.tokens.get(self.pos).map_or(&Tok::End, |(tok, _)| tok)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.source.len(), |(_, pos)| *pos)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error_here(&self, reason: &str) -> GrammarError {
        GrammarError::InvalidExpression {
            fragment: self.source.to_string(),
            position: self.position(),
            reason: reason.to_string(),
        }
    }

    fn eat_sym(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Tok::Sym(s) if *s == symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Tok::Ident(w) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, symbol: &str) -> Result<(), GrammarError> {
        if self.eat_sym(symbol) {
            Ok(())
        } else {
            Err(self.error_here(&format!("expected '{symbol}'")))
        }
    }

    fn or(&mut self) -> Result<Expr, GrammarError> {
        let mut left = self.and()?;
        while self.eat_sym("||") || self.eat_word("or") {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, GrammarError> {
        let mut left = self.not()?;
        while self.eat_sym("&&") || self.eat_word("and") {
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, GrammarError> {
        if self.eat_sym("!") || self.eat_word("not") {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, GrammarError> {
        let left = self.additive()?;
        let op = match self.peek() {
            Tok::Sym("==") => CompareOp::Eq,
            Tok::Sym("!=") => CompareOp::Ne,
            Tok::Sym("<") => CompareOp::Lt,
            Tok::Sym("<=") => CompareOp::Le,
            Tok::Sym(">") => CompareOp::Gt,
            Tok::Sym(">=") => CompareOp::Ge,
            Tok::Ident(word) => match word.as_str() {
                "eq" => CompareOp::Eq,
                "neq" => CompareOp::Ne,
                "lt" => CompareOp::Lt,
                "lte" => CompareOp::Le,
                "gt" => CompareOp::Gt,
                "gte" => CompareOp::Ge,
                _ => return Ok(left),
            },
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, GrammarError> {
        let mut left = self.unary()?;
        while self.eat_sym("+") {
            let right = self.unary()?;
            left = Expr::Add(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, GrammarError> {
        if self.eat_sym("-") {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, GrammarError> {
        let start = self.position();
        match self.advance() {
            Tok::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Tok::Float(f) => Ok(Expr::Literal(Value::Float(f))),
            Tok::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            Tok::Sym("(") => {
                let inner = self.or()?;
                self.expect_sym(")")?;
                Ok(inner)
            }
            Tok::Ident(word) => match word.as_str() {
                "null" => Ok(Expr::Literal(Value::Null)),
                "true" => Ok(Expr::Literal(Value::Bool(true))),
                "false" => Ok(Expr::Literal(Value::Bool(false))),
                w if KEYWORDS.contains(&w) => {
                    self.pos -= 1;
                    Err(self.error_here(&format!("unexpected keyword '{w}'")))
                }
                _ => self.path(word, start).map(Expr::Path),
            },
            Tok::End => Err(self.error_here("unexpected end of expression")),
            Tok::Sym(symbol) => {
                self.pos -= 1;
                Err(self.error_here(&format!("unexpected '{symbol}'")))
            }
        }
    }

    fn path(&mut self, root: String, start: usize) -> Result<PathExpr, GrammarError> {
        if matches!(self.peek(), Tok::Sym("(")) {
            return Err(GrammarError::InvalidExpression {
                fragment: self.source.to_string(),
                position: start,
                reason: format!("function '{root}()' is not supported"),
            });
        }

        let mut path = PathExpr {
            root,
            steps: Vec::new(),
            methods: Vec::new(),
        };
        loop {
            if self.eat_sym(".") {
                let name_pos = self.position();
                let Tok::Ident(name) = self.advance() else {
                    self.pos -= 1;
                    return Err(self.error_here("expected a property name after '.'"));
                };
                if self.eat_sym("(") {
                    self.expect_sym(")")?;
                    path.methods.push(Method::from_name(&name).ok_or_else(|| {
                        GrammarError::InvalidExpression {
                            fragment: self.source.to_string(),
                            position: name_pos,
                            reason: format!("method '{name}()' is not supported"),
                        }
                    })?);
                } else if !path.methods.is_empty() {
                    return Err(GrammarError::InvalidExpression {
                        fragment: self.source.to_string(),
                        position: name_pos,
                        reason: "a property cannot follow a method call".to_string(),
                    });
                } else {
                    path.steps.push(Step::Property(name));
                }
            } else if path.methods.is_empty() && self.eat_sym("[") {
                let index = self.or()?;
                self.expect_sym("]")?;
                path.steps.push(Step::Index(index));
            } else {
                break;
            }
        }
        Ok(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct MapScope(Value);

    impl<'a> Scope<'a> for MapScope {
        fn lookup<'s>(&'s self, name: &str) -> Result<Lookup<'s, 'a>, ReflectionError> {
            child(&self.0, Segment::Property(name)).map(Lookup::Local)
        }
    }

    fn scope() -> MapScope {
        MapScope(Value::map([
            ("age", Value::from(21)),
            ("name", Value::from("  alice ")),
            ("nothing", Value::Null),
            ("ids", Value::list([1, 2, 3])),
            ("empty", Value::list(Vec::<i64>::new())),
            ("price", Value::from(2.5)),
            ("code", Value::from("42")),
            ("flags", Value::map([("active", true)])),
            ("key", Value::from("active")),
            ("user", Value::map([("name", Value::from("bob"))])),
        ]))
    }

    fn eval(source: &str) -> Value {
        Expression::parse(source).unwrap().evaluate(&scope()).unwrap()
    }

    fn test(source: &str) -> bool {
        Expression::parse(source)
            .unwrap()
            .evaluate_bool(&scope())
            .unwrap()
    }

    #[test]
    fn test_null_checks() {
        assert!(test("age != null"));
        assert!(!test("nothing != null"));
        assert!(test("nothing == null"));
        assert!(test("missing == null"));
    }

    #[test]
    fn test_logical_operators() {
        assert!(test("age != null and name != null"));
        assert!(test("nothing != null or age == 21"));
        assert!(test("age gt 18 && !(nothing != null)"));
        assert!(test("not nothing"));
        assert!(!test("nothing or false"));
    }

    #[test]
    fn test_and_short_circuits() {
        // `nothing.size()` would fail, but is never evaluated.
        assert!(!test("nothing != null and nothing.size() > 0"));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(test("age >= 21"));
        assert!(test("age lt 22"));
        assert!(test("price > 2"));
        assert!(test("price == 2.5"));
        assert!(test("code == 42"));
        assert!(test("age == 21.0"));
        assert!(!test("name == 0"));
    }

    #[test]
    fn test_text_comparisons() {
        assert!(test("user.name == 'bob'"));
        assert!(test("user.name eq \"bob\""));
        assert!(test("'abc' < 'abd'"));
    }

    #[test]
    fn test_methods() {
        assert_eq!(eval("ids.size()"), Value::Int(3));
        assert_eq!(eval("name.trim()"), Value::from("alice"));
        assert_eq!(eval("name.trim().length()"), Value::Int(5));
        assert!(test("empty.isEmpty()"));
        assert!(test("flags.size() == 1"));
    }

    #[test]
    fn test_property_after_method_is_rejected() {
        let err = Expression::parse("name.trim().first").unwrap_err();
        assert_eq!(err.position(), 12);
    }

    #[test]
    fn test_indexes() {
        assert_eq!(eval("ids[1]"), Value::Int(2));
        assert_eq!(eval("flags['active']"), Value::Bool(true));
        assert_eq!(eval("flags[key]"), Value::Bool(true));
        assert_eq!(eval("ids[ids[0]]"), Value::Int(2));
    }

    #[test]
    fn test_concatenation_and_negation() {
        assert_eq!(eval("'%' + user.name + '%'"), Value::from("%bob%"));
        assert_eq!(eval("age + 1"), Value::Int(22));
        assert_eq!(eval("-age"), Value::Int(-21));
        assert_eq!(eval("-1.5"), Value::Float(-1.5));
    }

    #[test]
    fn test_ordering_null_is_error() {
        let err = Expression::parse("nothing > 1")
            .unwrap()
            .evaluate(&scope())
            .unwrap_err();
        assert!(matches!(
            err,
            EvalError::InvalidOperands {
                operator: ">",
                left: "null",
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_method_receiver() {
        let err = Expression::parse("age.size()")
            .unwrap()
            .evaluate(&scope())
            .unwrap_err();
        assert!(matches!(err, EvalError::UnsupportedMethod { .. }));
    }

    #[test]
    fn test_iterable() {
        let expr = Expression::parse("ids").unwrap();
        let scope = scope();
        let items = expr.evaluate_iterable(&scope, false).unwrap();
        let values: Vec<_> = items
            .iter()
            .map(|(index, item)| (index.clone(), item.to_value()))
            .collect();
        assert_eq!(
            values,
            vec![
                (Value::Int(0), Value::Int(1)),
                (Value::Int(1), Value::Int(2)),
                (Value::Int(2), Value::Int(3)),
            ]
        );

        let flags = Expression::parse("flags").unwrap();
        let entries = flags.evaluate_iterable(&scope, false).unwrap();
        assert_eq!(entries[0].0, Value::from("active"));

        let null = Expression::parse("nothing").unwrap();
        assert!(null.evaluate_iterable(&scope, true).unwrap().is_empty());
        assert!(matches!(
            null.evaluate_iterable(&scope, false),
            Err(EvalError::NullCollection { .. })
        ));
        assert!(matches!(
            Expression::parse("age").unwrap().evaluate_iterable(&scope, false),
            Err(EvalError::NotIterable { actual: "int", .. })
        ));
    }

    #[test]
    fn test_grammar_errors() {
        let cases = [
            ("age = 1", 4),
            ("age ==", 6),
            ("(age > 1", 8),
            ("name.", 5),
            ("'open", 0),
            ("age & 1", 4),
            ("upper(name)", 0),
            ("name.toUpperCase()", 5),
            ("age 1", 4),
            ("and", 0),
        ];
        for (source, position) in cases {
            let err = Expression::parse(source).unwrap_err();
            assert_eq!(err.position(), position, "{source}: {err}");
            assert_eq!(err.fragment(), source);
        }
    }

    #[test]
    fn test_is_path() {
        assert!(Expression::parse("user.name").unwrap().is_path());
        assert!(!Expression::parse("ids.size()").unwrap().is_path());
        assert!(!Expression::parse("'x'").unwrap().is_path());
    }
}
