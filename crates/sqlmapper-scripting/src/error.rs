//! Error types for statement compilation and binding.

use sqlmapper_reflection::ReflectionError;
use thiserror::Error;

/// Errors raised while parsing a statement template.
///
/// Positions are byte offsets into the template text the error was found in.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum GrammarError {
    /// A placeholder was opened but never closed.
    #[error("unterminated placeholder '{fragment}' starting at position {position}")]
    UnterminatedToken {
        /// Position of the opening delimiter.
        position: usize,
        /// Text from the opening delimiter to the end of input.
        fragment: String,
    },

    /// A placeholder has no content.
    #[error("empty placeholder '{fragment}' at position {position}")]
    EmptyToken {
        /// Position of the opening delimiter.
        position: usize,
        /// The placeholder text.
        fragment: String,
    },

    /// A parameter attribute key is not recognized.
    #[error(
        "unknown attribute '{key}' in parameter '{fragment}' at position {position} \
         (valid attributes are javaType, jdbcType, mode, numericScale, resultMap, \
         typeHandler, jdbcTypeName)"
    )]
    UnknownAttribute {
        /// The unrecognized key.
        key: String,
        /// The parameter body.
        fragment: String,
        /// Position of the key.
        position: usize,
    },

    /// A parameter attribute has a value that cannot be used.
    #[error("invalid value '{value}' for attribute '{key}' in parameter '{fragment}' at position {position}")]
    InvalidAttribute {
        /// The attribute key.
        key: String,
        /// The rejected value.
        value: String,
        /// The parameter body.
        fragment: String,
        /// Position of the value.
        position: usize,
    },

    /// A parameter body is malformed.
    #[error("invalid parameter '{fragment}' at position {position}: {reason}")]
    InvalidParameter {
        /// The parameter body.
        fragment: String,
        /// Position of the problem.
        position: usize,
        /// What is wrong.
        reason: String,
    },

    /// A test, collection or bind expression is malformed.
    #[error("invalid expression '{fragment}' at position {position}: {reason}")]
    InvalidExpression {
        /// The expression text.
        fragment: String,
        /// Position of the problem within the expression.
        position: usize,
        /// What is wrong.
        reason: String,
    },
}

impl GrammarError {
    /// Position of the problem.
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::UnterminatedToken { position, .. }
            | Self::EmptyToken { position, .. }
            | Self::UnknownAttribute { position, .. }
            | Self::InvalidAttribute { position, .. }
            | Self::InvalidParameter { position, .. }
            | Self::InvalidExpression { position, .. } => *position,
        }
    }

    /// The offending fragment.
    #[must_use]
    pub fn fragment(&self) -> &str {
        match self {
            Self::UnterminatedToken { fragment, .. }
            | Self::EmptyToken { fragment, .. }
            | Self::UnknownAttribute { fragment, .. }
            | Self::InvalidAttribute { fragment, .. }
            | Self::InvalidParameter { fragment, .. }
            | Self::InvalidExpression { fragment, .. } => fragment,
        }
    }

    /// Shift the position by `base`, for errors found in a slice of a
    /// larger text.
    #[must_use]
    pub fn offset_by(mut self, base: usize) -> Self {
        match &mut self {
            Self::UnterminatedToken { position, .. }
            | Self::EmptyToken { position, .. }
            | Self::UnknownAttribute { position, .. }
            | Self::InvalidAttribute { position, .. }
            | Self::InvalidParameter { position, .. }
            | Self::InvalidExpression { position, .. } => *position += base,
        }
        self
    }
}

/// Errors raised while evaluating a node tree against a parameter object.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum EvalError {
    /// A property path in an expression could not be resolved.
    #[error("cannot evaluate '{expression}': {source}")]
    Property {
        /// The expression text.
        expression: String,
        /// The underlying resolution failure.
        #[source]
        source: ReflectionError,
    },

    /// A foreach collection is not a list or map.
    #[error("'{expression}' evaluated to a value of type {actual}, which is not iterable")]
    NotIterable {
        /// The collection expression.
        expression: String,
        /// Type of the value it produced.
        actual: &'static str,
    },

    /// A foreach collection evaluated to null.
    #[error("the collection expression '{expression}' evaluated to null")]
    NullCollection {
        /// The collection expression.
        expression: String,
    },

    /// Two values cannot be ordered or combined.
    #[error("cannot apply '{operator}' to {left} and {right} in '{expression}'")]
    InvalidOperands {
        /// The expression text.
        expression: String,
        /// The operator.
        operator: &'static str,
        /// Type of the left operand.
        left: &'static str,
        /// Type of the right operand.
        right: &'static str,
    },

    /// A method call is not supported for the receiver.
    #[error("method '{method}()' is not supported on {receiver} in '{expression}'")]
    UnsupportedMethod {
        /// The expression text.
        expression: String,
        /// The method name.
        method: String,
        /// Type of the receiver.
        receiver: &'static str,
    },

    /// A dynamic index is neither text nor an integer.
    #[error("invalid index of type {actual} in '{expression}'")]
    InvalidIndex {
        /// The expression text.
        expression: String,
        /// Type of the index value.
        actual: &'static str,
    },

    /// A raw substitution value does not match the configured filter.
    #[error("raw substitution '${{{expression}}}' produced '{value}', which the substitution filter rejects")]
    RejectedSubstitution {
        /// The substitution expression.
        expression: String,
        /// The rendered value.
        value: String,
    },
}

/// Errors raised while resolving the value of a bound parameter.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot bind parameter '{property}' on {type_name}: {source}")]
pub struct BindingError {
    /// Property path of the parameter.
    pub property: String,
    /// Type of the parameter object.
    pub type_name: &'static str,
    /// The underlying resolution failure.
    #[source]
    pub source: ReflectionError,
}

/// Errors that can occur while registering or compiling statements.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The template of a statement is malformed.
    #[error("statement '{statement}': {source}")]
    Grammar {
        /// Statement identifier.
        statement: String,
        /// The grammar failure.
        #[source]
        source: GrammarError,
    },

    /// Evaluating a statement against its parameter failed.
    #[error("statement '{statement}': {source}")]
    Evaluation {
        /// Statement identifier.
        statement: String,
        /// The evaluation failure.
        #[source]
        source: EvalError,
    },

    /// Resolving a bound parameter value failed.
    #[error("statement '{statement}': {source}")]
    Binding {
        /// Statement identifier.
        statement: String,
        /// The binding failure.
        #[source]
        source: BindingError,
    },

    /// Configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A statement or fragment id is registered twice.
    #[error("'{0}' is already registered")]
    DuplicateStatement(String),

    /// No statement is registered under this id.
    #[error("statement '{0}' is not registered")]
    UnknownStatement(String),

    /// An include refers to a fragment that does not exist.
    #[error("statement '{statement}' includes unknown fragment '{refid}'")]
    UnknownFragment {
        /// Statement identifier.
        statement: String,
        /// The missing fragment id.
        refid: String,
    },

    /// Includes form a cycle.
    #[error("statement '{statement}' includes fragment '{refid}' recursively")]
    CircularInclude {
        /// Statement identifier.
        statement: String,
        /// The fragment that closes the cycle.
        refid: String,
    },

    /// A node descriptor document could not be decoded.
    #[error("invalid node descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),
}

impl Error {
    /// The statement this error belongs to, if any.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::Grammar { statement, .. }
            | Self::Evaluation { statement, .. }
            | Self::Binding { statement, .. }
            | Self::UnknownFragment { statement, .. }
            | Self::CircularInclude { statement, .. } => Some(statement),
            Self::DuplicateStatement(id) | Self::UnknownStatement(id) => Some(id),
            Self::Config(_) | Self::Descriptor(_) => None,
        }
    }

    /// Check if the error is raised while building statements rather than
    /// while compiling them for a parameter.
    #[must_use]
    pub fn is_build_time(&self) -> bool {
        !matches!(self, Self::Evaluation { .. } | Self::Binding { .. })
    }
}

/// Result type for statement operations.
pub type Result<T> = std::result::Result<T, Error>;
