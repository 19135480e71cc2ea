//! Reflection error types.

use thiserror::Error;

/// Errors raised while reading or writing properties of host objects.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum ReflectionError {
    /// The type exposes no readable property with this name.
    #[error("there is no getter for property named '{property}' in '{type_name}'")]
    NoGetter {
        /// Property name as requested.
        property: String,
        /// Host type name.
        type_name: &'static str,
    },

    /// The type exposes no writable property with this name.
    #[error("there is no setter for property named '{property}' in '{type_name}'")]
    NoSetter {
        /// Property name as requested.
        property: String,
        /// Host type name.
        type_name: &'static str,
    },

    /// A segment in the middle of a path evaluated to null.
    #[error("cannot resolve '{path}': '{segment}' is null")]
    NullIntermediate {
        /// Full property path.
        path: String,
        /// The path prefix that evaluated to null.
        segment: String,
    },

    /// An index segment was applied to a value that is neither a list nor a map.
    #[error("cannot index into '{segment}' of type '{type_name}'")]
    NotIndexable {
        /// The index segment text.
        segment: String,
        /// Type of the indexed value.
        type_name: &'static str,
    },

    /// A list index is past the end of the list.
    #[error("index {index} out of bounds for '{path}' (length {len})")]
    IndexOutOfBounds {
        /// Full property path.
        path: String,
        /// Requested index.
        index: usize,
        /// Actual list length.
        len: usize,
    },

    /// A list index is not a non-negative integer.
    #[error("invalid list index '{0}'")]
    InvalidIndex(String),

    /// A property path could not be parsed.
    #[error("invalid property path '{path}': {reason}")]
    InvalidPath {
        /// The offending path.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A value could not be converted to the target type.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected target type.
        expected: &'static str,
        /// Description of the actual value.
        actual: String,
    },

    /// A numeric value does not fit into the target type.
    #[error("value {value} out of range for {target}")]
    OutOfRange {
        /// Target type name.
        target: &'static str,
        /// Rendered source value.
        value: String,
    },
}

impl ReflectionError {
    /// Build a type mismatch error from the expected type and the offending value.
    pub(crate) fn mismatch(expected: &'static str, actual: &crate::Value) -> Self {
        Self::TypeMismatch {
            expected,
            actual: actual.type_name().to_string(),
        }
    }
}
