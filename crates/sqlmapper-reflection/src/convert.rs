//! Conversions from dynamic [`Value`]s into host field types.
//!
//! Assigning a value to a typed property goes through [`FromValue`]. The
//! conversions are deliberately narrow: numbers convert between numeric
//! representations when no information is lost, text converts to numbers,
//! booleans and temporal types when it parses, and nothing converts from
//! null (use `Option<T>` for nullable fields).

use crate::error::ReflectionError;
use crate::value::Value;

/// Conversion from an owned [`Value`].
pub trait FromValue: Sized {
    /// Convert the value, failing with a type mismatch or range error.
    fn from_value(value: Value) -> Result<Self, ReflectionError>;
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, ReflectionError> {
        Ok(value)
    }
}

fn integral(value: &Value, target: &'static str) -> Result<i64, ReflectionError> {
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    match value {
        Value::Text(s) => s.trim().parse::<i64>().map_err(|_| ReflectionError::TypeMismatch {
            expected: target,
            actual: format!("text '{s}'"),
        }),
        Value::Float(f) => Err(ReflectionError::OutOfRange {
            target,
            value: f.to_string(),
        }),
        #[cfg(feature = "decimal")]
        Value::Decimal(d) => Err(ReflectionError::OutOfRange {
            target,
            value: d.to_string(),
        }),
        other => Err(ReflectionError::mismatch(target, other)),
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),*) => {$(
        impl FromValue for $t {
            fn from_value(value: Value) -> Result<Self, ReflectionError> {
                let wide = integral(&value, stringify!($t))?;
                <$t>::try_from(wide).map_err(|_| ReflectionError::OutOfRange {
                    target: stringify!($t),
                    value: wide.to_string(),
                })
            }
        }
    )*};
}

impl_from_value_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

fn floating(value: &Value, target: &'static str) -> Result<f64, ReflectionError> {
    if let Some(f) = value.as_f64() {
        return Ok(f);
    }
    match value {
        Value::Text(s) => s.trim().parse::<f64>().map_err(|_| ReflectionError::TypeMismatch {
            expected: target,
            actual: format!("text '{s}'"),
        }),
        other => Err(ReflectionError::mismatch(target, other)),
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, ReflectionError> {
        floating(&value, "f64")
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: Value) -> Result<Self, ReflectionError> {
        floating(&value, "f32").map(|f| f as f32)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, ReflectionError> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            Value::Text(ref s) if s.eq_ignore_ascii_case("true") => Ok(true),
            Value::Text(ref s) if s.eq_ignore_ascii_case("false") => Ok(false),
            other => Err(ReflectionError::mismatch("bool", &other)),
        }
    }
}

impl FromValue for char {
    fn from_value(value: Value) -> Result<Self, ReflectionError> {
        if let Value::Text(s) = &value {
            let mut chars = s.chars();
            if let (Some(c), None) = (chars.next(), chars.next()) {
                return Ok(c);
            }
        }
        Err(ReflectionError::mismatch("char", &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, ReflectionError> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(ReflectionError::mismatch("String", &other)),
        }
    }
}

#[cfg(feature = "decimal")]
impl FromValue for rust_decimal::Decimal {
    fn from_value(value: Value) -> Result<Self, ReflectionError> {
        use rust_decimal::prelude::FromPrimitive;

        match value {
            Value::Decimal(d) => Ok(d),
            Value::Int(i) => Ok(Self::from(i)),
            Value::Float(f) => Self::from_f64(f).ok_or_else(|| ReflectionError::OutOfRange {
                target: "Decimal",
                value: f.to_string(),
            }),
            Value::Text(ref s) => s.trim().parse().map_err(|_| ReflectionError::TypeMismatch {
                expected: "Decimal",
                actual: format!("text '{s}'"),
            }),
            other => Err(ReflectionError::mismatch("Decimal", &other)),
        }
    }
}

macro_rules! impl_from_value_parsed {
    ($variant:ident, $t:ty, $name:literal) => {
        impl FromValue for $t {
            fn from_value(value: Value) -> Result<Self, ReflectionError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    Value::Text(ref s) => {
                        s.trim().parse().map_err(|_| ReflectionError::TypeMismatch {
                            expected: $name,
                            actual: format!("text '{s}'"),
                        })
                    }
                    other => Err(ReflectionError::mismatch($name, &other)),
                }
            }
        }
    };
}

#[cfg(feature = "chrono")]
impl_from_value_parsed!(Date, chrono::NaiveDate, "NaiveDate");
#[cfg(feature = "chrono")]
impl_from_value_parsed!(Time, chrono::NaiveTime, "NaiveTime");
#[cfg(feature = "chrono")]
impl_from_value_parsed!(DateTime, chrono::NaiveDateTime, "NaiveDateTime");
#[cfg(feature = "uuid")]
impl_from_value_parsed!(Uuid, uuid::Uuid, "Uuid");
