//! Wire type hints and parameter directions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! jdbc_types {
    ($($variant:ident = $name:literal, $code:expr;)*) => {
        /// Standard JDBC type names, used as binding hints for null and
        /// ambiguous values.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[non_exhaustive]
        #[allow(missing_docs)]
        pub enum JdbcType {
            $($variant,)*
        }

        impl JdbcType {
            /// Every known type.
            pub const ALL: &'static [JdbcType] = &[$(Self::$variant,)*];

            /// The canonical upper-case name.
            #[must_use]
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name,)*
                }
            }

            /// The numeric type code as defined by `java.sql.Types`.
            #[must_use]
            pub fn code(self) -> i32 {
                match self {
                    $(Self::$variant => $code,)*
                }
            }

            /// Parse a type name, ignoring case and surrounding whitespace.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                let name = name.trim().to_uppercase();
                match name.as_str() {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }

            /// Look up a type by its numeric code.
            #[must_use]
            pub fn from_code(code: i32) -> Option<Self> {
                Self::ALL.iter().copied().find(|t| t.code() == code)
            }
        }
    };
}

jdbc_types! {
    Array = "ARRAY", 2003;
    Bit = "BIT", -7;
    TinyInt = "TINYINT", -6;
    SmallInt = "SMALLINT", 5;
    Integer = "INTEGER", 4;
    BigInt = "BIGINT", -5;
    Float = "FLOAT", 6;
    Real = "REAL", 7;
    Double = "DOUBLE", 8;
    Numeric = "NUMERIC", 2;
    Decimal = "DECIMAL", 3;
    Char = "CHAR", 1;
    VarChar = "VARCHAR", 12;
    LongVarChar = "LONGVARCHAR", -1;
    Date = "DATE", 91;
    Time = "TIME", 92;
    Timestamp = "TIMESTAMP", 93;
    Binary = "BINARY", -2;
    VarBinary = "VARBINARY", -3;
    LongVarBinary = "LONGVARBINARY", -4;
    Null = "NULL", 0;
    Other = "OTHER", 1111;
    Blob = "BLOB", 2004;
    Clob = "CLOB", 2005;
    Boolean = "BOOLEAN", 16;
    Cursor = "CURSOR", -10;
    Undefined = "UNDEFINED", -2_147_482_648;
    NVarChar = "NVARCHAR", -9;
    NChar = "NCHAR", -15;
    NClob = "NCLOB", 2011;
    Struct = "STRUCT", 2002;
    JavaObject = "JAVA_OBJECT", 2000;
    Distinct = "DISTINCT", 2001;
    Ref = "REF", 2006;
    DataLink = "DATALINK", 70;
    RowId = "ROWID", -8;
    LongNVarChar = "LONGNVARCHAR", -16;
    SqlXml = "SQLXML", 2009;
    DateTimeOffset = "DATETIMEOFFSET", -155;
    TimeWithTimezone = "TIME_WITH_TIMEZONE", 2013;
    TimestampWithTimezone = "TIMESTAMP_WITH_TIMEZONE", 2014;
}

impl fmt::Display for JdbcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JdbcType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown JDBC type '{}'", s.trim()))
    }
}

impl Serialize for JdbcType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for JdbcType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// Direction of a statement parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterMode {
    /// Value passed to the statement.
    #[default]
    In,
    /// Value produced by the statement.
    Out,
    /// Value passed to and produced by the statement.
    #[serde(rename = "INOUT")]
    InOut,
}

impl ParameterMode {
    /// Parse a mode name, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "IN" => Some(Self::In),
            "OUT" => Some(Self::Out),
            "INOUT" => Some(Self::InOut),
            _ => None,
        }
    }

    /// Check whether the statement reads a value for this parameter.
    #[must_use]
    pub fn is_input(self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// Check whether the statement writes a value for this parameter.
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

impl fmt::Display for ParameterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::In => "IN",
            Self::Out => "OUT",
            Self::InOut => "INOUT",
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_ignores_case() {
        assert_eq!(JdbcType::from_name("varchar"), Some(JdbcType::VarChar));
        assert_eq!(JdbcType::from_name(" Numeric "), Some(JdbcType::Numeric));
        assert_eq!(JdbcType::from_name("VARCHAR2"), None);
    }

    #[test]
    fn test_codes_round_trip() {
        for ty in JdbcType::ALL {
            assert_eq!(JdbcType::from_code(ty.code()), Some(*ty));
            assert_eq!(JdbcType::from_name(ty.name()), Some(*ty));
        }
    }

    #[test]
    fn test_parse_error_message() {
        let err = "BOGUS".parse::<JdbcType>().unwrap_err();
        assert_eq!(err, "unknown JDBC type 'BOGUS'");
    }

    #[test]
    fn test_mode() {
        assert_eq!(ParameterMode::from_name("inout"), Some(ParameterMode::InOut));
        assert_eq!(ParameterMode::default(), ParameterMode::In);
        assert!(ParameterMode::InOut.is_output());
        assert!(!ParameterMode::Out.is_input());
        assert_eq!(ParameterMode::from_name("sideways"), None);
    }
}
