//! Numeric element types and typed scalar values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The fixed set of numeric types generated code can store and compute with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericType {
    Int32,
    Int64,
    Float32,
    Float64,
    Bool,
}

impl NumericType {
    /// All numeric types, in declaration order.
    pub const ALL: [NumericType; 5] = [
        NumericType::Int32,
        NumericType::Int64,
        NumericType::Float32,
        NumericType::Float64,
        NumericType::Bool,
    ];

    /// Whether this is a floating-point type.
    pub fn is_float(self) -> bool {
        matches!(self, NumericType::Float32 | NumericType::Float64)
    }

    /// Whether this is a (signed) integer type.
    pub fn is_integer(self) -> bool {
        matches!(self, NumericType::Int32 | NumericType::Int64)
    }

    /// Canonical lowercase name (`int32`, `float64`, ...).
    pub fn name(self) -> &'static str {
        match self {
            NumericType::Int32 => "int32",
            NumericType::Int64 => "int64",
            NumericType::Float32 => "float32",
            NumericType::Float64 => "float64",
            NumericType::Bool => "bool",
        }
    }

    /// The zero value of this type.
    pub fn zero(self) -> Scalar {
        match self {
            NumericType::Int32 | NumericType::Int64 => Scalar::Int(0),
            NumericType::Float32 | NumericType::Float64 => Scalar::Float(0.0),
            NumericType::Bool => Scalar::Bool(false),
        }
    }
}

impl fmt::Display for NumericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NumericType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int32" | "int" => Ok(NumericType::Int32),
            "int64" | "long" => Ok(NumericType::Int64),
            "float32" => Ok(NumericType::Float32),
            "float64" | "float" | "double" => Ok(NumericType::Float64),
            "bool" | "boolean" => Ok(NumericType::Bool),
            other => Err(CoreError::UnknownNumericType {
                name: other.to_string(),
            }),
        }
    }
}

/// A literal value known at generation time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl Scalar {
    /// The natural numeric type of this value (integers are 64-bit).
    pub fn natural_type(&self) -> NumericType {
        match self {
            Scalar::Bool(_) => NumericType::Bool,
            Scalar::Int(_) => NumericType::Int64,
            Scalar::Float(_) => NumericType::Float64,
        }
    }

    /// Value as a float.
    pub fn as_f64(&self) -> f64 {
        match *self {
            Scalar::Bool(b) => f64::from(u8::from(b)),
            Scalar::Int(i) => i as f64,
            Scalar::Float(x) => x,
        }
    }

    /// Value as an integer, truncating floats toward zero.
    pub fn as_i64(&self) -> i64 {
        match *self {
            Scalar::Bool(b) => i64::from(b),
            Scalar::Int(i) => i,
            Scalar::Float(x) => x as i64,
        }
    }

    /// Truthiness: non-zero numbers are true.
    pub fn as_bool(&self) -> bool {
        match *self {
            Scalar::Bool(b) => b,
            Scalar::Int(i) => i != 0,
            Scalar::Float(x) => x != 0.0,
        }
    }

    /// Convert to the representation used for `dtype`.
    ///
    /// `Float32` values are rounded through `f32` so the result matches what a
    /// single-precision array would store.
    pub fn cast(&self, dtype: NumericType) -> Scalar {
        match dtype {
            NumericType::Bool => Scalar::Bool(self.as_bool()),
            NumericType::Int32 => Scalar::Int(i64::from(self.as_i64() as i32)),
            NumericType::Int64 => Scalar::Int(self.as_i64()),
            NumericType::Float32 => Scalar::Float(f64::from(self.as_f64() as f32)),
            NumericType::Float64 => Scalar::Float(self.as_f64()),
        }
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => f.write_str(&float_repr(*x)),
        }
    }
}

/// Shortest representation of `x` that parses back to the same `f64`.
///
/// Always contains a `.`, an exponent, or is one of `inf`, `-inf`, `NaN`, so
/// the token is never mistaken for an integer literal.
pub fn float_repr(x: f64) -> String {
    // `{:?}` is the shortest round-trip form and keeps a trailing `.0`.
    format!("{x:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_type_names() {
        assert_eq!("int32".parse::<NumericType>().unwrap(), NumericType::Int32);
        assert_eq!("double".parse::<NumericType>().unwrap(), NumericType::Float64);
        assert_eq!("boolean".parse::<NumericType>().unwrap(), NumericType::Bool);
        assert!("complex128".parse::<NumericType>().is_err());
    }

    #[test]
    fn names_round_trip() {
        for dtype in NumericType::ALL {
            assert_eq!(dtype.name().parse::<NumericType>().unwrap(), dtype);
        }
    }

    #[test]
    fn float_repr_round_trips() {
        for x in [10.0, 0.1, 1e-10, -3.25, 123456789.125, f64::MIN_POSITIVE] {
            let text = float_repr(x);
            assert_eq!(text.parse::<f64>().unwrap(), x);
            assert!(text.contains('.') || text.contains('e'), "{text}");
        }
    }

    #[test]
    fn integer_display_is_exact() {
        let big = Scalar::Int(9_007_199_254_740_993);
        assert_eq!(big.to_string(), "9007199254740993");
    }

    #[test]
    fn cast_to_float32_rounds() {
        let v = Scalar::Float(0.1).cast(NumericType::Float32);
        assert_eq!(v, Scalar::Float(f64::from(0.1f32)));
        assert_eq!(Scalar::Float(2.9).cast(NumericType::Int32), Scalar::Int(2));
        assert_eq!(Scalar::Int(3).cast(NumericType::Bool), Scalar::Bool(true));
    }
}
