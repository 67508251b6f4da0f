// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorCode, ErrorKind, Result};

/// The element types an array column may carry, in widening order.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericType {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl NumericType {
    pub fn is_integral(self) -> bool {
        matches!(self, NumericType::Int32 | NumericType::Int64)
    }

    /// The type a running total over this type is kept in.
    pub fn accumulator(self) -> NumericType {
        if self.is_integral() {
            NumericType::Int64
        } else {
            NumericType::Float64
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericType::Int32 => "int32",
            NumericType::Int64 => "int64",
            NumericType::Float32 => "float32",
            NumericType::Float64 => "float64",
        }
    }
}

#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    Array(NumericType),
    Object,
}

impl ScalarType {
    pub fn numeric(&self) -> Option<NumericType> {
        match self {
            ScalarType::Int32 => Some(NumericType::Int32),
            ScalarType::Int64 => Some(NumericType::Int64),
            ScalarType::Float32 => Some(NumericType::Float32),
            ScalarType::Float64 => Some(NumericType::Float64),
            ScalarType::Bool | ScalarType::Array(_) | ScalarType::Object => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric().is_some()
    }

    pub fn is_array(&self) -> bool {
        matches!(self, ScalarType::Array(_))
    }

    pub fn element_type(&self) -> Option<NumericType> {
        match self {
            ScalarType::Array(elem) => Some(*elem),
            _ => None,
        }
    }

    /// Widened type used for running totals: int32/int64 accumulate in
    /// int64, float32/float64 in float64, arrays elementwise.  `None` for
    /// bool and object, which have no arithmetic.
    pub fn accumulator(&self) -> Option<ScalarType> {
        match self {
            ScalarType::Array(elem) => Some(ScalarType::Array(elem.accumulator())),
            _ => self.numeric().map(|n| n.accumulator().into()),
        }
    }
}

impl From<NumericType> for ScalarType {
    fn from(n: NumericType) -> Self {
        match n {
            NumericType::Int32 => ScalarType::Int32,
            NumericType::Int64 => ScalarType::Int64,
            NumericType::Float32 => ScalarType::Float32,
            NumericType::Float64 => ScalarType::Float64,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalarType::Bool => write!(f, "bool"),
            ScalarType::Array(elem) => write!(f, "{}[]", elem.name()),
            ScalarType::Object => write!(f, "object"),
            _ => write!(f, "{}", self.numeric().map(|n| n.name()).unwrap_or("?")),
        }
    }
}

impl FromStr for ScalarType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let numeric = |name: &str| match name {
            "int32" | "int" => Some(NumericType::Int32),
            "int64" | "long" => Some(NumericType::Int64),
            "float32" | "float" => Some(NumericType::Float32),
            "float64" | "double" => Some(NumericType::Float64),
            _ => None,
        };
        let s = s.trim();
        if let Some(elem) = s.strip_suffix("[]") {
            if let Some(elem) = numeric(elem) {
                return Ok(ScalarType::Array(elem));
            }
        } else if let Some(n) = numeric(s) {
            return Ok(n.into());
        } else if s == "bool" || s == "boolean" {
            return Ok(ScalarType::Bool);
        } else if s == "object" || s == "string" {
            return Ok(ScalarType::Object);
        }

        Err(Error::new(
            ErrorKind::Config,
            ErrorCode::UnsupportedType,
            Some(format!("unknown type '{s}'")),
        ))
    }
}

fn unsupported(a: ScalarType, b: ScalarType) -> Error {
    Error::new(
        ErrorKind::Lowering,
        ErrorCode::UnsupportedType,
        Some(format!("can't promote {a} with {b}")),
    )
}

/// promote returns the least upper bound of two types on the widening
/// lattice int32 < int64 < float32 < float64.  Arrays only promote with
/// arrays (elementwise), bool only with bool, object only with object.
pub fn promote(a: ScalarType, b: ScalarType) -> Result<ScalarType> {
    use ScalarType::*;
    match (a, b) {
        (Bool, Bool) => Ok(Bool),
        (Object, Object) => Ok(Object),
        (Array(x), Array(y)) => Ok(Array(x.max(y))),
        (Array(_), _) | (_, Array(_)) => Err(unsupported(a, b)),
        _ => match (a.numeric(), b.numeric()) {
            (Some(x), Some(y)) => Ok(x.max(y).into()),
            _ => Err(unsupported(a, b)),
        },
    }
}

#[test]
fn test_promote_table() {
    use ScalarType::*;
    let cases: &[(ScalarType, ScalarType, ScalarType)] = &[
        (Int32, Int32, Int32),
        (Int32, Int64, Int64),
        (Int64, Float32, Float32),
        (Float32, Float64, Float64),
        (Int32, Float64, Float64),
        (Bool, Bool, Bool),
        (Object, Object, Object),
        (
            Array(NumericType::Int32),
            Array(NumericType::Float32),
            Array(NumericType::Float32),
        ),
    ];
    for (a, b, expected) in cases {
        assert_eq!(Ok(*expected), promote(*a, *b), "{a} ⊔ {b}");
        assert_eq!(Ok(*expected), promote(*b, *a), "{b} ⊔ {a}");
    }
}

#[test]
fn test_promote_failures() {
    use ScalarType::*;
    let failures: &[(ScalarType, ScalarType)] = &[
        (Object, Int32),
        (Float64, Object),
        (Bool, Int64),
        (Array(NumericType::Float64), Float64),
        (Int32, Array(NumericType::Int32)),
        (Array(NumericType::Int64), Object),
    ];
    for (a, b) in failures {
        let err = promote(*a, *b).unwrap_err();
        assert_eq!(ErrorCode::UnsupportedType, err.code);
        assert!(err.get_details().unwrap().contains(&a.to_string()));
    }
}

#[test]
fn test_accumulator() {
    assert_eq!(Some(ScalarType::Int64), ScalarType::Int32.accumulator());
    assert_eq!(Some(ScalarType::Float64), ScalarType::Float32.accumulator());
    assert_eq!(
        Some(ScalarType::Array(NumericType::Int64)),
        ScalarType::Array(NumericType::Int32).accumulator()
    );
    assert_eq!(None, ScalarType::Object.accumulator());
    assert_eq!(None, ScalarType::Bool.accumulator());
}

#[test]
fn test_parse_and_display() {
    for s in ["bool", "int32", "int64", "float32", "float64", "object", "float64[]"] {
        let ty: ScalarType = s.parse().unwrap();
        assert_eq!(s, ty.to_string());
    }
    assert_eq!(Ok(ScalarType::Float64), "double".parse());
    assert!("date".parse::<ScalarType>().is_err());
}
