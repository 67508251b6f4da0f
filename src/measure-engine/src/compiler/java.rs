// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Rendering of types and constants into the source text of generated
//! aggregation code.

use crate::ast::Literal;
use crate::common::{NumericType, ScalarType};

pub const VECTOR_IMPORT: &str = "io.measure.runtime.vector.IVector";
pub const VECTOR_ARITHMETIC_IMPORT: &str = "io.measure.runtime.VectorArithmetic";
pub const OBJECTS_IMPORT: &str = "java.util.Objects";

pub fn java_type(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::Bool => "boolean",
        ScalarType::Int32 => "int",
        ScalarType::Int64 => "long",
        ScalarType::Float32 => "float",
        ScalarType::Float64 => "double",
        ScalarType::Array(_) => "IVector",
        ScalarType::Object => "Object",
    }
}

/// accessor is the suffix of the typed read/write methods on rows,
/// buffers and vectors (`readLong`, `writeDouble`, ...).
pub fn accessor(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::Bool => "Boolean",
        ScalarType::Int32 => "Int",
        ScalarType::Int64 => "Long",
        ScalarType::Float32 => "Float",
        ScalarType::Float64 => "Double",
        ScalarType::Array(_) => "Vector",
        ScalarType::Object => "",
    }
}

pub fn element_accessor(elem: NumericType) -> &'static str {
    accessor(elem.into())
}

/// boxed wraps a primitive-typed expression so it can be returned as an
/// Object; reference types pass through.
pub fn boxed(ty: ScalarType, expr: &str) -> String {
    let class = match ty {
        ScalarType::Bool => "Boolean",
        ScalarType::Int32 => "Integer",
        ScalarType::Int64 => "Long",
        ScalarType::Float32 => "Float",
        ScalarType::Float64 => "Double",
        ScalarType::Array(_) | ScalarType::Object => return expr.to_owned(),
    };
    format!("{class}.valueOf({expr})")
}

/// equals renders an equality test appropriate for the type: `==` for
/// primitives, `Objects.equals` for references.
pub fn equals(ty: ScalarType, a: &str, b: &str) -> String {
    match ty {
        ScalarType::Array(_) | ScalarType::Object => format!("Objects.equals({a}, {b})"),
        _ => format!("{a} == {b}"),
    }
}

pub fn type_imports(ty: ScalarType) -> Option<&'static str> {
    match ty {
        ScalarType::Array(_) => Some(VECTOR_IMPORT),
        _ => None,
    }
}

fn double_literal(n: f64) -> String {
    if n.is_nan() {
        "Double.NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Double.POSITIVE_INFINITY".to_owned()
        } else {
            "Double.NEGATIVE_INFINITY".to_owned()
        }
    } else {
        format!("{n:?}")
    }
}

fn float_literal(n: f32) -> String {
    if n.is_nan() {
        "Float.NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Float.POSITIVE_INFINITY".to_owned()
        } else {
            "Float.NEGATIVE_INFINITY".to_owned()
        }
    } else {
        format!("{n:?}f")
    }
}

fn string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

pub fn literal(lit: &Literal) -> String {
    match lit {
        Literal::Bool(b) => format!("{b}"),
        Literal::Int32(n) => format!("{n}"),
        Literal::Int64(n) => format!("{n}L"),
        Literal::Float32(n) => float_literal(n.0),
        Literal::Float64(n) => double_literal(n.0),
        Literal::Text(s) => string_literal(s),
    }
}

#[test]
fn test_literals() {
    use ordered_float::OrderedFloat;

    let cases: &[(Literal, &str)] = &[
        (Literal::Bool(true), "true"),
        (Literal::Int32(3), "3"),
        (Literal::Int64(3), "3L"),
        (Literal::Int64(-12), "-12L"),
        (Literal::Float32(OrderedFloat(3.0)), "3.0f"),
        (Literal::Float64(OrderedFloat(0.25)), "0.25"),
        (Literal::Float64(OrderedFloat(f64::INFINITY)), "Double.POSITIVE_INFINITY"),
        (Literal::Float32(OrderedFloat(f32::NAN)), "Float.NaN"),
        (Literal::Text("a \"b\"\n".to_owned()), "\"a \\\"b\\\"\\n\""),
    ];
    for (lit, expected) in cases {
        assert_eq!(*expected, literal(lit));
    }
}

#[test]
fn test_boxing_and_equality() {
    assert_eq!("Long.valueOf(x)", boxed(ScalarType::Int64, "x"));
    assert_eq!("x", boxed(ScalarType::Object, "x"));
    assert_eq!("a == b", equals(ScalarType::Float64, "a", "b"));
    assert_eq!(
        "Objects.equals(a, b)",
        equals(ScalarType::Array(NumericType::Int32), "a", "b")
    );
}
