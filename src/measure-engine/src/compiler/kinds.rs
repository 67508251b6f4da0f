// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Aggregation kinds and the code each one contributes to an artifact.
//!
//! Generated snippets run with these names in scope:
//!
//! * `value`: the lowered operand, only in contribute/decontribute
//! * `buffer`: the aggregation buffer being updated
//! * `other`: the buffer being merged into `buffer`, only in merge
//!
//! Finalize code ends in a `return` of an `Object` (or `null`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};

use crate::common::{Error, ErrorCode, ErrorKind, NumericType, Result, ScalarType};
use crate::compiler::java::{
    OBJECTS_IMPORT, VECTOR_ARITHMETIC_IMPORT, accessor, boxed, equals, java_type,
};
use crate::lower_err;

pub type BufferLayout = SmallVec<[ScalarType; 4]>;

#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationKind {
    Sum,
    Min,
    Max,
    Mean,
    Multiply,
    SquareSum,
    /// sum of the negative contributions
    Short,
    /// sum of the positive contributions
    Long,
    SingleValueNullable,
    Count,
    PopulationVariance,
    SampleVariance,
}

pub const ALL_KINDS: [AggregationKind; 12] = [
    AggregationKind::Sum,
    AggregationKind::Min,
    AggregationKind::Max,
    AggregationKind::Mean,
    AggregationKind::Multiply,
    AggregationKind::SquareSum,
    AggregationKind::Short,
    AggregationKind::Long,
    AggregationKind::SingleValueNullable,
    AggregationKind::Count,
    AggregationKind::PopulationVariance,
    AggregationKind::SampleVariance,
];

impl AggregationKind {
    /// The tag the engine registers the aggregation under.
    pub fn tag(self) -> &'static str {
        match self {
            AggregationKind::Sum => "SUM",
            AggregationKind::Min => "MIN",
            AggregationKind::Max => "MAX",
            AggregationKind::Mean => "MEAN",
            AggregationKind::Multiply => "MULTIPLY",
            AggregationKind::SquareSum => "SQ_SUM",
            AggregationKind::Short => "SHORT",
            AggregationKind::Long => "LONG",
            AggregationKind::SingleValueNullable => "SINGLE_VALUE_NULLABLE",
            AggregationKind::Count => "COUNT",
            AggregationKind::PopulationVariance => "VARIANCE_POPULATION",
            AggregationKind::SampleVariance => "VARIANCE_SAMPLE",
        }
    }

    pub fn supports_decontribution(self) -> bool {
        !matches!(
            self,
            AggregationKind::Min | AggregationKind::Max | AggregationKind::SingleValueNullable
        )
    }

    fn accepts(self, operand: ScalarType) -> bool {
        match self {
            AggregationKind::Count | AggregationKind::SingleValueNullable => true,
            AggregationKind::Sum => operand.is_numeric() || operand.is_array(),
            _ => operand.is_numeric(),
        }
    }

    pub fn generator(self, operand: ScalarType) -> Result<KindGenerator> {
        if !self.accepts(operand) {
            return lower_err!(
                UnsupportedType,
                format!("{} can't aggregate values of type {operand}", self.tag())
            );
        }
        Ok(KindGenerator {
            kind: self,
            operand,
        })
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

impl FromStr for AggregationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if let Some(kind) = ALL_KINDS.iter().find(|k| k.tag() == upper) {
            return Ok(*kind);
        }
        let kind = match upper.as_str() {
            "SQUARE_SUM" => AggregationKind::SquareSum,
            "SINGLE_VALUE" => AggregationKind::SingleValueNullable,
            "VAR" | "VARIANCE" => AggregationKind::PopulationVariance,
            _ => {
                return Err(Error::new(
                    ErrorKind::Config,
                    ErrorCode::NotFound,
                    Some(format!("unknown aggregation kind '{s}'")),
                ));
            }
        };
        Ok(kind)
    }
}

fn read(buf: &str, ty: ScalarType, slot: usize) -> String {
    format!("{buf}.read{}({slot})", accessor(ty))
}

fn write(ty: ScalarType, slot: usize, expr: &str) -> String {
    format!("buffer.write{}({slot}, {expr});\n", accessor(ty))
}

fn add(ty: ScalarType, slot: usize, rhs: &str) -> String {
    write(ty, slot, &format!("{} + {rhs}", read("buffer", ty, slot)))
}

fn sub(ty: ScalarType, slot: usize, rhs: &str) -> String {
    write(ty, slot, &format!("{} - {rhs}", read("buffer", ty, slot)))
}

fn merge_add(ty: ScalarType, slot: usize) -> String {
    add(ty, slot, &read("other", ty, slot))
}

fn widened(ty: ScalarType, expr: &str) -> String {
    format!("({}) {expr}", java_type(ty))
}

/// Indents every non-empty line of a snippet by four spaces.
pub(crate) fn indent(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 16);
    for line in code.lines() {
        if !line.is_empty() {
            out.push_str("    ");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// KindGenerator emits the buffer layout and lifecycle code of one kind
/// for one operand type.  Slots are numbered from zero.
#[cfg_attr(feature = "debug-derive", derive(Debug))]
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct KindGenerator {
    kind: AggregationKind,
    operand: ScalarType,
}

const COUNT: ScalarType = ScalarType::Int64;
const SEEN: ScalarType = ScalarType::Bool;
const F64: ScalarType = ScalarType::Float64;

impl KindGenerator {
    pub fn kind(&self) -> AggregationKind {
        self.kind
    }

    /// The running-total type for sums over the operand.  Only called
    /// for operands `accepts` let through.
    fn acc(&self) -> ScalarType {
        self.operand.accumulator().unwrap_or(F64)
    }

    pub fn buffer_types(&self) -> BufferLayout {
        match self.kind {
            AggregationKind::Sum
            | AggregationKind::SquareSum
            | AggregationKind::Short
            | AggregationKind::Long => smallvec![self.acc()],
            AggregationKind::Count => smallvec![COUNT],
            AggregationKind::Min | AggregationKind::Max => smallvec![self.acc(), SEEN],
            AggregationKind::Multiply => smallvec![F64, COUNT, COUNT],
            AggregationKind::Mean => smallvec![F64, COUNT],
            AggregationKind::SingleValueNullable => smallvec![self.operand, SEEN, SEEN],
            AggregationKind::PopulationVariance | AggregationKind::SampleVariance => {
                smallvec![F64, F64, COUNT]
            }
        }
    }

    pub fn output_type(&self) -> ScalarType {
        match self.kind {
            AggregationKind::Sum
            | AggregationKind::SquareSum
            | AggregationKind::Short
            | AggregationKind::Long
            | AggregationKind::Min
            | AggregationKind::Max => self.acc(),
            AggregationKind::Mean
            | AggregationKind::Multiply
            | AggregationKind::PopulationVariance
            | AggregationKind::SampleVariance => F64,
            AggregationKind::Count => ScalarType::Int64,
            AggregationKind::SingleValueNullable => self.operand,
        }
    }

    pub fn imports(&self) -> Vec<&'static str> {
        match self.kind {
            AggregationKind::Sum if self.operand.is_array() => vec![VECTOR_ARITHMETIC_IMPORT],
            AggregationKind::SingleValueNullable
                if matches!(self.operand, ScalarType::Array(_) | ScalarType::Object) =>
            {
                vec![OBJECTS_IMPORT]
            }
            _ => vec![],
        }
    }

    pub fn contribute(&self) -> String {
        let acc = self.acc();
        match self.kind {
            AggregationKind::Sum if self.operand.is_array() => vector_sum("value", "plus"),
            AggregationKind::Sum => add(acc, 0, &widened(acc, "value")),
            AggregationKind::SquareSum => add(acc, 0, &format!("{} * value", widened(acc, "value"))),
            AggregationKind::Short => signed_sum(acc, "<", "+"),
            AggregationKind::Long => signed_sum(acc, ">", "+"),
            AggregationKind::Count => add(COUNT, 0, "1L"),
            AggregationKind::Min => extremum(acc, "<", "value", None),
            AggregationKind::Max => extremum(acc, ">", "value", None),
            AggregationKind::Multiply => {
                let product = format!(
                    "{} == 0L ? {} : {} * value",
                    factors("buffer"),
                    widened(F64, "value"),
                    read("buffer", F64, 0)
                );
                format!(
                    "if (value == 0) {{\n{}}} else {{\n{}}}\n{}",
                    indent(&add(COUNT, 2, "1L")),
                    indent(&write(F64, 0, &product)),
                    add(COUNT, 1, "1L")
                )
            }
            AggregationKind::Mean => add(F64, 0, &widened(F64, "value")) + &add(COUNT, 1, "1L"),
            AggregationKind::PopulationVariance | AggregationKind::SampleVariance => {
                add(F64, 0, &widened(F64, "value"))
                    + &add(F64, 1, &format!("{} * value", widened(F64, "value")))
                    + &add(COUNT, 2, "1L")
            }
            AggregationKind::SingleValueNullable => {
                let ty = self.operand;
                format!(
                    "if (!{seen}) {{\n{store}{mark}}} else if (!({same})) {{\n{conflict}}}\n",
                    seen = read("buffer", SEEN, 1),
                    store = indent(&write(ty, 0, "value")),
                    mark = indent(&write(SEEN, 1, "true")),
                    same = equals(ty, &read("buffer", ty, 0), "value"),
                    conflict = indent(&write(SEEN, 2, "true")),
                )
            }
        }
    }

    /// decontribute is the inverse of contribute, for kinds that have one.
    pub fn decontribute(&self) -> Result<String> {
        let acc = self.acc();
        let code = match self.kind {
            AggregationKind::Min | AggregationKind::Max | AggregationKind::SingleValueNullable => {
                return lower_err!(
                    UnsupportedOperation,
                    format!("{} can't remove a contribution", self.kind.tag())
                );
            }
            AggregationKind::Sum if self.operand.is_array() => vector_sum("value", "minus"),
            AggregationKind::Sum => sub(acc, 0, &widened(acc, "value")),
            AggregationKind::SquareSum => sub(acc, 0, &format!("{} * value", widened(acc, "value"))),
            AggregationKind::Short => signed_sum(acc, "<", "-"),
            AggregationKind::Long => signed_sum(acc, ">", "-"),
            AggregationKind::Count => sub(COUNT, 0, "1L"),
            AggregationKind::Multiply => {
                // an emptied product must not keep a stale value
                let product = format!(
                    "{} == 1L ? 0.0 : {} / value",
                    factors("buffer"),
                    read("buffer", F64, 0)
                );
                format!(
                    "if (value == 0) {{\n{}}} else {{\n{}}}\n{}",
                    indent(&sub(COUNT, 2, "1L")),
                    indent(&write(F64, 0, &product)),
                    sub(COUNT, 1, "1L")
                )
            }
            AggregationKind::Mean => sub(F64, 0, &widened(F64, "value")) + &sub(COUNT, 1, "1L"),
            AggregationKind::PopulationVariance | AggregationKind::SampleVariance => {
                sub(F64, 0, &widened(F64, "value"))
                    + &sub(F64, 1, &format!("{} * value", widened(F64, "value")))
                    + &sub(COUNT, 2, "1L")
            }
        };
        Ok(code)
    }

    pub fn merge(&self) -> String {
        let acc = self.acc();
        match self.kind {
            AggregationKind::Sum if self.operand.is_array() => {
                format!(
                    "if ({other} != null) {{\n{body}}}\n",
                    other = read("other", acc, 0),
                    body = indent(&vector_sum(&read("other", acc, 0), "plus"))
                )
            }
            AggregationKind::Sum
            | AggregationKind::SquareSum
            | AggregationKind::Short
            | AggregationKind::Long => merge_add(acc, 0),
            AggregationKind::Count => merge_add(COUNT, 0),
            AggregationKind::Min => extremum(acc, "<", &read("other", acc, 0), Some("other")),
            AggregationKind::Max => extremum(acc, ">", &read("other", acc, 0), Some("other")),
            AggregationKind::Multiply => {
                let product = format!(
                    "{} == 0L ? {} : {} * {}",
                    factors("buffer"),
                    read("other", F64, 0),
                    read("buffer", F64, 0),
                    read("other", F64, 0)
                );
                format!(
                    "if ({} != 0L) {{\n{}}}\n{}{}",
                    factors("other"),
                    indent(&write(F64, 0, &product)),
                    merge_add(COUNT, 1),
                    merge_add(COUNT, 2)
                )
            }
            AggregationKind::Mean => merge_add(F64, 0) + &merge_add(COUNT, 1),
            AggregationKind::PopulationVariance | AggregationKind::SampleVariance => {
                merge_add(F64, 0) + &merge_add(F64, 1) + &merge_add(COUNT, 2)
            }
            AggregationKind::SingleValueNullable => {
                let ty = self.operand;
                let first = format!(
                    "if (!{seen}) {{\n{store}{mark}}} else if (!({same})) {{\n{conflict}}}\n",
                    seen = read("buffer", SEEN, 1),
                    store = indent(&write(ty, 0, &read("other", ty, 0))),
                    mark = indent(&write(SEEN, 1, "true")),
                    same = equals(ty, &read("buffer", ty, 0), &read("other", ty, 0)),
                    conflict = indent(&write(SEEN, 2, "true")),
                );
                let propagate = format!(
                    "if ({}) {{\n{}}}\n",
                    read("other", SEEN, 2),
                    indent(&write(SEEN, 2, "true"))
                );
                format!(
                    "if ({}) {{\n{}}}\n",
                    read("other", SEEN, 1),
                    indent(&(first + &propagate))
                )
            }
        }
    }

    pub fn finalize(&self) -> String {
        let acc = self.acc();
        match self.kind {
            AggregationKind::Sum
            | AggregationKind::SquareSum
            | AggregationKind::Short
            | AggregationKind::Long => format!("return {};\n", boxed(acc, &read("buffer", acc, 0))),
            AggregationKind::Count => format!("return {};\n", boxed(COUNT, &read("buffer", COUNT, 0))),
            AggregationKind::Min | AggregationKind::Max => format!(
                "return {} ? {} : null;\n",
                read("buffer", SEEN, 1),
                boxed(acc, &read("buffer", acc, 0))
            ),
            AggregationKind::Multiply => format!(
                "if ({} == 0L) {{\n    return null;\n}}\nreturn {} != 0L ? Double.valueOf(0.0) : {};\n",
                read("buffer", COUNT, 1),
                read("buffer", COUNT, 2),
                boxed(F64, &read("buffer", F64, 0))
            ),
            AggregationKind::Mean => format!(
                "final long count = {};\nreturn count == 0L ? null : Double.valueOf({} / count);\n",
                read("buffer", COUNT, 1),
                read("buffer", F64, 0)
            ),
            AggregationKind::PopulationVariance => format!(
                "final long count = {count};\n\
                 if (count == 0L) {{\n    return null;\n}}\n\
                 final double mean = {sum} / count;\n\
                 return Double.valueOf({sq} / count - mean * mean);\n",
                count = read("buffer", COUNT, 2),
                sum = read("buffer", F64, 0),
                sq = read("buffer", F64, 1)
            ),
            AggregationKind::SampleVariance => format!(
                "final long count = {count};\n\
                 if (count < 2L) {{\n    return null;\n}}\n\
                 final double sum = {sum};\n\
                 return Double.valueOf(({sq} - sum * sum / count) / (count - 1L));\n",
                count = read("buffer", COUNT, 2),
                sum = read("buffer", F64, 0),
                sq = read("buffer", F64, 1)
            ),
            AggregationKind::SingleValueNullable => format!(
                "return {} && !{} ? {} : null;\n",
                read("buffer", SEEN, 1),
                read("buffer", SEEN, 2),
                boxed(self.operand, &read("buffer", self.operand, 0))
            ),
        }
    }
}

/// factors counts the non-zero values folded into a multiply buffer's
/// product: slot 1 counts every value, slot 2 the zeros.
fn factors(buf: &str) -> String {
    format!("({} - {})", read(buf, COUNT, 1), read(buf, COUNT, 2))
}

fn signed_sum(acc: ScalarType, cmp: &str, sign: &str) -> String {
    let update = if sign == "+" {
        add(acc, 0, &widened(acc, "value"))
    } else {
        sub(acc, 0, &widened(acc, "value"))
    };
    format!("if (value {cmp} 0) {{\n{}}}\n", indent(&update))
}

/// vector_sum adds (or subtracts) `rhs` elementwise into slot 0, taking
/// a copy on first use so the buffer never aliases an input row.
fn vector_sum(rhs: &str, method: &str) -> String {
    let vector = ScalarType::Array(NumericType::Float64);
    let first = if method == "plus" {
        format!("{rhs}.copy()")
    } else {
        format!("VectorArithmetic.negate({rhs})")
    };
    format!(
        "final IVector current = {current};\n{update}",
        current = read("buffer", vector, 0),
        update = write(
            vector,
            0,
            &format!("current == null ? {first} : VectorArithmetic.{method}(current, {rhs})")
        )
    )
}

/// extremum keeps the first value seen on ties: replacement only happens
/// on a strict comparison.
fn extremum(acc: ScalarType, cmp: &str, candidate: &str, from: Option<&str>) -> String {
    let replace = format!(
        "if (!{seen} || {cast} {cmp} {current}) {{\n{store}{mark}}}\n",
        seen = read("buffer", SEEN, 1),
        cast = widened(acc, candidate),
        current = read("buffer", acc, 0),
        store = indent(&write(acc, 0, candidate)),
        mark = indent(&write(SEEN, 1, "true")),
    );
    match from {
        None => replace,
        Some(other) => format!(
            "if ({}) {{\n{}}}\n",
            read(other, SEEN, 1),
            indent(&replace)
        ),
    }
}
