// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! A direct evaluator for operations and aggregation buffers.  It follows
//! the generated code step for step, so it can stand in for the engine
//! when checking results and when evaluating scopes.

use std::collections::BTreeMap;
use std::fmt;

use crate::ast::{ArithmeticOp, ColumnRef, ComparisonOp, Literal, Operation};
use crate::common::{Result, ScalarType};
use crate::compiler::kinds::AggregationKind;
use crate::lower_err;

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Array(Vec<f64>),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Float(n) => Some(*n as i64),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The zero a buffer slot of the given type starts from.
    fn initial(ty: ScalarType) -> Value {
        match ty {
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Int32 | ScalarType::Int64 => Value::Int(0),
            ScalarType::Float32 | ScalarType::Float64 => Value::Float(0.0),
            ScalarType::Array(_) | ScalarType::Object => Value::Null,
        }
    }
}

impl From<&Literal> for Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int32(n) => Value::Int(*n as i64),
            Literal::Int64(n) => Value::Int(*n),
            Literal::Float32(n) => Value::Float(n.0 as f64),
            Literal::Float64(n) => Value::Float(n.0),
            Literal::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Array(v) => write!(f, "{v:?}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

pub type Row = BTreeMap<ColumnRef, Value>;

fn arithmetic(op: ArithmeticOp, l: &Value, r: &Value) -> Result<Value> {
    let value = match (l, r) {
        (Value::Null, _) | (_, Value::Null) => Value::Null,
        (Value::Array(a), Value::Array(b)) => {
            if a.len() != b.len() {
                return lower_err!(
                    UnsupportedOperation,
                    format!("arrays of length {} and {} can't be combined", a.len(), b.len())
                );
            }
            let f = |x: f64, y: f64| match op {
                ArithmeticOp::Add => x + y,
                ArithmeticOp::Sub => x - y,
                ArithmeticOp::Mul => x * y,
                ArithmeticOp::Div => x / y,
            };
            Value::Array(a.iter().zip(b).map(|(x, y)| f(*x, *y)).collect())
        }
        (Value::Int(a), Value::Int(b)) if op != ArithmeticOp::Div => Value::Int(match op {
            ArithmeticOp::Add => a.wrapping_add(*b),
            ArithmeticOp::Sub => a.wrapping_sub(*b),
            _ => a.wrapping_mul(*b),
        }),
        _ => {
            let (Some(a), Some(b)) = (l.as_f64(), r.as_f64()) else {
                return lower_err!(
                    UnsupportedOperation,
                    format!("can't apply '{}' to {l} and {r}", op.symbol())
                );
            };
            Value::Float(match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Sub => a - b,
                ArithmeticOp::Mul => a * b,
                ArithmeticOp::Div => a / b,
            })
        }
    };
    Ok(value)
}

fn comparison(op: ComparisonOp, l: &Value, r: &Value) -> Result<Value> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Null);
    }
    let ordering = match (l, r) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ if !op.is_ordering() => {
                let same = l == r;
                let result = if op == ComparisonOp::Eq { same } else { !same };
                return Ok(Value::Bool(result));
            }
            _ => {
                return lower_err!(
                    UnsupportedOperation,
                    format!("can't order {l} and {r}")
                );
            }
        },
    };
    // NaN compares false with everything, and unequal to itself
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(op == ComparisonOp::Neq));
    };
    let result = match op {
        ComparisonOp::Eq => ordering.is_eq(),
        ComparisonOp::Neq => ordering.is_ne(),
        ComparisonOp::Lt => ordering.is_lt(),
        ComparisonOp::Lte => ordering.is_le(),
        ComparisonOp::Gt => ordering.is_gt(),
        ComparisonOp::Gte => ordering.is_ge(),
    };
    Ok(Value::Bool(result))
}

fn array_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a [f64]> {
    match args.first() {
        Some(Value::Array(v)) => Ok(v.as_slice()),
        _ => lower_err!(UnsupportedOperation, format!("{name} expects an array")),
    }
}

fn apply(name: &str, args: &[Value]) -> Result<Value> {
    if args.iter().any(Value::is_null) {
        return Ok(Value::Null);
    }
    let numeric = |i: usize| -> Result<f64> {
        match args.get(i).and_then(Value::as_f64) {
            Some(n) => Ok(n),
            None => lower_err!(
                UnsupportedOperation,
                format!("{name} expects a number at position {i}")
            ),
        }
    };
    let array = || array_arg(name, args);

    let value = match name {
        "abs" => match args.first() {
            Some(Value::Int(n)) => Value::Int(n.wrapping_abs()),
            _ => Value::Float(numeric(0)?.abs()),
        },
        "sqrt" => Value::Float(numeric(0)?.sqrt()),
        "exp" => Value::Float(numeric(0)?.exp()),
        "log" => Value::Float(numeric(0)?.ln()),
        "max" | "min" => match (args.first(), args.get(1)) {
            (Some(Value::Int(a)), Some(Value::Int(b))) => {
                Value::Int(if name == "max" { *a.max(b) } else { *a.min(b) })
            }
            _ => {
                let (a, b) = (numeric(0)?, numeric(1)?);
                Value::Float(if name == "max" { a.max(b) } else { a.min(b) })
            }
        },
        "array_sum" => Value::Float(array()?.iter().sum()),
        "array_mean" => {
            let v = array()?;
            if v.is_empty() {
                Value::Float(0.0)
            } else {
                Value::Float(v.iter().sum::<f64>() / v.len() as f64)
            }
        }
        "array_len" => Value::Int(array()?.len() as i64),
        _ => return lower_err!(NotFound, format!("unknown function '{name}'")),
    };
    Ok(value)
}

/// RowEvaluator computes the value of an operation for one input row.
pub struct RowEvaluator<'a> {
    row: &'a Row,
}

impl<'a> RowEvaluator<'a> {
    pub fn new(row: &'a Row) -> Self {
        RowEvaluator { row }
    }

    pub fn eval(&self, op: &Operation) -> Result<Value> {
        match op {
            Operation::Column(column) => match self.row.get(column) {
                Some(value) => Ok(value.clone()),
                None => lower_err!(NotFound, format!("row has no column '{column}'")),
            },
            Operation::Literal(lit) => Ok(lit.into()),
            Operation::Arithmetic(op, l, r) => arithmetic(*op, &self.eval(l)?, &self.eval(r)?),
            Operation::Comparison(op, l, r) => comparison(*op, &self.eval(l)?, &self.eval(r)?),
            Operation::Ternary(c, t, f) => match self.eval(c)? {
                Value::Null => Ok(Value::Null),
                Value::Bool(true) => self.eval(t),
                Value::Bool(false) => self.eval(f),
                other => lower_err!(
                    UnsupportedType,
                    format!("condition evaluated to {other}, not a bool")
                ),
            },
            Operation::Apply(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>>>()?;
                apply(name, &args)
            }
        }
    }

    /// passes is true when every filter holds for the row.
    pub fn passes(&self, filters: &[Operation]) -> Result<bool> {
        for filter in filters {
            if self.eval(filter)?.as_bool() != Some(true) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// AggregationState is one aggregation buffer and the lifecycle the
/// generated code runs on it.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregationState {
    kind: AggregationKind,
    slots: Vec<Value>,
}

fn add(a: &Value, b: &Value, sign: f64) -> Value {
    match (a, b) {
        (Value::Null, Value::Array(v)) => Value::Array(v.iter().map(|x| sign * x).collect()),
        (Value::Array(a), Value::Array(b)) => {
            Value::Array(a.iter().zip(b).map(|(x, y)| x + sign * y).collect())
        }
        (Value::Int(a), _) => {
            let b = b.as_i64().unwrap_or(0);
            Value::Int(if sign < 0.0 {
                a.wrapping_sub(b)
            } else {
                a.wrapping_add(b)
            })
        }
        _ => Value::Float(a.as_f64().unwrap_or(0.0) + sign * b.as_f64().unwrap_or(0.0)),
    }
}

fn square(v: &Value) -> Value {
    match v {
        Value::Int(n) => Value::Int(n.wrapping_mul(*n)),
        _ => Value::Float(v.as_f64().map(|n| n * n).unwrap_or(0.0)),
    }
}

fn count(slot: &Value) -> i64 {
    slot.as_i64().unwrap_or(0)
}

/// factors is the number of non-zero values folded into a multiply
/// buffer's product.
fn factors(slots: &[Value]) -> i64 {
    count(&slots[1]) - count(&slots[2])
}

fn seen(slot: &Value) -> bool {
    slot.as_bool().unwrap_or(false)
}

/// strictly_beyond is `candidate > current` for max and `<` for min.
pub(crate) fn strictly_beyond(candidate: &Value, current: &Value, max: bool) -> bool {
    let ordering = match (candidate, current) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        _ => match (candidate.as_f64(), current.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };
    match ordering {
        Some(o) if max => o.is_gt(),
        Some(o) => o.is_lt(),
        None => false,
    }
}

impl AggregationState {
    pub fn new(kind: AggregationKind, operand: ScalarType) -> Result<Self> {
        let generator = kind.generator(operand)?;
        let slots = generator
            .buffer_types()
            .iter()
            .map(|ty| Value::initial(*ty))
            .collect();
        Ok(AggregationState { kind, slots })
    }

    pub fn kind(&self) -> AggregationKind {
        self.kind
    }

    pub fn slots(&self) -> &[Value] {
        &self.slots
    }

    /// Null values don't contribute.
    pub fn contribute(&mut self, value: &Value) {
        if value.is_null() {
            return;
        }
        let s = &mut self.slots;
        match self.kind {
            AggregationKind::Sum => {
                // a fresh vector buffer takes a copy of the first value
                s[0] = match (&s[0], value) {
                    (Value::Null, Value::Array(v)) => Value::Array(v.clone()),
                    (current, _) => add(current, value, 1.0),
                }
            }
            AggregationKind::SquareSum => s[0] = add(&s[0], &square(value), 1.0),
            AggregationKind::Short => {
                if value.as_f64().is_some_and(|v| v < 0.0) {
                    s[0] = add(&s[0], value, 1.0);
                }
            }
            AggregationKind::Long => {
                if value.as_f64().is_some_and(|v| v > 0.0) {
                    s[0] = add(&s[0], value, 1.0);
                }
            }
            AggregationKind::Count => s[0] = Value::Int(count(&s[0]) + 1),
            AggregationKind::Min | AggregationKind::Max => {
                let max = self.kind == AggregationKind::Max;
                if !seen(&s[1]) || strictly_beyond(value, &s[0], max) {
                    s[0] = match (&s[0], value) {
                        (Value::Float(_), _) => Value::Float(value.as_f64().unwrap_or(0.0)),
                        _ => value.clone(),
                    };
                    s[1] = Value::Bool(true);
                }
            }
            AggregationKind::Multiply => {
                let v = value.as_f64().unwrap_or(0.0);
                if v == 0.0 {
                    s[2] = Value::Int(count(&s[2]) + 1);
                } else if factors(s) == 0 {
                    s[0] = Value::Float(v);
                } else {
                    s[0] = Value::Float(s[0].as_f64().unwrap_or(0.0) * v);
                }
                s[1] = Value::Int(count(&s[1]) + 1);
            }
            AggregationKind::Mean => {
                s[0] = add(&s[0], value, 1.0);
                s[1] = Value::Int(count(&s[1]) + 1);
            }
            AggregationKind::PopulationVariance | AggregationKind::SampleVariance => {
                let v = value.as_f64().unwrap_or(0.0);
                s[0] = Value::Float(s[0].as_f64().unwrap_or(0.0) + v);
                s[1] = Value::Float(s[1].as_f64().unwrap_or(0.0) + v * v);
                s[2] = Value::Int(count(&s[2]) + 1);
            }
            AggregationKind::SingleValueNullable => {
                if !seen(&s[1]) {
                    s[0] = value.clone();
                    s[1] = Value::Bool(true);
                } else if s[0] != *value {
                    s[2] = Value::Bool(true);
                }
            }
        }
    }

    pub fn decontribute(&mut self, value: &Value) -> Result<()> {
        if !self.kind.supports_decontribution() {
            return lower_err!(
                UnsupportedOperation,
                format!("{} can't remove a contribution", self.kind.tag())
            );
        }
        if value.is_null() {
            return Ok(());
        }
        let s = &mut self.slots;
        match self.kind {
            AggregationKind::Sum => s[0] = add(&s[0], value, -1.0),
            AggregationKind::SquareSum => s[0] = add(&s[0], &square(value), -1.0),
            AggregationKind::Short => {
                if value.as_f64().is_some_and(|v| v < 0.0) {
                    s[0] = add(&s[0], value, -1.0);
                }
            }
            AggregationKind::Long => {
                if value.as_f64().is_some_and(|v| v > 0.0) {
                    s[0] = add(&s[0], value, -1.0);
                }
            }
            AggregationKind::Count => s[0] = Value::Int(count(&s[0]) - 1),
            AggregationKind::Multiply => {
                let v = value.as_f64().unwrap_or(0.0);
                if v == 0.0 {
                    s[2] = Value::Int(count(&s[2]) - 1);
                } else if factors(s) == 1 {
                    s[0] = Value::Float(0.0);
                } else {
                    s[0] = Value::Float(s[0].as_f64().unwrap_or(0.0) / v);
                }
                s[1] = Value::Int(count(&s[1]) - 1);
            }
            AggregationKind::Mean => {
                s[0] = add(&s[0], value, -1.0);
                s[1] = Value::Int(count(&s[1]) - 1);
            }
            AggregationKind::PopulationVariance | AggregationKind::SampleVariance => {
                let v = value.as_f64().unwrap_or(0.0);
                s[0] = Value::Float(s[0].as_f64().unwrap_or(0.0) - v);
                s[1] = Value::Float(s[1].as_f64().unwrap_or(0.0) - v * v);
                s[2] = Value::Int(count(&s[2]) - 1);
            }
            AggregationKind::Min | AggregationKind::Max | AggregationKind::SingleValueNullable => {
                unreachable!("rejected above")
            }
        }
        Ok(())
    }

    /// merge folds `other`, a buffer of the same kind, into this one.
    pub fn merge(&mut self, other: &AggregationState) {
        let s = &mut self.slots;
        let o = &other.slots;
        match self.kind {
            AggregationKind::Sum => {
                if !o[0].is_null() {
                    s[0] = match &s[0] {
                        Value::Null => o[0].clone(),
                        current => add(current, &o[0], 1.0),
                    };
                }
            }
            AggregationKind::SquareSum
            | AggregationKind::Short
            | AggregationKind::Long
            | AggregationKind::Count => s[0] = add(&s[0], &o[0], 1.0),
            AggregationKind::Min | AggregationKind::Max => {
                let max = self.kind == AggregationKind::Max;
                if seen(&o[1]) && (!seen(&s[1]) || strictly_beyond(&o[0], &s[0], max)) {
                    s[0] = o[0].clone();
                    s[1] = Value::Bool(true);
                }
            }
            AggregationKind::Multiply => {
                if factors(o) != 0 {
                    s[0] = if factors(s) == 0 {
                        o[0].clone()
                    } else {
                        Value::Float(s[0].as_f64().unwrap_or(0.0) * o[0].as_f64().unwrap_or(0.0))
                    };
                }
                s[1] = Value::Int(count(&s[1]) + count(&o[1]));
                s[2] = Value::Int(count(&s[2]) + count(&o[2]));
            }
            AggregationKind::Mean => {
                s[0] = add(&s[0], &o[0], 1.0);
                s[1] = Value::Int(count(&s[1]) + count(&o[1]));
            }
            AggregationKind::PopulationVariance | AggregationKind::SampleVariance => {
                s[0] = add(&s[0], &o[0], 1.0);
                s[1] = add(&s[1], &o[1], 1.0);
                s[2] = Value::Int(count(&s[2]) + count(&o[2]));
            }
            AggregationKind::SingleValueNullable => {
                if seen(&o[1]) {
                    if !seen(&s[1]) {
                        s[0] = o[0].clone();
                        s[1] = Value::Bool(true);
                    } else if s[0] != o[0] {
                        s[2] = Value::Bool(true);
                    }
                    if seen(&o[2]) {
                        s[2] = Value::Bool(true);
                    }
                }
            }
        }
    }

    pub fn finalize(&self) -> Value {
        let s = &self.slots;
        match self.kind {
            AggregationKind::Sum
            | AggregationKind::SquareSum
            | AggregationKind::Short
            | AggregationKind::Long
            | AggregationKind::Count => s[0].clone(),
            AggregationKind::Min | AggregationKind::Max => {
                if seen(&s[1]) {
                    s[0].clone()
                } else {
                    Value::Null
                }
            }
            AggregationKind::Multiply => match (count(&s[1]), count(&s[2])) {
                (0, _) => Value::Null,
                (_, 0) => s[0].clone(),
                _ => Value::Float(0.0),
            },
            AggregationKind::Mean => match count(&s[1]) {
                0 => Value::Null,
                n => Value::Float(s[0].as_f64().unwrap_or(0.0) / n as f64),
            },
            AggregationKind::PopulationVariance => match count(&s[2]) {
                0 => Value::Null,
                n => {
                    let n = n as f64;
                    let mean = s[0].as_f64().unwrap_or(0.0) / n;
                    Value::Float(s[1].as_f64().unwrap_or(0.0) / n - mean * mean)
                }
            },
            AggregationKind::SampleVariance => match count(&s[2]) {
                n if n < 2 => Value::Null,
                n => {
                    let sum = s[0].as_f64().unwrap_or(0.0);
                    let sq = s[1].as_f64().unwrap_or(0.0);
                    let n = n as f64;
                    Value::Float((sq - sum * sum / n) / (n - 1.0))
                }
            },
            AggregationKind::SingleValueNullable => {
                if seen(&s[1]) && !seen(&s[2]) {
                    s[0].clone()
                } else {
                    Value::Null
                }
            }
        }
    }
}

/// aggregate runs a whole contribute/finalize cycle over `values`.
pub fn aggregate<'a, I>(kind: AggregationKind, operand: ScalarType, values: I) -> Result<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut state = AggregationState::new(kind, operand)?;
    for value in values {
        state.contribute(value);
    }
    Ok(state.finalize())
}
