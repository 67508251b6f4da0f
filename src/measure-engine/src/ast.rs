// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::common::ScalarType;

/// A column of a table, the only leaf of an operation that reads data.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: &str, column: &str) -> Self {
        ColumnRef {
            table: table.to_owned(),
            column: column.to_owned(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(OrderedFloat<f32>),
    Float64(OrderedFloat<f64>),
    Text(String),
}

impl Literal {
    pub fn ty(&self) -> ScalarType {
        match self {
            Literal::Bool(_) => ScalarType::Bool,
            Literal::Int32(_) => ScalarType::Int32,
            Literal::Int64(_) => ScalarType::Int64,
            Literal::Float32(_) => ScalarType::Float32,
            Literal::Float64(_) => ScalarType::Float64,
            Literal::Text(_) => ScalarType::Object,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int32(n) => write!(f, "{n}"),
            Literal::Int64(n) => write!(f, "{n}"),
            Literal::Float32(n) => write!(f, "{:?}", n.0),
            Literal::Float64(n) => write!(f, "{:?}", n.0),
            Literal::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Int64(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Int32(n)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Float64(OrderedFloat(n))
    }
}

impl From<f32> for Literal {
    fn from(n: f32) -> Self {
        Literal::Float32(OrderedFloat(n))
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Text(s.to_owned())
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    // higher the precedence, the tighter the binding.
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            ArithmeticOp::Add | ArithmeticOp::Sub => 4,
            ArithmeticOp::Mul | ArithmeticOp::Div => 5,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl ComparisonOp {
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            ComparisonOp::Lt | ComparisonOp::Lte | ComparisonOp::Gt | ComparisonOp::Gte => 3,
            ComparisonOp::Eq | ComparisonOp::Neq => 2,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "==",
            ComparisonOp::Neq => "!=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
        }
    }

    pub fn is_ordering(&self) -> bool {
        !matches!(self, ComparisonOp::Eq | ComparisonOp::Neq)
    }
}

/// Operation is the measure expression IR: a tree over table columns and
/// constants that says nothing about how it will be evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Column(ColumnRef),
    Literal(Literal),
    Arithmetic(ArithmeticOp, Box<Operation>, Box<Operation>),
    Comparison(ComparisonOp, Box<Operation>, Box<Operation>),
    Ternary(Box<Operation>, Box<Operation>, Box<Operation>),
    Apply(String, Vec<Operation>),
}

impl Operation {
    pub fn column(table: &str, column: &str) -> Self {
        Operation::Column(ColumnRef::new(table, column))
    }

    pub fn lit<L: Into<Literal>>(value: L) -> Self {
        Operation::Literal(value.into())
    }

    pub fn ternary(condition: Operation, if_true: Operation, if_false: Operation) -> Self {
        Operation::Ternary(Box::new(condition), Box::new(if_true), Box::new(if_false))
    }

    pub fn apply(function: &str, operands: Vec<Operation>) -> Self {
        Operation::Apply(function.to_owned(), operands)
    }

    fn compare(self, op: ComparisonOp, rhs: Operation) -> Self {
        Operation::Comparison(op, Box::new(self), Box::new(rhs))
    }

    pub fn eq(self, rhs: Operation) -> Self {
        self.compare(ComparisonOp::Eq, rhs)
    }

    pub fn ne(self, rhs: Operation) -> Self {
        self.compare(ComparisonOp::Neq, rhs)
    }

    pub fn lt(self, rhs: Operation) -> Self {
        self.compare(ComparisonOp::Lt, rhs)
    }

    pub fn le(self, rhs: Operation) -> Self {
        self.compare(ComparisonOp::Lte, rhs)
    }

    pub fn gt(self, rhs: Operation) -> Self {
        self.compare(ComparisonOp::Gt, rhs)
    }

    pub fn ge(self, rhs: Operation) -> Self {
        self.compare(ComparisonOp::Gte, rhs)
    }

    /// columns returns every column reference in post-order, the order
    /// the lowering pass reads them in.  Repeated references repeat.
    pub fn columns(&self) -> Vec<&ColumnRef> {
        let mut result = vec![];
        self.collect_columns(&mut result);
        result
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Operation::Column(column) => out.push(column),
            Operation::Literal(_) => {}
            Operation::Arithmetic(_, l, r) | Operation::Comparison(_, l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            Operation::Ternary(c, t, f) => {
                c.collect_columns(out);
                t.collect_columns(out);
                f.collect_columns(out);
            }
            Operation::Apply(_, args) => {
                for arg in args {
                    arg.collect_columns(out);
                }
            }
        }
    }

    /// is_constant is true when the subtree doesn't read any column.
    pub fn is_constant(&self) -> bool {
        self.columns().is_empty()
    }
}

macro_rules! arithmetic_op(
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait for Operation {
            type Output = Operation;

            fn $method(self, rhs: Operation) -> Operation {
                Operation::Arithmetic($op, Box::new(self), Box::new(rhs))
            }
        }
    }
);

arithmetic_op!(Add, add, ArithmeticOp::Add);
arithmetic_op!(Sub, sub, ArithmeticOp::Sub);
arithmetic_op!(Mul, mul, ArithmeticOp::Mul);
arithmetic_op!(Div, div, ArithmeticOp::Div);

fn precedence(op: &Operation) -> Option<u8> {
    match op {
        Operation::Arithmetic(op, _, _) => Some(op.precedence()),
        Operation::Comparison(op, _, _) => Some(op.precedence()),
        Operation::Column(_)
        | Operation::Literal(_)
        | Operation::Ternary(_, _, _)
        | Operation::Apply(_, _) => None,
    }
}

fn paren_if_necessary(parent: u8, child: &Operation, is_rhs: bool) -> String {
    let eqn = print_operation(child);
    match precedence(child) {
        // `a - (b - c)` keeps its parens, `(a - b) - c` doesn't need them
        Some(child) if parent > child || (is_rhs && parent == child) => format!("({eqn})"),
        _ => eqn,
    }
}

pub fn print_operation(op: &Operation) -> String {
    match op {
        Operation::Column(column) => column.to_string(),
        Operation::Literal(lit) => lit.to_string(),
        Operation::Arithmetic(arith, l, r) => {
            let p = arith.precedence();
            format!(
                "{} {} {}",
                paren_if_necessary(p, l, false),
                arith.symbol(),
                paren_if_necessary(p, r, true)
            )
        }
        Operation::Comparison(cmp, l, r) => {
            let p = cmp.precedence();
            format!(
                "{} {} {}",
                paren_if_necessary(p, l, false),
                cmp.symbol(),
                paren_if_necessary(p, r, true)
            )
        }
        Operation::Ternary(c, t, f) => format!(
            "if {} then {} else {}",
            print_operation(c),
            print_operation(t),
            print_operation(f)
        ),
        Operation::Apply(func, args) => {
            let args: Vec<String> = args.iter().map(print_operation).collect();
            format!("{}({})", func, args.join(", "))
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", print_operation(self))
    }
}

#[test]
fn test_print_operation() {
    let a = || Operation::column("sales", "a");
    let b = || Operation::column("sales", "b");

    let cases: Vec<(Operation, &str)> = vec![
        (a() + Operation::lit(3), "sales.a + 3"),
        ((a() + b()) * Operation::lit(2.5), "(sales.a + sales.b) * 2.5"),
        (a() * b() + Operation::lit(1), "sales.a * sales.b + 1"),
        (a() - (b() - Operation::lit(1)), "sales.a - (sales.b - 1)"),
        ((a() - b()) - Operation::lit(1), "sales.a - sales.b - 1"),
        (
            Operation::ternary(a().gt(Operation::lit(0)), a(), Operation::lit(0)),
            "if sales.a > 0 then sales.a else 0",
        ),
        (
            Operation::apply("array_sum", vec![Operation::column("t", "vec")]),
            "array_sum(t.vec)",
        ),
        (a().eq(Operation::lit("x")), "sales.a == \"x\""),
    ];

    for (op, expected) in cases {
        assert_eq!(expected, op.to_string());
    }
}

#[test]
fn test_columns_post_order() {
    let op = Operation::ternary(
        Operation::column("t", "c").gt(Operation::lit(1)),
        Operation::column("t", "a") + Operation::column("t", "b"),
        Operation::column("t", "a"),
    );
    let names: Vec<String> = op.columns().iter().map(|c| c.column.clone()).collect();
    assert_eq!(vec!["c", "a", "b", "a"], names);
    assert!(!op.is_constant());
    assert!((Operation::lit(1) + Operation::lit(2)).is_constant());
}

#[test]
fn test_literal_defaults() {
    assert_eq!(ScalarType::Int64, Literal::from(3i64).ty());
    assert_eq!(ScalarType::Float64, Literal::from(3.0).ty());
    assert_eq!(ScalarType::Int32, Literal::from(3i32).ty());
    assert_eq!(ScalarType::Object, Literal::from("x").ty());
    // Rust's own fallback makes `lit(3)` an i32
    assert_eq!(Operation::Literal(Literal::Int32(3)), Operation::lit(3));
    assert_eq!(
        Operation::Literal(Literal::Int64(3)),
        Operation::lit(3i64)
    );
}

#[test]
fn test_operation_json_form() {
    let op = Operation::column("t", "a") + Operation::lit(3i64);
    let json = serde_json::to_string(&op).unwrap();
    assert_eq!(
        r#"{"arithmetic":["add",{"column":{"table":"t","column":"a"}},{"literal":{"int64":3}}]}"#,
        json
    );
    let back: Operation = serde_json::from_str(&json).unwrap();
    assert_eq!(op, back);
}
