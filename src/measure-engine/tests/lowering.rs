// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! End-to-end lowering: requests in, registration records out, checked
//! against the reference interpreter where the numbers matter.

use float_cmp::approx_eq;
use proptest::prelude::*;

use measure_engine::compiler::kinds::ALL_KINDS;
use measure_engine::interpreter::{Row, aggregate};
use measure_engine::{
    AggregationKind, AggregationRequest, AggregationState, ColumnRef, Compiler, ErrorCode,
    FunctionCatalog, NumericType, Operation, RegistrationSet, RowEvaluator, ScalarType,
    TableSchema, Value,
};

fn schema() -> TableSchema {
    TableSchema::new()
        .with_column("t", "column_a", ScalarType::Int32)
        .with_column("t", "column_b", ScalarType::Int64)
        .with_column("t", "price", ScalarType::Float64)
        .with_column("t", "flag", ScalarType::Bool)
        .with_column("t", "label", ScalarType::Object)
        .with_column("t", "history", ScalarType::Array(NumericType::Int32))
}

#[test]
fn int_column_plus_constant_sums_into_long() {
    let schema = schema();
    let catalog = FunctionCatalog::new();
    let compiler = Compiler::new(&schema, &catalog);

    let request = AggregationRequest::new(
        Operation::column("t", "column_a") + Operation::lit(3i64),
        AggregationKind::Sum,
    );
    let artifact = compiler.compile(&request).unwrap();

    assert_eq!(ScalarType::Int64, artifact.output_type);
    assert_eq!(vec![ScalarType::Int64], artifact.buffer_types.to_vec());
    assert_eq!(1, artifact.contribute_code.matches("input.readInt(0)").count());
    assert_eq!(vec![ColumnRef::new("t", "column_a")], artifact.input_columns);

    let record = artifact.to_record();
    assert_eq!("SUM", record.kind_tag);
    assert_eq!(vec!["t.column_a".to_owned()], record.input_columns);
    assert_eq!(Ok(()), record.validate());
}

#[test]
fn every_kind_produces_a_valid_record() {
    let schema = schema();
    let catalog = FunctionCatalog::new();
    let compiler = Compiler::new(&schema, &catalog);

    let mut registry = RegistrationSet::new();
    for kind in ALL_KINDS {
        let mut request = AggregationRequest::new(Operation::column("t", "price"), kind)
            .filter(Operation::column("t", "column_b").ne(Operation::lit(0i64)));
        if kind.supports_decontribution() {
            request = request.retractable();
        }
        let artifact = compiler.compile(&request).unwrap();
        assert_eq!(
            kind.supports_decontribution(),
            artifact.decontribute_code.is_some(),
            "{kind}"
        );
        registry.register(artifact.to_record()).unwrap();
    }
    assert_eq!(ALL_KINDS.len(), registry.len());
}

#[test]
fn compiling_twice_registers_once() {
    let schema = schema();
    let catalog = FunctionCatalog::new();
    let compiler = Compiler::new(&schema, &catalog);
    let request = AggregationRequest::new(
        Operation::apply("array_sum", vec![Operation::column("t", "history")]),
        AggregationKind::Mean,
    );

    let mut registry = RegistrationSet::new();
    let first = registry
        .register(compiler.compile(&request).unwrap().to_record())
        .unwrap();
    let second = registry
        .register(compiler.compile(&request).unwrap().to_record())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(1, registry.len());
}

#[test]
fn lowering_failures() {
    let schema = schema();
    let catalog = FunctionCatalog::new();
    let compiler = Compiler::new(&schema, &catalog);
    let failures = [
        (
            AggregationRequest::new(Operation::column("t", "label"), AggregationKind::Count),
            ErrorCode::UnsupportedType,
        ),
        (
            AggregationRequest::new(Operation::column("t", "flag"), AggregationKind::Sum),
            ErrorCode::UnsupportedType,
        ),
        (
            AggregationRequest::new(Operation::column("t", "price"), AggregationKind::Max)
                .retractable(),
            ErrorCode::UnsupportedOperation,
        ),
        (
            AggregationRequest::new(
                Operation::column("t", "price") + Operation::lit("x"),
                AggregationKind::Sum,
            ),
            ErrorCode::UnsupportedType,
        ),
        (
            AggregationRequest::new(Operation::column("u", "price"), AggregationKind::Sum),
            ErrorCode::NotFound,
        ),
        (
            AggregationRequest::new(
                Operation::apply("array_sum", vec![Operation::column("t", "price")]),
                AggregationKind::Sum,
            ),
            ErrorCode::UnsupportedOperation,
        ),
    ];
    for (request, code) in failures {
        let err = compiler.compile(&request).unwrap_err();
        assert_eq!(code, err.code, "{}", request.display_name());
    }
}

#[test]
fn interpreter_follows_filters_and_kinds() {
    let rows: Vec<Row> = [(1, 2.0), (0, 100.0), (3, 4.0), (5, 6.0)]
        .iter()
        .map(|(b, price)| {
            Row::from([
                (ColumnRef::new("t", "column_b"), Value::Int(*b)),
                (ColumnRef::new("t", "price"), Value::Float(*price)),
            ])
        })
        .collect();
    let request = AggregationRequest::new(Operation::column("t", "price"), AggregationKind::Mean)
        .filter(Operation::column("t", "column_b").ne(Operation::lit(0i64)));

    let mut left = AggregationState::new(request.kind, ScalarType::Float64).unwrap();
    let mut right = AggregationState::new(request.kind, ScalarType::Float64).unwrap();
    for (i, row) in rows.iter().enumerate() {
        let eval = RowEvaluator::new(row);
        if !eval.passes(&request.filters).unwrap() {
            continue;
        }
        let value = eval.eval(&request.operand).unwrap();
        if i % 2 == 0 {
            left.contribute(&value);
        } else {
            right.contribute(&value);
        }
    }
    left.merge(&right);
    let Value::Float(mean) = left.finalize() else {
        panic!("mean should be a float");
    };
    assert!(approx_eq!(f64, 4.0, mean));
}

#[test]
fn contribute_then_decontribute_is_identity() {
    let mut state = AggregationState::new(AggregationKind::Sum, ScalarType::Int32).unwrap();
    state.contribute(&Value::Int(4));
    let before = state.clone();
    state.contribute(&Value::Int(9));
    state.decontribute(&Value::Int(9)).unwrap();
    assert_eq!(before, state);

    let mut min = AggregationState::new(AggregationKind::Min, ScalarType::Int32).unwrap();
    min.contribute(&Value::Int(4));
    assert_eq!(
        ErrorCode::UnsupportedOperation,
        min.decontribute(&Value::Int(4)).unwrap_err().code
    );
}

#[test]
fn empty_aggregations() {
    let none: [Value; 0] = [];
    for kind in [
        AggregationKind::Min,
        AggregationKind::Max,
        AggregationKind::Mean,
        AggregationKind::Multiply,
        AggregationKind::PopulationVariance,
        AggregationKind::SingleValueNullable,
    ] {
        assert_eq!(Ok(Value::Null), aggregate(kind, ScalarType::Float64, &none), "{kind}");
    }
    assert_eq!(Ok(Value::Float(0.0)), aggregate(AggregationKind::Sum, ScalarType::Float64, &none));
    assert_eq!(Ok(Value::Int(0)), aggregate(AggregationKind::Count, ScalarType::Float64, &none));
}

fn arb_column() -> impl Strategy<Value = Operation> {
    prop_oneof![
        Just(Operation::column("t", "column_a")),
        Just(Operation::column("t", "column_b")),
        Just(Operation::column("t", "price")),
    ]
}

fn arb_operand() -> impl Strategy<Value = Operation> {
    let leaf = prop_oneof![
        arb_column(),
        any::<i32>().prop_map(|n| Operation::lit(n)),
        (-1.0e6f64..1.0e6).prop_map(|n| Operation::lit(n)),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l + r),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l - r),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l * r),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| l / r),
            (inner.clone(), inner.clone(), inner.clone())
                .prop_map(|(c, t, f)| Operation::ternary(c.gt(Operation::lit(0)), t, f)),
            inner.prop_map(|x| Operation::apply("abs", vec![x])),
        ]
    })
}

proptest! {
    #[test]
    fn lowering_is_deterministic(operand in arb_operand(), kind_index in 0..ALL_KINDS.len()) {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let compiler = Compiler::new(&schema, &catalog);
        let request = AggregationRequest::new(operand, ALL_KINDS[kind_index]);

        let first = compiler.compile(&request).unwrap();
        let second = compiler.compile(&request).unwrap();
        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first.to_record().fingerprint(), second.to_record().fingerprint());
        prop_assert!(first.to_record().validate().is_ok());

        let operand_type = compiler.lower(&request.operand).unwrap().ty;
        let layout = request.kind.generator(operand_type).unwrap().buffer_types();
        prop_assert_eq!(layout, first.buffer_types);
    }
}
