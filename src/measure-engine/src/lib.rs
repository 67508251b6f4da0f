// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod ast;
pub mod catalog;
pub mod common;
pub mod compiler;
pub mod interpreter;
pub mod registration;
pub mod schema;
pub mod scope;

pub use self::ast::{ArithmeticOp, ColumnRef, ComparisonOp, Literal, Operation};
pub use self::catalog::{Function, FunctionCatalog};
pub use self::common::{Error, ErrorCode, ErrorKind, NumericType, Result, ScalarType, promote};
pub use self::compiler::kinds::AggregationKind;
pub use self::compiler::{AggregationRequest, Compiler};
pub use self::interpreter::{AggregationState, RowEvaluator, Value};
pub use self::registration::{AggregationArtifact, RegistrationRecord, RegistrationSet};
pub use self::schema::{Schema, TableSchema};
pub use self::scope::config::ScopeDef;
pub use self::scope::{
    HierarchyCoordinates, Level, LevelCoordinates, LevelType, Scope, ScopeDescriptor, WindowArg,
};
