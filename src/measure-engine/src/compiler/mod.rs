// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ast::Operation;
use crate::catalog::FunctionCatalog;
use crate::common::Result;
use crate::lower_err;
use crate::registration::AggregationArtifact;
use crate::schema::Schema;

pub mod element;
pub mod java;
pub mod kinds;
pub mod methods;
pub mod visitor;

use element::JavaOperationElement;
use kinds::{AggregationKind, indent};
use visitor::OperationVisitor;

/// What to aggregate, how, and under which conditions.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub operand: Operation,
    pub kind: AggregationKind,
    /// contributions only count when every filter holds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Operation>,
    /// whether the engine may need to remove contributions again
    #[serde(default)]
    pub retractable: bool,
}

impl AggregationRequest {
    pub fn new(operand: Operation, kind: AggregationKind) -> Self {
        AggregationRequest {
            name: None,
            operand,
            kind,
            filters: vec![],
            retractable: false,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_owned());
        self
    }

    pub fn filter(mut self, filter: Operation) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn retractable(mut self) -> Self {
        self.retractable = true;
        self
    }

    pub fn display_name(&self) -> String {
        match self.name {
            Some(ref name) => name.clone(),
            None => format!("{}({})", self.kind.tag(), self.operand),
        }
    }
}

/// Compiler turns aggregation requests into artifacts.  It holds only
/// shared references, so one instance can serve many threads.
pub struct Compiler<'a> {
    schema: &'a dyn Schema,
    catalog: &'a FunctionCatalog,
}

fn update_body(operand: &JavaOperationElement, body: &str, filter: Option<&JavaOperationElement>) -> String {
    let code = format!(
        "final {} value = {};\n{}",
        java::java_type(operand.ty),
        operand.expr,
        body
    );
    match filter {
        Some(filter) => format!("if ({}) {{\n{}}}\n", filter.expr, indent(&code)),
        None => code,
    }
}

impl<'a> Compiler<'a> {
    pub fn new(schema: &'a dyn Schema, catalog: &'a FunctionCatalog) -> Self {
        Compiler { schema, catalog }
    }

    /// lower compiles just the operand, without any aggregation around it.
    pub fn lower(&self, operand: &Operation) -> Result<JavaOperationElement> {
        OperationVisitor::new(self.schema, self.catalog).walk(operand)
    }

    pub fn compile(&self, request: &AggregationRequest) -> Result<AggregationArtifact> {
        let name = request.display_name();
        debug!(%name, kind = %request.kind, "compiling aggregation");

        let mut visitor = OperationVisitor::new(self.schema, self.catalog);
        let operand = visitor.walk(&request.operand)?;
        let filter = visitor.lower_filters(&request.filters)?;
        let generator = request.kind.generator(operand.ty)?;

        let decontribute = if request.retractable {
            if !request.kind.supports_decontribution() {
                return lower_err!(
                    UnsupportedOperation,
                    format!("{name}: {} aggregations can't be retracted", request.kind.tag())
                );
            }
            Some(update_body(&operand, &generator.decontribute()?, filter.as_ref()))
        } else {
            None
        };
        let contribute = update_body(&operand, &generator.contribute(), filter.as_ref());

        let buffer_types = generator.buffer_types();
        let output_type = generator.output_type();

        let mut imports: BTreeSet<String> = operand.imports;
        let mut methods = operand.methods;
        if let Some(filter) = filter {
            imports.extend(filter.imports);
            methods.extend(filter.methods);
        }
        imports.extend(generator.imports().into_iter().map(|i| i.to_owned()));
        for ty in buffer_types.iter().chain(std::iter::once(&output_type)) {
            if let Some(import) = java::type_imports(*ty) {
                imports.insert(import.to_owned());
            }
        }

        Ok(AggregationArtifact {
            name,
            kind: request.kind,
            imports: imports.into_iter().collect(),
            extra_methods: methods.into_vec(),
            input_columns: visitor.into_columns(),
            contribute_code: contribute,
            decontribute_code: decontribute,
            merge_code: generator.merge(),
            finalize_code: generator.finalize(),
            buffer_types,
            output_type,
        })
    }

    /// compile_batch compiles every request, in parallel where threads
    /// are available.  Results are in request order.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn compile_batch(&self, requests: &[AggregationRequest]) -> Vec<Result<AggregationArtifact>> {
        use rayon::prelude::*;

        requests.par_iter().map(|r| self.compile(r)).collect()
    }

    #[cfg(target_arch = "wasm32")]
    pub fn compile_batch(&self, requests: &[AggregationRequest]) -> Vec<Result<AggregationArtifact>> {
        requests.iter().map(|r| self.compile(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, NumericType, ScalarType};
    use crate::schema::TableSchema;

    fn schema() -> TableSchema {
        TableSchema::new()
            .with_column("sales", "quantity", ScalarType::Int32)
            .with_column("sales", "price", ScalarType::Float64)
            .with_column("sales", "history", ScalarType::Array(NumericType::Float32))
    }

    #[test]
    fn test_compile_sum() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let compiler = Compiler::new(&schema, &catalog);

        let request = AggregationRequest::new(
            Operation::column("sales", "quantity") * Operation::column("sales", "price"),
            AggregationKind::Sum,
        );
        let artifact = compiler.compile(&request).unwrap();
        assert_eq!("SUM(sales.quantity * sales.price)", artifact.name);
        assert_eq!(
            "final double value = Arithmetic.times(input.readInt(0), input.readDouble(1));\n\
             buffer.writeDouble(0, buffer.readDouble(0) + (double) value);\n",
            artifact.contribute_code
        );
        assert_eq!(None, artifact.decontribute_code);
        assert_eq!(vec!["io.measure.runtime.Arithmetic"], artifact.imports);
        assert_eq!(ScalarType::Float64, artifact.output_type);
        assert_eq!(Ok(()), artifact.to_record().validate());
    }

    #[test]
    fn test_compile_filtered_retractable() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let compiler = Compiler::new(&schema, &catalog);

        let request = AggregationRequest::new(Operation::column("sales", "price"), AggregationKind::Mean)
            .filter(Operation::column("sales", "quantity").gt(Operation::lit(0)))
            .retractable();
        let artifact = compiler.compile(&request).unwrap();
        assert!(artifact.contribute_code.starts_with("if (Comparison.gt(input.readInt(1), 0)) {\n    final double value"));
        let decontribute = artifact.decontribute_code.as_deref().unwrap();
        assert!(decontribute.contains("buffer.readLong(1) - 1L"));
        assert_eq!(2, artifact.input_columns.len());
        assert_eq!(Ok(()), artifact.to_record().validate());

        let request = AggregationRequest::new(Operation::column("sales", "price"), AggregationKind::Min)
            .retractable();
        let err = compiler.compile(&request).unwrap_err();
        assert_eq!(ErrorCode::UnsupportedOperation, err.code);
    }

    #[test]
    fn test_compile_array_sum() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let compiler = Compiler::new(&schema, &catalog);

        let request = AggregationRequest::new(Operation::column("sales", "history"), AggregationKind::Sum);
        let artifact = compiler.compile(&request).unwrap();
        assert_eq!(
            vec![
                "io.measure.runtime.VectorArithmetic",
                "io.measure.runtime.vector.IVector"
            ],
            artifact.imports
        );
        assert_eq!(ScalarType::Array(NumericType::Float64), artifact.output_type);
        assert!(artifact.contribute_code.contains("value.copy()"));

        let request = AggregationRequest::new(
            Operation::apply("array_mean", vec![Operation::column("sales", "history")]),
            AggregationKind::Max,
        );
        let artifact = compiler.compile(&request).unwrap();
        assert_eq!(1, artifact.extra_methods.len());
        assert!(artifact.extra_methods[0].contains("arrayMeanOfFloat32"));

        let request = AggregationRequest::new(Operation::column("sales", "history"), AggregationKind::Max);
        let err = compiler.compile(&request).unwrap_err();
        assert_eq!(ErrorCode::UnsupportedType, err.code);
    }

    #[test]
    fn test_compile_batch_matches_sequential() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let compiler = Compiler::new(&schema, &catalog);

        let requests: Vec<AggregationRequest> = kinds::ALL_KINDS
            .iter()
            .map(|kind| AggregationRequest::new(Operation::column("sales", "quantity"), *kind))
            .collect();
        let batch = compiler.compile_batch(&requests);
        assert_eq!(requests.len(), batch.len());
        for (request, result) in requests.iter().zip(batch) {
            assert_eq!(compiler.compile(request), result);
        }
    }

    #[test]
    fn test_request_json_form() {
        let request: AggregationRequest = serde_json::from_str(
            r#"{"operand": {"column": {"table": "sales", "column": "price"}}, "kind": "square_sum"}"#,
        )
        .unwrap();
        assert_eq!(AggregationKind::SquareSum, request.kind);
        assert!(request.filters.is_empty());
        assert!(!request.retractable);
    }
}
