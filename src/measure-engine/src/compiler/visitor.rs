// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use tracing::trace;

use crate::ast::{ColumnRef, Operation};
use crate::catalog::{Function, FunctionCatalog};
use crate::common::{Result, ScalarType, promote};
use crate::compiler::element::JavaOperationElement;
use crate::compiler::java;
use crate::lower_err;
use crate::schema::Schema;

/// OperationVisitor lowers an Operation tree, post-order, into a single
/// JavaOperationElement.  It remembers the columns it reads so repeated
/// references share one input slot.
pub struct OperationVisitor<'a> {
    schema: &'a dyn Schema,
    catalog: &'a FunctionCatalog,
    columns: Vec<ColumnRef>,
}

impl<'a> OperationVisitor<'a> {
    pub fn new(schema: &'a dyn Schema, catalog: &'a FunctionCatalog) -> Self {
        OperationVisitor {
            schema,
            catalog,
            columns: vec![],
        }
    }

    /// The columns read so far, in first-read order.
    pub fn columns(&self) -> &[ColumnRef] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<ColumnRef> {
        self.columns
    }

    fn column_index(&mut self, column: &ColumnRef) -> usize {
        match self.columns.iter().position(|c| c == column) {
            Some(i) => i,
            None => {
                self.columns.push(column.clone());
                self.columns.len() - 1
            }
        }
    }

    pub fn walk(&mut self, op: &Operation) -> Result<JavaOperationElement> {
        let element = match op {
            Operation::Column(column) => {
                let ty = self.schema.column_type(column)?;
                if ty == ScalarType::Object {
                    return lower_err!(
                        UnsupportedType,
                        format!("column '{column}' has type object and can't be aggregated")
                    );
                }
                let index = self.column_index(column);
                JavaOperationElement::leaf(
                    format!("input.read{}({})", java::accessor(ty), index),
                    ty,
                )
            }
            Operation::Literal(lit) => JavaOperationElement::leaf(java::literal(lit), lit.ty()),
            Operation::Arithmetic(arith, l, r) => {
                let l = self.walk(l)?;
                let r = self.walk(r)?;
                let function = self.catalog.arithmetic(*arith, l.ty, r.ty)?;
                self.call(function, vec![l, r])
            }
            Operation::Comparison(cmp, l, r) => {
                let l = self.walk(l)?;
                let r = self.walk(r)?;
                let function = self.catalog.comparison(*cmp, l.ty, r.ty)?;
                self.call(function, vec![l, r])
            }
            Operation::Ternary(c, t, f) => {
                let c = self.walk(c)?;
                if c.ty != ScalarType::Bool {
                    return lower_err!(
                        UnsupportedType,
                        format!("condition must be bool, got {}", c.ty)
                    );
                }
                let t = self.walk(t)?;
                let f = self.walk(f)?;
                let ty = promote(t.ty, f.ty)?;
                let expr = format!("({} ? {} : {})", c.expr, t.expr, f.expr);
                JavaOperationElement::combine(vec![c, t, f], expr, ty)
            }
            Operation::Apply(name, args) => {
                let args = args
                    .iter()
                    .map(|arg| self.walk(arg))
                    .collect::<Result<Vec<_>>>()?;
                let types: Vec<ScalarType> = args.iter().map(|arg| arg.ty).collect();
                let function = self.catalog.function(name, &types)?;
                self.call(function, args)
            }
        };

        trace!(op = %op, ty = %element.ty, "lowered");
        Ok(element)
    }

    fn call(&self, function: Function, args: Vec<JavaOperationElement>) -> JavaOperationElement {
        let ty = function.output_type();
        let arg_list: Vec<&str> = args.iter().map(|arg| arg.expr.as_str()).collect();
        let arg_list = arg_list.join(", ");
        match function {
            Function::Existing(routine) => {
                let expr = format!("{}.{}({})", routine.simple_class(), routine.method, arg_list);
                let element = JavaOperationElement::combine(args, expr, ty);
                match routine.import() {
                    Some(import) => element.with_import(import),
                    None => element,
                }
            }
            Function::Synthesized(routine) => {
                let expr = format!("{}({})", routine.method, arg_list);
                let mut element =
                    JavaOperationElement::combine(args, expr, ty).with_method(routine.source());
                for import in &routine.imports {
                    element = element.with_import(import);
                }
                element
            }
        }
    }

    /// lower_filters lowers a conjunction of comparisons that each test a
    /// value against a constant.
    pub fn lower_filters(&mut self, filters: &[Operation]) -> Result<Option<JavaOperationElement>> {
        let mut lowered = Vec::with_capacity(filters.len());
        for filter in filters {
            let Operation::Comparison(_, l, r) = filter else {
                return lower_err!(
                    UnsupportedOperation,
                    format!("filter '{filter}' must be a comparison")
                );
            };
            if !l.is_constant() && !r.is_constant() {
                return lower_err!(
                    UnsupportedOperation,
                    format!("filter '{filter}' compares two dynamic values")
                );
            }
            lowered.push(self.walk(filter)?);
        }

        if lowered.is_empty() {
            return Ok(None);
        }
        let exprs: Vec<&str> = lowered.iter().map(|f| f.expr.as_str()).collect();
        let expr = exprs.join(" && ");
        Ok(Some(JavaOperationElement::combine(
            lowered,
            expr,
            ScalarType::Bool,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, NumericType};
    use crate::schema::TableSchema;

    fn schema() -> TableSchema {
        TableSchema::new()
            .with_column("t", "a", ScalarType::Int32)
            .with_column("t", "b", ScalarType::Float64)
            .with_column("t", "flag", ScalarType::Bool)
            .with_column("t", "name", ScalarType::Object)
            .with_column("t", "vec", ScalarType::Array(NumericType::Float32))
    }

    #[test]
    fn test_lower_arithmetic() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let mut visitor = OperationVisitor::new(&schema, &catalog);

        let op = Operation::column("t", "a") + Operation::column("t", "b") * Operation::column("t", "a");
        let element = visitor.walk(&op).unwrap();
        assert_eq!(
            "Arithmetic.plus(input.readInt(0), Arithmetic.times(input.readDouble(1), input.readInt(0)))",
            element.expr
        );
        assert_eq!(ScalarType::Float64, element.ty);
        assert!(element.imports.contains("io.measure.runtime.Arithmetic"));
        assert_eq!(
            vec![ColumnRef::new("t", "a"), ColumnRef::new("t", "b")],
            visitor.into_columns()
        );
    }

    #[test]
    fn test_lower_ternary() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let mut visitor = OperationVisitor::new(&schema, &catalog);

        let op = Operation::ternary(
            Operation::column("t", "flag"),
            Operation::column("t", "a"),
            Operation::lit(0i64),
        );
        let element = visitor.walk(&op).unwrap();
        assert_eq!("(input.readBoolean(0) ? input.readInt(1) : 0L)", element.expr);
        assert_eq!(ScalarType::Int64, element.ty);

        let bad = Operation::ternary(Operation::column("t", "a"), Operation::lit(1), Operation::lit(2));
        let err = visitor.walk(&bad).unwrap_err();
        assert_eq!(ErrorCode::UnsupportedType, err.code);
    }

    #[test]
    fn test_lower_apply() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let mut visitor = OperationVisitor::new(&schema, &catalog);

        let op = Operation::apply("array_sum", vec![Operation::column("t", "vec")])
            + Operation::apply("array_sum", vec![Operation::column("t", "vec")]);
        let element = visitor.walk(&op).unwrap();
        assert_eq!(
            "Arithmetic.plus(arraySumOfFloat32(input.readVector(0)), arraySumOfFloat32(input.readVector(0)))",
            element.expr
        );
        assert_eq!(1, element.methods.len());
        assert!(element.imports.contains(java::VECTOR_IMPORT));

        let op = Operation::apply("sqrt", vec![Operation::column("t", "a")]);
        let element = visitor.walk(&op).unwrap();
        assert_eq!("Math.sqrt(input.readInt(1))", element.expr);
        assert!(element.imports.is_empty());
    }

    #[test]
    fn test_lower_failures() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let mut visitor = OperationVisitor::new(&schema, &catalog);

        let err = visitor.walk(&Operation::column("t", "name")).unwrap_err();
        assert_eq!(ErrorCode::UnsupportedType, err.code);

        let err = visitor.walk(&Operation::column("t", "missing")).unwrap_err();
        assert_eq!(ErrorCode::NotFound, err.code);

        let op = Operation::column("t", "a") + Operation::lit("x");
        let err = visitor.walk(&op).unwrap_err();
        assert_eq!(ErrorCode::UnsupportedType, err.code);

        let op = Operation::apply("nope", vec![Operation::column("t", "a")]);
        let err = visitor.walk(&op).unwrap_err();
        assert_eq!(ErrorCode::NotFound, err.code);
    }

    #[test]
    fn test_lower_filters() {
        let schema = schema();
        let catalog = FunctionCatalog::new();
        let mut visitor = OperationVisitor::new(&schema, &catalog);

        assert_eq!(None, visitor.lower_filters(&[]).unwrap());

        let filters = vec![
            Operation::column("t", "a").gt(Operation::lit(0)),
            Operation::lit(10.0).ge(Operation::column("t", "b")),
        ];
        let filter = visitor.lower_filters(&filters).unwrap().unwrap();
        assert_eq!(
            "Comparison.gt(input.readInt(0), 0) && Comparison.gte(10.0, input.readDouble(1))",
            filter.expr
        );
        assert_eq!(ScalarType::Bool, filter.ty);

        let err = visitor
            .lower_filters(&[Operation::column("t", "a").lt(Operation::column("t", "b"))])
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedOperation, err.code);

        let err = visitor
            .lower_filters(&[Operation::column("t", "flag")])
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedOperation, err.code);
    }
}
