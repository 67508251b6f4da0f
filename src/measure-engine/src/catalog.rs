// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;

use crate::ast::{ArithmeticOp, ComparisonOp};
use crate::common::{NumericType, Result, ScalarType, promote};
use crate::compiler::java::{VECTOR_IMPORT, element_accessor, java_type};
use crate::catalog_err;

const ARITHMETIC_CLASS: &str = "io.measure.runtime.Arithmetic";
const VECTOR_ARITHMETIC_CLASS: &str = "io.measure.runtime.VectorArithmetic";
const COMPARISON_CLASS: &str = "io.measure.runtime.Comparison";
const VECTORS_CLASS: &str = "io.measure.runtime.vector.Vectors";
const MATH_CLASS: &str = "java.lang.Math";

/// A routine that already exists in the runtime and is called by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExistingRoutine {
    pub class: &'static str,
    pub method: &'static str,
    pub output: ScalarType,
}

impl ExistingRoutine {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.class, self.method)
    }

    pub fn simple_class(&self) -> &'static str {
        self.class.rsplit('.').next().unwrap_or(self.class)
    }

    /// The class to import, if it isn't implicitly visible.
    pub fn import(&self) -> Option<&'static str> {
        if self.class.starts_with("java.lang.") {
            None
        } else {
            Some(self.class)
        }
    }
}

/// A routine generated alongside the aggregation and registered as an
/// extra method of the artifact.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SynthesizedRoutine {
    pub method: String,
    pub params: Vec<(ScalarType, String)>,
    pub body: String,
    pub output: ScalarType,
    pub imports: Vec<&'static str>,
}

impl SynthesizedRoutine {
    /// source renders the complete method declaration.
    pub fn source(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|(ty, name)| format!("final {} {}", java_type(*ty), name))
            .collect();
        format!(
            "private static {} {}({}) {{\n{}}}\n",
            java_type(self.output),
            self.method,
            params.join(", "),
            self.body
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Function {
    Existing(ExistingRoutine),
    Synthesized(SynthesizedRoutine),
}

impl Function {
    pub fn output_type(&self) -> ScalarType {
        match self {
            Function::Existing(routine) => routine.output,
            Function::Synthesized(routine) => routine.output,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum ArrayReduction {
    Sum,
    Mean,
}

impl ArrayReduction {
    fn method_name(self, elem: NumericType) -> String {
        let prefix = match self {
            ArrayReduction::Sum => "arraySum",
            ArrayReduction::Mean => "arrayMean",
        };
        let suffix = match elem {
            NumericType::Int32 => "Int32",
            NumericType::Int64 => "Int64",
            NumericType::Float32 => "Float32",
            NumericType::Float64 => "Float64",
        };
        format!("{prefix}Of{suffix}")
    }

    fn synthesize(self, elem: NumericType) -> SynthesizedRoutine {
        let read = element_accessor(elem);
        let result = match self {
            ArrayReduction::Sum => "result",
            ArrayReduction::Mean => "size == 0 ? 0.0 : result / size",
        };
        let body = format!(
            "    double result = 0.0;\n\
             \x20   final int size = vector.size();\n\
             \x20   for (int i = 0; i < size; i++) {{\n\
             \x20       result += vector.read{read}(i);\n\
             \x20   }}\n\
             \x20   return {result};\n"
        );
        SynthesizedRoutine {
            method: self.method_name(elem),
            params: vec![(ScalarType::Array(elem), "vector".to_owned())],
            body,
            output: ScalarType::Float64,
            imports: vec![VECTOR_IMPORT],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum MathOutput {
    SameAsOperand,
    Float64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Entry {
    /// one numeric scalar operand
    Math(&'static str, MathOutput),
    /// two numeric scalar operands, promoted
    Math2(&'static str),
    ArrayReduction(ArrayReduction),
    ArrayLength,
}

impl Entry {
    fn arity(&self) -> usize {
        match self {
            Entry::Math(_, _) | Entry::ArrayReduction(_) | Entry::ArrayLength => 1,
            Entry::Math2(_) => 2,
        }
    }
}

/// FunctionCatalog maps operators and function names, together with the
/// types of their operands, to the routine that implements them.  It is
/// built once and only read afterwards.
#[derive(Clone, Debug)]
pub struct FunctionCatalog {
    functions: BTreeMap<&'static str, Entry>,
}

impl Default for FunctionCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn numeric_only(what: &str, ty: ScalarType) -> Result<()> {
    if ty.is_numeric() {
        Ok(())
    } else {
        catalog_err!(
            UnsupportedOperation,
            format!("{what} is numeric-only, got an operand of type {ty}")
        )
    }
}

impl FunctionCatalog {
    pub fn new() -> Self {
        let mut functions = BTreeMap::new();
        functions.insert("abs", Entry::Math("abs", MathOutput::SameAsOperand));
        functions.insert("sqrt", Entry::Math("sqrt", MathOutput::Float64));
        functions.insert("exp", Entry::Math("exp", MathOutput::Float64));
        functions.insert("log", Entry::Math("log", MathOutput::Float64));
        functions.insert("max", Entry::Math2("max"));
        functions.insert("min", Entry::Math2("min"));
        functions.insert("array_sum", Entry::ArrayReduction(ArrayReduction::Sum));
        functions.insert("array_mean", Entry::ArrayReduction(ArrayReduction::Mean));
        functions.insert("array_len", Entry::ArrayLength);

        FunctionCatalog { functions }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }

    pub fn arithmetic(&self, op: ArithmeticOp, l: ScalarType, r: ScalarType) -> Result<Function> {
        let promoted = promote(l, r)?;
        let method = match op {
            ArithmeticOp::Add => "plus",
            ArithmeticOp::Sub => "minus",
            ArithmeticOp::Mul => "times",
            ArithmeticOp::Div => "divide",
        };

        if let Some(elem) = promoted.element_type() {
            let output = if op == ArithmeticOp::Div {
                ScalarType::Array(NumericType::Float64)
            } else {
                ScalarType::Array(elem)
            };
            return Ok(Function::Existing(ExistingRoutine {
                class: VECTOR_ARITHMETIC_CLASS,
                method,
                output,
            }));
        }

        numeric_only(&format!("operator '{}'", op.symbol()), promoted)?;
        let output = if op == ArithmeticOp::Div {
            ScalarType::Float64
        } else {
            promoted
        };
        Ok(Function::Existing(ExistingRoutine {
            class: ARITHMETIC_CLASS,
            method,
            output,
        }))
    }

    pub fn comparison(&self, op: ComparisonOp, l: ScalarType, r: ScalarType) -> Result<Function> {
        let promoted = promote(l, r)?;
        if op.is_ordering() {
            numeric_only(&format!("operator '{}'", op.symbol()), promoted)?;
        }
        let method = match op {
            ComparisonOp::Eq => "eq",
            ComparisonOp::Neq => "neq",
            ComparisonOp::Lt => "lt",
            ComparisonOp::Lte => "lte",
            ComparisonOp::Gt => "gt",
            ComparisonOp::Gte => "gte",
        };
        Ok(Function::Existing(ExistingRoutine {
            class: COMPARISON_CLASS,
            method,
            output: ScalarType::Bool,
        }))
    }

    /// function resolves a named function applied to operands of the
    /// given types.
    pub fn function(&self, name: &str, args: &[ScalarType]) -> Result<Function> {
        let Some(entry) = self.functions.get(name) else {
            return catalog_err!(NotFound, format!("unknown function '{name}'"));
        };
        if args.len() != entry.arity() {
            return catalog_err!(
                UnsupportedOperation,
                format!(
                    "{name} takes {} argument(s), got {}",
                    entry.arity(),
                    args.len()
                )
            );
        }

        let function = match *entry {
            Entry::Math(method, output) => {
                numeric_only(name, args[0])?;
                let output = match output {
                    MathOutput::SameAsOperand => args[0],
                    MathOutput::Float64 => ScalarType::Float64,
                };
                Function::Existing(ExistingRoutine {
                    class: MATH_CLASS,
                    method,
                    output,
                })
            }
            Entry::Math2(method) => {
                numeric_only(name, args[0])?;
                numeric_only(name, args[1])?;
                Function::Existing(ExistingRoutine {
                    class: MATH_CLASS,
                    method,
                    output: promote(args[0], args[1])?,
                })
            }
            Entry::ArrayReduction(reduction) => {
                let Some(elem) = args[0].element_type() else {
                    return catalog_err!(
                        UnsupportedOperation,
                        format!("{name} reduces an array, got an operand of type {}", args[0])
                    );
                };
                Function::Synthesized(reduction.synthesize(elem))
            }
            Entry::ArrayLength => {
                if !args[0].is_array() {
                    return catalog_err!(
                        UnsupportedOperation,
                        format!("{name} takes an array, got an operand of type {}", args[0])
                    );
                }
                Function::Existing(ExistingRoutine {
                    class: VECTORS_CLASS,
                    method: "size",
                    output: ScalarType::Int32,
                })
            }
        };

        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    #[test]
    fn test_arithmetic_resolution() {
        let catalog = FunctionCatalog::new();

        let f = catalog
            .arithmetic(ArithmeticOp::Add, ScalarType::Int32, ScalarType::Int64)
            .unwrap();
        let Function::Existing(routine) = &f else {
            panic!("expected an existing routine");
        };
        assert_eq!("io.measure.runtime.Arithmetic.plus", routine.qualified_name());
        assert_eq!("Arithmetic", routine.simple_class());
        assert_eq!(ScalarType::Int64, f.output_type());

        let f = catalog
            .arithmetic(ArithmeticOp::Div, ScalarType::Int32, ScalarType::Int32)
            .unwrap();
        assert_eq!(ScalarType::Float64, f.output_type());

        let ints = ScalarType::Array(NumericType::Int32);
        let floats = ScalarType::Array(NumericType::Float32);
        let f = catalog.arithmetic(ArithmeticOp::Mul, ints, floats).unwrap();
        assert_eq!(floats, f.output_type());
        assert!(matches!(f, Function::Existing(ref r) if r.class == VECTOR_ARITHMETIC_CLASS));
    }

    #[test]
    fn test_arithmetic_failures() {
        let catalog = FunctionCatalog::new();

        // object meeting a number is a type error
        let err = catalog
            .arithmetic(ArithmeticOp::Add, ScalarType::Object, ScalarType::Int32)
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedType, err.code);

        // two objects promote fine, but there is no arithmetic on them
        let err = catalog
            .arithmetic(ArithmeticOp::Add, ScalarType::Object, ScalarType::Object)
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedOperation, err.code);
        assert!(err.get_details().unwrap().contains("'+'"));

        let err = catalog
            .arithmetic(
                ArithmeticOp::Sub,
                ScalarType::Array(NumericType::Float64),
                ScalarType::Float64,
            )
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedType, err.code);
    }

    #[test]
    fn test_comparison_resolution() {
        let catalog = FunctionCatalog::new();

        let f = catalog
            .comparison(ComparisonOp::Lt, ScalarType::Int32, ScalarType::Float64)
            .unwrap();
        assert_eq!(ScalarType::Bool, f.output_type());

        assert!(
            catalog
                .comparison(ComparisonOp::Eq, ScalarType::Object, ScalarType::Object)
                .is_ok()
        );
        let err = catalog
            .comparison(ComparisonOp::Gt, ScalarType::Bool, ScalarType::Bool)
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedOperation, err.code);
    }

    #[test]
    fn test_array_reductions_are_synthesized_deterministically() {
        let catalog = FunctionCatalog::new();
        let arg = [ScalarType::Array(NumericType::Float32)];

        let a = catalog.function("array_sum", &arg).unwrap();
        let b = catalog.function("array_sum", &arg).unwrap();
        assert_eq!(a, b);
        assert_eq!(ScalarType::Float64, a.output_type());

        let Function::Synthesized(routine) = a else {
            panic!("array_sum should be synthesized");
        };
        assert_eq!("arraySumOfFloat32", routine.method);
        let source = routine.source();
        assert!(source.starts_with("private static double arraySumOfFloat32(final IVector vector) {"));
        assert!(source.contains("vector.readFloat(i)"));

        let Function::Synthesized(mean) = catalog.function("array_mean", &arg).unwrap() else {
            panic!("array_mean should be synthesized");
        };
        assert_ne!(routine.source(), mean.source());
        assert!(mean.body.contains("size == 0 ? 0.0"));
    }

    #[test]
    fn test_function_failures() {
        let catalog = FunctionCatalog::new();

        let err = catalog
            .function("array_sum", &[ScalarType::Float64])
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedOperation, err.code);

        let err = catalog.function("sqrt", &[ScalarType::Object]).unwrap_err();
        assert_eq!(ErrorCode::UnsupportedOperation, err.code);

        let err = catalog
            .function("max", &[ScalarType::Float64])
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedOperation, err.code);

        let err = catalog.function("median", &[ScalarType::Float64]).unwrap_err();
        assert_eq!(ErrorCode::NotFound, err.code);
    }

    #[test]
    fn test_math_outputs() {
        let catalog = FunctionCatalog::new();
        assert_eq!(
            ScalarType::Int32,
            catalog.function("abs", &[ScalarType::Int32]).unwrap().output_type()
        );
        assert_eq!(
            ScalarType::Float64,
            catalog.function("sqrt", &[ScalarType::Int32]).unwrap().output_type()
        );
        let max = catalog
            .function("max", &[ScalarType::Int32, ScalarType::Float32])
            .unwrap();
        assert_eq!(ScalarType::Float32, max.output_type());
        let Function::Existing(routine) = max else {
            panic!("max is an existing routine");
        };
        assert_eq!(None, routine.import());
        assert_eq!(
            ScalarType::Int32,
            catalog
                .function("array_len", &[ScalarType::Array(NumericType::Int64)])
                .unwrap()
                .output_type()
        );
    }
}
