// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeSet;

use crate::common::ScalarType;
use crate::compiler::java::type_imports;
use crate::compiler::methods::MethodSet;

/// The compiled form of one Operation node: an expression in the target
/// language plus whatever the expression needs to be valid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JavaOperationElement {
    pub imports: BTreeSet<String>,
    pub methods: MethodSet,
    pub expr: String,
    pub ty: ScalarType,
}

impl JavaOperationElement {
    pub fn leaf(expr: String, ty: ScalarType) -> Self {
        let mut imports = BTreeSet::new();
        if let Some(import) = type_imports(ty) {
            imports.insert(import.to_owned());
        }
        JavaOperationElement {
            imports,
            methods: MethodSet::new(),
            expr,
            ty,
        }
    }

    /// combine builds a parent element whose requirements are the union
    /// of its children's, in child order.
    pub fn combine(children: Vec<JavaOperationElement>, expr: String, ty: ScalarType) -> Self {
        let mut element = JavaOperationElement::leaf(expr, ty);
        for child in children {
            element.imports.extend(child.imports);
            element.methods.extend(child.methods);
        }
        element
    }

    pub fn with_import(mut self, import: &str) -> Self {
        self.imports.insert(import.to_owned());
        self
    }

    pub fn with_method(mut self, source: String) -> Self {
        self.methods.insert(source);
        self
    }
}

#[test]
fn test_combine_merges_requirements() {
    use crate::common::NumericType;

    let l = JavaOperationElement::leaf(
        "input.readVector(0)".to_owned(),
        ScalarType::Array(NumericType::Float64),
    )
    .with_method("m1".to_owned());
    let r = JavaOperationElement::leaf("2.0".to_owned(), ScalarType::Float64)
        .with_import("x.Y")
        .with_method("m1".to_owned());

    let parent = JavaOperationElement::combine(vec![l, r], "f(a, b)".to_owned(), ScalarType::Float64);
    assert_eq!(
        vec!["io.measure.runtime.vector.IVector", "x.Y"],
        parent.imports.iter().map(|s| s.as_str()).collect::<Vec<_>>()
    );
    assert_eq!(1, parent.methods.len());
}
