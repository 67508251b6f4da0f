// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ast::ColumnRef;
use crate::common::{Result, ScalarType};
use crate::schema_err;

/// Schema is the lowering pass's only window onto table metadata.
/// Implementations are shared between concurrent lowering passes.
pub trait Schema: Sync {
    fn column_type(&self, column: &ColumnRef) -> Result<ScalarType>;
}

/// An in-memory schema: table name -> column name -> type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSchema {
    tables: BTreeMap<String, BTreeMap<String, ScalarType>>,
}

impl TableSchema {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_column(mut self, table: &str, column: &str, ty: ScalarType) -> Self {
        self.add_column(table, column, ty);
        self
    }

    pub fn add_column(&mut self, table: &str, column: &str, ty: ScalarType) {
        self.tables
            .entry(table.to_owned())
            .or_default()
            .insert(column.to_owned(), ty);
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|t| t.as_str())
    }
}

impl Schema for TableSchema {
    fn column_type(&self, column: &ColumnRef) -> Result<ScalarType> {
        let Some(table) = self.tables.get(&column.table) else {
            return schema_err!(NotFound, format!("unknown table '{}'", column.table));
        };
        match table.get(&column.column) {
            Some(ty) => Ok(*ty),
            None => schema_err!(NotFound, format!("unknown column '{column}'")),
        }
    }
}

#[test]
fn test_table_schema_lookup() {
    use crate::common::{ErrorCode, ErrorKind};

    let schema = TableSchema::new()
        .with_column("sales", "quantity", ScalarType::Int32)
        .with_column("sales", "price", ScalarType::Float64);

    assert_eq!(
        Ok(ScalarType::Int32),
        schema.column_type(&ColumnRef::new("sales", "quantity"))
    );

    let err = schema
        .column_type(&ColumnRef::new("sales", "missing"))
        .unwrap_err();
    assert_eq!(ErrorKind::Schema, err.kind);
    assert_eq!(ErrorCode::NotFound, err.code);
    assert!(err.get_details().unwrap().contains("sales.missing"));

    let err = schema
        .column_type(&ColumnRef::new("stock", "quantity"))
        .unwrap_err();
    assert_eq!(ErrorCode::NotFound, err.code);
}

#[test]
fn test_table_schema_json_form() {
    let schema: TableSchema = serde_json::from_str(
        r#"{"sales": {"quantity": "int32", "history": {"array": "float64"}}}"#,
    )
    .unwrap();
    assert_eq!(
        Ok(ScalarType::Array(crate::common::NumericType::Float64)),
        schema.column_type(&ColumnRef::new("sales", "history"))
    );
    assert_eq!(vec!["sales"], schema.tables().collect::<Vec<_>>());
}
