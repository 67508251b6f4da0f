// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The record handed to the external engine for each compiled
//! aggregation, and the bookkeeping around registering it once.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::ast::ColumnRef;
use crate::common::{Result, ScalarType};
use crate::compiler::kinds::{AggregationKind, BufferLayout};
use crate::lower_err;

lazy_static! {
    static ref SLOT_RE: Regex =
        Regex::new(r"\b(?:buffer|other)\.(?:read|write)[A-Za-z]*\((\d+)").unwrap();
    static ref INPUT_RE: Regex = Regex::new(r"\binput\.read[A-Za-z]*\((\d+)\)").unwrap();
    static ref STRING_RE: Regex = Regex::new(r#""(?:[^"\\]|\\.)*""#).unwrap();
}

/// One lowered (operation, kind) pair, ready for registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregationArtifact {
    pub name: String,
    pub kind: AggregationKind,
    pub imports: Vec<String>,
    pub extra_methods: Vec<String>,
    pub input_columns: Vec<ColumnRef>,
    pub contribute_code: String,
    pub decontribute_code: Option<String>,
    pub merge_code: String,
    pub finalize_code: String,
    pub buffer_types: BufferLayout,
    pub output_type: ScalarType,
}

impl AggregationArtifact {
    pub fn to_record(&self) -> RegistrationRecord {
        RegistrationRecord {
            name: self.name.clone(),
            kind_tag: self.kind.tag().to_owned(),
            imports: self.imports.clone(),
            extra_methods: self.extra_methods.clone(),
            input_columns: self.input_columns.iter().map(|c| c.to_string()).collect(),
            contribute_code: self.contribute_code.clone(),
            decontribute_code: self.decontribute_code.clone(),
            merge_code: self.merge_code.clone(),
            finalize_code: self.finalize_code.clone(),
            buffer_types: self.buffer_types.to_vec(),
            output_type: self.output_type,
        }
    }
}

#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub name: String,
    pub kind_tag: String,
    pub imports: Vec<String>,
    pub extra_methods: Vec<String>,
    pub input_columns: Vec<String>,
    pub contribute_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decontribute_code: Option<String>,
    pub merge_code: String,
    pub finalize_code: String,
    pub buffer_types: Vec<ScalarType>,
    pub output_type: ScalarType,
}

fn max_index(re: &Regex, code: &str) -> Option<usize> {
    re.captures_iter(code)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| m.as_str().parse::<usize>().ok())
        .max()
}

impl RegistrationRecord {
    fn code_sections(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.contribute_code.as_str()),
            self.decontribute_code.as_deref(),
            Some(self.merge_code.as_str()),
            Some(self.finalize_code.as_str()),
        ]
        .into_iter()
        .flatten()
    }

    /// validate checks the record is self-consistent: every buffer slot
    /// the code touches is declared and every input slot it reads names
    /// a column.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_types.is_empty() {
            return lower_err!(
                UnsupportedOperation,
                format!("{}: aggregation declares no buffer", self.name)
            );
        }
        for code in self.code_sections() {
            // text literals can spell anything, including slot accessors
            let stripped = STRING_RE.replace_all(code, "\"\"");
            let code: &str = &stripped;
            if let Some(slot) = max_index(&SLOT_RE, code) {
                if slot >= self.buffer_types.len() {
                    return lower_err!(
                        UnsupportedOperation,
                        format!(
                            "{}: code uses buffer slot {slot} but only {} are declared",
                            self.name,
                            self.buffer_types.len()
                        )
                    );
                }
            }
            if let Some(slot) = max_index(&INPUT_RE, code) {
                if slot >= self.input_columns.len() {
                    return lower_err!(
                        NotFound,
                        format!(
                            "{}: code reads input {slot} but only {} columns are bound",
                            self.name,
                            self.input_columns.len()
                        )
                    );
                }
            }
        }
        Ok(())
    }

    /// fingerprint is the hex SHA-256 of the record's canonical JSON form.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        // serializing plain strings, vectors and unit enums can't fail
        let json = serde_json::to_vec(self).unwrap_or_default();
        hasher.update(&json);
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Generate the JSON Schema for the RegistrationRecord type
#[cfg(feature = "schema")]
pub fn generate_schema() -> schemars::Schema {
    schemars::schema_for!(RegistrationRecord)
}

/// Generate the JSON Schema as a formatted JSON string
#[cfg(feature = "schema")]
pub fn generate_schema_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&generate_schema())
}

/// RegistrationSet keeps at most one copy of each distinct record, in
/// registration order.
#[derive(Clone, Debug, Default)]
pub struct RegistrationSet {
    records: Vec<RegistrationRecord>,
    by_fingerprint: HashMap<String, usize>,
}

impl RegistrationSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// register validates the record and adds it unless an identical one
    /// is already present.  Returns the record's fingerprint.
    pub fn register(&mut self, record: RegistrationRecord) -> Result<String> {
        record.validate()?;
        let fingerprint = record.fingerprint();
        if self.by_fingerprint.contains_key(&fingerprint) {
            debug!(name = %record.name, %fingerprint, "already registered");
            return Ok(fingerprint);
        }
        self.by_fingerprint
            .insert(fingerprint.clone(), self.records.len());
        self.records.push(record);
        Ok(fingerprint)
    }

    pub fn get(&self, fingerprint: &str) -> Option<&RegistrationRecord> {
        self.by_fingerprint
            .get(fingerprint)
            .map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[RegistrationRecord] {
        &self.records
    }
}
