// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::{error, result};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoError, // will never be produced
    /// An operand, column or output type can't be represented where it was used.
    UnsupportedType,
    /// The operation is well formed but not meaningful in its context.
    UnsupportedOperation,
    /// A scope violates its range, time-period or partitioning rules.
    InvalidWindow,
    /// The named table, column or function doesn't exist.
    NotFound,
    Generic,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            NoError => "no_error",
            UnsupportedType => "unsupported_type",
            UnsupportedOperation => "unsupported_operation",
            InvalidWindow => "invalid_window",
            NotFound => "not_found",
            Generic => "generic",
        };

        write!(f, "{name}")
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Lowering,
    Catalog,
    Scope,
    Schema,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl From<Box<dyn std::error::Error>> for Error {
    fn from(err: Box<dyn std::error::Error>) -> Self {
        Error {
            kind: ErrorKind::Config,
            code: ErrorCode::Generic,
            details: Some(err.to_string()),
        }
    }
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Lowering => "LoweringError",
            ErrorKind::Catalog => "CatalogError",
            ErrorKind::Scope => "ScopeError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::Config => "ConfigError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[test]
fn test_error_display() {
    let err = Error::new(
        ErrorKind::Lowering,
        ErrorCode::UnsupportedType,
        Some("object in numeric position".to_string()),
    );
    assert_eq!(
        "LoweringError{unsupported_type: object in numeric position}",
        format!("{err}")
    );

    let err = Error::new(ErrorKind::Scope, ErrorCode::InvalidWindow, None);
    assert_eq!("ScopeError{invalid_window}", format!("{err}"));
    assert_eq!(None, err.get_details());
}
