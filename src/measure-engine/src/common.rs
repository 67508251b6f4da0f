// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

// Re-export all common types from measure-core
pub use measure_core::common::*;
pub use measure_core::types::{NumericType, ScalarType, promote};

// Macros for error creation - these need to stay in measure-engine
// as they use crate-local paths

#[macro_export]
macro_rules! lower_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Lowering, ErrorCode::$code, Some($str)))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Lowering, ErrorCode::$code, None))
    }};
}

#[macro_export]
macro_rules! catalog_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Catalog, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! scope_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Scope, ErrorCode::$code, Some($str)))
    }}
);

#[macro_export]
macro_rules! schema_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Schema, ErrorCode::$code, Some($str)))
    }}
);

#[test]
fn test_error_macros() {
    let err: Result<()> = lower_err!(UnsupportedType, "object column".to_string());
    let err = err.unwrap_err();
    assert_eq!(ErrorKind::Lowering, err.kind);
    assert_eq!(ErrorCode::UnsupportedType, err.code);

    let err: Result<()> = scope_err!(InvalidWindow, "start > 0".to_string());
    assert_eq!(ErrorKind::Scope, err.unwrap_err().kind);

    let err: Result<()> = lower_err!(UnsupportedOperation);
    assert_eq!(None, err.unwrap_err().details);
}
