// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The serialized form scopes take in definition files.

use serde::{Deserialize, Serialize};

use crate::common::Result;
use crate::scope::{HierarchyCoordinates, Level, LevelCoordinates, Scope, WindowArg};
use crate::scope_err;

/// A level argument as written by hand: usually a single level, but a
/// nested list is accepted by the parser so it can be rejected with a
/// useful message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelArg {
    Level(LevelCoordinates),
    List(Vec<LevelCoordinates>),
}

fn default_step() -> i64 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WindowDef {
    Range {
        #[serde(default)]
        start: Option<i64>,
        #[serde(default)]
        stop: Option<i64>,
        #[serde(default = "default_step")]
        step: i64,
    },
    Period(Option<String>, Option<String>),
}

impl From<WindowDef> for WindowArg {
    fn from(def: WindowDef) -> Self {
        match def {
            WindowDef::Range { start, stop, step } => WindowArg::Range { start, stop, step },
            WindowDef::Period(back, forward) => WindowArg::Period(back, forward),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScopeDef {
    Origin {
        #[serde(default)]
        levels: Vec<LevelArg>,
    },
    Cumulative {
        level: Level,
        #[serde(default)]
        dense: bool,
        #[serde(default)]
        partitioning: Option<LevelCoordinates>,
        #[serde(default)]
        window: Option<WindowDef>,
    },
    TimePeriod {
        level: Level,
        #[serde(default)]
        back: Option<String>,
        #[serde(default)]
        forward: Option<String>,
    },
    Siblings {
        hierarchy: HierarchyCoordinates,
        #[serde(default)]
        exclude_self: bool,
    },
}

impl ScopeDef {
    pub fn into_scope(self) -> Result<Scope> {
        match self {
            ScopeDef::Origin { levels } => {
                let mut coordinates = Vec::with_capacity(levels.len());
                for level in levels {
                    match level {
                        LevelArg::Level(level) => coordinates.push(level),
                        LevelArg::List(list) => {
                            return scope_err!(
                                UnsupportedType,
                                format!(
                                    "origin takes one or more levels, not a list (got [{}])",
                                    list.iter()
                                        .map(|l| l.to_string())
                                        .collect::<Vec<_>>()
                                        .join(", ")
                                )
                            );
                        }
                    }
                }
                Ok(Scope::origin(coordinates))
            }
            ScopeDef::Cumulative {
                level,
                dense,
                partitioning,
                window,
            } => Scope::cumulative(level, dense, partitioning, window.map(WindowArg::from)),
            ScopeDef::TimePeriod {
                level,
                back,
                forward,
            } => Scope::time_period(level, back.as_deref(), forward.as_deref()),
            ScopeDef::Siblings {
                hierarchy,
                exclude_self,
            } => Ok(Scope::siblings(hierarchy, exclude_self)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::scope::RangeWindow;

    fn parse(json: &str) -> Result<Scope> {
        let def: ScopeDef = serde_json::from_str(json).unwrap();
        def.into_scope()
    }

    #[test]
    fn test_origin_defs() {
        let scope = parse(r#"{"type": "origin", "levels": ["Date/Date/Month", "Geo/Geo/City"]}"#).unwrap();
        assert_eq!(
            Scope::Origin(vec![
                LevelCoordinates::new("Date", "Date", "Month"),
                LevelCoordinates::new("Geo", "Geo", "City"),
            ]),
            scope
        );

        let err = parse(r#"{"type": "origin", "levels": [["Date/Date/Month", "Geo/Geo/City"]]}"#)
            .unwrap_err();
        assert_eq!(ErrorCode::UnsupportedType, err.code);

        assert_eq!(Ok(Scope::Origin(vec![])), parse(r#"{"type": "origin"}"#));
    }

    #[test]
    fn test_cumulative_defs() {
        let scope = parse(
            r#"{"type": "cumulative", "level": {"coordinates": "Date/Date/Day", "level_type": "date"},
                "window": {"start": -3, "stop": 0}}"#,
        )
        .unwrap();
        let Scope::Cumulative(window) = scope else {
            panic!("expected a cumulative scope");
        };
        assert_eq!(RangeWindow::new(Some(-3), Some(0), 1).unwrap(), window.range);
        assert!(!window.dense);

        let scope = parse(
            r#"{"type": "cumulative", "level": {"coordinates": "Date/Date/Day", "level_type": "date"},
                "window": ["-5D", null]}"#,
        )
        .unwrap();
        assert!(matches!(scope, Scope::TimePeriod(_)));

        let err = parse(
            r#"{"type": "cumulative", "level": {"coordinates": "Date/Date/Day", "level_type": {"scalar": "int32"}},
                "window": {"start": 1, "stop": 5}}"#,
        )
        .unwrap_err();
        assert_eq!(ErrorCode::InvalidWindow, err.code);
    }

    #[test]
    fn test_siblings_def() {
        let scope = parse(r#"{"type": "siblings", "hierarchy": "Date/Date", "exclude_self": true}"#).unwrap();
        assert_eq!(
            Scope::siblings(HierarchyCoordinates::new("Date", "Date"), true),
            scope
        );
    }
}
