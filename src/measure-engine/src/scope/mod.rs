// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Aggregation scopes: the set of members an aggregated value is
//! computed over, relative to the member being queried.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{Error, ErrorCode, ErrorKind, Result, ScalarType};
use crate::scope_err;

pub mod config;
pub mod eval;
pub mod period;

pub use period::PeriodOffset;

fn parse_path<const N: usize>(s: &str, what: &str) -> Result<[String; N]> {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != N || parts.iter().any(|p| p.is_empty()) {
        return Err(Error::new(
            ErrorKind::Config,
            ErrorCode::Generic,
            Some(format!("'{s}' is not a {what}")),
        ));
    }
    let mut out: [String; N] = std::array::from_fn(|_| String::new());
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.to_owned();
    }
    Ok(out)
}

/// `dimension/hierarchy/level`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LevelCoordinates {
    pub dimension: String,
    pub hierarchy: String,
    pub level: String,
}

impl LevelCoordinates {
    pub fn new(dimension: &str, hierarchy: &str, level: &str) -> Self {
        LevelCoordinates {
            dimension: dimension.to_owned(),
            hierarchy: hierarchy.to_owned(),
            level: level.to_owned(),
        }
    }

    pub fn hierarchy_coordinates(&self) -> HierarchyCoordinates {
        HierarchyCoordinates::new(&self.dimension, &self.hierarchy)
    }
}

impl fmt::Display for LevelCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.dimension, self.hierarchy, self.level)
    }
}

impl FromStr for LevelCoordinates {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let [dimension, hierarchy, level] = parse_path::<3>(s, "level (dimension/hierarchy/level)")?;
        Ok(LevelCoordinates {
            dimension,
            hierarchy,
            level,
        })
    }
}

impl TryFrom<String> for LevelCoordinates {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<LevelCoordinates> for String {
    fn from(c: LevelCoordinates) -> Self {
        c.to_string()
    }
}

/// `dimension/hierarchy`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HierarchyCoordinates {
    pub dimension: String,
    pub hierarchy: String,
}

impl HierarchyCoordinates {
    pub fn new(dimension: &str, hierarchy: &str) -> Self {
        HierarchyCoordinates {
            dimension: dimension.to_owned(),
            hierarchy: hierarchy.to_owned(),
        }
    }
}

impl fmt::Display for HierarchyCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dimension, self.hierarchy)
    }
}

impl FromStr for HierarchyCoordinates {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let [dimension, hierarchy] = parse_path::<2>(s, "hierarchy (dimension/hierarchy)")?;
        Ok(HierarchyCoordinates {
            dimension,
            hierarchy,
        })
    }
}

impl TryFrom<String> for HierarchyCoordinates {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<HierarchyCoordinates> for String {
    fn from(c: HierarchyCoordinates) -> Self {
        c.to_string()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelType {
    Date,
    DateTime,
    Scalar(ScalarType),
}

impl LevelType {
    pub fn is_temporal(&self) -> bool {
        matches!(self, LevelType::Date | LevelType::DateTime)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Level {
    pub coordinates: LevelCoordinates,
    pub level_type: LevelType,
}

impl Level {
    pub fn new(coordinates: LevelCoordinates, level_type: LevelType) -> Self {
        Level {
            coordinates,
            level_type,
        }
    }
}

/// Inclusive member-offset bounds around the current member; `None` is
/// unbounded in that direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RangeWindow {
    pub start: Option<i64>,
    pub stop: Option<i64>,
}

impl Default for RangeWindow {
    /// every preceding member and none after
    fn default() -> Self {
        RangeWindow {
            start: None,
            stop: Some(0),
        }
    }
}

impl RangeWindow {
    pub fn new(start: Option<i64>, stop: Option<i64>, step: i64) -> Result<Self> {
        if step != 1 {
            return scope_err!(
                InvalidWindow,
                format!("range windows only support a step of 1, got {step}")
            );
        }
        if start.is_some_and(|s| s > 0) || stop.is_some_and(|s| s < 0) {
            return scope_err!(
                InvalidWindow,
                format!(
                    "range window must start at or before 0 and stop at or after 0, got {}",
                    describe_range(start, stop)
                )
            );
        }
        Ok(RangeWindow { start, stop })
    }

    /// The slot indices inside the window around `i`, clamped to `0..len`.
    pub fn bounds(&self, i: usize, len: usize) -> std::ops::Range<usize> {
        let (i, n) = (i as i64, len as i64);
        let lo = self.start.map_or(0, |s| i.saturating_add(s).clamp(0, n));
        let hi = self
            .stop
            .map_or(n, |s| i.saturating_add(s).saturating_add(1).clamp(0, n));
        (lo as usize)..(hi.max(lo) as usize)
    }
}

fn describe_range(start: Option<i64>, stop: Option<i64>) -> String {
    let bound = |b: Option<i64>, inf: &str| b.map_or(inf.to_owned(), |b| b.to_string());
    format!("[{}, {}]", bound(start, "-inf"), bound(stop, "+inf"))
}

impl fmt::Display for RangeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", describe_range(self.start, self.stop))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CumulativeWindow {
    pub level: Level,
    pub dense: bool,
    pub partitioning: Option<LevelCoordinates>,
    pub range: RangeWindow,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TimePeriodWindow {
    pub level: Level,
    pub back: Option<PeriodOffset>,
    pub forward: Option<PeriodOffset>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SiblingsScope {
    pub hierarchy: HierarchyCoordinates,
    pub exclude_self: bool,
}

/// The window argument of a cumulative scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowArg {
    Range {
        start: Option<i64>,
        stop: Option<i64>,
        step: i64,
    },
    Period(Option<String>, Option<String>),
}

impl WindowArg {
    pub fn range(start: i64, stop: i64) -> Self {
        WindowArg::Range {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    pub fn period(back: Option<&str>, forward: Option<&str>) -> Self {
        WindowArg::Period(back.map(str::to_owned), forward.map(str::to_owned))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scope {
    /// aggregate the underlying values grouped by these levels' members
    Origin(Vec<LevelCoordinates>),
    Cumulative(CumulativeWindow),
    TimePeriod(TimePeriodWindow),
    Siblings(SiblingsScope),
}

impl Scope {
    /// An empty list aggregates over the whole domain.
    pub fn origin(levels: Vec<LevelCoordinates>) -> Scope {
        Scope::Origin(levels)
    }

    pub fn cumulative(
        level: Level,
        dense: bool,
        partitioning: Option<LevelCoordinates>,
        window: Option<WindowArg>,
    ) -> Result<Scope> {
        let range = match window {
            None => RangeWindow::default(),
            Some(WindowArg::Period(back, forward)) => {
                let window = time_period_window(
                    level,
                    back.as_deref(),
                    forward.as_deref(),
                    partitioning.as_ref(),
                )?;
                return Ok(Scope::TimePeriod(window));
            }
            Some(WindowArg::Range { start, stop, step }) => RangeWindow::new(start, stop, step)?,
        };

        Ok(Scope::Cumulative(CumulativeWindow {
            level,
            dense,
            partitioning,
            range,
        }))
    }

    pub fn time_period(level: Level, back: Option<&str>, forward: Option<&str>) -> Result<Scope> {
        Ok(Scope::TimePeriod(time_period_window(level, back, forward, None)?))
    }

    pub fn siblings(hierarchy: HierarchyCoordinates, exclude_self: bool) -> Scope {
        Scope::Siblings(SiblingsScope {
            hierarchy,
            exclude_self,
        })
    }

    pub fn descriptor(&self) -> ScopeDescriptor {
        match self {
            Scope::Origin(levels) => ScopeDescriptor::Origin {
                levels: levels.iter().map(|l| l.to_string()).collect(),
            },
            Scope::Cumulative(window) => ScopeDescriptor::Cumulative {
                level: window.level.coordinates.to_string(),
                dense: window.dense,
                partitioning: window.partitioning.as_ref().map(|p| p.to_string()),
                start: window.range.start,
                stop: window.range.stop,
            },
            Scope::TimePeriod(window) => ScopeDescriptor::TimePeriod {
                level: window.level.coordinates.to_string(),
                back: window.back.map(|b| b.to_string()),
                forward: window.forward.map(|f| f.to_string()),
            },
            Scope::Siblings(siblings) => ScopeDescriptor::Siblings {
                hierarchy: siblings.hierarchy.to_string(),
                exclude_self: siblings.exclude_self,
            },
        }
    }
}

fn time_period_window(
    level: Level,
    back: Option<&str>,
    forward: Option<&str>,
    partitioning: Option<&LevelCoordinates>,
) -> Result<TimePeriodWindow> {
    if !level.level_type.is_temporal() {
        return scope_err!(
            InvalidWindow,
            format!("time period windows need a date level, {} isn't one", level.coordinates)
        );
    }
    if let Some(back) = back {
        if !back.starts_with('-') {
            return scope_err!(
                InvalidWindow,
                format!("back period must be a negative time frame, got '{back}'")
            );
        }
    }
    if let Some(forward) = forward {
        if forward.starts_with('-') {
            return scope_err!(
                InvalidWindow,
                format!("forward period must be a positive time frame, got '{forward}'")
            );
        }
    }
    if let Some(partitioning) = partitioning {
        return scope_err!(
            InvalidWindow,
            format!("time period windows can't be partitioned (got partitioning by {partitioning})")
        );
    }

    Ok(TimePeriodWindow {
        level,
        back: back.map(str::parse::<PeriodOffset>).transpose()?,
        forward: forward.map(str::parse::<PeriodOffset>).transpose()?,
    })
}

/// The plain-data form of a scope handed to the engine's planner.
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScopeDescriptor {
    Origin {
        levels: Vec<String>,
    },
    Cumulative {
        level: String,
        dense: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        partitioning: Option<String>,
        start: Option<i64>,
        stop: Option<i64>,
    },
    TimePeriod {
        level: String,
        back: Option<String>,
        forward: Option<String>,
    },
    Siblings {
        hierarchy: String,
        exclude_self: bool,
    },
}
