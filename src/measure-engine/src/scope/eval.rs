// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Reference evaluation of scopes over already-aggregated member values.
//! Member lists are given in level-comparator order.

use std::collections::BTreeMap;

use tracing::trace;

use crate::common::{Result, ScalarType};
use crate::compiler::kinds::AggregationKind;
use crate::interpreter::{AggregationState, Value, strictly_beyond};
use crate::scope::period::Temporal;
use crate::scope::{LevelCoordinates, RangeWindow, TimePeriodWindow};

/// One member of a cumulative level.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowMember {
    /// members with different partition keys never share a window
    pub partition: Option<String>,
    pub value: Option<Value>,
}

impl WindowMember {
    pub fn new(value: Option<Value>) -> Self {
        WindowMember {
            partition: None,
            value,
        }
    }

    pub fn partitioned(partition: &str, value: Option<Value>) -> Self {
        WindowMember {
            partition: Some(partition.to_owned()),
            value,
        }
    }
}

fn aggregate_slice<'a, I>(kind: AggregationKind, operand: ScalarType, values: I) -> Result<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut state = AggregationState::new(kind, operand)?;
    let mut any = false;
    for value in values {
        any = true;
        state.contribute(value);
    }
    if !any {
        return Ok(Value::Null);
    }
    Ok(state.finalize())
}

/// cumulate evaluates a cumulative range window for every member.
///
/// In sparse mode members without a value yield `Null` and don't count
/// as window slots.  In dense mode every member occupies a slot and
/// repeats whatever its window holds.
pub fn cumulate(
    range: &RangeWindow,
    dense: bool,
    members: &[WindowMember],
    kind: AggregationKind,
    operand: ScalarType,
) -> Result<Vec<Value>> {
    let mut result = vec![Value::Null; members.len()];

    let mut start = 0;
    while start < members.len() {
        let partition = &members[start].partition;
        let end = members[start..]
            .iter()
            .position(|m| m.partition != *partition)
            .map_or(members.len(), |n| start + n);

        // indices of the members that occupy window slots
        let slots: Vec<usize> = (start..end)
            .filter(|&i| dense || members[i].value.is_some())
            .collect();
        for (pos, &i) in slots.iter().enumerate() {
            let window = range.bounds(pos, slots.len());
            let values = slots[window]
                .iter()
                .filter_map(|&j| members[j].value.as_ref());
            result[i] = aggregate_slice(kind, operand, values)?;
        }

        trace!(start, end, slots = slots.len(), "cumulated partition");
        start = end;
    }

    Ok(result)
}

/// cumulate_dates evaluates a time-period window for every member of a
/// date or date-time level.  A missing back bound reaches the first
/// member; a missing forward bound stops at the member itself.
pub fn cumulate_dates<T: Temporal>(
    window: &TimePeriodWindow,
    members: &[(T, Option<Value>)],
    kind: AggregationKind,
    operand: ScalarType,
) -> Result<Vec<Value>> {
    members
        .iter()
        .map(|(anchor, _)| {
            let lo = window.back.and_then(|b| b.apply(*anchor));
            let hi = match window.forward {
                Some(f) => f.apply(*anchor),
                None => Some(*anchor),
            };
            let values = members.iter().filter_map(|(date, value)| {
                let after_lo = lo.is_none_or(|lo| *date >= lo);
                let before_hi = hi.is_none_or(|hi| *date <= hi);
                if after_lo && before_hi {
                    value.as_ref()
                } else {
                    None
                }
            });
            aggregate_slice(kind, operand, values)
        })
        .collect()
}

/// siblings aggregates over every member sharing a parent, optionally
/// leaving out the member itself.  Kinds that can retract take the
/// total once and remove each member from a copy; others recompute.
pub fn siblings(
    exclude_self: bool,
    values: &[Value],
    kind: AggregationKind,
    operand: ScalarType,
) -> Result<Vec<Value>> {
    let mut total = AggregationState::new(kind, operand)?;
    for value in values {
        total.contribute(value);
    }
    if !exclude_self {
        return Ok(vec![total.finalize(); values.len()]);
    }

    let mut result = Vec::with_capacity(values.len());
    for (i, value) in values.iter().enumerate() {
        if kind.supports_decontribution() {
            let mut others = total.clone();
            others.decontribute(value)?;
            result.push(others.finalize());
        } else {
            let mut others = AggregationState::new(kind, operand)?;
            for (j, other) in values.iter().enumerate() {
                if i != j {
                    others.contribute(other);
                }
            }
            result.push(others.finalize());
        }
    }
    Ok(result)
}

/// A fact row as seen by an origin scope.  Members are identified by
/// their full path, so month 6 of 2018 and month 6 of 2019 differ.
#[derive(Clone, Debug, PartialEq)]
pub struct OriginRow {
    pub members: BTreeMap<LevelCoordinates, String>,
    pub value: Value,
}

/// origin_rollup evaluates an origin scope at a query location.  Rows
/// at the location are summed per member tuple of the origin levels
/// (and the location's own levels); those sums are then aggregated
/// with `kind`.
pub fn origin_rollup(
    levels: &[LevelCoordinates],
    rows: &[OriginRow],
    location: &BTreeMap<LevelCoordinates, String>,
    kind: AggregationKind,
    operand: ScalarType,
) -> Result<Value> {
    let mut key_levels: Vec<&LevelCoordinates> = location.keys().chain(levels).collect();
    key_levels.sort();
    key_levels.dedup();

    let mut groups: BTreeMap<Vec<Option<&str>>, AggregationState> = BTreeMap::new();
    for row in rows {
        let at_location = location
            .iter()
            .all(|(level, member)| row.members.get(level) == Some(member));
        if !at_location {
            continue;
        }
        let key: Vec<Option<&str>> = key_levels
            .iter()
            .map(|level| row.members.get(*level).map(|m| m.as_str()))
            .collect();
        match groups.get_mut(&key) {
            Some(state) => state.contribute(&row.value),
            None => {
                let mut state = AggregationState::new(AggregationKind::Sum, operand)?;
                state.contribute(&row.value);
                groups.insert(key, state);
            }
        }
    }

    trace!(groups = groups.len(), "origin groups");
    let sums: Vec<Value> = groups.values().map(|g| g.finalize()).collect();
    aggregate_slice(kind, operand, &sums)
}

/// extremum_member returns the member holding the largest (or smallest)
/// value.  Ties go to the first member in comparator order; members
/// without a comparable value are skipped.
pub fn extremum_member<'a, M>(members: &'a [(M, Value)], maximize: bool) -> Option<&'a M> {
    let mut best: Option<(&'a M, &'a Value)> = None;
    for (member, value) in members {
        if !value.as_f64().is_some_and(|v| !v.is_nan()) {
            continue;
        }
        let better = match best {
            None => true,
            Some((_, current)) => strictly_beyond(value, current, maximize),
        };
        if better {
            best = Some((member, value));
        }
    }
    best.map(|(member, _)| member)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    use crate::scope::{Level, LevelType, Scope};

    fn ints(values: &[i64]) -> Vec<Value> {
        values.iter().map(|v| Value::Int(*v)).collect()
    }

    #[test]
    fn test_cumulative_sum() {
        let members: Vec<WindowMember> = [15, 5, 5, 10, 25, 15, 15, 20]
            .iter()
            .map(|v| WindowMember::new(Some(Value::Int(*v))))
            .collect();
        let result = cumulate(
            &RangeWindow::default(),
            false,
            &members,
            AggregationKind::Sum,
            ScalarType::Int64,
        )
        .unwrap();
        assert_eq!(ints(&[15, 20, 25, 35, 60, 75, 90, 110]), result);
    }

    #[test]
    fn test_cumulative_sum_partitioned() {
        let data = [
            ("2018/6", 15),
            ("2018/6", 5),
            ("2018/7", 5),
            ("2018/7", 10),
            ("2019/6", 25),
            ("2019/6", 15),
            ("2019/7", 15),
            ("2019/7", 20),
        ];
        let members: Vec<WindowMember> = data
            .iter()
            .map(|(month, v)| WindowMember::partitioned(month, Some(Value::Int(*v))))
            .collect();
        let result = cumulate(
            &RangeWindow::default(),
            false,
            &members,
            AggregationKind::Sum,
            ScalarType::Int64,
        )
        .unwrap();
        assert_eq!(ints(&[15, 20, 5, 15, 25, 40, 15, 35]), result);
    }

    #[test]
    fn test_dense_and_sparse() {
        let members = vec![
            WindowMember::new(Some(Value::Int(1))),
            WindowMember::new(None),
            WindowMember::new(Some(Value::Int(2))),
            WindowMember::new(Some(Value::Int(4))),
        ];
        let last_two = RangeWindow::new(Some(-1), Some(0), 1).unwrap();

        let sparse = cumulate(&last_two, false, &members, AggregationKind::Sum, ScalarType::Int64).unwrap();
        assert_eq!(
            vec![Value::Int(1), Value::Null, Value::Int(3), Value::Int(6)],
            sparse
        );

        let dense = cumulate(&last_two, true, &members, AggregationKind::Sum, ScalarType::Int64).unwrap();
        assert_eq!(
            vec![Value::Int(1), Value::Int(1), Value::Int(2), Value::Int(6)],
            dense
        );

        let running = cumulate(
            &RangeWindow::default(),
            true,
            &members,
            AggregationKind::Sum,
            ScalarType::Int64,
        )
        .unwrap();
        assert_eq!(ints(&[1, 1, 3, 7]), running);
    }

    #[test]
    fn test_cumulate_dates() {
        let day = Level::new(LevelCoordinates::new("Date", "Date", "Day"), LevelType::Date);
        let Scope::TimePeriod(window) = Scope::time_period(day, Some("-2D"), None).unwrap() else {
            panic!("expected a time period scope");
        };
        let date = |d| NaiveDate::from_ymd_opt(2019, 7, d).unwrap();
        let members = vec![
            (date(1), Some(Value::Int(1))),
            (date(2), Some(Value::Int(2))),
            (date(3), None),
            (date(5), Some(Value::Int(8))),
        ];
        let result = cumulate_dates(&window, &members, AggregationKind::Sum, ScalarType::Int64).unwrap();
        assert_eq!(ints(&[1, 3, 3, 8]), result);
    }

    #[test]
    fn test_cumulate_date_times() {
        let hour = Level::new(LevelCoordinates::new("Time", "Time", "Hour"), LevelType::DateTime);
        let Scope::TimePeriod(window) = Scope::time_period(hour, Some("-1D"), None).unwrap() else {
            panic!("expected a time period scope");
        };
        let at = |d, h| {
            NaiveDate::from_ymd_opt(2019, 7, d)
                .and_then(|date| date.and_hms_opt(h, 0, 0))
                .unwrap()
        };
        let members = vec![
            (at(1, 6), Some(Value::Int(1))),
            (at(1, 18), Some(Value::Int(2))),
            (at(2, 12), Some(Value::Int(4))),
            (at(3, 12), Some(Value::Int(8))),
        ];
        let result = cumulate_dates(&window, &members, AggregationKind::Sum, ScalarType::Int64).unwrap();
        assert_eq!(ints(&[1, 3, 6, 12]), result);
    }

    #[test]
    fn test_cumulate_extreme_ranges() {
        let members: Vec<WindowMember> = [1, 1, 1]
            .iter()
            .map(|v| WindowMember::new(Some(Value::Int(*v))))
            .collect();
        let ahead = RangeWindow::new(Some(-3), Some(i64::MAX), 1).unwrap();
        let result = cumulate(&ahead, false, &members, AggregationKind::Sum, ScalarType::Int64).unwrap();
        assert_eq!(ints(&[3, 3, 3]), result);

        let behind = RangeWindow::new(Some(i64::MIN), Some(0), 1).unwrap();
        let result = cumulate(&behind, false, &members, AggregationKind::Sum, ScalarType::Int64).unwrap();
        assert_eq!(ints(&[1, 2, 3]), result);
    }

    #[test]
    fn test_siblings_multiply_with_zero() {
        let values = [2.0, 0.0, 3.0].map(Value::Float);
        assert_eq!(
            [0.0, 6.0, 0.0].map(Value::Float).to_vec(),
            siblings(true, &values, AggregationKind::Multiply, ScalarType::Float64).unwrap()
        );
        assert_eq!(
            vec![Value::Float(0.0); 3],
            siblings(false, &values, AggregationKind::Multiply, ScalarType::Float64).unwrap()
        );
    }

    #[test]
    fn test_siblings() {
        let values = ints(&[10, 20, 30]);
        assert_eq!(
            ints(&[60, 60, 60]),
            siblings(false, &values, AggregationKind::Sum, ScalarType::Int64).unwrap()
        );
        assert_eq!(
            ints(&[50, 40, 30]),
            siblings(true, &values, AggregationKind::Sum, ScalarType::Int64).unwrap()
        );
        // max can't retract, so it recomputes
        assert_eq!(
            ints(&[30, 30, 20]),
            siblings(true, &values, AggregationKind::Max, ScalarType::Int64).unwrap()
        );
        // a lone member has no siblings
        assert_eq!(
            ints(&[0]),
            siblings(true, &ints(&[140]), AggregationKind::Sum, ScalarType::Int64).unwrap()
        );
    }

    #[test]
    fn test_origin_rollup() {
        let year = LevelCoordinates::new("Date", "Date", "Year");
        let month = LevelCoordinates::new("Date", "Date", "Month");
        let day = LevelCoordinates::new("Date", "Date", "Day");
        let data = [
            (2019, 7, 1, 15),
            (2019, 7, 2, 20),
            (2019, 7, 3, 30),
            (2019, 6, 1, 25),
            (2019, 6, 2, 15),
            (2018, 7, 1, 5),
            (2018, 7, 2, 10),
            (2018, 6, 1, 15),
            (2018, 6, 2, 5),
        ];
        let rows: Vec<OriginRow> = data
            .iter()
            .map(|(y, m, d, q)| OriginRow {
                members: BTreeMap::from([
                    (year.clone(), format!("{y}")),
                    (month.clone(), format!("{y}/{m}")),
                    (day.clone(), format!("{y}/{m}/{d}")),
                ]),
                value: Value::Int(*q),
            })
            .collect();
        let origin = [month.clone()];
        let mean = |location: BTreeMap<LevelCoordinates, String>| {
            origin_rollup(&origin, &rows, &location, AggregationKind::Mean, ScalarType::Int64).unwrap()
        };

        assert_eq!(Value::Float(35.0), mean(BTreeMap::new()));
        assert_eq!(
            Value::Float(17.5),
            mean(BTreeMap::from([(year.clone(), "2018".to_owned())]))
        );
        assert_eq!(
            Value::Float(52.5),
            mean(BTreeMap::from([(year.clone(), "2019".to_owned())]))
        );
        assert_eq!(
            Value::Float(65.0),
            mean(BTreeMap::from([(month.clone(), "2019/7".to_owned())]))
        );
        assert_eq!(
            Value::Float(25.0),
            mean(BTreeMap::from([(day.clone(), "2019/6/1".to_owned())]))
        );

        let whole = origin_rollup(&[], &rows, &BTreeMap::new(), AggregationKind::Mean, ScalarType::Int64).unwrap();
        assert_eq!(Value::Float(140.0), whole);
    }

    #[test]
    fn test_extremum_member() {
        let members = vec![
            ("a", Value::Int(3)),
            ("b", Value::Int(7)),
            ("c", Value::Null),
            ("d", Value::Int(7)),
            ("e", Value::Int(1)),
            ("f", Value::Int(1)),
        ];
        assert_eq!(Some(&"b"), extremum_member(&members, true));
        assert_eq!(Some(&"e"), extremum_member(&members, false));
        assert_eq!(None, extremum_member::<&str>(&[], true));

        let big = 1i64 << 53;
        let members = vec![("a", Value::Int(big)), ("b", Value::Int(big + 1))];
        assert_eq!(Some(&"b"), extremum_member(&members, true));
        assert_eq!(Some(&"a"), extremum_member(&members, false));
    }
}
