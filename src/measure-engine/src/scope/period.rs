// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, Months, NaiveDate, NaiveDateTime};
use lazy_static::lazy_static;
use regex::Regex;

use crate::common::{Error, Result};
use crate::scope_err;

lazy_static! {
    static ref OFFSET_RE: Regex =
        Regex::new(r"^(-)?(?:(\d+)D)?(?:(\d+)W)?(?:(\d+)M)?(?:(\d+)Q)?(?:(\d+)Y)?$").unwrap();
}

/// A point on a date or date-time level that period offsets can move.
pub trait Temporal: Copy + Ord {
    fn add_calendar(self, months: Months, days: Days) -> Option<Self>;
    fn sub_calendar(self, months: Months, days: Days) -> Option<Self>;
}

macro_rules! impl_temporal(
    ($($ty:ty),*) => { $(
        impl Temporal for $ty {
            fn add_calendar(self, months: Months, days: Days) -> Option<Self> {
                self.checked_add_months(months)?.checked_add_days(days)
            }

            fn sub_calendar(self, months: Months, days: Days) -> Option<Self> {
                self.checked_sub_months(months)?.checked_sub_days(days)
            }
        }
    )* }
);

impl_temporal!(NaiveDate, NaiveDateTime);

/// A calendar offset of the form `[-]xxDxxWxxMxxQxxY`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PeriodOffset {
    pub negative: bool,
    pub days: u32,
    pub weeks: u32,
    pub months: u32,
    pub quarters: u32,
    pub years: u32,
}

impl PeriodOffset {
    fn total_days(&self) -> u64 {
        self.days as u64 + 7 * self.weeks as u64
    }

    fn total_months(&self) -> u32 {
        self.months
            .saturating_add(self.quarters.saturating_mul(3))
            .saturating_add(self.years.saturating_mul(12))
    }

    /// apply shifts a date (or date-time) by the offset; months (and
    /// quarters and years) move first, clamping to the end of shorter
    /// months, then days.  None if the result leaves chrono's calendar.
    pub fn apply<T: Temporal>(&self, at: T) -> Option<T> {
        let months = Months::new(self.total_months());
        let days = Days::new(self.total_days());
        if self.negative {
            at.sub_calendar(months, days)
        } else {
            at.add_calendar(months, days)
        }
    }
}

impl FromStr for PeriodOffset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let Some(caps) = OFFSET_RE.captures(s) else {
            return scope_err!(
                InvalidWindow,
                format!("'{s}' is not a period of the form [-]xxDxxWxxMxxQxxY")
            );
        };
        if (2..=6).all(|i| caps.get(i).is_none()) {
            return scope_err!(InvalidWindow, format!("'{s}' names no period component"));
        }

        let component = |i: usize| -> Result<u32> {
            match caps.get(i) {
                None => Ok(0),
                Some(m) => match m.as_str().parse() {
                    Ok(n) => Ok(n),
                    Err(_) => scope_err!(InvalidWindow, format!("'{s}' is out of range")),
                },
            }
        };

        Ok(PeriodOffset {
            negative: caps.get(1).is_some(),
            days: component(2)?,
            weeks: component(3)?,
            months: component(4)?,
            quarters: component(5)?,
            years: component(6)?,
        })
    }
}

impl fmt::Display for PeriodOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-")?;
        }
        let parts = [
            (self.days, 'D'),
            (self.weeks, 'W'),
            (self.months, 'M'),
            (self.quarters, 'Q'),
            (self.years, 'Y'),
        ];
        let mut wrote = false;
        for (n, unit) in parts {
            if n != 0 {
                write!(f, "{n}{unit}")?;
                wrote = true;
            }
        }
        if !wrote {
            write!(f, "0D")?;
        }
        Ok(())
    }
}

#[test]
fn test_parse_offsets() {
    let offset: PeriodOffset = "-5D".parse().unwrap();
    assert!(offset.negative);
    assert_eq!(5, offset.days);
    assert_eq!("-5D", offset.to_string());

    let offset: PeriodOffset = "1W2M1Q1Y".parse().unwrap();
    assert!(!offset.negative);
    assert_eq!((1, 2, 1, 1), (offset.weeks, offset.months, offset.quarters, offset.years));
    assert_eq!("1W2M1Q1Y", offset.to_string());

    for bad in ["", "-", "5", "D5", "5M3D", "5d", "- 5D", "99999999999D"] {
        let err = bad.parse::<PeriodOffset>().unwrap_err();
        assert_eq!(crate::common::ErrorCode::InvalidWindow, err.code, "{bad:?}");
    }
}

#[test]
fn test_apply_offsets() {
    let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();
    let offset = |s: &str| s.parse::<PeriodOffset>().unwrap();

    assert_eq!(Some(date(2019, 6, 27)), offset("-5D").apply(date(2019, 7, 2)));
    assert_eq!(Some(date(2019, 7, 16)), offset("2W").apply(date(2019, 7, 2)));
    assert_eq!(Some(date(2019, 2, 28)), offset("-1Q").apply(date(2019, 5, 31)));
    assert_eq!(Some(date(2020, 7, 3)), offset("1D1Y").apply(date(2019, 7, 2)));

    let noon = date(2019, 3, 31).and_hms_opt(12, 0, 0).unwrap();
    assert_eq!(
        date(2019, 2, 27).and_hms_opt(12, 0, 0),
        offset("-1M1D").apply(noon)
    );
}
