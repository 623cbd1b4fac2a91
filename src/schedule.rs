//! Calendar rules deciding which days are backed up and which archived
//! backups are still retained.
//!
//! Only the first and third Saturday of each month are eligible. A backup is
//! retained while its day is an eligible Saturday inside the inclusive window
//! `[today - 3 years, today]`.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use log::debug;

/// Length of the rolling retention window.
pub const RETENTION_MONTHS: u32 = 36;

/// Saturday ordinals (counted from 1 within a month) that are kept.
pub const RETAINED_SATURDAYS: [u32; 2] = [1, 3];

pub fn is_saturday(date: NaiveDate) -> bool {
    date.weekday() == Weekday::Sat
}

/// Position of `date` among the Saturdays of its month, starting at 1.
/// Returns `None` for any other weekday.
pub fn saturday_ordinal(date: NaiveDate) -> Option<u32> {
    if !is_saturday(date) {
        return None;
    }
    Some((date.day() - 1) / 7 + 1)
}

/// The `n`th Saturday (1-based) of the given month, if the month has one.
pub fn nth_saturday(year: i32, month: u32, n: u32) -> Option<NaiveDate> {
    if n == 0 {
        return None;
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (Weekday::Sat.num_days_from_monday() + 7
        - first.weekday().num_days_from_monday())
        % 7;
    let date = first.checked_add_days(Days::new(u64::from(offset + 7 * (n - 1))))?;
    (date.month() == month).then_some(date)
}

/// True iff `date` is the first or third Saturday of its month.
pub fn is_valid_saturday(date: NaiveDate) -> bool {
    saturday_ordinal(date).is_some_and(|n| RETAINED_SATURDAYS.contains(&n))
}

/// Oldest day still covered by the retention window anchored at `today`.
pub fn retention_cut_off(today: NaiveDate) -> NaiveDate {
    today
        .checked_sub_months(Months::new(RETENTION_MONTHS))
        .unwrap_or(NaiveDate::MIN)
}

/// True iff a backup taken on `date` must still be kept on `today`.
pub fn meets_retention_policy(date: NaiveDate, today: NaiveDate) -> bool {
    retention_cut_off(today) <= date && date <= today && is_valid_saturday(date)
}

/// The set of retained days for one anchor date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionWindow {
    anchor: NaiveDate,
    cut_off: NaiveDate,
    days: BTreeSet<NaiveDate>,
}

impl RetentionWindow {
    pub fn compute(anchor: NaiveDate) -> Self {
        let cut_off = retention_cut_off(anchor);
        let mut days = BTreeSet::new();

        let mut month_start = cut_off.with_day(1).unwrap_or(cut_off);
        while month_start <= anchor {
            for n in RETAINED_SATURDAYS {
                if let Some(day) = nth_saturday(month_start.year(), month_start.month(), n) {
                    if cut_off <= day && day <= anchor {
                        days.insert(day);
                    }
                }
            }
            match month_start.checked_add_months(Months::new(1)) {
                Some(next) => month_start = next,
                None => break,
            }
        }

        Self {
            anchor,
            cut_off,
            days,
        }
    }

    pub fn anchor(&self) -> NaiveDate {
        self.anchor
    }

    pub fn cut_off(&self) -> NaiveDate {
        self.cut_off
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn oldest(&self) -> Option<NaiveDate> {
        self.days.first().copied()
    }

    pub fn newest(&self) -> Option<NaiveDate> {
        self.days.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.iter().copied()
    }
}

/// Memoizes retention windows per anchor date.
///
/// A window is only ever reused for the exact anchor it was computed for.
#[derive(Debug, Default)]
pub struct RetentionPolicy {
    windows: Mutex<HashMap<NaiveDate, Arc<RetentionWindow>>>,
}

impl RetentionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window(&self, anchor: NaiveDate) -> Arc<RetentionWindow> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(windows.entry(anchor).or_insert_with(|| {
            debug!("Computing retention window anchored at {anchor}");
            Arc::new(RetentionWindow::compute(anchor))
        }))
    }

    pub fn retains(&self, date: NaiveDate, today: NaiveDate) -> bool {
        self.window(today).contains(date)
    }
}
