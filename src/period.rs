// src/period.rs
use chrono::{Datelike, NaiveDate, NaiveDateTime, Weekday};
use serde::Serialize;

/// Day-of-month on which the second quincena begins.
pub const QUINCENA_SPLIT_DAY: u32 = 16;

/// Latest configurable reset day. Clamping to 28 keeps the boundary valid in
/// February and avoids end-of-month ambiguity.
pub const MAX_RESET_DAY: u32 = 28;

/// Accounting period identifier. The dashboard partitions time either by
/// calendar month or by quincena (half-month payroll cycle).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "scheme", rename_all = "lowercase")]
pub enum Period {
    Monthly { year: i32, month: u32 },
    Biweekly { year: i32, month: u32, quincena: u8 },
}

impl Period {
    pub fn year(&self) -> i32 {
        match *self {
            Period::Monthly { year, .. } | Period::Biweekly { year, .. } => year,
        }
    }

    /// Calendar month, 1-12.
    pub fn month(&self) -> u32 {
        match *self {
            Period::Monthly { month, .. } | Period::Biweekly { month, .. } => month,
        }
    }

    pub fn quincena(&self) -> Option<u8> {
        match *self {
            Period::Monthly { .. } => None,
            Period::Biweekly { quincena, .. } => Some(quincena),
        }
    }
}

/// Partition strategy: classifies an instant into a `Period`, decides whether
/// a given date is a reset boundary, and computes the next boundary date.
///
/// Resets are aligned to "the first Monday of the new period" rather than the
/// calendar boundary itself, so the dashboard never clears itself over a
/// weekend. `is_boundary` therefore requires the Monday conjunction while
/// `next_boundary` reports the plain calendar date shown in the banner.
pub trait PeriodScheme: Send + Sync {
    fn period_for(&self, now: NaiveDateTime) -> Period;

    fn is_boundary(&self, date: NaiveDate) -> bool;

    /// Next calendar reset date, strictly after `today`. Iterating from each
    /// returned date advances exactly one period at a time.
    fn next_boundary(&self, today: NaiveDate) -> NaiveDate;

    /// Name of the broadcast event this scheme emits.
    fn event_name(&self) -> &'static str;
}

/// Calendar-month partition with a configurable reset day (1 by default).
#[derive(Debug, Clone, Copy)]
pub struct MonthlyScheme {
    reset_day: u32,
}

impl MonthlyScheme {
    pub fn new(reset_day: u32) -> Self {
        Self {
            reset_day: reset_day.clamp(1, MAX_RESET_DAY),
        }
    }

    pub fn reset_day(&self) -> u32 {
        self.reset_day
    }
}

impl Default for MonthlyScheme {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PeriodScheme for MonthlyScheme {
    fn period_for(&self, now: NaiveDateTime) -> Period {
        Period::Monthly {
            year: now.year(),
            month: now.month(),
        }
    }

    fn is_boundary(&self, date: NaiveDate) -> bool {
        // Monday, on the first of the month or the configured reset day.
        date.weekday() == Weekday::Mon && (date.day() == 1 || date.day() == self.reset_day)
    }

    fn next_boundary(&self, today: NaiveDate) -> NaiveDate {
        if today.day() >= self.reset_day {
            let (year, month) = next_month(today.year(), today.month());
            ymd(year, month, self.reset_day)
        } else {
            ymd(today.year(), today.month(), self.reset_day)
        }
    }

    fn event_name(&self) -> &'static str {
        "monthlyReset"
    }
}

/// Quincena partition: days 1-15 are the first half, day 16 to end-of-month
/// the second. The split days are fixed by the payroll cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct BiweeklyScheme;

impl BiweeklyScheme {
    pub fn quincena_for_day(day: u32) -> u8 {
        if day < QUINCENA_SPLIT_DAY {
            1
        } else {
            2
        }
    }

    /// Legacy end-of-quincena heuristic carried over from the workshop
    /// section. Informational only; resets key off the Monday rule.
    pub fn is_sunday_end_of_quincena(date: NaiveDate) -> bool {
        date.weekday() == Weekday::Sun
    }
}

impl PeriodScheme for BiweeklyScheme {
    fn period_for(&self, now: NaiveDateTime) -> Period {
        Period::Biweekly {
            year: now.year(),
            month: now.month(),
            quincena: Self::quincena_for_day(now.day()),
        }
    }

    fn is_boundary(&self, date: NaiveDate) -> bool {
        date.weekday() == Weekday::Mon
            && (date.day() == 1 || date.day() == QUINCENA_SPLIT_DAY)
    }

    fn next_boundary(&self, today: NaiveDate) -> NaiveDate {
        if today.day() < QUINCENA_SPLIT_DAY {
            ymd(today.year(), today.month(), QUINCENA_SPLIT_DAY)
        } else {
            let (year, month) = next_month(today.year(), today.month());
            ymd(year, month, 1)
        }
    }

    fn event_name(&self) -> &'static str {
        "biweeklyReset"
    }
}

/// Whole days until `target` midnight, rounded up. Zero once the date has
/// arrived or passed.
pub fn days_until(now: NaiveDateTime, target: NaiveDate) -> i64 {
    let target_midnight = target
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    let secs = (target_midnight - now).num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + 86_399) / 86_400
    }
}

pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    // Day is always 1, 16 or a clamped reset day (<= 28), valid in any month.
    NaiveDate::from_ymd_opt(year, month, day).expect("boundary day is valid in every month")
}
