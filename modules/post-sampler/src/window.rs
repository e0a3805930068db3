//! Month, day and random time-window enumeration over an inclusive date range.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Utc};
use rand::Rng;

const SECS_PER_HOUR: i64 = 3600;
const LAST_SECOND_OF_DAY: i64 = 86_399;

/// How far a window extends past its random start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpan {
    /// Up to `:59:59` of the start hour.
    HourCeiling,
    /// Up to `23:59:59` of the start day.
    EndOfDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Every month touched by `[start, end]`, in order.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<YearMonth> {
    let last = YearMonth::of(end);
    let mut months = Vec::new();
    let mut cur = YearMonth::of(start);
    while cur <= last {
        months.push(cur);
        cur = cur.next();
    }
    months
}

/// The days of one month that fall inside the configured range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthSpan {
    pub month: YearMonth,
    pub first: NaiveDate,
    pub last: NaiveDate,
}

impl MonthSpan {
    /// Clip `month` to `[start, end]`. None when they don't overlap.
    pub fn clip(month: YearMonth, start: NaiveDate, end: NaiveDate) -> Option<Self> {
        let month_first = month.first_day()?;
        let month_last = month.next().first_day()?.pred_opt()?;

        let first = month_first.max(start);
        let last = month_last.min(end);
        (first <= last).then_some(Self { month, first, last })
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let last = self.last;
        self.first.iter_days().take_while(move |d| *d <= last)
    }

    pub fn day_count(&self) -> usize {
        (self.last - self.first).num_days() as usize + 1
    }
}

/// A query interval inside a single calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl SampleWindow {
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn day(&self) -> NaiveDate {
        self.start.date_naive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WindowSampler {
    span: WindowSpan,
}

impl WindowSampler {
    pub fn new(span: WindowSpan) -> Self {
        Self { span }
    }

    /// Draw a uniformly random second of `day` and extend it per the span.
    pub fn draw<R: Rng + ?Sized>(&self, day: NaiveDate, rng: &mut R) -> SampleWindow {
        let hour: i64 = rng.random_range(0..24);
        let minute: i64 = rng.random_range(0..60);
        let second: i64 = rng.random_range(0..60);

        let midnight = day.and_time(NaiveTime::MIN);
        let offset = hour * SECS_PER_HOUR + minute * 60 + second;
        let end_offset = match self.span {
            WindowSpan::HourCeiling => hour * SECS_PER_HOUR + SECS_PER_HOUR - 1,
            WindowSpan::EndOfDay => LAST_SECOND_OF_DAY,
        };

        SampleWindow {
            start: (midnight + TimeDelta::seconds(offset)).and_utc(),
            end: (midnight + TimeDelta::seconds(end_offset)).and_utc(),
        }
    }
}
