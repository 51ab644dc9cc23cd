//! The parsed schedule and its UTC matcher.

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};

use crate::error::ScheduleError;
use crate::field::{
    self, FieldMatcher, DAY_OF_MONTH, DAY_OF_WEEK, HOURS, MINUTES, MONTH, SECONDS, YEAR,
};

/// Day-of-month is the one field with calendar-dependent tokens, so it
/// gets its own representation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DayOfMonth {
    Days(FieldMatcher),
    /// `L` — the last calendar day of the month.
    Last,
    /// `LW` — the last Monday-through-Friday day of the month.
    LastWeekday,
}

/// A parsed cron schedule, matched against UTC instants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    seconds: FieldMatcher,
    minutes: FieldMatcher,
    hours: FieldMatcher,
    day_of_month: DayOfMonth,
    month: FieldMatcher,
    day_of_week: FieldMatcher,
    year: FieldMatcher,
}

impl Schedule {
    /// Parse a 6- or 7-field cron expression (the trailing year field is
    /// optional).
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 6 && fields.len() != 7 {
            return Err(ScheduleError::FieldCount(fields.len()));
        }

        let day_of_month = match fields[3].to_ascii_uppercase().as_str() {
            "L" => DayOfMonth::Last,
            "LW" => DayOfMonth::LastWeekday,
            _ => DayOfMonth::Days(field::parse_field(&DAY_OF_MONTH, fields[3])?),
        };

        let day_of_week = normalize_sunday(field::parse_field(&DAY_OF_WEEK, fields[5])?);

        let year = match fields.get(6) {
            Some(token) => field::parse_field(&YEAR, token)?,
            None => FieldMatcher::Any,
        };

        Ok(Self {
            seconds: field::parse_field(&SECONDS, fields[0])?,
            minutes: field::parse_field(&MINUTES, fields[1])?,
            hours: field::parse_field(&HOURS, fields[2])?,
            day_of_month,
            month: field::parse_field(&MONTH, fields[4])?,
            day_of_week,
            year,
        })
    }

    /// Whether this schedule is in effect at the given UTC instant.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !self.seconds.contains(at.second() as u16)
            || !self.minutes.contains(at.minute() as u16)
            || !self.hours.contains(at.hour() as u16)
            || !self.month.contains(at.month() as u16)
        {
            return false;
        }

        let dow = at.weekday().num_days_from_sunday() as u16;
        if !self.day_of_week.contains(dow) {
            return false;
        }

        let day = at.day();
        let dom_ok = match &self.day_of_month {
            DayOfMonth::Days(matcher) => matcher.contains(day as u16),
            DayOfMonth::Last => day == last_day_of_month(at.year(), at.month()),
            DayOfMonth::LastWeekday => day == last_weekday_of_month(at.year(), at.month()),
        };
        if !dom_ok {
            return false;
        }

        let year = at.year();
        match &self.year {
            FieldMatcher::Any => true,
            matcher => (0..=u16::MAX as i32).contains(&year) && matcher.contains(year as u16),
        }
    }
}

/// Both `0` and `7` mean Sunday; fold 7 into 0 so matching sees one
/// canonical value.
fn normalize_sunday(matcher: FieldMatcher) -> FieldMatcher {
    match matcher {
        FieldMatcher::Values(mut set) => {
            if set.remove(&7) {
                set.insert(0);
            }
            FieldMatcher::Values(set)
        }
        any => any,
    }
}

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(31)
}

fn last_weekday_of_month(year: i32, month: u32) -> u32 {
    let last = last_day_of_month(year, month);
    for day in (1..=last).rev() {
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            match d.weekday() {
                Weekday::Sat | Weekday::Sun => continue,
                _ => return day,
            }
        }
    }
    last
}
