//! scalegrid-schedule — cron schedule parsing and matching.
//!
//! Parses 7-field cron expressions (`seconds minutes hours day-of-month
//! month day-of-week [year]` — the year is optional) and answers "is this
//! schedule in effect at instant *t*?". Matching is always against UTC.
//!
//! Each field supports `*` (and `?` as a synonym), single values, lists
//! (`a,b,c`), ranges (`a-b`), and steps (`*/n`, `a-b/n`). Months accept
//! `JAN`-`DEC`, days of week accept `SUN`-`SAT` or `0`-`7` (both `0` and
//! `7` are Sunday). The day-of-month field additionally accepts `L` (last
//! day of the month) and `LW` (last weekday — Monday through Friday — of
//! the month).
//!
//! When both day-of-month and day-of-week are restricted, an instant must
//! satisfy both.
//!
//! ```
//! use chrono::{TimeZone, Utc};
//! use scalegrid_schedule::Schedule;
//!
//! // Fridays, 10:00 through 21:59 UTC.
//! let s = Schedule::parse("* * 10-21 ? * FRI").unwrap();
//! let friday_noon = Utc.with_ymd_and_hms(2026, 9, 4, 12, 0, 0).unwrap();
//! assert!(s.matches(friday_noon));
//! ```

mod error;
mod field;
mod schedule;

pub use error::ScheduleError;
pub use schedule::Schedule;
