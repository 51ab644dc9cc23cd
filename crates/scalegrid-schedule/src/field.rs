//! Per-field cron parsing.
//!
//! Every field reduces to either "any value" or an explicit value set;
//! the set representation keeps matching a plain membership test.

use std::collections::BTreeSet;

use crate::error::ScheduleError;

/// Static description of one cron field: its name (for error messages),
/// the allowed numeric range, and optional symbolic names starting at
/// `min` (e.g. `JAN` = 1 for the month field).
pub(crate) struct FieldDef {
    pub name: &'static str,
    pub min: u16,
    pub max: u16,
    pub names: &'static [&'static str],
}

pub(crate) const SECONDS: FieldDef = FieldDef {
    name: "seconds",
    min: 0,
    max: 59,
    names: &[],
};

pub(crate) const MINUTES: FieldDef = FieldDef {
    name: "minutes",
    min: 0,
    max: 59,
    names: &[],
};

pub(crate) const HOURS: FieldDef = FieldDef {
    name: "hours",
    min: 0,
    max: 23,
    names: &[],
};

pub(crate) const DAY_OF_MONTH: FieldDef = FieldDef {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: &[],
};

pub(crate) const MONTH: FieldDef = FieldDef {
    name: "month",
    min: 1,
    max: 12,
    names: &[
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ],
};

// 0 and 7 both mean Sunday; 7 is normalized to 0 after parsing.
pub(crate) const DAY_OF_WEEK: FieldDef = FieldDef {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
};

pub(crate) const YEAR: FieldDef = FieldDef {
    name: "year",
    min: 1970,
    max: 2199,
    names: &[],
};

/// A parsed field: either unrestricted or an explicit set of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FieldMatcher {
    Any,
    Values(BTreeSet<u16>),
}

impl FieldMatcher {
    pub(crate) fn contains(&self, value: u16) -> bool {
        match self {
            FieldMatcher::Any => true,
            FieldMatcher::Values(set) => set.contains(&value),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_any(&self) -> bool {
        matches!(self, FieldMatcher::Any)
    }
}

/// Parse one field token (a comma-separated list of values, ranges, and
/// stepped ranges) against its definition.
pub(crate) fn parse_field(def: &FieldDef, token: &str) -> Result<FieldMatcher, ScheduleError> {
    if token == "*" || token == "?" {
        return Ok(FieldMatcher::Any);
    }

    let mut values = BTreeSet::new();
    for part in token.split(',') {
        if part.is_empty() {
            return Err(ScheduleError::Value {
                field: def.name,
                token: token.to_string(),
            });
        }
        parse_part(def, part, &mut values)?;
    }
    Ok(FieldMatcher::Values(values))
}

/// Parse a single list element: `n`, `a-b`, `*/s`, `a/s`, or `a-b/s`.
fn parse_part(
    def: &FieldDef,
    part: &str,
    values: &mut BTreeSet<u16>,
) -> Result<(), ScheduleError> {
    let (range, step) = match part.split_once('/') {
        Some((range, step_str)) => {
            let step: u16 = step_str.parse().map_err(|_| ScheduleError::Value {
                field: def.name,
                token: part.to_string(),
            })?;
            if step == 0 {
                return Err(ScheduleError::ZeroStep { field: def.name });
            }
            (range, step)
        }
        None => (part, 1),
    };

    let (lo, hi) = if range == "*" || range == "?" {
        (def.min, def.max)
    } else if let Some((lo_str, hi_str)) = range.split_once('-') {
        let lo = parse_value(def, lo_str)?;
        let hi = parse_value(def, hi_str)?;
        if lo > hi {
            return Err(ScheduleError::InvertedRange {
                field: def.name,
                token: part.to_string(),
            });
        }
        (lo, hi)
    } else {
        let v = parse_value(def, range)?;
        // A bare value with a step (`5/15`) runs to the field maximum.
        if step > 1 { (v, def.max) } else { (v, v) }
    };

    let mut v = lo;
    while v <= hi {
        values.insert(v);
        v += step;
    }
    Ok(())
}

/// Parse a single value: a number within range, or a symbolic name.
fn parse_value(def: &FieldDef, token: &str) -> Result<u16, ScheduleError> {
    if !def.names.is_empty() {
        let upper = token.to_ascii_uppercase();
        if let Some(idx) = def.names.iter().position(|n| *n == upper) {
            return Ok(def.min + idx as u16);
        }
    }

    let value: u16 = token.parse().map_err(|_| ScheduleError::Value {
        field: def.name,
        token: token.to_string(),
    })?;
    if value < def.min || value > def.max {
        return Err(ScheduleError::OutOfRange {
            field: def.name,
            value,
            min: def.min,
            max: def.max,
        });
    }
    Ok(value)
}
