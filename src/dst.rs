//! Fixed summer-time rule for a central European deployment.
//!
//! No timezone database is consulted. The rule only looks at the month, the
//! day of month, the weekday and the hour of the standard local time, and
//! special-cases the two transition months (March and October) using
//! [`last_sunday_of_31_day_month`].

use chrono::{DateTime, Datelike, Timelike};

pub const SUMMER_OFFSET_SECS: i64 = 3_600;

const MARCH: u32 = 2;
const OCTOBER: u32 = 9;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum DstRule {
    /// Never adjust.
    Off,
    /// The rule as deployed: its outer month check (`month >= 3 || month <= 10`)
    /// is true for every month, so the adjustment is always applied.
    #[default]
    Literal,
    /// April to September are summer; March and October use the
    /// last-Sunday boundary unchanged.
    Bounded,
}

impl DstRule {
    pub fn label(self) -> &'static str {
        match self {
            DstRule::Off => "off",
            DstRule::Literal => "literal",
            DstRule::Bounded => "bounded",
        }
    }
}

/// Calendar view of a standard-time local timestamp. Months are 0-based,
/// weekdays count from Sunday.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct CalendarFields {
    pub month0: u32,
    pub mday: u32,
    pub wday: u32,
    pub hour: u32,
}

pub fn calendar_fields(local_secs: i64) -> Option<CalendarFields> {
    let datetime = DateTime::from_timestamp(local_secs, 0)?;
    Some(CalendarFields {
        month0: datetime.month0(),
        mday: datetime.day(),
        wday: datetime.weekday().num_days_from_sunday(),
        hour: datetime.hour(),
    })
}

/// Day of month of the last Sunday, given today's day of month and weekday.
///
/// Only valid for 31-day months. Within the final week the answer is the
/// nearest Sunday that still fits in the month; earlier in the month it is
/// the next Sunday plus whole weeks from an integer division, which can
/// land one week short when the next Sunday starts a partial week.
pub fn last_sunday_of_31_day_month(mday: i32, wday: i32) -> i32 {
    if wday != 0 && 31 - mday < 7 {
        if mday + (7 - wday) <= 31 {
            mday + (7 - wday)
        } else {
            mday - wday
        }
    } else {
        mday + (7 - wday) + 7 * ((31 - mday) / 7 - 1)
    }
}

pub fn summer_time_applies(rule: DstRule, fields: &CalendarFields) -> bool {
    match rule {
        DstRule::Off => false,
        DstRule::Literal => {
            let in_summer_range = fields.month0 >= 3 || fields.month0 <= 10;
            in_summer_range || transition_month_applies(fields)
        }
        DstRule::Bounded => {
            (3..=8).contains(&fields.month0) || transition_month_applies(fields)
        }
    }
}

fn transition_month_applies(fields: &CalendarFields) -> bool {
    let last_sunday = last_sunday_of_31_day_month(fields.mday as i32, fields.wday as i32);
    let mday = fields.mday as i32;
    match fields.month0 {
        MARCH => mday > last_sunday || fields.hour >= 2,
        OCTOBER => mday < last_sunday || fields.hour < 3,
        _ => false,
    }
}

/// Seconds to add to standard local time at `local_secs`.
pub fn summer_offset_secs(rule: DstRule, local_secs: i64) -> i64 {
    match calendar_fields(local_secs) {
        Some(fields) if summer_time_applies(rule, &fields) => SUMMER_OFFSET_SECS,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn local(year: i32, month: u32, day: u32, hour: u32) -> i64 {
        NaiveDate::from_ymd_opt(year, month, day)
            .expect("valid date")
            .and_hms_opt(hour, 0, 0)
            .expect("valid time")
            .and_utc()
            .timestamp()
    }

    fn fields(year: i32, month: u32, day: u32, hour: u32) -> CalendarFields {
        calendar_fields(local(year, month, day, hour)).expect("in range")
    }

    #[test]
    fn last_sunday_table() {
        // (day of month, weekday, expected last Sunday)
        let cases = [
            (1, 3, 26),  // month starting on a Wednesday
            (10, 5, 26), // October 2025 has Sundays 5, 12, 19, 26
            (25, 6, 26),
            (26, 0, 26),
            (27, 1, 26),
            (31, 5, 26),
            (30, 0, 30), // March 2025
            (31, 1, 30),
            (10, 1, 30),
            (31, 0, 31),
            (24, 0, 31),
            (4, 6, 19), // next Sunday on the 5th, fallback counts two more weeks
        ];
        for (mday, wday, expected) in cases {
            assert_eq!(
                last_sunday_of_31_day_month(mday, wday),
                expected,
                "mday {mday}, wday {wday}"
            );
        }
    }

    #[test]
    fn calendar_fields_are_zero_based_months_and_sunday_weekdays() {
        let parsed = fields(2025, 10, 26, 2);
        assert_eq!(
            parsed,
            CalendarFields {
                month0: 9,
                mday: 26,
                wday: 0,
                hour: 2
            }
        );
    }

    #[test]
    fn bounded_rule_october_boundary() {
        let cases = [
            (fields(2025, 10, 25, 12), true),
            (fields(2025, 10, 26, 2), true),
            (fields(2025, 10, 26, 4), false),
            (fields(2025, 10, 27, 12), false),
            (fields(2025, 10, 1, 12), true),
        ];
        for (input, expected) in cases {
            assert_eq!(
                summer_time_applies(DstRule::Bounded, &input),
                expected,
                "{input:?}"
            );
        }
    }

    #[test]
    fn bounded_rule_march_boundary() {
        let cases = [
            (fields(2025, 3, 10, 1), false),
            (fields(2025, 3, 30, 1), false),
            (fields(2025, 3, 30, 2), true),
            (fields(2025, 3, 31, 0), true),
        ];
        for (input, expected) in cases {
            assert_eq!(
                summer_time_applies(DstRule::Bounded, &input),
                expected,
                "{input:?}"
            );
        }
    }

    #[test]
    fn bounded_rule_outside_transition_months() {
        assert!(summer_time_applies(DstRule::Bounded, &fields(2025, 7, 14, 9)));
        assert!(!summer_time_applies(DstRule::Bounded, &fields(2025, 1, 14, 9)));
        assert!(!summer_time_applies(DstRule::Bounded, &fields(2025, 12, 1, 9)));
        assert!(!summer_time_applies(DstRule::Bounded, &fields(2025, 11, 2, 9)));
    }

    #[test]
    fn literal_rule_adjusts_every_month() {
        for month in 1..=12 {
            assert!(
                summer_time_applies(DstRule::Literal, &fields(2025, month, 15, 12)),
                "month {month}"
            );
        }
        assert!(summer_time_applies(DstRule::Literal, &fields(2025, 10, 27, 12)));
    }

    #[test]
    fn off_rule_never_adjusts() {
        assert_eq!(summer_offset_secs(DstRule::Off, local(2025, 7, 1, 12)), 0);
        assert_eq!(
            summer_offset_secs(DstRule::Bounded, local(2025, 7, 1, 12)),
            SUMMER_OFFSET_SECS
        );
    }
}
