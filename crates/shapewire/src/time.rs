//! Date/time scalars and their tick-count wire forms.
//!
//! Both scalars travel as 8-byte counts of 100-nanosecond ticks; `DateTime`
//! ticks are measured from 0001-01-01T00:00:00.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::error::Error;

/// Ticks per second (100 ns units).
pub const TICKS_PER_SECOND: i64 = 10_000_000;

const TICKS_PER_DAY: i64 = 86_400 * TICKS_PER_SECOND;

/// The calendar date-time scalar.
pub type DateTime = NaiveDateTime;

fn tick_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .expect("calendar epoch")
        .and_hms_opt(0, 0, 0)
        .expect("calendar epoch")
}

/// Converts a date-time to its tick count.
pub fn datetime_to_ticks(dt: &DateTime) -> i64 {
    let delta = dt.signed_duration_since(tick_epoch());
    delta.num_seconds() * TICKS_PER_SECOND + (delta.subsec_nanos() as i64) / 100
}

/// Converts a tick count back to a date-time.
pub fn datetime_from_ticks(ticks: i64) -> Result<DateTime, Error> {
    if ticks < 0 {
        return Err(Error::stream(format!("negative date ticks {ticks}")));
    }
    let days = ticks / TICKS_PER_DAY;
    let rem = ticks % TICKS_PER_DAY;
    let secs = rem / TICKS_PER_SECOND;
    let nanos = (rem % TICKS_PER_SECOND) * 100;
    tick_epoch()
        .checked_add_signed(chrono::Duration::days(days))
        .and_then(|d| d.checked_add_signed(chrono::Duration::seconds(secs)))
        .and_then(|d| d.checked_add_signed(chrono::Duration::nanoseconds(nanos)))
        .ok_or_else(|| Error::stream(format!("date ticks {ticks} out of range")))
}

/// Renders the round-trip text form `yyyy-MM-ddTHH:mm:ss.fffffff`.
pub fn format_datetime(dt: &DateTime) -> String {
    let frac = (dt.nanosecond() % 1_000_000_000) / 100;
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:07}",
        dt.year(),
        dt.month(),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        frac
    )
}

/// Parses the round-trip text form, tolerating a trailing `Z` or UTC offset.
pub fn parse_datetime(s: &str) -> Result<DateTime, Error> {
    let bad = || Error::stream(format!("bad date literal '{s}'"));
    let trimmed = s.strip_suffix('Z').unwrap_or(s);
    let trimmed = match trimmed.find(['+']) {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|_| bad())
}

/// A signed duration counted in 100-nanosecond ticks.
///
/// The text form is the constant format `[-][d.]hh:mm:ss[.fffffff]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSpan {
    ticks: i64,
}

impl TimeSpan {
    pub const fn from_ticks(ticks: i64) -> TimeSpan {
        TimeSpan { ticks }
    }

    pub fn from_hms(hours: i64, minutes: i64, seconds: i64) -> TimeSpan {
        TimeSpan {
            ticks: ((hours * 60 + minutes) * 60 + seconds) * TICKS_PER_SECOND,
        }
    }

    pub const fn ticks(&self) -> i64 {
        self.ticks
    }
}

impl fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut t = self.ticks;
        if t < 0 {
            write!(f, "-")?;
            t = -t;
        }
        let days = t / TICKS_PER_DAY;
        t %= TICKS_PER_DAY;
        let hours = t / (3600 * TICKS_PER_SECOND);
        t %= 3600 * TICKS_PER_SECOND;
        let minutes = t / (60 * TICKS_PER_SECOND);
        t %= 60 * TICKS_PER_SECOND;
        let seconds = t / TICKS_PER_SECOND;
        let frac = t % TICKS_PER_SECOND;
        if days > 0 {
            write!(f, "{days}.")?;
        }
        write!(f, "{hours:02}:{minutes:02}:{seconds:02}")?;
        if frac > 0 {
            write!(f, ".{frac:07}")?;
        }
        Ok(())
    }
}

impl FromStr for TimeSpan {
    type Err = Error;

    fn from_str(s: &str) -> Result<TimeSpan, Error> {
        let bad = || Error::stream(format!("bad time span literal '{s}'"));
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let parts: Vec<&str> = rest.split(':').collect();
        if parts.len() != 3 {
            return Err(bad());
        }
        let (days, hours) = match parts[0].split_once('.') {
            Some((d, h)) => (
                d.parse::<i64>().map_err(|_| bad())?,
                h.parse::<i64>().map_err(|_| bad())?,
            ),
            None => (0, parts[0].parse::<i64>().map_err(|_| bad())?),
        };
        let minutes: i64 = parts[1].parse().map_err(|_| bad())?;
        let (seconds, frac) = match parts[2].split_once('.') {
            Some((sec, frac_str)) => {
                if frac_str.is_empty() || frac_str.len() > 7 {
                    return Err(bad());
                }
                let scaled: i64 = frac_str.parse().map_err(|_| bad())?;
                (
                    sec.parse::<i64>().map_err(|_| bad())?,
                    scaled * 10_i64.pow(7 - frac_str.len() as u32),
                )
            }
            None => (parts[2].parse::<i64>().map_err(|_| bad())?, 0),
        };
        if !(0..24).contains(&hours) || !(0..60).contains(&minutes) || !(0..60).contains(&seconds) {
            return Err(bad());
        }
        let mut ticks = days * TICKS_PER_DAY
            + ((hours * 60 + minutes) * 60 + seconds) * TICKS_PER_SECOND
            + frac;
        if negative {
            ticks = -ticks;
        }
        Ok(TimeSpan { ticks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_tick_roundtrip() {
        let dt = NaiveDate::from_ymd_opt(2024, 8, 5)
            .unwrap()
            .and_hms_nano_opt(16, 23, 1, 123_456_700)
            .unwrap();
        let ticks = datetime_to_ticks(&dt);
        assert_eq!(datetime_from_ticks(ticks).unwrap(), dt);
    }

    #[test]
    fn datetime_text_roundtrip() {
        let dt = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_nano_opt(23, 59, 59, 999_999_900)
            .unwrap();
        let text = format_datetime(&dt);
        assert_eq!(text, "1999-12-31T23:59:59.9999999");
        assert_eq!(parse_datetime(&text).unwrap(), dt);
        assert_eq!(parse_datetime("1999-12-31T23:59:59.9999999Z").unwrap(), dt);
    }

    #[test]
    fn timespan_text_forms() {
        for (text, ts) in [
            ("00:00:00", TimeSpan::from_ticks(0)),
            ("01:02:03", TimeSpan::from_hms(1, 2, 3)),
            ("-01:00:00", TimeSpan::from_hms(-1, 0, 0)),
            (
                "2.03:04:05",
                TimeSpan::from_ticks(2 * TICKS_PER_DAY + ((3 * 60 + 4) * 60 + 5) * TICKS_PER_SECOND),
            ),
            ("00:00:00.0000001", TimeSpan::from_ticks(1)),
            ("00:00:01.5", TimeSpan::from_ticks(15_000_000)),
        ] {
            assert_eq!(ts.to_string(), text, "display of {ts:?}");
            assert_eq!(text.parse::<TimeSpan>().unwrap(), ts, "parse of {text}");
        }
    }

    #[test]
    fn timespan_rejects_garbage() {
        for bad in ["", "1:2", "aa:bb:cc", "00:61:00", "00:00:00.", "00:00:00.12345678"] {
            assert!(bad.parse::<TimeSpan>().is_err(), "{bad}");
        }
    }
}
