//! Injectable clock and business-timezone calendar helpers.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

/// Source of the current instant and the business-local date.
///
/// All day arithmetic in the engine is done on dates in the business timezone,
/// so "today" always comes from here and never from `Utc::now()` directly.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn offset(&self) -> FixedOffset;

    fn today(&self) -> NaiveDate {
        self.local_date(self.now())
    }

    /// Business-local calendar date of an instant.
    fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset()).date_naive()
    }
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall clock in a fixed business timezone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new(utc_offset())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
            offset,
        }
    }

    /// Clock pinned to noon of `date` in the business timezone.
    pub fn at_date(date: NaiveDate, offset: FixedOffset) -> Self {
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN);
        let local = date.and_time(noon);
        let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
        Self::new(Utc.from_utc_datetime(&utc), offset)
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance_days(&self, days: i64) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += Duration::days(days);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|guard| *guard).unwrap_or_else(|poisoned| *poisoned.into_inner())
    }

    fn offset(&self) -> FixedOffset {
        self.offset
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Parse a `+HH:MM` / `-HH:MM` offset such as `+03:00`.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, String> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return Ok(utc_offset());
    }

    let (sign, rest) = match raw.chars().next() {
        Some('+') => (1, &raw[1..]),
        Some('-') => (-1, &raw[1..]),
        _ => return Err(format!("invalid UTC offset '{}': expected +HH:MM", raw)),
    };

    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None => (rest, "0"),
    };
    let hours: i32 = hours
        .parse()
        .map_err(|_| format!("invalid UTC offset hours in '{}'", raw))?;
    let minutes: i32 = minutes
        .parse()
        .map_err(|_| format!("invalid UTC offset minutes in '{}'", raw))?;
    if !(0..=14).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(format!("UTC offset '{}' out of range", raw));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("UTC offset '{}' out of range", raw))
}

/// Signed whole calendar days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    (to - from).num_days()
}

/// `date + days`, saturating at the calendar bounds.
pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date.checked_add_signed(Duration::days(days)).unwrap_or(if days >= 0 {
        NaiveDate::MAX
    } else {
        NaiveDate::MIN
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_utc_offset("+03:00").unwrap().local_minus_utc(), 3 * 3600);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("03:00").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
    }

    #[test]
    fn today_follows_business_timezone() {
        let riyadh = parse_utc_offset("+03:00").unwrap();
        // 22:30 UTC is already the next day at +03:00.
        let instant = Utc.with_ymd_and_hms(2025, 1, 31, 22, 30, 0).unwrap();
        let clock = ManualClock::new(instant, riyadh);
        assert_eq!(clock.today(), date(2025, 2, 1));

        let utc_clock = ManualClock::new(instant, utc_offset());
        assert_eq!(utc_clock.today(), date(2025, 1, 31));
    }

    #[test]
    fn manual_clock_advances_by_days() {
        let clock = ManualClock::at_date(date(2025, 3, 1), parse_utc_offset("+03:00").unwrap());
        assert_eq!(clock.today(), date(2025, 3, 1));
        clock.advance_days(10);
        assert_eq!(clock.today(), date(2025, 3, 11));
    }

    #[test]
    fn days_between_is_signed() {
        assert_eq!(days_between(date(2025, 1, 1), date(2025, 1, 31)), 30);
        assert_eq!(days_between(date(2025, 1, 31), date(2025, 1, 1)), -30);
        assert_eq!(days_between(date(2024, 2, 28), date(2024, 3, 1)), 2);
        assert_eq!(add_days(date(2025, 1, 1), 30), date(2025, 1, 31));
    }
}
