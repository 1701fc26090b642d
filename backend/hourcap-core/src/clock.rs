// src/clock.rs
use chrono::{Local, NaiveDate, NaiveDateTime};

/// Source of "now" for report generation and scheduling.
/// Wall-clock local time, since rosters and timecards are expressed in it.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

// Fixed instant, used by tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: NaiveDateTime,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now }
    }

    #[cfg(test)]
    pub fn parse(datetime_str: &str) -> Self {
        let now = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M")
            .expect("Failed to parse datetime string in FixedClock::parse");
        Self { now }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn fixed_clock_splits_date_and_time() {
        let clock = FixedClock::parse("2026-10-19 10:30");
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert_eq!(clock.now().time(), NaiveTime::from_hms_opt(10, 30, 0).unwrap());
    }
}
