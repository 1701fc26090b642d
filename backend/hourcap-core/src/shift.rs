// src/shift.rs
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const MINUTES_PER_DAY: i64 = 24 * 60;

// --- Shift Records ---

/// One assigned shift from the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftRecord {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// Location descriptions, space separated (ward, campus).
    pub location: String,
    /// Free-text note from whoever assigned the shift.
    pub assigner_note: Option<String>,
}

impl ShiftRecord {
    pub fn day_name(&self) -> String {
        self.date.format("%A").to_string()
    }

    /// True when the shift finishes on the following day (end before start).
    pub fn spans_midnight(&self) -> bool {
        self.end < self.start
    }

    pub fn duration_minutes(&self) -> i64 {
        let minutes = (self.end - self.start).num_minutes();
        if minutes < 0 {
            minutes + MINUTES_PER_DAY
        } else {
            minutes
        }
    }

    pub fn duration_hours(&self) -> Decimal {
        Decimal::from(self.duration_minutes()) / dec!(60)
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        if self.spans_midnight() {
            // A roster date near NaiveDate::MAX is not a real shift; keep it on its own day
            self.date
                .checked_add_days(Days::new(1))
                .unwrap_or(self.date)
                .and_time(self.end)
        } else {
            self.date.and_time(self.end)
        }
    }

    /// Location plus the assigner note, as shown in reports.
    pub fn label(&self) -> String {
        match self.assigner_note.as_deref().map(str::trim) {
            Some(note) if !note.is_empty() => format!("{} {}", self.location, note),
            _ => self.location.clone(),
        }
    }
}

/// Shifts as returned by the roster, in source order.
pub type RosterSnapshot = Vec<ShiftRecord>;

#[cfg(test)]
pub(crate) fn shift(date: &str, start: &str, end: &str) -> ShiftRecord {
    ShiftRecord {
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
        start: NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
        end: NaiveTime::parse_from_str(end, "%H:%M").unwrap(),
        location: "Ward 4 Clayton".to_string(),
        assigner_note: None,
    }
}
