// src/report_engine.rs

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::fmt::Write as _;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::clock::Clock;
use crate::roster_client::RosterClient;
use crate::shift::ShiftRecord;
use crate::timecard_client::{TimecardClient, TimecardError};

pub const DEFAULT_HOURS_CAP: Decimal = dec!(48);

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Timecard portal failed: {0}")]
    Timecard(#[from] TimecardError),
}

/// Shifts split around the fortnight boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub within_fortnight: Vec<ShiftRecord>,
    pub beyond_fortnight: Vec<ShiftRecord>,
    pub total_booked_hours: Decimal,
}

/// Sorts roster shifts into this fortnight, later fortnights, or the past.
///
/// A shift still counts on its own day until its end time has passed.
/// Shifts after `fortnight_end` are listed but do not count toward the cap.
pub fn classify_shifts(
    snapshot: &[ShiftRecord],
    now: NaiveDateTime,
    fortnight_end: NaiveDate,
) -> Classification {
    let today = now.date();
    let mut classification = Classification::default();

    for shift in snapshot {
        if shift.date > fortnight_end {
            classification.beyond_fortnight.push(shift.clone());
        } else if shift.date > today || (shift.date == today && shift.ends_at() > now) {
            classification.total_booked_hours = classification
                .total_booked_hours
                .saturating_add(shift.duration_hours());
            classification.within_fortnight.push(shift.clone());
        }
    }

    classification
}

fn two_places(value: Decimal) -> String {
    format!(
        "{:.2}",
        value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

// Minimal escaping for Telegram's HTML parse mode
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

pub fn render_shift(shift: &ShiftRecord) -> String {
    format!(
        "{} <b>{}</b> {} {} {}",
        shift.date.format("%Y-%m-%d"),
        shift.day_name(),
        escape_html(&shift.label()),
        shift.start.format("%H:%M"),
        shift.end.format("%H:%M"),
    )
}

/// Builds the report text for a cap of `hours_cap`.
pub fn compose_report(
    hours_cap: Decimal,
    completed_hours: Decimal,
    booked_hours: Decimal,
    within: &[ShiftRecord],
    beyond: &[ShiftRecord],
) -> String {
    let total = completed_hours.saturating_add(booked_hours);
    let done = two_places(completed_hours);
    let booked = two_places(booked_hours);

    let mut report = if total > hours_cap {
        format!(
            "You Have Done {} Hours, and You Got Future Bookings For {} Hours, <b>Hours Exceeded By {}</b>",
            done,
            booked,
            two_places(total.saturating_sub(hours_cap))
        )
    } else {
        format!(
            "You Have Done {} Hours, and You Got Future Bookings For {} Hours, You Can Do {} More Hours",
            done,
            booked,
            two_places(hours_cap.saturating_sub(total))
        )
    };

    report.push_str("\nHere's Your Schedule For This Fortnight:\n");
    for shift in within {
        let _ = writeln!(report, "{}", render_shift(shift));
    }
    report.push_str("\nBeyond This Fortnight:\n");
    for shift in beyond {
        let _ = writeln!(report, "{}", render_shift(shift));
    }
    report
}

// --- Report Engine ---

pub struct ReportEngine {
    timecard: TimecardClient,
    roster: RosterClient,
    clock: Arc<dyn Clock>,
    hours_cap: Decimal,
}

impl ReportEngine {
    pub fn new(
        timecard: TimecardClient,
        roster: RosterClient,
        clock: Arc<dyn Clock>,
        hours_cap: Decimal,
    ) -> Self {
        Self {
            timecard,
            roster,
            clock,
            hours_cap,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Timecard first (it yields the fortnight boundary), then the roster.
    /// An unavailable roster degrades to "no bookings" instead of failing.
    #[instrument(skip(self))]
    pub async fn generate(&self) -> Result<String, ReportError> {
        let today = self.clock.today();
        let timecard = self.timecard.fetch_completed_hours(today).await.map_err(|e| {
            error!("Timecard fetch failed: {}", e);
            e
        })?;

        let snapshot = match self.roster.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Roster unavailable, reporting without bookings: {}", e);
                Vec::new()
            }
        };

        // Sample "now" after the slow portal session so in-progress shifts are judged fresh
        let now = self.clock.now();
        let classification = classify_shifts(&snapshot, now, timecard.fortnight_end);
        info!(
            "Classified {} shifts: {} this fortnight ({}h), {} beyond",
            snapshot.len(),
            classification.within_fortnight.len(),
            classification.total_booked_hours,
            classification.beyond_fortnight.len()
        );

        Ok(compose_report(
            self.hours_cap,
            timecard.completed_hours,
            classification.total_booked_hours,
            &classification.within_fortnight,
            &classification.beyond_fortnight,
        ))
    }
}
