// src/timecard_client.rs

use async_trait::async_trait;
use chrono::{Datelike, Days, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

/// Days from the fortnight's reference date to its last day.
pub const FORTNIGHT_SPAN_DAYS: u64 = 13;
/// Most hours a fortnight can hold; anything larger is a misread.
pub const MAX_FORTNIGHT_HOURS: Decimal = dec!(336);
// A reference date further than this from today belongs to the adjacent year
const YEAR_ROLLOVER_THRESHOLD_DAYS: i64 = 183;

#[derive(Error, Debug)]
pub enum TimecardError {
    #[error("Cumulative hours text is not a number: '{0}'")]
    NonNumericHours(String),

    #[error("Cumulative hours still not numeric after {attempts} attempts (last text '{last_text}')")]
    RetriesExhausted { attempts: u32, last_text: String },

    #[error("Timed out after {timeout:?} waiting for {element} ({selector})")]
    ElementTimeout {
        element: &'static str,
        selector: String,
        timeout: Duration,
    },

    #[error("Cumulative hours '{0}' are outside 0..={max}", max = MAX_FORTNIGHT_HOURS)]
    HoursOutOfRange(String),

    #[error("Fortnight reference date '{0}' is not in 'weekday day/month' form")]
    ReferenceDate(String),

    #[error("Browser automation failed: {0}")]
    Browser(String),
}

impl From<chromiumoxide::error::CdpError> for TimecardError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        TimecardError::Browser(err.to_string())
    }
}

/// Raw text read from the timecard view in one portal session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalReading {
    /// `None` when the cumulative-hours element rendered without text.
    pub hours_text: Option<String>,
    pub reference_date_text: String,
}

/// One logged-in visit to the timekeeping portal.
#[async_trait]
pub trait TimecardPortal: Send + Sync {
    async fn read_timecard(&self) -> Result<PortalReading, TimecardError>;
}

/// Result of a successful timecard fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimecardSnapshot {
    pub completed_hours: Decimal,
    pub fortnight_end: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// Retries after the first attempt; `None` keeps trying forever.
    pub max_retries: Option<u32>,
}

// --- Parsing ---

/// Empty or missing text counts as zero hours.
pub fn parse_completed_hours(text: Option<&str>) -> Result<Decimal, TimecardError> {
    let trimmed = text.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return Ok(Decimal::ZERO);
    }
    let hours = Decimal::from_str(trimmed)
        .map_err(|_| TimecardError::NonNumericHours(trimmed.to_string()))?;
    if hours.is_sign_negative() || hours > MAX_FORTNIGHT_HOURS {
        return Err(TimecardError::HoursOutOfRange(trimmed.to_string()));
    }
    Ok(hours)
}

/// Reads "Mon 14/10" (day/month, year taken from `today`).
pub fn parse_reference_date(text: &str, today: NaiveDate) -> Result<NaiveDate, TimecardError> {
    let invalid = || TimecardError::ReferenceDate(text.trim().to_string());

    let day_month = text.split_whitespace().last().ok_or_else(invalid)?;
    let (day, month) = day_month.split_once('/').ok_or_else(invalid)?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    let month: u32 = month.parse().map_err(|_| invalid())?;

    let candidate = NaiveDate::from_ymd_opt(today.year(), month, day).ok_or_else(invalid)?;
    let offset = (candidate - today).num_days();
    let year = if offset > YEAR_ROLLOVER_THRESHOLD_DAYS {
        today.year() - 1
    } else if offset < -YEAR_ROLLOVER_THRESHOLD_DAYS {
        today.year() + 1
    } else {
        return Ok(candidate);
    };
    // 29/02 may not exist in the adjacent year
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

pub fn fortnight_end_from_reference(
    text: &str,
    today: NaiveDate,
) -> Result<NaiveDate, TimecardError> {
    let reference = parse_reference_date(text, today)?;
    reference
        .checked_add_days(Days::new(FORTNIGHT_SPAN_DAYS))
        .ok_or_else(|| TimecardError::ReferenceDate(text.trim().to_string()))
}

// --- Timecard Client ---

pub struct TimecardClient {
    portal: Arc<dyn TimecardPortal>,
    retry: RetryPolicy,
    session_gate: Option<Arc<Semaphore>>,
}

impl TimecardClient {
    pub fn new(portal: Arc<dyn TimecardPortal>, retry: RetryPolicy) -> Self {
        Self {
            portal,
            retry,
            session_gate: None,
        }
    }

    /// Caps how many portal sessions may run at once across report generations.
    pub fn with_session_limit(mut self, limit: usize) -> Self {
        self.session_gate = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    async fn read_once(&self) -> Result<PortalReading, TimecardError> {
        let _permit = match &self.session_gate {
            Some(gate) => Some(
                gate.acquire()
                    .await
                    .map_err(|e| TimecardError::Browser(format!("session gate closed: {}", e)))?,
            ),
            None => None,
        };
        self.portal.read_timecard().await
    }

    /// Logs into the portal and reads hours worked plus the fortnight end.
    /// Non-numeric hours restart the whole session after the retry delay;
    /// every other failure is returned as is.
    #[instrument(skip(self))]
    pub async fn fetch_completed_hours(
        &self,
        today: NaiveDate,
    ) -> Result<TimecardSnapshot, TimecardError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let reading = self.read_once().await?;
            debug!("Timecard reading (attempt {}): {:?}", attempt, reading);

            match parse_completed_hours(reading.hours_text.as_deref()) {
                Ok(completed_hours) => {
                    let fortnight_end =
                        fortnight_end_from_reference(&reading.reference_date_text, today)?;
                    if fortnight_end < today {
                        warn!(
                            "Fortnight end {} is before today {}; portal may show a stale period",
                            fortnight_end, today
                        );
                    }
                    info!(
                        "Completed hours: {}, fortnight ends {}",
                        completed_hours, fortnight_end
                    );
                    return Ok(TimecardSnapshot {
                        completed_hours,
                        fortnight_end,
                    });
                }
                Err(TimecardError::NonNumericHours(text)) => {
                    if let Some(max) = self.retry.max_retries {
                        if attempt > max {
                            return Err(TimecardError::RetriesExhausted {
                                attempts: attempt,
                                last_text: text,
                            });
                        }
                    }
                    warn!(
                        "Cumulative hours '{}' not numeric (attempt {}), retrying in {:?}",
                        text, attempt, self.retry.delay
                    );
                    sleep(self.retry.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
