// src/roster_client.rs

use chrono::{NaiveDate, NaiveTime};
use reqwest::header::{ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::shift::{RosterSnapshot, ShiftRecord};

pub const DEFAULT_ROSTER_URL: &str = "https://monash.shiftmatch.com.au/cascom/json.my.roster.do";
// The roster service only answers its mobile app's client string
pub const ROSTER_USER_AGENT: &str = "okhttp/4.10.0";

/// Every variant means "the roster is unavailable right now".
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Roster request failed")]
    Request(#[from] reqwest::Error),

    #[error("Roster service returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Roster payload could not be decoded")]
    Decode(#[from] serde_json::Error),
}

// --- Roster API Data Structures ---

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterEnvelope {
    #[serde(default)]
    pub roster: Option<RosterBody>,
}

/// Records stay raw until `into_snapshot` so one bad record cannot sink the rest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RosterBody {
    #[serde(default)]
    pub shortfalls: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub day: String,
    pub shift_start: String,
    pub shift_end: String,
    pub location4: Option<LocationRef>,
    pub location2: Option<LocationRef>,
    #[serde(default)]
    pub notes: Option<Vec<ShortfallNote>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationRef {
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShortfallNote {
    pub text: Option<String>,
}

impl Shortfall {
    /// Converts the wire record; `None` if its day or times are malformed.
    pub fn to_shift(&self) -> Option<ShiftRecord> {
        let date = NaiveDate::parse_from_str(self.day.trim(), "%Y-%m-%d").ok()?;
        let start = NaiveTime::parse_from_str(self.shift_start.trim(), "%H:%M").ok()?;
        let end = NaiveTime::parse_from_str(self.shift_end.trim(), "%H:%M").ok()?;

        let location = [&self.location4, &self.location2]
            .into_iter()
            .flatten()
            .filter_map(|loc| loc.description.as_deref())
            .map(str::trim)
            .filter(|desc| !desc.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let assigner_note = self
            .notes
            .as_ref()
            .and_then(|notes| notes.first())
            .and_then(|note| note.text.clone());

        Some(ShiftRecord {
            date,
            start,
            end,
            location,
            assigner_note,
        })
    }
}

impl RosterEnvelope {
    pub fn into_snapshot(self) -> RosterSnapshot {
        let records = self.roster.map(|r| r.shortfalls).unwrap_or_default();
        records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let shortfall = match serde_json::from_value::<Shortfall>(record) {
                    Ok(shortfall) => shortfall,
                    Err(e) => {
                        warn!("Skipping roster entry {}: {}", index, e);
                        return None;
                    }
                };
                let parsed = shortfall.to_shift();
                if parsed.is_none() {
                    warn!(
                        "Skipping roster entry with unreadable date/time: day={:?} start={:?} end={:?}",
                        shortfall.day, shortfall.shift_start, shortfall.shift_end
                    );
                }
                parsed
            })
            .collect()
    }
}

// --- Roster API Client ---

#[derive(Clone)]
pub struct RosterClient {
    http_client: Client,
    url: String,
    auth_token: String,
}

impl RosterClient {
    pub fn new(http_client: Client, url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            http_client,
            url: url.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Fetches the staff member's roster.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch(&self) -> Result<RosterSnapshot, RosterError> {
        let response = self
            .http_client
            .get(&self.url)
            .header(AUTHORIZATION, self.auth_token.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT_ENCODING, "gzip")
            .header(USER_AGENT, ROSTER_USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RosterError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        debug!("Roster response: {} bytes", bytes.len());
        let envelope: RosterEnvelope = serde_json::from_slice(&bytes)?;
        let snapshot = envelope.into_snapshot();
        info!("Fetched {} roster shifts", snapshot.len());
        Ok(snapshot)
    }
}
