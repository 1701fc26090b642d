// src/config.rs

use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::browser_portal::{PortalSelectors, PortalSettings, DEFAULT_LOGIN_URL, DEFAULT_TIMECARD_URL};
use crate::report_engine::DEFAULT_HOURS_CAP;
use crate::roster_client::DEFAULT_ROSTER_URL;
use crate::telegram::DEFAULT_TELEGRAM_API_URL;
use crate::timecard_client::RetryPolicy;

pub const CONFIG_FILE_NAME: &str = "config.env";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

fn default_roster_url() -> String {
    DEFAULT_ROSTER_URL.to_string()
}

fn default_login_url() -> String {
    DEFAULT_LOGIN_URL.to_string()
}

fn default_timecard_url() -> String {
    DEFAULT_TIMECARD_URL.to_string()
}

fn default_telegram_api_url() -> String {
    DEFAULT_TELEGRAM_API_URL.to_string()
}

fn default_retry_delay_secs() -> u64 {
    15
}

fn default_settle_delay_secs() -> u64 {
    3
}

fn default_login_timeout_secs() -> u64 {
    10
}

fn default_hours_timeout_secs() -> u64 {
    15
}

fn default_hours_cap() -> Decimal {
    DEFAULT_HOURS_CAP
}

/// Process configuration, read once at startup from the environment.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Chat bot
    pub bot_token: Option<String>,
    pub api_id: Option<String>,
    pub api_hash: Option<String>,
    pub chat_id: Option<i64>,
    #[serde(default = "default_telegram_api_url")]
    pub telegram_api_url: String,
    pub schedule_time: Option<String>,

    // Roster
    pub roster_auth_token: String,
    #[serde(default = "default_roster_url")]
    pub roster_url: String,

    // Timekeeping portal
    pub portal_username: String,
    pub portal_password: String,
    #[serde(default = "default_login_url")]
    pub portal_login_url: String,
    #[serde(default = "default_timecard_url")]
    pub portal_timecard_url: String,
    pub browser_executable: Option<PathBuf>,
    pub username_selector: Option<String>,
    pub password_selector: Option<String>,
    pub landmark_selector: Option<String>,
    pub hours_selector: Option<String>,
    pub reference_date_selector: Option<String>,
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,
    #[serde(default = "default_hours_timeout_secs")]
    pub hours_timeout_secs: u64,
    #[serde(default = "default_settle_delay_secs")]
    pub timecard_settle_delay_secs: u64,
    #[serde(default = "default_retry_delay_secs")]
    pub timecard_retry_delay_secs: u64,
    pub timecard_max_retries: Option<u32>,
    pub browser_session_limit: Option<usize>,

    // Report
    #[serde(default = "default_hours_cap")]
    pub hours_cap: Decimal,

    // Status server
    pub status_addr: Option<SocketAddr>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load config.env, then .env, if they exist
        dotenv::from_filename(CONFIG_FILE_NAME).ok();
        dotenv::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.validate()?;
        info!("Configuration loaded");
        Ok(config)
    }

    #[cfg(test)]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Result<Self, ConfigError> {
        let config = envy::from_iter::<_, Config>(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("ROSTER_URL", &self.roster_url),
            ("PORTAL_LOGIN_URL", &self.portal_login_url),
            ("PORTAL_TIMECARD_URL", &self.portal_timecard_url),
            ("TELEGRAM_API_URL", &self.telegram_api_url),
        ] {
            Url::parse(value).map_err(|e| ConfigError::Invalid {
                key,
                value: value.clone(),
                reason: e.to_string(),
            })?;
        }
        if self.hours_cap <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "HOURS_CAP",
                value: self.hours_cap.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let Some(raw) = &self.schedule_time {
            parse_schedule_time(raw)?;
        }
        Ok(())
    }

    /// Daily report time; required when running the bot.
    pub fn schedule_time(&self) -> Result<NaiveTime, ConfigError> {
        let raw = self
            .schedule_time
            .as_deref()
            .ok_or(ConfigError::Missing("SCHEDULE_TIME"))?;
        parse_schedule_time(raw)
    }

    pub fn bot_credentials(&self) -> Result<(String, i64), ConfigError> {
        let token = self
            .bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        let chat_id = self.chat_id.ok_or(ConfigError::Missing("CHAT_ID"))?;
        Ok((token, chat_id))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            delay: Duration::from_secs(self.timecard_retry_delay_secs),
            max_retries: self.timecard_max_retries,
        }
    }

    pub fn portal_settings(&self) -> PortalSettings {
        let defaults = PortalSelectors::default();
        let pick = |custom: &Option<String>, default: String| custom.clone().unwrap_or(default);
        PortalSettings {
            login_url: self.portal_login_url.clone(),
            timecard_url: self.portal_timecard_url.clone(),
            username: self.portal_username.clone(),
            password: self.portal_password.clone(),
            selectors: PortalSelectors {
                username: pick(&self.username_selector, defaults.username),
                password: pick(&self.password_selector, defaults.password),
                post_login_landmark: pick(&self.landmark_selector, defaults.post_login_landmark),
                cumulative_hours: pick(&self.hours_selector, defaults.cumulative_hours),
                reference_date: pick(&self.reference_date_selector, defaults.reference_date),
            },
            login_timeout: Duration::from_secs(self.login_timeout_secs),
            hours_timeout: Duration::from_secs(self.hours_timeout_secs),
            settle_delay: Duration::from_secs(self.timecard_settle_delay_secs),
            browser_executable: self.browser_executable.clone(),
        }
    }
}

/// "HH:MM", 24-hour clock.
pub fn parse_schedule_time(raw: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| ConfigError::Invalid {
        key: "SCHEDULE_TIME",
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
