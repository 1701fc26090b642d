// src/context.rs

use chrono::{NaiveDateTime, NaiveTime};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::browser_portal::BrowserPortal;
use crate::clock::Clock;
use crate::config::{Config, ConfigError};
use crate::report_engine::ReportEngine;
use crate::roster_client::RosterClient;
use crate::telegram::TelegramBot;
use crate::timecard_client::TimecardClient;

/// Everything a report generation needs, built once at startup and shared
/// read-only between the scheduler, the command listener and the status server.
pub struct AppContext {
    pub engine: Arc<ReportEngine>,
    pub bot: Option<Arc<TelegramBot>>,
    pub schedule_time: Option<NaiveTime>,
    pub started_at: NaiveDateTime,
}

impl AppContext {
    pub fn build(config: &Config, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        let roster = RosterClient::new(
            http_client.clone(),
            config.roster_url.clone(),
            config.roster_auth_token.clone(),
        );

        let portal = Arc::new(BrowserPortal::new(config.portal_settings()));
        let mut timecard = TimecardClient::new(portal, config.retry_policy());
        if let Some(limit) = config.browser_session_limit {
            info!("Browser sessions limited to {} at a time", limit);
            timecard = timecard.with_session_limit(limit);
        }

        let bot = match config.bot_credentials() {
            Ok((token, chat_id)) => Some(Arc::new(TelegramBot::new(
                http_client,
                &config.telegram_api_url,
                token,
                chat_id,
            ))),
            Err(_) => None,
        };

        let started_at = clock.now();
        let engine = Arc::new(ReportEngine::new(timecard, roster, clock, config.hours_cap));

        Ok(Self {
            engine,
            bot,
            schedule_time: config.schedule_time().ok(),
            started_at,
        })
    }
}
