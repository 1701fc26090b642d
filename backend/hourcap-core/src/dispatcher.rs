// src/dispatcher.rs

use chrono::{Days, NaiveDateTime, NaiveTime};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::report_engine::ReportEngine;
use crate::telegram::{is_check_command, ReportSink, TelegramBot};

const POLL_TIMEOUT_SECS: u64 = 30;
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Next instant at `at` strictly after `now` (today if still ahead, else tomorrow).
pub fn next_run_after(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today_run = now.date().and_time(at);
    if today_run > now {
        today_run
    } else {
        now.date()
            .checked_add_days(Days::new(1))
            .unwrap_or(now.date())
            .and_time(at)
    }
}

/// Generates one report and hands it to `sink`. Failures are logged; the
/// caller's loop carries on with the next trigger.
pub async fn deliver_report(engine: &ReportEngine, sink: &dyn ReportSink, trigger: &str) -> bool {
    info!("Generating report ({})", trigger);
    let report = match engine.generate().await {
        Ok(report) => report,
        Err(e) => {
            error!("Report generation failed ({}): {}", trigger, e);
            return false;
        }
    };
    match sink.deliver(&report).await {
        Ok(()) => {
            info!("Report delivered ({})", trigger);
            true
        }
        Err(e) => {
            error!("Report delivery failed ({}): {}", trigger, e);
            false
        }
    }
}

pub struct Dispatcher {
    engine: Arc<ReportEngine>,
    bot: Arc<TelegramBot>,
    schedule_time: NaiveTime,
}

impl Dispatcher {
    pub fn new(engine: Arc<ReportEngine>, bot: Arc<TelegramBot>, schedule_time: NaiveTime) -> Self {
        Self {
            engine,
            bot,
            schedule_time,
        }
    }

    /// Runs the daily timer and the command listener until either stops.
    pub async fn run(self) {
        let scheduled = tokio::spawn(run_daily_schedule(
            self.engine.clone(),
            self.bot.clone(),
            self.schedule_time,
        ));
        let commands = tokio::spawn(run_command_listener(self.engine, self.bot));

        tokio::select! {
            res = scheduled => warn!("Daily scheduler stopped: {:?}", res),
            res = commands => warn!("Command listener stopped: {:?}", res),
        }
    }
}

pub async fn run_daily_schedule(engine: Arc<ReportEngine>, bot: Arc<TelegramBot>, at: NaiveTime) {
    info!("Daily report scheduled at {}", at.format("%H:%M"));
    loop {
        let now = engine.clock().now();
        let next = next_run_after(now, at);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!("Next scheduled report at {} (in {:?})", next, wait);
        sleep(wait).await;

        deliver_report(&engine, bot.as_ref(), "scheduled").await;
    }
}

/// Offset just past the updates that queued up while the bot was offline,
/// so stale `/check` requests are not answered on startup.
pub async fn skip_backlog(bot: &TelegramBot) -> i64 {
    match bot.get_updates(-1, 0).await {
        Ok(updates) => {
            let offset = updates
                .iter()
                .map(|update| update.update_id + 1)
                .max()
                .unwrap_or(0);
            if offset > 0 {
                info!("Skipping command backlog up to update {}", offset - 1);
            }
            offset
        }
        Err(e) => {
            warn!("Could not skip command backlog: {}", e);
            0
        }
    }
}

/// Answers `/check` from the configured chat. Each request runs as its own
/// task so a slow portal session does not hold up polling.
pub async fn run_command_listener(engine: Arc<ReportEngine>, bot: Arc<TelegramBot>) {
    info!("Listening for {} commands", crate::telegram::CHECK_COMMAND);
    let mut offset = skip_backlog(&bot).await;
    loop {
        let updates = match bot.get_updates(offset, POLL_TIMEOUT_SECS).await {
            Ok(updates) => updates,
            Err(e) => {
                warn!("Polling for commands failed: {}", e);
                sleep(POLL_ERROR_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id != bot.chat_id() {
                debug!("Ignoring message from chat {}", message.chat.id);
                continue;
            }
            if !message.text.as_deref().is_some_and(is_check_command) {
                continue;
            }

            let engine = engine.clone();
            let bot = bot.clone();
            tokio::spawn(async move {
                deliver_report(&engine, bot.as_ref(), "check command").await;
            });
        }
    }
}
