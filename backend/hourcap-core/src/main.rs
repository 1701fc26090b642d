// src/main.rs
use anyhow::Context;
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod browser_portal;
mod clock;
mod config;
mod context;
mod dispatcher;
mod report_engine;
mod report_engine_tests;
mod roster_client;
mod shift;
mod status_server;
mod telegram;
mod timecard_client;

#[cfg(test)]
mod test_support;

use clock::{Clock, FixedClock, SystemClock};
use config::{Config, ConfigError};
use context::AppContext;
use dispatcher::Dispatcher;
use report_engine::ReportError;
use telegram::{ChatError, ReportSink};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Report generation failed: {0}")]
    Report(#[from] ReportError),
    #[error("Chat delivery failed: {0}")]
    Chat(#[from] ChatError),
    #[error("Status server error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Parser, Debug)]
#[command(
    name = "hourcap",
    version,
    about = "Reports how many hours you can still book this fortnight"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send the daily report and answer /check in the configured chat
    Run,
    /// Generate one report now and print it
    Check {
        /// Deliver to the configured chat instead of printing
        #[arg(long)]
        send: bool,
        /// Evaluate as of this local time ("YYYY-MM-DD HH:MM")
        #[arg(long, value_parser = parse_as_of)]
        at: Option<NaiveDateTime>,
    },
}

fn parse_as_of(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M").map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("loading configuration")?;
    if config.api_id.is_some() || config.api_hash.is_some() {
        info!("API id/hash configured; the Bot API transport only needs BOT_TOKEN");
    }

    match cli.command {
        Command::Run => run_bot(&config).await.context("running report bot")?,
        Command::Check { send, at } => {
            let clock: Arc<dyn Clock> = match at {
                Some(now) => Arc::new(FixedClock::new(now)),
                None => Arc::new(SystemClock),
            };
            check_once(&config, clock, send)
                .await
                .context("generating report")?
        }
    }
    Ok(())
}

async fn run_bot(config: &Config) -> Result<(), AppError> {
    let schedule_time = config.schedule_time()?;
    let ctx = Arc::new(AppContext::build(config, Arc::new(SystemClock))?);
    let bot = ctx.bot.clone().ok_or(ConfigError::Missing("BOT_TOKEN / CHAT_ID"))?;
    info!("Application context initialized.");

    if let Some(addr) = config.status_addr {
        let server_ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = status_server::serve(addr, server_ctx).await {
                error!("Status server stopped: {}", e);
            }
        });
    }

    Dispatcher::new(ctx.engine.clone(), bot, schedule_time)
        .run()
        .await;
    warn!("Dispatcher exited");
    Ok(())
}

async fn check_once(config: &Config, clock: Arc<dyn Clock>, send: bool) -> Result<(), AppError> {
    let ctx = AppContext::build(config, clock)?;
    let report = ctx.engine.generate().await?;

    if send {
        let bot = ctx.bot.ok_or(ConfigError::Missing("BOT_TOKEN / CHAT_ID"))?;
        bot.deliver(&report).await?;
    } else {
        println!("{}", report);
    }
    Ok(())
}
