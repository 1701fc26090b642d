// src/telegram.rs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const CHECK_COMMAND: &str = "/check";

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Telegram API error: {status} - {description}")]
    Api { status: u16, description: String },
}

/// Where finished reports go.
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), ChatError>;
}

// --- Telegram Bot API types ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: Vec<&'static str>,
}

/// True for "/check" and "/check@SomeBot", optionally followed by arguments.
pub fn is_check_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or_default();
    let name = command.split('@').next().unwrap_or_default();
    name.eq_ignore_ascii_case(CHECK_COMMAND)
}

// --- Telegram Bot ---

#[derive(Clone)]
pub struct TelegramBot {
    http_client: Client,
    api_url: String,
    token: String,
    chat_id: i64,
}

impl TelegramBot {
    pub fn new(http_client: Client, api_url: &str, token: String, chat_id: i64) -> Self {
        Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            token,
            chat_id,
        }
    }

    pub fn chat_id(&self) -> i64 {
        self.chat_id
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    async fn call<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, ChatError> {
        let mut request = self.http_client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request.send().await?;
        let status = response.status();
        let parsed: ApiResponse<T> = response.json().await?;

        match parsed {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            other => Err(ChatError::Api {
                status: status.as_u16(),
                description: other
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            }),
        }
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ChatError> {
        let body = SendMessageRequest {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let _: Message = self.call("sendMessage", &body, None).await?;
        info!("Message sent to chat {}", chat_id);
        Ok(())
    }

    /// Long-polls for updates newer than `offset`.
    pub async fn get_updates(&self, offset: i64, poll_secs: u64) -> Result<Vec<Update>, ChatError> {
        let body = GetUpdatesRequest {
            offset,
            timeout: poll_secs,
            allowed_updates: vec!["message"],
        };
        // The HTTP timeout must outlast the server-side long poll
        let updates: Vec<Update> = self
            .call("getUpdates", &body, Some(Duration::from_secs(poll_secs + 10)))
            .await?;
        debug!("Received {} updates", updates.len());
        Ok(updates)
    }
}

#[async_trait]
impl ReportSink for TelegramBot {
    async fn deliver(&self, text: &str) -> Result<(), ChatError> {
        self.send_message(self.chat_id, text).await
    }
}
