//! Telegram channel adapter.
//!
//! Long-polls the Bot API for text messages and replies with plain text and a
//! reply keyboard of bot commands.

use std::time::Duration;

use amica_common::config::TelegramConfig;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage, ReplyKeyboard};
use crate::traits::{Channel, ChannelError, ChannelResult};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram's per-message text limit, in characters.
pub const MAX_MESSAGE_LEN: usize = 4096;

const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel - long-polls the Bot API for updates.
pub struct TelegramChannel {
    bot_token: String,
    allowed_users: Vec<String>,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: String, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            api_base: TELEGRAM_API.to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 15))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    pub fn from_config(config: &TelegramConfig) -> ChannelResult<Self> {
        if !config.enabled {
            return Err(ChannelError::Disabled("telegram.enabled is false"));
        }
        let token = config
            .bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ChannelError::Auth("no bot token (set BOT_TOKEN)".into()))?;
        Ok(Self::new(token, config.allowed_users.clone()))
    }

    /// Point at a different Bot API server (local Bot API, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn is_user_allowed(&self, identity: &str) -> bool {
        self.allowed_users.iter().any(|u| u == "*" || u == identity)
    }

    fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        identities.into_iter().any(|id| self.is_user_allowed(id))
    }

    /// Turn one `getUpdates` entry into a message.
    ///
    /// Only text messages from allowed users with a numeric sender id pass;
    /// the sender id becomes the session identity.
    pub fn parse_update(&self, update: &Value) -> Option<ChannelMessage> {
        let message = update.get("message")?;
        let text = message.get("text").and_then(Value::as_str)?;
        let user_id = message
            .get("from")
            .and_then(|f| f.get("id"))
            .and_then(Value::as_i64)?
            .to_string();
        let chat_id = message
            .get("chat")
            .and_then(|c| c.get("id"))
            .and_then(Value::as_i64)?
            .to_string();
        let username = message
            .get("from")
            .and_then(|f| f.get("username"))
            .and_then(Value::as_str);

        let identities = [Some(user_id.as_str()), username];
        if !self.is_any_user_allowed(identities.into_iter().flatten()) {
            tracing::warn!(
                user_id = %user_id,
                username = username.unwrap_or("unknown"),
                "Telegram: ignoring message from unauthorized user"
            );
            return None;
        }

        let id = message
            .get("message_id")
            .and_then(Value::as_i64)
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), |id| id.to_string());
        let timestamp = message
            .get("date")
            .and_then(Value::as_i64)
            .map_or(0, |secs| secs * 1000);

        Some(ChannelMessage {
            id,
            channel_type: ChannelType::Telegram,
            channel_id: chat_id,
            user_id,
            text: text.to_string(),
            timestamp,
            trace_id: amica_common::logging::generate_trace_id(),
        })
    }

    async fn send_chunk(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&ReplyKeyboard>,
    ) -> anyhow::Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = keyboard_markup(keyboard);
        }

        let resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Telegram sendMessage failed: {error_text}");
        }
        Ok(())
    }

    async fn poll_updates(&self, offset: i64) -> anyhow::Result<Vec<Value>> {
        let body = json!({
            "offset": offset,
            "timeout": POLL_TIMEOUT_SECS,
            "allowed_updates": ["message"],
        });

        let data: Value = self
            .client
            .post(self.api_url("getUpdates"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if data.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = data
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("getUpdates rejected: {description}");
        }

        Ok(data
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

/// `reply_markup` for a reply keyboard.
pub fn keyboard_markup(keyboard: &ReplyKeyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| row.iter().map(|button| json!({ "text": button })).collect())
        .collect();
    json!({
        "keyboard": rows,
        "resize_keyboard": true,
    })
}

/// Split a message into chunks of at most `max_chars` characters,
/// preferring paragraph, line, sentence and word boundaries.
pub fn split_message(message: &str, max_chars: usize) -> Vec<String> {
    if message.chars().count() <= max_chars {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;

    while !remaining.is_empty() {
        let Some((limit, _)) = remaining.char_indices().nth(max_chars) else {
            chunks.push(remaining.to_string());
            break;
        };

        let window = &remaining[..limit];
        let split = window
            .rfind("\n\n")
            .or_else(|| window.rfind('\n'))
            .or_else(|| window.rfind(". ").map(|i| i + 1))
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(limit);

        let chunk = remaining[..split].trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        remaining = remaining[split..].trim_start();
    }

    chunks
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        // Verify bot token by calling getMe
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let err = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Auth(format!("Invalid bot token: {err}")));
        }

        tracing::info!("Telegram channel initialized");
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let chunks = split_message(&message.text, MAX_MESSAGE_LEN);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let keyboard = if i == last {
                message.keyboard.as_ref()
            } else {
                None
            };
            self.send_chunk(&message.channel_id, chunk, keyboard)
                .await
                .map_err(|e| ChannelError::SendFailed(e.to_string()))?;
        }

        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        let mut offset: i64 = 0;

        tracing::info!("Telegram channel listening for messages...");

        loop {
            let updates = match self.poll_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!("Telegram poll error: {e}");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in &updates {
                if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                    offset = uid + 1;
                }

                let Some(msg) = self.parse_update(update) else {
                    continue;
                };

                tracing::info!(
                    trace_id = %msg.trace_id,
                    channel = "telegram",
                    user_id = %msg.user_id,
                    chat_id = %msg.channel_id,
                    "Telegram message received"
                );
                callback(msg);
            }
        }
    }

    async fn health_check(&self) -> ChannelResult<()> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::NotReady)
        }
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}
