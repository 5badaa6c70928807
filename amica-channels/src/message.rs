//! Message types shared by the channels and the handler.

use serde::{Deserialize, Serialize};

/// Channel type enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Telegram,
    Cli,
}

impl ChannelType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Telegram => "telegram",
            Self::Cli => "cli",
        }
    }
}

/// An incoming text message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (channel-specific)
    pub id: String,
    pub channel_type: ChannelType,
    /// Where replies go (Telegram chat id, `cli`)
    pub channel_id: String,
    /// Sender identity; keys the conversation session
    pub user_id: String,
    pub text: String,
    /// Unix millis
    pub timestamp: i64,
    pub trace_id: String,
}

impl ChannelMessage {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn channel_type_str(&self) -> &'static str {
        self.channel_type.as_str()
    }
}

/// Reply keyboard offered under a message: rows of command buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
}

impl ReplyKeyboard {
    pub fn single_row<I, S>(buttons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rows: vec![buttons.into_iter().map(Into::into).collect()],
        }
    }

    /// Shown before a conversation has started.
    pub fn start_only() -> Self {
        Self::single_row(["/start"])
    }

    /// Shown during a conversation.
    pub fn conversation() -> Self {
        Self::single_row(["/start", "/clear"])
    }

    pub fn buttons(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().flatten().map(String::as_str)
    }
}

/// Outgoing text reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub channel_type: ChannelType,
    pub channel_id: String,
    /// Reply to message ID (optional)
    pub reply_to: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyboard: Option<ReplyKeyboard>,
}

impl OutgoingMessage {
    /// Reply to `message` on the channel it came from.
    pub fn reply(message: &ChannelMessage, text: impl Into<String>) -> Self {
        Self {
            channel_type: message.channel_type,
            channel_id: message.channel_id.clone(),
            reply_to: Some(message.id.clone()),
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: ReplyKeyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}
