//! Maps chat commands and free text onto the session manager.
//!
//! `/start` opens a conversation, `/clear` starts it over and anything else
//! is a message for the model. Manager errors become friendly replies; they
//! never stop the channel.

use std::sync::Arc;

use amica_common::util::truncate_with_ellipsis;
use amica_core::{SessionError, SessionManager};
use async_trait::async_trait;

use crate::message::{ChannelMessage, OutgoingMessage, ReplyKeyboard};
use crate::traits::{ChannelResult, MessageHandler};

pub const START_REPLY: &str = "I'm your AI-Friend. Let's have a chat!";
pub const CLEAR_REPLY: &str = "Conversation history is clear now. Feel free to start a new one!";
pub const NOT_STARTED_REPLY: &str = "Please press /start to begin our chat.";
pub const INFERENCE_FAILED_REPLY: &str = "Sorry, I couldn't think of a reply. Please try again.";
pub const GENERIC_ERROR_REPLY: &str = "Sorry, something went wrong on my side. Please try again later.";

/// A parsed incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<'a> {
    Start,
    Clear,
    /// Some other `/command`; ignored.
    Unknown(&'a str),
    Text(&'a str),
}

impl<'a> Command<'a> {
    /// Telegram may suffix commands with the bot name (`/start@amica_bot`).
    pub fn parse(text: &'a str) -> Self {
        let trimmed = text.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Self::Text(trimmed);
        };

        let word = rest.split_whitespace().next().unwrap_or("");
        let name = word.split('@').next().unwrap_or(word);
        match name {
            "start" => Self::Start,
            "clear" => Self::Clear,
            _ => Self::Unknown(word),
        }
    }
}

pub struct CompanionHandler {
    manager: Arc<SessionManager>,
}

impl CompanionHandler {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }

    fn error_reply(message: &ChannelMessage, err: &SessionError) -> OutgoingMessage {
        match err {
            SessionError::NotInitialized { .. } => OutgoingMessage::reply(message, NOT_STARTED_REPLY)
                .with_keyboard(ReplyKeyboard::start_only()),
            SessionError::InferenceFailure { .. } => {
                OutgoingMessage::reply(message, INFERENCE_FAILED_REPLY)
                    .with_keyboard(ReplyKeyboard::conversation())
            }
            SessionError::Store { .. } => OutgoingMessage::reply(message, GENERIC_ERROR_REPLY),
        }
    }
}

#[async_trait]
impl MessageHandler for CompanionHandler {
    async fn handle(&self, message: ChannelMessage) -> ChannelResult<Option<OutgoingMessage>> {
        let identity = message.user_id.as_str();
        tracing::debug!(
            trace_id = %message.trace_id,
            identity,
            text = %truncate_with_ellipsis(message.text(), 80),
            "Message received"
        );

        let result = match Command::parse(message.text()) {
            Command::Start => self.manager.initialize(identity).await.map(|_| {
                OutgoingMessage::reply(&message, START_REPLY)
                    .with_keyboard(ReplyKeyboard::start_only())
            }),
            Command::Clear => self
                .manager
                .reset(identity)
                .await
                .map(|()| OutgoingMessage::reply(&message, CLEAR_REPLY)),
            Command::Unknown(command) => {
                tracing::debug!(identity, command, "Ignoring unknown command");
                return Ok(None);
            }
            Command::Text("") => return Ok(None),
            Command::Text(text) => self.manager.respond(identity, text).await.map(|reply| {
                OutgoingMessage::reply(&message, reply).with_keyboard(ReplyKeyboard::conversation())
            }),
        };

        match result {
            Ok(reply) => Ok(Some(reply)),
            Err(e) => {
                tracing::warn!(
                    trace_id = %message.trace_id,
                    identity,
                    channel = message.channel_type_str(),
                    kind = e.kind(),
                    error = %e,
                    "Request failed"
                );
                Ok(Some(Self::error_reply(&message, &e)))
            }
        }
    }
}
