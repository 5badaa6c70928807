//! Channel traits for implementing channel adapters.

use crate::message::{ChannelMessage, OutgoingMessage};
use async_trait::async_trait;

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Message send failed: {0}")]
    SendFailed(String),

    #[error("Channel not ready")]
    NotReady,

    #[error("Channel disabled in configuration: {0}")]
    Disabled(&'static str),
}

/// A transport users talk to the bot through.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Connect and authenticate.
    async fn init(&mut self) -> ChannelResult<()>;

    /// Deliver a reply. Returns a channel-side message id.
    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String>;

    /// Receive messages until the transport closes, handing each to
    /// `callback`.
    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static;

    async fn health_check(&self) -> ChannelResult<()>;

    async fn shutdown(&self) -> ChannelResult<()>;
}

/// Turns an incoming message into an optional reply.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: ChannelMessage) -> ChannelResult<Option<OutgoingMessage>>;
}
