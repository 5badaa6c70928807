//! Amica Channels - front ends for the Amica companion bot.
//!
//! - Telegram (long polling)
//! - CLI (interactive terminal)
//!
//! ## Architecture
//!
//! ```text
//! User → Channel::listen → processor → per-user lane → CompanionHandler
//!                                                          ↓
//! User ←──────────── Channel::send ←──────────────── SessionManager
//! ```
//!
//! Different users are served concurrently; messages from one user are
//! handled strictly in arrival order.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod cli;
pub mod handler;
pub mod message;
pub mod telegram;
pub mod traits;

pub use cli::CliChannel;
pub use handler::{Command, CompanionHandler};
pub use message::{ChannelMessage, ChannelType, OutgoingMessage, ReplyKeyboard};
pub use telegram::TelegramChannel;
pub use traits::{Channel, ChannelError, ChannelResult, MessageHandler};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle one message and deliver the reply, logging failures.
async fn process<C: Channel>(channel: &C, handler: &dyn MessageHandler, message: ChannelMessage) {
    let trace_id = message.trace_id.clone();
    match handler.handle(message).await {
        Ok(Some(reply)) => {
            if let Err(e) = channel.send(reply).await {
                tracing::error!(trace_id = %trace_id, channel = channel.name(), error = %e, "Failed to send reply");
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Failed to process message");
        }
    }
}

/// How long a user's lane waits for another message before it shuts down.
pub const LANE_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

struct Lane {
    tx: mpsc::UnboundedSender<ChannelMessage>,
    task: JoinHandle<()>,
}

impl Lane {
    fn is_done(&self) -> bool {
        self.tx.is_closed() && self.task.is_finished()
    }
}

/// Spawn a lane that handles one user's messages in order. It starts only
/// after `previous` (the lane it replaces) has finished, and closes itself
/// after `idle` without messages.
fn spawn_lane<C: Channel + 'static>(
    channel: Arc<C>,
    handler: Arc<dyn MessageHandler>,
    idle: Duration,
    previous: Option<JoinHandle<()>>,
) -> Lane {
    let (tx, mut rx) = mpsc::unbounded_channel::<ChannelMessage>();
    let task = tokio::spawn(async move {
        if let Some(previous) = previous {
            let _ = previous.await;
        }
        loop {
            match tokio::time::timeout(idle, rx.recv()).await {
                Ok(Some(message)) => process(channel.as_ref(), handler.as_ref(), message).await,
                Ok(None) => break,
                Err(_) => {
                    // Refuse new messages, then finish what was already queued.
                    rx.close();
                    while let Ok(message) = rx.try_recv() {
                        process(channel.as_ref(), handler.as_ref(), message).await;
                    }
                    break;
                }
            }
        }
    });
    Lane { tx, task }
}

/// Dispatch incoming messages to one ordered lane per user.
///
/// The returned task finishes once `rx` is closed and every lane has drained.
pub fn spawn_processor<C: Channel + 'static>(
    channel: Arc<C>,
    handler: Arc<dyn MessageHandler>,
    rx: mpsc::UnboundedReceiver<ChannelMessage>,
) -> JoinHandle<()> {
    spawn_processor_with_idle(channel, handler, rx, LANE_IDLE_TIMEOUT)
}

/// [`spawn_processor`] with a custom lane idle timeout.
pub fn spawn_processor_with_idle<C: Channel + 'static>(
    channel: Arc<C>,
    handler: Arc<dyn MessageHandler>,
    mut rx: mpsc::UnboundedReceiver<ChannelMessage>,
    idle: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(channel = channel.name(), "Message processor started");
        let mut lanes: HashMap<String, Lane> = HashMap::new();
        let mut sweep = tokio::time::interval(idle);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                received = rx.recv() => {
                    let Some(message) = received else { break };
                    let message = match lanes.get(&message.user_id) {
                        Some(lane) => match lane.tx.send(message) {
                            Ok(()) => continue,
                            Err(mpsc::error::SendError(message)) => message,
                        },
                        None => message,
                    };

                    let user_id = message.user_id.clone();
                    let previous = lanes.remove(&user_id).map(|lane| lane.task);
                    let lane = spawn_lane(channel.clone(), handler.clone(), idle, previous);
                    let _ = lane.tx.send(message);
                    lanes.insert(user_id, lane);
                }
                _ = sweep.tick() => {
                    let before = lanes.len();
                    lanes.retain(|_, lane| !lane.is_done());
                    if lanes.len() < before {
                        tracing::debug!(
                            channel = channel.name(),
                            reclaimed = before - lanes.len(),
                            active = lanes.len(),
                            "Reclaimed idle lanes"
                        );
                    }
                }
            }
        }

        for (_, lane) in lanes.drain() {
            drop(lane.tx);
            let _ = lane.task.await;
        }
        tracing::info!(channel = channel.name(), "Message processor stopped");
    })
}

/// Listen on `channel` until it closes, answering every message with
/// `handler`. Pending replies are delivered before this returns.
pub async fn run<C: Channel + 'static>(
    channel: Arc<C>,
    handler: Arc<dyn MessageHandler>,
) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let processor = spawn_processor(channel.clone(), handler, rx);

    channel
        .listen(move |message| {
            if tx.send(message).is_err() {
                tracing::warn!("Message processor is gone; dropping message");
            }
        })
        .await?;

    processor.await?;
    channel.shutdown().await?;
    Ok(())
}
