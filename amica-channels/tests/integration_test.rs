//! Integration tests for Amica Channels.
//!
//! Drives the full path channel → processor → handler → session manager
//! with a scripted channel and a stub generation backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amica_channels::handler::{
    CLEAR_REPLY, INFERENCE_FAILED_REPLY, NOT_STARTED_REPLY, START_REPLY,
};
use amica_channels::{
    run, spawn_processor_with_idle, Channel, ChannelMessage, ChannelResult, ChannelType, CompanionHandler, MessageHandler,
    OutgoingMessage, ReplyKeyboard,
};
use amica_core::generation::{GenerationError, GenerationParams, GenerationWorker, Generator};
use amica_core::{MemorySessionStore, SessionManager};
use async_trait::async_trait;
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Replies "reply N" for the N-th call, or fails when the user says "fail".
struct CountingFriend {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for CountingFriend {
    fn name(&self) -> &str {
        "counting-friend"
    }

    async fn generate(
        &self,
        prompt: &str,
        _params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        if prompt.ends_with("User: fail [/INST]") {
            return Err(GenerationError::Empty {
                backend: "counting-friend",
            });
        }
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{prompt} Friend: reply {n} </s><s>[INST]"))
    }
}

/// Emits a fixed script of messages, then closes; records what is sent.
struct ScriptedChannel {
    script: Vec<(String, String)>,
    sent: Mutex<Vec<OutgoingMessage>>,
}

impl ScriptedChannel {
    fn new(script: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            script: script
                .iter()
                .map(|(user, text)| (user.to_string(), text.to_string()))
                .collect(),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sent_to(&self, chat: &str) -> Vec<OutgoingMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.channel_id == chat)
            .cloned()
            .collect()
    }
}

fn incoming(user: &str, text: &str, seq: usize) -> ChannelMessage {
    ChannelMessage {
        id: seq.to_string(),
        channel_type: ChannelType::Telegram,
        channel_id: format!("chat-{user}"),
        user_id: user.to_string(),
        text: text.to_string(),
        timestamp: 0,
        trace_id: format!("trace-{seq}"),
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        self.sent.lock().unwrap().push(message);
        Ok("sent".into())
    }

    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        for (seq, (user, text)) in self.script.iter().enumerate() {
            callback(incoming(user, text, seq));
        }
        Ok(())
    }

    async fn health_check(&self) -> ChannelResult<()> {
        Ok(())
    }

    async fn shutdown(&self) -> ChannelResult<()> {
        Ok(())
    }
}

fn handler() -> Arc<CompanionHandler> {
    let generator = Arc::new(CountingFriend {
        calls: AtomicUsize::new(0),
    });
    let (generation, _worker) = GenerationWorker::spawn(generator, 16, Duration::from_secs(5));
    let manager = SessionManager::new(Arc::new(MemorySessionStore::new()), generation);
    Arc::new(CompanionHandler::new(Arc::new(manager)))
}

fn texts(messages: &[OutgoingMessage]) -> Vec<&str> {
    messages.iter().map(|m| m.text.as_str()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Handler
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn start_replies_with_greeting_and_start_keyboard() {
    let handler = handler();
    let reply = handler
        .handle(incoming("1", "/start", 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.text, START_REPLY);
    assert_eq!(reply.keyboard, Some(ReplyKeyboard::start_only()));
    assert_eq!(reply.reply_to.as_deref(), Some("0"));
}

#[tokio::test]
async fn text_before_start_asks_to_start() {
    let handler = handler();
    let reply = handler
        .handle(incoming("1", "hello?", 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.text, NOT_STARTED_REPLY);
    assert_eq!(reply.keyboard, Some(ReplyKeyboard::start_only()));
}

#[tokio::test]
async fn text_gets_model_reply_with_conversation_keyboard() {
    let handler = handler();
    handler.handle(incoming("1", "/start", 0)).await.unwrap();

    let reply = handler
        .handle(incoming("1", "hi", 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.text, "reply 1");
    assert_eq!(reply.keyboard, Some(ReplyKeyboard::conversation()));
}

#[tokio::test]
async fn generation_failure_gets_apology() {
    let handler = handler();
    handler.handle(incoming("1", "/start", 0)).await.unwrap();

    let reply = handler
        .handle(incoming("1", "fail", 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.text, INFERENCE_FAILED_REPLY);

    let reply = handler
        .handle(incoming("1", "ok now?", 2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.text, "reply 1");
}

#[tokio::test]
async fn unknown_commands_and_blank_text_are_ignored() {
    let handler = handler();
    handler.handle(incoming("1", "/start", 0)).await.unwrap();
    assert!(handler.handle(incoming("1", "/help", 1)).await.unwrap().is_none());
    assert!(handler.handle(incoming("1", "   ", 2)).await.unwrap().is_none());
}

#[tokio::test]
async fn clear_without_session_asks_to_start() {
    let handler = handler();
    let reply = handler
        .handle(incoming("1", "/clear", 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.text, NOT_STARTED_REPLY);
}

// ─────────────────────────────────────────────────────────────────────────────
// Full run loop
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn run_answers_every_message_in_order() {
    let channel = ScriptedChannel::new(&[
        ("alice", "/start"),
        ("alice", "hi"),
        ("alice", "how are you?"),
        ("alice", "/clear"),
        ("alice", "again"),
    ]);

    run(channel.clone(), handler()).await.unwrap();

    let sent = channel.sent_to("chat-alice");
    assert_eq!(
        texts(&sent),
        vec![START_REPLY, "reply 1", "reply 2", CLEAR_REPLY, "reply 3"]
    );
    assert!(sent[3].keyboard.is_none());
}

#[tokio::test]
async fn run_keeps_users_apart() {
    let channel = ScriptedChannel::new(&[
        ("alice", "/start"),
        ("bob", "hi"),
        ("alice", "hi"),
        ("bob", "/start"),
        ("bob", "hi again"),
    ]);

    run(channel.clone(), handler()).await.unwrap();

    let alice = channel.sent_to("chat-alice");
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].text, START_REPLY);
    assert!(alice[1].text.starts_with("reply "));

    let bob = channel.sent_to("chat-bob");
    assert_eq!(bob.len(), 3);
    assert_eq!(bob[0].text, NOT_STARTED_REPLY);
    assert_eq!(bob[1].text, START_REPLY);
    assert!(bob[2].text.starts_with("reply "));
}

#[tokio::test(start_paused = true)]
async fn idle_lanes_are_reclaimed_and_restarted() {
    let channel = ScriptedChannel::new(&[]);
    let (tx, rx) = mpsc::unbounded_channel();
    let processor =
        spawn_processor_with_idle(channel.clone(), handler(), rx, Duration::from_secs(60));

    tx.send(incoming("alice", "/start", 0)).unwrap();
    tx.send(incoming("bob", "/start", 1)).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(channel.sent_to("chat-alice").len(), 1);
    assert_eq!(channel.sent_to("chat-bob").len(), 1);
    // This test, the processor and one lane per user.
    assert_eq!(Arc::strong_count(&channel), 4);

    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(Arc::strong_count(&channel), 2);

    tx.send(incoming("alice", "hi", 2)).unwrap();
    drop(tx);
    processor.await.unwrap();

    assert_eq!(
        texts(&channel.sent_to("chat-alice")),
        vec![START_REPLY, "reply 1"]
    );
    assert_eq!(Arc::strong_count(&channel), 1);
}
