//! Terminal channel for chatting with the bot from a shell.
//!
//! Every line typed is one message from the fixed identity `local`. The
//! conversation is opened with an implicit `/start`; `/quit` or `/exit` ends
//! the session.

use crate::message::{ChannelMessage, ChannelType, OutgoingMessage};
use crate::traits::{Channel, ChannelResult};
use async_trait::async_trait;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Session identity used for the terminal.
pub const LOCAL_IDENTITY: &str = "local";

/// CLI channel - stdin/stdout, always available.
pub struct CliChannel;

impl CliChannel {
    pub const fn new() -> Self {
        Self
    }

    fn message(text: String) -> ChannelMessage {
        ChannelMessage {
            id: uuid::Uuid::new_v4().to_string(),
            channel_type: ChannelType::Cli,
            channel_id: "cli".to_string(),
            user_id: LOCAL_IDENTITY.to_string(),
            text,
            timestamp: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as i64,
            trace_id: amica_common::logging::generate_trace_id(),
        }
    }

    /// Text shown for a reply, keyboard buttons appended as hints.
    pub fn render(message: &OutgoingMessage) -> String {
        match &message.keyboard {
            Some(keyboard) => {
                let hints: Vec<&str> = keyboard.buttons().collect();
                format!("Friend: {}\n  [{}]", message.text, hints.join("] ["))
            }
            None => format!("Friend: {}", message.text),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a line ends the terminal session.
pub fn is_exit(line: &str) -> bool {
    matches!(line, "/quit" | "/exit")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &'static str {
        "cli"
    }

    async fn init(&mut self) -> ChannelResult<()> {
        Ok(())
    }

    async fn send(&self, message: OutgoingMessage) -> ChannelResult<String> {
        let mut stdout = io::stdout();
        let line = format!("{}\n", Self::render(&message));
        // A closed stdout only loses output; the conversation goes on.
        let _ = stdout.write_all(line.as_bytes()).await;
        let _ = stdout.flush().await;
        Ok(uuid::Uuid::new_v4().to_string())
    }

    async fn listen<F>(&self, callback: F) -> ChannelResult<()>
    where
        F: Fn(ChannelMessage) + Send + Sync + 'static,
    {
        callback(Self::message("/start".to_string()));

        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            if is_exit(&line) {
                break;
            }

            callback(Self::message(line));
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
