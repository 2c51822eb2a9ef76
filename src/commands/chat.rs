//! Interactive chat session handler.
//!
//! Opens one conversation through the [`SyncCoordinator`], prints its
//! history, and then multiplexes three streams until the user quits:
//! lines typed at the prompt, store change notifications, and session state
//! transitions. Input is read on a dedicated thread because `rustyline`
//! blocks.
//!
//! Session commands:
//!
//! - `/retry`  - re-send every message that failed
//! - `/typing` - toggle the typing indicator
//! - `/help`   - list commands
//! - `/quit`   - leave (also Ctrl-C / Ctrl-D)

use std::collections::HashMap;
use std::sync::Arc;

use colored::{Color, Colorize};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::sync::{broadcast, mpsc};

use crate::auth::AuthService;
use crate::commands::{request_client, token_store};
use crate::config::{Config, Theme};
use crate::coordinator::{SessionState, SyncCoordinator};
use crate::error::Result;
use crate::model::{Message, MessageRole, MessageStatus};
use crate::store::{ConversationStore, StoreChange};
use crate::transport::WebSocketChannel;

const DEFAULT_PARTICIPANT: &str = "me";

/// A command typed at the chat prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Send(String),
    Retry,
    Typing,
    Help,
    Quit,
    Unknown(String),
}

fn parse_input(line: &str) -> Option<Input> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let input = match trimmed {
        "/retry" => Input::Retry,
        "/typing" => Input::Typing,
        "/help" | "/?" => Input::Help,
        "/quit" | "/exit" | "/q" => Input::Quit,
        other if other.starts_with('/') => Input::Unknown(other.to_string()),
        other => Input::Send(other.to_string()),
    };
    Some(input)
}

/// Role colours of the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    you: Color,
    assistant: Color,
    system: Color,
    tool: Color,
}

impl Palette {
    fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::System => Self {
                you: Color::Green,
                assistant: Color::Cyan,
                system: Color::Magenta,
                tool: Color::Blue,
            },
            Theme::Dark => Self {
                you: Color::BrightGreen,
                assistant: Color::BrightCyan,
                system: Color::BrightMagenta,
                tool: Color::BrightBlue,
            },
            // Cyan and bright colours wash out on a light background.
            Theme::Light => Self {
                you: Color::Green,
                assistant: Color::Blue,
                system: Color::Magenta,
                tool: Color::Black,
            },
        }
    }

    fn role(&self, role: MessageRole) -> Color {
        match role {
            MessageRole::User => self.you,
            MessageRole::Assistant => self.assistant,
            MessageRole::System => self.system,
            MessageRole::Tool => self.tool,
        }
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::for_theme(Theme::default())
    }
}

/// Tracks which messages have been printed so each change notification only
/// prints what is new.
///
/// Messages are keyed by correlation id when they carry one, so the
/// optimistic copy and its confirmed replacement count as one message whose
/// status changed.
#[derive(Debug, Default)]
struct Transcript {
    shown: HashMap<String, MessageStatus>,
    palette: Palette,
}

impl Transcript {
    fn new(palette: Palette) -> Self {
        Self {
            shown: HashMap::new(),
            palette,
        }
    }

    fn key(message: &Message) -> String {
        message
            .correlation_id()
            .map(|c| format!("corr:{}", c))
            .unwrap_or_else(|| message.id.clone())
    }

    /// Lines to print for `messages` since the last call.
    fn update(&mut self, messages: &[Message]) -> Vec<String> {
        let mut lines = Vec::new();
        for message in messages {
            let key = Self::key(message);
            match self.shown.insert(key, message.status) {
                None => lines.push(format_message(message, &self.palette)),
                Some(previous) if previous != message.status => {
                    if let Some(note) = status_note(message) {
                        lines.push(note);
                    }
                }
                Some(_) => {}
            }
        }
        lines
    }
}

fn format_message(message: &Message, palette: &Palette) -> String {
    let name = match message.role {
        MessageRole::User => "you",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::Tool => "tool",
    };
    let who = name.color(palette.role(message.role)).bold();
    let time = message.timestamp.format("%H:%M").to_string().dimmed();
    let mut line = format!("[{}] {}: {}", time, who, message.content);
    match message.status {
        MessageStatus::Sending => line.push_str(&format!(" {}", "(sending)".dimmed())),
        MessageStatus::Error => line.push_str(&format!(" {}", "(failed, /retry)".red())),
        MessageStatus::Sent | MessageStatus::Received => {}
    }
    line
}

fn status_note(message: &Message) -> Option<String> {
    match message.status {
        MessageStatus::Error => Some(format!(
            "{} {}",
            "failed to send:".red(),
            crate::commands::truncate(&message.content, 40)
        )),
        MessageStatus::Sent => Some(format!("{}", "delivered".dimmed())),
        MessageStatus::Sending | MessageStatus::Received => None,
    }
}

fn print_help() {
    println!("{}", "Commands:".bold());
    println!("  /retry   re-send failed messages");
    println!("  /typing  toggle the typing indicator");
    println!("  /help    show this help");
    println!("  /quit    leave the conversation");
}

/// Spawn the blocking prompt reader. The receiver yields `None` when input
/// ends.
fn spawn_reader(prompt: String) -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(err) => {
                tracing::error!("Failed to initialize line editor: {:?}", err);
                return;
            }
        };
        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }
    });
    rx
}

/// Start an interactive chat session on `conversation_id`
pub async fn run_chat(config: Config, conversation_id: String) -> Result<()> {
    let tokens = token_store(&config);
    let client = request_client(&config, Arc::clone(&tokens))?;

    let participant = match AuthService::new(client.clone()).profile().await {
        Ok(user) => user.username,
        Err(e) => {
            tracing::debug!(error = %e, "profile unavailable, using default participant");
            DEFAULT_PARTICIPANT.to_string()
        }
    };

    let channel = Arc::new(WebSocketChannel::connect(
        config.api.ws_url()?,
        Arc::clone(&tokens),
        config.transport.backoff(),
    ));
    let coordinator = SyncCoordinator::new(
        Arc::new(client),
        Arc::clone(&channel) as Arc<dyn crate::transport::EventChannel>,
        ConversationStore::new(config.store.pending_capacity),
        participant,
    );

    let mut changes = coordinator.subscribe().await;
    let mut states = coordinator.watch_state();

    if let Err(e) = coordinator.open_conversation(&conversation_id).await {
        channel.close().await;
        return Err(e.into());
    }

    let mut transcript = Transcript::new(Palette::for_theme(config.settings.theme));
    {
        let store = coordinator.read().await;
        let title = store
            .conversation(&conversation_id)
            .map(|c| c.title.clone())
            .unwrap_or_else(|| conversation_id.clone());
        println!("\n{} {}", "Conversation:".bold(), title.cyan());
        println!("{}", "Type /help for commands.".dimmed());
        for line in transcript.update(store.messages(&conversation_id)) {
            println!("{}", line);
        }
    }

    let mut lines = spawn_reader(format!("{} ", ">>".green()));
    let mut typing = false;

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                let Some(input) = parse_input(&line) else { continue };
                match input {
                    Input::Quit => break,
                    Input::Help => print_help(),
                    Input::Unknown(cmd) => println!("{} {}", "Unknown command:".yellow(), cmd),
                    Input::Typing => {
                        typing = !typing;
                        match coordinator.set_typing(typing).await {
                            Ok(()) => println!("{}", format!("typing indicator {}", if typing { "on" } else { "off" }).dimmed()),
                            Err(e) => {
                                typing = !typing;
                                println!("{} {}", "Could not update typing:".yellow(), e);
                            }
                        }
                    }
                    Input::Retry => {
                        let failed: Vec<String> = coordinator
                            .read()
                            .await
                            .messages(&conversation_id)
                            .iter()
                            .filter(|m| m.status == MessageStatus::Error)
                            .map(|m| m.id.clone())
                            .collect();
                        if failed.is_empty() {
                            println!("{}", "Nothing to retry.".dimmed());
                        }
                        for id in failed {
                            if let Err(e) = coordinator.retry_message(&id).await {
                                println!("{} {}", "Retry failed:".red(), e);
                            }
                        }
                    }
                    Input::Send(content) => {
                        if let Err(e) = coordinator.send_message(&content).await {
                            tracing::debug!(error = %e, "send failed");
                            if e.is_unauthorized() {
                                println!("{}", "Session expired; run `chatsync auth login`.".yellow());
                            }
                        }
                    }
                }
            }
            change = changes.recv() => {
                match change {
                    Ok(StoreChange::MessagesChanged { conversation_id: changed }) if changed == conversation_id => {
                        let store = coordinator.read().await;
                        for line in transcript.update(store.messages(&conversation_id)) {
                            println!("{}", line);
                        }
                    }
                    Ok(StoreChange::TypingChanged { conversation_id: changed }) if changed == conversation_id => {
                        let store = coordinator.read().await;
                        let others = store.typing(&conversation_id);
                        if !others.is_empty() {
                            println!("{}", format!("{} typing...", others.join(", ")).dimmed());
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "change notifications lagged");
                        let store = coordinator.read().await;
                        for line in transcript.update(store.messages(&conversation_id)) {
                            println!("{}", line);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                match state {
                    SessionState::Reconnecting { .. } => println!("{}", "Connection lost, reconnecting...".yellow()),
                    SessionState::Live { .. } => println!("{}", "Connected.".green()),
                    SessionState::Idle => break,
                    SessionState::Loading { .. } => {}
                }
            }
        }
    }

    coordinator.close_conversation().await;
    channel.close().await;
    println!("{}", "Left conversation.".dimmed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, status: MessageStatus, correlation: Option<&str>) -> Message {
        let mut message = Message {
            id: id.to_string(),
            conversation_id: "c1".to_string(),
            role: MessageRole::User,
            content: "hello".to_string(),
            timestamp: Utc.with_ymd_and_hms(2025, 3, 23, 10, 0, 0).unwrap(),
            status,
            metadata: None,
        };
        if let Some(c) = correlation {
            message.set_correlation_id(c);
        }
        message
    }

    #[test]
    fn test_parse_input_commands() {
        assert_eq!(parse_input("   "), None);
        assert_eq!(parse_input("/quit"), Some(Input::Quit));
        assert_eq!(parse_input(" /retry "), Some(Input::Retry));
        assert_eq!(parse_input("/typing"), Some(Input::Typing));
        assert_eq!(parse_input("/nope"), Some(Input::Unknown("/nope".into())));
        assert_eq!(parse_input("hi there"), Some(Input::Send("hi there".into())));
    }

    #[test]
    fn test_transcript_prints_each_message_once() {
        let mut transcript = Transcript::default();
        let messages = vec![msg("m1", MessageStatus::Received, None)];
        assert_eq!(transcript.update(&messages).len(), 1);
        assert!(transcript.update(&messages).is_empty());
    }

    #[test]
    fn test_transcript_treats_confirmation_as_status_change() {
        let mut transcript = Transcript::default();
        let optimistic = vec![msg("local-k1", MessageStatus::Sending, Some("k1"))];
        assert_eq!(transcript.update(&optimistic).len(), 1);

        let confirmed = vec![msg("srv-1", MessageStatus::Sent, Some("k1"))];
        let lines = transcript.update(&confirmed);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("delivered"));
    }

    #[test]
    fn test_palette_follows_theme() {
        let system = Palette::for_theme(Theme::System);
        let dark = Palette::for_theme(Theme::Dark);
        let light = Palette::for_theme(Theme::Light);
        assert_eq!(Palette::default(), system);
        assert_eq!(dark.role(MessageRole::Assistant), Color::BrightCyan);
        assert_eq!(light.role(MessageRole::Assistant), Color::Blue);
        assert_eq!(system.role(MessageRole::User), Color::Green);
    }

    #[test]
    fn test_format_message_marks_pending_and_failed() {
        let palette = Palette::default();
        let sending = format_message(&msg("local-k3", MessageStatus::Sending, Some("k3")), &palette);
        assert!(sending.contains("hello"));
        assert!(sending.contains("(sending)"));
        let failed = format_message(&msg("local-k3", MessageStatus::Error, Some("k3")), &palette);
        assert!(failed.contains("/retry"));
    }

    #[test]
    fn test_transcript_reports_failure() {
        let mut transcript = Transcript::default();
        transcript.update(&[msg("local-k2", MessageStatus::Sending, Some("k2"))]);
        let lines = transcript.update(&[msg("local-k2", MessageStatus::Error, Some("k2"))]);
        assert!(lines[0].contains("failed to send"));
    }
}
