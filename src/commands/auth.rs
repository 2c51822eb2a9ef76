//! Authentication commands.
//!
//! `login` stores the token in the OS keyring, `logout` removes it, and
//! `whoami` fetches the profile. A rejected token found by `whoami` is
//! cleared, so the next command does not keep sending it.

use crate::auth::AuthService;
use crate::cli::AuthCommand;
use crate::commands::{request_client, token_store};
use crate::config::Config;
use crate::error::{ChatSyncError, Result};
use colored::Colorize;
use rustyline::completion::Completer;
use rustyline::config::Configurer;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::{ColorMode, Editor, Helper};
use std::borrow::Cow;

/// Line editor helper that draws every typed character as `*`.
#[derive(Debug, Default)]
struct PasswordMask;

impl Highlighter for PasswordMask {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        Cow::Owned("*".repeat(line.chars().count()))
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

impl Completer for PasswordMask {
    type Candidate = String;
}

impl Hinter for PasswordMask {
    type Hint = String;
}

impl Validator for PasswordMask {}

impl Helper for PasswordMask {}

/// Prompt for a password without echoing it or recording it in history.
pub(crate) fn read_password(prompt: &str) -> Result<String> {
    let mut rl: Editor<PasswordMask, DefaultHistory> = Editor::new()?;
    rl.set_helper(Some(PasswordMask));
    rl.set_color_mode(ColorMode::Forced);
    rl.set_auto_add_history(false);
    let mut cursor = rl.set_cursor_visibility(false)?;
    let password = rl.readline(prompt);
    cursor.take();
    Ok(password?)
}

/// Handle auth commands
pub async fn handle_auth(config: &Config, command: AuthCommand) -> Result<()> {
    let service = AuthService::new(request_client(config, token_store(config))?);

    match command {
        AuthCommand::Login { username, password } => {
            let password = match password {
                Some(password) => password,
                None => read_password("Password: ")?,
            };
            let user = service.sign_in(&username, &password).await?;
            println!("{} {} ({})", "Signed in as".green(), user.name, user.username.cyan());
        }
        AuthCommand::Logout => {
            service.sign_out()?;
            println!("{}", "Signed out.".green());
        }
        AuthCommand::Whoami => {
            if !service.is_signed_in() {
                println!("{}", "Not signed in.".yellow());
                return Ok(());
            }
            match service.profile().await {
                Ok(user) => {
                    println!("{} ({})", user.name, user.username.cyan());
                    if let Some(avatar) = user.avatar_url {
                        println!("avatar: {}", avatar);
                    }
                }
                Err(ChatSyncError::Unauthorized(message)) => {
                    tracing::warn!(%message, "stored token rejected");
                    service.sign_out()?;
                    println!(
                        "{}",
                        "Session expired; run `chatsync auth login` again.".yellow()
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_mask_hides_every_character() {
        let mask = PasswordMask;
        assert_eq!(mask.highlight("hunter2", 3), "*******");
        assert_eq!(mask.highlight("pässwörd", 0), "********");
        assert_eq!(mask.highlight("", 0), "");
    }

    #[test]
    fn test_password_mask_redraws_on_each_keystroke() {
        assert!(PasswordMask.highlight_char("a", 1, false));
    }
}
