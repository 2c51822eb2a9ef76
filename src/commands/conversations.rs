use crate::api::ConversationApi;
use crate::cli::ConversationCommand;
use crate::commands::{request_client, token_store, truncate};
use crate::config::Config;
use crate::error::Result;
use crate::store::ConversationStore;
use colored::Colorize;
use prettytable::{format, Table};

/// Handle conversation commands
pub async fn handle_conversations(config: &Config, command: ConversationCommand) -> Result<()> {
    let client = request_client(config, token_store(config))?;

    match command {
        ConversationCommand::List { json } => {
            // Go through the store so the listing uses its ordering rules.
            let mut store = ConversationStore::new(config.store.pending_capacity);
            for conversation in client.list_conversations().await? {
                store.upsert_conversation(conversation);
            }
            let conversations = store.conversations();

            if json {
                println!("{}", serde_json::to_string_pretty(&conversations)?);
                return Ok(());
            }

            if conversations.is_empty() {
                println!("{}", "No conversations found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Messages".bold(),
                "Last Message".bold(),
                "Updated".bold()
            ]);

            for conversation in conversations {
                let preview = conversation
                    .last_message
                    .as_deref()
                    .map(|m| truncate(m, 40))
                    .unwrap_or_else(|| "-".to_string());
                table.add_row(prettytable::row![
                    conversation.id.cyan(),
                    truncate(&conversation.title, 40),
                    conversation.message_count,
                    preview,
                    conversation.updated_at.format("%Y-%m-%d %H:%M").to_string()
                ]);
            }

            println!("\nConversations:");
            table.printstd();
            println!();
            println!("Use {} to open one.", "chatsync chat <ID>".cyan());
            println!();
        }
        ConversationCommand::Create { title } => {
            let conversation = client.create_conversation(title.as_deref()).await?;
            println!(
                "{} {} ({})",
                "Created conversation".green(),
                conversation.id.cyan(),
                conversation.title
            );
        }
    }

    Ok(())
}
