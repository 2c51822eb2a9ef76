use crate::cli::FileCommand;
use crate::commands::{request_client, token_store, truncate};
use crate::config::Config;
use crate::error::{ChatSyncError, Result};
use crate::files::{FileClient, FileItem};
use colored::Colorize;
use prettytable::{format, Table};

/// Handle file commands
pub async fn handle_files(config: &Config, command: FileCommand) -> Result<()> {
    let files = FileClient::new(request_client(config, token_store(config))?);

    match command {
        FileCommand::List { path } => {
            let entries = files.list(&path).await?;
            if entries.is_empty() {
                println!("{}", format!("{} is empty.", path).yellow());
                return Ok(());
            }
            println!("\n{}", path.bold());
            listing_table(&entries).printstd();
            println!();
        }
        FileCommand::Cat { path } => {
            print!("{}", files.content(&path).await?);
        }
        FileCommand::Save {
            path,
            from,
            content,
            create,
        } => {
            let body = match (from, content) {
                (Some(local), _) => std::fs::read_to_string(&local).map_err(|e| {
                    ChatSyncError::Config(format!("cannot read {}: {}", local.display(), e))
                })?,
                (None, Some(content)) => content,
                (None, None) => String::new(),
            };
            if create {
                files.create(&path, &body).await?;
                println!("{} {}", "Created".green(), path.cyan());
            } else {
                files.save(&path, &body).await?;
                println!("{} {}", "Saved".green(), path.cyan());
            }
        }
        FileCommand::Mkdir { path } => {
            files.mkdir(&path).await?;
            println!("{} {}", "Created directory".green(), path.cyan());
        }
        FileCommand::Rm { path } => {
            files.delete(&path).await?;
            println!("{} {}", "Deleted".green(), path.cyan());
        }
        FileCommand::Mv { from, to } => {
            files.rename(&from, &to).await?;
            println!("{} {} -> {}", "Renamed".green(), from.cyan(), to.cyan());
        }
    }

    Ok(())
}

fn listing_table(entries: &[FileItem]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Name".bold(),
        "Size".bold(),
        "Modified".bold()
    ]);
    for entry in entries {
        let name = if entry.is_directory {
            format!("{}/", truncate(&entry.name, 48)).blue().to_string()
        } else {
            truncate(&entry.name, 48)
        };
        let size = if entry.is_directory {
            "-".to_string()
        } else {
            human_size(entry.size)
        };
        table.add_row(prettytable::row![
            name,
            size,
            entry.modified_at.format("%Y-%m-%d %H:%M").to_string()
        ]);
    }
    table
}

pub(crate) fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
