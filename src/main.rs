//! chatsync - conversation sync client
//!
#![doc = "chatsync - conversation sync client"]
#![doc = "Main entry point for the chatsync command-line front end."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatsync::cli::{Cli, Commands};
use chatsync::commands;
use chatsync::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/chatsync.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Conversations { command } => {
            tracing::info!("Starting conversations command");
            commands::conversations::handle_conversations(&config, command).await?;
            Ok(())
        }
        Commands::Chat { conversation_id } => {
            tracing::info!("Starting chat session for conversation: {}", conversation_id);
            commands::chat::run_chat(config, conversation_id).await?;
            Ok(())
        }
        Commands::Files { command } => {
            tracing::info!("Starting files command");
            commands::files::handle_files(&config, command).await?;
            Ok(())
        }
        Commands::Auth { command } => {
            tracing::info!("Starting auth command");
            commands::auth::handle_auth(&config, command).await?;
            Ok(())
        }
        Commands::Github { command } => {
            tracing::info!("Starting github command");
            commands::github::handle_github(&config, command).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins when set; otherwise `--verbose` selects debug output for
/// this crate.
fn init_tracing(verbose: bool, json: bool) {
    let default_filter = if verbose { "chatsync=debug" } else { "chatsync=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
