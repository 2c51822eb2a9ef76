//! Command-line interface definition for chatsync
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for conversations, live chat, files,
//! authentication, and GitHub browsing.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// chatsync - conversation sync client
///
/// Lists and creates conversations, opens a live chat session that stays in
/// sync with the server, and manages remote files.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatsync")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/chatsync.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the REST API base URL
    #[arg(long)]
    pub api_base: Option<String>,

    /// Override the event stream WebSocket URL
    #[arg(long)]
    pub ws_url: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for chatsync
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List or create conversations
    Conversations {
        #[command(subcommand)]
        command: ConversationCommand,
    },

    /// Open a conversation and chat with live updates
    ///
    /// Inside the session, `/retry` re-sends failed messages, `/typing`
    /// toggles the typing indicator, and `/quit` leaves.
    Chat {
        /// Conversation to open
        conversation_id: String,
    },

    /// Browse and edit remote files
    Files {
        #[command(subcommand)]
        command: FileCommand,
    },

    /// Sign in, sign out, or show the current user
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },

    /// Browse GitHub repositories, branches and files
    Github {
        #[command(subcommand)]
        command: GitHubCommand,
    },
}

/// Conversation subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConversationCommand {
    /// List conversations, most recently active first
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Create a conversation
    Create {
        /// Title; the server picks one when omitted
        #[arg(short, long)]
        title: Option<String>,
    },
}

/// File subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum FileCommand {
    /// List a directory
    List {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file's content
    Cat { path: String },

    /// Write a file from a local file or inline text
    Save {
        /// Remote path
        path: String,

        /// Local file to upload
        #[arg(short, long, conflicts_with = "content")]
        from: Option<PathBuf>,

        /// Inline content
        #[arg(long)]
        content: Option<String>,

        /// Create a new file instead of overwriting
        #[arg(long)]
        create: bool,
    },

    /// Create a directory
    Mkdir { path: String },

    /// Delete a file or directory
    Rm { path: String },

    /// Rename or move a file or directory
    Mv { from: String, to: String },
}

/// Authentication subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Sign in and store the token in the OS keyring
    Login {
        username: String,

        /// Password; prompted for when omitted
        #[arg(long, env = "CHATSYNC_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Remove the stored token
    Logout,

    /// Show the signed-in user
    Whoami,
}

/// GitHub subcommands
///
/// Repositories are named `owner/name`.
#[derive(Subcommand, Debug, Clone)]
pub enum GitHubCommand {
    /// Store a personal access token in the OS keyring
    Login {
        /// Token; prompted for when omitted
        #[arg(long, env = "CHATSYNC_GITHUB_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },

    /// Remove the stored GitHub token
    Logout,

    /// Show the GitHub account the token belongs to
    Whoami,

    /// List your repositories, or search all of GitHub
    Repos {
        /// Search query instead of your own repositories
        #[arg(short, long)]
        search: Option<String>,
    },

    /// List a repository's branches
    Branches { repo: String },

    /// List a directory of a repository
    Ls {
        repo: String,

        /// Directory; the repository root when omitted
        #[arg(default_value = "")]
        path: String,

        /// Branch, tag or commit; the default branch when omitted
        #[arg(short = 'r', long = "ref")]
        git_ref: Option<String>,
    },

    /// Print a file of a repository
    Cat {
        repo: String,
        path: String,

        /// Branch, tag or commit; the default branch when omitted
        #[arg(short = 'r', long = "ref")]
        git_ref: Option<String>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/chatsync.yaml".to_string()),
            verbose: false,
            json_logs: false,
            api_base: None,
            ws_url: None,
            command: Commands::Conversations {
                command: ConversationCommand::List { json: false },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default() {
        let cli = Cli::default();
        assert_eq!(cli.config, Some("config/chatsync.yaml".to_string()));
        assert!(!cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Conversations {
                command: ConversationCommand::List { json: false }
            }
        ));
    }

    #[test]
    fn test_cli_parse_chat_command() {
        let cli = Cli::try_parse_from(["chatsync", "chat", "c1"]).unwrap();
        if let Commands::Chat { conversation_id } = cli.command {
            assert_eq!(conversation_id, "c1");
        } else {
            panic!("Expected Chat command");
        }
    }

    #[test]
    fn test_cli_chat_requires_conversation() {
        assert!(Cli::try_parse_from(["chatsync", "chat"]).is_err());
    }

    #[test]
    fn test_cli_parse_global_overrides() {
        let cli = Cli::try_parse_from([
            "chatsync",
            "--json-logs",
            "--api-base",
            "http://localhost:8080/api",
            "conversations",
            "list",
            "--json",
        ])
        .unwrap();
        assert!(cli.json_logs);
        assert_eq!(cli.api_base.as_deref(), Some("http://localhost:8080/api"));
        assert!(matches!(
            cli.command,
            Commands::Conversations {
                command: ConversationCommand::List { json: true }
            }
        ));
    }

    #[test]
    fn test_cli_parse_conversation_create_with_title() {
        let cli =
            Cli::try_parse_from(["chatsync", "conversations", "create", "-t", "Plans"]).unwrap();
        if let Commands::Conversations {
            command: ConversationCommand::Create { title },
        } = cli.command
        {
            assert_eq!(title, Some("Plans".to_string()));
        } else {
            panic!("Expected Create command");
        }
    }

    #[test]
    fn test_cli_files_list_defaults_to_root() {
        let cli = Cli::try_parse_from(["chatsync", "files", "list"]).unwrap();
        if let Commands::Files {
            command: FileCommand::List { path },
        } = cli.command
        {
            assert_eq!(path, "/");
        } else {
            panic!("Expected files list");
        }
    }

    #[test]
    fn test_cli_files_save_rejects_both_sources() {
        let result = Cli::try_parse_from([
            "chatsync",
            "files",
            "save",
            "/a.txt",
            "--from",
            "local.txt",
            "--content",
            "x",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_files_mv() {
        let cli = Cli::try_parse_from(["chatsync", "files", "mv", "/a", "/b"]).unwrap();
        if let Commands::Files {
            command: FileCommand::Mv { from, to },
        } = cli.command
        {
            assert_eq!(from, "/a");
            assert_eq!(to, "/b");
        } else {
            panic!("Expected files mv");
        }
    }

    #[test]
    fn test_cli_parse_auth_login() {
        let cli = Cli::try_parse_from([
            "chatsync", "auth", "login", "ada", "--password", "secret",
        ])
        .unwrap();
        if let Commands::Auth {
            command: AuthCommand::Login { username, password },
        } = cli.command
        {
            assert_eq!(username, "ada");
            assert_eq!(password, Some("secret".to_string()));
        } else {
            panic!("Expected auth login");
        }
    }

    #[test]
    fn test_cli_parse_auth_logout() {
        let cli = Cli::try_parse_from(["chatsync", "auth", "logout"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Auth {
                command: AuthCommand::Logout
            }
        ));
    }

    #[test]
    fn test_cli_parse_github_ls_with_ref() {
        let cli = Cli::try_parse_from([
            "chatsync", "github", "ls", "octocat/hello", "src", "--ref", "dev",
        ])
        .unwrap();
        if let Commands::Github {
            command: GitHubCommand::Ls { repo, path, git_ref },
        } = cli.command
        {
            assert_eq!(repo, "octocat/hello");
            assert_eq!(path, "src");
            assert_eq!(git_ref.as_deref(), Some("dev"));
        } else {
            panic!("Expected github ls");
        }
    }

    #[test]
    fn test_cli_github_ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["chatsync", "github", "ls", "octocat/hello"]).unwrap();
        if let Commands::Github {
            command: GitHubCommand::Ls { path, git_ref, .. },
        } = cli.command
        {
            assert_eq!(path, "");
            assert!(git_ref.is_none());
        } else {
            panic!("Expected github ls");
        }
    }

    #[test]
    fn test_cli_parse_github_repo_search() {
        let cli =
            Cli::try_parse_from(["chatsync", "github", "repos", "--search", "tokio"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Github {
                command: GitHubCommand::Repos { search: Some(ref q) }
            } if q == "tokio"
        ));
    }
}
