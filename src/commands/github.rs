use std::sync::Arc;

use crate::auth::{KeyringTokenStore, TokenStore, GITHUB_TOKEN_ACCOUNT};
use crate::cli::GitHubCommand;
use crate::client::RequestClient;
use crate::commands::auth::read_password;
use crate::commands::files::human_size;
use crate::commands::truncate;
use crate::config::Config;
use crate::error::{ChatSyncError, Result};
use crate::github::{
    initial_branch, parent_path, parse_repo_slug, GitHubClient, GitHubContent, GitHubRepository,
};
use colored::Colorize;
use prettytable::{format, Table};

/// GitHub client whose token lives in its own keyring account.
pub fn github_client(config: &Config) -> Result<GitHubClient> {
    let tokens: Arc<dyn TokenStore> = Arc::new(KeyringTokenStore::with_account(
        config.auth.keyring_service.as_str(),
        GITHUB_TOKEN_ACCOUNT,
    ));
    let client = RequestClient::new(
        config.github.api_url()?,
        tokens,
        config.api.timeout(),
        config.api.connect_timeout(),
    )?;
    Ok(GitHubClient::new(client))
}

/// Handle GitHub commands
pub async fn handle_github(config: &Config, command: GitHubCommand) -> Result<()> {
    let github = github_client(config)?;

    match command {
        GitHubCommand::Login { token } => {
            let token = match token {
                Some(token) => token,
                None => read_password("GitHub token: ")?,
            };
            let token = token.trim();
            if token.is_empty() {
                return Err(anyhow::anyhow!(ChatSyncError::Unauthorized(
                    "no GitHub token given".to_string()
                )));
            }
            let user = github.sign_in_with_token(token).await?;
            println!(
                "{} {}",
                "Signed in to GitHub as".green(),
                user.login.cyan()
            );
        }
        GitHubCommand::Logout => {
            github.sign_out()?;
            println!("{}", "Signed out of GitHub.".green());
        }
        GitHubCommand::Whoami => {
            if !github.is_signed_in() {
                println!("{}", "Not signed in to GitHub.".yellow());
                return Ok(());
            }
            let user = github.current_user().await?;
            match &user.name {
                Some(name) => println!("{} ({})", name, user.login.cyan()),
                None => println!("{}", user.login.cyan()),
            }
            println!("profile: {}", user.html_url);
            if let Some(bio) = user.bio.as_deref().filter(|b| !b.is_empty()) {
                println!("{}", bio.dimmed());
            }
        }
        GitHubCommand::Repos { search } => {
            let repositories = match search.as_deref() {
                Some(query) => github.search_repositories(query).await?,
                None => github.repositories().await?,
            };
            if repositories.is_empty() {
                println!("{}", "No repositories.".yellow());
                return Ok(());
            }
            repository_table(&repositories).printstd();
        }
        GitHubCommand::Branches { repo } => {
            let (owner, name) = parse_repo_slug(&repo)?;
            let repository = github.repository(owner, name).await?;
            let branches = github.branches(owner, name).await?;
            let current = initial_branch(&repository, &branches).map(|b| b.name.clone());
            for branch in &branches {
                let marker = if Some(&branch.name) == current.as_ref() {
                    "*"
                } else {
                    " "
                };
                let lock = if branch.protected { " (protected)" } else { "" };
                println!(
                    "{} {} {}{}",
                    marker,
                    branch.name.cyan(),
                    branch.commit.sha.chars().take(7).collect::<String>().dimmed(),
                    lock
                );
            }
        }
        GitHubCommand::Ls {
            repo,
            path,
            git_ref,
        } => {
            let (owner, name) = parse_repo_slug(&repo)?;
            let entries = github
                .contents(owner, name, &path, git_ref.as_deref())
                .await?;
            println!("\n{}:/{}", repo.bold(), path.trim_matches('/'));
            if !path.trim_matches('/').is_empty() {
                println!("{}", format!("up: /{}", parent_path(&path)).dimmed());
            }
            if entries.is_empty() {
                println!("{}", "Empty directory.".yellow());
                return Ok(());
            }
            contents_table(&entries).printstd();
            println!();
        }
        GitHubCommand::Cat {
            repo,
            path,
            git_ref,
        } => {
            let (owner, name) = parse_repo_slug(&repo)?;
            let file = github.file(owner, name, &path, git_ref.as_deref()).await?;
            if file.is_dir() {
                return Err(ChatSyncError::Config(format!(
                    "{} is a directory; use `chatsync github ls`",
                    path
                ))
                .into());
            }
            print!("{}", file.text()?);
        }
    }

    Ok(())
}

fn repository_table(repositories: &[GitHubRepository]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Repository".bold(),
        "Language".bold(),
        "Stars".bold(),
        "Updated".bold(),
        "Description".bold()
    ]);
    for repository in repositories {
        let name = if repository.is_private {
            format!("{} (private)", repository.full_name)
        } else {
            repository.full_name.clone()
        };
        table.add_row(prettytable::row![
            name.cyan(),
            repository.language.as_deref().unwrap_or("-"),
            repository.stargazers_count,
            repository.updated_at.format("%Y-%m-%d").to_string(),
            truncate(repository.description.as_deref().unwrap_or(""), 50)
        ]);
    }
    table
}

fn contents_table(entries: &[GitHubContent]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["Name".bold(), "Size".bold()]);
    for entry in entries {
        let (name, size) = if entry.is_dir() {
            (
                format!("{}/", truncate(&entry.name, 48)).blue().to_string(),
                "-".to_string(),
            )
        } else {
            (truncate(&entry.name, 48), human_size(entry.size))
        };
        table.add_row(prettytable::row![name, size]);
    }
    table
}
