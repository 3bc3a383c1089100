//! Commands that run against a connected session.
//!
//! Shared by one-shot invocations and the interactive shell.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use zeroize::Zeroizing;

use nexusvault_common::VaultPath;
use nexusvault_vault::{
    EntryKind, ShareManager, SharedFileEntry, VaultEntry, VaultOperations, VaultSession,
};

use crate::progress::TerminalProgress;

#[derive(Subcommand, Debug)]
pub enum VaultCommand {
    /// Upload a file to the vault.
    Upload {
        /// Local file to upload.
        source: PathBuf,

        /// Destination path in the vault (default: the file name).
        dest: Option<String>,
    },

    /// Download a file from the vault.
    Download {
        /// Path in the vault.
        path: String,

        /// Local output file.
        output: PathBuf,
    },

    /// Remove a file or an empty folder from the vault.
    #[command(alias = "rm")]
    Delete {
        /// Path in the vault.
        path: String,
    },

    /// List everything in the vault.
    #[command(alias = "list")]
    Ls,

    /// Search vault paths (case-insensitive).
    Search {
        /// Text to look for.
        query: String,
    },

    /// Create a folder in the vault.
    Mkdir {
        /// Folder path to create.
        path: String,
    },

    /// Share a file; prints a share string for the recipient.
    Share {
        /// Path in the vault.
        path: String,
    },

    /// List issued shares.
    Shares,

    /// Wipe the remote repository and all of its history.
    Purge {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

fn vault_path(path: &str) -> Result<VaultPath> {
    VaultPath::parse_entry(path).with_context(|| format!("Invalid vault path: {}", path))
}

/// Run one command against `session`.
pub async fn run(session: &mut VaultSession, command: VaultCommand) -> Result<()> {
    let progress = TerminalProgress::new();

    match command {
        VaultCommand::Upload { source, dest } => {
            let dest = match dest {
                Some(dest) => dest,
                None => source
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .context("Source has no file name; give a destination path")?,
            };
            let path = vault_path(&dest)?;
            let content = tokio::fs::read(&source)
                .await
                .with_context(|| format!("Failed to read {}", source.display()))?;

            VaultOperations::new(session)
                .with_progress(&progress)
                .upload(&path, &content)
                .await
                .context("Failed to upload file")?;
            println!("✔ Upload successful: {} ({} bytes)", path, content.len());
        }

        VaultCommand::Download { path, output } => {
            let path = vault_path(&path)?;
            let content = VaultOperations::new(session)
                .with_progress(&progress)
                .download(&path)
                .await
                .context("Failed to download file")?;
            tokio::fs::write(&output, &content)
                .await
                .context("Failed to write output file")?;
            println!("✔ Download successful: {} ({} bytes)", output.display(), content.len());
        }

        VaultCommand::Delete { path } => {
            let path = vault_path(&path)?;
            VaultOperations::new(session)
                .with_progress(&progress)
                .delete(&path)
                .await
                .context("Failed to delete")?;
            println!("✔ Deleted {}", path);
        }

        VaultCommand::Ls => {
            let entries = VaultOperations::new(session).list();
            if entries.is_empty() {
                println!("Your vault is currently empty. Use 'nexus upload' to add your first file.");
            } else {
                print_lines(&format_entries(&entries));
            }
        }

        VaultCommand::Search { query } => {
            let hits = VaultOperations::new(session).search(&query);
            if hits.is_empty() {
                println!("No matches for '{}'.", query);
            } else {
                print_lines(&format_entries(&hits));
            }
        }

        VaultCommand::Mkdir { path } => {
            let path = vault_path(&path)?;
            VaultOperations::new(session)
                .with_progress(&progress)
                .make_folder(&path)
                .await
                .context("Failed to create folder")?;
            println!("✔ Folder ready: {}", path);
        }

        VaultCommand::Share { path } => {
            let path = vault_path(&path)?;
            let password = rpassword::prompt_password("Enter a Share Password: ")
                .map(Zeroizing::new)
                .context("Failed to read password")?;
            let share = ShareManager::new(session)
                .with_progress(&progress)
                .share(&path, &password)
                .await
                .context("Failed to share file")?;
            println!("✔ Shared. Send this to the recipient:");
            println!("{}", share);
        }

        VaultCommand::Shares => {
            let shares = ShareManager::new(session)
                .list_shares()
                .await
                .context("Failed to load shares")?;
            if shares.is_empty() {
                println!("No files shared yet.");
            } else {
                print_lines(&format_shares(&shares));
            }
        }

        VaultCommand::Purge { yes } => {
            if !yes && !confirm("⚠️  Confirm PURGE? (y/N): ")? {
                println!("Aborted.");
                return Ok(());
            }
            VaultOperations::new(session)
                .with_progress(&progress)
                .purge()
                .await
                .context("Failed to purge vault")?;
            println!("✔ Vault purged.");
        }
    }

    Ok(())
}

/// Only an exact `y` confirms.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "y")
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

fn format_entries(entries: &[(String, VaultEntry)]) -> Vec<String> {
    let width = entries
        .iter()
        .map(|(path, _)| path.chars().count())
        .max()
        .unwrap_or(0)
        .max("VAULT PATH".len());

    let mut lines = vec![
        format!("{:<width$}   STORAGE ID", "VAULT PATH", width = width),
        format!("{:<width$}   ----------", "----------", width = width),
    ];
    for (path, entry) in entries {
        let storage = match entry.kind {
            EntryKind::File => entry.real_name.as_str(),
            EntryKind::Folder => "<folder>",
        };
        lines.push(format!("{:<width$}   {}", path, storage, width = width));
    }
    lines
}

fn format_shares(shares: &[SharedFileEntry]) -> Vec<String> {
    shares
        .iter()
        .map(|share| {
            format!(
                "{}  {}  {}",
                share.shared_at.format("%Y-%m-%d %H:%M"),
                share.reference,
                share.original_path
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_entries_aligns_columns() {
        let entries = vec![
            ("a.txt".to_string(), VaultEntry::file("abc123", "00")),
            ("documents/long-name.pdf".to_string(), VaultEntry::file("def456", "00")),
            ("docs".to_string(), VaultEntry::folder()),
        ];

        let lines = format_entries(&entries);
        assert_eq!(lines.len(), 5);
        let column = lines[0].find("STORAGE ID").unwrap();
        assert_eq!(lines[2].find("abc123"), Some(column));
        assert_eq!(lines[3].find("def456"), Some(column));
        assert!(lines[4].ends_with("<folder>"));
    }

    #[test]
    fn test_vault_path_rejects_root() {
        assert!(vault_path("/").is_err());
        assert!(vault_path("a//b").is_err());
        assert_eq!(vault_path("/a/b").unwrap().to_key(), "a/b");
    }
}
