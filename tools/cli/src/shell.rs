//! Interactive shell over one connected session.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use nexusvault_vault::{Settings, VaultSession};

use crate::commands::{self, VaultCommand};
use crate::remote::{self, RemoteArgs};

#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Subcommand, Debug)]
enum ShellCommand {
    #[command(flatten)]
    Vault(VaultCommand),

    /// Close the session and leave the shell.
    #[command(aliases = ["exit", "quit"])]
    Disconnect,
}

/// What the shell should do after a line.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    Continue,
    Stop,
}

pub async fn run(args: &RemoteArgs, settings: Settings) -> Result<()> {
    let mut session = remote::connect(args, settings, None).await?;
    println!(
        "Connected to {} ({} entries). Type 'help' for commands, 'disconnect' to leave.",
        session.username(),
        session.index().len()
    );

    let mut editor = DefaultEditor::new().context("Failed to start line editor")?;
    let prompt = format!("nexus[{}]> ", session.username());

    loop {
        match editor.readline(&prompt) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                if handle_line(&mut session, &line).await == Next::Stop {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                session.disconnect();
                return Err(e).context("Failed to read input");
            }
        }
    }

    println!("Disconnected from {}.", session.username());
    session.disconnect();
    Ok(())
}

async fn handle_line(session: &mut VaultSession, line: &str) -> Next {
    let Some(words) = shlex::split(line) else {
        eprintln!("Error: unbalanced quotes");
        return Next::Continue;
    };

    match ShellLine::try_parse_from(words) {
        Ok(ShellLine {
            command: ShellCommand::Disconnect,
        }) => Next::Stop,
        Ok(ShellLine {
            command: ShellCommand::Vault(command),
        }) => {
            if let Err(e) = commands::run(session, command).await {
                eprintln!("Error: {:#}", e);
            }
            Next::Continue
        }
        Err(e) => {
            let _ = e.print();
            Next::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Option<ShellCommand> {
        ShellLine::try_parse_from(shlex::split(line)?)
            .ok()
            .map(|l| l.command)
    }

    #[test]
    fn test_parses_quoted_paths() {
        match parse(r#"upload "my file.txt" "docs/my file.txt""#) {
            Some(ShellCommand::Vault(VaultCommand::Upload { source, dest })) => {
                assert_eq!(source.to_str(), Some("my file.txt"));
                assert_eq!(dest.as_deref(), Some("docs/my file.txt"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_exit_aliases() {
        for word in ["disconnect", "exit", "quit"] {
            assert!(matches!(parse(word), Some(ShellCommand::Disconnect)));
        }
    }

    #[test]
    fn test_unknown_command() {
        assert!(parse("frobnicate").is_none());
    }
}
