//! Nexus CLI - Command line interface for git-backed encrypted vaults.
//!
//! Every command connects, runs one operation and disconnects. `nexus shell`
//! keeps one session open for several commands.

mod commands;
mod progress;
mod remote;
mod shell;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use nexusvault_vault::{download_shared, Settings, ShareString, VaultOperations};

use crate::commands::VaultCommand;
use crate::progress::TerminalProgress;
use crate::remote::RemoteArgs;

#[derive(Parser)]
#[command(name = "nexus")]
#[command(about = "Nexus - A stateless, encrypted git-based vault")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Settings file (default: <config dir>/nexus/settings.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    remote: RemoteArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the vault with an empty encrypted index.
    Setup,

    #[command(flatten)]
    Vault(VaultCommand),

    /// Download a file someone shared with you.
    Get {
        /// Share string: user:reference:password[:base64(filename)].
        share: String,

        /// Output file (default: the name carried by the share string).
        output: Option<PathBuf>,
    },

    /// Connect once and run commands interactively.
    Shell,

    /// Show or initialize the settings file.
    Config {
        /// Write the default settings if no file exists yet.
        #[arg(long)]
        init: bool,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        verbose,
        config,
        remote,
        command,
    } = Cli::parse();

    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings_path = match config {
        Some(path) => path,
        None => Settings::default_path().context("Could not determine config directory")?,
    };

    match command {
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "nexus", &mut io::stdout());
            Ok(())
        }
        Commands::Config { init } => cmd_config(&settings_path, init),
        command => {
            let settings = Settings::load(&settings_path).with_context(|| {
                format!("Failed to load settings from {}", settings_path.display())
            })?;
            match command {
                Commands::Setup => cmd_setup(&remote, settings).await,
                Commands::Get { share, output } => cmd_get(&remote, &settings, &share, output).await,
                Commands::Shell => shell::run(&remote, settings).await,
                Commands::Vault(cmd) => {
                    let mut session = remote::connect(&remote, settings, None).await?;
                    let result = commands::run(&mut session, cmd).await;
                    session.disconnect();
                    result
                }
                Commands::Completions { .. } | Commands::Config { .. } => Ok(()),
            }
        }
    }
}

/// Prompt for password securely.
fn prompt_password(prompt: &str) -> Result<Zeroizing<String>> {
    rpassword::prompt_password(prompt)
        .map(Zeroizing::new)
        .context("Failed to read password")
}

/// Initialize a new vault.
async fn cmd_setup(remote: &RemoteArgs, settings: Settings) -> Result<()> {
    let password = prompt_password("Create a Vault Password: ")?;
    let confirm = prompt_password("Confirm Vault Password: ")?;
    if *password != *confirm {
        anyhow::bail!("Passwords do not match");
    }
    if password.is_empty() {
        anyhow::bail!("Password cannot be empty");
    }

    let mut session = remote::connect(remote, settings, Some(password)).await?;
    let progress = TerminalProgress::new();
    let result = VaultOperations::new(&mut session)
        .with_progress(&progress)
        .setup()
        .await
        .context("Failed to set up vault");
    session.disconnect();
    result?;

    println!("✔ Setup complete.");
    Ok(())
}

/// Download through a share string. No vault password or key is needed.
async fn cmd_get(
    remote: &RemoteArgs,
    settings: &Settings,
    share: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let share = ShareString::parse(share).context("Invalid share string")?;
    let output = match (output, &share.filename) {
        (Some(path), _) => path,
        (None, Some(name)) => PathBuf::from(name),
        (None, None) => anyhow::bail!(
            "No output path given and the share string carries no file name"
        ),
    };

    match &share.filename {
        Some(name) => info!("Downloading '{}' from {}", name, share.owner),
        None => info!("Downloading shared file from {}", share.owner),
    }

    let store = remote::open_shared(remote, settings, &share.owner)?;
    let download = download_shared(&share, store.as_ref())
        .await
        .context("Failed to download shared file")?;

    tokio::fs::write(&output, &download.content)
        .await
        .context("Failed to write output file")?;

    println!(
        "✔ Saved {} ({} bytes)",
        output.display(),
        download.content.len()
    );
    Ok(())
}

/// Show the settings in effect, or write the defaults.
fn cmd_config(path: &Path, init: bool) -> Result<()> {
    if init {
        if path.exists() {
            anyhow::bail!("Settings file already exists: {}", path.display());
        }
        Settings::default()
            .save(path)
            .context("Failed to write settings")?;
        println!("✔ Wrote default settings to {}", path.display());
        return Ok(());
    }

    let settings = Settings::load(path).context("Failed to load settings")?;
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}
