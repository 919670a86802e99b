//! Mirror Agent - Main entry point
//!
//! Watches source directories and mirrors them into a backup root.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mirror_agent::{
    cache::{CachePolicy, CacheStore},
    config::{ConfigMode, DirectoryConfig, Settings},
    console::{self, Console},
    daemon::shutdown::ShutdownCoordinator,
    supervisor::{DirectoryStatus, DirectorySupervisor},
    utils, MirrorError,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to settings file (TOML)
    #[arg(short, long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Directory list (JSON, overrides settings)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backup root (overrides settings)
    #[arg(short, long, value_name = "DIR")]
    backup_root: Option<PathBuf>,

    /// Cache policy: skip_if_cached or overwrite_always (overrides settings)
    #[arg(short, long)]
    policy: Option<CachePolicy>,

    /// Create an empty directory list if it is missing
    /// (the default for `interactive` unless settings say otherwise)
    #[arg(long)]
    bootstrap: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Mirror all configured directories until interrupted (default)
    Run,
    /// Menu-driven control: activate, add directories, exit
    Interactive,
    /// Print per-directory backup progress and exit
    Status,
}

impl Command {
    /// Directory list handling when neither settings nor flags choose one
    fn default_config_mode(self) -> ConfigMode {
        match self {
            Command::Interactive => ConfigMode::Bootstrap,
            Command::Run | Command::Status => ConfigMode::Strict,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load settings
    let mut settings = match &args.settings {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(config) = args.config {
        settings.files.directories = config;
    }
    if let Some(root) = args.backup_root {
        settings.backup.root = root;
    }
    if let Some(policy) = args.policy {
        settings.backup.policy = policy;
    }
    if args.bootstrap {
        settings.files.config_mode = Some(ConfigMode::Bootstrap);
    }
    let command = args.command.unwrap_or(Command::Run);

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&settings.log.level);
    utils::logger::init(log_level)?;

    tracing::info!(
        "Starting mirror-agent v{} (backup root: {}, policy: {:?})",
        env!("CARGO_PKG_VERSION"),
        settings.backup.root.display(),
        settings.backup.policy
    );

    let cache = CacheStore::load(&settings.files.cache).await.shared();
    let config_mode = settings.files.config_mode_or(command.default_config_mode());
    let config = DirectoryConfig::load(&settings.files.directories, config_mode).await?;

    let shutdown_coordinator = ShutdownCoordinator::new();
    let mut supervisor =
        DirectorySupervisor::new(settings, config, cache, shutdown_coordinator.token()).await;

    match command {
        Command::Status => {
            print_status(&supervisor.status().await?);
            return Ok(());
        }
        Command::Run => {
            if supervisor.directories().is_empty() {
                return Err(MirrorError::NoDirectories.into());
            }
            let started = supervisor.activate().await?;
            tracing::info!("Backup manager is now active ({} directories)", started);
            shutdown_coordinator.wait_for_signal().await;
        }
        Command::Interactive => {
            let mut input = console::spawn_stdin_reader();
            let mut console = Console::new(std::io::stdout());
            tokio::select! {
                _ = shutdown_coordinator.wait_for_signal() => {}
                result = console.run(&mut supervisor, &mut input) => result?,
            }
        }
    }

    // Graceful shutdown
    shutdown_coordinator.shutdown(&mut supervisor).await;

    Ok(())
}

fn print_status(statuses: &[DirectoryStatus]) {
    if statuses.is_empty() {
        println!("No directories configured for backup.");
        return;
    }

    for status in statuses {
        let counts = match (status.total_files, status.pending_files) {
            (Some(total), Some(pending)) => format!("{total} files, {pending} pending"),
            (Some(total), None) => format!("{total} files"),
            _ => "unreadable".to_string(),
        };
        println!(
            "{} -> {} ({})",
            status.source_root.display(),
            status.backup_base.display(),
            counts
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_bootstraps_by_default() {
        let args = Args::parse_from(["mirror-agent", "interactive"]);
        let command = args.command.unwrap_or(Command::Run);
        assert_eq!(command.default_config_mode(), ConfigMode::Bootstrap);

        let settings = Settings::default();
        assert_eq!(
            settings.files.config_mode_or(command.default_config_mode()),
            ConfigMode::Bootstrap
        );
    }

    #[test]
    fn test_explicit_settings_win_over_command_default() {
        let mut settings = Settings::default();
        settings.files.config_mode = Some(ConfigMode::Strict);
        assert_eq!(
            settings.files.config_mode_or(Command::Interactive.default_config_mode()),
            ConfigMode::Strict
        );
        assert_eq!(Command::Run.default_config_mode(), ConfigMode::Strict);
        assert_eq!(Command::Status.default_config_mode(), ConfigMode::Strict);
    }
}
