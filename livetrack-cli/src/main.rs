//! LiveTrack CLI - Command-line interface
//!
//! Watches a transit server's live vehicle positions and manages the
//! LiveTrack configuration file.

mod commands;
mod error;
mod sink;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use livetrack::config::ConfigFile;
use livetrack::logging::init_logging;
use tracing::info;

use commands::config::ConfigCommands;
use commands::watch::WatchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "livetrack", version, about = "Live transit vehicle tracking")]
struct Cli {
    /// Log level or filter directive (overrides logging.level)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Write logs to this file instead of stderr (overrides logging.file)
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll vehicle positions and optionally track one vehicle
    Watch(WatchArgs),

    /// View or edit configuration settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Create a default configuration file
    Init,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Init => commands::init::run(),
        Commands::Watch(args) => {
            let config = ConfigFile::load()?;

            let mut logging = config.logging_config();
            if let Some(level) = cli.log_level {
                logging.level = level;
            }
            if let Some(file) = cli.log_file {
                logging.file = Some(file);
            }
            // Held until exit so buffered file output is flushed.
            let _log_guard = init_logging(&logging)?;
            info!(version = livetrack::VERSION, "LiveTrack starting");

            commands::watch::run(args, &config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_watch_with_globals() {
        let cli = Cli::try_parse_from([
            "livetrack",
            "watch",
            "--url",
            "http://transit.local",
            "--interval-ms",
            "1000",
            "--track",
            "1042",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.url.as_deref(), Some("http://transit.local"));
                assert_eq!(args.interval_ms, Some(1000));
                assert_eq!(args.track.as_deref(), Some("1042"));
                assert!(!args.no_updates);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_set() {
        let cli =
            Cli::try_parse_from(["livetrack", "config", "set", "server.base_url", "http://x"])
                .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                command: ConfigCommands::Set { .. }
            }
        ));
    }
}
