//! Stride CLI, the main entry point.
//!
//! Commands:
//! - `assess`: Run the tiered pipeline over a snapshot and signal batch
//! - `dispatch`: Turn recommendations into domain commands
//! - `rules`: List the Tier 0 rule catalog
//! - `policy`: List or validate policy contracts
//! - `config`: Print, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "stride",
    about = "Stride: tiered recommendation assessment",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to ~/.stride/config.toml)
    #[arg(short, long, global = true, env = "STRIDE_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess a state snapshot against a batch of signals
    Assess {
        /// State snapshot JSON file ("-" for stdin)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Signal batch JSON file (an array of signals)
        #[arg(long)]
        signals: Option<PathBuf>,

        /// Batch identifier (random when omitted)
        #[arg(long)]
        batch_id: Option<String>,

        /// Skip the model stage even when a provider is configured
        #[arg(long)]
        offline: bool,

        /// Dispatch the approved recommendations after assessing
        #[arg(long)]
        dispatch: bool,
    },

    /// Dispatch recommendations to the command bus
    Dispatch {
        /// Recommendation JSON file (one object or an array, "-" for stdin)
        #[arg(short, long)]
        recommendation: PathBuf,
    },

    /// List the rule catalog
    Rules,

    /// Manage policy contracts
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// List configured contracts
    List,
    /// Validate configured contracts
    Validate,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the default configuration
    Default,
    /// Print the effective configuration
    Show,
    /// Print the config file path
    Path,
    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays machine-readable.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Assess {
            snapshot,
            signals,
            batch_id,
            offline,
            dispatch,
        } => {
            let args = commands::assess::AssessArgs {
                snapshot,
                signals,
                batch_id,
                offline,
                dispatch,
            };
            commands::assess::run(config_path, args).await?
        }
        Commands::Dispatch { recommendation } => commands::dispatch::run(&recommendation).await?,
        Commands::Rules => commands::rules::run(config_path).await?,
        Commands::Policy { action } => match action {
            PolicyAction::List => commands::policy::list(config_path).await?,
            PolicyAction::Validate => commands::policy::validate(config_path).await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Default => commands::config_cmd::default().await?,
            ConfigAction::Show => commands::config_cmd::show(config_path).await?,
            ConfigAction::Path => commands::config_cmd::path(config_path).await?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path).await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_assess_flags() {
        let cli = Cli::parse_from([
            "stride", "assess", "--snapshot", "state.json", "--signals", "signals.json", "--offline",
        ]);
        match cli.command {
            Commands::Assess {
                snapshot,
                signals,
                offline,
                dispatch,
                ..
            } => {
                assert_eq!(snapshot, PathBuf::from("state.json"));
                assert_eq!(signals, Some(PathBuf::from("signals.json")));
                assert!(offline);
                assert!(!dispatch);
            }
            _ => panic!("expected assess"),
        }
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["stride", "rules", "--config", "/tmp/stride.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/stride.toml")));
    }
}
