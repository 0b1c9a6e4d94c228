//! ordersync CLI - export marketplace orders into Google Sheets
//!
//! Entry point: loads `.env`, the configuration layers and logging, then
//! dispatches to the command handlers.

mod cli;
mod config;
mod error;
mod handlers;
mod logging;
mod output;

use cli::{Cli, Commands};
use colored::control;
use config::Config;
use error::Result;
use logging::{timing::Timer, LoggingConfig};
use output::OutputWriter;
use std::process;
use tracing::instrument;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse_args();

    control::set_override(cli.use_color());

    // A missing .env file is normal
    let dotenv_path = dotenv::dotenv().ok();

    let result = match Config::load_with_file(cli.config.as_deref()) {
        Ok(config) => {
            if let Err(e) = init_logging(&cli, &config) {
                eprintln!("Failed to initialize logging: {}", e);
            }
            if let Some(path) = dotenv_path {
                tracing::debug!(path = %path.display(), "Loaded .env file");
            }
            run(cli, config).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => process::exit(0),
        Err(e) => {
            tracing::error!(error = %logging::redaction::redact_sensitive(&e.to_string()), "Command failed");
            eprintln!("{}", error::format_error(&e, control::SHOULD_COLORIZE.should_colorize()));

            if e.should_show_help() {
                eprintln!("\nFor more information, try '--help'");
            }

            process::exit(e.exit_code());
        }
    }
}

/// Main application logic
#[instrument(skip_all, fields(command = ?cli.command))]
async fn run(cli: Cli, config: Config) -> Result<()> {
    let _timer = Timer::new("cli_execution");

    let mut output = OutputWriter::new(cli.output, cli.use_color(), cli.quiet);

    match cli.command {
        Commands::Run(args) => handlers::handle_run(args, &config, &mut output).await,
        Commands::Cabinets => handlers::handle_cabinets(&config, &mut output).await,
        Commands::Config(args) => handlers::handle_config(args, &config, &mut output).await,
    }
}

/// Initialize the logging system: verbosity, then config file, then environment
fn init_logging(cli: &Cli, config: &Config) -> Result<()> {
    let mut logging_config = LoggingConfig::from_verbosity(cli.verbosity_level());

    if cli.verbosity_level() == 0 {
        logging_config.merge_with_settings(
            config.logging.level.as_deref(),
            config.logging.format.as_deref(),
        );
    } else {
        logging_config.merge_with_settings(None, config.logging.format.as_deref());
    }

    logging_config.merge_with_env();

    if cli.quiet {
        logging_config.level = "error".to_string();
    }
    if cli.no_color {
        logging_config.ansi = false;
    }

    logging::init_logging(logging_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["ordersync", "-vv", "cabinets"]);
        assert_eq!(cli.verbosity_level(), 2);

        let cli = Cli::parse_from(["ordersync", "--quiet", "run"]);
        assert_eq!(cli.verbosity_level(), 0);
        assert!(matches!(cli.command, Commands::Run(_)));
    }
}
