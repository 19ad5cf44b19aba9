//! CLI command definitions and dispatch.

pub mod plan;
pub mod run;

use apphost_common::constants;
use clap::{Parser, Subcommand, ValueEnum};

/// apphost — compose and run local services in dependency order.
#[derive(Parser, Debug)]
#[command(name = constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "APPHOST_LOG_FORMAT")]
    pub log_format: LogFormat,
}

/// Log output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Display the startup order and wiring of a manifest.
    Plan(plan::PlanArgs),
    /// Start every resource and keep them running until interrupted.
    Run(run::RunArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Plan(args) => plan::execute(&args),
        Command::Run(args) => run::execute(args),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
        assert_eq!(Cli::command().get_name(), constants::BIN_NAME);
    }

    #[test]
    fn run_defaults_to_apphost_yaml() {
        let cli = Cli::try_parse_from(["apphost", "run"]).expect("should parse");
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.manifest, "apphost.yaml");
                assert!(args.state_file.is_none());
            }
            Command::Plan(_) => panic!("expected run"),
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn run_accepts_timing_overrides() {
        let cli = Cli::try_parse_from([
            "apphost",
            "--log-format",
            "json",
            "run",
            "stack.yaml",
            "--startup-timeout-ms",
            "500",
            "--supervise-interval-ms",
            "250",
        ])
        .expect("should parse");
        assert_eq!(cli.log_format, LogFormat::Json);
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let config = args.config();
        assert_eq!(config.manifest.to_str(), Some("stack.yaml"));
        assert_eq!(config.startup_timeout_ms, 500);
        assert_eq!(config.supervise_interval_ms, 250);
    }
}
