//! Command-line interface for sensorbridge.
//!
//! This module provides the CLI structure for the `sbridge` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, DetectCommand, TelemetryCommand};

/// sbridge - Ship sensor and autopilot data to the cloud
///
/// Reads a DHT22 humidity sensor, a Pixhawk flight controller and an AMG88xx
/// thermal camera, and forwards readings, telemetry and fire-detection images
/// to remote services.
#[derive(Debug, Parser)]
#[command(name = "sbridge")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log records and images instead of sending them
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Use simulated sensors instead of hardware
    #[arg(long, global = true)]
    pub simulate: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the humidity/temperature sensor
    Climate,

    /// Bridge autopilot telemetry to the database
    Telemetry(TelemetryCommand),

    /// Run thermal fire detection
    Thermal,

    /// Run every enabled pipeline until interrupted
    Run,

    /// Classify a single frame from a JSON file
    Detect(DetectCommand),

    /// View or check configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn cli(verbose: u8, quiet: bool) -> Cli {
        Cli {
            config: None,
            verbose,
            quiet,
            dry_run: false,
            simulate: false,
            command: Command::Run,
        }
    }

    #[test]
    fn test_cli_name() {
        let cli = Cli::command();
        assert_eq!(cli.get_name(), "sbridge");
    }

    #[test]
    fn test_verbosity_quiet() {
        assert_eq!(cli(0, true).verbosity(), crate::logging::Verbosity::Quiet);
        // Quiet wins over -v
        assert_eq!(cli(2, true).verbosity(), crate::logging::Verbosity::Quiet);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(cli(0, false).verbosity(), crate::logging::Verbosity::Normal);
        assert_eq!(cli(1, false).verbosity(), crate::logging::Verbosity::Verbose);
        assert_eq!(cli(2, false).verbosity(), crate::logging::Verbosity::Trace);
        assert_eq!(cli(5, false).verbosity(), crate::logging::Verbosity::Trace);
    }

    #[test]
    fn test_cli_verify() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_pipelines() {
        let parse = |arg: &str| Cli::try_parse_from(["sbridge", arg]).unwrap().command;
        assert!(matches!(parse("climate"), Command::Climate));
        assert!(matches!(parse("thermal"), Command::Thermal));
        assert!(matches!(parse("run"), Command::Run));
        assert!(matches!(
            parse("telemetry"),
            Command::Telemetry(TelemetryCommand { connection: None })
        ));
    }

    #[test]
    fn test_parse_telemetry_connection() {
        let cli = Cli::try_parse_from([
            "sbridge",
            "telemetry",
            "--connection",
            "udpin:0.0.0.0:14550",
        ])
        .unwrap();
        let Command::Telemetry(cmd) = cli.command else {
            panic!("expected telemetry");
        };
        assert_eq!(cmd.connection.as_deref(), Some("udpin:0.0.0.0:14550"));
    }

    #[test]
    fn test_parse_detect() {
        let cli = Cli::try_parse_from([
            "sbridge",
            "detect",
            "frame.json",
            "-o",
            "out.jpg",
            "--json",
        ])
        .unwrap();
        let Command::Detect(cmd) = cli.command else {
            panic!("expected detect");
        };
        assert_eq!(cmd.file, PathBuf::from("frame.json"));
        assert_eq!(cmd.output, Some(PathBuf::from("out.jpg")));
        assert!(cmd.json);
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["sbridge", "run", "--simulate", "--dry-run", "-vv"]).unwrap();
        assert!(cli.simulate);
        assert!(cli.dry_run);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_with_config() {
        let cli =
            Cli::try_parse_from(["sbridge", "-c", "/etc/sensorbridge.toml", "config", "path"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/sensorbridge.toml")));
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Path)));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["sbridge"]).is_err());
    }
}
