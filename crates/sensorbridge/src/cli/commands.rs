//! CLI command definitions.
//!
//! This module defines the arguments of the `sbridge` subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Telemetry command arguments.
#[derive(Debug, Args)]
pub struct TelemetryCommand {
    /// MAVLink connection string (e.g. "tcpout:192.168.26.28:5762" or
    /// "serial:/dev/ttyACM0:115200"); overrides the configuration
    #[arg(long, value_name = "ADDRESS")]
    pub connection: Option<String>,
}

/// Detect command arguments.
#[derive(Debug, Args)]
pub struct DetectCommand {
    /// JSON file holding 64 temperatures, or 8 rows of 8
    pub file: PathBuf,

    /// Write the annotated JPEG here
    #[arg(short, long, value_name = "JPEG")]
    pub output: Option<PathBuf>,

    /// Output the detection as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_command_debug() {
        let cmd = TelemetryCommand {
            connection: Some("tcpout:127.0.0.1:5760".to_string()),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("connection"));
        assert!(debug_str.contains("5760"));
    }

    #[test]
    fn test_detect_command_debug() {
        let cmd = DetectCommand {
            file: PathBuf::from("frame.json"),
            output: None,
            json: false,
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("frame.json"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }

    #[test]
    fn test_config_validate_debug() {
        let cmd = ConfigCommand::Validate {
            file: Some(PathBuf::from("/tmp/config.toml")),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Validate"));
        assert!(debug_str.contains("/tmp/config.toml"));
    }
}
