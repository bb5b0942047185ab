use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use kapuchin_core::kernel::error::{Error, Result};
use serde_json::Value;

/// Kapuchin: startup patches for a 3D-printer host
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Print "pong" and exit
    #[arg(long)]
    pub ping: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the plugin modules linked into this binary
    Plugins,
    /// Start the host from a config file and run G-code lines
    Run {
        /// Path to printer.cfg
        config: PathBuf,
        /// G-code line to run after startup; may be repeated
        #[arg(short = 'g', long = "gcode")]
        gcode: Vec<String>,
    },
    /// Start the host from a config file and print every object's status
    Status {
        /// Path to printer.cfg
        config: PathBuf,
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },
}

/// Output format of `kapuchin status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    #[cfg(feature = "yaml-output")]
    Yaml,
    #[cfg(feature = "toml-output")]
    Toml,
}

impl OutputFormat {
    pub fn render(&self, value: &Value) -> Result<String> {
        match self {
            OutputFormat::Json => serde_json::to_string_pretty(value).map_err(|e| Error::serialization("json", e)),
            #[cfg(feature = "yaml-output")]
            OutputFormat::Yaml => serde_yaml::to_string(value).map_err(|e| Error::serialization("yaml", e)),
            #[cfg(feature = "toml-output")]
            OutputFormat::Toml => toml::to_string_pretty(value).map_err(|e| Error::serialization("toml", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_json() {
        let out = OutputFormat::Json.render(&json!({"hello": {"message": "hi"}})).unwrap();
        assert!(out.contains("\"message\": \"hi\""));
    }

    #[cfg(feature = "toml-output")]
    #[test]
    fn test_render_toml_tables() {
        let out = OutputFormat::Toml.render(&json!({"fan": {"speed": 0.5}})).unwrap();
        assert!(out.contains("[fan]"));
        assert!(out.contains("speed = 0.5"));
    }

    #[cfg(feature = "yaml-output")]
    #[test]
    fn test_render_yaml() {
        let out = OutputFormat::Yaml.render(&json!({"toolhead": {"max_velocity": 300.0}})).unwrap();
        assert!(out.contains("max_velocity: 300.0"));
    }
}
