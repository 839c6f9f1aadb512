//! Settings for the `unistream` replay binary.
//!
//! Precedence, highest first: CLI flags, `UNISTREAM_*` environment variables
//! (`__` separates sections), the config file, built-in defaults.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::providers::ModelFamily;

#[derive(Parser, Debug)]
#[command(author, version, about = "Normalize a captured provider response", long_about = None)]
pub struct Cli {
    /// Captured SSE stream or JSON response body; stdin when omitted or `-`
    pub input: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Provider family that produced the capture
    #[arg(short, long)]
    pub family: Option<ModelFamily>,

    /// Whether the capture is a stream or a complete response
    #[arg(short, long, value_enum)]
    pub mode: Option<ReplayMode>,

    /// What to print
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Default log level when `RUST_LOG` is unset
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// Server-sent event capture.
    Stream,
    /// A single non-streamed response body.
    Complete,
}

impl ReplayMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Normalized events, one JSON object per line.
    Events,
    /// Assembled display groups.
    Groups,
    /// Provider-native persisted content.
    FullContent,
    /// Normalized events re-encoded as SSE frames.
    Sse,
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Groups => "groups",
            Self::FullContent => "full_content",
            Self::Sse => "sse",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReplayConfig {
    pub family: ModelFamily,
    pub mode: ReplayMode,
    pub output: OutputFormat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(&cli)
    }

    /// Build the layered configuration for already parsed arguments.
    pub fn from_cli(cli: &Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("replay.family", ModelFamily::Anthropic.as_str())?
            .set_default("replay.mode", ReplayMode::Stream.as_str())?
            .set_default("replay.output", OutputFormat::Groups.as_str())?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?;

        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::with_name("unistream").required(false)),
        };

        builder = builder.add_source(
            // UNISTREAM_REPLAY__FAMILY -> replay.family
            Environment::with_prefix("UNISTREAM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(family) = cli.family {
            builder = builder.set_override("replay.family", family.as_str())?;
        }
        if let Some(mode) = cli.mode {
            builder = builder.set_override("replay.mode", mode.as_str())?;
        }
        if let Some(output) = cli.output {
            builder = builder.set_override("replay.output", output.as_str())?;
        }
        if let Some(level) = &cli.log_level {
            builder = builder.set_override("logging.level", level.as_str())?;
        }
        if let Some(json) = cli.json_logs {
            builder = builder.set_override("logging.json", json)?;
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_family_aliases() {
        let cli = Cli::try_parse_from(["unistream", "--family", "claude", "capture.sse"]).unwrap();
        assert_eq!(cli.family, Some(ModelFamily::Anthropic));
        assert_eq!(cli.input, Some(PathBuf::from("capture.sse")));
    }

    #[test]
    fn test_cli_rejects_unknown_output() {
        assert!(Cli::try_parse_from(["unistream", "--output", "html"]).is_err());
    }
}
